//! Producer thread: pulls raw wire-format bytes from a sample source,
//! converts them to magnitude samples, and hands buffers to the [`Fifo`].
//!
//! Chunked-read loop: fixed-size reads handed off through the FIFO's
//! buffer pool instead of a single `Vec` grown by hand, with conversion
//! delegated to whichever [`Converter`] the configured sample format
//! selected.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adsb_core::{Converter, Fifo, MagBufFlags, SampleFormat, Stats};

/// How many raw bytes make up one magnitude sample for a given wire format.
pub fn bytes_per_sample(format: SampleFormat) -> usize {
    match format {
        SampleFormat::Uc8 => 2,
        SampleFormat::Sc16 | SampleFormat::Sc16Q11 => 4,
    }
}

const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(200);

/// Read raw samples from `source` until EOF or `halt` is set, converting
/// each block into a magnitude buffer and enqueueing it on `fifo`.
///
/// A short read at EOF is carried as the final (shorter) buffer rather than
/// zero-padded: padding would present an artificial silent tail to the
/// demodulator as if it were real signal.
pub fn run(
    fifo: Arc<Fifo>,
    mut source: impl Read,
    mut converter: Box<dyn Converter>,
    format: SampleFormat,
    halt: Arc<AtomicBool>,
    stats: Arc<Stats>,
    buffer_len: usize,
) {
    let bps = bytes_per_sample(format);
    let mut raw = vec![0u8; buffer_len * bps];
    let mut sample_clock: u64 = 0;
    let mut discontinuous_next = false;

    loop {
        if halt.load(Ordering::Relaxed) {
            // Requested shutdown: stop immediately, discard anything still
            // queued rather than waiting for the consumer to drain it.
            fifo.halt();
            return;
        }
        if fifo.is_halted() {
            return;
        }

        let Some(idx) = fifo.acquire(ACQUIRE_TIMEOUT) else {
            if fifo.is_halted() {
                return;
            }
            // Pool exhausted: every buffer is either queued for the
            // consumer or still checked out. The next buffer we do get
            // will have its overlap region zero-filled rather than
            // carrying real context across the gap.
            log::warn!("fifo pool exhausted, dropping overlap continuity");
            Stats::inc(&stats.dropped_samples);
            discontinuous_next = true;
            continue;
        };

        let n_read = match read_fill(&mut source, &mut raw) {
            Ok(0) => {
                fifo.release(idx);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                log::error!("sample source read failed: {e}");
                fifo.release(idx);
                break;
            }
        };

        let n_samples = n_read / bps;
        fifo.with_buffer(idx, |buf| {
            if discontinuous_next {
                buf.flags.insert(MagBufFlags::DISCONTINUOUS);
                discontinuous_next = false;
            }
            let overlap = buf.overlap;
            let convert_stats =
                converter.convert(&raw[..n_read], &mut buf.data[overlap..overlap + n_samples]);
            buf.valid_length = overlap + n_samples;
            buf.sample_timestamp = sample_clock;
            buf.sys_timestamp = now_millis();
            buf.mean_level = convert_stats.mean_level;
            buf.mean_power = convert_stats.mean_power;
        });

        sample_clock += n_samples as u64;
        fifo.enqueue(idx);

        if n_read < raw.len() {
            // End of file reached mid-buffer; this last short block has
            // already been enqueued, nothing more to read.
            break;
        }
    }

    // Reached EOF (or a read error) rather than an external halt request:
    // let the consumer finish whatever is already queued before signaling
    // that no more buffers are coming.
    fifo.drain();
    fifo.halt();
}

/// Fill `buf` as completely as possible from `source`, returning the number
/// of bytes actually read (may be less than `buf.len()` at EOF).
fn read_fill(source: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Drive a live RTL-SDR `Reader` the same way [`run`] drives a file: convert
/// each callback buffer into a magnitude block and enqueue it on `fifo`.
///
/// `rtlsdr_mt::Reader::read_async` blocks the calling thread and invokes its
/// closure once per USB transfer until `Controller::cancel_async_read` is
/// called from another thread (wired to the Ctrl-C handler in `main.rs`), so
/// there is no `halt` flag to poll here — shutdown arrives as `read_async`
/// returning.
#[cfg(feature = "native-sdr")]
pub fn run_device(
    fifo: Arc<Fifo>,
    mut reader: rtlsdr_mt::Reader,
    mut converter: Box<dyn Converter>,
    stats: Arc<Stats>,
) {
    let mut sample_clock: u64 = 0;
    let mut discontinuous_next = false;

    let result = reader.read_async(4, 32768, |raw| {
        if fifo.is_halted() {
            return;
        }
        let Some(idx) = fifo.acquire(ACQUIRE_TIMEOUT) else {
            log::warn!("fifo pool exhausted, dropping overlap continuity");
            Stats::inc(&stats.dropped_samples);
            discontinuous_next = true;
            return;
        };

        let n_samples = raw.len() / bytes_per_sample(SampleFormat::Uc8);
        fifo.with_buffer(idx, |buf| {
            if discontinuous_next {
                buf.flags.insert(MagBufFlags::DISCONTINUOUS);
                discontinuous_next = false;
            }
            let overlap = buf.overlap;
            let n = n_samples.min(buf.data.len() - overlap);
            let convert_stats = converter.convert(raw, &mut buf.data[overlap..overlap + n]);
            buf.valid_length = overlap + n;
            buf.sample_timestamp = sample_clock;
            buf.sys_timestamp = now_millis();
            buf.mean_level = convert_stats.mean_level;
            buf.mean_power = convert_stats.mean_power;
        });
        sample_clock += n_samples as u64;
        fifo.enqueue(idx);
    });

    if let Err(e) = result {
        log::error!("RTL-SDR async read stopped: {e}");
    }
    fifo.drain();
    fifo.halt();
}
