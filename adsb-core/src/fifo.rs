//! Bounded magnitude-buffer FIFO bridging the capture and demodulator
//! threads, with overlap-preserving handoff between consecutive buffers.
//!
//! One mutex, three condition variables — `not_empty` (dequeue waiters),
//! `empty` (drain waiters), `freelist_nonempty` (acquire waiters) — exactly
//! as spec.md §5 describes. Buffers live in a fixed arena and are only ever
//! referenced by index while the mutex is held, so no buffer reference can
//! alias across threads.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MagBufFlags: u8 {
        /// The producer dropped samples before this buffer; its overlap
        /// region is zero-filled rather than copied from the prior buffer.
        const DISCONTINUOUS = 1 << 0;
    }
}

/// A unit of capture passed between producer and demodulator.
#[derive(Debug, Clone)]
pub struct MagBuf {
    pub data: Vec<u16>,
    pub total_length: usize,
    pub valid_length: usize,
    pub overlap: usize,
    /// Monotonic receive-clock counter (units of 1/12e6 s) of sample 0.
    pub sample_timestamp: u64,
    /// Wall-clock milliseconds when the block started.
    pub sys_timestamp: u64,
    pub flags: MagBufFlags,
    pub mean_level: f32,
    pub mean_power: f32,
    pub dropped: u32,
}

impl MagBuf {
    fn new(total_length: usize, overlap: usize) -> Self {
        MagBuf {
            data: vec![0u16; total_length],
            total_length,
            valid_length: overlap,
            overlap,
            sample_timestamp: 0,
            sys_timestamp: 0,
            flags: MagBufFlags::empty(),
            mean_level: 0.0,
            mean_power: 0.0,
            dropped: 0,
        }
    }

    fn reset(&mut self) {
        self.valid_length = self.overlap;
        self.sample_timestamp = 0;
        self.sys_timestamp = 0;
        self.flags = MagBufFlags::empty();
        self.mean_level = 0.0;
        self.mean_power = 0.0;
        self.dropped = 0;
    }
}

struct FifoState {
    buffers: Vec<MagBuf>,
    free: VecDeque<usize>,
    queued: VecDeque<usize>,
    /// Acquired-but-not-enqueued or dequeued-but-not-released buffers.
    /// Tracked for debug assertions only — ownership is conveyed by which
    /// list an index lives in, never by a bare reference.
    checked_out: std::collections::HashSet<usize>,
    overlap_scratch: Vec<u16>,
    halted: bool,
}

/// A bounded pool of `N` pre-allocated `MagBuf`s, each `buffer_size`
/// samples, with fixed `overlap`.
pub struct Fifo {
    state: Mutex<FifoState>,
    not_empty: Condvar,
    empty: Condvar,
    freelist_nonempty: Condvar,
    overlap: usize,
}

impl Fifo {
    pub fn new(n: usize, buffer_size: usize, overlap: usize) -> Self {
        assert!(overlap <= buffer_size, "overlap must not exceed buffer_size");
        let buffers = (0..n).map(|_| MagBuf::new(buffer_size, overlap)).collect();
        let free = (0..n).collect();
        Fifo {
            state: Mutex::new(FifoState {
                buffers,
                free,
                queued: VecDeque::new(),
                checked_out: std::collections::HashSet::new(),
                overlap_scratch: vec![0u16; overlap],
                halted: false,
            }),
            not_empty: Condvar::new(),
            empty: Condvar::new(),
            freelist_nonempty: Condvar::new(),
            overlap,
        }
    }

    /// Block up to `timeout` for a free buffer. Returns `None` on timeout
    /// or if the FIFO is halted. Resets the buffer's mutable fields.
    pub fn acquire(&self, timeout: Duration) -> Option<usize> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if state.halted {
                return None;
            }
            if let Some(idx) = state.free.pop_front() {
                state.checked_out.insert(idx);
                state.buffers[idx].reset();
                return Some(idx);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self
                .freelist_nonempty
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
            if result.timed_out() && state.free.is_empty() && !state.halted {
                return None;
            }
        }
    }

    /// Apply `f` to the buffer at `idx` while holding the FIFO mutex.
    pub fn with_buffer<T>(&self, idx: usize, f: impl FnOnce(&mut MagBuf) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state.buffers[idx])
    }

    /// Enqueue a previously acquired buffer. Performs the overlap handoff:
    /// if `DISCONTINUOUS`, zero the leading `overlap` samples; otherwise
    /// copy the saved tail from the previous enqueue. Saves this buffer's
    /// trailing `overlap` samples as the new scratch for the next call.
    pub fn enqueue(&self, idx: usize) {
        let mut state = self.state.lock().unwrap();
        if state.halted {
            // Halted FIFOs silently free enqueued buffers.
            state.checked_out.remove(&idx);
            state.free.push_back(idx);
            return;
        }

        let overlap = self.overlap;
        {
            let buf = &mut state.buffers[idx];
            assert!(buf.overlap <= buf.valid_length && buf.valid_length <= buf.total_length);

            if overlap > 0 {
                if buf.flags.contains(MagBufFlags::DISCONTINUOUS) {
                    buf.data[..overlap].fill(0);
                } else {
                    let scratch = state.overlap_scratch.clone();
                    buf.data[..overlap].copy_from_slice(&scratch);
                }
            }
        }

        if overlap > 0 {
            let buf = &state.buffers[idx];
            let tail_start = buf.valid_length - overlap;
            state.overlap_scratch = buf.data[tail_start..buf.valid_length].to_vec();
        }

        state.checked_out.remove(&idx);
        state.queued.push_back(idx);
        self.not_empty.notify_one();
    }

    /// Block up to `timeout` for a queued buffer.
    pub fn dequeue(&self, timeout: Duration) -> Option<usize> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if state.halted {
                return None;
            }
            if let Some(idx) = state.queued.pop_front() {
                state.checked_out.insert(idx);
                if state.queued.is_empty() {
                    self.empty.notify_all();
                }
                return Some(idx);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self.not_empty.wait_timeout(state, deadline - now).unwrap();
            state = guard;
            if result.timed_out() && state.queued.is_empty() && !state.halted {
                return None;
            }
        }
    }

    /// Return a buffer to the freelist.
    pub fn release(&self, idx: usize) {
        let mut state = self.state.lock().unwrap();
        state.checked_out.remove(&idx);
        let was_empty = state.free.is_empty();
        state.free.push_back(idx);
        if was_empty {
            self.freelist_nonempty.notify_one();
        }
    }

    /// Block until the queue is empty or the FIFO is halted.
    pub fn drain(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.queued.is_empty() && !state.halted {
            state = self.empty.wait(state).unwrap();
        }
    }

    /// Move every queued buffer to the freelist, set the halt flag, and
    /// wake every waiter. Subsequent `acquire`/`dequeue` return `None`
    /// immediately; `enqueue` silently frees its buffer.
    pub fn halt(&self) {
        let mut state = self.state.lock().unwrap();
        state.halted = true;
        while let Some(idx) = state.queued.pop_front() {
            state.free.push_back(idx);
        }
        drop(state);
        self.freelist_nonempty.notify_all();
        self.not_empty.notify_all();
        self.empty.notify_all();
    }

    pub fn is_halted(&self) -> bool {
        self.state.lock().unwrap().halted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_resets_fields() {
        let fifo = Fifo::new(2, 1024, 256);
        let idx = fifo.acquire(Duration::ZERO).unwrap();
        fifo.with_buffer(idx, |buf| {
            assert_eq!(buf.valid_length, 256);
            assert_eq!(buf.dropped, 0);
            assert!(!buf.flags.contains(MagBufFlags::DISCONTINUOUS));
        });
    }

    #[test]
    fn test_acquire_empty_freelist_zero_timeout() {
        let fifo = Fifo::new(1, 1024, 256);
        let a = fifo.acquire(Duration::ZERO).unwrap();
        let b = fifo.acquire(Duration::ZERO);
        assert!(b.is_none());
        fifo.release(a);
    }

    #[test]
    fn test_enqueue_overlap_preservation() {
        let fifo = Fifo::new(3, 1024, 256);
        let a = fifo.acquire(Duration::ZERO).unwrap();
        fifo.with_buffer(a, |buf| {
            buf.valid_length = 1024;
            for (i, s) in buf.data.iter_mut().enumerate() {
                *s = i as u16;
            }
        });
        fifo.enqueue(a);

        let b = fifo.acquire(Duration::ZERO).unwrap();
        fifo.with_buffer(b, |buf| {
            buf.valid_length = 1024;
            for s in buf.data[256..].iter_mut() {
                *s = 0;
            }
        });
        fifo.enqueue(b);

        let d_idx = fifo.dequeue(Duration::ZERO).unwrap();
        fifo.with_buffer(d_idx, |buf| {
            // b.data[0..256] should equal a.data[768..1024]
            assert_eq!(&buf.data[..256], &(768u16..1024).collect::<Vec<_>>()[..]);
        });
    }

    #[test]
    fn test_discontinuous_zero_fills_overlap() {
        let fifo = Fifo::new(3, 1024, 256);
        let a = fifo.acquire(Duration::ZERO).unwrap();
        fifo.with_buffer(a, |buf| {
            buf.valid_length = 1024;
            buf.data.iter_mut().for_each(|s| *s = 42);
        });
        fifo.enqueue(a);

        let b = fifo.acquire(Duration::ZERO).unwrap();
        fifo.with_buffer(b, |buf| {
            buf.valid_length = 1024;
            buf.flags.insert(MagBufFlags::DISCONTINUOUS);
            buf.dropped = 2048;
        });
        fifo.enqueue(b);

        let _a_again = fifo.dequeue(Duration::ZERO).unwrap(); // original `a`
        let b_idx = fifo.dequeue(Duration::ZERO).unwrap();
        fifo.with_buffer(b_idx, |buf| {
            assert!(buf.data[..256].iter().all(|&s| s == 0));
        });
    }

    #[test]
    fn test_halt_wakes_and_frees_queued() {
        let fifo = Fifo::new(2, 1024, 0);
        let a = fifo.acquire(Duration::ZERO).unwrap();
        fifo.with_buffer(a, |buf| buf.valid_length = 1024);
        fifo.enqueue(a);

        fifo.halt();
        assert!(fifo.is_halted());
        assert!(fifo.acquire(Duration::from_millis(10)).is_none());
        assert!(fifo.dequeue(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_release_wakes_acquire() {
        let fifo = Fifo::new(1, 1024, 0);
        let a = fifo.acquire(Duration::ZERO).unwrap();
        assert!(fifo.acquire(Duration::ZERO).is_none());
        fifo.release(a);
        assert!(fifo.acquire(Duration::ZERO).is_some());
    }
}
