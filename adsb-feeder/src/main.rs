//! adsb-feeder: the SDR-driver collaborator around `adsb-core`.
//!
//! Owns the producer thread (sample source -> magnitude buffer -> FIFO),
//! the consumer thread (FIFO -> demodulator -> dispatcher -> tracker), file
//! and CSV replay, raw hex-line ingestion, and — behind the `native-sdr`
//! feature — a live RTL-SDR device via `rtlsdr_mt`. `adsb-core` itself
//! never touches a file, a socket, or a device.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use adsb_core::{
    make_demodulator, select_converter, Config, ConverterCaps, CprConfig, Dispatcher, Fifo,
    SampleFormat, SampleRate, Stats, TrackEvent, Tracker,
};

mod capture;
mod consumer;
mod producer;

#[derive(Parser)]
#[command(
    name = "adsb-feeder",
    version,
    about = "ADS-B capture, demodulation, and tracking"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Demodulate and track a raw I/Q sample file.
    Iq(IqArgs),
    /// Decode pre-demodulated hex frames from a text file (`*HEX;` or bare hex, one per line).
    Hex(HexArgs),
    /// Replay a `timestamp_seconds, hex_payload` CSV at its original pacing.
    Csv(CsvArgs),
    /// Capture live from an RTL-SDR dongle.
    #[cfg(feature = "native-sdr")]
    Live(LiveArgs),
}

#[derive(clap::Args)]
struct IqArgs {
    /// Path to a raw interleaved I/Q sample file.
    file: PathBuf,
    #[arg(long, value_enum, default_value_t = CliSampleRate::ModeS2_0)]
    rate: CliSampleRate,
    #[arg(long, value_enum, default_value_t = CliSampleFormat::Uc8)]
    format: CliSampleFormat,
    #[command(flatten)]
    tracking: TrackingArgs,
    #[arg(long, default_value_t = 16)]
    pool_size: usize,
    #[arg(long, default_value_t = 1 << 18)]
    buffer_len: usize,
    #[arg(long, default_value_t = 320)]
    overlap: usize,
}

#[derive(clap::Args)]
struct HexArgs {
    file: PathBuf,
    #[command(flatten)]
    tracking: TrackingArgs,
}

#[derive(clap::Args)]
struct CsvArgs {
    file: PathBuf,
    #[command(flatten)]
    tracking: TrackingArgs,
}

#[cfg(feature = "native-sdr")]
#[derive(clap::Args)]
struct LiveArgs {
    #[arg(long, default_value_t = 0)]
    device_index: u32,
    #[arg(long, default_value_t = 1_090_000_000)]
    freq_hz: u32,
    #[arg(long, value_enum, default_value_t = CliSampleRate::ModeS2_0)]
    rate: CliSampleRate,
    #[arg(long)]
    gain: Option<i32>,
    #[command(flatten)]
    tracking: TrackingArgs,
    #[arg(long, default_value_t = 16)]
    pool_size: usize,
    #[arg(long, default_value_t = 1 << 18)]
    buffer_len: usize,
    #[arg(long, default_value_t = 320)]
    overlap: usize,
}

/// Tracking/CPR knobs shared by every subcommand, collected into a
/// [`Config`] at construction time rather than hardcoded.
#[derive(clap::Args)]
struct TrackingArgs {
    /// Receiver reference latitude, for local CPR decode and distance checks.
    #[arg(long)]
    lat: Option<f64>,
    /// Receiver reference longitude.
    #[arg(long)]
    lon: Option<f64>,
    /// Seconds an unvalidated residual-recovered ICAO stays usable before
    /// it must be re-confirmed by another frame from the same address.
    #[arg(long, default_value_t = Config::default().icao_cache_ttl)]
    icao_cache_ttl: f64,
    /// Seconds of silence before an aircraft is dropped from the track table.
    #[arg(long, default_value_t = Config::default().stale_timeout)]
    stale_timeout: f64,
    /// Minimum seconds between stored position updates for a given aircraft.
    #[arg(long, default_value_t = Config::default().min_position_interval)]
    min_position_interval: f64,
    /// Reject a decoded airborne position further than this from the
    /// receiver, in nautical miles.
    #[arg(long, default_value_t = Config::default().cpr.max_dist_airborne_nm)]
    max_dist_airborne_nm: f64,
    /// Surface-position equivalent of `max_dist_airborne_nm`.
    #[arg(long, default_value_t = Config::default().cpr.max_dist_surface_nm)]
    max_dist_surface_nm: f64,
    /// Reject a position update implying groundspeed above this, in knots.
    #[arg(long, default_value_t = Config::default().cpr.max_speed_kts)]
    max_speed_kts: f64,
}

impl TrackingArgs {
    fn to_config(&self) -> Config {
        Config {
            cpr: CprConfig {
                max_dist_airborne_nm: self.max_dist_airborne_nm,
                max_dist_surface_nm: self.max_dist_surface_nm,
                max_speed_kts: self.max_speed_kts,
            },
            icao_cache_ttl: self.icao_cache_ttl,
            stale_timeout: self.stale_timeout,
            min_position_interval: self.min_position_interval,
            receiver_lat: self.lat,
            receiver_lon: self.lon,
            ..Config::default()
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CliSampleRate {
    ModeS2_0,
    ModeS8_0,
    ModeAc2_4,
}

impl From<CliSampleRate> for SampleRate {
    fn from(r: CliSampleRate) -> Self {
        match r {
            CliSampleRate::ModeS2_0 => SampleRate::ModeS2_0,
            CliSampleRate::ModeS8_0 => SampleRate::ModeS8_0,
            CliSampleRate::ModeAc2_4 => SampleRate::ModeAc2_4,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CliSampleFormat {
    Uc8,
    Sc16,
    Sc16Q11,
}

impl From<CliSampleFormat> for SampleFormat {
    fn from(f: CliSampleFormat) -> Self {
        match f {
            CliSampleFormat::Uc8 => SampleFormat::Uc8,
            CliSampleFormat::Sc16 => SampleFormat::Sc16,
            CliSampleFormat::Sc16Q11 => SampleFormat::Sc16Q11,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Iq(args) => cmd_iq(args),
        Command::Hex(args) => cmd_hex(args),
        Command::Csv(args) => cmd_csv(args),
        #[cfg(feature = "native-sdr")]
        Command::Live(args) => cmd_live(args),
    }
}

/// Install a Ctrl-C handler that flips a shared flag and halts `fifo` so
/// both threads wake out of their blocking waits.
fn install_shutdown_handler(fifo: Arc<Fifo>, halt: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        halt.store(true, Ordering::Relaxed);
        fifo.halt();
    });
    if let Err(e) = result {
        log::warn!("failed to install Ctrl-C handler: {e}");
    }
}

fn print_event(event: &TrackEvent) {
    match event {
        TrackEvent::NewAircraft {
            icao, timestamp, ..
        } => {
            println!("{timestamp:.3} new aircraft {}", adsb_core::icao_to_string(icao));
        }
        TrackEvent::PositionUpdate {
            icao,
            lat,
            lon,
            altitude_ft,
            timestamp,
            ..
        } => {
            println!(
                "{timestamp:.3} {} pos={lat:.5},{lon:.5} alt={altitude_ft:?}",
                adsb_core::icao_to_string(icao)
            );
        }
        TrackEvent::SightingUpdate {
            icao,
            callsign,
            squawk,
            timestamp,
            ..
        } => {
            if callsign.is_some() || squawk.is_some() {
                println!(
                    "{timestamp:.3} {} callsign={callsign:?} squawk={squawk:?}",
                    adsb_core::icao_to_string(icao)
                );
            }
        }
        TrackEvent::AircraftUpdate { .. } => {}
    }
}

fn cmd_iq(args: IqArgs) -> ExitCode {
    let rate: SampleRate = args.rate.into();
    let format: SampleFormat = args.format.into();

    let source = match capture::open_sample_file(&args.file.display().to_string()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open {}: {e}", args.file.display());
            return ExitCode::FAILURE;
        }
    };
    let converter = match select_converter(format, rate.hz(), ConverterCaps::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to select converter: {e}");
            return ExitCode::FAILURE;
        }
    };

    let fifo = Arc::new(Fifo::new(args.pool_size, args.buffer_len, args.overlap));
    let stats = Arc::new(Stats::new());
    let halt = Arc::new(AtomicBool::new(false));
    install_shutdown_handler(fifo.clone(), halt.clone());

    let demodulator = make_demodulator(rate);
    let config = args.tracking.to_config();
    let tracker = Tracker::new(&config, stats.clone());
    let dispatcher = Dispatcher::new(tracker, config.icao_cache_ttl, stats.clone());

    let producer_fifo = fifo.clone();
    let producer_halt = halt.clone();
    let producer_stats = stats.clone();
    let buffer_len = args.buffer_len;
    let producer = std::thread::spawn(move || {
        producer::run(
            producer_fifo,
            source,
            converter,
            format,
            producer_halt,
            producer_stats,
            buffer_len,
        );
    });

    consumer::run(
        fifo,
        demodulator,
        rate,
        dispatcher,
        halt,
        stats.clone(),
        print_event,
    );

    let _ = producer.join();

    let snap = stats.snapshot();
    eprintln!("{snap:?}");
    ExitCode::SUCCESS
}

fn cmd_hex(args: HexArgs) -> ExitCode {
    let lines = match capture::read_hex_lines(&args.file.display().to_string()) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let stats = Arc::new(Stats::new());
    let config = args.tracking.to_config();
    let tracker = Tracker::new(&config, stats.clone());
    let mut dispatcher = Dispatcher::new(tracker, config.icao_cache_ttl, stats.clone());

    for (i, hex) in lines.iter().enumerate() {
        let timestamp = i as f64 * 0.001;
        if let Some((_decoded, events)) = dispatcher.handle(hex, timestamp, None) {
            for event in &events {
                print_event(event);
            }
        }
    }

    let snap = stats.snapshot();
    eprintln!("{snap:?}");
    ExitCode::SUCCESS
}

fn cmd_csv(args: CsvArgs) -> ExitCode {
    let rows = match capture::read_csv_replay(&args.file.display().to_string()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let stats = Arc::new(Stats::new());
    let config = args.tracking.to_config();
    let tracker = Tracker::new(&config, stats.clone());
    let mut dispatcher = Dispatcher::new(tracker, config.icao_cache_ttl, stats.clone());

    capture::replay_with_delays(&rows, |row| {
        if let Some((_decoded, events)) = dispatcher.handle(&row.hex, row.timestamp, None) {
            for event in &events {
                print_event(event);
            }
        }
    });

    let snap = stats.snapshot();
    eprintln!("{snap:?}");
    ExitCode::SUCCESS
}

#[cfg(feature = "native-sdr")]
fn cmd_live(args: LiveArgs) -> ExitCode {
    use std::sync::Mutex;

    let rate: SampleRate = args.rate.into();

    let (mut ctl, reader) = match rtlsdr_mt::open(args.device_index) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("failed to open RTL-SDR device {}: {e}", args.device_index);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = ctl.set_center_freq(args.freq_hz) {
        eprintln!("failed to set frequency: {e}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = ctl.set_sample_rate(rate.hz() as u32) {
        eprintln!("failed to set sample rate: {e}");
        return ExitCode::FAILURE;
    }
    match args.gain {
        Some(g) => {
            ctl.disable_agc().ok();
            ctl.set_tuner_gain(g).ok();
        }
        None => {
            ctl.enable_agc().ok();
        }
    }

    let converter = match select_converter(SampleFormat::Uc8, rate.hz(), ConverterCaps::default())
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to select converter: {e}");
            return ExitCode::FAILURE;
        }
    };

    let fifo = Arc::new(Fifo::new(args.pool_size, args.buffer_len, args.overlap));
    let stats = Arc::new(Stats::new());
    let halt = Arc::new(AtomicBool::new(false));
    let ctl = Arc::new(Mutex::new(ctl));

    let shutdown_fifo = fifo.clone();
    let shutdown_halt = halt.clone();
    let shutdown_ctl = ctl.clone();
    let result = ctrlc::set_handler(move || {
        shutdown_halt.store(true, Ordering::Relaxed);
        shutdown_fifo.halt();
        shutdown_ctl.lock().unwrap().cancel_async_read();
    });
    if let Err(e) = result {
        log::warn!("failed to install Ctrl-C handler: {e}");
    }

    let demodulator = make_demodulator(rate);
    let config = args.tracking.to_config();
    let tracker = Tracker::new(&config, stats.clone());
    let dispatcher = Dispatcher::new(tracker, config.icao_cache_ttl, stats.clone());

    let producer_fifo = fifo.clone();
    let producer_stats = stats.clone();
    let producer = std::thread::spawn(move || {
        producer::run_device(producer_fifo, reader, converter, producer_stats);
    });

    consumer::run(
        fifo,
        demodulator,
        rate,
        dispatcher,
        halt,
        stats.clone(),
        print_event,
    );

    let _ = producer.join();
    let snap = stats.snapshot();
    eprintln!("{snap:?}");
    ExitCode::SUCCESS
}
