use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::filter::EnvFilter;

use slow_drip::{Config, Harness, config, signal};

/// Exit status after a shutdown signal, as a shell reports SIGINT.
const INTERRUPTED: u8 = 130;

fn build_config(args: &Args) -> slow_drip::Result<Config> {
    let target = config::resolve_target(&args.ip, args.port)?;
    let payload = config::decode_hex(&args.data)?;
    let report = Duration::from_secs(args.report);
    Ok(Config::new(target, args.connections)
        .with_payload(payload)
        .with_chunk_size(args.bytes)
        .with_tick_interval(Duration::from_micros(args.sleep))
        .with_poll_timeout(Duration::from_millis(args.timeout))
        .with_report_interval(Some(report)))
}

fn init_env_filter(env_filter: EnvFilter) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_target(true);

    let subscriber = subscriber.finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> ExitCode {
    tracing_log::LogTracer::init().expect("Failed to set logger");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    init_env_filter(env_filter);
    signal::install_panic_reporter();

    let args = Args::parse();
    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = match signal::install_shutdown_handler() {
        Ok(flag) => flag,
        Err(e) => {
            tracing::error!("cannot install signal handler: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut harness = match Harness::new(config) {
        Ok(harness) => harness,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = harness.run(&shutdown);
    let totals = harness.totals();
    harness.teardown();
    tracing::info!(
        "{} ticks, {} connection attempts, {} dropped, {} bytes sent",
        totals.ticks,
        totals.attempts,
        totals.dropped,
        totals.bytes_sent
    );
    match outcome {
        Ok(()) => ExitCode::from(INTERRUPTED),
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Holds many slow TCP connections open against one server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The server host name or address
    #[arg(short, long)]
    ip: String,
    /// The server port
    #[arg(short, long)]
    port: u16,
    /// The number of connections to hold open
    #[arg(short, long)]
    connections: usize,
    /// The number of payload bytes sent to each connection per tick
    #[arg(short, long, default_value = "10")]
    bytes: usize,
    /// The payload as a hex string
    #[arg(short, long, default_value = "")]
    data: String,
    /// Sleep between ticks in micro-sec
    #[arg(short, long, default_value = "10000")]
    sleep: u64,
    /// Poll timeout in milli-sec
    #[arg(short, long, default_value = "1000")]
    timeout: u64,
    /// Status report period in sec, 0 disables it
    #[arg(short, long, default_value = "5")]
    report: u64,
}
