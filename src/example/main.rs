use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use telemsink::config::DEFAULT_PORT;
use telemsink::logging::init_logging;
use telemsink::sender::{Scenario, Shape, TelemetrySender};
use tracing::info;
use tracing::level_filters::LevelFilter;

/// Send simulated telemetry packets to a telemsink instance.
#[derive(Parser, Debug)]
#[command(name = "telemetry-sender", version)]
struct Args {
    /// Sink address
    #[arg(short, long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
    target: SocketAddr,

    /// Number of datagrams to send
    #[arg(short, long, default_value_t = 100)]
    count: u32,

    /// Samples per packet
    #[arg(short, long, default_value_t = 64)]
    samples: usize,

    /// Pause between datagrams, in milliseconds
    #[arg(short, long, default_value_t = 5)]
    interval_ms: u64,

    /// Fraction of packets sent with a wrong checksum
    #[arg(long, default_value_t = 0.0)]
    corrupt_rate: f64,

    /// Fraction of packets declaring more samples than the sink keeps
    #[arg(long, default_value_t = 0.0)]
    oversize_rate: f64,

    /// Fraction of datagrams shorter than a header
    #[arg(long, default_value_t = 0.0)]
    runt_rate: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(LevelFilter::INFO);

    let scenario = Scenario {
        corrupt_rate: args.corrupt_rate,
        oversize_rate: args.oversize_rate,
        runt_rate: args.runt_rate,
    };
    let mut sender = TelemetrySender::connect(args.target, scenario)
        .with_context(|| format!("failed to open socket for {}", args.target))?;

    let (mut valid, mut corrupted, mut oversized, mut runts) = (0u32, 0u32, 0u32, 0u32);
    for _ in 0..args.count {
        match sender.send_next(args.samples).context("send failed")? {
            Shape::Valid => valid += 1,
            Shape::Corrupted => corrupted += 1,
            Shape::Oversized => oversized += 1,
            Shape::Runt => runts += 1,
        }
        thread::sleep(Duration::from_millis(args.interval_ms));
    }

    info!(
        sink = %args.target,
        valid,
        corrupted,
        oversized,
        runts,
        "done sending"
    );
    Ok(())
}
