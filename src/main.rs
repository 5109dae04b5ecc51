use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use telemsink::config::{DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY};
use telemsink::logging::init_logging;
use telemsink::{Config, Console, Server};
use tracing::level_filters::LevelFilter;

/// Receive telemetry datagrams, verify them and report them at a throttled pace.
#[derive(Parser, Debug)]
#[command(name = "telemsink", version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Packets buffered before the oldest is dropped
    #[arg(short, long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    capacity: usize,

    /// Simulated processing time per packet, in milliseconds
    #[arg(long, default_value_t = 15)]
    delay_ms: u64,

    /// Pin the receiver thread to this core
    #[arg(long)]
    receiver_core: Option<usize>,

    /// Pin the processor thread to this core
    #[arg(long)]
    processor_core: Option<usize>,

    /// Use SCHED_RR priorities when running on a PREEMPT-RT kernel
    #[arg(long)]
    realtime: bool,

    /// Diagnostics level (RUST_LOG overrides)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let config = Config {
        bind_addr: SocketAddr::new(args.bind, args.port),
        queue_capacity: args.capacity,
        processing_delay: Duration::from_millis(args.delay_ms),
        receiver_core: args.receiver_core,
        processor_core: args.processor_core,
        realtime: args.realtime,
    };

    let handle = Server::new(config)
        .start(Arc::new(Console::stdout()))
        .context("failed to start telemetry sink")?;
    handle.join().context("telemetry sink stopped")?;
    Ok(())
}
