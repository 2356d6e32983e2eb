//! ratewatchd - sFlow Interface Rate Monitor Daemon
//!
//! Entry point: parses the command line, loads configuration, binds the
//! collector socket and drives the [`Monitor`] from a single-threaded loop.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sflow_ratewatchd::config_file::DEFAULT_CONFIG_PATH;
use sflow_ratewatchd::{Event, Monitor, ProcessExecutor, RatewatchConfig};

/// Largest UDP payload accepted from the agent
const MAX_DATAGRAM_SIZE: usize = 65_535;

const RATE_TICK: Duration = Duration::from_secs(1);
const DISPLAY_TICK: Duration = Duration::from_secs(1);
const STALENESS_TICK: Duration = Duration::from_secs(2);

/// sFlow interface rate monitor
#[derive(Parser, Debug)]
#[command(name = "ratewatchd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// UDP port to collect sFlow on (overrides the config file)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Interface label (overrides the config file)
    #[arg(short = 'i', long)]
    interface: Option<String>,

    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Do not print the status line every second
    #[arg(short = 'q', long)]
    quiet: bool,
}

/// Initializes tracing/logging subsystem
fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn load_config(args: &Args) -> anyhow::Result<RatewatchConfig> {
    let mut config = RatewatchConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(interface) = &args.interface {
        config.interface = interface.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("ratewatchd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting ratewatchd ---");

    match run(args).await {
        Ok(()) => {
            info!("ratewatchd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("ratewatchd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let listen_addr = config.listen_addr();

    let mut monitor = Monitor::from_config(&config, Box::new(ProcessExecutor))
        .context("Failed to initialize monitor")?
        .with_console(!args.quiet);

    let socket = UdpSocket::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind sFlow collector on {}", listen_addr))?;

    info!(
        listen = %listen_addr,
        interface = %config.interface,
        pps_threshold = config.thresholds.pps,
        mbps_threshold = config.thresholds.mbps,
        "Collecting sFlow"
    );

    let mut rate_tick = time::interval(RATE_TICK);
    let mut display_tick = time::interval(DISPLAY_TICK);
    let mut staleness_tick = time::interval(STALENESS_TICK);
    for tick in [&mut rate_tick, &mut display_tick, &mut staleness_tick] {
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let recovery_deadline = monitor.recovery_deadline().map(Instant::from_std);

        let event = tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _peer)) => Event::DatagramReceived(buf[..len].to_vec()),
                Err(e) => {
                    warn!(error = %e, "Failed to receive datagram");
                    continue;
                }
            },
            _ = rate_tick.tick() => Event::RateTick,
            _ = display_tick.tick() => Event::DisplayTick,
            _ = staleness_tick.tick() => Event::StalenessCheck,
            _ = sleep_until_deadline(recovery_deadline) => Event::RecoveryDue,
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        };

        monitor.handle(event, std::time::Instant::now());
    }

    monitor.flush();
    let stats = monitor.stats();
    info!(
        datagrams = stats.datagrams,
        dropped = stats.dropped_datagrams,
        snapshots = stats.snapshots,
        triggers = stats.triggers_fired,
        "Collector stopped"
    );
    Ok(())
}

/// Sleeps until the recovery deadline, or forever when none is armed
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
