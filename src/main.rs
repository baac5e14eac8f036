use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use procscope::{config, dmesg, ecu, monitor, procfs, report};

/// Process resource monitor reporting CPU and memory consumption.
#[derive(Parser)]
#[command(name = "procscope", about)]
struct Cli {
    /// Process id to monitor.
    pid: Option<u32>,

    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} ({}/{})",
            RELEASE,
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("procscope {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let cfg = match &cli.config {
        Some(path) => config::Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::Config::default(),
    };

    let pid = cli
        .pid
        .context("a process id to monitor is required (use --help for usage)")?;

    tracing::info!(version = version::RELEASE, pid, "starting procscope");

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg, pid).await })
}

async fn run(cfg: config::Config, pid: u32) -> Result<()> {
    // Instance metadata is best effort: without it, compute-unit figures
    // degrade to NaN but sampling continues.
    let instance = if cfg.metadata.enabled {
        match ecu::metadata::current_instance(&cfg.metadata).await {
            Ok(instance) => {
                tracing::info!(instance = instance.api_name, "resolved instance type");
                Some(instance)
            }
            Err(e) => {
                tracing::warn!(error = %e, "instance metadata unavailable");
                None
            }
        }
    } else {
        None
    };

    let cancel = CancellationToken::new();

    // Kernel log stream is optional.
    if cfg.dmesg.enabled {
        let messages = dmesg::stream(&cfg.dmesg, cancel.child_token())
            .context("starting kernel log stream")?;
        tokio::spawn(report::log_kernel_messages(messages));
    }

    let (monitor, measures) = monitor::Monitor::start(procfs::ProcReader, pid, &cfg.monitor)
        .context("starting monitor")?;

    tokio::spawn(report::run(measures, instance));

    // Wait for shutdown signal.
    shutdown_signal().await;

    // Graceful shutdown. Stopping the monitor leaves the measure channel
    // open; the reporter task ends with the runtime.
    monitor.stop();
    cancel.cancel();

    tracing::info!(
        emitted = monitor.stats().emitted(),
        dropped = monitor.stats().dropped(),
        "procscope stopped",
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
