//! Prometheus exporter for Shelly Gen2 devices.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use shelly_exporter::config::{LogFormat, LoggingConfig};
use shelly_exporter::process::{self, ProcessClock};
use shelly_exporter::{Exporter, ExporterConfig, HttpServer, ShellyClient, Target};

/// Prometheus exporter for Shelly Gen2 devices.
#[derive(Parser, Debug)]
#[command(name = "shelly-exporter")]
#[command(about = "Exports Prometheus metrics for Shelly accessories")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Comma-separated targets scraped when a request names none (overrides config).
    #[arg(long, alias = "default_targets")]
    default_targets: Option<String>,

    /// Without starting the server, perform one scrape, print the metrics to
    /// stdout and exit.
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let clock = ProcessClock::start();
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    if let Some(port) = args.port {
        config.set_port(port)?;
    }
    if let Some(targets) = &args.default_targets {
        config.device.default_targets = Target::parse_list(targets);
        config.validate()?;
    }

    init_logging(&config.logging, args.log_level.as_deref())?;

    let exporter = Arc::new(Exporter::new(
        ShellyClient::new()?,
        process::platform_source(clock),
    ));

    if args.once {
        return run_once(&exporter, &config.device.default_targets).await;
    }

    info!("Starting Shelly exporter");

    let listen_addr = config.listen_addr()?;
    let http_server = HttpServer::new(exporter, listen_addr, config.device.default_targets);

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_signal().await;

    // Signal shutdown
    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    info!("Exporter stopped");
    Ok(())
}

/// Scrape the default targets once and print the result.
async fn run_once(exporter: &Exporter, targets: &[Target]) -> anyhow::Result<()> {
    let mut body = String::new();
    let summary = exporter
        .scrape_into(targets, &mut body)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to render metrics: {}", e))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(body.as_bytes())?;
    stdout.flush()?;

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "One-shot scrape finished"
    );
    Ok(())
}

/// Initialize tracing on stderr; stdout is reserved for one-shot output.
fn init_logging(logging: &LoggingConfig, level_override: Option<&str>) -> anyhow::Result<()> {
    let log_level = level_override
        .unwrap_or(&logging.level)
        .parse()
        .unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("shelly_exporter={}", log_level).parse()?);

    match logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
