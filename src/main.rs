use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ingest_supervisor::{
    config::Config,
    services::{
        CommandProfiles, MetricsStore, SessionSupervisor, StreamKeyRegistry, TokioProcessRunner,
        VodStorage, check_ffmpeg_availability,
    },
    web::{AppState, WebServer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "ingest-supervisor")]
#[command(version)]
#[command(about = "Records live RTMP ingests and reports their health metrics")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// FFmpeg binary (overrides config file)
    #[arg(long, value_name = "PATH")]
    ffmpeg: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(cli: &Cli) {
    let log_filter = if cli.log_level == "trace" {
        format!("ingest_supervisor={},tower_http=trace", cli.log_level)
    } else {
        format!("ingest_supervisor={}", cli.log_level)
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    info!("Starting Ingest Supervisor v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(ffmpeg) = cli.ffmpeg {
        config.ffmpeg.command = ffmpeg;
    }
    config.validate()?;

    let (ffmpeg_available, ffmpeg_version) = check_ffmpeg_availability(&config.ffmpeg.command).await;
    if ffmpeg_available {
        info!(
            "FFmpeg available: {} ({})",
            config.ffmpeg.command,
            ffmpeg_version.as_deref().unwrap_or("unknown version")
        );
    } else {
        warn!(
            "FFmpeg not available at '{}', recording and metrics sessions will fail to start",
            config.ffmpeg.command
        );
    }

    let vod_storage = VodStorage::new(&config.storage.vod_path)?;
    info!("Recordings stored in {}", vod_storage.root().display());

    let metrics_store = MetricsStore::new();
    let supervisor = Arc::new(SessionSupervisor::new(
        Arc::new(TokioProcessRunner::new(config.supervisor.event_channel_capacity)),
        Arc::new(vod_storage.clone()),
        metrics_store.clone(),
        CommandProfiles::new(&config.ffmpeg),
        config.supervisor.clone(),
        tracing::info_span!("supervisor"),
    ));
    info!(
        "Session supervisor initialized (duplicate_policy={}, grace={:?})",
        config.supervisor.duplicate_policy, config.supervisor.termination_grace
    );

    let server = WebServer::new(AppState {
        config: config.clone(),
        supervisor: supervisor.clone(),
        metrics_store,
        vod_storage,
        stream_keys: StreamKeyRegistry::new(config.streaming.clone()),
    })?;

    let cancellation = CancellationToken::new();
    let signal_token = cancellation.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    server.serve_with_shutdown(cancellation.clone().cancelled_owned()).await?;

    info!("Web server stopped, terminating sessions");
    supervisor.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
