#![forbid(unsafe_code)]

//! `watershed-relay` binary.
//!
//! Loads configuration, launches the watershed worker, connects Slack Socket
//! Mode, and relays location messages until the worker exits or a shutdown
//! signal arrives. A worker exit is fatal and ends the process with an error.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use watershed_relay::config::GlobalConfig;
use watershed_relay::delivery::ChatDelivery;
use watershed_relay::models::GeoUriDecoder;
use watershed_relay::pipe::correlation::{spawn_sweep_task, CorrelationStore};
use watershed_relay::pipe::PipeOrchestrator;
use watershed_relay::slack::client::SlackService;
use watershed_relay::worker::{self, spawner};
use watershed_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "watershed-relay", about = "Slack relay for watershed lookups", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("watershed-relay bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    info!(protocol = ?config.worker.protocol, "configuration loaded");

    let ct = CancellationToken::new();

    // ── Launch worker ───────────────────────────────────
    let connection = spawner::spawn_worker(&spawner::SpawnConfig::from(&config.worker))?;
    let (channels, tasks) = worker::start(
        connection,
        config.worker.group_size(),
        config.worker.request_queue,
        &ct,
    );

    // ── Correlation ─────────────────────────────────────
    let store = Arc::new(CorrelationStore::new(
        config.worker.protocol.correlation_strategy(),
        config.correlation.limits(),
    ));
    let sweep_handle = spawn_sweep_task(
        Arc::clone(&store),
        config.correlation.sweep_interval(),
        ct.clone(),
    );

    // ── Slack + orchestrator ────────────────────────────
    let slack = Arc::new(SlackService::connect(&config.slack)?);
    let orchestrator = Arc::new(
        PipeOrchestrator::new(
            config.worker.protocol,
            store,
            channels.request_tx,
            Arc::clone(&slack) as Arc<dyn ChatDelivery>,
            Arc::new(GeoUriDecoder::new()?),
        )
        .with_request_notifications(config.slack.notify_on_request),
    );
    let socket_handle = slack.spawn_socket_mode(Arc::clone(&orchestrator));

    if let Err(err) = slack
        .notify_operator("Watershed relay online.".to_owned())
        .await
    {
        warn!(%err, "failed to post startup notice");
    }
    info!("watershed relay ready");

    // ── Relay until worker exit or shutdown signal ──────
    let outcome = tokio::select! {
        result = orchestrator.run_dispatch(channels.event_rx) => result,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    ct.cancel();
    socket_handle.abort();
    if let Some(stderr) = tasks.stderr {
        stderr.abort();
    }
    let _ = tokio::join!(tasks.writer, tasks.reader, tasks.monitor, sweep_handle);
    info!("watershed-relay shut down");

    outcome
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
