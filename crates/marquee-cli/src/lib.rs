//! Wiring for the `marquee` binary: logging setup, service construction and shutdown.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use marquee_cms::{create_sink, ContentSink};
use marquee_core::config::{LogFormat, LoggingConfig};
use marquee_core::{Config, DisplayGroupRef};
use marquee_source::{create_source, ContentSource};
use marquee_worker::{
    create_watermark_store, ContentTransferPipeline, ControlLoop, RemoteDirectoryWatcher, SeedPolicy,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_NAME: &str = "marquee.log";

/// `RUST_LOG` when set, otherwise the configured level.
pub fn env_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid logging.level '{}'", logging.level)),
    }
}

/// Initialize tracing for the binary.
///
/// The returned guard flushes the log file on drop and must live as long as `main`.
pub fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(logging)?;

    let (compact, json) = match logging.format {
        LogFormat::Compact => (
            Some(tracing_subscriber::fmt::layer().compact().with_target(false)),
            None,
        ),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    let mut guard = None;
    let file_layer = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| LOG_FILE_NAME.into());
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(compact)
        .with(json)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(guard)
}

/// The configured source and destination.
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn ContentSource>,
    pub sink: Arc<dyn ContentSink>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = create_source(config).context("Failed to create content source")?;
        let sink = create_sink(config).context("Failed to create publish destination")?;
        Ok(Self { source, sink })
    }

    /// Verify both ends are reachable and the target display exists.
    pub async fn check(&self) -> Result<DisplayGroupRef> {
        self.source.check_connection().await.with_context(|| {
            format!("Cannot reach {} source", self.source.provider())
        })?;
        tracing::info!(provider = %self.source.provider(), "Source connection OK");

        let group = self.sink.check().await.with_context(|| {
            format!("Cannot publish to {} destination", self.sink.provider())
        })?;
        tracing::info!(
            provider = %self.sink.provider(),
            display = %group.display_name,
            display_group_id = group.display_group_id,
            "Destination OK"
        );
        Ok(group)
    }

    pub fn control_loop(&self, config: &Config) -> ControlLoop {
        let watcher = RemoteDirectoryWatcher::new(
            self.source.clone(),
            config.source_path(),
            config.extensions().to_vec(),
            config.retry,
        );
        let pipeline = ContentTransferPipeline::new(self.source.clone(), config.retry);

        ControlLoop::new(
            watcher,
            pipeline,
            self.sink.clone(),
            create_watermark_store(config),
            config.poll_interval(),
            SeedPolicy::from_config(config),
        )
    }
}

/// Channel that receives one message on SIGINT or SIGTERM.
pub fn shutdown_channel() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = tx.send(()).await;
    });
    rx
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

pub fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}
