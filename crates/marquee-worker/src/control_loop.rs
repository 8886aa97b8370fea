//! Polling control loop
//!
//! Alternates between [`LoopState::Polling`] and [`LoopState::Sleeping`]. A poll lists
//! the entries newer than the watermark and runs each one, oldest first, through
//! fetch, publish and release before starting the next.
//!
//! The watermark only moves to the timestamp of an entry whose publish succeeded,
//! and never past an entry of the same batch that failed. Later entries are still
//! processed; those that publish while the watermark is held back are remembered and
//! skipped on later polls, so only the failed entry is offered again. Once the failed
//! entry succeeds, the watermark catches up over the remembered ones.
//!
//! Shutdown: a message on (or the closing of) the shutdown channel is honoured while
//! sleeping and between entries. An in-flight publish always runs to completion.

use chrono::{DateTime, Utc};
use marquee_cms::ContentSink;
use marquee_core::{Config, ErrorMetadata, LogLevel, SourceEntry, SyncError, Watermark};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::sleep;
use tracing::Instrument;

use crate::pipeline::ContentTransferPipeline;
use crate::watcher::RemoteDirectoryWatcher;
use crate::watermark_store::WatermarkStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Polling,
    Sleeping,
}

/// Starting watermark when none was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Start after the newest file already present; existing files are not published.
    /// An empty directory seeds the Unix epoch, a failed listing seeds the current time.
    SkipExisting,
    /// Start at the Unix epoch so every file present is published on the first poll.
    ProcessExisting,
}

impl SeedPolicy {
    pub fn from_config(config: &Config) -> Self {
        if config.copy_from.process_existing {
            SeedPolicy::ProcessExisting
        } else {
            SeedPolicy::SkipExisting
        }
    }
}

/// Outcome counters for one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycle_id: u64,
    pub found: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Entries already published on an earlier poll, not sent again
    pub skipped: usize,
    pub source_unavailable: bool,
    pub elapsed: Duration,
}

impl CycleStats {
    pub fn log_summary(&self) {
        if self.found == 0 {
            return;
        }
        tracing::info!(
            cycle_id = self.cycle_id,
            found = self.found,
            succeeded = self.succeeded,
            failed = self.failed,
            skipped = self.skipped,
            "Processed {} files in {:.1}s: {} succeeded, {} failed",
            self.succeeded + self.failed,
            self.elapsed.as_secs_f64(),
            self.succeeded,
            self.failed
        );
    }
}

fn log_entry_failure(entry: &SourceEntry, err: &SyncError) {
    let stage = err.stage().map(|s| s.as_str()).unwrap_or("transfer");
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(
            file = %entry.name,
            stage = stage,
            error_code = err.error_code(),
            error = %err.detailed_message(),
            "File processing failed"
        ),
        LogLevel::Warn => tracing::warn!(
            file = %entry.name,
            stage = stage,
            error_code = err.error_code(),
            error = %err.detailed_message(),
            "File processing failed, will retry next poll"
        ),
        LogLevel::Error => tracing::error!(
            file = %entry.name,
            stage = stage,
            error_code = err.error_code(),
            error = %err.detailed_message(),
            "File processing failed, will retry next poll"
        ),
    }
}

pub struct ControlLoop {
    watcher: RemoteDirectoryWatcher,
    pipeline: ContentTransferPipeline,
    sink: Arc<dyn ContentSink>,
    store: Arc<dyn WatermarkStore>,
    poll_interval: Duration,
    seed_policy: SeedPolicy,
    watermark: Option<Watermark>,
    /// Published entries the watermark could not move past yet
    published_ahead: HashSet<(String, DateTime<Utc>)>,
    state: LoopState,
    cycles: u64,
    shutdown: Option<mpsc::Receiver<()>>,
    stopping: bool,
}

impl ControlLoop {
    pub fn new(
        watcher: RemoteDirectoryWatcher,
        pipeline: ContentTransferPipeline,
        sink: Arc<dyn ContentSink>,
        store: Arc<dyn WatermarkStore>,
        poll_interval: Duration,
        seed_policy: SeedPolicy,
    ) -> Self {
        Self {
            watcher,
            pipeline,
            sink,
            store,
            poll_interval,
            seed_policy,
            watermark: None,
            published_ahead: HashSet::new(),
            state: LoopState::Polling,
            cycles: 0,
            shutdown: None,
            stopping: false,
        }
    }

    /// Stop when a message arrives on `shutdown` or its sender is dropped.
    pub fn with_shutdown(mut self, shutdown: mpsc::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Current watermark; `None` until the first poll (or an explicit seed).
    pub fn watermark(&self) -> Option<Watermark> {
        self.watermark
    }

    /// Decide the starting watermark: a persisted one wins, otherwise the seed policy.
    pub async fn seed_watermark(&mut self) -> Watermark {
        if let Some(watermark) = self.watermark {
            return watermark;
        }

        let watermark = match self.store.load().await {
            Ok(Some(saved)) => {
                tracing::info!(watermark = %saved, "Resuming from saved watermark");
                saved
            }
            Ok(None) => self.seed_from_policy().await,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load saved watermark, seeding from policy");
                self.seed_from_policy().await
            }
        };

        self.watermark = Some(watermark);
        watermark
    }

    async fn seed_from_policy(&self) -> Watermark {
        let watermark = match self.seed_policy {
            SeedPolicy::ProcessExisting => Watermark::epoch(),
            SeedPolicy::SkipExisting => match self.watcher.newest_timestamp().await {
                Ok(Some(newest)) => Watermark::new(newest),
                Ok(None) => Watermark::epoch(),
                Err(e) => {
                    tracing::warn!(error = %e, "Startup listing failed, only files uploaded from now on will be published");
                    Watermark::new(Utc::now())
                }
            },
        };
        tracing::info!(watermark = %watermark, policy = ?self.seed_policy, "Seeded watermark");
        watermark
    }

    fn stop_requested(&mut self) -> bool {
        if !self.stopping {
            if let Some(shutdown) = self.shutdown.as_mut() {
                self.stopping = matches!(
                    shutdown.try_recv(),
                    Ok(()) | Err(TryRecvError::Disconnected)
                );
            }
        }
        self.stopping
    }

    /// Run one entry through fetch, publish and release.
    async fn process_entry(&self, entry: &SourceEntry) -> Result<(), SyncError> {
        let transfer = self.pipeline.fetch(entry).await?;
        let result = self.sink.publish(entry, transfer.local_path()).await;
        self.pipeline.release(transfer);

        let report = result?;
        for warning in &report.warnings {
            tracing::warn!(file = %entry.name, stage = %warning.stage, "{}", warning.message);
        }
        Ok(())
    }

    async fn commit(&mut self, entry: &SourceEntry) {
        let Some(watermark) = self.watermark.as_mut() else {
            return;
        };
        if watermark.advance(entry.modified_at) {
            let current = *watermark;
            self.published_ahead
                .retain(|(_, modified_at)| current.is_newer(*modified_at));
            if let Err(e) = self.store.save(&current).await {
                tracing::warn!(error = %e, "Failed to persist watermark");
            }
        }
    }

    fn ahead_key(entry: &SourceEntry) -> (String, DateTime<Utc>) {
        (entry.path.clone(), entry.modified_at)
    }

    /// Perform one poll: list, then process every new entry in order.
    pub async fn poll_once(&mut self) -> CycleStats {
        self.state = LoopState::Polling;
        self.cycles += 1;
        let started = Instant::now();
        let mut stats = CycleStats {
            cycle_id: self.cycles,
            ..CycleStats::default()
        };

        let watermark = self.seed_watermark().await;
        let entries = match self.watcher.list_new_entries(&watermark).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    cycle_id = stats.cycle_id,
                    directory = %self.watcher.directory(),
                    error = %e.detailed_message(),
                    "Source unavailable, skipping this poll"
                );
                stats.source_unavailable = true;
                stats.elapsed = started.elapsed();
                return stats;
            }
        };

        stats.found = entries.len();
        if entries.is_empty() {
            tracing::debug!(cycle_id = stats.cycle_id, "No new files");
            stats.elapsed = started.elapsed();
            return stats;
        }
        tracing::info!(cycle_id = stats.cycle_id, count = entries.len(), "Found new files");

        let mut blocked = false;
        for entry in &entries {
            if self.stop_requested() {
                tracing::info!("Shutdown requested, leaving remaining files for the next run");
                break;
            }

            if self.published_ahead.contains(&Self::ahead_key(entry)) {
                stats.skipped += 1;
                tracing::debug!(file = %entry.name, "Already published, waiting for the watermark");
                if !blocked {
                    self.commit(entry).await;
                }
                continue;
            }

            let span = tracing::info_span!("process_file", cycle_id = stats.cycle_id, file = %entry.name);
            let file_started = Instant::now();

            match self.process_entry(entry).instrument(span).await {
                Ok(()) => {
                    stats.succeeded += 1;
                    tracing::info!(
                        file = %entry.name,
                        elapsed_ms = file_started.elapsed().as_millis() as u64,
                        "Published file"
                    );
                    if blocked {
                        tracing::info!(file = %entry.name, "Watermark held back by an earlier failure in this batch");
                        self.published_ahead.insert(Self::ahead_key(entry));
                    } else {
                        self.commit(entry).await;
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    blocked = true;
                    log_entry_failure(entry, &e);
                }
            }
        }

        stats.elapsed = started.elapsed();
        stats
    }

    /// Poll and sleep until shutdown.
    pub async fn run(&mut self) {
        tracing::info!(
            directory = %self.watcher.directory(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "Control loop starting"
        );

        loop {
            let stats = self.poll_once().await;
            stats.log_summary();
            if self.stop_requested() {
                break;
            }

            self.state = LoopState::Sleeping;
            let interval = self.poll_interval;
            match self.shutdown.as_mut() {
                Some(shutdown) => {
                    tokio::select! {
                        _ = shutdown.recv() => {
                            self.stopping = true;
                            break;
                        }
                        _ = sleep(interval) => {}
                    }
                }
                None => sleep(interval).await,
            }
        }

        tracing::info!(watermark = ?self.watermark.map(|w| w.to_string()), "Control loop stopped");
    }
}
