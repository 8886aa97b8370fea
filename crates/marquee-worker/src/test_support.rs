//! In-memory source and sink used by the worker tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use marquee_cms::{ContentSink, PublishReport};
use marquee_core::{
    DisplayGroupRef, ScheduleEntry, SinkProvider, SourceEntry, SourceProvider, SyncError,
};
use marquee_source::{ContentSource, SourceError, SourceResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Timestamp `secs` seconds after a fixed base instant.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn entry(name: &str, modified_at: DateTime<Utc>) -> SourceEntry {
    SourceEntry {
        path: format!("Signage/{}", name),
        name: name.to_string(),
        size: name.len() as u64,
        content_type: None,
        modified_at,
        etag: None,
    }
}

fn status_error(status: u16) -> SourceError {
    match status {
        401 | 403 => SourceError::Unauthorized(format!("HTTP {}", status)),
        404 => SourceError::NotFound("missing".to_string()),
        _ => SourceError::Http {
            status,
            body: "fake failure".to_string(),
        },
    }
}

#[derive(Default)]
struct SourceState {
    entries: Vec<SourceEntry>,
    failing_listings: u32,
    listing_status: u16,
    failing_downloads: HashSet<String>,
    transient_download_failures: u32,
    list_calls: u32,
    download_calls: u32,
}

/// Directory held in memory; downloads write the entry name as file content.
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
}

impl FakeSource {
    pub fn add(&self, entry: SourceEntry) {
        self.state.lock().unwrap().entries.push(entry);
    }

    /// The next `count` listings fail with `status`.
    pub fn fail_listings(&self, count: u32, status: u16) {
        let mut state = self.state.lock().unwrap();
        state.failing_listings = count;
        state.listing_status = status;
    }

    /// Downloads of `name` fail with a non-transient error.
    pub fn fail_download(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_downloads
            .insert(name.to_string());
    }

    /// The next `count` downloads fail with a retryable server error.
    pub fn fail_next_downloads(&self, count: u32) {
        self.state.lock().unwrap().transient_download_failures = count;
    }

    pub fn heal_download(&self, name: &str) {
        self.state.lock().unwrap().failing_downloads.remove(name);
    }

    pub fn list_calls(&self) -> u32 {
        self.state.lock().unwrap().list_calls
    }

    pub fn download_calls(&self) -> u32 {
        self.state.lock().unwrap().download_calls
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn check_connection(&self) -> SourceResult<()> {
        Ok(())
    }

    async fn list(&self, _directory: &str) -> SourceResult<Vec<SourceEntry>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.failing_listings > 0 {
            state.failing_listings -= 1;
            return Err(status_error(state.listing_status));
        }
        Ok(state.entries.clone())
    }

    async fn download(&self, entry: &SourceEntry, destination: &Path) -> SourceResult<u64> {
        {
            let mut state = self.state.lock().unwrap();
            state.download_calls += 1;
            if state.failing_downloads.contains(&entry.name) {
                return Err(status_error(404));
            }
            if state.transient_download_failures > 0 {
                state.transient_download_failures -= 1;
                std::fs::write(destination, b"partial")?;
                return Err(status_error(503));
            }
        }
        std::fs::write(destination, entry.name.as_bytes())?;
        Ok(entry.name.len() as u64)
    }

    fn provider(&self) -> SourceProvider {
        SourceProvider::Nextcloud
    }
}

#[derive(Default)]
struct SinkState {
    failing: HashSet<String>,
    published: Vec<String>,
    attempted_paths: Vec<PathBuf>,
    auto_schedules: Vec<ScheduleEntry>,
    next_event_id: i64,
}

/// Destination that keeps one auto-created schedule per successful publish,
/// replacing the previous ones like the real workflow does.
#[derive(Clone, Default)]
pub struct FakeSink {
    state: Arc<Mutex<SinkState>>,
}

impl FakeSink {
    pub fn fail_upload(&self, name: &str) {
        self.state.lock().unwrap().failing.insert(name.to_string());
    }

    pub fn heal_upload(&self, name: &str) {
        self.state.lock().unwrap().failing.remove(name);
    }

    pub fn published(&self) -> Vec<String> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn attempted_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().attempted_paths.clone()
    }

    pub fn auto_schedules(&self) -> Vec<ScheduleEntry> {
        self.state.lock().unwrap().auto_schedules.clone()
    }

    pub fn publish_attempts(&self) -> usize {
        self.state.lock().unwrap().attempted_paths.len()
    }
}

#[async_trait]
impl ContentSink for FakeSink {
    async fn check(&self) -> Result<DisplayGroupRef, SyncError> {
        Ok(DisplayGroupRef {
            display_group_id: 5,
            display_id: 3,
            display_name: "Lobby".to_string(),
        })
    }

    async fn publish(&self, entry: &SourceEntry, local_path: &Path) -> Result<PublishReport, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.attempted_paths.push(local_path.to_path_buf());

        let content = std::fs::read(local_path)
            .map_err(|e| SyncError::UploadFailed(anyhow::Error::new(e)))?;
        assert_eq!(content, entry.name.as_bytes());

        if state.failing.contains(&entry.name) {
            return Err(SyncError::UploadFailed(anyhow::anyhow!(
                "HTTP 500 uploading {}",
                entry.name
            )));
        }

        state.next_event_id += 1;
        let schedule = ScheduleEntry {
            event_id: state.next_event_id,
            name: format!("Auto-scheduled: {}", entry.name),
            is_priority: true,
        };
        state.auto_schedules = vec![schedule.clone()];
        state.published.push(entry.name.clone());

        Ok(PublishReport {
            schedule: Some(schedule),
            ..PublishReport::default()
        })
    }

    fn provider(&self) -> SinkProvider {
        SinkProvider::Xibo
    }
}
