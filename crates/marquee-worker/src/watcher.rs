use chrono::{DateTime, Utc};
use marquee_core::{retry_with_backoff, RetryPolicy, SourceEntry, SyncError, Watermark};
use marquee_source::{ContentSource, SourceError};
use std::sync::Arc;

/// Finds files in the watched directory that have not been published yet.
///
/// The listing is filtered client-side, so every poll costs one full directory
/// listing regardless of how many files are new.
pub struct RemoteDirectoryWatcher {
    source: Arc<dyn ContentSource>,
    directory: String,
    extensions: Vec<String>,
    retry: RetryPolicy,
}

impl RemoteDirectoryWatcher {
    pub fn new(
        source: Arc<dyn ContentSource>,
        directory: impl Into<String>,
        extensions: Vec<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            directory: directory.into(),
            extensions,
            retry,
        }
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Entries with an allowed extension, as listed by the source.
    async fn list_matching(&self) -> Result<Vec<SourceEntry>, SyncError> {
        let source = &self.source;
        let directory = self.directory.as_str();

        let entries = retry_with_backoff(&self.retry, "list_directory", SourceError::is_transient, move || {
            source.list(directory)
        })
        .await
        .map_err(|e| SyncError::SourceUnavailable(anyhow::Error::new(e)))?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.matches_extension(&self.extensions))
            .collect())
    }

    /// Matching entries strictly newer than `watermark`, oldest first.
    pub async fn list_new_entries(&self, watermark: &Watermark) -> Result<Vec<SourceEntry>, SyncError> {
        let mut entries: Vec<SourceEntry> = self
            .list_matching()
            .await?
            .into_iter()
            .filter(|entry| watermark.is_newer(entry.modified_at))
            .collect();

        entries.sort_by(|a, b| {
            a.modified_at
                .cmp(&b.modified_at)
                .then_with(|| a.path.cmp(&b.path))
        });

        tracing::debug!(
            directory = %self.directory,
            watermark = %watermark,
            new_entries = entries.len(),
            "Listed new entries"
        );
        Ok(entries)
    }

    /// Timestamp of the newest matching entry, `None` for an empty directory.
    pub async fn newest_timestamp(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self
            .list_matching()
            .await?
            .into_iter()
            .map(|entry| entry.modified_at)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, entry, FakeSource};
    use marquee_core::ErrorMetadata;
    use std::time::Duration;

    fn watcher(source: &FakeSource) -> RemoteDirectoryWatcher {
        RemoteDirectoryWatcher::new(
            Arc::new(source.clone()),
            "Signage",
            vec![".jpg".to_string(), ".png".to_string()],
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        )
    }

    #[tokio::test]
    async fn test_only_newer_matching_entries_oldest_first() {
        let source = FakeSource::default();
        source.add(entry("c.png", at(30)));
        source.add(entry("old.jpg", at(5)));
        source.add(entry("a.jpg", at(10)));
        source.add(entry("notes.txt", at(40)));
        source.add(entry("SHOUT.JPG", at(50)));
        source.add(entry("b.jpg", at(20)));

        let entries = watcher(&source)
            .list_new_entries(&Watermark::new(at(5)))
            .await
            .unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.png"]);
    }

    #[tokio::test]
    async fn test_entry_at_watermark_is_not_new() {
        let source = FakeSource::default();
        source.add(entry("a.jpg", at(10)));

        let entries = watcher(&source)
            .list_new_entries(&Watermark::new(at(10)))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_transient_listing_failure_is_retried() {
        let source = FakeSource::default();
        source.add(entry("a.jpg", at(10)));
        source.fail_listings(2, 503);

        let entries = watcher(&source)
            .list_new_entries(&Watermark::epoch())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(source.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_source_unavailable() {
        let source = FakeSource::default();
        source.fail_listings(10, 502);

        let err = watcher(&source)
            .list_new_entries(&Watermark::epoch())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
        assert_eq!(source.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let source = FakeSource::default();
        source.fail_listings(10, 401);

        let err = watcher(&source)
            .list_new_entries(&Watermark::epoch())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(_)));
        assert_eq!(source.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_newest_timestamp() {
        let source = FakeSource::default();
        assert_eq!(watcher(&source).newest_timestamp().await.unwrap(), None);

        source.add(entry("a.jpg", at(10)));
        source.add(entry("b.jpg", at(20)));
        source.add(entry("later.txt", at(99)));
        assert_eq!(watcher(&source).newest_timestamp().await.unwrap(), Some(at(20)));
    }
}
