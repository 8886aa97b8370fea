//! Download of single source entries into scratch storage.
//!
//! Every fetch gets its own temporary directory. A [`TransferResult`] owns that
//! directory and removes it on [`TransferResult::release`] or, failing that, on drop,
//! so scratch files never outlive the processing of their entry.

use marquee_core::{retry_with_backoff, RetryPolicy, SourceEntry, SyncError};
use marquee_source::{ContentSource, SourceError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const SCRATCH_PREFIX: &str = "marquee-";

/// A downloaded entry and the scratch file holding its bytes.
#[derive(Debug)]
pub struct TransferResult {
    entry: SourceEntry,
    local_path: PathBuf,
    bytes: u64,
    scratch: Option<TempDir>,
}

impl TransferResult {
    pub fn entry(&self) -> &SourceEntry {
        &self.entry
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Remove the scratch directory. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            let dir = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                tracing::warn!(scratch = %dir.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.scratch.is_none()
    }
}

impl Drop for TransferResult {
    fn drop(&mut self) {
        self.release();
    }
}

/// File name safe to create inside the scratch directory.
fn scratch_file_name(entry: &SourceEntry) -> String {
    let name: String = entry
        .name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match name.as_str() {
        "" | "." | ".." => "download".to_string(),
        _ => name,
    }
}

pub struct ContentTransferPipeline {
    source: Arc<dyn ContentSource>,
    retry: RetryPolicy,
    scratch_root: Option<PathBuf>,
}

impl ContentTransferPipeline {
    pub fn new(source: Arc<dyn ContentSource>, retry: RetryPolicy) -> Self {
        Self {
            source,
            retry,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// Download `entry` into a fresh scratch directory, retrying transient failures.
    #[tracing::instrument(skip(self, entry), fields(file = %entry.name))]
    pub async fn fetch(&self, entry: &SourceEntry) -> Result<TransferResult, SyncError> {
        let transfer_failed = |source: anyhow::Error| SyncError::TransferFailed {
            path: entry.path.clone(),
            source,
        };

        let scratch = self
            .scratch_dir()
            .map_err(|e| transfer_failed(anyhow::Error::new(e).context("creating scratch directory")))?;
        let local_path = scratch.path().join(scratch_file_name(entry));

        let source = &self.source;
        let destination = local_path.as_path();
        // On failure `scratch` is dropped here, taking any partial download with it.
        let bytes = retry_with_backoff(&self.retry, "download", SourceError::is_transient, move || {
            source.download(entry, destination)
        })
        .await
        .map_err(|e| transfer_failed(anyhow::Error::new(e)))?;

        tracing::debug!(bytes = bytes, local = %local_path.display(), "Fetched entry");
        Ok(TransferResult {
            entry: entry.clone(),
            local_path,
            bytes,
            scratch: Some(scratch),
        })
    }

    /// Release the scratch storage of a transfer.
    pub fn release(&self, mut result: TransferResult) {
        result.release();
    }
}
