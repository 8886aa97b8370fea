//! Content source abstraction trait
//!
//! This module defines the ContentSource trait that all source providers must implement.

use async_trait::async_trait;
use marquee_core::{SourceEntry, SourceProvider};
use std::path::Path;
use thiserror::Error;

/// Source operation errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed: connection-level failures,
    /// timeouts, throttling and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Network(_) => true,
            SourceError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Content source abstraction trait
///
/// The control loop only ever lists a directory and downloads single files, so
/// alternative providers can be added without touching the watcher or pipeline.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Verify the source is reachable and the credentials are accepted
    async fn check_connection(&self) -> SourceResult<()>;

    /// List the files (not directories) directly inside `directory`.
    ///
    /// No timestamp or extension filtering happens here; entries come back in
    /// the order the server returned them.
    async fn list(&self, directory: &str) -> SourceResult<Vec<SourceEntry>>;

    /// Download `entry` to `destination`, returning the number of bytes written.
    ///
    /// `destination` is created or truncated.
    async fn download(&self, entry: &SourceEntry, destination: &Path) -> SourceResult<u64>;

    /// Get the source provider type
    fn provider(&self) -> SourceProvider;
}
