//! Marquee Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration and retry
//! policy shared by the source, CMS, worker and CLI crates.

pub mod config;
pub mod error;
pub mod models;
pub mod provider_types;
pub mod retry;

// Re-export commonly used types
pub use config::{resolve_config_path, Config, ConfigPaths};
pub use error::{ErrorMetadata, LogLevel, PublishStage, SyncError};
pub use models::{
    AuthToken, DisplayGroupRef, MediaRef, Presentation, ScheduleEntry, ScheduleMarker,
    SourceEntry, Watermark,
};
pub use provider_types::{SinkProvider, SourceProvider};
pub use retry::{retry_with_backoff, RetryPolicy};
