//! Error types module
//!
//! All failures the control loop has to reason about are unified under [`SyncError`].
//! Each variant knows which publish stage it belongs to (if any), whether the
//! failure is worth retrying on a later cycle, and how loudly it should be logged.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected conditions
    Debug,
    /// Warning level - for recoverable issues that are retried or tolerated
    Warn,
    /// Error level - for failures that abort the current unit of work
    Error,
}

/// Named stages of a single publish run, in execution order.
///
/// The new schedule is created before old auto-created schedules are retired, so a
/// failure while scheduling never leaves the display without content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishStage {
    Authenticate,
    UploadMedia,
    CreatePresentation,
    ResolveDisplayGroup,
    ScheduleNew,
    /// Best-effort: if old events cannot be listed or deleted the publish still
    /// succeeds, and more than one auto-created schedule may remain on the group.
    RetireOldSchedules,
    RefreshDisplay,
}

impl PublishStage {
    /// Every stage in the order the workflow runs them.
    pub const ALL: [PublishStage; 7] = [
        PublishStage::Authenticate,
        PublishStage::UploadMedia,
        PublishStage::CreatePresentation,
        PublishStage::ResolveDisplayGroup,
        PublishStage::ScheduleNew,
        PublishStage::RetireOldSchedules,
        PublishStage::RefreshDisplay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStage::Authenticate => "authenticate",
            PublishStage::UploadMedia => "upload_media",
            PublishStage::CreatePresentation => "create_presentation",
            PublishStage::ResolveDisplayGroup => "resolve_display_group",
            PublishStage::ScheduleNew => "schedule_new",
            PublishStage::RetireOldSchedules => "retire_old_schedules",
            PublishStage::RefreshDisplay => "refresh_display",
        }
    }

    /// Whether a failure in this stage fails the whole publish.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PublishStage::RetireOldSchedules | PublishStage::RefreshDisplay
        )
    }
}

impl Display for PublishStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Metadata describing how an error should be handled and reported.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "UPLOAD_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether the failed unit of work should be attempted again on a later cycle
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;

    /// Publish stage the error originated from, if it came from the publish workflow
    fn stage(&self) -> Option<PublishStage>;
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[source] anyhow::Error),

    #[error("Transfer failed for {path}: {source}")]
    TransferFailed {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Authentication failed: {0}")]
    AuthFailed(#[source] anyhow::Error),

    #[error("Media upload failed: {0}")]
    UploadFailed(#[source] anyhow::Error),

    #[error("Presentation creation failed: {0}")]
    PresentationFailed(#[source] anyhow::Error),

    #[error("Display not found: '{name}' ({reason})")]
    DisplayNotFound { name: String, reason: String },

    #[error("Scheduling failed: {0}")]
    ScheduleFailed(#[source] anyhow::Error),

    #[error("Retiring old schedules failed: {0}")]
    RetireFailed(#[source] anyhow::Error),

    #[error("Display refresh failed: {0}")]
    RefreshFailed(#[source] anyhow::Error),
}

/// Static metadata for each variant: (error_code, recoverable, log_level, stage).
fn sync_error_static_metadata(
    err: &SyncError,
) -> (&'static str, bool, LogLevel, Option<PublishStage>) {
    match err {
        SyncError::ConfigInvalid(_) => ("CONFIG_INVALID", false, LogLevel::Error, None),
        SyncError::SourceUnavailable(_) => ("SOURCE_UNAVAILABLE", true, LogLevel::Warn, None),
        SyncError::TransferFailed { .. } => ("TRANSFER_FAILED", true, LogLevel::Warn, None),
        SyncError::AuthFailed(_) => (
            "AUTH_FAILED",
            true,
            LogLevel::Error,
            Some(PublishStage::Authenticate),
        ),
        SyncError::UploadFailed(_) => (
            "UPLOAD_FAILED",
            true,
            LogLevel::Error,
            Some(PublishStage::UploadMedia),
        ),
        SyncError::PresentationFailed(_) => (
            "PRESENTATION_FAILED",
            true,
            LogLevel::Error,
            Some(PublishStage::CreatePresentation),
        ),
        SyncError::DisplayNotFound { .. } => (
            "DISPLAY_NOT_FOUND",
            true,
            LogLevel::Error,
            Some(PublishStage::ResolveDisplayGroup),
        ),
        SyncError::ScheduleFailed(_) => (
            "SCHEDULE_FAILED",
            true,
            LogLevel::Error,
            Some(PublishStage::ScheduleNew),
        ),
        SyncError::RetireFailed(_) => (
            "RETIRE_FAILED",
            true,
            LogLevel::Warn,
            Some(PublishStage::RetireOldSchedules),
        ),
        SyncError::RefreshFailed(_) => (
            "REFRESH_FAILED",
            true,
            LogLevel::Warn,
            Some(PublishStage::RefreshDisplay),
        ),
    }
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::ConfigInvalid(message.into())
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for SyncError {
    fn error_code(&self) -> &'static str {
        sync_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        sync_error_static_metadata(self).1
    }

    fn log_level(&self) -> LogLevel {
        sync_error_static_metadata(self).2
    }

    fn stage(&self) -> Option<PublishStage> {
        sync_error_static_metadata(self).3
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        SyncError::ConfigInvalid(format!("YAML parsing error: {}", err))
    }
}
