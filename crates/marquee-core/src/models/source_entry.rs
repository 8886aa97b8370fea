use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// One file visible at the source, captured at discovery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Path relative to the source root (e.g. `Signage/Lobby/poster.jpg`)
    pub path: String,
    /// Display name (last path segment)
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    /// Upload or last-modified time, normalized to UTC
    pub modified_at: DateTime<Utc>,
    /// Entity tag without surrounding quotes
    pub etag: Option<String>,
}

impl SourceEntry {
    /// Case-sensitive suffix match against the allow-list (entries include the leading dot).
    /// An empty allow-list matches everything.
    pub fn matches_extension(&self, allowed: &[String]) -> bool {
        allowed.is_empty() || allowed.iter().any(|ext| self.name.ends_with(ext.as_str()))
    }

    /// File name without its final extension, used to name remote media.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }
}

impl Display for SourceEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} ({} bytes, modified {})",
            self.name,
            self.size,
            self.modified_at.to_rfc3339()
        )
    }
}
