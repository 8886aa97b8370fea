use chrono::{DateTime, TimeZone, Utc};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Timestamp of the latest source entry already published.
///
/// Only ever moves forward: [`Watermark::advance`] ignores timestamps that are not
/// strictly newer than the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Watermark before any possible entry, so everything present counts as new.
    pub fn epoch() -> Self {
        Self(Utc.timestamp_opt(0, 0).single().unwrap_or_default())
    }

    pub fn get(&self) -> DateTime<Utc> {
        self.0
    }

    /// Whether an entry with this timestamp has not been handled yet.
    pub fn is_newer(&self, at: DateTime<Utc>) -> bool {
        at > self.0
    }

    /// Moves the watermark to `at` if it is newer. Returns whether it moved.
    pub fn advance(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_newer(at) {
            self.0 = at;
            true
        } else {
            false
        }
    }
}

impl Display for Watermark {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0.to_rfc3339())
    }
}
