//! Signage CMS resources created or looked up while publishing a file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// Media item registered in the CMS library. Never deleted by Marquee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub media_id: i64,
    pub name: String,
}

/// Full-screen layout wrapping exactly one media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    pub layout_id: i64,
    /// Campaign the CMS creates alongside the layout; schedules point at it.
    pub campaign_id: i64,
    pub name: String,
}

/// Scheduling target resolved from the configured display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayGroupRef {
    pub display_group_id: i64,
    pub display_id: i64,
    pub display_name: String,
}

/// A schedule event bound to a display group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub event_id: i64,
    pub name: String,
    pub is_priority: bool,
}

/// Naming convention that tags schedule events and layouts created by Marquee,
/// distinguishing them from manually authored content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleMarker {
    schedule_prefix: String,
    layout_prefix: String,
}

impl Default for ScheduleMarker {
    fn default() -> Self {
        Self::new("Auto-scheduled", "Auto-layout")
    }
}

impl ScheduleMarker {
    pub fn new(schedule_prefix: impl Into<String>, layout_prefix: impl Into<String>) -> Self {
        Self {
            schedule_prefix: schedule_prefix.into(),
            layout_prefix: layout_prefix.into(),
        }
    }

    /// Event name for an auto-created schedule on `display_name`.
    pub fn schedule_name(&self, display_name: &str) -> String {
        format!("{}: {}", self.schedule_prefix, display_name)
    }

    /// Layout name derived from the source file so repeated runs are traceable.
    pub fn layout_name(&self, display_name: &str, source_name: &str) -> String {
        format!("{}: {} - {}", self.layout_prefix, display_name, source_name)
    }

    /// Whether a schedule event was created by Marquee.
    pub fn is_auto_schedule(&self, event_name: &str) -> bool {
        event_name
            .strip_prefix(self.schedule_prefix.as_str())
            .map(|rest| rest.starts_with(':'))
            .unwrap_or(false)
    }
}

/// Bearer credential for the CMS. Never used past `expires_at`.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AuthToken")
            .field("access_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn marker_recognises_only_its_own_events() {
        let marker = ScheduleMarker::default();
        let name = marker.schedule_name("Lobby");
        assert_eq!(name, "Auto-scheduled: Lobby");
        assert!(marker.is_auto_schedule(&name));
        assert!(marker.is_auto_schedule("Auto-scheduled: Other screen"));
        assert!(!marker.is_auto_schedule("Auto-scheduledX: Lobby"));
        assert!(!marker.is_auto_schedule("Christmas campaign"));
    }

    #[test]
    fn layout_name_includes_source_file() {
        let marker = ScheduleMarker::new("Auto", "Layout");
        assert_eq!(marker.layout_name("Lobby", "menu.png"), "Layout: Lobby - menu.png");
    }

    #[test]
    fn token_expiry_is_inclusive() {
        let now = Utc::now();
        let token = AuthToken {
            access_token: "secret".to_string(),
            expires_at: now,
        };
        assert!(token.is_expired(now));
        assert!(!token.is_expired(now - Duration::seconds(1)));
        assert!(!format!("{:?}", token).contains("secret"));
    }
}
