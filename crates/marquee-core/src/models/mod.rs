//! Domain models
//!
//! Snapshots of remote state exchanged between the watcher, the transfer pipeline,
//! the signage workflow and the control loop.

pub mod signage;
pub mod source_entry;
pub mod watermark;

pub use signage::{AuthToken, DisplayGroupRef, MediaRef, Presentation, ScheduleEntry, ScheduleMarker};
pub use source_entry::SourceEntry;
pub use watermark::Watermark;
