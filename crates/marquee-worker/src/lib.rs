//! Marquee Worker Library
//!
//! The polling side of Marquee: [`RemoteDirectoryWatcher`] finds files newer than the
//! watermark, [`ContentTransferPipeline`] downloads each one into its own scratch
//! directory, and [`ControlLoop`] drives both plus the publish destination, one file
//! at a time, alternating between polling and sleeping until shutdown.

pub mod control_loop;
pub mod pipeline;
pub mod watcher;
pub mod watermark_store;

#[cfg(test)]
pub(crate) mod test_support;

pub use control_loop::{ControlLoop, CycleStats, LoopState, SeedPolicy};
pub use pipeline::{ContentTransferPipeline, TransferResult};
pub use watcher::RemoteDirectoryWatcher;
pub use watermark_store::{create_watermark_store, FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};
