//! Marquee Source Library
//!
//! This crate provides the content source abstraction the watcher and the transfer
//! pipeline work against, plus the Nextcloud (WebDAV) implementation.
//!
//! # Paths
//!
//! Entry paths are relative to the authenticated user's file root
//! (`/remote.php/dav/files/{user}/`), decoded, and without a leading `/`.
//! Implementations re-encode them when building request URLs.

pub mod factory;
pub(crate) mod propfind;
pub mod traits;
pub mod webdav;

// Re-export commonly used types
pub use factory::create_source;
pub use marquee_core::SourceProvider;
pub use traits::{ContentSource, SourceError, SourceResult};
pub use webdav::NextcloudSource;
