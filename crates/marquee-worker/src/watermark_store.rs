//! Where the watermark lives between cycles (and optionally between runs).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::{Config, Watermark};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Storage for the single watermark scalar.
///
/// `save` is only called after a file has been fully published, never mid-file.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// The stored watermark, if one was ever saved.
    async fn load(&self) -> Result<Option<Watermark>>;

    async fn save(&self, watermark: &Watermark) -> Result<()>;
}

/// Process-memory store: a restart starts from the seeding policy again.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    value: Mutex<Option<Watermark>>,
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self) -> Result<Option<Watermark>> {
        let value = self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("watermark lock poisoned"))?;
        Ok(*value)
    }

    async fn save(&self, watermark: &Watermark) -> Result<()> {
        let mut value = self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("watermark lock poisoned"))?;
        *value = Some(*watermark);
        Ok(())
    }
}

/// Single-line RFC 3339 file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "watermark".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn load(&self) -> Result<Option<Watermark>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read watermark file {}", self.path.display()))
            }
        };

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let at = DateTime::parse_from_rfc3339(trimmed)
            .with_context(|| format!("Invalid watermark in {}: '{}'", self.path.display(), trimmed))?;
        Ok(Some(Watermark::new(at.with_timezone(&Utc))))
    }

    async fn save(&self, watermark: &Watermark) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, format!("{}\n", watermark))
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Create the watermark store selected by `state.watermark_file`
pub fn create_watermark_store(config: &Config) -> Arc<dyn WatermarkStore> {
    match &config.state.watermark_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "Persisting watermark to file");
            Arc::new(FileWatermarkStore::new(path.clone()))
        }
        None => Arc::new(MemoryWatermarkStore::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::at;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryWatermarkStore::default();
        assert_eq!(store.load().await.unwrap(), None);
        store.save(&Watermark::new(at(10))).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(Watermark::new(at(10))));
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("watermark");

        let store = FileWatermarkStore::new(&path);
        assert_eq!(store.load().await.unwrap(), None);
        store.save(&Watermark::new(at(42))).await.unwrap();

        let reopened = FileWatermarkStore::new(&path);
        assert_eq!(reopened.load().await.unwrap(), Some(Watermark::new(at(42))));
        assert!(!store.temp_path().exists());
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("2024-05-01T12:00:42"));
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermark");
        std::fs::write(&path, "yesterday").unwrap();

        let err = FileWatermarkStore::new(&path).load().await.unwrap_err();
        assert!(err.to_string().contains("Invalid watermark"));
    }
}
