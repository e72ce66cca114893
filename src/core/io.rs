use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// Durable text store used by the save steps.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Writes `content`, creating the parent directory first when missing.
    async fn write(&self, path: &str, content: &str) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
}

pub struct NativeStorage;

impl NativeStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn write(&self, path: &str, content: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path))?;
        log::debug!("Wrote {} bytes to {}", content.len(), path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("Failed to check {}", path))
    }
}
