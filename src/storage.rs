//! Persistence of trainer-produced model blobs.

use crate::error::{AppResult, RoverError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Destination for model blobs returned in trainer replies. Blobs are opaque
/// to the bridge; only their names carry meaning.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save(&self, name: &str, blob: Bytes) -> AppResult<()>;
}

/// Stores each blob as `<dir>/<name>.bin`, overwriting any previous version.
pub struct FsModelStore {
    dir: PathBuf,
}

impl FsModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Model names come off the wire, so path separators and parent
    /// references are rejected rather than sanitized.
    fn blob_path(&self, name: &str) -> AppResult<PathBuf> {
        if name.is_empty()
            || name.contains(['/', '\\'])
            || name.contains("..")
            || name.starts_with('.')
        {
            return Err(RoverError::Precondition(format!(
                "invalid model name '{name}'"
            )));
        }
        Ok(self.dir.join(format!("{name}.bin")))
    }
}

#[async_trait]
impl ModelStore for FsModelStore {
    async fn save(&self, name: &str, blob: Bytes) -> AppResult<()> {
        let path = self.blob_path(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, &blob).await?;
        debug!(model = name, bytes = blob.len(), path = %path.display(), "model blob saved");
        Ok(())
    }
}

/// Discards every blob. Useful for trials that only exercise the transport.
pub struct NullModelStore;

#[async_trait]
impl ModelStore for NullModelStore {
    async fn save(&self, name: &str, blob: Bytes) -> AppResult<()> {
        warn!(model = name, bytes = blob.len(), "model blob discarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_blob_under_model_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());

        store
            .save("actor", Bytes::from_static(b"\x01\x02\x03"))
            .await
            .unwrap();

        let written = std::fs::read(dir.path().join("actor.bin")).unwrap();
        assert_eq!(written, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn overwrites_existing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());

        store.save("critic", Bytes::from_static(b"old")).await.unwrap();
        store.save("critic", Bytes::from_static(b"new")).await.unwrap();

        let written = std::fs::read(dir.path().join("critic.bin")).unwrap();
        assert_eq!(written, b"new");
    }

    #[tokio::test]
    async fn rejects_path_traversal_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());

        for name in ["../escape", "a/b", "a\\b", ".hidden", ""] {
            let err = store.save(name, Bytes::new()).await.unwrap_err();
            assert!(matches!(err, RoverError::Precondition(_)), "{name}");
        }
    }
}
