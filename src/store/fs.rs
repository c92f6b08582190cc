//! Filesystem snapshot store.

use std::path::{Component, Path, PathBuf};
use async_trait::async_trait;

use super::{SnapshotError, SnapshotStore};

/// Snapshot store mapping logical paths onto files below a root directory.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical path to a file below the root.
    ///
    /// Only plain relative components are accepted.
    fn resolve(&self, path: &str) -> Result<PathBuf, SnapshotError> {
        let relative = Path::new(path);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !plain {
            return Err(SnapshotError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    type Error = SnapshotError;

    async fn read(&self, path: &str) -> Result<Vec<u8>, Self::Error> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SnapshotError::NotFound(path.to_string()))
            }
            Err(source) => Err(SnapshotError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("t1/spec")).unwrap();
        std::fs::write(dir.path().join("t1/spec/v1"), b"openapi: 3.0.3").unwrap();

        let store = FsSnapshotStore::new(dir.path());
        assert_eq!(store.read("t1/spec/v1").await.unwrap(), b"openapi: 3.0.3");
    }

    #[tokio::test]
    async fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        assert!(matches!(
            store.read("t1/spec/v1").await,
            Err(SnapshotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        for path in ["../etc/passwd", "/etc/passwd", "t1/../../x", ""] {
            assert!(
                matches!(store.read(path).await, Err(SnapshotError::InvalidPath(_))),
                "path {path:?} should be rejected"
            );
        }
    }
}
