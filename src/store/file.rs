//! File-backed metadata store.
//!
//! The file is YAML (JSON also parses) with two top-level lists:
//!
//! ```yaml
//! tenants:
//!   - id: tenant-1
//!     name: my-company
//!     contact_email: john@my-company.com
//!     callback_url: https://hooks.my-company.com/oas
//!     created_at: 2024-01-01T00:00:00Z
//! webhooks:
//!   - name: Andes
//!     tenant_id: tenant-1
//!     spec_url: https://api.my-company.com/openapi.yaml
//!     snapshot_name: "1234567"
//!     created_at: 2024-01-01T00:00:00Z
//! ```
//!
//! The file is re-read on every listing so a run always sees one consistent
//! version of it per call.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde::Deserialize;

use crate::types::{Tenant, Webhook};
use super::MetadataStore;

/// Error type for the file metadata store.
#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    /// File could not be read.
    #[error("Failed to read metadata file {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
    /// File contents are not a valid metadata document.
    #[error("Failed to parse metadata file {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Cause.
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    tenants: Vec<Tenant>,
    #[serde(default)]
    webhooks: Vec<Webhook>,
}

/// Metadata store reading tenants and webhooks from a YAML file.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    path: PathBuf,
}

impl FileMetadataStore {
    /// Create a store over `path`. The file is not touched until the first listing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<MetadataFile, FileStoreError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FileStoreError::Read {
                path: self.path.clone(),
                source,
            })?;
        if contents.trim().is_empty() {
            return Ok(MetadataFile::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| FileStoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    type Error = FileStoreError;

    async fn list_tenants(&self) -> Result<Vec<Tenant>, Self::Error> {
        Ok(self.load().await?.tenants)
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>, Self::Error> {
        Ok(self.load().await?.webhooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const METADATA: &str = r#"
tenants:
  - id: tenant-1
    name: my-company
    contact_email: john@my-company.com
    callback_url: http://127.0.0.1:9/hook
    created_at: 2024-01-01T00:00:00Z
webhooks:
  - name: Andes
    tenant_id: tenant-1
    spec_url: http://127.0.0.1:9/openapi.yaml
    snapshot_name: "1234567"
    created_at: 2024-01-01T00:00:00Z
"#;

    #[tokio::test]
    async fn test_reads_yaml_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(METADATA.as_bytes()).unwrap();

        let store = FileMetadataStore::new(file.path());
        let tenants = store.list_tenants().await.unwrap();
        let webhooks = store.list_webhooks().await.unwrap();

        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].id.as_str(), "tenant-1");
        assert_eq!(tenants[0].alert_channel, None);
        assert_eq!(webhooks[0].snapshot_name, "1234567");
        assert_eq!(webhooks[0].tenant_id, tenants[0].id);
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMetadataStore::new(dir.path().join("absent.yaml"));
        assert!(matches!(
            store.list_webhooks().await,
            Err(FileStoreError::Read { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"tenants: [oops").unwrap();

        let store = FileMetadataStore::new(file.path());
        assert!(matches!(
            store.list_tenants().await,
            Err(FileStoreError::Parse { .. })
        ));
    }
}
