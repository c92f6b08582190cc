//! Metadata and snapshot storage backends.

pub mod memory;
pub mod file;
pub mod fs;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use std::fmt;

use crate::types::{Tenant, TenantId, Webhook};

/// Kind of record held by a metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Tenant records.
    Tenant,
    /// Webhook subscription records.
    Webhook,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant => write!(f, "tenant"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

/// Source of tenant and webhook records.
///
/// Each call returns every record of its kind; there is no paging.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch all tenants.
    async fn list_tenants(&self) -> Result<Vec<Tenant>, Self::Error>;

    /// Fetch all webhooks.
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, Self::Error>;
}

/// Blob storage holding document snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the blob at `path`. Fails if it does not exist.
    async fn read(&self, path: &str) -> Result<Vec<u8>, Self::Error>;
}

/// Logical snapshot key for a tenant's named document.
pub fn snapshot_path(tenant_id: &TenantId, name: &str) -> String {
    format!("{}/spec/{}", tenant_id, name)
}

/// Error type for snapshot reads shared by the bundled snapshot stores.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// No blob at this path.
    #[error("Snapshot not found: {0}")]
    NotFound(String),
    /// Path escapes the store root or is otherwise unusable.
    #[error("Invalid snapshot path: {0}")]
    InvalidPath(String),
    /// Underlying I/O failure.
    #[error("Snapshot I/O error at {path}: {source}")]
    Io {
        /// Path being read.
        path: String,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
}

pub use memory::{InMemoryMetadataStore, InMemorySnapshotStore, InMemoryError};
pub use file::{FileMetadataStore, FileStoreError};
pub use fs::FsSnapshotStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresMetadataStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_path_layout() {
        assert_eq!(
            snapshot_path(&TenantId::from("tenant-1"), "1234567"),
            "tenant-1/spec/1234567"
        );
    }
}
