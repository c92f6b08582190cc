//! In-memory stores for testing.

use std::collections::BTreeMap;
use async_trait::async_trait;

use crate::types::{Tenant, Webhook};
use super::{MetadataStore, RecordKind, SnapshotError, SnapshotStore};

/// Error type for in-memory metadata store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Listing was configured to fail.
    #[error("Listing {0} records is unavailable")]
    Unavailable(RecordKind),
}

/// In-memory metadata store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    tenants: Vec<Tenant>,
    webhooks: Vec<Webhook>,
    failing: Option<RecordKind>,
}

impl InMemoryMetadataStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tenant.
    pub fn add_tenant(&mut self, tenant: Tenant) {
        self.tenants.push(tenant);
    }

    /// Add a webhook.
    pub fn add_webhook(&mut self, webhook: Webhook) {
        self.webhooks.push(webhook);
    }

    /// Make listings of `kind` fail.
    pub fn fail_listing(mut self, kind: RecordKind) -> Self {
        self.failing = Some(kind);
        self
    }

    fn check(&self, kind: RecordKind) -> Result<(), InMemoryError> {
        match self.failing {
            Some(failing) if failing == kind => Err(InMemoryError::Unavailable(kind)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    type Error = InMemoryError;

    async fn list_tenants(&self) -> Result<Vec<Tenant>, Self::Error> {
        self.check(RecordKind::Tenant)?;
        Ok(self.tenants.clone())
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>, Self::Error> {
        self.check(RecordKind::Webhook)?;
        Ok(self.webhooks.clone())
    }
}

/// In-memory snapshot store keyed by logical path.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl InMemorySnapshotStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a blob.
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.blobs.insert(path.into(), bytes.into());
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    type Error = SnapshotError;

    async fn read(&self, path: &str) -> Result<Vec<u8>, Self::Error> {
        self.blobs
            .get(path)
            .cloned()
            .ok_or_else(|| SnapshotError::NotFound(path.to_string()))
    }
}
