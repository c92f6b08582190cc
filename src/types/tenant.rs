//! Tenant records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a tenant in the metadata store.
///
/// Ordered so tenant directories iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A tenant: the owner of webhooks and of the snapshot namespace they live in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique tenant id.
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub contact_email: String,
    /// Endpoint breaking-change reports are posted to.
    #[serde(default)]
    pub callback_url: Option<String>,
    /// Optional chat channel for alerts.
    #[serde(default)]
    pub alert_channel: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a tenant without callback or alert channel.
    pub fn new(id: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            contact_email: String::new(),
            callback_url: None,
            alert_channel: None,
            created_at: Utc::now(),
        }
    }

    /// Set the callback URL.
    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Set the contact email.
    pub fn with_contact_email(mut self, email: impl Into<String>) -> Self {
        self.contact_email = email.into();
        self
    }

    /// The configured callback, treating a blank value as unset.
    pub fn callback(&self) -> Option<&str> {
        self.callback_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Read-only lookup of tenants by id, built once per run.
#[derive(Debug, Clone, Default)]
pub struct TenantDirectory {
    tenants: BTreeMap<TenantId, Tenant>,
}

impl TenantDirectory {
    /// Build a directory from a list of tenant records.
    pub fn from_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        Self {
            tenants: tenants.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Look up a tenant.
    pub fn get(&self, id: &TenantId) -> Option<&Tenant> {
        self.tenants.get(id)
    }

    /// Number of tenants.
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_callback_is_unset() {
        let tenant = Tenant::new("t1", "acme").with_callback("   ");
        assert_eq!(tenant.callback(), None);

        let tenant = Tenant::new("t1", "acme").with_callback("http://hooks.acme.test/oas");
        assert_eq!(tenant.callback(), Some("http://hooks.acme.test/oas"));
    }

    #[test]
    fn test_directory_lookup() {
        let dir = TenantDirectory::from_tenants(vec![
            Tenant::new("t1", "acme"),
            Tenant::new("t2", "globex"),
        ]);
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.get(&TenantId::from("t2")).map(|t| t.name.as_str()), Some("globex"));
        assert!(dir.get(&TenantId::from("t3")).is_none());
    }

    #[test]
    fn test_tenant_id_serializes_as_string() {
        let json = serde_json::to_string(&TenantId::from("tenant-1")).unwrap();
        assert_eq!(json, "\"tenant-1\"");
    }
}
