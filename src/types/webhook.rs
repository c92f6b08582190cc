//! Webhook subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tenant::TenantId;

/// A tenant's request to be told when a live API document breaks
/// compatibility with a stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    /// Subscription name, echoed in delivery payloads.
    pub name: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Location of the live document.
    pub spec_url: String,
    /// Name of the stored snapshot in the tenant's namespace.
    pub snapshot_name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Create a webhook.
    pub fn new(
        name: impl Into<String>,
        tenant_id: impl Into<TenantId>,
        spec_url: impl Into<String>,
        snapshot_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            tenant_id: tenant_id.into(),
            spec_url: spec_url.into(),
            snapshot_name: snapshot_name.into(),
            created_at: Utc::now(),
        }
    }
}
