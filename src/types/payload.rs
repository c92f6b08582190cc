//! Delivery payloads posted to tenant callbacks.
//!
//! ## Wire Format
//!
//! ```json
//! {"webhooks": [{"name": "orders-api", "breaking_changes": [ ... ]}]}
//! ```
//!
//! The flat legacy form `{"breaking-changes": [ ... ]}` carries no subscription
//! name and is only produced when [`PayloadShape::Legacy`] is selected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::incompatibility::Incompatibility;

/// Envelope key of the canonical payload.
pub const WEBHOOKS_KEY: &str = "webhooks";

/// Key of the legacy flat payload.
pub const LEGACY_BREAKING_CHANGES_KEY: &str = "breaking-changes";

/// Breaking changes attributed to one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookBreakingChanges {
    /// Subscription name.
    pub name: String,
    /// Changes in evaluator order.
    pub breaking_changes: Vec<Incompatibility>,
}

/// Canonical delivery payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    /// One entry per subscription with changes.
    pub webhooks: Vec<WebhookBreakingChanges>,
}

impl DeliveryPayload {
    /// Payload for a single subscription.
    pub fn single(name: impl Into<String>, changes: &[Incompatibility]) -> Self {
        Self {
            webhooks: vec![WebhookBreakingChanges {
                name: name.into(),
                breaking_changes: changes.to_vec(),
            }],
        }
    }
}

/// Legacy payload without subscription attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPayload {
    /// Changes in evaluator order.
    #[serde(rename = "breaking-changes")]
    pub breaking_changes: Vec<Incompatibility>,
}

/// Which payload body the notifier sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadShape {
    /// `{"webhooks": [{"name", "breaking_changes"}]}`
    #[default]
    Envelope,
    /// `{"breaking-changes": [...]}`
    Legacy,
}

impl PayloadShape {
    /// Serialize changes for one subscription in this shape.
    pub fn encode(
        &self,
        subscription_name: &str,
        changes: &[Incompatibility],
    ) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Envelope => serde_json::to_vec(&DeliveryPayload::single(subscription_name, changes)),
            Self::Legacy => serde_json::to_vec(&LegacyPayload {
                breaking_changes: changes.to_vec(),
            }),
        }
    }
}

impl FromStr for PayloadShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            WEBHOOKS_KEY | "envelope" => Ok(Self::Envelope),
            LEGACY_BREAKING_CHANGES_KEY | "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown payload shape '{other}'")),
        }
    }
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Envelope => f.write_str(WEBHOOKS_KEY),
            Self::Legacy => f.write_str(LEGACY_BREAKING_CHANGES_KEY),
        }
    }
}
