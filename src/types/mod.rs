//! Core records flowing through a reconciliation run.

pub mod tenant;
pub mod webhook;
pub mod incompatibility;
pub mod payload;

pub use tenant::{Tenant, TenantId, TenantDirectory};
pub use webhook::Webhook;
pub use incompatibility::{Incompatibility, Level};
pub use payload::{
    DeliveryPayload, WebhookBreakingChanges, LegacyPayload, PayloadShape,
    WEBHOOKS_KEY, LEGACY_BREAKING_CHANGES_KEY,
};
