//! # oas-refresh
//!
//! Detects breaking changes in published OpenAPI documents and tells the
//! tenants who subscribed to them.
//!
//! For every webhook subscription, the stored snapshot of an API document is
//! compared with the live document. When the live version breaks clients of
//! the snapshot, the ordered list of incompatibilities is posted to the
//! tenant's callback URL.
//!
//! ## Architecture
//!
//! ```text
//! MetadataStore ──► ReconciliationEngine ──► Pipeline (per webhook, bounded pool)
//!                                               │
//!                     SnapshotStore ──► DocumentLoader ◄── live URI
//!                                               │
//!                               IncompatibilityEvaluator ──► Notifier ──► callback
//! ```
//!
//! ## Guarantees
//!
//! - Only tenant or webhook enumeration failures fail a run
//! - A subscription failure never affects another subscription
//! - Identical documents produce no report and no delivery
//! - Incompatibilities are reported in a stable order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod store;
pub mod canonical;
pub mod document;
pub mod evaluator;
pub mod notifier;
pub mod pipeline;
pub mod engine;
pub mod config;

// Re-exports
pub use types::{
    Tenant, TenantId, TenantDirectory, Webhook, Incompatibility, Level,
    DeliveryPayload, WebhookBreakingChanges, LegacyPayload, PayloadShape,
};
pub use store::{
    MetadataStore, SnapshotStore, RecordKind, SnapshotError, snapshot_path,
    InMemoryMetadataStore, InMemorySnapshotStore, FileMetadataStore, FsSnapshotStore,
};
pub use document::{Document, DocumentLoader, LoadError, OpenApiLoader, LoaderConfig, validate_locator};
pub use evaluator::{IncompatibilityEvaluator, RuleSetEvaluator, EvaluatorError};
pub use notifier::{Notifier, WebhookNotifier, DeliveryStatus, DeliveryError};
pub use pipeline::{Pipeline, Stage, StageTimeouts, SubscriptionError, SubscriptionOutcome};
pub use engine::{ReconciliationEngine, EngineConfig, EngineError, RunReport};
pub use config::{RefreshConfig, ConfigError};

#[cfg(feature = "postgres")]
pub use store::postgres::{PostgresMetadataStore, PostgresConfig, PostgresError};
