//! Reconciliation engine: one pass over every webhook subscription.
//!
//! ## Failure Model
//!
//! Only the two bulk metadata fetches can fail a run. Every subscription-level
//! problem is logged, tallied in the [`RunReport`] and otherwise ignored, so
//! one broken tenant never hides another tenant's breaking changes.

use std::sync::Arc;
use std::time::{Duration, Instant};
use futures::stream::{self, StreamExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::document::DocumentLoader;
use crate::evaluator::IncompatibilityEvaluator;
use crate::notifier::Notifier;
use crate::pipeline::{Pipeline, StageTimeouts, SubscriptionOutcome};
use crate::store::{MetadataStore, RecordKind, SnapshotStore};
use crate::types::TenantDirectory;

/// Error type for a whole run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Tenant or webhook enumeration failed.
    #[error("Failed to fetch {kind} records: {message}")]
    MetadataFetch {
        /// Which listing failed.
        kind: RecordKind,
        /// Store error.
        message: String,
    },
}

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pipelines in flight at once (default: 4, 1 = sequential).
    pub concurrency: usize,
    /// Per-stage deadlines.
    pub timeouts: StageTimeouts,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeouts: StageTimeouts::default(),
        }
    }
}

/// Tally of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Correlation id of the run.
    pub run_id: Uuid,
    /// Tenants loaded.
    pub tenants: usize,
    /// Webhooks attempted.
    pub webhooks: usize,
    /// Compatible documents.
    pub no_change: usize,
    /// Reports accepted by a callback.
    pub delivered: usize,
    /// Breaking changes for tenants without callback.
    pub no_callback: usize,
    /// Reports whose delivery failed.
    pub delivery_failed: usize,
    /// Subscriptions that stopped before evaluation completed.
    pub skipped: usize,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl RunReport {
    /// Count one outcome.
    pub fn record(&mut self, outcome: &SubscriptionOutcome) {
        match outcome {
            SubscriptionOutcome::NoChange => self.no_change += 1,
            SubscriptionOutcome::Delivered { .. } => self.delivered += 1,
            SubscriptionOutcome::NoCallback { .. } => self.no_callback += 1,
            SubscriptionOutcome::DeliveryFailed { .. } => self.delivery_failed += 1,
            SubscriptionOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    /// Subscriptions that ran to completion, delivery failures included.
    pub fn processed(&self) -> usize {
        self.no_change + self.delivered + self.no_callback + self.delivery_failed
    }
}

/// Drives the pipeline for every webhook in the metadata store.
pub struct ReconciliationEngine<M, S, L, E, N> {
    metadata: Arc<M>,
    pipeline: Pipeline<S, L, E, N>,
    config: EngineConfig,
}

impl<M, S, L, E, N> ReconciliationEngine<M, S, L, E, N>
where
    M: MetadataStore,
    S: SnapshotStore,
    L: DocumentLoader,
    E: IncompatibilityEvaluator,
    N: Notifier,
{
    /// Wire up an engine from explicitly constructed collaborators.
    pub fn new(
        metadata: Arc<M>,
        snapshots: Arc<S>,
        loader: Arc<L>,
        evaluator: Arc<E>,
        notifier: Arc<N>,
        config: EngineConfig,
    ) -> Self {
        Self {
            metadata,
            pipeline: Pipeline::new(snapshots, loader, evaluator, notifier, config.timeouts),
            config,
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one full pass.
    ///
    /// Returns `Ok` once every webhook was attempted, whatever the individual
    /// outcomes were.
    pub async fn run(&self) -> Result<RunReport, EngineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("reconcile", %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunReport, EngineError> {
        let start = Instant::now();

        let tenants = self.metadata.list_tenants().await.map_err(|e| {
            tracing::error!(kind = %RecordKind::Tenant, error = %e, "Failed to list tenants");
            EngineError::MetadataFetch {
                kind: RecordKind::Tenant,
                message: e.to_string(),
            }
        })?;
        let directory = TenantDirectory::from_tenants(tenants);

        let webhooks = self.metadata.list_webhooks().await.map_err(|e| {
            tracing::error!(kind = %RecordKind::Webhook, error = %e, "Failed to list webhooks");
            EngineError::MetadataFetch {
                kind: RecordKind::Webhook,
                message: e.to_string(),
            }
        })?;

        tracing::info!(
            tenants = directory.len(),
            webhooks = webhooks.len(),
            concurrency = self.config.concurrency,
            "Starting reconciliation"
        );

        let outcomes: Vec<SubscriptionOutcome> = stream::iter(webhooks.iter())
            .map(|webhook| self.pipeline.process(webhook, &directory))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = RunReport {
            run_id,
            tenants: directory.len(),
            webhooks: webhooks.len(),
            ..RunReport::default()
        };
        for outcome in &outcomes {
            report.record(outcome);
        }
        report.elapsed = start.elapsed();

        tracing::info!(
            webhooks = report.webhooks,
            no_change = report.no_change,
            delivered = report.delivered,
            no_callback = report.no_callback,
            delivery_failed = report.delivery_failed,
            skipped = report.skipped,
            latency_ms = report.elapsed.as_millis() as u64,
            "Reconciliation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{LoaderConfig, OpenApiLoader};
    use crate::evaluator::RuleSetEvaluator;
    use crate::notifier::WebhookNotifier;
    use crate::store::{InMemoryMetadataStore, InMemorySnapshotStore};
    use crate::types::{Tenant, Webhook};

    type TestEngine = ReconciliationEngine<
        InMemoryMetadataStore,
        InMemorySnapshotStore,
        OpenApiLoader,
        RuleSetEvaluator,
        WebhookNotifier,
    >;

    fn engine(metadata: InMemoryMetadataStore) -> TestEngine {
        ReconciliationEngine::new(
            Arc::new(metadata),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(OpenApiLoader::new(LoaderConfig::default()).unwrap()),
            Arc::new(RuleSetEvaluator::new()),
            Arc::new(WebhookNotifier::new(reqwest::Client::new())),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_run() {
        let report = engine(InMemoryMetadataStore::new()).run().await.unwrap();
        assert_eq!(report.webhooks, 0);
        assert_eq!(report.processed(), 0);
    }

    #[tokio::test]
    async fn test_metadata_failures_are_fatal() {
        for kind in [RecordKind::Tenant, RecordKind::Webhook] {
            let metadata = InMemoryMetadataStore::new().fail_listing(kind);
            let err = engine(metadata).run().await.unwrap_err();
            assert!(matches!(err, EngineError::MetadataFetch { kind: k, .. } if k == kind));
        }
    }

    #[tokio::test]
    async fn test_subscription_failures_do_not_fail_run() {
        let mut metadata = InMemoryMetadataStore::new();
        metadata.add_tenant(Tenant::new("t1", "One"));
        // Unknown tenant, then a missing snapshot.
        metadata.add_webhook(Webhook::new("a", "ghost", "https://api.example.test/a.json", "a"));
        metadata.add_webhook(Webhook::new("b", "t1", "https://api.example.test/b.json", "b"));

        let report = engine(metadata).run().await.unwrap();
        assert_eq!(report.webhooks, 2);
        assert_eq!(report.skipped, 2);
        assert_ne!(report.run_id, Uuid::nil());
    }

    #[test]
    fn test_report_tally() {
        let mut report = RunReport::default();
        report.record(&SubscriptionOutcome::NoChange);
        report.record(&SubscriptionOutcome::Delivered { changes: 2, status: 201 });
        report.record(&SubscriptionOutcome::DeliveryFailed {
            changes: 1,
            error: "HTTP 500".to_string(),
        });
        assert_eq!(report.processed(), 3);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.delivery_failed, 1);
    }
}
