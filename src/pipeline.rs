//! Per-subscription pipeline.
//!
//! ```text
//! tenant lookup → snapshot read+parse → locator check → live load → evaluate → notify
//! ```
//!
//! Stages run strictly in order. Every failure is scoped to the subscription
//! and comes back as [`SubscriptionOutcome::Skipped`]; nothing propagates to
//! the engine.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::document::{validate_locator, DocumentLoader};
use crate::evaluator::IncompatibilityEvaluator;
use crate::notifier::{DeliveryStatus, Notifier};
use crate::store::{snapshot_path, SnapshotStore};
use crate::types::{TenantDirectory, TenantId, Webhook};

/// Pipeline stage, used in errors and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Tenant lookup.
    Tenant,
    /// Snapshot read and parse.
    Snapshot,
    /// Live document validation and load.
    Live,
    /// Incompatibility evaluation.
    Evaluation,
    /// Callback delivery.
    Delivery,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tenant => "tenant",
            Self::Snapshot => "snapshot",
            Self::Live => "live",
            Self::Evaluation => "evaluation",
            Self::Delivery => "delivery",
        };
        f.write_str(name)
    }
}

/// Deadlines for each external step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    /// Snapshot read and parse (default: 30s).
    pub snapshot: Duration,
    /// Live fetch and parse, external references included (default: 30s).
    pub live: Duration,
    /// Evaluation (default: 60s).
    pub evaluation: Duration,
    /// Callback delivery (default: 15s).
    pub delivery: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            snapshot: Duration::from_secs(30),
            live: Duration::from_secs(30),
            evaluation: Duration::from_secs(60),
            delivery: Duration::from_secs(15),
        }
    }
}

/// Why a subscription was skipped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriptionError {
    /// Webhook references an unknown tenant.
    #[error("Tenant not found: {0}")]
    TenantNotFound(TenantId),
    /// Snapshot blob could not be read.
    #[error("Failed to read snapshot {path}: {message}")]
    SnapshotRead {
        /// Snapshot key.
        path: String,
        /// Store error.
        message: String,
    },
    /// Snapshot blob is not a usable document.
    #[error("Failed to parse snapshot {path}: {message}")]
    SnapshotParse {
        /// Snapshot key.
        path: String,
        /// Loader error.
        message: String,
    },
    /// Live locator rejected before fetching.
    #[error("Invalid live document URI '{uri}': {message}")]
    InvalidUri {
        /// Locator as configured.
        uri: String,
        /// Validation error.
        message: String,
    },
    /// Live document could not be fetched or parsed.
    #[error("Failed to load live document {uri}: {message}")]
    LiveLoad {
        /// Locator.
        uri: String,
        /// Loader error.
        message: String,
    },
    /// Evaluator failed.
    #[error("Evaluation failed: {0}")]
    Evaluation(String),
    /// A stage missed its deadline.
    #[error("Stage {stage} timed out after {after:?}")]
    Timeout {
        /// Stage that timed out.
        stage: Stage,
        /// Deadline.
        after: Duration,
    },
}

impl SubscriptionError {
    /// Stage the failure happened in.
    pub fn stage(&self) -> Stage {
        match self {
            Self::TenantNotFound(_) => Stage::Tenant,
            Self::SnapshotRead { .. } | Self::SnapshotParse { .. } => Stage::Snapshot,
            Self::InvalidUri { .. } | Self::LiveLoad { .. } => Stage::Live,
            Self::Evaluation(_) => Stage::Evaluation,
            Self::Timeout { stage, .. } => *stage,
        }
    }
}

/// What happened to one subscription.
#[derive(Debug, Clone)]
pub enum SubscriptionOutcome {
    /// Documents are compatible; nothing sent.
    NoChange,
    /// Report accepted by the callback.
    Delivered {
        /// Number of reported changes.
        changes: usize,
        /// Callback status.
        status: u16,
    },
    /// Breaking changes found but the tenant has no callback.
    NoCallback {
        /// Number of changes found.
        changes: usize,
    },
    /// Breaking changes found, delivery failed. The subscription still counts as processed.
    DeliveryFailed {
        /// Number of changes found.
        changes: usize,
        /// Delivery error.
        error: String,
    },
    /// Processing stopped early.
    Skipped(SubscriptionError),
}

/// Runs the stages for one subscription using shared collaborators.
pub struct Pipeline<S, L, E, N> {
    snapshots: Arc<S>,
    loader: Arc<L>,
    evaluator: Arc<E>,
    notifier: Arc<N>,
    timeouts: StageTimeouts,
}

impl<S, L, E, N> Pipeline<S, L, E, N>
where
    S: SnapshotStore,
    L: DocumentLoader,
    E: IncompatibilityEvaluator,
    N: Notifier,
{
    /// Create a pipeline.
    pub fn new(
        snapshots: Arc<S>,
        loader: Arc<L>,
        evaluator: Arc<E>,
        notifier: Arc<N>,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            snapshots,
            loader,
            evaluator,
            notifier,
            timeouts,
        }
    }

    /// Process one webhook. Never fails; failures are part of the outcome.
    pub async fn process(&self, webhook: &Webhook, tenants: &TenantDirectory) -> SubscriptionOutcome {
        let span = tracing::info_span!(
            "subscription",
            tenant_id = %webhook.tenant_id,
            webhook = %webhook.name,
        );

        async {
            let outcome = match self.run_stages(webhook, tenants).await {
                Ok(outcome) => outcome,
                Err(e) => SubscriptionOutcome::Skipped(e),
            };
            log_outcome(webhook, &outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        webhook: &Webhook,
        tenants: &TenantDirectory,
    ) -> Result<SubscriptionOutcome, SubscriptionError> {
        let tenant = tenants
            .get(&webhook.tenant_id)
            .ok_or_else(|| SubscriptionError::TenantNotFound(webhook.tenant_id.clone()))?;

        let path = snapshot_path(&tenant.id, &webhook.snapshot_name);
        let snapshot = deadline(Stage::Snapshot, self.timeouts.snapshot, async {
            let bytes = self
                .snapshots
                .read(&path)
                .await
                .map_err(|e| SubscriptionError::SnapshotRead {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            self.loader
                .load_from_bytes(&bytes)
                .await
                .map_err(|e| SubscriptionError::SnapshotParse {
                    path: path.clone(),
                    message: e.to_string(),
                })
        })
        .await?;

        let url = validate_locator(&webhook.spec_url).map_err(|e| SubscriptionError::InvalidUri {
            uri: webhook.spec_url.clone(),
            message: e.to_string(),
        })?;
        let live = deadline(Stage::Live, self.timeouts.live, async {
            self.loader
                .load_from_uri(&url)
                .await
                .map_err(|e| SubscriptionError::LiveLoad {
                    uri: url.to_string(),
                    message: e.to_string(),
                })
        })
        .await?;

        let changes = deadline(Stage::Evaluation, self.timeouts.evaluation, async {
            self.evaluator
                .evaluate(&snapshot, &webhook.snapshot_name, &live, &webhook.spec_url)
                .await
                .map_err(|e| SubscriptionError::Evaluation(e.to_string()))
        })
        .await?;

        if changes.is_empty() {
            return Ok(SubscriptionOutcome::NoChange);
        }

        let count = changes.len();
        let delivery = tokio::time::timeout(
            self.timeouts.delivery,
            self.notifier.notify(tenant, &webhook.name, &changes),
        )
        .await;

        Ok(match delivery {
            Ok(Ok(DeliveryStatus::Delivered { status })) => SubscriptionOutcome::Delivered {
                changes: count,
                status,
            },
            Ok(Ok(DeliveryStatus::NoCallback)) => SubscriptionOutcome::NoCallback { changes: count },
            Ok(Err(e)) => SubscriptionOutcome::DeliveryFailed {
                changes: count,
                error: e.to_string(),
            },
            Err(_) => SubscriptionOutcome::DeliveryFailed {
                changes: count,
                error: format!("delivery timed out after {:?}", self.timeouts.delivery),
            },
        })
    }
}

/// Bound `fut` by `after`, turning a miss into a stage timeout.
async fn deadline<T, F>(stage: Stage, after: Duration, fut: F) -> Result<T, SubscriptionError>
where
    F: Future<Output = Result<T, SubscriptionError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| SubscriptionError::Timeout { stage, after })?
}

fn log_outcome(webhook: &Webhook, outcome: &SubscriptionOutcome) {
    match outcome {
        SubscriptionOutcome::NoChange => {
            tracing::debug!("No breaking changes");
        }
        SubscriptionOutcome::Delivered { changes, status } => {
            tracing::info!(changes, status, "Breaking changes delivered");
        }
        SubscriptionOutcome::NoCallback { changes } => {
            tracing::info!(changes, "Breaking changes found, tenant has no callback");
        }
        SubscriptionOutcome::DeliveryFailed { changes, error } => {
            tracing::warn!(changes, stage = %Stage::Delivery, error = %error, "Delivery failed");
        }
        SubscriptionOutcome::Skipped(e) => match e {
            SubscriptionError::TenantNotFound(_) | SubscriptionError::SnapshotParse { .. } => {
                tracing::error!(stage = %e.stage(), error = %e, "Subscription skipped");
            }
            SubscriptionError::InvalidUri { .. } | SubscriptionError::LiveLoad { .. } => {
                tracing::warn!(
                    stage = %e.stage(),
                    url = %webhook.spec_url,
                    error = %e,
                    "Subscription skipped"
                );
            }
            _ => {
                tracing::warn!(stage = %e.stage(), error = %e, "Subscription skipped");
            }
        },
    }
}
