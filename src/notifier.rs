//! Delivery of breaking-change reports to tenant callbacks.
//!
//! One attempt per report. There are no retries, receipts or dead letters;
//! a failed delivery is reported to the caller and logged there.

use std::time::{Duration, Instant};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::types::{Incompatibility, PayloadShape, Tenant};

/// Result of a delivery that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The callback accepted the report.
    Delivered {
        /// HTTP status returned (200 or 201).
        status: u16,
    },
    /// Tenant has no callback URL; nothing was sent.
    NoCallback,
}

/// Error type for delivery.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Payload could not be encoded.
    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Connection or protocol failure.
    #[error("Delivery to {url} failed: {message}")]
    Transport {
        /// Callback URL.
        url: String,
        /// Transport error.
        message: String,
    },
    /// Callback answered with something other than 200/201.
    #[error("Callback {url} answered HTTP {status}")]
    UnexpectedStatus {
        /// Callback URL.
        url: String,
        /// Returned status.
        status: u16,
    },
    /// No answer within the delivery deadline.
    #[error("Delivery to {url} timed out after {after:?}")]
    Timeout {
        /// Callback URL.
        url: String,
        /// Deadline that elapsed.
        after: Duration,
    },
}

/// Sends a subscription's breaking changes to its tenant.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Error type for delivery.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Make one delivery attempt.
    async fn notify(
        &self,
        tenant: &Tenant,
        subscription_name: &str,
        changes: &[Incompatibility],
    ) -> Result<DeliveryStatus, Self::Error>;
}

/// HTTP notifier posting JSON to the tenant's callback URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    shape: PayloadShape,
    timeout: Duration,
}

impl WebhookNotifier {
    /// Default delivery deadline.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Create a notifier sending the envelope payload.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            shape: PayloadShape::default(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Choose the payload shape.
    pub fn with_shape(mut self, shape: PayloadShape) -> Self {
        self.shape = shape;
        self
    }

    /// Set the delivery deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Payload shape in use.
    pub fn shape(&self) -> PayloadShape {
        self.shape
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    type Error = DeliveryError;

    async fn notify(
        &self,
        tenant: &Tenant,
        subscription_name: &str,
        changes: &[Incompatibility],
    ) -> Result<DeliveryStatus, Self::Error> {
        let Some(url) = tenant.callback() else {
            tracing::debug!(tenant_id = %tenant.id, webhook = subscription_name, "No callback configured");
            return Ok(DeliveryStatus::NoCallback);
        };

        let body = self.shape.encode(subscription_name, changes)?;
        let start = Instant::now();
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| DeliveryError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            })?
            .map_err(|e| DeliveryError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let latency_ms = start.elapsed().as_millis() as u64;
        match status {
            200 | 201 => {
                tracing::info!(
                    tenant_id = %tenant.id,
                    webhook = subscription_name,
                    status,
                    latency_ms,
                    changes = changes.len(),
                    "Delivered breaking changes"
                );
                Ok(DeliveryStatus::Delivered { status })
            }
            _ => Err(DeliveryError::UnexpectedStatus {
                url: url.to_string(),
                status,
            }),
        }
    }
}
