//! PostgreSQL metadata store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 4)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 0)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 60)
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE tenants (
//!     id            TEXT PRIMARY KEY,
//!     name          TEXT NOT NULL,
//!     contact_email TEXT NOT NULL DEFAULT '',
//!     callback_url  TEXT,
//!     alert_channel TEXT,
//!     created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! CREATE TABLE webhooks (
//!     name          TEXT NOT NULL,
//!     tenant_id     TEXT NOT NULL,
//!     spec_url      TEXT NOT NULL,
//!     snapshot_name TEXT NOT NULL,
//!     created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     PRIMARY KEY (tenant_id, name)
//! );
//! ```
//!
//! `webhooks.tenant_id` deliberately carries no foreign key: a dangling
//! webhook is skipped by the run instead of being rejected at write time.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

use crate::types::{Tenant, TenantId, Webhook};
use super::MetadataStore;

/// Configuration for PostgreSQL connection pool.
///
/// A batch run issues two queries, so the pool stays small and short-lived.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 4).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 0).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 60).
    pub idle_timeout_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/oasdiff".to_string()),
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            min_connections: std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// PostgreSQL metadata store.
pub struct PostgresMetadataStore {
    pool: PgPool,
}

impl PostgresMetadataStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn parse_tenant_row(row: &sqlx::postgres::PgRow) -> Result<Tenant, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let contact_email: Option<String> = row.try_get("contact_email")?;
        Ok(Tenant {
            id: TenantId::new(id),
            name: row.try_get("name")?,
            contact_email: contact_email.unwrap_or_default(),
            callback_url: row.try_get("callback_url")?,
            alert_channel: row.try_get("alert_channel")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn parse_webhook_row(row: &sqlx::postgres::PgRow) -> Result<Webhook, sqlx::Error> {
        let tenant_id: String = row.try_get("tenant_id")?;
        Ok(Webhook {
            name: row.try_get("name")?,
            tenant_id: TenantId::new(tenant_id),
            spec_url: row.try_get("spec_url")?,
            snapshot_name: row.try_get("snapshot_name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    type Error = PostgresError;

    async fn list_tenants(&self) -> Result<Vec<Tenant>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, contact_email, callback_url, alert_channel, created_at
            FROM tenants
            ORDER BY id
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_tenant_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT name, tenant_id, spec_url, snapshot_name, created_at
            FROM webhooks
            ORDER BY tenant_id, name
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_webhook_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }
}
