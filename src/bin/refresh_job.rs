//! Refresh Job Binary
//!
//! Runs one reconciliation pass over every webhook subscription and exits.
//!
//! ## Configuration
//!
//! See [`oas_refresh::config`] for the `REFRESH_*` variables. In addition:
//! - `DATABASE_URL`: PostgreSQL metadata store (requires the `postgres` feature);
//!   otherwise metadata is read from `REFRESH_METADATA_FILE`
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Exit Status
//!
//! 0 after a completed pass, even when individual subscriptions failed.
//! Non-zero when tenants or webhooks cannot be listed, or the job cannot be
//! configured.
//!
//! ## Usage
//!
//! ```bash
//! REFRESH_METADATA_FILE=metadata.yaml REFRESH_SNAPSHOT_ROOT=snapshots cargo run --bin refresh_job
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use oas_refresh::{
    FileMetadataStore, FsSnapshotStore, MetadataStore, OpenApiLoader, ReconciliationEngine,
    RefreshConfig, RuleSetEvaluator, WebhookNotifier,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "refresh_job=info,oas_refresh=info,sqlx=warn".into());

    if log_format == "pretty" {
        // Pretty format for local development
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
            )
            .init();
    } else {
        // JSON format for production (Cloud Logging compatible)
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .flatten_event(true)
            )
            .init();
    }
}

/// Wire the remaining collaborators around `metadata` and run one pass.
async fn reconcile<M: MetadataStore>(
    metadata: Arc<M>,
    config: &RefreshConfig,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let snapshots = FsSnapshotStore::new(config.snapshot_root.clone());
    let loader = OpenApiLoader::new(config.loader())?;
    let notifier = WebhookNotifier::new(reqwest::Client::builder().build()?)
        .with_shape(config.payload_shape)
        .with_timeout(config.timeouts.delivery);

    let engine = ReconciliationEngine::new(
        metadata,
        Arc::new(snapshots),
        Arc::new(loader),
        Arc::new(RuleSetEvaluator::new()),
        Arc::new(notifier),
        config.engine(),
    );

    match engine.run().await {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                processed = report.processed(),
                skipped = report.skipped,
                delivery_failed = report.delivery_failed,
                "Refresh job finished"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Refresh job aborted");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Run against the PostgreSQL metadata store, closing the pool afterwards.
#[cfg(feature = "postgres")]
async fn reconcile_postgres(config: &RefreshConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use oas_refresh::{PostgresConfig, PostgresMetadataStore};

    let database_url = config.database_url.clone().ok_or("DATABASE_URL is not set")?;
    info!("Connecting to PostgreSQL...");
    let connect_start = Instant::now();
    let pg_config = PostgresConfig {
        database_url,
        ..PostgresConfig::from_env()
    };

    let store = match tokio::time::timeout(
        std::time::Duration::from_secs(30),
        PostgresMetadataStore::new(pg_config),
    )
    .await
    {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            error!("PostgreSQL connection timeout after 30s");
            return Err("Database connection timeout".into());
        }
    };
    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );

    let store = Arc::new(store);
    let code = reconcile(store.clone(), config).await;
    store.close().await;
    code
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");
    info!(version = version, build_sha = build_sha, "Starting refresh job");

    let config = match RefreshConfig::from_env_or_yaml() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        concurrency = config.concurrency,
        payload_shape = %config.payload_shape,
        snapshot_root = %config.snapshot_root.display(),
        "Configuration loaded"
    );

    if config.database_url.is_some() {
        #[cfg(feature = "postgres")]
        return reconcile_postgres(&config).await;

        #[cfg(not(feature = "postgres"))]
        tracing::warn!("DATABASE_URL is set but the postgres feature is disabled; using the metadata file");
    }

    let started = Instant::now();
    let store = FileMetadataStore::new(config.metadata_file.clone());
    let code = reconcile(Arc::new(store), &config).await?;
    info!(latency_ms = started.elapsed().as_millis() as u64, "Refresh job shutdown complete");
    Ok(code)
}
