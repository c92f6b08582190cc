//! Job configuration.
//!
//! ## Environment
//!
//! - `REFRESH_CONCURRENCY`: pipelines in flight (default: 4, minimum 1)
//! - `REFRESH_SNAPSHOT_TIMEOUT_SECS`: snapshot read+parse deadline (default: 30)
//! - `REFRESH_LIVE_TIMEOUT_SECS`: live fetch+parse deadline (default: 30)
//! - `REFRESH_EVALUATION_TIMEOUT_SECS`: evaluation deadline (default: 60)
//! - `REFRESH_DELIVERY_TIMEOUT_SECS`: callback POST deadline (default: 15)
//! - `REFRESH_PAYLOAD_SHAPE`: `webhooks` or `breaking-changes` (default: webhooks)
//! - `REFRESH_MAX_REF_DEPTH`: external `$ref` fetch depth (default: 8)
//! - `REFRESH_SNAPSHOT_ROOT`: snapshot directory (default: ./snapshots)
//! - `REFRESH_METADATA_FILE`: tenant/webhook file (default: ./metadata.yaml)
//! - `DATABASE_URL`: when set, metadata comes from PostgreSQL
//! - `REFRESH_CONFIG`: optional YAML file overriding any of the above

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::document::LoaderConfig;
use crate::engine::EngineConfig;
use crate::pipeline::StageTimeouts;
use crate::types::PayloadShape;

/// Error type for configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds an unusable value.
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        /// Variable or YAML key.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Override file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
    /// Override file is not valid YAML.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// File path.
        path: String,
        /// Cause.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Everything the `refresh_job` binary needs to wire a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    /// Pipelines in flight.
    pub concurrency: usize,
    /// Per-stage deadlines.
    pub timeouts: StageTimeouts,
    /// Delivery payload shape.
    pub payload_shape: PayloadShape,
    /// External `$ref` fetch depth.
    pub max_ref_depth: usize,
    /// Root directory of the filesystem snapshot store.
    pub snapshot_root: PathBuf,
    /// File metadata store location.
    pub metadata_file: PathBuf,
    /// PostgreSQL connection string, if metadata lives in a database.
    pub database_url: Option<String>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeouts: StageTimeouts::default(),
            payload_shape: PayloadShape::default(),
            max_ref_depth: LoaderConfig::default().max_ref_depth,
            snapshot_root: PathBuf::from("./snapshots"),
            metadata_file: PathBuf::from("./metadata.yaml"),
            database_url: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RefreshConfigOverride {
    concurrency: Option<usize>,
    snapshot_timeout_secs: Option<u64>,
    live_timeout_secs: Option<u64>,
    evaluation_timeout_secs: Option<u64>,
    delivery_timeout_secs: Option<u64>,
    payload_shape: Option<String>,
    max_ref_depth: Option<usize>,
    snapshot_root: Option<PathBuf>,
    metadata_file: Option<PathBuf>,
    database_url: Option<String>,
}

impl RefreshConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), then apply the YAML file named by `REFRESH_CONFIG`.
    pub fn from_env_or_yaml() -> Result<Self, ConfigError> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("REFRESH_CONFIG") {
            let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            config.apply_yaml(&path, &contents)?;
        }
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_var(&lookup, key)?.map_or(default, Duration::from_secs))
        };

        let timeouts = StageTimeouts {
            snapshot: secs("REFRESH_SNAPSHOT_TIMEOUT_SECS", defaults.timeouts.snapshot)?,
            live: secs("REFRESH_LIVE_TIMEOUT_SECS", defaults.timeouts.live)?,
            evaluation: secs("REFRESH_EVALUATION_TIMEOUT_SECS", defaults.timeouts.evaluation)?,
            delivery: secs("REFRESH_DELIVERY_TIMEOUT_SECS", defaults.timeouts.delivery)?,
        };

        let payload_shape = match lookup("REFRESH_PAYLOAD_SHAPE") {
            Some(raw) => parse_shape("REFRESH_PAYLOAD_SHAPE", &raw)?,
            None => defaults.payload_shape,
        };

        let config = Self {
            concurrency: parse_var(&lookup, "REFRESH_CONCURRENCY")?.unwrap_or(defaults.concurrency),
            timeouts,
            payload_shape,
            max_ref_depth: parse_var(&lookup, "REFRESH_MAX_REF_DEPTH")?.unwrap_or(defaults.max_ref_depth),
            snapshot_root: lookup("REFRESH_SNAPSHOT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_root),
            metadata_file: lookup("REFRESH_METADATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.metadata_file),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
        };
        config.validate()
    }

    fn apply_yaml(&mut self, path: &str, contents: &str) -> Result<(), ConfigError> {
        let overrides: RefreshConfigOverride =
            serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;

        if let Some(value) = overrides.concurrency {
            self.concurrency = value;
        }
        if let Some(value) = overrides.snapshot_timeout_secs {
            self.timeouts.snapshot = Duration::from_secs(value);
        }
        if let Some(value) = overrides.live_timeout_secs {
            self.timeouts.live = Duration::from_secs(value);
        }
        if let Some(value) = overrides.evaluation_timeout_secs {
            self.timeouts.evaluation = Duration::from_secs(value);
        }
        if let Some(value) = overrides.delivery_timeout_secs {
            self.timeouts.delivery = Duration::from_secs(value);
        }
        if let Some(value) = overrides.payload_shape {
            self.payload_shape = parse_shape("payload_shape", &value)?;
        }
        if let Some(value) = overrides.max_ref_depth {
            self.max_ref_depth = value;
        }
        if let Some(value) = overrides.snapshot_root {
            self.snapshot_root = value;
        }
        if let Some(value) = overrides.metadata_file {
            self.metadata_file = value;
        }
        if let Some(value) = overrides.database_url {
            self.database_url = Some(value).filter(|url| !url.trim().is_empty());
        }

        *self = self.clone().validate()?;
        Ok(())
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "concurrency".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(self)
    }

    /// Engine settings.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            concurrency: self.concurrency,
            timeouts: self.timeouts,
        }
    }

    /// Loader settings. The HTTP timeout follows the live-load deadline.
    pub fn loader(&self) -> LoaderConfig {
        LoaderConfig {
            follow_external_refs: true,
            max_ref_depth: self.max_ref_depth,
            request_timeout: self.timeouts.live,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_shape(key: &str, raw: &str) -> Result<PayloadShape, ConfigError> {
    raw.parse().map_err(|reason| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<RefreshConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RefreshConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config, RefreshConfig::default());
        assert_eq!(config.engine().concurrency, 4);
        assert_eq!(config.loader().max_ref_depth, 8);
    }

    #[test]
    fn test_env_values() {
        let config = from_vars(&[
            ("REFRESH_CONCURRENCY", "1"),
            ("REFRESH_DELIVERY_TIMEOUT_SECS", "3"),
            ("REFRESH_PAYLOAD_SHAPE", "breaking-changes"),
            ("DATABASE_URL", "postgresql://db/oas"),
        ])
        .unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.timeouts.delivery, Duration::from_secs(3));
        assert_eq!(config.payload_shape, PayloadShape::Legacy);
        assert_eq!(config.database_url.as_deref(), Some("postgresql://db/oas"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            from_vars(&[("REFRESH_CONCURRENCY", "many")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            from_vars(&[("REFRESH_CONCURRENCY", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            from_vars(&[("REFRESH_PAYLOAD_SHAPE", "xml")]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_yaml_override() {
        let mut config = RefreshConfig::default();
        config
            .apply_yaml(
                "refresh.yaml",
                "concurrency: 8\nlive_timeout_secs: 5\npayload_shape: legacy\nsnapshot_root: /var/snapshots\n",
            )
            .unwrap();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.timeouts.live, Duration::from_secs(5));
        assert_eq!(config.loader().request_timeout, Duration::from_secs(5));
        assert_eq!(config.payload_shape, PayloadShape::Legacy);
        assert_eq!(config.snapshot_root, PathBuf::from("/var/snapshots"));

        assert!(matches!(
            config.apply_yaml("refresh.yaml", "unknown_key: 1\n"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
