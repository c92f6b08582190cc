//! API description documents and the loader capability.
//!
//! A [`Document`] is the parsed JSON tree of an OpenAPI 3 description. Loaders
//! inline external `$ref`s while loading; local `#/...` references stay in place
//! and are followed on demand with [`Document::resolve`].

pub mod loader;
pub mod refs;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Map, Value};

use crate::canonical::canonical_hash;

pub use loader::{OpenApiLoader, LoaderConfig};

/// Maximum `$ref` hops followed by [`Document::resolve`].
const MAX_LOCAL_REF_HOPS: usize = 32;

/// Error type for document loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Locator is not an absolute, well-formed URI.
    #[error("Invalid document URI '{uri}': {reason}")]
    InvalidUri {
        /// Offending locator.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Scheme cannot be fetched.
    #[error("Unsupported URI scheme '{0}'")]
    UnsupportedScheme(String),
    /// Transport failure while fetching.
    #[error("Failed to fetch {uri}: {message}")]
    Fetch {
        /// Fetched URI.
        uri: String,
        /// Transport error.
        message: String,
    },
    /// Server answered with a non-success status.
    #[error("Fetching {uri} returned HTTP {status}")]
    Status {
        /// Fetched URI.
        uri: String,
        /// HTTP status code.
        status: u16,
    },
    /// Local file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
    /// Bytes are neither JSON nor YAML.
    #[error("Document is neither valid JSON nor YAML: {0}")]
    Parse(String),
    /// Parsed value is not an OpenAPI 3 document.
    #[error("Not an OpenAPI 3 document: {0}")]
    NotOpenApi(String),
    /// A `$ref` could not be resolved.
    #[error("Unresolvable reference '{reference}': {message}")]
    Reference {
        /// The `$ref` value.
        reference: String,
        /// Why resolution failed.
        message: String,
    },
}

/// A parsed OpenAPI 3 document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
    fingerprint: u64,
}

impl Document {
    /// Wrap a parsed value, checking that it is an OpenAPI 3 document.
    pub fn from_value(root: Value) -> Result<Self, LoadError> {
        let obj = root
            .as_object()
            .ok_or_else(|| LoadError::NotOpenApi("root must be an object".to_string()))?;

        match obj.get("openapi") {
            Some(Value::String(version)) if version.starts_with("3.") => {}
            Some(other) => {
                return Err(LoadError::NotOpenApi(format!(
                    "unsupported openapi version {other}"
                )))
            }
            None if obj.contains_key("swagger") => {
                return Err(LoadError::NotOpenApi(
                    "swagger 2.0 documents are not supported".to_string(),
                ))
            }
            None => {
                return Err(LoadError::NotOpenApi(
                    "missing `openapi` version field".to_string(),
                ))
            }
        }

        if let Some(paths) = obj.get("paths") {
            if !paths.is_object() {
                return Err(LoadError::NotOpenApi("`paths` must be an object".to_string()));
            }
        }

        let fingerprint = canonical_hash(&root);
        Ok(Self { root, fingerprint })
    }

    /// The raw JSON tree.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Declared OpenAPI version.
    pub fn version(&self) -> &str {
        self.root
            .get("openapi")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Title from the `info` object, if any.
    pub fn title(&self) -> Option<&str> {
        self.root.pointer("/info/title").and_then(Value::as_str)
    }

    /// The `paths` object. Absent paths read as empty.
    pub fn paths(&self) -> Option<&Map<String, Value>> {
        self.root.get("paths").and_then(Value::as_object)
    }

    /// Canonical content hash; equal for structurally identical documents.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Force a fingerprint, to simulate a hash collision.
    #[cfg(test)]
    pub(crate) fn with_fingerprint(mut self, fingerprint: u64) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Follow local `$ref` chains starting at `value`.
    ///
    /// Unresolvable or external references resolve to the reference object itself.
    pub fn resolve<'a>(&'a self, value: &'a Value) -> &'a Value {
        let mut current = value;
        for _ in 0..MAX_LOCAL_REF_HOPS {
            let Some(pointer) = local_ref(current) else {
                return current;
            };
            match self.root.pointer(pointer) {
                Some(target) => current = target,
                None => return current,
            }
        }
        current
    }
}

/// The JSON pointer of a local `{"$ref": "#/..."}` object.
pub(crate) fn local_ref(value: &Value) -> Option<&str> {
    value
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix('#'))
}

/// Loads and parses API description documents.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Error type for load operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Parse a document from raw bytes.
    async fn load_from_bytes(&self, bytes: &[u8]) -> Result<Document, Self::Error>;

    /// Fetch and parse the document at `uri`.
    async fn load_from_uri(&self, uri: &Url) -> Result<Document, Self::Error>;
}

/// Check a live-document locator before anything is fetched.
///
/// The locator must be an absolute URI with an `http`, `https` or `file`
/// scheme; network schemes also need a host.
pub fn validate_locator(locator: &str) -> Result<Url, LoadError> {
    let invalid = |reason: String| LoadError::InvalidUri {
        uri: locator.to_string(),
        reason,
    };

    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty locator".to_string()));
    }
    let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {
            if url.host_str().map_or(true, str::is_empty) {
                return Err(invalid("missing host".to_string()));
            }
        }
        "file" => {}
        other => return Err(LoadError::UnsupportedScheme(other.to_string())),
    }
    Ok(url)
}
