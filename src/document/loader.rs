//! OpenAPI loader over HTTP(S) and local files.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Map, Number, Value};

use super::refs::{external_targets, inline_external};
use super::{Document, DocumentLoader, LoadError};

/// Loader settings.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Inline external `$ref`s while loading (default: true).
    pub follow_external_refs: bool,
    /// Maximum chain length of external documents (default: 8).
    pub max_ref_depth: usize,
    /// Per-request HTTP timeout (default: 30s).
    pub request_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            follow_external_refs: true,
            max_ref_depth: 8,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Loads OpenAPI 3 documents written in JSON or YAML.
#[derive(Debug, Clone)]
pub struct OpenApiLoader {
    client: reqwest::Client,
    config: LoaderConfig,
}

impl OpenApiLoader {
    /// Create a loader with its own HTTP client.
    pub fn new(config: LoaderConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Create a loader sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: LoaderConfig) -> Self {
        Self { client, config }
    }

    /// Loader settings.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, LoadError> {
        match url.scheme() {
            "http" | "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| LoadError::Fetch {
                        uri: url.to_string(),
                        message: e.to_string(),
                    })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LoadError::Status {
                        uri: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                let body = response.bytes().await.map_err(|e| LoadError::Fetch {
                    uri: url.to_string(),
                    message: e.to_string(),
                })?;
                Ok(body.to_vec())
            }
            "file" => {
                let path = url.to_file_path().map_err(|_| LoadError::InvalidUri {
                    uri: url.to_string(),
                    reason: "not a local file path".to_string(),
                })?;
                tokio::fs::read(&path).await.map_err(|source| LoadError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
            other => Err(LoadError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Fetch every external document reachable from `root` and inline them.
    async fn resolve_external(&self, root: Value, base: Option<&Url>) -> Result<Value, LoadError> {
        if !self.config.follow_external_refs {
            return Ok(root);
        }

        // The base is registered up front so `openapi.yaml#/...` from within
        // openapi.yaml resolves like any other external reference.
        let mut documents: BTreeMap<Url, Value> = BTreeMap::new();
        if let Some(base) = base {
            documents.insert(base.clone(), root.clone());
        }
        let mut frontier: VecDeque<(Option<Url>, usize)> = VecDeque::from([(base.cloned(), 0)]);

        while let Some((url, depth)) = frontier.pop_front() {
            let value = match &url {
                Some(u) => &documents[u],
                None => &root,
            };
            let targets = external_targets(value, url.as_ref())?;

            for target in targets {
                if documents.contains_key(&target) {
                    continue;
                }
                if depth + 1 > self.config.max_ref_depth {
                    return Err(LoadError::Reference {
                        reference: target.to_string(),
                        message: format!(
                            "external reference chain exceeds depth {}",
                            self.config.max_ref_depth
                        ),
                    });
                }
                tracing::debug!(target_document = %target, depth = depth + 1, "Fetching external reference");
                let bytes = self.fetch(&target).await?;
                documents.insert(target.clone(), parse_value(&bytes)?);
                frontier.push_back((Some(target), depth + 1));
            }
        }

        if documents.is_empty() {
            return Ok(root);
        }
        inline_external(&root, base, &documents)
    }
}

#[async_trait]
impl DocumentLoader for OpenApiLoader {
    type Error = LoadError;

    async fn load_from_bytes(&self, bytes: &[u8]) -> Result<Document, Self::Error> {
        let root = parse_value(bytes)?;
        let root = self.resolve_external(root, None).await?;
        Document::from_value(root)
    }

    async fn load_from_uri(&self, uri: &Url) -> Result<Document, Self::Error> {
        let bytes = self.fetch(uri).await?;
        let root = parse_value(&bytes)?;
        let root = self.resolve_external(root, Some(uri)).await?;
        Document::from_value(root)
    }
}

/// Parse JSON, falling back to YAML.
pub fn parse_value(bytes: &[u8]) -> Result<Value, LoadError> {
    let json_err = match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };
    let yaml: serde_yaml::Value = serde_yaml::from_slice(bytes)
        .map_err(|yaml_err| LoadError::Parse(format!("json: {json_err}; yaml: {yaml_err}")))?;
    yaml_to_json(yaml)
}

/// Convert a YAML tree to JSON. Scalar mapping keys (e.g. status codes) become strings.
fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, LoadError> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut out = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => {
                        return Err(LoadError::Parse(format!(
                            "unsupported mapping key {other:?}"
                        )))
                    }
                };
                out.insert(key, yaml_to_json(value)?);
            }
            Value::Object(out)
        }
        Yaml::Tagged(tagged) => {
            let tagged = *tagged;
            yaml_to_json(tagged.value)?
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PETSTORE_YAML: &str = r#"
openapi: 3.0.3
info:
  title: Pets
  version: "1.0"
paths:
  /pets:
    get:
      responses:
        200:
          description: ok
"#;

    fn loader() -> OpenApiLoader {
        OpenApiLoader::new(LoaderConfig::default()).unwrap()
    }

    #[test]
    fn test_yaml_status_keys_become_strings() {
        let value = parse_value(PETSTORE_YAML.as_bytes()).unwrap();
        assert!(value.pointer("/paths/~1pets/get/responses/200").is_some());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_value(b"{ not: [valid"), Err(LoadError::Parse(_))));
    }

    #[tokio::test]
    async fn test_load_from_bytes_json_and_yaml_agree() {
        let loader = loader();
        let from_yaml = loader.load_from_bytes(PETSTORE_YAML.as_bytes()).await.unwrap();
        let json = serde_json::to_vec(from_yaml.root()).unwrap();
        let from_json = loader.load_from_bytes(&json).await.unwrap();
        assert_eq!(from_yaml.fingerprint(), from_json.fingerprint());
    }

    #[tokio::test]
    async fn test_load_from_file_uri_with_external_ref() {
        let dir = tempfile::tempdir().unwrap();
        let mut common = std::fs::File::create(dir.path().join("common.yaml")).unwrap();
        common
            .write_all(b"Pet:\n  type: object\n  required: [id]\n  properties:\n    id:\n      type: integer\n")
            .unwrap();

        let main = r##"
openapi: 3.0.3
info: {title: Pets, version: "1"}
paths:
  /pets:
    get:
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                $ref: "common.yaml#/Pet"
"##;
        std::fs::write(dir.path().join("openapi.yaml"), main).unwrap();

        let uri = Url::from_file_path(dir.path().join("openapi.yaml")).unwrap();
        let doc = loader().load_from_uri(&uri).await.unwrap();
        let schema = doc
            .root()
            .pointer("/paths/~1pets/get/responses/200/content/application~1json/schema")
            .unwrap();
        assert_eq!(schema["required"][0], "id");
    }

    #[tokio::test]
    async fn test_self_qualified_ref_is_inlined() {
        let dir = tempfile::tempdir().unwrap();
        let main = r##"
openapi: 3.0.3
info: {title: Pets, version: "1"}
paths:
  /pets:
    get:
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                $ref: "openapi.yaml#/components/schemas/Pet"
components:
  schemas:
    Pet:
      type: object
      required: [id]
      properties:
        id: {type: integer}
        owner: {$ref: "#/components/schemas/Owner"}
    Owner:
      type: string
"##;
        std::fs::write(dir.path().join("openapi.yaml"), main).unwrap();

        let uri = Url::from_file_path(dir.path().join("openapi.yaml")).unwrap();
        let doc = loader().load_from_uri(&uri).await.unwrap();
        let schema = doc
            .root()
            .pointer("/paths/~1pets/get/responses/200/content/application~1json/schema")
            .unwrap();
        assert_eq!(schema["required"][0], "id");
        assert_eq!(doc.resolve(&schema["properties"]["owner"])["type"], "string");
    }

    #[tokio::test]
    async fn test_recursive_external_schema_loads() {
        let dir = tempfile::tempdir().unwrap();
        let common = "Node:\n  type: object\n  required: [value]\n  properties:\n    value: {type: string}\n    children:\n      type: array\n      items: {$ref: '#/Node'}\n";
        std::fs::write(dir.path().join("common.yaml"), common).unwrap();
        let main = r##"
openapi: 3.0.3
info: {title: Tree, version: "1"}
paths:
  /tree:
    get:
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                $ref: "common.yaml#/Node"
"##;
        std::fs::write(dir.path().join("openapi.yaml"), main).unwrap();

        let uri = Url::from_file_path(dir.path().join("openapi.yaml")).unwrap();
        let doc = loader().load_from_uri(&uri).await.unwrap();
        let schema = doc
            .root()
            .pointer("/paths/~1tree/get/responses/200/content/application~1json/schema")
            .unwrap();
        assert_eq!(schema["required"][0], "value");
        let recursion = schema["properties"]["children"]["items"]["$ref"].as_str().unwrap();
        assert!(recursion.ends_with("common.yaml#/Node"));
    }

    #[tokio::test]
    async fn test_external_refs_can_be_disabled() {
        let config = LoaderConfig {
            follow_external_refs: false,
            ..LoaderConfig::default()
        };
        let loader = OpenApiLoader::new(config).unwrap();
        let doc = loader
            .load_from_bytes(br#"{"openapi":"3.0.3","paths":{},"x":{"$ref":"http://127.0.0.1:9/a.json"}}"#)
            .await
            .unwrap();
        assert_eq!(doc.root()["x"]["$ref"], "http://127.0.0.1:9/a.json");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let uri = Url::from_file_path(dir.path().join("absent.yaml")).unwrap();
        assert!(matches!(
            loader().load_from_uri(&uri).await,
            Err(LoadError::Read { .. })
        ));
    }
}
