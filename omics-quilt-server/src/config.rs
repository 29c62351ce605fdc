use omics_quilt_core::{QuiltError, ResourceAddress, ResourceLocator, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const ENV_PREFIX: &str = "OMICS_QUILT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// JSON or YAML map of per-invocation settings (`WORKFLOW_ID`,
    /// `OUTPUT_S3_LOCATION`, ...). Local path or `s3://` URI.
    #[serde(default)]
    pub context_file: Option<String>,
}

/// Remote job API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Status topic publishing endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            region: None,
            runner: RunnerConfig::default(),
            notify: NotifyConfig::default(),
            context_file: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        Self::build(Some(path))
    }

    /// Loads `path` when given; otherwise only `OMICS_QUILT_*` variables apply.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::build(path)
    }

    fn build(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| QuiltError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| QuiltError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn runner_endpoint(&self) -> Option<&str> {
        non_empty(self.runner.endpoint.as_deref())
    }

    pub fn notify_endpoint(&self) -> Option<&str> {
        non_empty(self.notify.endpoint.as_deref())
    }

    pub fn region(&self) -> Option<&str> {
        non_empty(self.region.as_deref())
    }

    /// Settings from `context_file` merged with command-line overrides; the
    /// latter win. Both take precedence over the environment and defaults.
    pub async fn context_overrides(
        &self,
        locator: &ResourceLocator,
        overrides: &[(String, String)],
    ) -> Result<Map<String, Value>> {
        let mut merged = match non_empty(self.context_file.as_deref()) {
            Some(uri) => {
                let address = ResourceAddress::parse(uri)?;
                match locator.load_document(&address).await? {
                    Value::Object(map) => map,
                    other => {
                        return Err(QuiltError::Config(format!(
                            "context file {} must hold a map, found {}",
                            uri, other
                        )));
                    }
                }
            }
            None => Map::new(),
        };
        for (key, value) in overrides {
            merged.insert(key.clone(), Value::String(value.clone()));
        }
        Ok(merged)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// Parses a `KEY=VALUE` command-line override.
pub fn parse_override(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
