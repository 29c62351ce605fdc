use super::ConfigContext;
use crate::locator::{ResourceAddress, ResourceLocator};
use crate::{QuiltError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Walks nested maps along a dot-separated path.
///
/// Returns `None` as soon as a segment is missing or a non-map value is hit.
pub fn resolve_key_path<'a>(value: &'a Value, key_path: &str) -> Option<&'a Value> {
    key_path
        .split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
        .filter(|value| !value.is_null())
}

/// Configuration access for one invocation: the context plus structured
/// resource loading through the locator.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    context: ConfigContext,
    locator: ResourceLocator,
}

impl ConfigResolver {
    pub fn new(context: ConfigContext, locator: ResourceLocator) -> Self {
        Self { context, locator }
    }

    pub fn context(&self) -> &ConfigContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ConfigContext {
        &mut self.context
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    pub async fn load_structured_resource(
        &self,
        uri: &str,
        template_context: &Map<String, Value>,
    ) -> Result<Value> {
        let address = ResourceAddress::parse(uri)?.with_substitution_context(template_context.clone());
        match self.locator.load_and_parse(&address).await {
            Ok(value) => Ok(value),
            Err(error) => {
                if !address.is_file() {
                    tracing::error!("Failed to load {}: {}", address, error);
                }
                Err(error)
            }
        }
    }

    /// Writes `value` as indented JSON, whatever the target extension.
    pub async fn save_structured_resource<T: Serialize + ?Sized>(
        &self,
        uri: &str,
        value: &T,
    ) -> Result<ResourceAddress> {
        let address = ResourceAddress::parse(uri)?;
        let body = serde_json::to_vec_pretty(value)?;
        self.locator.save(&address, body).await?;
        Ok(address)
    }

    /// Looks up a key path inside a structured resource; any failure yields `None`.
    pub async fn lookup_resource(&self, uri: &str, key_path: &str) -> Option<Value> {
        match self.load_structured_resource(uri, &Map::new()).await {
            Ok(value) => resolve_key_path(&value, key_path).cloned(),
            Err(error) => {
                tracing::debug!("lookup in {} failed: {}", uri, error);
                None
            }
        }
    }

    pub fn app(&self) -> String {
        self.context.get_non_empty("APP_NAME").unwrap_or_default()
    }

    pub fn account(&self) -> String {
        self.context
            .get_or("CDK_DEFAULT_ACCOUNT", "AWS_ACCOUNT_ID")
            .unwrap_or_default()
    }

    pub fn region(&self) -> String {
        self.context
            .get_or("CDK_DEFAULT_REGION", "AWS_DEFAULT_REGION")
            .unwrap_or_default()
    }

    pub fn bucket_name(&self, kind: &str) -> String {
        format!("{}-cka-{}-{}-{}", self.app(), kind, self.account(), self.region())
    }

    pub fn registry_host(&self) -> String {
        format!("{}.dkr.ecr.{}.amazonaws.com", self.account(), self.region())
    }

    pub fn parameter_path(&self, name: &str) -> String {
        format!("/{}/{}", self.app().trim_matches('/'), name.trim_start_matches('/'))
    }

    pub fn account_region_key(&self) -> String {
        format!("{}:{}", self.region(), self.account())
    }

    pub fn manifest_prefix(&self) -> String {
        format!("fastq/{}", self.region())
    }

    pub fn timeout(&self) -> Result<u64> {
        self.context.timeout()
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.context
            .get_non_empty(key)
            .ok_or_else(|| QuiltError::Config(format!("{} is not a valid string", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use serde_json::json;
    use std::sync::Arc;

    fn resolver(overrides: Value) -> ConfigResolver {
        let context = ConfigContext::from_sources(
            overrides.as_object().cloned().unwrap(),
            vec![],
            super::super::default_values(),
        );
        ConfigResolver::new(context, ResourceLocator::new())
    }

    #[test]
    fn test_resolve_key_path() {
        let value = json!({"a": {"b": {"c": 7}}});
        assert_eq!(resolve_key_path(&value, "a.b.c"), Some(&json!(7)));
        assert_eq!(resolve_key_path(&json!({"a": {}}), "a.b.c"), None);
        assert_eq!(resolve_key_path(&json!({"a": 3}), "a.b"), None);
        assert_eq!(resolve_key_path(&json!([1, 2]), "a"), None);
    }

    #[test]
    fn test_derived_names() {
        let resolver = resolver(json!({
            "APP_NAME": "healthomics",
            "CDK_DEFAULT_ACCOUNT": "123456789012",
            "CDK_DEFAULT_REGION": "us-west-2",
        }));
        assert_eq!(resolver.bucket_name("input"), "healthomics-cka-input-123456789012-us-west-2");
        assert_eq!(resolver.registry_host(), "123456789012.dkr.ecr.us-west-2.amazonaws.com");
        assert_eq!(resolver.parameter_path("fastq/latest"), "/healthomics/fastq/latest");
        assert_eq!(resolver.account_region_key(), "us-west-2:123456789012");
        assert_eq!(resolver.manifest_prefix(), "fastq/us-west-2");
        assert_eq!(resolver.timeout().unwrap(), 900);
    }

    #[test]
    fn test_require_rejects_missing_values() {
        let resolver = resolver(json!({"WORKFLOW_ID": ""}));
        assert!(resolver.require("WORKFLOW_ID").is_err());
        assert_eq!(resolver.require("APP_NAME").unwrap(), "omics-quilt");
    }

    #[tokio::test]
    async fn test_save_then_load_structured_resource() {
        let temp_dir = tempfile::tempdir().unwrap();
        let uri = temp_dir.path().join("settings.yaml");
        let uri = uri.to_str().unwrap();
        let resolver = resolver(json!({}));

        let value = json!({"workflow": {"id": "9500764"}});
        resolver.save_structured_resource(uri, &value).await.unwrap();

        // JSON is valid YAML, so the .yaml extension still parses.
        let loaded = resolver.load_structured_resource(uri, &Map::new()).await.unwrap();
        assert_eq!(loaded, value);

        let raw = tokio::fs::read_to_string(uri).await.unwrap();
        assert!(raw.contains("\n  \"workflow\""));

        assert_eq!(resolver.lookup_resource(uri, "workflow.id").await, Some(json!("9500764")));
        assert_eq!(resolver.lookup_resource(uri, "workflow.name").await, None);
        assert_eq!(resolver.lookup_resource("/does/not/exist.json", "a").await, None);
    }

    #[tokio::test]
    async fn test_object_store_failures_propagate() {
        let resolver = resolver(json!({}));
        resolver
            .locator()
            .register_store("bucket", Arc::new(InMemory::new()))
            .await;
        let error = resolver
            .load_structured_resource("s3://bucket/missing.json", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(error, QuiltError::NotFound(_)));
    }
}
