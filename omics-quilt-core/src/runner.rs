//! Remote job API seam: the run request, its response, and runners.

use crate::config::ConfigContext;
use crate::manifest::SampleManifest;
use crate::{QuiltError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const RUN_SOURCE_TAG: &str = "LAMBDA_FASTQ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowType {
    #[default]
    #[serde(rename = "READY2RUN")]
    Ready2Run,
    #[serde(rename = "PRIVATE")]
    Private,
}

/// Run specification submitted to the remote job API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub workflow_type: WorkflowType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    pub parameters: SampleManifest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_uri: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub request_id: String,
}

impl JobRequest {
    /// `<sample>.<token>.`; the trailing separator is part of the name.
    pub fn run_name(sample: &SampleManifest, token: &str) -> String {
        format!("{}.{}.", sample.display_name(), token)
    }

    pub fn build(
        sample: SampleManifest,
        manifest_uri: &str,
        token: &str,
        context: &ConfigContext,
    ) -> Self {
        let name = Self::run_name(&sample, token);

        let mut tags = BTreeMap::new();
        tags.insert("SOURCE".to_string(), RUN_SOURCE_TAG.to_string());
        tags.insert("RUN_NAME".to_string(), name.clone());
        tags.insert("SAMPLE_MANIFEST".to_string(), manifest_uri.to_string());
        tags.insert("VIVOS_ID".to_string(), token.to_string());

        Self {
            workflow_type: WorkflowType::Ready2Run,
            workflow_id: context.get_non_empty("WORKFLOW_ID"),
            name,
            role_arn: context.get_non_empty("OMICS_ROLE"),
            parameters: sample,
            log_level: context.get_non_empty("LOG_LEVEL"),
            output_uri: context.get_non_empty("OUTPUT_S3_LOCATION"),
            tags,
            request_id: token.to_string(),
        }
    }

    pub fn idempotency_token(&self) -> &str {
        &self.request_id
    }
}

/// Response of the remote job API. Only `id` is required; unknown fields
/// are kept so the record is persisted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobResult {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            arn: None,
            status: None,
            tags: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn start_run(&self, request: &JobRequest) -> Result<JobResult>;
}

pub type DynWorkflowRunner = Arc<dyn WorkflowRunner>;

/// Submits runs as JSON to `<endpoint>/run`.
#[derive(Debug, Clone)]
pub struct HttpWorkflowRunner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpWorkflowRunner {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn run_url(&self) -> String {
        format!("{}/run", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl WorkflowRunner for HttpWorkflowRunner {
    async fn start_run(&self, request: &JobRequest) -> Result<JobResult> {
        let response = self
            .client
            .post(self.run_url())
            .json(request)
            .send()
            .await
            .map_err(|error| QuiltError::Runner(format!("start run request failed: {}", error)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuiltError::Runner(format!(
                "start run rejected with {}: {}",
                status, body
            )));
        }

        response
            .json::<JobResult>()
            .await
            .map_err(|error| QuiltError::Runner(format!("invalid start run response: {}", error)))
    }
}

/// Runner used when no job API endpoint is configured; every call fails.
#[derive(Debug, Clone, Default)]
pub struct DisabledRunner;

#[async_trait]
impl WorkflowRunner for DisabledRunner {
    async fn start_run(&self, request: &JobRequest) -> Result<JobResult> {
        Err(QuiltError::Runner(format!(
            "no job API endpoint configured for run {}",
            request.name
        )))
    }
}
