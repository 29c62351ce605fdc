use crate::config::ConfigResolver;
use crate::event::StorageEvent;
use crate::locator::ResourceAddress;
use crate::manifest::SampleManifest;
use crate::notify::NotificationSink;
use crate::runner::{DynWorkflowRunner, JobRequest, JobResult};
use crate::{QuiltError, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};
use ulid::Ulid;

/// Document written next to a run's outputs once it has been submitted.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadataRecord<'a> {
    pub sample: &'a SampleManifest,
    pub run: &'a JobResult,
    pub workflow: &'a JobRequest,
}

#[derive(Debug, Clone)]
pub struct SubmitRunOperationRequest {
    pub event: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmittedRunStatus {
    Submitted,
    DryRun,
    /// The remote API rejected the run or could not be reached.
    Failed(String),
    /// The run was started but its audit or metadata record could not be written.
    Unrecorded(String),
}

impl SubmittedRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmittedRunStatus::Submitted => "SUBMITTED",
            SubmittedRunStatus::DryRun => "SKIPPED",
            SubmittedRunStatus::Failed(_) => "FAILED",
            SubmittedRunStatus::Unrecorded(_) => "UNRECORDED",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SubmittedRunStatus::Failed(reason) | SubmittedRunStatus::Unrecorded(reason) => {
                Some(reason.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmittedRun {
    pub request: JobRequest,
    pub status: SubmittedRunStatus,
    pub result: Option<JobResult>,
    pub metadata: Option<ResourceAddress>,
}

#[derive(Debug, Clone)]
pub struct SubmitRunOperationResult {
    pub manifest_uri: String,
    pub runs: Vec<SubmittedRun>,
    pub error_count: usize,
}

impl SubmitRunOperationResult {
    pub fn success_marker() -> Value {
        json!({ "message": "Success" })
    }

    /// Turns a non-zero error count into the batch-level failure.
    pub fn into_completion(self) -> Result<Self> {
        if self.error_count > 0 {
            return Err(QuiltError::PartialFailure {
                failed: self.error_count,
                total: self.runs.len(),
            });
        }
        Ok(self)
    }
}

/// Turns one storage event into one workflow run submission.
#[derive(Clone)]
pub struct SubmitRunOperation {
    resolver: ConfigResolver,
    notifier: NotificationSink,
    runner: DynWorkflowRunner,
}

impl std::fmt::Debug for SubmitRunOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitRunOperation")
            .field("resolver", &self.resolver)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl SubmitRunOperation {
    pub fn new(
        resolver: ConfigResolver,
        notifier: NotificationSink,
        runner: DynWorkflowRunner,
    ) -> Self {
        Self {
            resolver,
            notifier,
            runner,
        }
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub async fn run(&self, request: SubmitRunOperationRequest) -> Result<SubmitRunOperationResult> {
        self.submit(request).await?.into_completion()
    }

    /// Runs every step but reports sample failures as a count instead of an error.
    pub async fn submit(
        &self,
        request: SubmitRunOperationRequest,
    ) -> Result<SubmitRunOperationResult> {
        let context = self.resolver.context();
        tracing::debug!("Received event: {}", request.event);

        let event = StorageEvent::from_value(&request.event)?;
        let source = event.single()?;
        tracing::info!(
            "Processing {} in {}",
            source.key,
            source.container_arn.as_deref().unwrap_or(&source.container)
        );

        let manifest_uri = context
            .get_non_empty("local_file")
            .unwrap_or_else(|| source.to_uri());

        let document = self
            .resolver
            .load_structured_resource(&manifest_uri, &Map::new())
            .await?;
        tracing::info!("Loaded manifest {}: {}", manifest_uri, document);
        let samples = vec![SampleManifest::from_value(&document)?];

        let mut runs = Vec::with_capacity(samples.len());
        let mut error_count = 0;
        for sample in samples {
            let run = self.run_workflow(sample, &manifest_uri).await?;
            if let Some(reason) = run.status.error() {
                tracing::error!("Error launching {}: {}", run.request.name, reason);
                error_count += 1;
            }
            if event.is_self_test() {
                tracing::debug!("Not publishing status of {} for self-test event", run.request.name);
            } else {
                self.notify(&run).await;
            }
            runs.push(run);
        }

        Ok(SubmitRunOperationResult {
            manifest_uri,
            runs,
            error_count,
        })
    }

    async fn run_workflow(&self, sample: SampleManifest, manifest_uri: &str) -> Result<SubmittedRun> {
        let context = self.resolver.context();
        self.save_audit(sample.display_name(), &sample).await?;
        tracing::info!("Starting workflow for sample: {}", sample.display_name());

        let token = context
            .get_non_empty("TEST_UUID")
            .unwrap_or_else(|| Ulid::new().to_string());
        let request = JobRequest::build(sample, manifest_uri, &token, context);
        self.save_audit(&format!("{}input", request.name), &request)
            .await?;
        tracing::debug!("Workflow options: {}", serde_json::to_string(&request)?);

        if context.is_truthy("debug") {
            tracing::info!("Skipping submission of {} (dry run)", request.name);
            return Ok(SubmittedRun {
                request,
                status: SubmittedRunStatus::DryRun,
                result: None,
                metadata: None,
            });
        }

        let result = match self.runner.start_run(&request).await {
            Ok(result) => result,
            Err(error) => {
                return Ok(SubmittedRun {
                    request,
                    status: SubmittedRunStatus::Failed(error.to_string()),
                    result: None,
                    metadata: None,
                });
            }
        };
        tracing::info!("Started run {} for {}", result.id, request.name);

        // The remote run exists from here on, so the result is kept even when
        // recording it fails.
        match self.record_run(&request, &result).await {
            Ok(metadata) => Ok(SubmittedRun {
                request,
                status: SubmittedRunStatus::Submitted,
                result: Some(result),
                metadata,
            }),
            Err(error) => Ok(SubmittedRun {
                request,
                status: SubmittedRunStatus::Unrecorded(error.to_string()),
                result: Some(result),
                metadata: None,
            }),
        }
    }

    async fn record_run(
        &self,
        request: &JobRequest,
        result: &JobResult,
    ) -> Result<Option<ResourceAddress>> {
        tracing::debug!("Workflow response: {}", serde_json::to_string(result)?);
        self.save_audit(&format!("{}output", request.name), result)
            .await?;
        self.persist_metadata(request, result).await
    }

    async fn persist_metadata(
        &self,
        request: &JobRequest,
        result: &JobResult,
    ) -> Result<Option<ResourceAddress>> {
        let context = self.resolver.context();
        let Some(output) = context.get_non_empty("OUTPUT_S3_LOCATION") else {
            tracing::warn!("OUTPUT_S3_LOCATION not set; skipping run metadata for {}", result.id);
            return Ok(None);
        };
        let Some(filename) = context.get_non_empty("INPUT_METADATA") else {
            tracing::warn!("INPUT_METADATA not set; skipping run metadata for {}", result.id);
            return Ok(None);
        };

        let address = ResourceAddress::parse(&output)?
            .join(&result.id)
            .join("out")
            .join(&filename);
        let record = RunMetadataRecord {
            sample: &request.parameters,
            run: result,
            workflow: request,
        };
        let saved = self
            .resolver
            .save_structured_resource(&address.to_uri(), &record)
            .await?;
        tracing::info!("Wrote run metadata to {}", saved);
        Ok(Some(saved))
    }

    async fn save_audit<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let Some(base) = self.resolver.context().get_non_empty("INPUT_S3_LOCATION") else {
            tracing::debug!("INPUT_S3_LOCATION not set; not recording {}", name);
            return Ok(());
        };
        let address = ResourceAddress::parse(&base)?.join(&format!("{}.json", name));
        tracing::info!("Writing input to {}", address);
        self.resolver
            .save_structured_resource(&address.to_uri(), value)
            .await?;
        Ok(())
    }

    async fn notify(&self, run: &SubmittedRun) {
        let message = json!({
            "status": run.status.as_str(),
            "error": run.status.error(),
            "run_name": run.request.name,
            "sample_name": run.request.parameters.sample_name,
            "run_id": run.result.as_ref().map(|result| result.id.as_str()),
            "metadata": run.metadata.as_ref().map(ResourceAddress::to_uri),
        });
        self.notifier.publish(&message.to_string()).await;
    }
}
