use crate::config::Config;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use omics_quilt_core::operations::{
    SubmitRunOperation, SubmitRunOperationRequest, SubmitRunOperationResult,
};
use omics_quilt_core::{
    ConfigContext, ConfigResolver, DisabledRunner, DynTopicPublisher, DynWorkflowRunner,
    HttpTopicPublisher, HttpWorkflowRunner, NotificationSink, QuiltError, ResourceLocator, Result,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Everything one invocation needs. The context is cloned per event so
/// invocations never share mutable settings.
pub struct AppState {
    context: ConfigContext,
    locator: ResourceLocator,
    runner: DynWorkflowRunner,
    publisher: Option<DynTopicPublisher>,
}

impl AppState {
    pub fn new(
        context: ConfigContext,
        locator: ResourceLocator,
        runner: DynWorkflowRunner,
        publisher: Option<DynTopicPublisher>,
    ) -> Self {
        Self {
            context,
            locator,
            runner,
            publisher,
        }
    }

    /// Wires the HTTP-backed runner and publisher from the binary's config.
    pub async fn from_config(config: &Config, overrides: &[(String, String)]) -> Result<Self> {
        let mut locator = ResourceLocator::new();
        if let Some(region) = config.region() {
            locator = locator.with_region(region);
        }

        let context = ConfigContext::new(config.context_overrides(&locator, overrides).await?);

        let runner: DynWorkflowRunner = match config.runner_endpoint() {
            Some(endpoint) => Arc::new(HttpWorkflowRunner::new(endpoint)),
            None => {
                tracing::warn!("No runner endpoint configured; only dry runs can succeed");
                Arc::new(DisabledRunner)
            }
        };
        let publisher = config
            .notify_endpoint()
            .map(|endpoint| Arc::new(HttpTopicPublisher::new(endpoint)) as DynTopicPublisher);

        Ok(Self::new(context, locator, runner, publisher))
    }

    fn operation(&self) -> SubmitRunOperation {
        let context = self.context.clone();
        let notifier = NotificationSink::from_context(&context, self.publisher.clone());
        SubmitRunOperation::new(
            ConfigResolver::new(context, self.locator.clone()),
            notifier,
            self.runner.clone(),
        )
    }

    /// Runs one event through the submitter, bounded by `TIMEOUT` seconds.
    pub async fn invoke(&self, event: Value) -> Result<SubmitRunOperationResult> {
        let seconds = self.context.timeout()?;
        let operation = self.operation();
        match tokio::time::timeout(
            Duration::from_secs(seconds),
            operation.run(SubmitRunOperationRequest { event }),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(QuiltError::Internal(format!(
                "invocation timed out after {}s",
                seconds
            ))),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/events", post(handle_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config, overrides: &[(String, String)]) -> Result<()> {
    let state = Arc::new(AppState::from_config(&config, overrides).await?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn handle_event(State(state): State<Arc<AppState>>, Json(event): Json<Value>) -> Response {
    match state.invoke(event).await {
        Ok(result) => {
            tracing::info!(
                "Processed {} ({} run(s))",
                result.manifest_uri,
                result.runs.len()
            );
            (
                StatusCode::OK,
                Json(SubmitRunOperationResult::success_marker()),
            )
                .into_response()
        }
        Err(error) => {
            let status = status_for(&error);
            tracing::error!("Event failed with {}: {}", status, error);
            (status, Json(json!({ "message": error.to_string() }))).into_response()
        }
    }
}

fn status_for(error: &QuiltError) -> StatusCode {
    match error {
        error if error.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
        QuiltError::PartialFailure { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use omics_quilt_core::{JobRequest, JobResult, WorkflowRunner};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct CountingRunner {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl WorkflowRunner for CountingRunner {
        async fn start_run(&self, _request: &JobRequest) -> Result<JobResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(QuiltError::Runner("rejected".to_string()));
            }
            Ok(JobResult::new("7654321"))
        }
    }

    struct Harness {
        _temp_dir: tempfile::TempDir,
        manifest: String,
    }

    impl Harness {
        fn new() -> Self {
            let temp_dir = tempfile::tempdir().unwrap();
            let manifest = temp_dir.path().join("us-west-2.json");
            std::fs::write(
                &manifest,
                r#"{"sample_name": "NA12878", "read_group": "Sample_U0a", "platform": "illumina"}"#,
            )
            .unwrap();
            Self {
                manifest: manifest.to_str().unwrap().to_string(),
                _temp_dir: temp_dir,
            }
        }

        fn app(&self, extra: &[(&str, Value)], runner: Arc<CountingRunner>) -> Router {
            let mut overrides = serde_json::Map::new();
            overrides.insert("local_file".to_string(), json!(self.manifest));
            overrides.insert("TEST_UUID".to_string(), json!("fixed"));
            for (key, value) in extra {
                overrides.insert(key.to_string(), value.clone());
            }
            let context =
                ConfigContext::from_sources(overrides, vec![], omics_quilt_core::default_values());
            router(Arc::new(AppState::new(
                context,
                ResourceLocator::new(),
                runner,
                None,
            )))
        }
    }

    fn event(keys: &[&str]) -> Value {
        let records: Vec<Value> = keys
            .iter()
            .map(|key| {
                json!({
                    "eventName": "ObjectCreated:Put",
                    "s3": {"bucket": {"name": "inputs"}, "object": {"key": key}}
                })
            })
            .collect();
        json!({ "Records": records })
    }

    async fn post_event(app: Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/events")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let harness = Harness::new();
        let app = harness.app(&[], Arc::new(CountingRunner::default()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_event_submits_run() {
        let harness = Harness::new();
        let runner = Arc::new(CountingRunner::default());
        let (status, body) =
            post_event(harness.app(&[], runner.clone()), event(&["fastq/a.json"])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Success"}));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dry_run_event() {
        let harness = Harness::new();
        let runner = Arc::new(CountingRunner::default());
        let app = harness.app(&[("debug", json!("true"))], runner.clone());
        let (status, _) = post_event(app, event(&["fastq/a.json"])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_input_errors_are_unprocessable() {
        let harness = Harness::new();
        let runner = Arc::new(CountingRunner::default());

        let (status, body) = post_event(harness.app(&[], runner.clone()), event(&[])).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "No file detected for analysis");

        let (status, _) =
            post_event(harness.app(&[], runner.clone()), event(&["a.json", "b.json"])).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = post_event(harness.app(&[], runner.clone()), json!({"x": 1})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_runner_failure_is_bad_gateway() {
        let harness = Harness::new();
        let runner = Arc::new(CountingRunner {
            fail: true,
            ..Default::default()
        });
        let (status, _) = post_event(harness.app(&[], runner), event(&["fastq/a.json"])).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_bad_timeout_is_internal_error() {
        let harness = Harness::new();
        let app = harness.app(
            &[("TIMEOUT", json!("soon"))],
            Arc::new(CountingRunner::default()),
        );
        let (status, body) = post_event(app, event(&["fastq/a.json"])).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("TIMEOUT"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&QuiltError::NoInput), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_for(&QuiltError::PartialFailure { failed: 1, total: 1 }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&QuiltError::NotFound("s3://a/b.json".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
