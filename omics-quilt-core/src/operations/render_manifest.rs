use crate::locator::{ResourceAddress, ResourceLocator};
use crate::Result;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct RenderManifestOperationRequest {
    pub template: String,
    pub region: String,
    pub timestamp: Option<String>,
    /// Directory that receives `<region>/<region>.json`; the template's own
    /// directory when unset.
    pub out_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderManifestOperationResult {
    pub destination: ResourceAddress,
    pub manifest: Value,
}

/// Renders a region-specific sample manifest from a template.
#[derive(Debug, Clone)]
pub struct RenderManifestOperation {
    locator: ResourceLocator,
}

impl RenderManifestOperation {
    pub fn new(locator: ResourceLocator) -> Self {
        Self { locator }
    }

    pub async fn run(
        &self,
        request: RenderManifestOperationRequest,
    ) -> Result<RenderManifestOperationResult> {
        let template = ResourceAddress::parse(&request.template)?;

        let timestamp = request
            .timestamp
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        let mut context = Map::new();
        context.insert("region".to_string(), Value::String(request.region.clone()));
        context.insert("timestamp".to_string(), Value::String(timestamp));

        let template = template.with_substitution_context(context);
        let manifest = self.locator.load_document(&template).await?;

        let base = match &request.out_dir {
            Some(dir) => ResourceAddress::parse(dir)?,
            None => template.parent(),
        };
        let destination = base
            .join(&request.region)
            .join(&format!("{}.json", request.region));

        let body = serde_json::to_vec_pretty(&manifest)?;
        self.locator.save(&destination, body).await?;
        tracing::info!("Rendered {} to {}", template, destination);

        Ok(RenderManifestOperationResult {
            destination,
            manifest,
        })
    }
}
