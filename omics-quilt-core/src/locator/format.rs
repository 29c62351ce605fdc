use super::template;
use crate::{QuiltError, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "json" => Ok(DocumentFormat::Json),
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            other => Err(QuiltError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Decodes raw bytes into a structured value without narrowing.
pub fn parse_document(
    raw: &[u8],
    format: DocumentFormat,
    context: &Map<String, Value>,
) -> Result<Value> {
    let text = std::str::from_utf8(raw)
        .map_err(|error| QuiltError::Parse(format!("document is not utf-8: {}", error)))?;

    let rendered;
    let text = if context.is_empty() {
        text
    } else {
        rendered = template::render(text, context);
        rendered.as_str()
    };

    let value = match format {
        DocumentFormat::Json => serde_json::from_str(text)?,
        DocumentFormat::Yaml => serde_yaml::from_str(text)?,
    };
    Ok(value)
}

/// Manifests describe one record. A top-level sequence is narrowed to its
/// first element; any further elements are ignored.
pub fn parse_single(value: Value) -> Result<Value> {
    match value {
        Value::Array(items) => {
            if items.len() > 1 {
                tracing::warn!(
                    "document holds {} records; only the first is used",
                    items.len()
                );
            }
            items
                .into_iter()
                .next()
                .ok_or_else(|| QuiltError::Parse("document is an empty sequence".to_string()))
        }
        other => Ok(other),
    }
}
