use crate::{QuiltError, Result};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Placeholder used in run names when a manifest has no sample name.
pub const UNNAMED_SAMPLE: &str = "undefined";

/// One sequencing sample: a single read group with its paired FASTQ files.
///
/// Fields missing from the source document stay `None` and are passed on
/// as-is; the remote API decides whether they are acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleManifest {
    pub sample_name: Option<String>,
    pub read_group: Option<String>,
    pub fastq_path_r1: Option<String>,
    pub fastq_path_r2: Option<String>,
    pub platform: Option<String>,
}

impl SampleManifest {
    pub fn from_value(value: &Value) -> Result<Self> {
        let record = value.as_object().ok_or_else(|| {
            QuiltError::InvalidManifest(format!("expected a map, found {}", kind_of(value)))
        })?;

        let field = |name: &str| match record.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        };

        Ok(Self {
            sample_name: field("sample_name"),
            read_group: field("read_group"),
            fastq_path_r1: field("fastq_1"),
            fastq_path_r2: field("fastq_2"),
            platform: field("platform"),
        })
    }

    pub fn display_name(&self) -> &str {
        self.sample_name.as_deref().unwrap_or(UNNAMED_SAMPLE)
    }
}

#[derive(Serialize)]
struct WireManifest<'a> {
    sample_name: Option<&'a str>,
    fastq_pairs: [WireFastqPair<'a>; 1],
}

#[derive(Serialize)]
struct WireFastqPair<'a> {
    read_group: Option<&'a str>,
    fastq_1: Option<&'a str>,
    fastq_2: Option<&'a str>,
    platform: Option<&'a str>,
}

/// Serializes in the workflow parameter shape:
/// `{"sample_name", "fastq_pairs": [{"read_group", "fastq_1", "fastq_2", "platform"}]}`.
impl Serialize for SampleManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        WireManifest {
            sample_name: self.sample_name.as_deref(),
            fastq_pairs: [WireFastqPair {
                read_group: self.read_group.as_deref(),
                fastq_1: self.fastq_path_r1.as_deref(),
                fastq_2: self.fastq_path_r2.as_deref(),
                platform: self.platform.as_deref(),
            }],
        }
        .serialize(serializer)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn na12878() -> Value {
        json!({
            "sample_name": "NA12878",
            "read_group": "Sample_U0a",
            "fastq_1": "s3://omics-us-west-2/sample-inputs/NA12878/Sample_U0a/U0a_CGATGT_L001_R1_001.fastq.gz",
            "fastq_2": "s3://omics-us-west-2/sample-inputs/NA12878/Sample_U0a/U0a_CGATGT_L001_R2_001.fastq.gz",
            "platform": "illumina"
        })
    }

    #[test]
    fn test_from_value_projects_fields() {
        let manifest = SampleManifest::from_value(&na12878()).unwrap();
        assert_eq!(manifest.sample_name.as_deref(), Some("NA12878"));
        assert_eq!(manifest.read_group.as_deref(), Some("Sample_U0a"));
        assert!(manifest.fastq_path_r1.unwrap().contains("NA12878/Sample_U0a/U0a_CGATGT_L001_R1_001"));
        assert!(manifest.fastq_path_r2.unwrap().contains("NA12878/Sample_U0a/U0a_CGATGT_L001_R2_001"));
        assert_eq!(manifest.platform.as_deref(), Some("illumina"));
    }

    #[test]
    fn test_missing_fields_stay_absent() {
        let manifest = SampleManifest::from_value(&json!({"sample_name": "NA12878"})).unwrap();
        assert_eq!(manifest.read_group, None);
        assert_eq!(manifest.platform, None);

        let empty = SampleManifest::from_value(&json!({})).unwrap();
        assert_eq!(empty.display_name(), UNNAMED_SAMPLE);
    }

    #[test]
    fn test_non_map_is_rejected() {
        let error = SampleManifest::from_value(&json!("NA12878")).unwrap_err();
        assert!(matches!(error, QuiltError::InvalidManifest(_)));
    }

    #[test]
    fn test_serializes_in_parameter_shape() {
        let manifest = SampleManifest::from_value(&na12878()).unwrap();
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["sample_name"], "NA12878");
        let pairs = value["fastq_pairs"].as_array().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0]["read_group"], "Sample_U0a");
        assert_eq!(pairs[0]["platform"], "illumina");
        assert_eq!(pairs[0]["fastq_1"], na12878()["fastq_1"]);
    }
}
