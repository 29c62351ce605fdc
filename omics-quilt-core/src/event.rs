//! Storage-creation events that trigger a submission.

use crate::locator::ResourceAddress;
use crate::{QuiltError, Result};
use serde::Deserialize;
use serde_json::Value;

/// The object a storage event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObjectRef {
    pub container: String,
    pub key: String,
    pub container_arn: Option<String>,
    pub event_name: Option<String>,
}

impl StorageObjectRef {
    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::object(&self.container, &self.key)
    }

    pub fn to_uri(&self) -> String {
        format!("s3://{}/{}", self.container, self.key)
    }
}

/// Event version carried by replayed fixture events.
pub const SELF_TEST_EVENT_VERSION: &str = "0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    records: Vec<StorageObjectRef>,
    self_test: bool,
}

#[derive(Deserialize)]
struct NotificationEnvelope {
    #[serde(rename = "Records")]
    records: Vec<NotificationRecord>,
}

#[derive(Deserialize)]
struct NotificationRecord {
    #[serde(rename = "eventVersion", default)]
    event_version: Option<String>,
    #[serde(rename = "eventName", default)]
    event_name: Option<String>,
    s3: NotificationEntity,
}

#[derive(Deserialize)]
struct NotificationEntity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Deserialize)]
struct BucketEntity {
    name: String,
    #[serde(default)]
    arn: Option<String>,
}

#[derive(Deserialize)]
struct ObjectEntity {
    key: String,
}

#[derive(Deserialize)]
struct RuleEnvelope {
    #[serde(rename = "detail-type", default)]
    detail_type: Option<String>,
    detail: NotificationEntity,
}

impl StorageEvent {
    pub fn new(records: Vec<StorageObjectRef>) -> Self {
        Self {
            records,
            self_test: false,
        }
    }

    /// Accepts bucket notifications (`Records[].s3`) and event-rule payloads
    /// (`detail.bucket` / `detail.object`).
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.get("Records").is_some() {
            let envelope: NotificationEnvelope = serde_json::from_value(value.clone())
                .map_err(|error| QuiltError::InvalidEvent(error.to_string()))?;
            let self_test = envelope
                .records
                .iter()
                .any(|record| record.event_version.as_deref() == Some(SELF_TEST_EVENT_VERSION));
            let records = envelope
                .records
                .into_iter()
                .map(|record| StorageObjectRef {
                    container: record.s3.bucket.name,
                    key: record.s3.object.key,
                    container_arn: record.s3.bucket.arn,
                    event_name: record.event_name,
                })
                .collect();
            return Ok(Self { records, self_test });
        }

        if value.get("detail").is_some() {
            let envelope: RuleEnvelope = serde_json::from_value(value.clone())
                .map_err(|error| QuiltError::InvalidEvent(error.to_string()))?;
            return Ok(Self {
                records: vec![StorageObjectRef {
                    container: envelope.detail.bucket.name,
                    key: envelope.detail.object.key,
                    container_arn: envelope.detail.bucket.arn,
                    event_name: envelope.detail_type,
                }],
                self_test: false,
            });
        }

        Err(QuiltError::InvalidEvent(
            "expected 'Records' or 'detail' in event payload".to_string(),
        ))
    }

    /// True when any record is a replayed fixture; status is never published for those.
    pub fn is_self_test(&self) -> bool {
        self.self_test
    }

    pub fn records(&self) -> &[StorageObjectRef] {
        &self.records
    }

    /// The single triggering object; batches are not supported.
    pub fn single(&self) -> Result<&StorageObjectRef> {
        match self.records.as_slice() {
            [record] => Ok(record),
            [] => Err(QuiltError::NoInput),
            records => Err(QuiltError::UnsupportedBatch(records.len())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn notification(records: &[(&str, &str)]) -> Value {
        let records: Vec<Value> = records
            .iter()
            .map(|(bucket, key)| {
                json!({
                    "eventVersion": "2.1",
                    "eventSource": "aws:s3",
                    "awsRegion": "us-west-2",
                    "eventTime": "2023-11-17T00:51:47.862Z",
                    "eventName": "ObjectCreated:Put",
                    "s3": {
                        "s3SchemaVersion": "1.0",
                        "bucket": {"name": bucket, "arn": format!("arn:aws:s3:::{}", bucket)},
                        "object": {"key": key, "size": 425}
                    }
                })
            })
            .collect();
        json!({ "Records": records })
    }

    #[test]
    fn test_single_notification_record() {
        let event =
            StorageEvent::from_value(&notification(&[("inputs", "fastq/us-west-2/us-west-2.json")]))
                .unwrap();
        let record = event.single().unwrap();
        assert_eq!(record.container, "inputs");
        assert_eq!(record.key, "fastq/us-west-2/us-west-2.json");
        assert_eq!(record.container_arn.as_deref(), Some("arn:aws:s3:::inputs"));
        assert_eq!(record.event_name.as_deref(), Some("ObjectCreated:Put"));
        assert_eq!(record.to_uri(), "s3://inputs/fastq/us-west-2/us-west-2.json");
        assert_eq!(record.address().to_uri(), record.to_uri());
        assert!(!event.is_self_test());
    }

    #[test]
    fn test_fixture_event_version_marks_self_test() {
        let mut value = notification(&[("inputs", "fastq/us-west-2/us-west-2.json")]);
        value["Records"][0]["eventVersion"] = json!("0.0");
        let event = StorageEvent::from_value(&value).unwrap();
        assert!(event.is_self_test());
        assert_eq!(event.single().unwrap().container, "inputs");
    }

    #[test]
    fn test_record_count_errors() {
        let empty = StorageEvent::from_value(&notification(&[])).unwrap();
        assert!(matches!(empty.single(), Err(QuiltError::NoInput)));

        let batch =
            StorageEvent::from_value(&notification(&[("a", "x.json"), ("b", "y.json")])).unwrap();
        assert!(matches!(batch.single(), Err(QuiltError::UnsupportedBatch(2))));
    }

    #[test]
    fn test_rule_event_shape() {
        let event = StorageEvent::from_value(&json!({
            "detail-type": "Object Created",
            "detail": {
                "bucket": {"name": "outputs"},
                "object": {"key": "runs/1234/out/report.txt"}
            }
        }))
        .unwrap();
        let record = event.single().unwrap();
        assert_eq!(record.container, "outputs");
        assert_eq!(record.event_name.as_deref(), Some("Object Created"));
    }

    #[test]
    fn test_unrecognized_payload() {
        assert!(matches!(
            StorageEvent::from_value(&json!({"hello": "world"})),
            Err(QuiltError::InvalidEvent(_))
        ));
        assert!(matches!(
            StorageEvent::from_value(&json!({"Records": [{"s3": {}}]})),
            Err(QuiltError::InvalidEvent(_))
        ));
    }
}
