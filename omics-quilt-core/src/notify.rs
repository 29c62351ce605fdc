use crate::config::ConfigContext;
use crate::{QuiltError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub const STATUS_TOPIC_KEY: &str = "STATUS_TOPIC_ARN";

/// Marker carried by replayed fixture events; such messages are never published.
const SELF_TEST_MARKERS: &[&str] = &["\"eventVersion\": \"0.0\"", "\"eventVersion\":\"0.0\""];

#[async_trait]
pub trait TopicPublisher: Send + Sync {
    async fn publish(&self, topic: &str, message: &str) -> Result<()>;
}

pub type DynTopicPublisher = Arc<dyn TopicPublisher>;

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    #[serde(rename = "TopicArn")]
    topic_arn: &'a str,
    #[serde(rename = "Message")]
    message: &'a str,
}

/// Publishes by POSTing `{"TopicArn", "Message"}` to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpTopicPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTopicPublisher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TopicPublisher for HttpTopicPublisher {
    async fn publish(&self, topic: &str, message: &str) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(&PublishRequest {
                topic_arn: topic,
                message,
            })
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|error| QuiltError::Notify(error.to_string()))?;
        Ok(())
    }
}

/// Best-effort status publication. Never fails the caller.
#[derive(Clone, Default)]
pub struct NotificationSink {
    topic: Option<String>,
    publisher: Option<DynTopicPublisher>,
}

impl NotificationSink {
    pub fn new(topic: Option<String>, publisher: Option<DynTopicPublisher>) -> Self {
        let topic = topic.filter(|topic| !topic.trim().is_empty());
        Self { topic, publisher }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_context(context: &ConfigContext, publisher: Option<DynTopicPublisher>) -> Self {
        Self::new(context.get_non_empty(STATUS_TOPIC_KEY), publisher)
    }

    /// Returns whether the message was handed to the publisher successfully.
    pub async fn publish(&self, message: &str) -> bool {
        if message.is_empty() {
            return false;
        }
        let (Some(topic), Some(publisher)) = (&self.topic, &self.publisher) else {
            return false;
        };
        if SELF_TEST_MARKERS.iter().any(|marker| message.contains(marker)) {
            tracing::debug!("Suppressing notification for self-test payload");
            return false;
        }

        tracing::debug!("Publishing status to {}: {}", topic, message);
        match publisher.publish(topic, message).await {
            Ok(()) => true,
            Err(error) => {
                tracing::error!("Failed to publish status to {}: {}", topic, error);
                false
            }
        }
    }
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSink")
            .field("topic", &self.topic)
            .field("publisher", &self.publisher.is_some())
            .finish()
    }
}
