use awlr_core::TopicKind;
use awlr_core::topic::parse_device_topic;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::BackendConfig;
use crate::transport::InboundMessage;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0} is not a device topic")]
    NotDeviceTopic(String),
    #[error("payload on {topic} is not JSON: {source}")]
    InvalidPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    SensorUpdate,
    StatusUpdate,
}

impl From<TopicKind> for NotificationEvent {
    fn from(kind: TopicKind) -> Self {
        match kind {
            TopicKind::Data => NotificationEvent::SensorUpdate,
            TopicKind::Status => NotificationEvent::StatusUpdate,
        }
    }
}

/// Body of the ingestion call: the raw message as received.
#[derive(Debug, Serialize)]
pub struct IngestRequest<'a> {
    pub topic: &'a str,
    pub payload: &'a str,
}

/// Body of the notification call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRequest {
    pub device_id: String,
    pub event: NotificationEvent,
    pub sensor_data: serde_json::Value,
}

impl NotificationRequest {
    /// Derive the notification for a device message. Fails for topics outside
    /// the device namespace and for payloads that are not JSON.
    pub fn from_message(message: &InboundMessage) -> Result<Self, BackendError> {
        let (device_id, kind) = parse_device_topic(&message.topic)
            .ok_or_else(|| BackendError::NotDeviceTopic(message.topic.clone()))?;
        let sensor_data = serde_json::from_slice(&message.payload).map_err(|source| {
            BackendError::InvalidPayload {
                topic: message.topic.clone(),
                source,
            }
        })?;

        Ok(Self {
            device_id: device_id.to_owned(),
            event: kind.into(),
            sensor_data,
        })
    }
}

/// HTTP client for the ingestion and notification functions.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Hand the raw message to the ingestion function.
    pub async fn ingest(&self, message: &InboundMessage) -> Result<(), BackendError> {
        let payload = message.payload_str();
        let body = IngestRequest {
            topic: &message.topic,
            payload: &payload,
        };
        self.post(&self.config.ingest_function, &body).await
    }

    pub async fn notify(&self, request: &NotificationRequest) -> Result<(), BackendError> {
        self.post(&self.config.notify_function, request).await
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        function: &str,
        body: &B,
    ) -> Result<(), BackendError> {
        let url = self.config.function_url(function);
        let mut request = self.http.post(&url).json(body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(%url, %status, "Backend call succeeded");
        Ok(())
    }
}
