//! Analytics sink seam and the HTTP implementation.

use std::time::Duration;

use {async_trait::async_trait, nubi_common::PipelineEvent};

/// Error type returned by sink deliveries.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink returned status {status}")]
    Status { status: u16 },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("{0}")]
    Message(String),
}

/// Append-only analytics store receiving event batches.
///
/// Any error is treated as a flush failure: the emitter requeues and
/// eventually drops, it never propagates.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn insert_batch(&self, events: &[PipelineEvent]) -> Result<(), SinkError>;
}

/// Delivers batches as newline-delimited JSON over HTTP POST.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    /// Build a sink posting to `endpoint` with a bounded request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AnalyticsSink for HttpSink {
    async fn insert_batch(&self, events: &[PipelineEvent]) -> Result<(), SinkError> {
        let mut body = String::new();
        for event in events {
            let line = serde_json::to_string(event).map_err(|e| SinkError::Message(e.to_string()))?;
            body.push_str(&line);
            body.push('\n');
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Swallows every batch. Used when telemetry is disabled.
pub struct NoopSink;

#[async_trait]
impl AnalyticsSink for NoopSink {
    async fn insert_batch(&self, _events: &[PipelineEvent]) -> Result<(), SinkError> {
        Ok(())
    }
}
