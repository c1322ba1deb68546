//! Pipeline telemetry events and the sink seam stages emit them through.

use {
    chrono::Utc,
    serde::{Deserialize, Serialize},
};

use crate::types::{SourcePlatform, Strategy};

// ── Violations ──────────────────────────────────────────────────────────────

/// Category of content-screening violation that caused a security reject.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    PromptInjection,
    Malicious,
    Scam,
    Spam,
    Flood,
}

impl ViolationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PromptInjection => "prompt_injection",
            Self::Malicious => "malicious",
            Self::Scam => "scam",
            Self::Spam => "spam",
            Self::Flood => "flood",
        }
    }
}

// ── Events ──────────────────────────────────────────────────────────────────

/// Fields every pipeline event carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventMeta {
    pub trace_id: String,
    pub timestamp_ms: i64,
    pub platform: SourcePlatform,
    pub processing_time_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventMeta {
    /// A successful event stamped with the current wall-clock time.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, platform: SourcePlatform) -> Self {
        Self {
            trace_id: trace_id.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
            platform,
            processing_time_ms: 0,
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.processing_time_ms = elapsed_ms;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// One structured event per pipeline stage, queued then flushed by the
/// telemetry emitter. Never persisted locally beyond the in-memory buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Gate accepted or rejected an envelope on shape/quota grounds.
    Admission {
        #[serde(flatten)]
        meta: EventMeta,
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Mention / probabilistic-engagement outcome for an admitted envelope.
    Engagement {
        #[serde(flatten)]
        meta: EventMeta,
        addressed: bool,
        randomly_triggered: bool,
        engaged: bool,
    },
    /// Final strategy selection for an admitted envelope.
    Routing {
        #[serde(flatten)]
        meta: EventMeta,
        strategy: Strategy,
        confidence: f32,
    },
    /// Content screening or block-table rejection.
    Security {
        #[serde(flatten)]
        meta: EventMeta,
        violation: ViolationKind,
        detail: String,
    },
}

impl PipelineEvent {
    #[must_use]
    pub fn meta(&self) -> &EventMeta {
        match self {
            Self::Admission { meta, .. }
            | Self::Engagement { meta, .. }
            | Self::Routing { meta, .. }
            | Self::Security { meta, .. } => meta,
        }
    }

    /// Event kind tag, matching the serialized `kind` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Admission { .. } => "admission",
            Self::Engagement { .. } => "engagement",
            Self::Routing { .. } => "routing",
            Self::Security { .. } => "security",
        }
    }
}

// ── Sink seam ───────────────────────────────────────────────────────────────

/// Where pipeline stages hand off events.
///
/// Implementations must return immediately and must never fail the caller:
/// telemetry is a side channel, not part of message handling.
pub trait PipelineEventSink: Send + Sync {
    fn record(&self, event: PipelineEvent);
}

/// Discards every event. Used when telemetry is disabled and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl PipelineEventSink for NoopEventSink {
    fn record(&self, _event: PipelineEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_kind_tag() {
        let event = PipelineEvent::Admission {
            meta: EventMeta::new("t-1", SourcePlatform::Telegram),
            accepted: false,
            reason: Some("rate-limited".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "admission");
        assert_eq!(json["trace_id"], "t-1");
        assert_eq!(json["platform"], "telegram");
        assert_eq!(json["accepted"], false);
        assert_eq!(json["reason"], "rate-limited");
    }

    #[test]
    fn meta_error_marks_failure() {
        let meta = EventMeta::new("t-2", SourcePlatform::Api).with_error("lookup timed out");
        assert!(!meta.success);
        assert_eq!(meta.error.as_deref(), Some("lookup timed out"));
    }

    #[test]
    fn kind_matches_variant() {
        let event = PipelineEvent::Security {
            meta: EventMeta::new("t-3", SourcePlatform::Discord),
            violation: ViolationKind::PromptInjection,
            detail: "rule prompt-injection".into(),
        };
        assert_eq!(event.kind(), "security");
        assert_eq!(event.meta().trace_id, "t-3");
    }
}
