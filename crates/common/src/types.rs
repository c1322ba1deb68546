//! Core data model for the message pipeline: inbound envelopes, admission
//! results, classification output, and the routing decision handed to the
//! response generator.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::event::ViolationKind;

// ── Source platforms ────────────────────────────────────────────────────────

/// Where an inbound message came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourcePlatform {
    Telegram,
    Discord,
    Twitter,
    WebSocket,
    Api,
}

impl SourcePlatform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Discord => "discord",
            Self::Twitter => "twitter",
            Self::WebSocket => "web_socket",
            Self::Api => "api",
        }
    }
}

/// Kind of conversation the message arrived in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    #[default]
    Dm,
    Group,
    Channel,
}

// ── Inbound envelope ────────────────────────────────────────────────────────

/// One inbound chat message plus routing metadata.
///
/// Immutable after construction; enrichment stages produce new derived
/// values instead of mutating the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub source_platform: SourcePlatform,
    /// Opaque sender identifier as reported by the source platform.
    pub sender_id: String,
    #[serde(default)]
    pub sender_display_name: String,
    pub room_id: String,
    /// Unique per source + room.
    pub message_id: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
    /// Transport-specific extras (e.g. `source_ip` for socket clients).
    #[serde(default)]
    pub raw_metadata: serde_json::Map<String, serde_json::Value>,
}

impl MessageEnvelope {
    /// Build an envelope stamped with the current receive time.
    #[must_use]
    pub fn new(
        source_platform: SourcePlatform,
        sender_id: impl Into<String>,
        room_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source_platform,
            sender_id: sender_id.into(),
            sender_display_name: String::new(),
            room_id: room_id.into(),
            message_id: message_id.into(),
            text: text.into(),
            received_at: Utc::now(),
            raw_metadata: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.sender_display_name = name.into();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.raw_metadata.insert(key.into(), value);
        self
    }

    /// Metadata value as a string, if present and a string.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.raw_metadata.get(key).and_then(|v| v.as_str())
    }

    /// Deterministic correlation id for hosts that drive pipeline stages
    /// directly. The pipeline substitutes a per-message uuid instead.
    #[must_use]
    pub fn derive_trace_id(&self) -> String {
        let message_id = if self.message_id.is_empty() {
            "-"
        } else {
            self.message_id.as_str()
        };
        format!(
            "{}:{}:{}",
            self.source_platform.as_str(),
            self.room_id,
            message_id
        )
    }
}

// ── Admission ───────────────────────────────────────────────────────────────

/// Why the gate rejected an envelope. Rejects are values, never errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum RejectReason {
    EmptyText,
    TextTooLong { limit: usize },
    MissingField { field: String },
    RateLimited { retry_after_secs: u64 },
    Blocked { retry_after_secs: u64 },
    ContentRejected { violation: ViolationKind },
}

impl RejectReason {
    /// Stable reason code, as recorded in telemetry.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyText => "empty-text",
            Self::TextTooLong { .. } => "text-too-long",
            Self::MissingField { .. } => "missing-field",
            Self::RateLimited { .. } => "rate-limited",
            Self::Blocked { .. } => "blocked",
            Self::ContentRejected { .. } => "content-rejected",
        }
    }
}

/// Outcome of the admission gate for one envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AdmissionResult {
    Accepted,
    Rejected { reason: RejectReason },
}

impl AdmissionResult {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Accepted => None,
            Self::Rejected { reason } => Some(reason),
        }
    }
}

// ── Classification ──────────────────────────────────────────────────────────

/// Closed set of response strategies a message can be routed to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    GeneralConversation,
    CoordinationRequest,
    DomainAnalysis,
    LightheartedContent,
    UserSupport,
    DeepPersonaInteraction,
    EmergencyHandling,
}

impl Strategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeneralConversation => "general-conversation",
            Self::CoordinationRequest => "coordination-request",
            Self::DomainAnalysis => "domain-analysis",
            Self::LightheartedContent => "lighthearted-content",
            Self::UserSupport => "user-support",
            Self::DeepPersonaInteraction => "deep-persona-interaction",
            Self::EmergencyHandling => "emergency-handling",
        }
    }

    /// All strategies, in tie-break priority order (highest first).
    ///
    /// When two strategies score equally, the earlier entry wins, so urgent
    /// intents are never shadowed by casual ones.
    #[must_use]
    pub fn priority_order() -> [Self; 7] {
        [
            Self::EmergencyHandling,
            Self::UserSupport,
            Self::CoordinationRequest,
            Self::DomainAnalysis,
            Self::DeepPersonaInteraction,
            Self::LightheartedContent,
            Self::GeneralConversation,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
}

/// A monetary amount spotted in message text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonetaryAmount {
    pub value: f64,
    /// Upper-cased currency marker, e.g. `USD` or `SOL`.
    pub currency: String,
}

/// Structured values extracted from message text, independent of the
/// selected strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedVariables {
    /// `@name` spans, without the leading `@`.
    pub mentions: Vec<String>,
    /// Hits from the configured token-symbol vocabulary, upper-cased.
    pub token_symbols: Vec<String>,
    pub monetary_amounts: Vec<MonetaryAmount>,
    pub urls: Vec<String>,
    pub sentiment: Sentiment,
    pub urgency: Urgency,
}

/// Result of classifying one admitted message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub selected_strategy: Strategy,
    /// Normalized to 0.0–1.0.
    pub confidence_score: f32,
    pub extracted_variables: ExtractedVariables,
    pub nubi_mentioned: bool,
    pub randomly_triggered: bool,
}

// ── Routing decision ────────────────────────────────────────────────────────

/// The sole artifact crossing the boundary to the response generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingDecision {
    pub classification: ClassificationResult,
    /// Whether the responder should produce a reply at all.
    pub engage: bool,
    /// Correlation id carried through telemetry for this envelope.
    pub trace_id: String,
    /// Stable cross-platform handle for the sender (resolved or synthesized).
    pub internal_handle: String,
}
