//! Shared types, events, and error utilities used across all nubi crates.

pub mod error;
pub mod event;
pub mod metric;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    event::{EventMeta, NoopEventSink, PipelineEvent, PipelineEventSink, ViolationKind},
    types::{
        AdmissionResult, ChatType, ClassificationResult, ExtractedVariables, MessageEnvelope,
        MonetaryAmount, RejectReason, RoutingDecision, Sentiment, SourcePlatform, Strategy,
        Urgency,
    },
};
