//! Metric name and label definitions.
//!
//! Centralized so every crate reports under consistent names. The `metrics`
//! facade macros live in the crates that record; only the names live here.

/// Admission gate metrics.
pub mod admission {
    /// Total envelopes evaluated by the gate.
    pub const MESSAGES_TOTAL: &str = "nubi_admission_messages_total";
    /// Total envelopes rejected, labeled by reason code.
    pub const REJECTED_TOTAL: &str = "nubi_admission_rejected_total";
    /// Total keys escalated into the block table.
    pub const BLOCKS_TOTAL: &str = "nubi_admission_blocks_total";
    /// Gate decision duration in seconds.
    pub const DECISION_DURATION_SECONDS: &str = "nubi_admission_decision_duration_seconds";
}

/// Intelligence router metrics.
pub mod router {
    /// Total admitted envelopes routed.
    pub const MESSAGES_TOTAL: &str = "nubi_router_messages_total";
    /// Total engagement decisions, labeled by trigger.
    pub const ENGAGED_TOTAL: &str = "nubi_router_engaged_total";
    /// Identity lookups that fell back to a synthesized handle.
    pub const IDENTITY_FALLBACKS_TOTAL: &str = "nubi_router_identity_fallbacks_total";
    /// Routing duration in seconds.
    pub const ROUTE_DURATION_SECONDS: &str = "nubi_router_route_duration_seconds";
}

/// Telemetry emitter metrics.
pub mod telemetry {
    /// Events accepted into the buffer.
    pub const EVENTS_RECORDED_TOTAL: &str = "nubi_telemetry_events_recorded_total";
    /// Events dropped (full channel, overflow, or retry exhaustion).
    pub const EVENTS_DROPPED_TOTAL: &str = "nubi_telemetry_events_dropped_total";
    /// Batches successfully delivered to the sink.
    pub const BATCHES_FLUSHED_TOTAL: &str = "nubi_telemetry_batches_flushed_total";
    /// Flush attempts that failed.
    pub const FLUSH_FAILURES_TOTAL: &str = "nubi_telemetry_flush_failures_total";
    /// Flush duration in seconds.
    pub const FLUSH_DURATION_SECONDS: &str = "nubi_telemetry_flush_duration_seconds";
}

/// Common label keys.
pub mod labels {
    pub const PLATFORM: &str = "platform";
    pub const REASON: &str = "reason";
    pub const STRATEGY: &str = "strategy";
    pub const TRIGGER: &str = "trigger";
}
