//! End-to-end wiring: envelope → admission gate → intelligence router, with
//! telemetry as a side channel.
//!
//! The pipeline owns no lifecycle. Collaborators are constructor-injected
//! and any host can also drive the gate and router directly.

use std::sync::Arc;

use {
    nubi_admission::AdmissionGate,
    nubi_common::{AdmissionResult, MessageEnvelope, PipelineEventSink, RoutingDecision},
    nubi_policy::PolicyStore,
    nubi_router::{IdentityResolver, IntelligenceRouter},
    nubi_telemetry::TelemetryEmitter,
    tracing::debug,
    uuid::Uuid,
};

/// The two-stage preprocessing pipeline.
pub struct MessagePipeline {
    gate: AdmissionGate,
    router: IntelligenceRouter,
}

impl MessagePipeline {
    /// Wire a pipeline from its collaborators. The same policy store and
    /// event sink feed both stages.
    #[must_use]
    pub fn new(
        policy: PolicyStore,
        resolver: Arc<dyn IdentityResolver>,
        events: Arc<dyn PipelineEventSink>,
    ) -> Self {
        Self {
            gate: AdmissionGate::new(policy.clone(), events.clone()),
            router: IntelligenceRouter::new(policy, resolver, events),
        }
    }

    /// Convenience constructor that also spawns the telemetry emitter the
    /// policy describes. The returned emitter is the pipeline's event sink;
    /// call its `cleanup` on shutdown.
    #[must_use]
    pub fn with_telemetry(
        policy: PolicyStore,
        resolver: Arc<dyn IdentityResolver>,
    ) -> (Self, Arc<TelemetryEmitter>) {
        let emitter = Arc::new(TelemetryEmitter::from_policy(&policy.current().telemetry));
        let pipeline = Self::new(policy, resolver, emitter.clone());
        (pipeline, emitter)
    }

    /// Process one inbound envelope.
    ///
    /// Returns the routing decision for admitted messages and `None` for
    /// rejected ones. Never fails: rejection reasons travel through
    /// telemetry, and the user-visible behavior on any failure is silence.
    pub async fn process(&self, envelope: &MessageEnvelope) -> Option<RoutingDecision> {
        let trace_id = Uuid::new_v4().to_string();
        match self.gate.admit_with_trace(envelope, &trace_id) {
            AdmissionResult::Accepted => {
                Some(self.router.route_with_trace(envelope, &trace_id).await)
            },
            AdmissionResult::Rejected { reason } => {
                debug!(reason = reason.code(), "envelope not admitted");
                None
            },
        }
    }

    /// The admission gate, for hosts that need the accept/reject decision
    /// without routing.
    #[must_use]
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// The router, for hosts that admit through other means.
    #[must_use]
    pub fn router(&self) -> &IntelligenceRouter {
        &self.router
    }
}
