//! The router itself: identity → mention → engagement → classification →
//! extraction, combined into a routing decision.

use std::{sync::Arc, time::{Duration, Instant}};

use {
    nubi_common::{
        ClassificationResult, EventMeta, MessageEnvelope, PipelineEvent, PipelineEventSink,
        RoutingDecision,
    },
    nubi_policy::PolicyStore,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use {
    metrics::{counter, histogram},
    nubi_common::metric::{labels, router as router_metrics},
};

use crate::{
    classify::Classifier,
    engagement::should_engage_randomly,
    extract::extract,
    identity::{IdentityResolver, resolve_with_timeout, synthesized_handle},
    mention::is_addressed,
};

/// Makes the engagement and strategy decision for admitted envelopes.
///
/// Collaborators are constructor-injected; the router has no lifecycle of
/// its own and any host can drive [`route`](Self::route) directly.
pub struct IntelligenceRouter {
    policy: PolicyStore,
    resolver: Arc<dyn IdentityResolver>,
    classifier: Classifier,
    events: Arc<dyn PipelineEventSink>,
}

impl IntelligenceRouter {
    #[must_use]
    pub fn new(
        policy: PolicyStore,
        resolver: Arc<dyn IdentityResolver>,
        events: Arc<dyn PipelineEventSink>,
    ) -> Self {
        Self {
            policy,
            resolver,
            classifier: Classifier::new(),
            events,
        }
    }

    /// Route one admitted envelope.
    ///
    /// Infallible: every enrichment sub-step degrades to a safe default, so
    /// the caller always receives a decision.
    pub async fn route(&self, envelope: &MessageEnvelope) -> RoutingDecision {
        self.route_with_trace(envelope, &envelope.derive_trace_id())
            .await
    }

    /// [`route`](Self::route) with a caller-supplied correlation id shared
    /// with the admission stage.
    pub async fn route_with_trace(
        &self,
        envelope: &MessageEnvelope,
        trace_id: &str,
    ) -> RoutingDecision {
        let started = Instant::now();
        let policy = self.policy.current();
        let revision = self.policy.revision();

        let (internal_handle, synthesized) = if policy.identity.enabled {
            resolve_with_timeout(
                self.resolver.as_ref(),
                Duration::from_millis(policy.identity.lookup_timeout_ms.max(1)),
                envelope.source_platform,
                &envelope.sender_id,
            )
            .await
        } else {
            (
                synthesized_handle(envelope.source_platform, &envelope.sender_id),
                true,
            )
        };
        #[cfg(feature = "metrics")]
        if synthesized {
            counter!(router_metrics::IDENTITY_FALLBACKS_TOTAL).increment(1);
        }
        #[cfg(not(feature = "metrics"))]
        let _ = synthesized;

        let addressed = is_addressed(&envelope.text, &policy.engagement.aliases);
        // Engagement hashes the raw sender id, not the resolved handle, so a
        // flapping identity service cannot flip the decision for a retried
        // message.
        let randomly_triggered = !addressed
            && should_engage_randomly(
                &envelope.sender_id,
                &envelope.text,
                policy.engagement.random_denominator,
            );
        let engage = addressed || randomly_triggered;

        let engagement_elapsed = elapsed_ms(started);
        self.events.record(PipelineEvent::Engagement {
            meta: EventMeta::new(trace_id, envelope.source_platform)
                .with_elapsed_ms(engagement_elapsed),
            addressed,
            randomly_triggered,
            engaged: engage,
        });

        let (selected_strategy, confidence_score) =
            self.classifier
                .classify(&envelope.text, &policy.classification, revision);
        let extracted_variables = extract(&envelope.text, &policy.extraction);

        let decision = RoutingDecision {
            classification: ClassificationResult {
                selected_strategy,
                confidence_score,
                extracted_variables,
                nubi_mentioned: addressed,
                randomly_triggered,
            },
            engage,
            trace_id: trace_id.to_owned(),
            internal_handle,
        };

        self.events.record(PipelineEvent::Routing {
            meta: EventMeta::new(trace_id, envelope.source_platform)
                .with_elapsed_ms(elapsed_ms(started)),
            strategy: selected_strategy,
            confidence: confidence_score,
        });

        debug!(
            platform = envelope.source_platform.as_str(),
            strategy = selected_strategy.as_str(),
            confidence = confidence_score,
            engage,
            "routed message"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(
                router_metrics::MESSAGES_TOTAL,
                labels::PLATFORM => envelope.source_platform.as_str()
            )
            .increment(1);
            if engage {
                counter!(
                    router_metrics::ENGAGED_TOTAL,
                    labels::TRIGGER => if addressed { "mention" } else { "random" }
                )
                .increment(1);
            }
            histogram!(router_metrics::ROUTE_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
        }

        decision
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {
        async_trait::async_trait,
        nubi_common::{SourcePlatform, Strategy},
        nubi_policy::PipelinePolicy,
    };

    use {
        super::*,
        crate::identity::{IdentityError, NoopIdentityResolver},
    };

    #[derive(Default)]
    struct CapturingSink {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl PipelineEventSink for CapturingSink {
        fn record(&self, event: PipelineEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    struct SlowResolver;

    #[async_trait]
    impl IdentityResolver for SlowResolver {
        async fn resolve(
            &self,
            _platform: SourcePlatform,
            _sender_id: &str,
        ) -> Result<Option<String>, IdentityError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some("too-late".into()))
        }
    }

    fn router_with(
        policy: PipelinePolicy,
        resolver: Arc<dyn IdentityResolver>,
    ) -> (IntelligenceRouter, Arc<CapturingSink>) {
        let sink = Arc::new(CapturingSink::default());
        let router = IntelligenceRouter::new(PolicyStore::new(policy), resolver, sink.clone());
        (router, sink)
    }

    fn envelope(text: &str) -> MessageEnvelope {
        MessageEnvelope::new(SourcePlatform::Telegram, "user-1", "12345", "m1", text)
    }

    #[tokio::test]
    async fn addressed_message_engages() {
        let (router, sink) =
            router_with(PipelinePolicy::default(), Arc::new(NoopIdentityResolver));
        let decision = router.route(&envelope("hey @nubi, how do i fix this error?")).await;

        assert!(decision.engage);
        assert!(decision.classification.nubi_mentioned);
        assert!(!decision.classification.randomly_triggered);
        assert_eq!(
            decision.classification.selected_strategy,
            Strategy::UserSupport
        );
        assert_eq!(decision.internal_handle, "telegram:user-1");

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "engagement");
        assert_eq!(events[1].kind(), "routing");
        // Both stages share the envelope's correlation id.
        assert_eq!(events[0].meta().trace_id, decision.trace_id);
    }

    #[tokio::test]
    async fn unaddressed_engagement_is_deterministic() {
        let (router, _) =
            router_with(PipelinePolicy::default(), Arc::new(NoopIdentityResolver));
        let env = envelope("just chatting about the weather");
        let first = router.route(&env).await;
        for _ in 0..10 {
            let again = router.route(&env).await;
            assert_eq!(again.classification.randomly_triggered, first.classification.randomly_triggered);
            assert_eq!(again.engage, first.engage);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_identity_lookup_degrades_to_synthesized_handle() {
        let (router, _) = router_with(PipelinePolicy::default(), Arc::new(SlowResolver));
        let decision = router.route(&envelope("hello nubi")).await;
        assert_eq!(decision.internal_handle, "telegram:user-1");
        assert!(decision.engage);
    }

    #[tokio::test]
    async fn identity_disabled_skips_lookup() {
        let mut policy = PipelinePolicy::default();
        policy.identity.enabled = false;
        let (router, _) = router_with(policy, Arc::new(SlowResolver));
        // Would hang for a minute if the resolver were consulted.
        let decision = router.route(&envelope("nubi are you there")).await;
        assert_eq!(decision.internal_handle, "telegram:user-1");
    }

    #[tokio::test]
    async fn empty_text_still_produces_a_decision() {
        let (router, _) =
            router_with(PipelinePolicy::default(), Arc::new(NoopIdentityResolver));
        let decision = router.route(&envelope("")).await;
        assert!(!decision.classification.nubi_mentioned);
        assert_eq!(
            decision.classification.selected_strategy,
            Strategy::GeneralConversation
        );
        assert!(decision.classification.confidence_score < 0.3);
    }

    #[tokio::test]
    async fn always_engage_denominator_one() {
        let mut policy = PipelinePolicy::default();
        policy.engagement.random_denominator = 1;
        let (router, _) = router_with(policy, Arc::new(NoopIdentityResolver));
        let decision = router.route(&envelope("completely unaddressed chatter")).await;
        assert!(decision.classification.randomly_triggered);
        assert!(decision.engage);
    }
}
