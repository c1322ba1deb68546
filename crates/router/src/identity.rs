//! Cross-platform identity resolution seam.

use std::time::Duration;

use {
    async_trait::async_trait,
    nubi_common::SourcePlatform,
    tracing::debug,
};

/// Error type returned by identity lookups.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{message}")]
    Message { message: String },
}

impl IdentityError {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }
}

impl From<String> for IdentityError {
    fn from(value: String) -> Self {
        Self::message(value)
    }
}

impl From<&str> for IdentityError {
    fn from(value: &str) -> Self {
        Self::message(value)
    }
}

/// External collaborator mapping `(platform, sender_id)` to a stable
/// internal handle. Absence is a normal, handled outcome.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(
        &self,
        platform: SourcePlatform,
        sender_id: &str,
    ) -> Result<Option<String>, IdentityError>;
}

/// Resolver for hosts without an identity service; never finds anyone.
pub struct NoopIdentityResolver;

#[async_trait]
impl IdentityResolver for NoopIdentityResolver {
    async fn resolve(
        &self,
        _platform: SourcePlatform,
        _sender_id: &str,
    ) -> Result<Option<String>, IdentityError> {
        Ok(None)
    }
}

/// Resolve with a bounded timeout, degrading to a synthesized handle scoped
/// to `(platform, sender_id)` on timeout, error, or not-found.
///
/// Returns the handle and whether it was synthesized.
pub(crate) async fn resolve_with_timeout(
    resolver: &dyn IdentityResolver,
    timeout: Duration,
    platform: SourcePlatform,
    sender_id: &str,
) -> (String, bool) {
    match tokio::time::timeout(timeout, resolver.resolve(platform, sender_id)).await {
        Ok(Ok(Some(handle))) => (handle, false),
        Ok(Ok(None)) => (synthesized_handle(platform, sender_id), true),
        Ok(Err(e)) => {
            debug!(error = %e, "identity lookup failed, synthesizing handle");
            (synthesized_handle(platform, sender_id), true)
        },
        Err(_) => {
            debug!(
                timeout_ms = timeout.as_millis() as u64,
                "identity lookup timed out, synthesizing handle"
            );
            (synthesized_handle(platform, sender_id), true)
        },
    }
}

/// Fallback handle when no resolved identity exists.
#[must_use]
pub(crate) fn synthesized_handle(platform: SourcePlatform, sender_id: &str) -> String {
    format!("{}:{}", platform.as_str(), sender_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(Option<String>);

    #[async_trait]
    impl IdentityResolver for FixedResolver {
        async fn resolve(
            &self,
            _platform: SourcePlatform,
            _sender_id: &str,
        ) -> Result<Option<String>, IdentityError> {
            Ok(self.0.clone())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl IdentityResolver for FailingResolver {
        async fn resolve(
            &self,
            _platform: SourcePlatform,
            _sender_id: &str,
        ) -> Result<Option<String>, IdentityError> {
            Err("identity service unreachable".into())
        }
    }

    struct StalledResolver;

    #[async_trait]
    impl IdentityResolver for StalledResolver {
        async fn resolve(
            &self,
            _platform: SourcePlatform,
            _sender_id: &str,
        ) -> Result<Option<String>, IdentityError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn resolved_handle_is_used() {
        let resolver = FixedResolver(Some("nubi-internal-7".into()));
        let (handle, synthesized) =
            resolve_with_timeout(&resolver, TIMEOUT, SourcePlatform::Telegram, "u1").await;
        assert_eq!(handle, "nubi-internal-7");
        assert!(!synthesized);
    }

    #[tokio::test]
    async fn not_found_synthesizes() {
        let (handle, synthesized) =
            resolve_with_timeout(&FixedResolver(None), TIMEOUT, SourcePlatform::Discord, "u2")
                .await;
        assert_eq!(handle, "discord:u2");
        assert!(synthesized);
    }

    #[tokio::test]
    async fn lookup_error_synthesizes() {
        let (handle, synthesized) =
            resolve_with_timeout(&FailingResolver, TIMEOUT, SourcePlatform::Api, "u3").await;
        assert_eq!(handle, "api:u3");
        assert!(synthesized);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_lookup_times_out_and_synthesizes() {
        let (handle, synthesized) =
            resolve_with_timeout(&StalledResolver, TIMEOUT, SourcePlatform::Twitter, "u4").await;
        assert_eq!(handle, "twitter:u4");
        assert!(synthesized);
    }
}
