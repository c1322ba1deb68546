//! Policy schema types with built-in defaults.
//!
//! Every section tolerates partial files: unknown fields are ignored and
//! missing fields fall back to the defaults below, so an operator can ship a
//! three-line override without restating the whole table.

use {
    nubi_common::{Strategy, ViolationKind},
    serde::{Deserialize, Serialize},
};

/// Root policy document for the whole pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelinePolicy {
    pub admission: AdmissionPolicy,
    pub rate_limit: RateLimitPolicy,
    pub screening: ScreeningPolicy,
    pub engagement: EngagementPolicy,
    pub classification: ClassificationPolicy,
    pub extraction: ExtractionPolicy,
    pub identity: IdentityPolicy,
    pub telemetry: TelemetryPolicy,
}

// ── Admission ───────────────────────────────────────────────────────────────

/// Gate-level toggles and shape limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdmissionPolicy {
    pub enabled: bool,
    /// Maximum accepted text length in bytes.
    pub max_text_len: usize,
    pub rate_limiting: bool,
    pub content_filtering: bool,
    pub security_checks: bool,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_text_len: 4096,
            rate_limiting: true,
            content_filtering: true,
            security_checks: true,
        }
    }
}

// ── Rate limiting ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Admitted messages allowed per key per window.
    pub max_per_window: usize,
    pub window_secs: u64,
    /// Violations within `violation_window_secs` before the key is blocked.
    pub violation_limit: u32,
    pub violation_window_secs: u64,
    /// First-offense block duration. Doubles per repeat offense.
    pub base_block_secs: u64,
    pub max_block_secs: u64,
    /// Idle windows are garbage-collected after this long.
    pub idle_ttl_secs: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_per_window: 100,
            window_secs: 60,
            violation_limit: 5,
            violation_window_secs: 600,
            base_block_secs: 300,
            max_block_secs: 86_400,
            idle_ttl_secs: 180,
        }
    }
}

// ── Content screening ───────────────────────────────────────────────────────

/// How a screening rule inspects text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// `pattern` is a regex evaluated against the raw text.
    Regex,
    /// Rejects runs of one repeated character longer than `threshold`.
    Flood,
    /// Rejects a sender repeating the same message `threshold` times.
    Repetition,
    /// `phrases` are matched as case-insensitive substrings.
    ScamPhrase,
}

/// One hot-swappable screening rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreeningRule {
    pub name: String,
    pub kind: RuleKind,
    pub violation: ViolationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phrases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreeningPolicy {
    pub rules: Vec<ScreeningRule>,
}

impl Default for ScreeningPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                ScreeningRule {
                    name: "prompt-injection".into(),
                    kind: RuleKind::Regex,
                    violation: ViolationKind::PromptInjection,
                    pattern: Some(
                        r"(?i)(ignore\s+(all\s+)?(the\s+)?previous\s+instructions?|disregard\s+(your\s+|the\s+)?instructions?|forget\s+(all\s+)?previous|new\s+instructions?\s*:|(reveal|show)\s+(your\s+|the\s+)?system\s+prompt|reveal\s+(your\s+|the\s+)?initial\s+instructions?)"
                            .into(),
                    ),
                    phrases: Vec::new(),
                    threshold: None,
                },
                ScreeningRule {
                    name: "script-injection".into(),
                    kind: RuleKind::Regex,
                    violation: ViolationKind::Malicious,
                    pattern: Some(r"(?i)(<\s*script\b|javascript\s*:|onerror\s*=|\beval\s*\()".into()),
                    phrases: Vec::new(),
                    threshold: None,
                },
                ScreeningRule {
                    name: "char-flood".into(),
                    kind: RuleKind::Flood,
                    violation: ViolationKind::Flood,
                    pattern: None,
                    phrases: Vec::new(),
                    threshold: Some(12),
                },
                ScreeningRule {
                    name: "repeated-message".into(),
                    kind: RuleKind::Repetition,
                    violation: ViolationKind::Spam,
                    pattern: None,
                    phrases: Vec::new(),
                    threshold: Some(3),
                },
                ScreeningRule {
                    name: "scam-phrases".into(),
                    kind: RuleKind::ScamPhrase,
                    violation: ViolationKind::Scam,
                    pattern: None,
                    phrases: vec![
                        "free crypto".into(),
                        "airdrop claim".into(),
                        "seed phrase".into(),
                        "private key".into(),
                        "double your money".into(),
                        "guaranteed returns".into(),
                    ],
                    threshold: None,
                },
            ],
        }
    }
}

// ── Engagement ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngagementPolicy {
    /// Names the responder answers to, matched whole-word, case-insensitive.
    pub aliases: Vec<String>,
    /// Unaddressed messages engage when `hash % N == 0`, i.e. roughly 1/N.
    pub random_denominator: u64,
}

impl Default for EngagementPolicy {
    fn default() -> Self {
        Self {
            aliases: ["nubi", "@nubi", "anubis", "@anubis", "jackal", "@jackal"]
                .map(String::from)
                .to_vec(),
            random_denominator: 8,
        }
    }
}

// ── Classification ──────────────────────────────────────────────────────────

/// One scored keyword or regex pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordRule {
    pub pattern: String,
    #[serde(default = "default_keyword_weight")]
    pub weight: f32,
    /// When true, `pattern` is a regex rather than a literal keyword.
    #[serde(default)]
    pub regex: bool,
}

fn default_keyword_weight() -> f32 {
    0.4
}

impl KeywordRule {
    fn keyword(pattern: &str, weight: f32) -> Self {
        Self {
            pattern: pattern.into(),
            weight,
            regex: false,
        }
    }
}

/// Keyword table for a single strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyTable {
    pub strategy: Strategy,
    pub keywords: Vec<KeywordRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassificationPolicy {
    /// Below this the result falls back to general-conversation.
    pub min_confidence: f32,
    pub tables: Vec<StrategyTable>,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        let table = |strategy, entries: &[(&str, f32)]| StrategyTable {
            strategy,
            keywords: entries
                .iter()
                .map(|(pattern, weight)| KeywordRule::keyword(pattern, *weight))
                .collect(),
        };
        Self {
            min_confidence: 0.3,
            tables: vec![
                table(
                    Strategy::EmergencyHandling,
                    &[
                        ("emergency", 0.6),
                        ("hacked", 0.6),
                        ("stolen", 0.5),
                        ("drained", 0.5),
                        ("scammed", 0.5),
                        ("exploit", 0.5),
                        ("urgent", 0.4),
                    ],
                ),
                table(
                    Strategy::UserSupport,
                    &[
                        ("how do i", 0.5),
                        ("not working", 0.5),
                        ("support", 0.5),
                        ("help", 0.4),
                        ("error", 0.4),
                        ("issue", 0.4),
                        ("problem", 0.4),
                    ],
                ),
                table(
                    Strategy::CoordinationRequest,
                    &[
                        ("raid", 0.6),
                        ("coordinate", 0.6),
                        ("organize", 0.5),
                        ("join us", 0.5),
                        ("everyone", 0.3),
                        ("let's go", 0.4),
                    ],
                ),
                table(
                    Strategy::DomainAnalysis,
                    &[
                        ("price", 0.5),
                        ("chart", 0.5),
                        ("market", 0.5),
                        ("liquidity", 0.5),
                        ("analysis", 0.5),
                        ("volume", 0.4),
                        ("pump", 0.4),
                        ("dump", 0.4),
                    ],
                ),
                table(
                    Strategy::DeepPersonaInteraction,
                    &[
                        ("jackal god", 0.6),
                        ("afterlife", 0.5),
                        ("mythology", 0.5),
                        ("who are you", 0.5),
                        ("your story", 0.5),
                        ("ancient", 0.4),
                        ("egypt", 0.4),
                    ],
                ),
                table(
                    Strategy::LightheartedContent,
                    &[
                        ("meme", 0.5),
                        ("joke", 0.5),
                        ("lol", 0.4),
                        ("lmao", 0.4),
                        ("haha", 0.4),
                        ("funny", 0.4),
                    ],
                ),
                table(
                    Strategy::GeneralConversation,
                    &[("hello", 0.3), ("what's up", 0.3), ("gm", 0.3), ("hey", 0.2)],
                ),
            ],
        }
    }
}

// ── Variable extraction ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionPolicy {
    /// Domain token vocabulary, matched case-insensitively.
    pub token_symbols: Vec<String>,
    pub positive_words: Vec<String>,
    pub negative_words: Vec<String>,
    pub urgency_keywords: Vec<String>,
    /// Ratio of upper-case letters above which urgency escalates.
    pub caps_ratio_threshold: f32,
    /// Number of `!` at which urgency escalates.
    pub exclaim_threshold: u32,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            token_symbols: ["SOL", "BTC", "ETH", "USDC", "BONK", "ANUBIS"]
                .map(String::from)
                .to_vec(),
            positive_words: [
                "good", "great", "awesome", "love", "nice", "amazing", "bullish", "win", "thanks",
                "excellent",
            ]
            .map(String::from)
            .to_vec(),
            negative_words: [
                "bad", "terrible", "hate", "awful", "bearish", "scam", "lose", "broken", "angry",
                "worst",
            ]
            .map(String::from)
            .to_vec(),
            urgency_keywords: ["urgent", "asap", "immediately", "emergency", "right now", "hurry"]
                .map(String::from)
                .to_vec(),
            caps_ratio_threshold: 0.6,
            exclaim_threshold: 3,
        }
    }
}

// ── Identity lookup ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentityPolicy {
    pub enabled: bool,
    /// Bound on the external lookup; past this the router synthesizes a handle.
    pub lookup_timeout_ms: u64,
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            lookup_timeout_ms: 200,
        }
    }
}

// ── Telemetry ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryPolicy {
    pub enabled: bool,
    /// Analytics sink endpoint. `None` leaves the emitter on a noop sink.
    pub endpoint: Option<String>,
    /// Flush when this many events are buffered...
    pub flush_max_events: usize,
    /// ...or when this much time has passed since the last flush.
    pub flush_interval_secs: u64,
    /// Delivery attempts per batch before it is dropped.
    pub max_retries: u32,
    /// Hard bound on buffered events; oldest are dropped beyond it.
    pub max_buffer_events: usize,
    pub request_timeout_ms: u64,
}

impl Default for TelemetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            flush_max_events: 50,
            flush_interval_secs: 5,
            max_retries: 3,
            max_buffer_events: 10_000,
            request_timeout_ms: 2_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let policy = PipelinePolicy::default();
        assert_eq!(policy.rate_limit.max_per_window, 100);
        assert_eq!(policy.rate_limit.window_secs, 60);
        assert_eq!(policy.engagement.random_denominator, 8);
        assert!((policy.classification.min_confidence - 0.3).abs() < f32::EPSILON);
        assert_eq!(policy.telemetry.flush_max_events, 50);
    }

    #[test]
    fn default_aliases_cover_all_personas() {
        let aliases = EngagementPolicy::default().aliases;
        for name in ["nubi", "@nubi", "anubis", "@anubis", "jackal", "@jackal"] {
            assert!(aliases.iter().any(|a| a == name), "missing alias {name}");
        }
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let policy: PipelinePolicy =
            toml::from_str("[engagement]\nrandom_denominator = 4\n").unwrap();
        assert_eq!(policy.engagement.random_denominator, 4);
        assert_eq!(policy.rate_limit.max_per_window, 100);
        assert!(!policy.engagement.aliases.is_empty());
    }

    #[test]
    fn every_strategy_has_a_default_table() {
        let tables = ClassificationPolicy::default().tables;
        for strategy in Strategy::priority_order() {
            assert!(
                tables.iter().any(|t| t.strategy == strategy),
                "no table for {}",
                strategy.as_str()
            );
        }
    }
}
