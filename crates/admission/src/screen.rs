//! Policy-driven content screening.
//!
//! Rules are data (see `nubi_policy::ScreeningRule`) and hot-swappable: the
//! screener recompiles its rule set whenever the policy revision changes. A
//! rule that fails to compile is skipped with a warning — the gate treats it
//! as inconclusive rather than failing closed for every sender.

use std::{
    collections::VecDeque,
    hash::{DefaultHasher, Hash, Hasher},
    sync::RwLock,
    time::{Duration, Instant},
};

use {
    dashmap::DashMap,
    nubi_common::ViolationKind,
    nubi_policy::{AdmissionPolicy, RuleKind, ScreeningPolicy, ScreeningRule},
    regex::Regex,
    tracing::warn,
};

/// How long a sender's recent messages count toward repetition detection.
const REPETITION_MEMORY: Duration = Duration::from_secs(300);
/// Recent messages remembered per sender.
const REPETITION_HISTORY_CAP: usize = 16;

enum CompiledCheck {
    Regex(Regex),
    Flood { max_run: u32 },
    Repetition { threshold: u32 },
    Phrases(Vec<String>),
}

struct CompiledRule {
    name: String,
    violation: ViolationKind,
    check: CompiledCheck,
}

#[derive(Default)]
struct CompiledRules {
    revision: Option<u64>,
    rules: Vec<CompiledRule>,
}

/// A screening violation, with the rule that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenHit {
    pub violation: ViolationKind,
    pub rule: String,
}

/// Stateful content screener shared by all in-flight messages.
pub struct Screener {
    compiled: RwLock<CompiledRules>,
    history: DashMap<String, VecDeque<(u64, Instant)>>,
}

impl Screener {
    #[must_use]
    pub fn new() -> Self {
        Self {
            compiled: RwLock::new(CompiledRules::default()),
            history: DashMap::new(),
        }
    }

    /// Evaluate all enabled rules against `text`.
    ///
    /// Returns the first violation found, or `None` when the message is
    /// clean. Never panics on any input.
    pub fn screen(
        &self,
        sender_key: &str,
        text: &str,
        policy: &ScreeningPolicy,
        admission: &AdmissionPolicy,
        revision: u64,
    ) -> Option<ScreenHit> {
        self.recompile_if_stale(policy, revision);

        let compiled = match self.compiled.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for rule in &compiled.rules {
            if !category_enabled(rule.violation, admission) {
                continue;
            }
            let hit = match &rule.check {
                CompiledCheck::Regex(re) => re.is_match(text),
                CompiledCheck::Flood { max_run } => longest_char_run(text) > *max_run,
                CompiledCheck::Repetition { threshold } => {
                    self.is_repetition(sender_key, text, *threshold)
                },
                CompiledCheck::Phrases(phrases) => {
                    let lower = text.to_lowercase();
                    phrases.iter().any(|p| lower.contains(p.as_str()))
                },
            };
            if hit {
                return Some(ScreenHit {
                    violation: rule.violation,
                    rule: rule.name.clone(),
                });
            }
        }
        None
    }

    fn recompile_if_stale(&self, policy: &ScreeningPolicy, revision: u64) {
        {
            let compiled = match self.compiled.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if compiled.revision == Some(revision) {
                return;
            }
        }
        let rules = policy.rules.iter().filter_map(compile_rule).collect();
        let mut compiled = match self.compiled.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        compiled.revision = Some(revision);
        compiled.rules = rules;
    }

    /// Track `text` for `sender_key` and report whether it has now been seen
    /// `threshold` times recently.
    fn is_repetition(&self, sender_key: &str, text: &str, threshold: u32) -> bool {
        let now = Instant::now();
        let digest = {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            hasher.finish()
        };

        let mut history = self.history.entry(sender_key.to_owned()).or_default();
        history.retain(|(_, at)| now.duration_since(*at) <= REPETITION_MEMORY);
        history.push_back((digest, now));
        if history.len() > REPETITION_HISTORY_CAP {
            history.pop_front();
        }

        let same = history.iter().filter(|(d, _)| *d == digest).count();
        same as u32 >= threshold.max(1)
    }
}

impl Default for Screener {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_rule(rule: &ScreeningRule) -> Option<CompiledRule> {
    let check = match rule.kind {
        RuleKind::Regex => {
            let pattern = rule.pattern.as_deref()?;
            match Regex::new(pattern) {
                Ok(re) => CompiledCheck::Regex(re),
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "skipping rule with invalid regex");
                    return None;
                },
            }
        },
        RuleKind::Flood => CompiledCheck::Flood {
            max_run: rule.threshold.unwrap_or(12),
        },
        RuleKind::Repetition => CompiledCheck::Repetition {
            threshold: rule.threshold.unwrap_or(3),
        },
        RuleKind::ScamPhrase => {
            CompiledCheck::Phrases(rule.phrases.iter().map(|p| p.to_lowercase()).collect())
        },
    };
    Some(CompiledRule {
        name: rule.name.clone(),
        violation: rule.violation,
        check,
    })
}

/// Security-category rules and content-category rules toggle independently.
fn category_enabled(violation: ViolationKind, admission: &AdmissionPolicy) -> bool {
    match violation {
        ViolationKind::PromptInjection | ViolationKind::Malicious => admission.security_checks,
        ViolationKind::Scam | ViolationKind::Spam | ViolationKind::Flood => {
            admission.content_filtering
        },
    }
}

fn longest_char_run(text: &str) -> u32 {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous = None;
    for ch in text.chars() {
        if Some(ch) == previous {
            run += 1;
        } else {
            run = 1;
            previous = Some(ch);
        }
        longest = longest.max(run);
    }
    longest
}
