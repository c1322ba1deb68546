//! Keyword/pattern scoring over the closed strategy set.

use std::sync::RwLock;

use {
    nubi_common::Strategy,
    nubi_policy::ClassificationPolicy,
    regex::Regex,
    tracing::warn,
};

use crate::mention::contains_whole_word;

enum Matcher {
    /// Lower-cased literal, matched as a whole word (may span spaces,
    /// e.g. "how do i").
    Keyword(String),
    Pattern(Regex),
}

struct ScoredMatcher {
    matcher: Matcher,
    weight: f32,
}

struct CompiledTables {
    revision: Option<u64>,
    tables: Vec<(Strategy, Vec<ScoredMatcher>)>,
}

/// Classifier with a compiled cache of the policy's keyword tables.
///
/// Recompiles when the policy revision changes; a keyword whose regex fails
/// to compile is skipped with a warning, so a bad table degrades scoring
/// instead of breaking routing.
pub struct Classifier {
    compiled: RwLock<CompiledTables>,
}

impl Classifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            compiled: RwLock::new(CompiledTables {
                revision: None,
                tables: Vec::new(),
            }),
        }
    }

    /// Score `text` against every strategy table and pick the winner.
    ///
    /// Confidence is the winning score clamped to 1.0. Below
    /// `policy.min_confidence` the result falls back to general-conversation
    /// at the computed confidence — an explicit tie-break, not an omission.
    pub fn classify(
        &self,
        text: &str,
        policy: &ClassificationPolicy,
        revision: u64,
    ) -> (Strategy, f32) {
        self.recompile_if_stale(policy, revision);

        let lower = text.to_lowercase();
        let compiled = match self.compiled.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut best: Option<(Strategy, f32)> = None;
        // Priority order settles exact ties toward the more urgent strategy.
        for strategy in Strategy::priority_order() {
            let Some((_, matchers)) = compiled.tables.iter().find(|(s, _)| *s == strategy) else {
                continue;
            };
            let score: f32 = matchers
                .iter()
                .filter(|m| match &m.matcher {
                    Matcher::Keyword(keyword) => contains_whole_word(&lower, keyword),
                    Matcher::Pattern(re) => re.is_match(text),
                })
                .map(|m| m.weight)
                .sum();
            if score > 0.0 && best.is_none_or(|(_, top)| score > top) {
                best = Some((strategy, score));
            }
        }

        match best {
            Some((strategy, score)) if score >= policy.min_confidence => {
                (strategy, score.min(1.0))
            },
            Some((_, score)) => (Strategy::GeneralConversation, score.min(1.0)),
            None => (Strategy::GeneralConversation, 0.0),
        }
    }

    fn recompile_if_stale(&self, policy: &ClassificationPolicy, revision: u64) {
        {
            let compiled = match self.compiled.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if compiled.revision == Some(revision) {
                return;
            }
        }

        let tables = policy
            .tables
            .iter()
            .map(|table| {
                let matchers = table
                    .keywords
                    .iter()
                    .filter_map(|rule| {
                        let matcher = if rule.regex {
                            match Regex::new(&rule.pattern) {
                                Ok(re) => Matcher::Pattern(re),
                                Err(e) => {
                                    warn!(
                                        strategy = table.strategy.as_str(),
                                        pattern = %rule.pattern,
                                        error = %e,
                                        "skipping keyword with invalid regex"
                                    );
                                    return None;
                                },
                            }
                        } else {
                            Matcher::Keyword(rule.pattern.to_lowercase())
                        };
                        Some(ScoredMatcher {
                            matcher,
                            weight: rule.weight,
                        })
                    })
                    .collect();
                (table.strategy, matchers)
            })
            .collect();

        let mut compiled = match self.compiled.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        compiled.revision = Some(revision);
        compiled.tables = tables;
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
