//! Structural validation for loaded policies.
//!
//! Validation never rejects a policy outright; it reports diagnostics so an
//! operator can see what a hot-swap would silently ignore (e.g. a screening
//! rule whose regex fails to compile is skipped by the gate).

use serde::Serialize;

use crate::schema::{PipelinePolicy, RuleKind};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// True when no error-severity diagnostics are present.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.diagnostics
            .iter()
            .all(|d| d.severity != Severity::Error)
    }

    fn push(&mut self, severity: Severity, field: impl Into<String>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// Check a policy for values the pipeline would ignore or clamp.
#[must_use]
pub fn validate(policy: &PipelinePolicy) -> ValidationResult {
    let mut result = ValidationResult::default();

    if policy.rate_limit.window_secs == 0 {
        result.push(
            Severity::Error,
            "rate_limit.window_secs",
            "must be at least 1",
        );
    }
    if policy.rate_limit.max_per_window == 0 {
        result.push(
            Severity::Warning,
            "rate_limit.max_per_window",
            "0 rejects every message for rate-limited keys",
        );
    }
    if policy.rate_limit.base_block_secs > policy.rate_limit.max_block_secs {
        result.push(
            Severity::Error,
            "rate_limit.base_block_secs",
            "exceeds max_block_secs",
        );
    }

    if policy.engagement.random_denominator == 0 {
        result.push(
            Severity::Warning,
            "engagement.random_denominator",
            "0 is treated as 1 (always engage)",
        );
    }

    if !(0.0..=1.0).contains(&policy.classification.min_confidence) {
        result.push(
            Severity::Error,
            "classification.min_confidence",
            "must be within 0.0..=1.0",
        );
    }
    if !(0.0..=1.0).contains(&policy.extraction.caps_ratio_threshold) {
        result.push(
            Severity::Error,
            "extraction.caps_ratio_threshold",
            "must be within 0.0..=1.0",
        );
    }

    for rule in &policy.screening.rules {
        let field = format!("screening.rules[{}]", rule.name);
        match rule.kind {
            RuleKind::Regex => match &rule.pattern {
                None => result.push(Severity::Error, &field, "regex rule without a pattern"),
                Some(pattern) => {
                    if let Err(e) = regex::Regex::new(pattern) {
                        result.push(Severity::Error, &field, format!("invalid regex: {e}"));
                    }
                },
            },
            RuleKind::Flood | RuleKind::Repetition => {
                if rule.threshold.is_none() {
                    result.push(Severity::Error, &field, "rule requires a threshold");
                }
            },
            RuleKind::ScamPhrase => {
                if rule.phrases.is_empty() {
                    result.push(Severity::Warning, &field, "phrase rule with no phrases");
                }
            },
        }
    }

    for table in &policy.classification.tables {
        for keyword in &table.keywords {
            if keyword.regex
                && let Err(e) = regex::Regex::new(&keyword.pattern)
            {
                result.push(
                    Severity::Error,
                    format!("classification.tables[{}]", table.strategy.as_str()),
                    format!("invalid regex {:?}: {e}", keyword.pattern),
                );
            }
        }
    }

    result
}
