//! Hot-reloadable policy data for the message pipeline.
//!
//! Policy files: `nubi.toml`, `nubi.yaml`, or `nubi.json`
//! Searched in `./` then `~/.config/nubi/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values. Everything in
//! here is data, not code: rate-limit ceilings, screening rules, name
//! aliases, classification tables, and the engagement denominator can all be
//! swapped at runtime through [`PolicyStore`] without a restart.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod store;
pub mod validate;

pub use {
    loader::{apply_env_overrides, discover_and_load, find_policy_file, load_policy},
    schema::{
        AdmissionPolicy, ClassificationPolicy, EngagementPolicy, ExtractionPolicy,
        IdentityPolicy, KeywordRule, PipelinePolicy, RateLimitPolicy, RuleKind, ScreeningPolicy,
        ScreeningRule, StrategyTable, TelemetryPolicy,
    },
    store::PolicyStore,
    validate::{Diagnostic, Severity, ValidationResult},
};
