//! Policy file discovery, parsing, and environment overrides.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::PipelinePolicy,
};

/// Standard policy file names, checked in order.
const POLICY_FILENAMES: &[&str] = &["nubi.toml", "nubi.yaml", "nubi.yml", "nubi.json"];

/// Load a policy from the given path (format chosen by extension).
pub fn load_policy(path: &Path) -> Result<PipelinePolicy> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_policy(&raw, path)
}

fn parse_policy(raw: &str, path: &Path) -> Result<PipelinePolicy> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "toml" => toml::from_str(raw).context("invalid toml policy"),
        "yaml" | "yml" => serde_yaml::from_str(raw).context("invalid yaml policy"),
        "json" => serde_json::from_str(raw).context("invalid json policy"),
        other => Err(Error::message(format!(
            "unsupported policy format: .{other}"
        ))),
    }
}

/// Discover and load a policy from standard locations.
///
/// Search order:
/// 1. `./nubi.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/nubi/nubi.{toml,yaml,yml,json}` (user-global)
///
/// A malformed or missing file yields `PipelinePolicy::default()` with a
/// warning: the pipeline keeps admitting messages on bad policy data.
#[must_use]
pub fn discover_and_load() -> PipelinePolicy {
    let policy = if let Some(path) = find_policy_file() {
        debug!(path = %path.display(), "loading policy");
        match load_policy(&path) {
            Ok(policy) => policy,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load policy, using defaults");
                PipelinePolicy::default()
            },
        }
    } else {
        debug!("no policy file found, using defaults");
        PipelinePolicy::default()
    };
    apply_env_overrides(policy)
}

/// Find the first policy file in standard locations.
#[must_use]
pub fn find_policy_file() -> Option<PathBuf> {
    for name in POLICY_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "nubi") {
        let config_dir = dirs.config_dir();
        for name in POLICY_FILENAMES {
            let p = config_dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Apply environment-level knobs on top of a loaded policy.
///
/// These cover the deploy-time switches that shouldn't require editing the
/// policy file: stage toggles, the sink endpoint, and the latency-sensitive
/// identity timeout.
#[must_use]
pub fn apply_env_overrides(mut policy: PipelinePolicy) -> PipelinePolicy {
    if let Some(v) = env_bool("NUBI_ADMISSION_ENABLED") {
        policy.admission.enabled = v;
    }
    if let Some(v) = env_bool("NUBI_RATE_LIMITING") {
        policy.admission.rate_limiting = v;
    }
    if let Some(v) = env_bool("NUBI_CONTENT_FILTERING") {
        policy.admission.content_filtering = v;
    }
    if let Some(v) = env_bool("NUBI_SECURITY_CHECKS") {
        policy.admission.security_checks = v;
    }
    if let Some(v) = env_bool("NUBI_IDENTITY_ENABLED") {
        policy.identity.enabled = v;
    }
    if let Some(v) = env_bool("NUBI_TELEMETRY_ENABLED") {
        policy.telemetry.enabled = v;
    }
    if let Ok(v) = std::env::var("NUBI_TELEMETRY_ENDPOINT")
        && !v.is_empty()
    {
        policy.telemetry.endpoint = Some(v);
    }
    if let Some(v) = env_u64("NUBI_IDENTITY_TIMEOUT_MS") {
        policy.identity.lookup_timeout_ms = v;
    }
    if let Some(v) = env_u64("NUBI_ENGAGEMENT_DENOMINATOR") {
        policy.engagement.random_denominator = v;
    }
    policy
}

fn env_bool(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!(var = name, value = other, "unrecognized boolean, ignoring");
            None
        },
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "unrecognized integer, ignoring");
            None
        },
    }
}
