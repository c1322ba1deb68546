//! Admission gate: cheap rejection of malformed, abusive, or over-quota
//! traffic before classification runs.
//!
//! The gate is an explicit component instance holding its own rate-limit and
//! block tables; construct one per process and share it by reference. It
//! never returns errors: malformed input yields `Rejected` with a reason
//! code, and a misbehaving screening rule degrades to admit-with-warning.

pub mod gate;
pub mod rate_limit;
pub mod screen;

pub use {
    gate::AdmissionGate,
    rate_limit::{RateDecision, RateLimiter},
    screen::Screener,
};
