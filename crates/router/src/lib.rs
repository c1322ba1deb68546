//! Intelligence router: decides whether the responder should speak, and if
//! so with which strategy and what extracted context.
//!
//! Every sub-step is individually contained — a failing identity lookup or a
//! bad classification table degrades to a safe default, never to a dropped
//! message. [`IntelligenceRouter::route`] is infallible by contract.

pub mod classify;
pub mod engagement;
pub mod extract;
pub mod identity;
pub mod mention;
pub mod route;

pub use {
    classify::Classifier,
    engagement::should_engage_randomly,
    extract::extract,
    identity::{IdentityError, IdentityResolver, NoopIdentityResolver},
    mention::is_addressed,
    route::IntelligenceRouter,
};
