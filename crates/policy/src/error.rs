//! Error handling for policy loading.

pub use nubi_common::{Error, Result};

nubi_common::impl_context!();
