//! Live policy handle shared across pipeline components.

use std::{
    path::Path,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::info;

use crate::{error::Result, loader, schema::PipelinePolicy};

/// Shared, hot-swappable view of the current policy.
///
/// Components hold a clone and call [`current`](Self::current) per message;
/// the returned `Arc` is a consistent snapshot, so a swap mid-message never
/// mixes two revisions within one decision. The revision counter lets
/// components that compile policy data (regex sets, keyword tables) rebuild
/// their caches only when the policy actually changed.
#[derive(Clone)]
pub struct PolicyStore {
    inner: Arc<Shared>,
}

struct Shared {
    policy: RwLock<Arc<PipelinePolicy>>,
    revision: AtomicU64,
}

impl PolicyStore {
    #[must_use]
    pub fn new(policy: PipelinePolicy) -> Self {
        Self {
            inner: Arc::new(Shared {
                policy: RwLock::new(Arc::new(policy)),
                revision: AtomicU64::new(0),
            }),
        }
    }

    /// Snapshot of the current policy.
    #[must_use]
    pub fn current(&self) -> Arc<PipelinePolicy> {
        match self.inner.policy.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock still holds a valid snapshot.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Monotonic revision, bumped on every swap.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    /// Install a new policy revision.
    pub fn swap(&self, policy: PipelinePolicy) {
        match self.inner.policy.write() {
            Ok(mut guard) => *guard = Arc::new(policy),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(policy),
        }
        let revision = self.inner.revision.fetch_add(1, Ordering::AcqRel) + 1;
        info!(revision, "policy swapped");
    }

    /// Re-read a policy file and install it. The previous revision stays
    /// active if loading fails.
    pub fn reload_from(&self, path: &Path) -> Result<()> {
        let policy = loader::load_policy(path)?;
        self.swap(loader::apply_env_overrides(policy));
        Ok(())
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(PipelinePolicy::default())
    }
}
