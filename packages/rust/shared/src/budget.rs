//! Run-wide cap on external calls.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts external calls (provider searches, downloads, generations) made in
/// one run and refuses new ones once the cap is reached. Shared across tasks
/// by reference or `Arc`.
#[derive(Debug)]
pub struct CallBudget {
    limit: usize,
    used: AtomicUsize,
}

impl CallBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// A budget that never runs out.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Reserve one call. Returns `false` once the cap is reached.
    pub fn try_acquire(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used())
    }
}
