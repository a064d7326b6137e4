//! Per-thread role and bookkeeping shared between the owning thread and
//! the scheduler's reassignment policy.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::work_range::WorkRange;

/// Which stage of the pipeline a thread is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Frontend,
    Backend,
}

/// The shared half of a worker thread's state: its own `WorkRange` (so
/// peers can steal from it), its current and pending role, and the
/// counters the scheduler's promotion policy reads.
///
/// The pipeline instance itself is *not* stored here — it is owned
/// entirely by the thread that constructed it and never touched by any
/// other thread, so there is nothing to synchronize.
pub struct ThreadState {
    pub id: usize,
    pub work_range: WorkRange,
    role: Mutex<Role>,
    pending_role: Mutex<Option<Role>>,
    pub comparisons_queued: AtomicU64,
    pub errors: AtomicU64,
}

impl ThreadState {
    #[must_use]
    pub fn new(id: usize, initial_role: Role, min_steal: u64) -> Self {
        ThreadState {
            id,
            work_range: WorkRange::empty(min_steal),
            role: Mutex::new(initial_role),
            pending_role: Mutex::new(None),
            comparisons_queued: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        *self.role.lock()
    }

    #[must_use]
    pub fn has_pending_role(&self) -> bool {
        self.pending_role.lock().is_some()
    }

    /// Peek at a queued-but-not-yet-applied role change without
    /// consuming it. The scheduler uses this to count reassignments it
    /// has already decided on but that haven't taken effect yet, so a
    /// fresh promotion/demotion decision is never made against a stale
    /// snapshot of `num_backend_threads`.
    #[must_use]
    pub fn pending_role(&self) -> Option<Role> {
        *self.pending_role.lock()
    }

    /// Called by the scheduler under its own reassignment lock; refuses
    /// to overwrite an already-pending change so a thread never gets two
    /// conflicting reassignments queued at once.
    pub fn request_role_change(&self, new_role: Role) -> bool {
        let mut pending = self.pending_role.lock();
        if pending.is_some() {
            return false;
        }
        *pending = Some(new_role);
        true
    }

    /// Called by the owning thread between pipeline invocations. Applies
    /// any pending role change and reports whether one happened.
    pub fn apply_pending_role(&self) -> Option<Role> {
        let new_role = self.pending_role.lock().take()?;
        *self.role.lock() = new_role;
        Some(new_role)
    }

    pub fn record_queued(&self) {
        self.comparisons_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}
