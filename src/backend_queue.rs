//! Deferred back-end comparisons, with a free-list pool to keep the hot
//! path off the allocator.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::pipeline::BackendEntry;

/// FIFO of deferred `BackendEntry` values plus a pool of spare allocations
/// recycled once the back-end stage has consumed an entry.
///
/// The queue and the pool are independently locked: a front-end thread
/// enqueuing a new entry never blocks on a back-end thread returning a
/// spent one to the pool, and vice versa. `recycle` is fed by
/// `Pipeline::back` handing its (now partial-less) entry back after
/// scoring it — see `run_backend_step` in `worker_node.rs` — so the pool
/// actually fills up in the real request path instead of staying
/// permanently empty.
pub struct BackendQueue<Partial> {
    queue: Mutex<VecDeque<BackendEntry<Partial>>>,
    pool: Mutex<Vec<BackendEntry<Partial>>>,
}

impl<Partial> Default for BackendQueue<Partial> {
    fn default() -> Self {
        BackendQueue::new()
    }
}

impl<Partial> BackendQueue<Partial> {
    #[must_use]
    pub fn new() -> Self {
        BackendQueue {
            queue: Mutex::new(VecDeque::new()),
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, entry: BackendEntry<Partial>) {
        self.queue.lock().push_back(entry);
    }

    #[must_use]
    pub fn pop(&self) -> Option<BackendEntry<Partial>> {
        self.queue.lock().pop_front()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Return a spent entry's allocation to the pool instead of dropping
    /// it, so the next `take_from_pool` can reuse its heap storage.
    pub fn recycle(&self, entry: BackendEntry<Partial>) {
        self.pool.lock().push(entry);
    }

    #[must_use]
    pub fn take_from_pool(&self) -> Option<BackendEntry<Partial>> {
        self.pool.lock().pop()
    }
}
