//! Work distribution and role-reassignment policy shared by every
//! worker thread.
//!
//! `Scheduler` is deliberately not generic over the pipeline's
//! associated types: it only ever moves `IdRange`s and plain counters
//! around. The backend queue (which *is* generic, over `Pipeline::Partial`)
//! hands its depth in as a `u64` rather than being owned here, so this
//! type can stay simple and be unit-tested without a concrete pipeline.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::global_queue::GlobalQueue;
use crate::ids::IdRange;
use crate::thread_state::{Role, ThreadState};

/// Consecutive empty-backend-queue observations required before a
/// backend thread is considered for demotion back to frontend duty.
/// Chosen so a single lucky empty poll mid-drain doesn't thrash roles.
const DRAIN_CYCLE_TICKS: u64 = 3;

struct BarrierState {
    waiting: usize,
    generation: u64,
}

pub struct Scheduler {
    threads: Vec<Arc<ThreadState>>,
    global_queue: GlobalQueue,
    config: WorkerConfig,

    no_steal: AtomicBool,
    shutdown: AtomicBool,
    request_work: AtomicBool,
    work_requested: AtomicBool,
    master_queue_empty: AtomicBool,

    decision_lock: Mutex<()>,
    drain_empty_ticks: AtomicU64,

    barrier_state: Mutex<BarrierState>,
    barrier_cvar: Condvar,

    /// Set by a worker thread that hits a fatal, non-per-comparison
    /// condition (resource exhaustion); cleared and acted on by the main
    /// thread's `run` loop. Per spec §7, worker threads never surface
    /// errors across thread boundaries except through a shared flag like
    /// this one — the main thread is the sole reporter to the master and
    /// the sole initiator of shutdown.
    fault: Mutex<Option<WorkerError>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(threads: Vec<Arc<ThreadState>>, config: WorkerConfig) -> Self {
        Scheduler {
            threads,
            global_queue: GlobalQueue::new(),
            config,
            no_steal: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            request_work: AtomicBool::new(false),
            work_requested: AtomicBool::new(false),
            master_queue_empty: AtomicBool::new(false),
            decision_lock: Mutex::new(()),
            drain_empty_ticks: AtomicU64::new(0),
            barrier_state: Mutex::new(BarrierState {
                waiting: 0,
                generation: 0,
            }),
            barrier_cvar: Condvar::new(),
            fault: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    #[must_use]
    pub fn thread(&self, id: usize) -> &Arc<ThreadState> {
        &self.threads[id]
    }

    #[must_use]
    pub fn global_queue(&self) -> &GlobalQueue {
        &self.global_queue
    }

    // --- start barrier -----------------------------------------------

    /// Called by a worker thread once it has nothing left to do for this
    /// generation; blocks until the main thread bumps the barrier's
    /// generation (a new search) or sets `shutdown`. A generation
    /// counter rather than a plain released flag means there is no
    /// window where a late waiter re-blocks on a flag the main thread
    /// already reset for the next search.
    #[must_use]
    pub fn arrive_and_wait_for_start(&self) -> bool {
        let mut state = self.barrier_state.lock();
        let my_generation = state.generation;
        state.waiting += 1;
        self.barrier_cvar.notify_all();
        self.barrier_cvar.wait_while(&mut state, |s| {
            s.generation == my_generation && !self.shutdown.load(Ordering::Acquire)
        });
        state.waiting -= 1;
        self.shutdown.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn num_waiting(&self) -> usize {
        self.barrier_state.lock().waiting
    }

    /// Called by the main thread: blocks until every worker thread has
    /// arrived at the barrier.
    pub fn wait_until_all_waiting(&self) {
        let mut state = self.barrier_state.lock();
        let n = self.threads.len();
        self.barrier_cvar.wait_while(&mut state, |s| s.waiting < n);
    }

    /// Called by the main thread to release every waiting thread for a
    /// new search.
    pub fn release_start(&self) {
        let mut state = self.barrier_state.lock();
        state.generation += 1;
        self.barrier_cvar.notify_all();
    }

    /// Sets `shutdown` and wakes every thread parked at the barrier so
    /// they can observe it and exit.
    pub fn shutdown_and_release(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _state = self.barrier_state.lock();
        self.barrier_cvar.notify_all();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    // --- work distribution --------------------------------------------

    /// Split an initial range contiguously across every thread's own
    /// `WorkRange`.
    pub fn distribute_initial(&self, range: IdRange) {
        let n = self.threads.len() as u64;
        if n == 0 {
            return;
        }
        let total = range.len();
        let per_thread = total / n;
        let remainder = total % n;
        let mut cursor = range.start;
        for (i, thread) in self.threads.iter().enumerate() {
            let extra = if (i as u64) < remainder { 1 } else { 0 };
            let end = cursor + per_thread + extra;
            thread.work_range.reset(IdRange::new(cursor, end));
            cursor = end;
        }
        self.no_steal.store(false, Ordering::Release);
    }

    /// On local exhaustion: try the global queue first, then steal from
    /// a peer in a fixed rotation. Returns `None` only after a full
    /// rotation of peers has failed, at which point `no_steal` is set so
    /// later callers skip straight past the rotation until a new chunk
    /// arrives.
    #[must_use]
    pub fn refill(&self, thread_id: usize) -> Option<IdRange> {
        if let Some(chunk) = self.global_queue.pull(self.config.chunk_size) {
            return Some(chunk);
        }
        if self.no_steal.load(Ordering::Acquire) {
            return None;
        }
        let n = self.threads.len();
        for offset in 1..n {
            let victim = (thread_id + offset) % n;
            if victim == thread_id {
                continue;
            }
            if let Some(stolen) = self.threads[victim].work_range.steal(self.config.batch_size) {
                return Some(stolen);
            }
        }
        self.no_steal.store(true, Ordering::Release);
        None
    }

    // --- master work-request gating -------------------------------------

    /// Called by any thread after a failed refill. Sets the shared
    /// `request_work` flag at most once per outstanding request.
    pub fn maybe_request_work(&self) {
        if self.master_queue_empty.load(Ordering::Acquire) {
            return;
        }
        if self.global_queue.depth_ids() >= self.config.request_threshold {
            return;
        }
        if self
            .work_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.request_work.store(true, Ordering::Release);
        }
    }

    /// Called by the main thread: atomically takes and clears the
    /// request flag.
    #[must_use]
    pub fn take_request_work(&self) -> bool {
        self.request_work.swap(false, Ordering::AcqRel)
    }

    pub fn on_work_grant(&self, range: IdRange) {
        if self.all_ranges_empty() && self.num_waiting() == self.threads.len() {
            self.distribute_initial(range);
        } else {
            self.global_queue.push(range);
        }
        self.no_steal.store(false, Ordering::Release);
        self.work_requested.store(false, Ordering::Release);
    }

    pub fn on_no_more_work(&self) {
        self.master_queue_empty.store(true, Ordering::Release);
        self.work_requested.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn master_queue_empty(&self) -> bool {
        self.master_queue_empty.load(Ordering::Acquire)
    }

    pub fn reset_for_new_search(&self) {
        self.no_steal.store(false, Ordering::Release);
        self.request_work.store(false, Ordering::Release);
        self.work_requested.store(false, Ordering::Release);
        self.master_queue_empty.store(false, Ordering::Release);
        self.drain_empty_ticks.store(0, Ordering::Release);
    }

    #[must_use]
    pub fn all_ranges_empty(&self) -> bool {
        self.threads.iter().all(|t| t.work_range.is_empty())
    }

    /// Whether a search has truly run out of work everywhere: no thread
    /// owns a non-empty range, the global queue is empty, the backend
    /// queue is empty, and the master has said it has no more chunks.
    /// Only once this holds is it safe for a thread to park at the start
    /// barrier — nothing still in flight depends on it.
    #[must_use]
    pub fn search_complete(&self, backend_queue_depth: u64) -> bool {
        self.master_queue_empty()
            && self.global_queue.is_empty()
            && backend_queue_depth == 0
            && self.all_ranges_empty()
    }

    // --- fault reporting --------------------------------------------------

    /// Called by a worker thread that just hit a fatal condition
    /// (resource exhaustion). First report wins; a thread that loses the
    /// race to report just falls through to the barrier like any other
    /// "done for this generation" thread and waits for the main thread to
    /// shut everything down.
    pub fn report_fault(&self, err: WorkerError) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(err);
        }
    }

    /// Called by the main thread once per loop iteration. Takes the fault
    /// so it is only ever acted on once.
    #[must_use]
    pub fn take_fault(&self) -> Option<WorkerError> {
        self.fault.lock().take()
    }

    // --- role reassignment ----------------------------------------------

    #[must_use]
    pub fn num_backend_threads(&self) -> usize {
        self.threads
            .iter()
            .filter(|t| t.role() == Role::Backend)
            .count()
    }

    /// Count of threads with a pending-but-not-yet-applied change to
    /// `target`. A thread counts as `target` for scheduling purposes the
    /// moment it's marked pending, not only once `apply_pending_role`
    /// runs on its own loop — otherwise two calls to
    /// `maybe_reassign_roles` made back to back, before either victim
    /// has run far enough to apply its change, would each see the same
    /// stale `num_backend_threads` and could each mark a different
    /// thread, overshooting the role invariant.
    fn pending_count(&self, target: Role) -> u64 {
        self.threads
            .iter()
            .filter(|t| t.pending_role() == Some(target))
            .count() as u64
    }

    /// Evaluate the promotion/demotion policy against the current
    /// backend queue depth. Safe to call from any thread; serialized by
    /// an internal lock so two concurrent callers never both act on the
    /// same snapshot — including snapshots of each other's still-pending
    /// decisions, via `pending_count`.
    pub fn maybe_reassign_roles(&self, backend_queue_depth: u64) {
        let _guard = self.decision_lock.lock();
        let num_threads = self.threads.len();
        let num_backend = self.num_backend_threads() as u64;

        // Threads already queued to become backend count as backend for
        // the headroom check, even though their `role()` hasn't flipped
        // yet: otherwise a second promotion could be approved before the
        // first one applies, driving frontend count to zero.
        let backend_after_pending = num_backend + self.pending_count(Role::Backend);

        if backend_queue_depth > self.config.promote_hi * backend_after_pending
            && (backend_after_pending as usize) < num_threads.saturating_sub(1)
        {
            self.drain_empty_ticks.store(0, Ordering::Relaxed);
            if let Some(victim) = self
                .threads
                .iter()
                .filter(|t| t.role() == Role::Frontend && !t.has_pending_role())
                .max_by_key(|t| t.comparisons_queued.load(Ordering::Relaxed))
            {
                victim.request_role_change(Role::Backend);
            }
            return;
        }

        if backend_queue_depth == 0 {
            let ticks = self.drain_empty_ticks.fetch_add(1, Ordering::Relaxed) + 1;
            // Symmetrically, threads already queued to become frontend
            // no longer count as backend for the "keep at least one
            // backend" check, even though they haven't applied yet.
            let backend_after_demotions = num_backend - self.pending_count(Role::Frontend);
            if ticks >= DRAIN_CYCLE_TICKS && backend_after_demotions > 1 {
                if let Some(victim) = self
                    .threads
                    .iter()
                    .filter(|t| t.role() == Role::Backend && !t.has_pending_role())
                    .min_by_key(|t| t.comparisons_queued.load(Ordering::Relaxed))
                {
                    victim.request_role_change(Role::Frontend);
                    self.drain_empty_ticks.store(0, Ordering::Relaxed);
                }
            }
        } else {
            self.drain_empty_ticks.store(0, Ordering::Relaxed);
        }
    }
}
