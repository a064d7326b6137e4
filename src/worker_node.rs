//! The top-level facade: owns the thread pool and drives the master
//! protocol from a single control thread.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::backend_queue::BackendQueue;
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::hit_collector::HitCollector;
use crate::ids::{belongs_to_shard, IdRange};
use crate::pipeline::{BackendEntry, FrontOutcome, Pipeline, Shard};
use crate::protocol::{FromWorker, MasterChannel, ToWorker};
use crate::scheduler::Scheduler;
use crate::thread_state::{Role, ThreadState};

/// Matches the generous stack the teacher reserves for its own search
/// threads; a comparison pipeline's call depth is not bounded any more
/// tightly than a chess search's.
const SEARCH_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Poll interval for the control thread's master-channel/barrier loop.
/// There is no blocking primitive that waits on "channel has a message
/// OR all workers parked at the barrier" simultaneously, so the loop
/// polls both at a short, fixed cadence instead.
const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Owns the worker thread pool for one process and speaks the
/// master-worker protocol over a single control thread (the thread that
/// calls `run`).
///
/// `WorkerNode` is generic only over `Pipeline`; the shard type is
/// erased into the spawned thread closures at construction time; nothing
/// about it needs to survive in the struct itself.
pub struct WorkerNode<P: Pipeline> {
    scheduler: Arc<Scheduler>,
    backend_queue: Arc<BackendQueue<P::Partial>>,
    hit_collector: Arc<HitCollector<P::HitPayload>>,
    query_slot: Arc<Mutex<Option<Arc<P::Query>>>>,
    channel: MasterChannel<ToWorker<P::Query>, FromWorker<P::HitPayload>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl<P: Pipeline + 'static> WorkerNode<P> {
    /// Validate `config`, spawn `config.num_threads` worker threads (one
    /// calling `pipeline_factory` to build its own `Pipeline` instance),
    /// and return a handle ready to `run`.
    pub fn new<S, F>(
        config: WorkerConfig,
        shard: Arc<S>,
        channel: MasterChannel<ToWorker<P::Query>, FromWorker<P::HitPayload>>,
        pipeline_factory: F,
    ) -> Result<Self, WorkerError>
    where
        S: Shard<Object = P::Object> + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        config.validate()?;

        let thread_states: Vec<Arc<ThreadState>> = (0..config.num_threads)
            .map(|id| {
                let role = if id == 0 { Role::Backend } else { Role::Frontend };
                Arc::new(ThreadState::new(id, role, config.min_steal))
            })
            .collect();

        let scheduler = Arc::new(Scheduler::new(thread_states, config.clone()));
        let backend_queue = Arc::new(BackendQueue::new());
        let hit_collector = Arc::new(HitCollector::new());
        let query_slot: Arc<Mutex<Option<Arc<P::Query>>>> = Arc::new(Mutex::new(None));
        let pipeline_factory = Arc::new(pipeline_factory);

        let mut handles = Vec::with_capacity(config.num_threads);
        for id in 0..config.num_threads {
            let scheduler = Arc::clone(&scheduler);
            let shard = Arc::clone(&shard);
            let backend_queue = Arc::clone(&backend_queue);
            let hit_collector = Arc::clone(&hit_collector);
            let query_slot = Arc::clone(&query_slot);
            let config = config.clone();
            let pipeline_factory = Arc::clone(&pipeline_factory);
            let state = Arc::clone(scheduler.thread(id));

            let handle = thread::Builder::new()
                .name(format!("worker-{id}"))
                .stack_size(SEARCH_STACK_SIZE)
                .spawn(move || {
                    let pipeline = pipeline_factory();
                    run_thread(
                        id,
                        pipeline,
                        state,
                        scheduler,
                        shard,
                        backend_queue,
                        hit_collector,
                        query_slot,
                        config,
                    );
                })
                .map_err(|err| WorkerError::setup(format!("spawning worker {id}: {err}")))?;
            handles.push(handle);
        }

        Ok(WorkerNode {
            scheduler,
            backend_queue,
            hit_collector,
            query_slot,
            channel,
            handles,
        })
    }

    /// A lightweight, cloneable introspection handle for tests and
    /// monitoring, independent of the `WorkerNode` itself (which is
    /// ordinarily moved onto its own thread before `run` is called).
    #[must_use]
    pub fn probe(&self) -> WorkerProbe {
        WorkerProbe {
            scheduler: Arc::clone(&self.scheduler),
        }
    }

    /// Drive the master protocol until a `Shutdown` message arrives, then
    /// join every worker thread and return.
    ///
    /// Per spec §5, a disconnected master is treated exactly like an
    /// explicit `Shutdown`, and per §7 resource-exhaustion and protocol
    /// errors are both fatal: every path below that can observe one of
    /// these routes through `fail_search`, which best-effort notifies the
    /// master, releases the start barrier, and joins every worker thread
    /// before this function returns, rather than propagating `?` straight
    /// past `self.join()`.
    pub fn run(&mut self) -> Result<(), WorkerError> {
        loop {
            if let Some(fault) = self.scheduler.take_fault() {
                return self.fail_search(fault);
            }

            if self.scheduler.take_request_work() {
                debug!("requesting more work from master");
                if let Err(err) = self.channel.send(FromWorker::WorkRequest) {
                    return self.fail_search(err);
                }
            }

            match self.channel.try_recv() {
                Ok(Some(message)) => {
                    if let Err(err) = self.handle_message(message) {
                        return self.fail_search(err);
                    }
                    if self.scheduler.is_shutdown() {
                        self.join();
                        return Ok(());
                    }
                    continue;
                }
                Ok(None) => {}
                Err(err) => return self.fail_search(err),
            }

            if self.scheduler.num_waiting() == self.scheduler.num_threads()
                && self
                    .scheduler
                    .search_complete(self.backend_queue.depth() as u64)
            {
                if let Err(err) = self.finish_search() {
                    return self.fail_search(err);
                }
            }

            thread::sleep(CONTROL_POLL_INTERVAL);
        }
    }

    /// A fatal condition occurred: the master channel is gone, a worker
    /// thread reported resource exhaustion, or a protocol error was
    /// detected. Per spec §7 the main thread is the sole reporter to the
    /// master and the sole initiator of shutdown: best-effort send a
    /// `Diagnostic` (the channel may already be the thing that's gone, in
    /// which case this just fails silently), then release every thread
    /// parked at the start barrier, join the pool, and only then surface
    /// the error that triggered it. No partial hit list is uploaded.
    fn fail_search(&mut self, err: WorkerError) -> Result<(), WorkerError> {
        warn!("fatal error, shutting down: {err}");
        let _ = self.channel.send(FromWorker::Diagnostic {
            message: err.to_string(),
        });
        self.scheduler.shutdown_and_release();
        self.join();
        Err(err)
    }

    /// Dispatches one message from the master. `WorkGrant`/`NoMoreWork`
    /// arriving with no search active, or `SearchStart` arriving while one
    /// already is, are out-of-sequence per the protocol in §6 and are
    /// rejected as `WorkerError::Protocol` rather than silently acted on.
    fn handle_message(
        &mut self,
        message: ToWorker<P::Query>,
    ) -> Result<(), WorkerError> {
        match message {
            ToWorker::SearchStart {
                database_id,
                query,
                range,
            } => {
                if self.query_slot.lock().is_some() {
                    return Err(WorkerError::protocol(
                        "SearchStart received while a search is already active",
                    ));
                }
                info!("search start: database {database_id}, range {range:?}");
                self.scheduler.reset_for_new_search();
                *self.query_slot.lock() = Some(Arc::new(query));
                self.scheduler
                    .distribute_initial(IdRange::new(range.0, range.1));
                self.scheduler.wait_until_all_waiting();
                self.scheduler.release_start();
                Ok(())
            }
            ToWorker::WorkGrant { range } => {
                if self.query_slot.lock().is_none() {
                    return Err(WorkerError::protocol(
                        "WorkGrant received with no search active",
                    ));
                }
                debug!("work grant: {range:?}");
                self.scheduler.on_work_grant(IdRange::new(range.0, range.1));
                Ok(())
            }
            ToWorker::NoMoreWork => {
                if self.query_slot.lock().is_none() {
                    return Err(WorkerError::protocol(
                        "NoMoreWork received with no search active",
                    ));
                }
                debug!("master reports no more work for this search");
                self.scheduler.on_no_more_work();
                Ok(())
            }
            ToWorker::Shutdown => {
                info!("shutdown requested");
                self.scheduler.shutdown_and_release();
                Ok(())
            }
        }
    }

    fn finish_search(&mut self) -> Result<(), WorkerError> {
        let sorted_hits = self.hit_collector.drain();
        info!("search end: uploading {} hits", sorted_hits.len());
        self.channel.send(FromWorker::HitsUpload { sorted_hits })?;
        *self.query_slot.lock() = None;
        // Clear `master_queue_empty` so this check doesn't immediately
        // re-fire before the next `SearchStart` resets it properly; the
        // threads stay parked at the barrier regardless.
        self.scheduler.reset_for_new_search();
        Ok(())
    }

    fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.join() {
                warn!("worker thread panicked: {err:?}");
            }
        }
    }
}

/// A cloneable handle onto a running `WorkerNode`'s scheduling state,
/// for tests and monitoring that need to observe role counts or queue
/// depth without owning the node.
#[derive(Clone)]
pub struct WorkerProbe {
    scheduler: Arc<Scheduler>,
}

impl WorkerProbe {
    #[must_use]
    pub fn num_backend_threads(&self) -> usize {
        self.scheduler.num_backend_threads()
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.scheduler.num_threads()
    }
}

#[allow(clippy::too_many_arguments)]
fn run_thread<P, S>(
    id: usize,
    mut pipeline: P,
    state: Arc<ThreadState>,
    scheduler: Arc<Scheduler>,
    shard: Arc<S>,
    backend_queue: Arc<BackendQueue<P::Partial>>,
    hit_collector: Arc<HitCollector<P::HitPayload>>,
    query_slot: Arc<Mutex<Option<Arc<P::Query>>>>,
    config: WorkerConfig,
) where
    P: Pipeline,
    S: Shard<Object = P::Object>,
{
    loop {
        if scheduler.arrive_and_wait_for_start() {
            debug!("worker {id} exiting on shutdown");
            return;
        }

        let query = match query_slot.lock().clone() {
            Some(query) => query,
            None => continue,
        };

        loop {
            if scheduler.is_shutdown() {
                return;
            }

            if let Some(new_role) = state.apply_pending_role() {
                debug!("worker {id} reassigned to {new_role:?}");
            }

            match state.role() {
                Role::Frontend => {
                    if run_frontend_batch(id, &mut pipeline, &state, &scheduler, &shard, &backend_queue, &query, &config) {
                        break;
                    }
                }
                Role::Backend => {
                    if run_backend_step(id, &mut pipeline, &state, &scheduler, &backend_queue, &hit_collector) {
                        break;
                    }
                }
            }
        }
    }
}

/// Returns `true` if the thread should stop looping and park at the
/// barrier (the search is complete).
#[allow(clippy::too_many_arguments)]
fn run_frontend_batch<P, S>(
    id: usize,
    pipeline: &mut P,
    state: &Arc<ThreadState>,
    scheduler: &Arc<Scheduler>,
    shard: &Arc<S>,
    backend_queue: &Arc<BackendQueue<P::Partial>>,
    query: &Arc<P::Query>,
    config: &WorkerConfig,
) -> bool
where
    P: Pipeline,
    S: Shard<Object = P::Object>,
{
    let batch = state.work_range.take_local(config.batch_size);
    if batch.is_empty() {
        if let Some(refilled) = scheduler.refill(id) {
            state.work_range.reset(refilled);
            return false;
        }
        scheduler.maybe_request_work();
        if scheduler.search_complete(backend_queue.depth() as u64) {
            return true;
        }
        thread::yield_now();
        return false;
    }

    for object_id in batch.start..batch.end {
        if !belongs_to_shard(object_id, config.num_shards, config.my_shard) {
            continue;
        }
        let object = shard.object_at(object_id);
        match pipeline.front(query, &object) {
            Ok(FrontOutcome::Fail) | Ok(FrontOutcome::Pass) => {}
            Ok(FrontOutcome::NeedBackend {
                partial,
                sequence_length,
                forward_score,
                null_score,
            }) => {
                if let Some(max) = config.max_backend_queue_depth {
                    if backend_queue.depth() as u64 >= max {
                        scheduler.report_fault(WorkerError::resource_exhausted(format!(
                            "backend queue depth reached the configured limit of {max}"
                        )));
                        return true;
                    }
                }
                let entry = match backend_queue.take_from_pool() {
                    Some(mut reused) => {
                        reused.object_id = object_id;
                        reused.sequence_length = sequence_length;
                        reused.partial = Some(partial);
                        reused.forward_score = forward_score;
                        reused.null_score = null_score;
                        reused
                    }
                    None => BackendEntry {
                        object_id,
                        sequence_length,
                        partial: Some(partial),
                        forward_score,
                        null_score,
                    },
                };
                backend_queue.push(entry);
                state.record_queued();
            }
            Err(err) => {
                warn!("worker {id} pipeline.front error on object {object_id}: {err}");
                state.record_error();
            }
        }
    }
    scheduler.maybe_reassign_roles(backend_queue.depth() as u64);
    false
}

/// Returns `true` if the thread should stop looping and park at the
/// barrier (the search is complete).
fn run_backend_step<P>(
    id: usize,
    pipeline: &mut P,
    state: &Arc<ThreadState>,
    scheduler: &Arc<Scheduler>,
    backend_queue: &Arc<BackendQueue<P::Partial>>,
    hit_collector: &Arc<HitCollector<P::HitPayload>>,
) -> bool
where
    P: Pipeline,
{
    match backend_queue.pop() {
        Some(entry) => {
            match pipeline.back(entry) {
                Ok((hit, spent)) => {
                    if let Some(hit) = hit {
                        hit_collector.add(hit);
                    }
                    backend_queue.recycle(spent);
                }
                Err(err) => {
                    warn!("worker {id} pipeline.back error: {err}");
                    state.record_error();
                }
            }
            scheduler.maybe_reassign_roles(backend_queue.depth() as u64);
            false
        }
        None => {
            scheduler.maybe_reassign_roles(0);
            if scheduler.search_complete(0) {
                return true;
            }
            thread::yield_now();
            false
        }
    }
}
