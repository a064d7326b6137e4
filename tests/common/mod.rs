//! Stub `Pipeline`/`Shard` fixtures and a loopback-channel harness,
//! shared by the scenario tests.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use worker_core::{
    BackendEntry, FrontOutcome, Hit, IdRange, LoopbackChannel, MasterChannel, ObjectId, Pipeline,
    Shard, WorkerConfig, WorkerNode, WorkerProbe,
};

/// A shard whose objects are just their own ID.
pub struct IdentityShard {
    count: u64,
}

impl IdentityShard {
    pub fn new(count: u64) -> Self {
        IdentityShard { count }
    }
}

impl Shard for IdentityShard {
    type Object = ObjectId;

    fn count(&self) -> u64 {
        self.count
    }

    fn object_at(&self, id: ObjectId) -> ObjectId {
        id
    }
}

/// Front-end stub: defers to the back-end for every `id % modulus == 0`
/// and passes everything else. Every ID it is asked about is appended to
/// `seen`, so tests can assert exactly-once delivery. An optional delay
/// can be configured below a threshold ID, to simulate one slow region
/// of the ID space for work-stealing tests.
#[derive(Clone)]
pub struct ModuloPipeline {
    modulus: u64,
    seen: Arc<Mutex<Vec<ObjectId>>>,
    by_thread: Option<Arc<Mutex<Vec<(String, ObjectId)>>>>,
    slow_below: Option<(ObjectId, Duration)>,
}

impl ModuloPipeline {
    pub fn new(modulus: u64, seen: Arc<Mutex<Vec<ObjectId>>>) -> Self {
        ModuloPipeline {
            modulus,
            seen,
            by_thread: None,
            slow_below: None,
        }
    }

    pub fn with_slow_region(mut self, below: ObjectId, delay: Duration) -> Self {
        self.slow_below = Some((below, delay));
        self
    }

    /// Record which thread processed each ID, for tests that need to
    /// observe work-stealing rather than just exactly-once delivery.
    pub fn with_thread_tracking(mut self, by_thread: Arc<Mutex<Vec<(String, ObjectId)>>>) -> Self {
        self.by_thread = Some(by_thread);
        self
    }
}

impl Pipeline for ModuloPipeline {
    type Object = ObjectId;
    type Query = ();
    type Partial = ();
    type HitPayload = ();

    fn front(
        &mut self,
        _query: &(),
        object: &ObjectId,
    ) -> Result<FrontOutcome<()>, worker_core::WorkerError> {
        self.seen.lock().unwrap().push(*object);
        if let Some(by_thread) = &self.by_thread {
            let name = std::thread::current().name().unwrap_or("?").to_string();
            by_thread.lock().unwrap().push((name, *object));
        }
        if let Some((threshold, delay)) = self.slow_below {
            if *object < threshold {
                std::thread::sleep(delay);
            }
        }
        if object % self.modulus == 0 {
            Ok(FrontOutcome::NeedBackend {
                partial: (),
                sequence_length: 0,
                forward_score: *object as f64,
                null_score: 0.0,
            })
        } else {
            Ok(FrontOutcome::Pass)
        }
    }

    fn back(
        &mut self,
        mut entry: BackendEntry<()>,
    ) -> Result<(Option<Hit<()>>, BackendEntry<()>), worker_core::WorkerError> {
        entry.partial.take();
        let hit = Hit {
            object_id: entry.object_id,
            primary_key: entry.forward_score,
            secondary_key: 0.0,
            payload: (),
        };
        Ok((Some(hit), entry))
    }
}

/// Front-end that always defers to the back-end; back-end sleeps to
/// simulate an expensive refinement stage, for role-promotion tests.
pub struct AlwaysBackendPipeline {
    pub back_delay: Duration,
}

impl Pipeline for AlwaysBackendPipeline {
    type Object = ObjectId;
    type Query = ();
    type Partial = ();
    type HitPayload = ();

    fn front(
        &mut self,
        _query: &(),
        _object: &ObjectId,
    ) -> Result<FrontOutcome<()>, worker_core::WorkerError> {
        Ok(FrontOutcome::NeedBackend {
            partial: (),
            sequence_length: 0,
            forward_score: 1.0,
            null_score: 0.0,
        })
    }

    fn back(
        &mut self,
        mut entry: BackendEntry<()>,
    ) -> Result<(Option<Hit<()>>, BackendEntry<()>), worker_core::WorkerError> {
        std::thread::sleep(self.back_delay);
        entry.partial.take();
        let hit = Hit {
            object_id: entry.object_id,
            primary_key: entry.forward_score,
            secondary_key: 0.0,
            payload: (),
        };
        Ok((Some(hit), entry))
    }
}

/// Spawns a `WorkerNode` on its own thread and hands back the
/// master-side channel endpoint plus the join handle.
pub fn spawn_worker<P, S, F>(
    config: WorkerConfig,
    shard: Arc<S>,
    pipeline_factory: F,
) -> (
    JoinHandle<()>,
    MasterChannel<worker_core::FromWorker<P::HitPayload>, worker_core::ToWorker<P::Query>>,
)
where
    P: Pipeline + 'static,
    S: Shard<Object = P::Object> + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    let (handle, master_side, _probe) = spawn_worker_with_probe(config, shard, pipeline_factory);
    (handle, master_side)
}

/// Same as `spawn_worker`, but also returns a `WorkerProbe` for tests
/// that need to observe role counts while the search is running.
#[allow(dead_code)]
pub fn spawn_worker_with_probe<P, S, F>(
    config: WorkerConfig,
    shard: Arc<S>,
    pipeline_factory: F,
) -> (
    JoinHandle<()>,
    MasterChannel<worker_core::FromWorker<P::HitPayload>, worker_core::ToWorker<P::Query>>,
    WorkerProbe,
)
where
    P: Pipeline + 'static,
    S: Shard<Object = P::Object> + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    let (worker_side, master_side) = LoopbackChannel::new::<P::Query, P::HitPayload>();
    let mut node = WorkerNode::<P>::new(config, shard, worker_side, pipeline_factory)
        .expect("worker node constructs");
    let probe = node.probe();
    let handle = std::thread::spawn(move || {
        node.run().expect("worker run loop");
    });
    (handle, master_side, probe)
}

/// Like `spawn_worker`, but for tests that expect `run()` to return an
/// `Err` (a fatal condition) instead of treating that as a harness bug.
#[allow(dead_code)]
pub fn spawn_worker_expecting_result<P, S, F>(
    config: WorkerConfig,
    shard: Arc<S>,
    pipeline_factory: F,
) -> (
    JoinHandle<Result<(), worker_core::WorkerError>>,
    MasterChannel<worker_core::FromWorker<P::HitPayload>, worker_core::ToWorker<P::Query>>,
)
where
    P: Pipeline + 'static,
    S: Shard<Object = P::Object> + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    let (worker_side, master_side) = LoopbackChannel::new::<P::Query, P::HitPayload>();
    let mut node = WorkerNode::<P>::new(config, shard, worker_side, pipeline_factory)
        .expect("worker node constructs");
    let handle = std::thread::spawn(move || node.run());
    (handle, master_side)
}

#[allow(dead_code)]
pub fn full_range(count: u64) -> IdRange {
    IdRange::new(0, count)
}
