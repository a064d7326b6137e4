//! The consumed, out-of-scope collaborators: the shard index and the
//! two-stage comparison pipeline.
//!
//! Neither the scoring math nor the on-disk shard layout is implemented
//! here — they're black boxes the scheduler drives. `Shard` and `Pipeline`
//! are the seams; a concrete deployment plugs in real implementations,
//! tests plug in stubs (see `tests/common`).

use crate::error::WorkerError;
use crate::ids::ObjectId;

/// An indexable, read-only partition of one database.
///
/// `object_at` must be cheap and re-entrant: it is called from every
/// worker thread concurrently with no synchronization beyond whatever the
/// implementation provides internally.
pub trait Shard: Send + Sync {
    /// The type handed to `Pipeline::front` for a given object ID.
    type Object;

    /// Total number of objects indexable in this shard (across all
    /// shards of the database, not just this worker's partition).
    fn count(&self) -> u64;

    /// Fetch the object at `id`. Only ever called for IDs that already
    /// passed the shard predicate for this worker.
    fn object_at(&self, id: ObjectId) -> Self::Object;
}

/// Outcome of a front-end (cheap filter) comparison.
#[derive(Debug)]
pub enum FrontOutcome<Partial> {
    /// The object clearly does not match; no further work needed.
    Fail,
    /// The object clearly matches well enough that no back-end
    /// refinement is required.
    Pass,
    /// The comparison was promising enough to defer to the expensive
    /// back-end stage.
    NeedBackend {
        partial: Partial,
        sequence_length: u32,
        forward_score: f64,
        null_score: f64,
    },
}

/// A deferred expensive comparison, produced by the front-end and
/// consumed by the back-end. Pool-allocated by `BackendQueue`.
///
/// `Partial` is deliberately a single associated type rather than an
/// explicit sequence-vs-profile enum: the concrete `Pipeline`
/// implementation decides what a partial result contains (a sequence
/// reference, a profile reference, or something else entirely), so the
/// queue and pool code here never need to know.
///
/// `partial` is an `Option` so `Pipeline::back` can take it out to
/// consume it and hand the entry itself back empty — that's what lets
/// `BackendQueue::recycle` put the allocation back in the pool instead
/// of it being dropped on every single comparison.
#[derive(Debug)]
pub struct BackendEntry<Partial> {
    pub object_id: ObjectId,
    pub sequence_length: u32,
    pub partial: Option<Partial>,
    pub forward_score: f64,
    pub null_score: f64,
}

/// A scored match produced by the back-end for one (query, object) pair.
#[derive(Debug, Clone)]
pub struct Hit<Payload> {
    pub object_id: ObjectId,
    pub primary_key: f64,
    pub secondary_key: f64,
    pub payload: Payload,
}

/// The two-stage comparison operator: a cheap front-end filter and an
/// expensive back-end refinement, run against a shared query (a model or
/// a query sequence, depending on search mode).
///
/// Each worker thread owns its own `Pipeline` instance (thread-local
/// copies of whatever internal profile/background-model state the
/// implementation needs), constructed once per thread and reused across
/// every object the thread processes.
pub trait Pipeline: Send {
    /// The object type fetched from the shard.
    type Object;
    /// The query being searched: a model (HMM search) or a sequence
    /// (sequence search).
    type Query: Send + Sync;
    /// Whatever the front-end needs the back-end to see again.
    type Partial: Send;
    /// Whatever a confirmed hit carries beyond its sort keys.
    type HitPayload: Send;

    /// Run the cheap filter. A pipeline-internal error is surfaced as
    /// `Err` and counted against the thread's `errors` counter by the
    /// caller; it is never propagated across threads.
    fn front(
        &mut self,
        query: &Self::Query,
        object: &Self::Object,
    ) -> Result<FrontOutcome<Self::Partial>, WorkerError>;

    /// Run the expensive refinement on a deferred entry, taking
    /// `entry.partial` to consume it and handing the (now-empty) entry
    /// back alongside whatever hit it produced, so the caller can return
    /// the shell to the `BackendQueue` pool instead of dropping it.
    fn back(
        &mut self,
        entry: BackendEntry<Self::Partial>,
    ) -> Result<(Option<Hit<Self::HitPayload>>, BackendEntry<Self::Partial>), WorkerError>;
}
