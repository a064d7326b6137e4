//! Master-worker message types and the channel the worker core talks to
//! the master over.
//!
//! The channel is a trait-free concrete type deliberately: every
//! deployment this core has ever needed (in-process test harness, a
//! future networked master) fits the same send/receive shape, so there's
//! nothing a trait would buy beyond indirection. Swapping `MasterChannel`
//! for a networked equivalent is a matter of giving it the same
//! constructor, not implementing a trait.

use std::sync::mpsc;

use crate::error::WorkerError;
use crate::pipeline::Hit;

/// Messages the master sends down to a worker.
#[derive(Debug)]
pub enum ToWorker<Query> {
    /// Begin a new search. `query` is the model (HMM search) or the
    /// query sequence (sequence search); which one is opaque to the
    /// core and lives entirely in the pipeline implementation.
    SearchStart {
        database_id: u64,
        query: Query,
        range: (u64, u64),
    },
    /// An additional chunk of work for the search already in progress.
    WorkGrant { range: (u64, u64) },
    /// The master has no further chunks for this search; once every
    /// local range, the global queue, and the backend queue have
    /// drained, the worker can close out the search.
    NoMoreWork,
    /// Stop processing and exit the thread pool.
    Shutdown,
}

/// Messages a worker sends up to the master.
#[derive(Debug)]
pub enum FromWorker<HitPayload> {
    /// The global queue has fallen below the request threshold; grant
    /// another chunk or reply `NoMoreWork`.
    WorkRequest,
    /// Final, sorted hit list for the search that just ended.
    HitsUpload { sorted_hits: Vec<Hit<HitPayload>> },
    /// A non-fatal-to-the-cluster condition worth surfacing (a fatal
    /// local error that triggered shutdown, for instance).
    Diagnostic { message: String },
}

/// One end of a bidirectional channel: receives `In`, sends `Out`.
///
/// A worker's `MasterChannel<ToWorker<Q>, FromWorker<H>>` and the
/// matching master-side `MasterChannel<FromWorker<H>, ToWorker<Q>>` are
/// two views onto the same pair of `mpsc` channels.
pub struct MasterChannel<In, Out> {
    sender: mpsc::Sender<Out>,
    receiver: mpsc::Receiver<In>,
}

impl<In, Out> MasterChannel<In, Out> {
    pub fn send(&self, message: Out) -> Result<(), WorkerError> {
        self.sender
            .send(message)
            .map_err(|_| WorkerError::protocol("master channel closed on send"))
    }

    /// Block until a message arrives or the peer disconnects.
    pub fn recv(&self) -> Result<In, WorkerError> {
        self.receiver
            .recv()
            .map_err(|_| WorkerError::protocol("master channel closed on recv"))
    }

    /// Non-blocking poll, for the main loop's select-like dispatch.
    ///
    /// Distinguishes "nothing queued yet" (`Ok(None)`) from "the peer is
    /// gone" (`Err`) — folding both into `None` would leave the main
    /// loop unable to tell an idle master from a disconnected one, and
    /// the spec requires the latter to be treated as an implicit
    /// `Shutdown`.
    pub fn try_recv(&self) -> Result<Option<In>, WorkerError> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => {
                Err(WorkerError::protocol("master channel closed on recv"))
            }
        }
    }
}

/// Constructs a worker-side/master-side pair of channels wired back to
/// back, for in-process tests and for the default single-process
/// deployment.
pub struct LoopbackChannel;

impl LoopbackChannel {
    #[must_use]
    pub fn new<Query, HitPayload>() -> (
        MasterChannel<ToWorker<Query>, FromWorker<HitPayload>>,
        MasterChannel<FromWorker<HitPayload>, ToWorker<Query>>,
    ) {
        let (to_worker_tx, to_worker_rx) = mpsc::channel();
        let (from_worker_tx, from_worker_rx) = mpsc::channel();
        let worker_side = MasterChannel {
            sender: from_worker_tx,
            receiver: to_worker_rx,
        };
        let master_side = MasterChannel {
            sender: to_worker_tx,
            receiver: from_worker_rx,
        };
        (worker_side, master_side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_delivers_in_both_directions() {
        let (worker_side, master_side) =
            LoopbackChannel::new::<u32, u32>();
        master_side
            .send(ToWorker::SearchStart {
                database_id: 0,
                query: 7,
                range: (0, 10),
            })
            .unwrap();
        match worker_side.recv().unwrap() {
            ToWorker::SearchStart { query, .. } => assert_eq!(query, 7),
            _ => panic!("wrong variant"),
        }
        worker_side.send(FromWorker::WorkRequest).unwrap();
        match master_side.recv().unwrap() {
            FromWorker::WorkRequest => {}
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn try_recv_is_non_blocking_when_empty() {
        let (worker_side, _master_side) = LoopbackChannel::new::<u32, u32>();
        assert_eq!(worker_side.try_recv(), Ok(None));
    }

    #[test]
    fn dropping_peer_surfaces_as_protocol_error() {
        let (worker_side, master_side) = LoopbackChannel::new::<u32, u32>();
        drop(master_side);
        assert!(worker_side.recv().is_err());
    }

    #[test]
    fn try_recv_distinguishes_disconnect_from_empty() {
        let (worker_side, master_side) = LoopbackChannel::new::<u32, u32>();
        drop(master_side);
        assert!(worker_side.try_recv().is_err());
    }
}
