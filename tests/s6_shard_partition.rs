mod common;

use std::sync::{Arc, Mutex};

use worker_core::{FromWorker, ToWorker, WorkerConfig};

use common::{spawn_worker, IdentityShard, ModuloPipeline};

/// With four shards and this worker owning shard 2, a `SearchStart` over
/// `(0, 1000)` should only ever offer the 250 ids with `id % 4 == 2` to
/// `pipeline.front` — every other id in the granted range belongs to a
/// peer worker and must be skipped without a pipeline call.
#[test]
fn only_ids_belonging_to_this_shard_reach_the_pipeline() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = WorkerConfig::with_threads(4).with_shard(4, 2);
    let shard = Arc::new(IdentityShard::new(1000));
    let seen_for_factory = Arc::clone(&seen);
    let (handle, master) = spawn_worker(config, shard, move || {
        ModuloPipeline::new(5, Arc::clone(&seen_for_factory))
    });

    master
        .send(ToWorker::SearchStart {
            database_id: 0,
            query: (),
            range: (0, 1000),
        })
        .unwrap();
    master.send(ToWorker::NoMoreWork).unwrap();

    loop {
        match master.recv().unwrap() {
            FromWorker::HitsUpload { .. } => break,
            FromWorker::WorkRequest => continue,
            FromWorker::Diagnostic { message } => panic!("unexpected diagnostic: {message}"),
        }
    }

    let mut all_seen = seen.lock().unwrap().clone();
    all_seen.sort_unstable();
    let expected: Vec<u64> = (0..1000u64).filter(|id| id % 4 == 2).collect();
    assert_eq!(expected.len(), 250);
    assert_eq!(all_seen, expected);

    master.send(ToWorker::Shutdown).unwrap();
    handle.join().unwrap();
}
