//! Runtime configuration recognized by the worker core.

use crate::error::WorkerError;

/// Tunables recognized by the worker core. All other flags an embedding
/// binary might parse are opaque to this crate.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of worker threads (must be ≥ 2: at least one frontend and
    /// one backend thread are required whenever a search is active).
    pub num_threads: usize,
    /// Initial and per-pull chunk size requested from the master.
    pub chunk_size: u64,
    /// Global-queue low-water mark that triggers a work request.
    pub request_threshold: u64,
    /// Per-thread take size from its own `WorkRange`.
    pub batch_size: u64,
    /// Backend-queue depth (relative to `num_backend_threads`) above
    /// which a frontend thread is promoted to backend duty.
    pub promote_hi: u64,
    /// Minimum remaining IDs a `WorkRange` must have before it can be
    /// stolen from (halved, so the smallest steal is `min_steal`).
    pub min_steal: u64,
    /// Total number of shards in the cluster.
    pub num_shards: u64,
    /// This worker's shard index, `0..num_shards`.
    pub my_shard: u64,
    /// Ceiling on the backend queue's depth, standing in for the pool's
    /// memory budget. `None` (the default) leaves it unbounded, matching
    /// every deployment this core has run so far. When set, a front-end
    /// thread that would push past the limit reports `ResourceExhausted`
    /// instead (spec §7) rather than growing the queue without bound.
    pub max_backend_queue_depth: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            num_threads: 4,
            chunk_size: 1000,
            request_threshold: 2000,
            batch_size: 32,
            promote_hi: 64,
            min_steal: 16,
            num_shards: 1,
            my_shard: 0,
            max_backend_queue_depth: None,
        }
    }
}

impl WorkerConfig {
    /// Construct a config for a single-shard deployment with the given
    /// thread count.
    #[must_use]
    pub fn with_threads(num_threads: usize) -> Self {
        WorkerConfig {
            num_threads,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_request_threshold(mut self, request_threshold: u64) -> Self {
        self.request_threshold = request_threshold;
        self
    }

    #[must_use]
    pub fn with_shard(mut self, num_shards: u64, my_shard: u64) -> Self {
        self.num_shards = num_shards;
        self.my_shard = my_shard;
        self
    }

    #[must_use]
    pub fn with_max_backend_queue_depth(mut self, max: u64) -> Self {
        self.max_backend_queue_depth = Some(max);
        self
    }

    /// Reject configurations that can never satisfy the role invariant
    /// (`num_backend_threads ∈ [1, num_threads-1]`) or that are otherwise
    /// nonsensical.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.num_threads < 2 {
            return Err(WorkerError::setup(format!(
                "num_threads must be >= 2 to keep at least one frontend and one backend thread, got {}",
                self.num_threads
            )));
        }
        if self.my_shard >= self.num_shards.max(1) {
            return Err(WorkerError::setup(format!(
                "my_shard ({}) must be < num_shards ({})",
                self.my_shard, self.num_shards
            )));
        }
        if self.min_steal == 0 {
            return Err(WorkerError::setup("min_steal must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(WorkerError::setup("batch_size must be > 0"));
        }
        Ok(())
    }
}
