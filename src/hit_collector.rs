//! Shared accumulation point for confirmed hits, sorted once at search end.

use parking_lot::Mutex;

use crate::pipeline::Hit;

struct Inner<Payload> {
    hits: Vec<Hit<Payload>>,
}

/// Collects hits from every back-end thread over the course of one
/// search. Sorting is deferred to `drain`, called once by the main
/// thread after every worker has gone quiescent — there is no need to
/// keep the list ordered while hits are still arriving.
///
/// Unlike `BackendQueue`, there is no free-list pool here: a `Hit` that
/// leaves via `drain` is shipped straight into a `HitsUpload` and never
/// comes back to this process, so there's no spent allocation to ever
/// return. The accumulate-then-sort-at-end design spec §9 allows is a
/// plain `Vec`, not a pooled node structure.
pub struct HitCollector<Payload> {
    inner: Mutex<Inner<Payload>>,
}

impl<Payload> Default for HitCollector<Payload> {
    fn default() -> Self {
        HitCollector::new()
    }
}

impl<Payload> HitCollector<Payload> {
    #[must_use]
    pub fn new() -> Self {
        HitCollector {
            inner: Mutex::new(Inner { hits: Vec::new() }),
        }
    }

    pub fn add(&self, hit: Hit<Payload>) {
        self.inner.lock().hits.push(hit);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().hits.is_empty()
    }

    /// Take every hit collected so far, sorted by `(primary_key,
    /// secondary_key)` descending, leaving the collector empty for the
    /// next search.
    #[must_use]
    pub fn drain(&self) -> Vec<Hit<Payload>> {
        let mut hits = std::mem::take(&mut self.inner.lock().hits);
        hits.sort_by(|a, b| {
            b.primary_key
                .total_cmp(&a.primary_key)
                .then_with(|| b.secondary_key.total_cmp(&a.secondary_key))
        });
        hits
    }
}
