//! Per-thread work range: an owner that consumes from the front, and
//! thieves that steal from the back.

use parking_lot::Mutex;

use crate::ids::{IdRange, ObjectId};

struct Inner {
    start: ObjectId,
    end: ObjectId,
}

/// A half-open `[start, end)` range of object IDs owned by one thread.
///
/// The owning thread calls `take_local` to advance `start`; any other
/// thread may call `steal` to pull IDs off the *far* end, so the two
/// operations never contend for the same sub-range under the lock longer
/// than it takes to update two integers.
pub struct WorkRange {
    inner: Mutex<Inner>,
    min_steal: u64,
}

impl WorkRange {
    #[must_use]
    pub fn new(range: IdRange, min_steal: u64) -> Self {
        WorkRange {
            inner: Mutex::new(Inner {
                start: range.start,
                end: range.end,
            }),
            min_steal,
        }
    }

    #[must_use]
    pub fn empty(min_steal: u64) -> Self {
        WorkRange::new(IdRange::empty(), min_steal)
    }

    /// Replace the range wholesale, e.g. when a new chunk is handed to
    /// this thread after its previous range ran dry.
    pub fn reset(&self, range: IdRange) {
        let mut inner = self.inner.lock();
        inner.start = range.start;
        inner.end = range.end;
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        let inner = self.inner.lock();
        inner.end.saturating_sub(inner.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owner-side: take up to `n` IDs off the front. Returns fewer (or
    /// none) if the range is close to exhausted or already empty.
    #[must_use]
    pub fn take_local(&self, n: u64) -> IdRange {
        let mut inner = self.inner.lock();
        let available = inner.end.saturating_sub(inner.start);
        let take = available.min(n);
        let start = inner.start;
        inner.start += take;
        IdRange::new(start, start + take)
    }

    /// Thief-side: take up to `n` IDs off the *back* of the range,
    /// provided at least `2 * min_steal` IDs remain (so both the victim
    /// and the thief are left with a worthwhile amount of work). Steals
    /// the upper half of what remains, capped at `n`.
    #[must_use]
    pub fn steal(&self, n: u64) -> Option<IdRange> {
        let mut inner = self.inner.lock();
        let remaining = inner.end.saturating_sub(inner.start);
        if remaining < 2 * self.min_steal {
            return None;
        }
        let half = remaining.div_ceil(2);
        let take = half.min(n).max(self.min_steal);
        let take = take.min(remaining - self.min_steal);
        if take == 0 {
            return None;
        }
        let new_end = inner.end - take;
        let stolen = IdRange::new(new_end, inner.end);
        inner.end = new_end;
        Some(stolen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_local_advances_start() {
        let wr = WorkRange::new(IdRange::new(0, 100), 8);
        let r = wr.take_local(10);
        assert_eq!(r, IdRange::new(0, 10));
        assert_eq!(wr.len(), 90);
        let r2 = wr.take_local(10);
        assert_eq!(r2, IdRange::new(10, 20));
    }

    #[test]
    fn take_local_caps_at_remaining() {
        let wr = WorkRange::new(IdRange::new(0, 5), 8);
        let r = wr.take_local(100);
        assert_eq!(r, IdRange::new(0, 5));
        assert!(wr.is_empty());
    }

    #[test]
    fn steal_refuses_below_threshold() {
        let wr = WorkRange::new(IdRange::new(0, 10), 8);
        assert!(wr.steal(100).is_none());
    }

    #[test]
    fn steal_takes_upper_half() {
        let wr = WorkRange::new(IdRange::new(0, 100), 8);
        let stolen = wr.steal(1000).expect("should steal");
        assert_eq!(stolen, IdRange::new(50, 100));
        assert_eq!(wr.len(), 50);
    }

    #[test]
    fn steal_respects_requested_cap() {
        let wr = WorkRange::new(IdRange::new(0, 100), 8);
        let stolen = wr.steal(10).expect("should steal");
        assert_eq!(stolen.len(), 10);
        assert_eq!(wr.len(), 90);
    }

    #[test]
    fn steal_and_take_never_overlap() {
        let wr = WorkRange::new(IdRange::new(0, 40), 8);
        let local = wr.take_local(5);
        let stolen = wr.steal(1000).expect("should steal");
        assert!(local.end <= stolen.start);
    }
}
