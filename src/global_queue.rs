//! Coarse-grained work chunks received from the master, drained into
//! per-thread ranges.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::ids::IdRange;

/// A contiguous range of object IDs handed down from the master in one
/// piece.
pub type WorkChunk = IdRange;

struct Inner {
    chunks: VecDeque<WorkChunk>,
    depth_ids: u64,
}

/// FIFO of `WorkChunk`s, consumed head-first and split at the head when a
/// puller asks for fewer IDs than the head chunk holds.
pub struct GlobalQueue {
    inner: Mutex<Inner>,
}

impl Default for GlobalQueue {
    fn default() -> Self {
        GlobalQueue::new()
    }
}

impl GlobalQueue {
    #[must_use]
    pub fn new() -> Self {
        GlobalQueue {
            inner: Mutex::new(Inner {
                chunks: VecDeque::new(),
                depth_ids: 0,
            }),
        }
    }

    pub fn push(&self, chunk: WorkChunk) {
        if chunk.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.depth_ids += chunk.len();
        inner.chunks.push_back(chunk);
    }

    /// Detach the head chunk, splitting off at most `max_ids` from it and
    /// re-pushing the remainder if any is left.
    #[must_use]
    pub fn pull(&self, max_ids: u64) -> Option<WorkChunk> {
        let mut inner = self.inner.lock();
        let head = inner.chunks.pop_front()?;
        if head.len() <= max_ids {
            inner.depth_ids -= head.len();
            return Some(head);
        }
        let taken = WorkChunk::new(head.start, head.start + max_ids);
        let remainder = WorkChunk::new(head.start + max_ids, head.end);
        inner.depth_ids -= taken.len();
        inner.chunks.push_front(remainder);
        Some(taken)
    }

    #[must_use]
    pub fn depth_ids(&self) -> u64 {
        self.inner.lock().depth_ids
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pull_whole_chunk() {
        let q = GlobalQueue::new();
        q.push(WorkChunk::new(0, 100));
        assert_eq!(q.depth_ids(), 100);
        let c = q.pull(1000).expect("chunk");
        assert_eq!(c, WorkChunk::new(0, 100));
        assert!(q.is_empty());
    }

    #[test]
    fn pull_splits_head_when_smaller_request() {
        let q = GlobalQueue::new();
        q.push(WorkChunk::new(0, 100));
        let c = q.pull(30).expect("chunk");
        assert_eq!(c, WorkChunk::new(0, 30));
        assert_eq!(q.depth_ids(), 70);
        let c2 = q.pull(1000).expect("chunk");
        assert_eq!(c2, WorkChunk::new(30, 100));
    }

    #[test]
    fn pull_on_empty_returns_none() {
        let q = GlobalQueue::new();
        assert!(q.pull(10).is_none());
    }

    #[test]
    fn fifo_order_preserved() {
        let q = GlobalQueue::new();
        q.push(WorkChunk::new(0, 10));
        q.push(WorkChunk::new(10, 20));
        assert_eq!(q.pull(1000), Some(WorkChunk::new(0, 10)));
        assert_eq!(q.pull(1000), Some(WorkChunk::new(10, 20)));
    }

    #[test]
    fn pushing_empty_chunk_is_noop() {
        let q = GlobalQueue::new();
        q.push(WorkChunk::new(5, 5));
        assert!(q.is_empty());
        assert_eq!(q.depth_ids(), 0);
    }
}
