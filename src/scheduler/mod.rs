//! Online merge scheduling.
//!
//! A scheduler tracks the window layout of one stream in insert-count space
//! only: which window ids exist and which contiguous range of insert
//! positions each one covers. Every time the element count advances it asks
//! the stream's [`Windowing`] when each adjacent pair of windows will fall
//! inside a single decay window, and reports the pairs that are due as
//! [`Merge`] decisions. Applying those decisions to the persisted windows is
//! the caller's job (see [`WindowChain`](crate::chain::WindowChain)).
//!
//! Two strategies are provided and must produce identical layouts:
//!
//! - [`HeapScheduler`] keeps one pending merge count per non-newest window in
//!   an ordered set and only revisits the neighbours of windows that change.
//! - [`RecomputeScheduler`] keeps no queue and rescans every adjacent pair
//!   after each change. Cheaper on memory, slower per append.

mod heap;
mod recompute;

pub use heap::HeapScheduler;
pub use recompute::RecomputeScheduler;

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::window::WindowId;
use crate::windowing::Windowing;

/// Decision to fold `absorbed`, the immediate successor of `into`, into `into`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    /// Surviving window.
    pub into: WindowId,
    /// Successor that disappears.
    pub absorbed: WindowId,
}

/// Merge scheduling strategy for one stream.
///
/// Not internally synchronized; callers hold the stream's chain lock.
pub trait MergeScheduler: Send + Sync {
    /// Registers a new newest window of `size` elements and reports merges
    /// that became due.
    fn window_appended(&mut self, id: WindowId, size: u64, merges: &mut Vec<Merge>);

    /// Grows the newest window by one element and reports merges that became
    /// due.
    fn newest_extended(&mut self, merges: &mut Vec<Merge>);

    /// Number of elements appended so far.
    fn element_count(&self) -> u64;

    /// Size of the newest window, `None` before the first append.
    fn newest_size(&self) -> Option<u64>;

    /// `(id, size)` of every live window, oldest first.
    fn window_sizes(&self) -> Vec<(WindowId, u64)>;

    /// `(id, merge count)` for every window with a reachable merge against
    /// its successor, ordered by id.
    fn scheduled_merges(&mut self) -> Vec<(WindowId, u64)>;
}

/// Which [`MergeScheduler`] a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerKind {
    /// [`HeapScheduler`].
    #[default]
    Heap,
    /// [`RecomputeScheduler`].
    Recompute,
}

impl SchedulerKind {
    pub(crate) fn build(self, windowing: Box<dyn Windowing>) -> Box<dyn MergeScheduler> {
        match self {
            SchedulerKind::Heap => Box::new(HeapScheduler::new(windowing)),
            SchedulerKind::Recompute => Box::new(RecomputeScheduler::new(windowing)),
        }
    }
}

/// Live windows in insert-count space: id to last covered insert position.
///
/// Windows are contiguous and gap-free, so a window's first position is one
/// past its predecessor's last (0 for the oldest).
#[derive(Debug, Default)]
struct WindowLayout {
    ends: BTreeMap<WindowId, u64>,
    count: u64,
}

impl WindowLayout {
    fn push(&mut self, id: WindowId, size: u64) {
        debug_assert!(size > 0);
        debug_assert!(self.ends.keys().next_back().is_none_or(|&last| last < id));
        self.count += size;
        self.ends.insert(id, self.count - 1);
    }

    fn extend_newest(&mut self) -> Option<WindowId> {
        let (&id, end) = self.ends.iter_mut().next_back()?;
        self.count += 1;
        *end = self.count - 1;
        Some(id)
    }

    fn start(&self, id: WindowId) -> u64 {
        self.ends
            .range(..id)
            .next_back()
            .map_or(0, |(_, &end)| end + 1)
    }

    fn end(&self, id: WindowId) -> Option<u64> {
        self.ends.get(&id).copied()
    }

    fn pred(&self, id: WindowId) -> Option<WindowId> {
        self.ends.range(..id).next_back().map(|(&w, _)| w)
    }

    fn succ(&self, id: WindowId) -> Option<WindowId> {
        self.ends
            .range((Bound::Excluded(id), Bound::Unbounded))
            .next()
            .map(|(&w, _)| w)
    }

    /// Folds the successor of `into` into it, returning the successor's id.
    fn absorb_successor(&mut self, into: WindowId) -> Option<WindowId> {
        let absorbed = self.succ(into)?;
        let end = self.ends.remove(&absorbed)?;
        self.ends.insert(into, end);
        Some(absorbed)
    }

    fn newest_size(&self) -> Option<u64> {
        let (&id, &end) = self.ends.iter().next_back()?;
        Some(end - self.start(id) + 1)
    }

    fn sizes(&self) -> Vec<(WindowId, u64)> {
        let mut start = 0;
        self.ends
            .iter()
            .map(|(&id, &end)| {
                let size = end - start + 1;
                start = end + 1;
                (id, size)
            })
            .collect()
    }
}
