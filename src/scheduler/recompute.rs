use super::{Merge, MergeScheduler, WindowLayout};
use crate::window::WindowId;
use crate::windowing::Windowing;

/// Merge scheduler that rescans every adjacent pair after each change.
///
/// Repeatedly merges the oldest pair whose merge count has arrived until no
/// pair is due. Keeps no queue.
pub struct RecomputeScheduler {
    windowing: Box<dyn Windowing>,
    layout: WindowLayout,
}

impl RecomputeScheduler {
    /// Creates an empty scheduler for `windowing`.
    pub fn new(windowing: Box<dyn Windowing>) -> Self {
        Self {
            windowing,
            layout: WindowLayout::default(),
        }
    }

    /// `(window, merge count)` for each adjacent pair with a reachable merge.
    fn merge_counts(&mut self) -> Vec<(WindowId, u64)> {
        let count = self.layout.count;
        let mut result = Vec::new();
        let mut start = 0;
        let mut iter = self.layout.ends.iter().peekable();
        while let Some((&id, &end)) = iter.next() {
            let Some(&(_, &succ_end)) = iter.peek() else {
                break;
            };
            if let Some(key) = self.windowing.first_containing_time(start, succ_end, count) {
                result.push((id, key));
            }
            start = end + 1;
        }
        result
    }

    fn next_due(&mut self) -> Option<WindowId> {
        let count = self.layout.count;
        let mut start = 0;
        let mut iter = self.layout.ends.iter().peekable();
        while let Some((&id, &end)) = iter.next() {
            let &(_, &succ_end) = iter.peek()?;
            if self
                .windowing
                .first_containing_time(start, succ_end, count)
                .is_some_and(|key| key <= count)
            {
                return Some(id);
            }
            start = end + 1;
        }
        None
    }

    fn process(&mut self, merges: &mut Vec<Merge>) {
        while let Some(into) = self.next_due() {
            match self.layout.absorb_successor(into) {
                Some(absorbed) => merges.push(Merge { into, absorbed }),
                None => break,
            }
        }
    }
}

impl MergeScheduler for RecomputeScheduler {
    fn window_appended(&mut self, id: WindowId, size: u64, merges: &mut Vec<Merge>) {
        self.layout.push(id, size);
        self.process(merges);
    }

    fn newest_extended(&mut self, merges: &mut Vec<Merge>) {
        self.layout.extend_newest();
        self.process(merges);
    }

    fn element_count(&self) -> u64 {
        self.layout.count
    }

    fn newest_size(&self) -> Option<u64> {
        self.layout.newest_size()
    }

    fn window_sizes(&self) -> Vec<(WindowId, u64)> {
        self.layout.sizes()
    }

    fn scheduled_merges(&mut self) -> Vec<(WindowId, u64)> {
        self.merge_counts()
    }
}
