use std::collections::{BTreeSet, HashMap};

use super::{Merge, MergeScheduler, WindowLayout};
use crate::window::WindowId;
use crate::windowing::Windowing;

/// Merge scheduler backed by an ordered set of `(merge count, window)`.
///
/// Holds exactly one entry per non-newest window whose merge with its
/// successor is reachable, plus a reverse index so entries can be replaced
/// when a neighbour changes. Only the windows adjacent to a merge or a new
/// window are ever recomputed.
pub struct HeapScheduler {
    windowing: Box<dyn Windowing>,
    layout: WindowLayout,
    queue: BTreeSet<(u64, WindowId)>,
    keys: HashMap<WindowId, u64>,
}

impl HeapScheduler {
    /// Creates an empty scheduler for `windowing`.
    pub fn new(windowing: Box<dyn Windowing>) -> Self {
        Self {
            windowing,
            layout: WindowLayout::default(),
            queue: BTreeSet::new(),
            keys: HashMap::new(),
        }
    }

    fn unschedule(&mut self, id: WindowId) {
        if let Some(key) = self.keys.remove(&id) {
            self.queue.remove(&(key, id));
        }
    }

    /// Replaces the entry for `id` and its current successor.
    fn schedule(&mut self, id: WindowId) {
        self.unschedule(id);
        let Some(succ) = self.layout.succ(id) else {
            return;
        };
        let Some(tr) = self.layout.end(succ) else {
            return;
        };
        let tl = self.layout.start(id);
        if let Some(key) = self
            .windowing
            .first_containing_time(tl, tr, self.layout.count)
        {
            self.queue.insert((key, id));
            self.keys.insert(id, key);
        }
    }

    fn process(&mut self, merges: &mut Vec<Merge>) {
        while let Some(&(key, into)) = self.queue.first() {
            if key > self.layout.count {
                break;
            }
            self.unschedule(into);
            let Some(absorbed) = self.layout.absorb_successor(into) else {
                continue;
            };
            self.unschedule(absorbed);
            merges.push(Merge { into, absorbed });
            if let Some(pred) = self.layout.pred(into) {
                self.schedule(pred);
            }
            self.schedule(into);
        }
    }
}

impl MergeScheduler for HeapScheduler {
    fn window_appended(&mut self, id: WindowId, size: u64, merges: &mut Vec<Merge>) {
        self.layout.push(id, size);
        if let Some(pred) = self.layout.pred(id) {
            self.schedule(pred);
        }
        self.process(merges);
    }

    fn newest_extended(&mut self, merges: &mut Vec<Merge>) {
        if let Some(newest) = self.layout.extend_newest()
            && let Some(pred) = self.layout.pred(newest)
        {
            self.schedule(pred);
        }
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
        let mut entries: Vec<_> = self.keys.iter().map(|(&id, &key)| (id, key)).collect();
        entries.sort_unstable();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windowing::Decay;

    #[test]
    fn test_queue_and_index_stay_in_sync() {
        let mut scheduler = HeapScheduler::new(Decay::exponential(2.0).build().unwrap());
        let mut merges = Vec::new();
        for id in 0..500 {
            scheduler.window_appended(id, 1, &mut merges);
            assert_eq!(scheduler.queue.len(), scheduler.keys.len());
            let live = scheduler.layout.ends.len();
            // the newest window never has an entry
            assert!(scheduler.keys.len() < live || live == 0);
            let newest = *scheduler.layout.ends.keys().next_back().unwrap();
            assert!(!scheduler.keys.contains_key(&newest));
            // nothing due is left behind
            assert!(
                scheduler
                    .queue
                    .first()
                    .is_none_or(|&(key, _)| key > scheduler.layout.count)
            );
        }
    }

    #[test]
    fn test_unreachable_merges_are_not_queued() {
        // constant windows of 2: two full windows never fit in one
        let mut scheduler = HeapScheduler::new(Decay::constant(2).build().unwrap());
        let mut merges = Vec::new();
        scheduler.window_appended(0, 2, &mut merges);
        scheduler.window_appended(1, 2, &mut merges);
        assert!(merges.is_empty());
        assert!(scheduler.scheduled_merges().is_empty());
    }
}
