//! The arena of summary windows for one stream.
//!
//! Windows link to their neighbours by id, never by reference, and live
//! either in the backing store or in a small write-behind set of staged
//! windows. The newest window is always staged because it is the only one
//! mutated in place. Merge decisions come from the stream's
//! [`MergeScheduler`]; they are recorded as pending, coalesced per surviving
//! window, and applied in one pass every `merge_frequency` new windows and
//! on flush.
//!
//! Accepting an element never touches the store. Store access happens only
//! in the merge pass, which loads every window a merge needs before changing
//! the arena and keeps failed writes and deletes queued, so a failing pass
//! can simply run again later.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::operator::{Aggregate, WindowOperator};
use crate::scheduler::{Merge, MergeScheduler};
use crate::storage::{BackingStore, TemporalIndex};
use crate::window::{StreamId, SummaryWindow, WindowId};

/// One element as staged by ingest: `None` marks a landmark placeholder that
/// takes an insert position without touching any aggregate.
pub type Element = (i64, Option<f64>);

/// Summary windows of one stream plus the scheduler driving their merges.
pub struct WindowChain {
    stream: StreamId,
    operators: Arc<[Arc<dyn WindowOperator>]>,
    store: Arc<dyn BackingStore>,
    scheduler: Box<dyn MergeScheduler>,
    first_size: u64,
    merge_frequency: u64,
    index: TemporalIndex,
    staged: BTreeMap<WindowId, SummaryWindow>,
    /// Surviving window to the successors it absorbs, in chain order.
    pending: BTreeMap<WindowId, Vec<WindowId>>,
    /// Absorbed windows not yet deleted from the store.
    retired: Vec<WindowId>,
    newest: Option<WindowId>,
    next_id: WindowId,
    created_since_apply: u64,
    merges: Vec<Merge>,
}

impl WindowChain {
    /// Creates an empty chain.
    ///
    /// # Arguments
    ///
    /// * `first_size` - capacity of the newest window, from the decay shape
    /// * `merge_frequency` - number of new windows between merge passes
    pub fn new(
        stream: StreamId,
        operators: Arc<[Arc<dyn WindowOperator>]>,
        store: Arc<dyn BackingStore>,
        scheduler: Box<dyn MergeScheduler>,
        first_size: u64,
        merge_frequency: u64,
    ) -> Self {
        debug_assert!(first_size >= 1 && merge_frequency >= 1);
        Self {
            stream,
            operators,
            store,
            scheduler,
            first_size,
            merge_frequency,
            index: TemporalIndex::new(),
            staged: BTreeMap::new(),
            pending: BTreeMap::new(),
            retired: Vec::new(),
            newest: None,
            next_id: 0,
            created_since_apply: 0,
            merges: Vec::new(),
        }
    }

    /// Number of insert positions consumed so far.
    pub fn element_count(&self) -> u64 {
        self.scheduler.element_count()
    }

    /// Number of live summary windows, including ones whose merge is still
    /// pending.
    pub fn num_windows(&self) -> usize {
        self.index.len()
    }

    /// Start time to id of every live window.
    pub fn index(&self) -> &TemporalIndex {
        &self.index
    }

    /// Appends one element. `None` is a landmark placeholder.
    ///
    /// The element is committed in memory first, so the append always takes
    /// effect. If the merge pass it triggers fails against the store, the
    /// unfinished work stays queued for the next pass and the failure is
    /// reported by [`flush`](Self::flush) if it persists.
    pub fn append(&mut self, timestamp: i64, value: Option<f64>) {
        let extend = self.first_size > 1
            && self
                .scheduler
                .newest_size()
                .is_some_and(|size| size < self.first_size);
        if extend && let Some(window) = self.newest.and_then(|id| self.staged.get_mut(&id)) {
            window.c_end += 1;
            window.t_end = timestamp;
            if let Some(value) = value {
                insert_value(&self.operators, &mut window.aggregates, timestamp, value);
            }
            self.scheduler.newest_extended(&mut self.merges);
            self.record_merges();
            return;
        }
        self.create_window(&[(timestamp, value)]);
    }

    /// Appends a full ingest buffer as a block of new windows.
    ///
    /// `lengths` lists window sizes newest first; the oldest elements go to
    /// the largest window. Elements past the longest prefix of `lengths`
    /// that fits are appended one at a time.
    pub fn append_partitioned(&mut self, elements: &[Element], lengths: &[u64]) {
        let mut covered = 0usize;
        let mut fitting = 0;
        for &length in lengths {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            if covered.saturating_add(length) > elements.len() {
                break;
            }
            covered += length;
            fitting += 1;
        }
        let mut start = 0usize;
        for &length in lengths[..fitting].iter().rev() {
            let end = start + usize::try_from(length).unwrap_or(usize::MAX);
            self.create_window(&elements[start..end]);
            start = end;
        }
        for &(timestamp, value) in &elements[start..] {
            self.append(timestamp, value);
        }
    }

    /// Applies pending merges and writes every live window to the store.
    /// The newest window stays staged so later appends can still extend it.
    pub fn flush(&mut self) -> Result<()> {
        self.settle()?;
        if let Some(window) = self.newest.and_then(|id| self.staged.get(&id)) {
            self.store.put_summary_window(self.stream, window)?;
        }
        Ok(())
    }

    /// Loads a live window, staged or persisted.
    pub fn window(&self, id: WindowId) -> Result<SummaryWindow> {
        match self.staged.get(&id) {
            Some(window) => Ok(window.clone()),
            None => Ok(self.store.get_summary_window(self.stream, id)?),
        }
    }

    /// Windows overlapping `[t0, t1]`, oldest first.
    pub fn windows_overlapping(&self, t0: i64, t1: i64) -> Result<Vec<SummaryWindow>> {
        self.index
            .candidates(t0, t1)
            .into_iter()
            .map(|id| self.window(id))
            .collect()
    }

    /// Every live window, oldest first.
    pub fn windows(&self) -> Result<Vec<SummaryWindow>> {
        self.index
            .entries()
            .into_iter()
            .map(|(_, id)| self.window(id))
            .collect()
    }

    fn create_window(&mut self, elements: &[Element]) {
        let (Some(&(t_start, _)), Some(&(t_end, _))) = (elements.first(), elements.last()) else {
            return;
        };
        debug_assert!(self.newest.is_none_or(|id| self.staged.contains_key(&id)));
        let size = elements.len() as u64;
        let c_start = self.scheduler.element_count();
        let id = self.next_id;
        let mut aggregates: Vec<Aggregate> =
            self.operators.iter().map(|op| op.create_empty()).collect();
        for &(timestamp, value) in elements {
            if let Some(value) = value {
                insert_value(&self.operators, &mut aggregates, timestamp, value);
            }
        }
        if let Some(prev) = self.newest.and_then(|id| self.staged.get_mut(&id)) {
            prev.next = Some(id);
        }
        self.staged.insert(
            id,
            SummaryWindow {
                id,
                t_start,
                t_end,
                c_start,
                c_end: c_start + size - 1,
                prev: self.newest,
                next: None,
                aggregates,
            },
        );
        self.index.insert(t_start, id);
        self.newest = Some(id);
        self.next_id += 1;

        self.scheduler.window_appended(id, size, &mut self.merges);
        self.record_merges();
        self.created_since_apply += 1;
        if self.created_since_apply >= self.merge_frequency
            && let Err(_e) = self.settle()
        {
            #[cfg(feature = "logging")]
            log::warn!(
                "stream {}: merge pass failed, work stays queued: {_e}",
                self.stream
            );
        }
    }

    /// Folds scheduler decisions into `pending`. A merge into a window that
    /// already absorbs others extends its list; absorbing a window that has
    /// its own pending list takes that list over.
    fn record_merges(&mut self) {
        for Merge { into, absorbed } in self.merges.drain(..) {
            let inherited = self.pending.remove(&absorbed).unwrap_or_default();
            let tails = self.pending.entry(into).or_default();
            tails.push(absorbed);
            tails.extend(inherited);
        }
    }

    fn settle(&mut self) -> Result<()> {
        self.apply_pending_merges()?;
        self.persist_settled()
    }

    /// Applies pending merges oldest head first. A merge changes the arena
    /// only once all of its windows are loaded; a failed load leaves it and
    /// every later merge pending.
    fn apply_pending_merges(&mut self) -> Result<()> {
        self.created_since_apply = 0;
        while let Some((head_id, tails)) = self
            .pending
            .first_key_value()
            .map(|(&id, tails)| (id, tails.clone()))
        {
            let mut head = self.window(head_id)?;
            let absorbed = tails
                .iter()
                .map(|&id| self.window(id))
                .collect::<Result<Vec<_>>>()?;
            let successor = absorbed
                .last()
                .and_then(|w| w.next)
                .map(|id| self.window(id))
                .transpose()?;

            self.pending.remove(&head_id);
            let Some(last) = absorbed.last() else {
                continue;
            };
            head.c_end = last.c_end;
            head.t_end = last.t_end;
            head.next = last.next;
            head.aggregates = self
                .operators
                .iter()
                .enumerate()
                .map(|(i, op)| {
                    let parts: Vec<&Aggregate> = std::iter::once(&head)
                        .chain(absorbed.iter())
                        .filter_map(|w| w.aggregates.get(i))
                        .collect();
                    op.merge(&parts)
                })
                .collect();
            for window in &absorbed {
                self.staged.remove(&window.id);
                self.index.remove(window.t_start);
                self.retired.push(window.id);
                if self.newest == Some(window.id) {
                    self.newest = Some(head_id);
                }
            }
            if let Some(mut successor) = successor {
                successor.prev = Some(head_id);
                self.staged.insert(successor.id, successor);
            }

            #[cfg(feature = "logging")]
            log::trace!(
                "stream {}: merged {} windows into {}",
                self.stream,
                absorbed.len(),
                head_id
            );

            self.staged.insert(head_id, head);
        }
        Ok(())
    }

    /// Writes every staged window except the newest to the store, then
    /// deletes retired windows. Whatever fails stays queued.
    fn persist_settled(&mut self) -> Result<()> {
        let settled: Vec<WindowId> = self
            .staged
            .keys()
            .copied()
            .filter(|&id| Some(id) != self.newest)
            .collect();
        for id in settled {
            if let Some(window) = self.staged.remove(&id)
                && let Err(e) = self.store.put_summary_window(self.stream, &window)
            {
                self.staged.insert(id, window);
                return Err(StoreError::from(e));
            }
        }
        while let Some(&id) = self.retired.last() {
            self.store.delete_summary_window(self.stream, id)?;
            self.retired.pop();
        }
        Ok(())
    }
}

fn insert_value(
    operators: &[Arc<dyn WindowOperator>],
    aggregates: &mut [Aggregate],
    timestamp: i64,
    value: f64,
) {
    for (aggregate, op) in aggregates.iter_mut().zip(operators) {
        let current = std::mem::replace(aggregate, op.create_empty());
        *aggregate = op.insert(current, timestamp, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{CountOperator, MaxOperator, SumOperator};
    use crate::scheduler::SchedulerKind;
    use crate::storage::MemoryBackingStore;
    use crate::windowing::Decay;

    fn chain(decay: Decay, merge_frequency: u64) -> (WindowChain, Arc<MemoryBackingStore>) {
        let store = Arc::new(MemoryBackingStore::new());
        let operators: Arc<[Arc<dyn WindowOperator>]> = Arc::new([
            Arc::new(CountOperator::new()) as Arc<dyn WindowOperator>,
            Arc::new(SumOperator::new()),
            Arc::new(MaxOperator::new()),
        ]);
        let windowing = decay.build().unwrap();
        let first_size = windowing.first_window_size();
        let chain = WindowChain::new(
            0,
            operators,
            Arc::clone(&store) as Arc<dyn BackingStore>,
            SchedulerKind::Heap.build(windowing),
            first_size,
            merge_frequency,
        );
        (chain, store)
    }

    fn layout(chain: &WindowChain) -> Vec<(i64, i64, u64)> {
        chain
            .windows()
            .unwrap()
            .into_iter()
            .map(|w| match w.aggregates[0] {
                Aggregate::Count(n) => (w.t_start, w.t_end, n),
                _ => unreachable!(),
            })
            .collect()
    }

    /// Windows partition `[0, N)` and their links match id order.
    fn assert_partition(chain: &WindowChain) {
        let windows = chain.windows().unwrap();
        let mut expected_start = 0;
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.c_start, expected_start);
            assert!(w.c_end >= w.c_start);
            expected_start = w.c_end + 1;
            assert_eq!(w.prev, i.checked_sub(1).map(|j| windows[j].id));
            assert_eq!(w.next, windows.get(i + 1).map(|n| n.id));
        }
        assert_eq!(expected_start, chain.element_count());
    }

    #[test]
    fn test_exponential_layout() {
        let (mut chain, _) = chain(Decay::exponential(2.0), 1);
        for t in 0..100 {
            chain.append(t, Some(1.0));
            assert_partition(&chain);
        }
        chain.flush().unwrap();
        assert_eq!(
            layout(&chain),
            vec![
                (0, 31, 32),
                (32, 63, 32),
                (64, 79, 16),
                (80, 87, 8),
                (88, 91, 4),
                (92, 95, 4),
                (96, 97, 2),
                (98, 98, 1),
                (99, 99, 1),
            ]
        );
    }

    #[test]
    fn test_merged_aggregates_are_unions() {
        let (mut chain, _) = chain(Decay::exponential(2.0), 1);
        for t in 0..64 {
            chain.append(t, Some(t as f64));
        }
        chain.flush().unwrap();
        let windows = chain.windows().unwrap();
        let total_sum: f64 = windows
            .iter()
            .map(|w| match w.aggregates[1] {
                Aggregate::Sum(s) => s,
                _ => 0.0,
            })
            .sum();
        assert_eq!(total_sum, (0..64).sum::<i64>() as f64);
        let first = &windows[0];
        assert_eq!(first.aggregates[2], Aggregate::Max(first.t_end as f64));
    }

    #[test]
    fn test_merge_frequency_does_not_change_final_layout() {
        let mut layouts = Vec::new();
        for frequency in [1, 3, 7] {
            let (mut chain, _) = chain(Decay::exponential(2.0), frequency);
            for t in 0..200 {
                chain.append(t, Some((t % 10) as f64));
            }
            chain.flush().unwrap();
            assert_partition(&chain);
            layouts.push(chain.windows().unwrap());
        }
        assert_eq!(layouts[0].len(), 10);
        assert_eq!(layouts[0], layouts[1]);
        assert_eq!(layouts[0], layouts[2]);
    }

    #[test]
    fn test_newest_window_fills_before_closing() {
        let (mut chain, _) = chain(Decay::constant(4), 1);
        for t in 0..10 {
            chain.append(t, Some(1.0));
        }
        chain.flush().unwrap();
        assert_eq!(layout(&chain), vec![(0, 3, 4), (4, 7, 4), (8, 9, 2)]);
    }

    #[test]
    fn test_placeholders_take_positions_but_not_values() {
        let (mut chain, _) = chain(Decay::constant(4), 1);
        chain.append(0, Some(5.0));
        chain.append(1, None);
        chain.append(2, None);
        chain.append(3, Some(1.0));
        let window = chain.window(0).unwrap();
        assert_eq!(window.size(), 4);
        assert_eq!(window.t_end, 3);
        assert_eq!(
            window.aggregates,
            vec![Aggregate::Count(2), Aggregate::Sum(6.0), Aggregate::Max(5.0)]
        );
    }

    #[test]
    fn test_partitioned_append_matches_constant_layout() {
        let (mut batched, _) = chain(Decay::rational_power(1, 0, 2, 4), 1);
        let (mut single, _) = chain(Decay::rational_power(1, 0, 2, 4), 1);
        let lengths = [4, 4];
        let elements: Vec<Element> = (0..40).map(|t| (t, Some(1.0))).collect();
        for block in elements.chunks(8) {
            batched.append_partitioned(block, &lengths);
        }
        for &(t, v) in &elements {
            single.append(t, v);
        }
        batched.flush().unwrap();
        single.flush().unwrap();
        assert_eq!(layout(&batched), layout(&single));
        assert_partition(&batched);
    }

    #[test]
    fn test_partial_block_falls_back_to_single_appends() {
        let (mut chain, _) = chain(Decay::exponential(2.0), 1);
        let elements: Vec<Element> = (0..5).map(|t| (t, Some(1.0))).collect();
        // [1, 2, 4] covers 7 > 5, so only [1, 2] are laid out as a block
        chain.append_partitioned(&elements, &[1, 2, 4]);
        chain.flush().unwrap();
        assert_partition(&chain);
        assert_eq!(chain.element_count(), 5);
    }

    #[test]
    fn test_settled_windows_reach_the_store() {
        let (mut chain, store) = chain(Decay::exponential(2.0), 1);
        for t in 0..20 {
            chain.append(t, Some(1.0));
        }
        // everything but the newest window is persisted as merges apply
        assert_eq!(store.num_summary_windows(0), chain.num_windows() - 1);
        chain.flush().unwrap();
        assert_eq!(store.num_summary_windows(0), chain.num_windows());
    }
}
