use std::collections::BTreeMap;

/// Start time to id map used to resolve a time range to the windows
/// overlapping it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemporalIndex {
    starts: BTreeMap<i64, u64>,
}

impl TemporalIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds an index from `(start, id)` pairs.
    pub fn from_entries(entries: &[(i64, u64)]) -> Self {
        Self {
            starts: entries.iter().copied().collect(),
        }
    }

    /// Records a window starting at `start`.
    pub fn insert(&mut self, start: i64, id: u64) {
        self.starts.insert(start, id);
    }

    /// Forgets the window starting at `start`.
    pub fn remove(&mut self, start: i64) -> Option<u64> {
        self.starts.remove(&start)
    }

    /// Number of indexed windows.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// All `(start, id)` pairs in start order.
    pub fn entries(&self) -> Vec<(i64, u64)> {
        self.starts.iter().map(|(&t, &id)| (t, id)).collect()
    }

    /// Ids of the windows that may overlap `[t0, t1]`, oldest first.
    ///
    /// Starts from the last window starting at or before `t0` (or the first
    /// window, if none does) and runs through the last window starting at or
    /// before `t1`. For contiguous windows this is exactly the overlapping
    /// set; for landmark windows, which can leave gaps, the caller still has
    /// to drop a leading window that ended before `t0`.
    pub fn candidates(&self, t0: i64, t1: i64) -> Vec<u64> {
        debug_assert!(t0 <= t1);
        let from = self
            .starts
            .range(..=t0)
            .next_back()
            .map_or(t0, |(&t, _)| t);
        self.starts.range(from..=t1).map(|(_, &id)| id).collect()
    }
}
