//! Windowing over an arbitrary length sequence.

use std::collections::{BTreeMap, BTreeSet};

use super::{WindowLengths, Windowing};

/// [`Windowing`] built by walking a [`WindowLengths`] sequence.
///
/// Markers are appended lazily and never recomputed: each query extends the
/// marker set only as far as it needs to, so a long-running stream pays
/// amortized `O(log n)` per call.
#[derive(Debug)]
pub struct GenericWindowing<L> {
    lengths: L,
    first_window_length: u64,
    /// Window length -> start marker of the first window of that length.
    first_window_of_length: BTreeMap<u64, u64>,
    window_start_markers: BTreeSet<u64>,
    last_window_start: u64,
    last_window_length: u64,
}

impl<L: WindowLengths> GenericWindowing<L> {
    /// Creates a windowing over `lengths`.
    pub fn new(mut lengths: L) -> Self {
        let first_window_length = lengths.next_length();
        let mut windowing = Self {
            lengths,
            first_window_length,
            first_window_of_length: BTreeMap::new(),
            window_start_markers: BTreeSet::new(),
            last_window_start: 0,
            last_window_length: 0,
        };
        windowing.add_window(first_window_length);
        windowing
    }

    fn add_window(&mut self, length: u64) {
        debug_assert!(length >= self.last_window_length && length > 0);
        self.last_window_start = self.last_window_start.saturating_add(self.last_window_length);
        if length > self.last_window_length {
            self.first_window_of_length
                .insert(length, self.last_window_start);
        }
        self.window_start_markers.insert(self.last_window_start);
        self.last_window_length = length;
    }

    fn add_next_window(&mut self) {
        let length = self.lengths.next_length();
        self.add_window(length);
    }

    /// Returns false when no window will ever reach `target` elements.
    fn add_windows_until_length(&mut self, target: u64) -> bool {
        if target > self.lengths.max_length() {
            return false;
        }
        while self.last_window_length < target {
            self.add_next_window();
        }
        true
    }

    fn add_windows_past_marker(&mut self, target: u64) {
        while self.last_window_start <= target {
            self.add_next_window();
        }
    }
}

impl<L: WindowLengths> Windowing for GenericWindowing<L> {
    fn first_containing_time(&mut self, tl: u64, tr: u64, t: u64) -> Option<u64> {
        debug_assert!(tl <= tr && tr < t);
        let l = t - 1 - tr;
        let r = t - 1 - tl;
        let length = tr - tl + 1;
        if !self.add_windows_until_length(length) {
            return None;
        }
        let first_marker = *self.first_window_of_length.range(length..).next()?.1;
        if first_marker >= l {
            // [l', r'] starts exactly at the first long-enough window once
            // T' - 1 - tr == first_marker
            return Some(first_marker + tr + 1);
        }
        // A window of the target length is already behind l, so [l, r] is
        // either inside the window holding l or will be once l crosses into
        // the next one.
        self.add_windows_past_marker(l);
        let next_start = *self.window_start_markers.range(l + 1..).next()?;
        let window_end = next_start - 1;
        if r <= window_end {
            Some(t)
        } else {
            Some(window_end + tr + 2)
        }
    }

    fn first_window_size(&self) -> u64 {
        self.first_window_length
    }

    fn windows_covering_upto(&mut self, n: u64) -> Vec<u64> {
        if n == 0 {
            return Vec::new();
        }
        self.add_windows_past_marker(n);
        let mut lengths = Vec::new();
        let mut prev_marker = 0;
        for &marker in self.window_start_markers.iter().skip(1) {
            if marker > n {
                break;
            }
            lengths.push(marker - prev_marker);
            prev_marker = marker;
        }
        lengths
    }
}
