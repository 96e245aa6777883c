//! Persisted units of stream data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operator::Aggregate;

/// Identifier of a registered stream.
pub type StreamId = u64;

/// Identifier of a summary window, unique and increasing in creation order
/// within a stream.
pub type WindowId = u64;

/// Identifier of a landmark window within a stream.
pub type LandmarkId = u64;

/// A contiguous range of stream elements summarized as one unit.
///
/// Covers insert positions `[c_start, c_end]` and timestamps
/// `[t_start, t_end]`, both inclusive. Holds one aggregate per operator
/// registered on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryWindow {
    /// Window id.
    pub id: WindowId,
    /// Timestamp of the first element.
    pub t_start: i64,
    /// Timestamp of the last element.
    pub t_end: i64,
    /// Insert position of the first element.
    pub c_start: u64,
    /// Insert position of the last element.
    pub c_end: u64,
    /// Next older window.
    pub prev: Option<WindowId>,
    /// Next newer window.
    pub next: Option<WindowId>,
    /// One aggregate per registered operator.
    pub aggregates: Vec<Aggregate>,
}

impl SummaryWindow {
    /// Number of insert positions covered, landmark placeholders included.
    pub fn size(&self) -> u64 {
        self.c_end - self.c_start + 1
    }
}

impl fmt::Display for SummaryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<summary-window {}: time range [{}:{}], count range [{}:{}], aggregates {:?}>",
            self.id, self.t_start, self.t_end, self.c_start, self.c_end, self.aggregates
        )
    }
}

/// Exact retention of every value appended while a landmark is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkWindow {
    /// Landmark id.
    pub id: LandmarkId,
    /// Timestamp the landmark was opened at.
    pub t_start: i64,
    /// Timestamp the landmark was sealed at; `None` while still open.
    pub t_end: Option<i64>,
    /// Raw values keyed by timestamp.
    pub values: BTreeMap<i64, f64>,
}

impl LandmarkWindow {
    /// Opens a landmark at `t_start`.
    pub fn new(id: LandmarkId, t_start: i64) -> Self {
        Self {
            id,
            t_start,
            t_end: None,
            values: BTreeMap::new(),
        }
    }

    /// Records a raw value.
    pub fn append(&mut self, timestamp: i64, value: f64) {
        debug_assert!(timestamp >= self.t_start);
        debug_assert!(self.values.keys().next_back().is_none_or(|&t| t < timestamp));
        self.values.insert(timestamp, value);
    }

    /// Seals the landmark at `timestamp`.
    pub fn close(&mut self, timestamp: i64) {
        debug_assert!(timestamp >= self.t_start);
        self.t_end = Some(timestamp);
    }

    /// Whether the landmark is still accepting values.
    pub fn is_open(&self) -> bool {
        self.t_end.is_none()
    }

    /// End of the covered time range; an open landmark extends indefinitely.
    pub fn effective_end(&self) -> i64 {
        self.t_end.unwrap_or(i64::MAX)
    }
}

impl fmt::Display for LandmarkWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.t_end {
            Some(end) => write!(
                f,
                "<landmark-window {}: time range [{}:{}], {} values>",
                self.id,
                self.t_start,
                end,
                self.values.len()
            ),
            None => write!(
                f,
                "<landmark-window {}: open since {}, {} values>",
                self.id,
                self.t_start,
                self.values.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_window() -> SummaryWindow {
        SummaryWindow {
            id: 4,
            t_start: 100,
            t_end: 160,
            c_start: 8,
            c_end: 15,
            prev: Some(3),
            next: None,
            aggregates: vec![
                Aggregate::Count(8),
                Aggregate::Sum(12.5),
                Aggregate::Max(f64::NEG_INFINITY),
            ],
        }
    }

    #[test]
    fn test_summary_window_serde_lossless() {
        let window = sample_window();
        let config = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(&window, config).unwrap();
        let (decoded, _): (SummaryWindow, usize) =
            bincode::serde::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(decoded, window);
        assert_eq!(decoded.size(), 8);
    }

    #[test]
    fn test_landmark_window_serde_lossless() {
        let mut landmark = LandmarkWindow::new(0, 50);
        landmark.append(50, 1.0);
        landmark.append(55, -3.25);
        landmark.close(60);
        let config = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(&landmark, config).unwrap();
        let (decoded, _): (LandmarkWindow, usize) =
            bincode::serde::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(decoded, landmark);
        assert_eq!(decoded.effective_end(), 60);
    }

    #[test]
    fn test_open_landmark_extends_indefinitely() {
        let landmark = LandmarkWindow::new(1, 10);
        assert!(landmark.is_open());
        assert_eq!(landmark.effective_end(), i64::MAX);
        assert!(landmark.to_string().contains("open since 10"));
    }
}
