//! Persistence collaborator interface.
//!
//! The store never touches a medium directly. Windows, landmark windows,
//! per-stream metadata and auxiliary key/value pairs all go through a
//! [`BackingStore`], which owns the encoding and the medium. The crate ships
//! [`MemoryBackingStore`]; anything durable plugs in behind the same trait.

mod index;
mod memory;

pub use index::TemporalIndex;
pub use memory::MemoryBackingStore;

use serde::{Deserialize, Serialize};

use crate::error::BackingStoreError;
use crate::stats::StreamStatistics;
use crate::window::{LandmarkId, LandmarkWindow, StreamId, SummaryWindow, WindowId};

/// Per-stream state persisted alongside the windows on flush and close.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Stream statistics.
    pub stats: StreamStatistics,
    /// Number of insert positions consumed, landmark placeholders included.
    pub element_count: u64,
    /// Summary window start time to window id.
    pub summary_index: Vec<(i64, WindowId)>,
    /// Landmark window start time to landmark id.
    pub landmark_index: Vec<(i64, LandmarkId)>,
}

/// Storage for windows and stream metadata, keyed by `(stream, id)`.
///
/// Implementations must round-trip every value losslessly and be safe to
/// share between the ingest workers and query threads. Failures are
/// reported as [`BackingStoreError`] and surfaced to callers unchanged.
pub trait BackingStore: Send + Sync {
    /// Loads a summary window.
    fn get_summary_window(
        &self,
        stream: StreamId,
        id: WindowId,
    ) -> Result<SummaryWindow, BackingStoreError>;

    /// Inserts or replaces a summary window.
    fn put_summary_window(
        &self,
        stream: StreamId,
        window: &SummaryWindow,
    ) -> Result<(), BackingStoreError>;

    /// Removes a summary window. Removing a window that was never written is
    /// not an error.
    fn delete_summary_window(&self, stream: StreamId, id: WindowId)
    -> Result<(), BackingStoreError>;

    /// Loads a landmark window.
    fn get_landmark_window(
        &self,
        stream: StreamId,
        id: LandmarkId,
    ) -> Result<LandmarkWindow, BackingStoreError>;

    /// Inserts or replaces a landmark window.
    fn put_landmark_window(
        &self,
        stream: StreamId,
        window: &LandmarkWindow,
    ) -> Result<(), BackingStoreError>;

    /// Loads stream metadata, `None` if it was never written.
    fn get_metadata(&self, stream: StreamId) -> Result<Option<StreamMetadata>, BackingStoreError>;

    /// Inserts or replaces stream metadata.
    fn put_metadata(
        &self,
        stream: StreamId,
        metadata: &StreamMetadata,
    ) -> Result<(), BackingStoreError>;

    /// Loads an auxiliary value.
    fn get_aux(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackingStoreError>;

    /// Inserts or replaces an auxiliary value.
    fn put_aux(&self, key: &[u8], value: &[u8]) -> Result<(), BackingStoreError>;

    /// Makes everything written so far durable.
    fn flush(&self) -> Result<(), BackingStoreError> {
        Ok(())
    }

    /// Flushes and releases the medium. Later calls may fail with
    /// [`BackingStoreError::Closed`].
    fn close(&self) -> Result<(), BackingStoreError> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serde_lossless() {
        let mut stats = StreamStatistics::new();
        for (t, v) in [(3, 1.5), (4, -2.0), (9, 0.25)] {
            stats.append(t, v);
        }
        let metadata = StreamMetadata {
            stats,
            element_count: 3,
            summary_index: vec![(3, 0), (9, 2)],
            landmark_index: vec![(4, 0)],
        };
        let config = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(&metadata, config).unwrap();
        let (decoded, _): (StreamMetadata, usize) =
            bincode::serde::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(decoded, metadata);
        assert_eq!(decoded.stats.time_range_end(), Some(9));
    }
}
