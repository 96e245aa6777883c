use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use super::{BackingStore, StreamMetadata};
use crate::error::BackingStoreError;
use crate::window::{LandmarkId, LandmarkWindow, StreamId, SummaryWindow, WindowId};

/// [`BackingStore`] that keeps everything in process memory.
///
/// Values are cloned in and out, so callers never share state with the
/// store. After [`close`](BackingStore::close) every call fails with
/// [`BackingStoreError::Closed`].
#[derive(Debug, Default)]
pub struct MemoryBackingStore {
    summaries: RwLock<HashMap<(StreamId, WindowId), SummaryWindow>>,
    landmarks: RwLock<HashMap<(StreamId, LandmarkId), LandmarkWindow>>,
    metadata: RwLock<HashMap<StreamId, StreamMetadata>>,
    aux: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryBackingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of summary windows held for `stream`.
    pub fn num_summary_windows(&self, stream: StreamId) -> usize {
        self.summaries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(s, _)| *s == stream)
            .count()
    }

    fn check_open(&self) -> Result<(), BackingStoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BackingStoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl BackingStore for MemoryBackingStore {
    fn get_summary_window(
        &self,
        stream: StreamId,
        id: WindowId,
    ) -> Result<SummaryWindow, BackingStoreError> {
        self.check_open()?;
        self.summaries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(stream, id))
            .cloned()
            .ok_or(BackingStoreError::SummaryWindowNotFound { stream, id })
    }

    fn put_summary_window(
        &self,
        stream: StreamId,
        window: &SummaryWindow,
    ) -> Result<(), BackingStoreError> {
        self.check_open()?;
        self.summaries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((stream, window.id), window.clone());
        Ok(())
    }

    fn delete_summary_window(
        &self,
        stream: StreamId,
        id: WindowId,
    ) -> Result<(), BackingStoreError> {
        self.check_open()?;
        self.summaries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(stream, id));
        Ok(())
    }

    fn get_landmark_window(
        &self,
        stream: StreamId,
        id: LandmarkId,
    ) -> Result<LandmarkWindow, BackingStoreError> {
        self.check_open()?;
        self.landmarks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(stream, id))
            .cloned()
            .ok_or(BackingStoreError::LandmarkWindowNotFound { stream, id })
    }

    fn put_landmark_window(
        &self,
        stream: StreamId,
        window: &LandmarkWindow,
    ) -> Result<(), BackingStoreError> {
        self.check_open()?;
        self.landmarks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((stream, window.id), window.clone());
        Ok(())
    }

    fn get_metadata(&self, stream: StreamId) -> Result<Option<StreamMetadata>, BackingStoreError> {
        self.check_open()?;
        Ok(self
            .metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stream)
            .cloned())
    }

    fn put_metadata(
        &self,
        stream: StreamId,
        metadata: &StreamMetadata,
    ) -> Result<(), BackingStoreError> {
        self.check_open()?;
        self.metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(stream, metadata.clone());
        Ok(())
    }

    fn get_aux(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackingStoreError> {
        self.check_open()?;
        Ok(self
            .aux
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn put_aux(&self, key: &[u8], value: &[u8]) -> Result<(), BackingStoreError> {
        self.check_open()?;
        self.aux
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn close(&self) -> Result<(), BackingStoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
