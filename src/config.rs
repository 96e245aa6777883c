//! Store and stream configuration.

use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::scheduler::SchedulerKind;
use crate::storage::{BackingStore, MemoryBackingStore};
use crate::store::SummaryStore;

/// Default number of flush worker threads shared by all streams.
const DEFAULT_FLUSH_WORKERS: usize = 2;

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Worker threads applying full ingest buffers.
    ///
    /// Default: 2
    pub flush_workers: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flush_workers: DEFAULT_FLUSH_WORKERS,
        }
    }
}

/// Per-stream settings fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Total values staged across both ingest buffers; 0 disables buffering.
    ///
    /// Each buffer holds the windows covering up to half of this, so the
    /// effective capacity may be smaller.
    ///
    /// Default: 0
    pub ingest_buffer_size: usize,

    /// Number of new windows between passes that apply scheduled merges.
    ///
    /// Default: 1
    pub merge_frequency: u64,

    /// Merge scheduling strategy.
    ///
    /// Default: [`SchedulerKind::Heap`]
    pub scheduler: SchedulerKind,

    /// Lay each full ingest buffer out directly as the windows covering it,
    /// instead of appending its elements one at a time. Faster, and gives the
    /// same layout as one-at-a-time ingest for constant-length decays.
    ///
    /// For growing decays this mode does not preserve the layout of
    /// one-at-a-time ingest: window boundaries differ and the stream usually
    /// keeps fewer windows (14 instead of 18 for 1022 values under
    /// exponential decay with a 62-value budget). Counts, sums and maxima
    /// stay exact over every whole window. Leave it off when buffered
    /// ingest must match unbuffered ingest window for window, which the
    /// default mode guarantees for any buffer size.
    ///
    /// Default: false
    pub batch_partition: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ingest_buffer_size: 0,
            merge_frequency: 1,
            scheduler: SchedulerKind::default(),
            batch_partition: false,
        }
    }
}

impl StreamConfig {
    /// Default settings: unbuffered, merges applied on every new window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets [`ingest_buffer_size`](Self::ingest_buffer_size).
    #[must_use]
    pub fn ingest_buffer_size(mut self, size: usize) -> Self {
        self.ingest_buffer_size = size;
        self
    }

    /// Sets [`merge_frequency`](Self::merge_frequency).
    #[must_use]
    pub fn merge_frequency(mut self, frequency: u64) -> Self {
        self.merge_frequency = frequency;
        self
    }

    /// Sets [`scheduler`](Self::scheduler).
    #[must_use]
    pub fn scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Sets [`batch_partition`](Self::batch_partition).
    #[must_use]
    pub fn batch_partition(mut self, enabled: bool) -> Self {
        self.batch_partition = enabled;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.merge_frequency == 0 {
            return Err(StoreError::config("merge frequency must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for configuring and opening a [`SummaryStore`].
///
/// # Example
///
/// ```
/// use decaystore::SummaryStore;
///
/// let store = SummaryStore::builder().flush_workers(4).build()?;
/// store.close()?;
/// # Ok::<(), decaystore::StoreError>(())
/// ```
pub struct SummaryStoreBuilder {
    config: StoreConfig,
    backing_store: Option<Arc<dyn BackingStore>>,
}

impl SummaryStoreBuilder {
    /// Creates a new builder with default settings and an in-memory backing
    /// store.
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
            backing_store: None,
        }
    }

    /// Sets the number of flush worker threads.
    ///
    /// Default: 2
    ///
    /// # Arguments
    ///
    /// * `workers` - thread count, at least 1
    #[must_use]
    pub fn flush_workers(mut self, workers: usize) -> Self {
        self.config.flush_workers = workers;
        self
    }

    /// Uses `store` for persistence instead of a fresh [`MemoryBackingStore`].
    #[must_use]
    pub fn backing_store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.backing_store = Some(store);
        self
    }

    /// Starts the flush workers and returns the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] for zero flush workers and
    /// [`StoreError::Io`] if a worker thread cannot be spawned.
    pub fn build(self) -> Result<SummaryStore> {
        if self.config.flush_workers == 0 {
            return Err(StoreError::config("at least one flush worker is required"));
        }
        let backing_store = self
            .backing_store
            .unwrap_or_else(|| Arc::new(MemoryBackingStore::new()));
        SummaryStore::with_config(self.config, backing_store)
    }
}

impl Default for SummaryStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
