//! The public entry point: a registry of streams sharing one backing store
//! and one flush worker pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;

use crate::config::{StoreConfig, StreamConfig, SummaryStoreBuilder};
use crate::error::{Result, StoreError};
use crate::ingest::FlushPool;
use crate::operator::{OperatorKind, QueryResult, WindowOperator};
use crate::stats::StreamStatistics;
use crate::storage::BackingStore;
use crate::stream::Stream;
use crate::window::StreamId;
use crate::windowing::Windowing;

/// Prefix separating caller-supplied auxiliary keys from anything the store
/// may keep in the same namespace.
const AUX_PREFIX: &[u8] = b"external/";

/// Time-decayed summary store.
///
/// Holds any number of independent streams. Each stream ingests
/// `(timestamp, value)` pairs in strictly increasing timestamp order and
/// keeps them in summary windows that grow coarser with age, as dictated by
/// its decay shape. Range queries combine those windows with the exact
/// values kept in landmark windows.
///
/// All methods take `&self`; the store is meant to be shared behind an
/// [`Arc`]. Writes to one stream are serialized, writes to different
/// streams proceed in parallel, and queries run concurrently with each other.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use decaystore::{CountOperator, Decay, SummaryStore, WindowOperator};
///
/// let store = SummaryStore::new()?;
/// let operators: Vec<Arc<dyn WindowOperator>> = vec![Arc::new(CountOperator::new())];
/// store.register(0, Decay::exponential(2.0).build()?, operators)?;
/// for t in 0..100 {
///     store.append(0, t, 1.0)?;
/// }
/// store.flush(0)?;
/// let count = store.query(0, 0, 99, 0, &[])?;
/// assert_eq!(count.as_estimate().map(|e| e.value), Some(100.0));
/// store.close()?;
/// # Ok::<(), decaystore::StoreError>(())
/// ```
pub struct SummaryStore {
    streams: ArcSwap<HashMap<StreamId, Arc<Stream>>>,
    registration: Mutex<()>,
    backing_store: Arc<dyn BackingStore>,
    pool: FlushPool,
    closed: AtomicBool,
}

impl SummaryStore {
    /// Opens a store with default settings over a fresh in-memory backing
    /// store.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Returns a builder for configuring the store.
    pub fn builder() -> SummaryStoreBuilder {
        SummaryStoreBuilder::new()
    }

    pub(crate) fn with_config(
        config: StoreConfig,
        backing_store: Arc<dyn BackingStore>,
    ) -> Result<Self> {
        let pool = FlushPool::new(config.flush_workers)?;

        #[cfg(feature = "logging")]
        log::info!(
            "opened summary store with {} flush workers",
            config.flush_workers
        );

        Ok(Self {
            streams: ArcSwap::from_pointee(HashMap::new()),
            registration: Mutex::new(()),
            backing_store,
            pool,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn stream(&self, id: StreamId) -> Result<Arc<Stream>> {
        self.check_open()?;
        self.streams
            .load()
            .get(&id)
            .cloned()
            .ok_or(StoreError::StreamNotFound(id))
    }

    /// Registers a stream with default [`StreamConfig`].
    ///
    /// # Arguments
    ///
    /// * `id` - stream id, unique within the store
    /// * `windowing` - decay shape, e.g. from [`Decay::build`](crate::Decay::build)
    /// * `operators` - aggregates kept per window, queried by position
    pub fn register(
        &self,
        id: StreamId,
        windowing: Box<dyn Windowing>,
        operators: Vec<Arc<dyn WindowOperator>>,
    ) -> Result<()> {
        self.register_with_config(id, windowing, operators, &StreamConfig::default())
    }

    /// Registers a stream with explicit settings.
    ///
    /// # Errors
    ///
    /// [`StoreError::StreamExists`] if `id` is taken, and
    /// [`StoreError::Configuration`] for invalid settings.
    pub fn register_with_config(
        &self,
        id: StreamId,
        windowing: Box<dyn Windowing>,
        operators: Vec<Arc<dyn WindowOperator>>,
        config: &StreamConfig,
    ) -> Result<()> {
        self.check_open()?;
        let _guard = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.streams.load().contains_key(&id) {
            return Err(StoreError::StreamExists(id));
        }
        let stream = Stream::new(
            id,
            windowing,
            operators,
            Arc::clone(&self.backing_store),
            config,
        )?;
        let mut streams = HashMap::clone(&self.streams.load());
        streams.insert(id, Arc::new(stream));
        self.streams.store(Arc::new(streams));
        Ok(())
    }

    /// Ids of all registered streams, in no particular order.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.streams.load().keys().copied().collect()
    }

    /// Appends `value` at `timestamp`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Ordering`] unless `timestamp` is later than every prior
    /// append and landmark transition on the stream, and
    /// [`StoreError::Configuration`] for a negative timestamp; nothing is
    /// modified. An accepted value is never rolled back: backing store
    /// failures met while settling windows are retried by later merge passes
    /// and returned by [`flush`](Self::flush) while they persist.
    pub fn append(&self, stream: StreamId, timestamp: i64, value: f64) -> Result<()> {
        self.stream(stream)?.append(timestamp, value, &self.pool)
    }

    /// Appends `value` stamped with the current wall-clock time in
    /// milliseconds since the Unix epoch.
    pub fn append_now(&self, stream: StreamId, value: f64) -> Result<()> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        self.append(stream, millis, value)
    }

    /// Starts retaining values exactly from `timestamp` on. A no-op if a
    /// landmark is already active.
    pub fn start_landmark(&self, stream: StreamId, timestamp: i64) -> Result<()> {
        self.stream(stream)?.start_landmark(timestamp)
    }

    /// Seals the active landmark at `timestamp`.
    pub fn end_landmark(&self, stream: StreamId, timestamp: i64) -> Result<()> {
        self.stream(stream)?.end_landmark(timestamp)
    }

    /// Queries operator `operator_index` over `[t0, t1]`.
    ///
    /// The range is clipped to the stream's extent; a range outside it
    /// yields the operator's empty result. Values still sitting in ingest
    /// buffers are not visible until the next flush.
    ///
    /// # Errors
    ///
    /// [`StoreError::Configuration`] if `t0 > t1`, `t0 < 0`, the operator
    /// index is out of range, or the operator rejects `params`.
    pub fn query(
        &self,
        stream: StreamId,
        t0: i64,
        t1: i64,
        operator_index: usize,
        params: &[f64],
    ) -> Result<QueryResult> {
        self.stream(stream)?.query(t0, t1, operator_index, params)
    }

    /// Applies everything buffered for `stream` and persists its state.
    ///
    /// # Errors
    ///
    /// [`StoreError::BackingStore`] with the store's own failure. Windows
    /// that could not be written stay in memory, so a later flush can
    /// complete the work.
    pub fn flush(&self, stream: StreamId) -> Result<()> {
        self.stream(stream)?.flush()
    }

    /// Flushes every stream, stops the flush workers and closes the backing
    /// store. Later calls fail with [`StoreError::Closed`]; closing twice is
    /// a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let streams = self.streams.load();
        let mut first_error = None;
        for stream in streams.values() {
            if let Err(e) = stream.close() {
                first_error.get_or_insert(e);
            }
        }
        self.pool.shutdown();
        if let Err(e) = self.backing_store.close() {
            first_error.get_or_insert(StoreError::from(e));
        }

        #[cfg(feature = "logging")]
        log::info!("closed summary store with {} streams", streams.len());

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Position of the first operator of `kind` on `stream`.
    pub fn operator_index(&self, stream: StreamId, kind: OperatorKind) -> Result<usize> {
        self.stream(stream)?.operator_index(kind)
    }

    /// Snapshot of the stream's statistics.
    pub fn stream_statistics(&self, stream: StreamId) -> Result<StreamStatistics> {
        Ok(self.stream(stream)?.statistics())
    }

    /// Summary windows held by one stream, or by all streams for `None`.
    pub fn num_summary_windows(&self, stream: Option<StreamId>) -> Result<usize> {
        match stream {
            Some(id) => Ok(self.stream(id)?.num_summary_windows()),
            None => {
                self.check_open()?;
                Ok(self
                    .streams
                    .load()
                    .values()
                    .map(|s| s.num_summary_windows())
                    .sum())
            }
        }
    }

    /// Landmark windows held by one stream, or by all streams for `None`.
    pub fn num_landmark_windows(&self, stream: Option<StreamId>) -> Result<usize> {
        match stream {
            Some(id) => Ok(self.stream(id)?.num_landmark_windows()),
            None => {
                self.check_open()?;
                Ok(self
                    .streams
                    .load()
                    .values()
                    .map(|s| s.num_landmark_windows())
                    .sum())
            }
        }
    }

    /// Reads a caller-defined value stored alongside the streams.
    pub fn get_aux(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.backing_store.get_aux(&aux_key(key))?)
    }

    /// Stores a caller-defined value alongside the streams.
    pub fn put_aux(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        Ok(self.backing_store.put_aux(&aux_key(key), value)?)
    }

    /// Logs a one-line summary of every stream at info level.
    pub fn log_state(&self) {
        let streams = self.streams.load();
        let mut ids: Vec<_> = streams.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(stream) = streams.get(&id) {
                stream.log_state();
            }
        }
    }

    /// Logs every window of `stream` at info level.
    pub fn log_windows(&self, stream: StreamId) -> Result<()> {
        self.stream(stream)?.log_windows()
    }
}

impl Drop for SummaryStore {
    fn drop(&mut self) {
        if let Err(_e) = self.close() {
            #[cfg(feature = "logging")]
            log::error!("summary store shutdown failed: {_e}");
        }
    }
}

fn aux_key(key: &[u8]) -> Vec<u8> {
    let mut prefixed = Vec::with_capacity(AUX_PREFIX.len() + key.len());
    prefixed.extend_from_slice(AUX_PREFIX);
    prefixed.extend_from_slice(key);
    prefixed
}
