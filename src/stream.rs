//! Per-stream state machine.
//!
//! A stream alternates between normal ingest and an active landmark. Every
//! append advances the decayed window sequence by one insert position; while
//! a landmark is active the position is taken by a placeholder and the raw
//! value is kept exactly in the landmark window instead.
//!
//! Locking: `front` guards the ordering state, statistics, landmarks and the
//! active ingest buffer, and is held for writing by every mutating call. The
//! window chain has its own lock so buffered flush jobs can run without
//! `front`. Whenever both are needed `front` is taken first.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::chain::WindowChain;
use crate::config::StreamConfig;
use crate::error::{Result, StoreError};
use crate::ingest::{FlushPool, Ingest, IngestBuffer};
use crate::operator::{OperatorKind, QueryContext, QueryResult, WindowOperator};
use crate::stats::StreamStatistics;
use crate::storage::{BackingStore, StreamMetadata, TemporalIndex};
use crate::window::{LandmarkId, LandmarkWindow, StreamId};
use crate::windowing::Windowing;

struct StreamState {
    stats: StreamStatistics,
    last_append: Option<i64>,
    last_landmark_start: Option<i64>,
    last_landmark_end: Option<i64>,
    active_landmark: Option<LandmarkWindow>,
    landmark_index: TemporalIndex,
    next_landmark_id: LandmarkId,
    buffer: Option<IngestBuffer>,
    closed: bool,
}

impl StreamState {
    /// Whether `timestamp` may be appended or open a landmark.
    fn accepts_append(&self, timestamp: i64) -> bool {
        self.last_append.is_none_or(|t| timestamp > t)
            && self.last_landmark_start.is_none_or(|t| timestamp >= t)
            && self.last_landmark_end.is_none_or(|t| timestamp > t)
    }

    /// Whether `timestamp` may seal a landmark; it may coincide with the
    /// last append.
    fn accepts_landmark_end(&self, timestamp: i64) -> bool {
        self.last_append.is_none_or(|t| timestamp >= t)
            && self.last_landmark_start.is_none_or(|t| timestamp >= t)
            && self.last_landmark_end.is_none_or(|t| timestamp > t)
    }
}

/// One registered stream.
pub(crate) struct Stream {
    id: StreamId,
    operators: Arc<[Arc<dyn WindowOperator>]>,
    store: Arc<dyn BackingStore>,
    front: RwLock<StreamState>,
    chain: Arc<RwLock<WindowChain>>,
    ingest: Option<Arc<Ingest>>,
}

impl Stream {
    pub(crate) fn new(
        id: StreamId,
        mut windowing: Box<dyn Windowing>,
        operators: Vec<Arc<dyn WindowOperator>>,
        store: Arc<dyn BackingStore>,
        config: &StreamConfig,
    ) -> Result<Self> {
        config.validate()?;
        let operators: Arc<[Arc<dyn WindowOperator>]> = operators.into();
        let first_size = windowing.first_window_size();
        let buffer_lengths = if config.ingest_buffer_size > 0 {
            windowing.windows_covering_upto(config.ingest_buffer_size as u64 / 2)
        } else {
            Vec::new()
        };
        let chain = Arc::new(RwLock::new(WindowChain::new(
            id,
            Arc::clone(&operators),
            Arc::clone(&store),
            config.scheduler.build(windowing),
            first_size,
            config.merge_frequency,
        )));
        let ingest = Ingest::new(
            id,
            Arc::clone(&chain),
            buffer_lengths,
            config.batch_partition,
        )
        .map(Arc::new);

        #[cfg(feature = "logging")]
        log::info!(
            "registered stream {id}: {} operators, newest window size {first_size}, {}",
            operators.len(),
            match &ingest {
                Some(ingest) => format!("ingest buffer capacity {}", ingest.capacity()),
                None => "unbuffered".to_string(),
            }
        );

        Ok(Self {
            id,
            operators,
            store,
            front: RwLock::new(StreamState {
                stats: StreamStatistics::new(),
                last_append: None,
                last_landmark_start: None,
                last_landmark_end: None,
                active_landmark: None,
                landmark_index: TemporalIndex::new(),
                next_landmark_id: 0,
                buffer: None,
                closed: false,
            }),
            chain,
            ingest,
        })
    }

    fn read_front(&self) -> RwLockReadGuard<'_, StreamState> {
        self.front.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_front(&self) -> Result<RwLockWriteGuard<'_, StreamState>> {
        let front = self.front.write().unwrap_or_else(PoisonError::into_inner);
        if front.closed {
            return Err(StoreError::Closed);
        }
        Ok(front)
    }

    fn read_chain(&self) -> RwLockReadGuard<'_, WindowChain> {
        self.chain.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn ordering_error(&self, timestamp: i64, operation: &'static str) -> StoreError {
        StoreError::Ordering {
            stream: self.id,
            timestamp,
            operation,
        }
    }

    pub(crate) fn append(&self, timestamp: i64, value: f64, pool: &FlushPool) -> Result<()> {
        if timestamp < 0 {
            return Err(StoreError::config(format!(
                "timestamps must be non-negative, got {timestamp}"
            )));
        }
        let mut front = self.write_front()?;
        if !front.accepts_append(timestamp) {
            return Err(self.ordering_error(timestamp, "append"));
        }
        let decayed = if front.active_landmark.is_some() {
            None
        } else {
            Some(value)
        };

        match &self.ingest {
            Some(ingest) => {
                let buffer = front.buffer.get_or_insert_with(|| ingest.acquire());
                buffer.push(timestamp, decayed);
                if buffer.is_full()
                    && let Some(full) = front.buffer.take()
                {
                    ingest.submit(full, pool);
                }
            }
            None => {
                self.chain
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .append(timestamp, decayed);
            }
        }

        if let Some(landmark) = front.active_landmark.as_mut() {
            landmark.append(timestamp, value);
        }
        front.stats.append(timestamp, value);
        front.last_append = Some(timestamp);
        Ok(())
    }

    pub(crate) fn start_landmark(&self, timestamp: i64) -> Result<()> {
        if timestamp < 0 {
            return Err(StoreError::config(format!(
                "timestamps must be non-negative, got {timestamp}"
            )));
        }
        let mut front = self.write_front()?;
        if !front.accepts_append(timestamp) {
            return Err(self.ordering_error(timestamp, "landmark start"));
        }
        if front.active_landmark.is_some() {
            return Ok(());
        }
        let landmark = LandmarkWindow::new(front.next_landmark_id, timestamp);
        self.store.put_landmark_window(self.id, &landmark)?;

        #[cfg(feature = "logging")]
        log::debug!("stream {}: landmark {} opened at {timestamp}", self.id, landmark.id);

        front.landmark_index.insert(timestamp, landmark.id);
        front.next_landmark_id += 1;
        front.last_landmark_start = Some(timestamp);
        front.active_landmark = Some(landmark);
        Ok(())
    }

    pub(crate) fn end_landmark(&self, timestamp: i64) -> Result<()> {
        let mut front = self.write_front()?;
        if !front.accepts_landmark_end(timestamp) {
            return Err(self.ordering_error(timestamp, "landmark end"));
        }
        let Some(mut landmark) = front.active_landmark.clone() else {
            return Err(StoreError::config(format!(
                "stream {} has no active landmark to end",
                self.id
            )));
        };
        landmark.close(timestamp);
        self.store.put_landmark_window(self.id, &landmark)?;

        #[cfg(feature = "logging")]
        log::debug!(
            "stream {}: landmark {} sealed at {timestamp} with {} values",
            self.id,
            landmark.id,
            landmark.values.len()
        );

        front.active_landmark = None;
        front.last_landmark_end = Some(timestamp);
        Ok(())
    }

    pub(crate) fn query(
        &self,
        t0: i64,
        t1: i64,
        operator_index: usize,
        params: &[f64],
    ) -> Result<QueryResult> {
        if t0 > t1 || t0 < 0 {
            return Err(StoreError::config(format!(
                "invalid query range [{t0}, {t1}]"
            )));
        }
        let Some(operator) = self.operators.get(operator_index) else {
            return Err(StoreError::config(format!(
                "stream {} has {} operators, no operator {operator_index}",
                self.id,
                self.operators.len()
            )));
        };

        let front = self.read_front();
        let (Some(first), Some(last)) = (
            front.stats.time_range_start(),
            front.stats.time_range_end(),
        ) else {
            return Ok(operator.empty_result());
        };
        if t1 < first || t0 > last {
            return Ok(operator.empty_result());
        }
        let (t0, t1) = (t0.max(first), t1.min(last));

        let landmark_windows = self.landmarks_overlapping(&front, t0, t1)?;
        let chain = self.read_chain();
        let summary_windows = chain.windows_overlapping(t0, t1)?;
        drop(chain);

        let ctx = QueryContext {
            stats: &front.stats,
            summary_windows: &summary_windows,
            landmark_windows: &landmark_windows,
            operator_index,
            t0,
            t1,
        };
        operator.query(&ctx, params)
    }

    fn landmarks_overlapping(
        &self,
        front: &StreamState,
        t0: i64,
        t1: i64,
    ) -> Result<Vec<LandmarkWindow>> {
        let mut windows = Vec::new();
        for id in front.landmark_index.candidates(t0, t1) {
            let window = match &front.active_landmark {
                Some(active) if active.id == id => active.clone(),
                _ => self.store.get_landmark_window(self.id, id)?,
            };
            if window.effective_end() >= t0 {
                windows.push(window);
            }
        }
        Ok(windows)
    }

    /// Drains ingest, applies pending merges and persists stream state.
    pub(crate) fn flush(&self) -> Result<()> {
        let mut front = self.write_front()?;
        self.flush_locked(&mut front)
    }

    fn flush_locked(&self, front: &mut StreamState) -> Result<()> {
        if let Some(ingest) = &self.ingest {
            ingest.drain(front.buffer.take());
        }
        let mut chain = self.chain.write().unwrap_or_else(PoisonError::into_inner);
        chain.flush()?;
        if let Some(landmark) = &front.active_landmark {
            self.store.put_landmark_window(self.id, landmark)?;
        }
        let metadata = StreamMetadata {
            stats: front.stats.clone(),
            element_count: chain.element_count(),
            summary_index: chain.index().entries(),
            landmark_index: front.landmark_index.entries(),
        };
        drop(chain);
        self.store.put_metadata(self.id, &metadata)?;

        #[cfg(feature = "logging")]
        log::debug!(
            "stream {}: flushed, {} elements in {} summary windows",
            self.id,
            metadata.element_count,
            metadata.summary_index.len()
        );

        Ok(())
    }

    /// Flushes and rejects every later mutating call.
    pub(crate) fn close(&self) -> Result<()> {
        let mut front = self.front.write().unwrap_or_else(PoisonError::into_inner);
        if front.closed {
            return Ok(());
        }
        front.closed = true;
        self.flush_locked(&mut front)
    }

    pub(crate) fn operator_index(&self, kind: OperatorKind) -> Result<usize> {
        self.operators
            .iter()
            .position(|op| op.kind() == kind)
            .ok_or_else(|| {
                StoreError::config(format!("stream {} has no {kind} operator", self.id))
            })
    }

    pub(crate) fn statistics(&self) -> StreamStatistics {
        self.read_front().stats.clone()
    }

    pub(crate) fn num_summary_windows(&self) -> usize {
        self.read_chain().num_windows()
    }

    pub(crate) fn num_landmark_windows(&self) -> usize {
        self.read_front().landmark_index.len()
    }

    pub(crate) fn log_state(&self) {
        #[cfg(feature = "logging")]
        {
            let front = self.read_front();
            let chain = self.read_chain();
            log::info!(
                "stream {}: {} values over [{:?}, {:?}], {} insert positions, \
                 {} summary windows, {} landmark windows{}",
                self.id,
                front.stats.num_values(),
                front.stats.time_range_start(),
                front.stats.time_range_end(),
                chain.element_count(),
                chain.num_windows(),
                front.landmark_index.len(),
                if front.active_landmark.is_some() {
                    " (landmark active)"
                } else {
                    ""
                }
            );
        }
    }

    pub(crate) fn log_windows(&self) -> Result<()> {
        #[cfg(feature = "logging")]
        {
            let front = self.read_front();
            let windows = self.read_chain().windows()?;
            log::info!("stream {}: {} summary windows", self.id, windows.len());
            for window in &windows {
                log::info!("    {window}");
            }
            for (_, id) in front.landmark_index.entries() {
                let landmark = match &front.active_landmark {
                    Some(active) if active.id == id => active.clone(),
                    _ => self.store.get_landmark_window(self.id, id)?,
                };
                log::info!("    {landmark}");
            }
        }
        Ok(())
    }
}
