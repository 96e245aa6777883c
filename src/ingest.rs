//! Buffered ingest.
//!
//! ```text
//! append() ─▶ active IngestBuffer ──(full)──▶ per-stream flush queue
//!                   ▲                                │
//!                   │                                ▼
//!              BufferPool ◀──(applied)──── FlushPool worker
//!             (two slots)                  (WindowChain write lock)
//! ```
//!
//! Each buffered stream owns exactly two buffers. One is active and
//! accepts appends; a full one is queued for a flush job on the shared
//! [`FlushPool`]. A stream never has more than one flush job in flight, so
//! buffers are applied in arrival order, and a buffer only returns to the
//! pool once all of its elements are in the window chain, which accepts
//! them without touching the store. An append that finds both buffers busy
//! blocks until one comes back.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crate::chain::{Element, WindowChain};
use crate::error::{Result, StoreError};
use crate::window::StreamId;

/// Number of buffers cycling per stream.
const BUFFER_SLOTS: usize = 2;

/// Staging area for appended elements.
#[derive(Debug)]
pub(crate) struct IngestBuffer {
    elements: Vec<Element>,
    capacity: usize,
}

impl IngestBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            elements: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, timestamp: i64, value: Option<f64>) {
        debug_assert!(!self.is_full());
        self.elements.push((timestamp, value));
    }

    pub(crate) fn is_full(&self) -> bool {
        self.elements.len() >= self.capacity
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn elements(&self) -> &[Element] {
        &self.elements
    }

    fn clear(&mut self) {
        self.elements.clear();
    }
}

/// Fixed set of empty buffers; [`acquire`](Self::acquire) blocks while none
/// is free.
#[derive(Debug)]
pub(crate) struct BufferPool {
    free: Mutex<Vec<IngestBuffer>>,
    returned: Condvar,
}

impl BufferPool {
    pub(crate) fn new(capacity: usize, slots: usize) -> Self {
        Self {
            free: Mutex::new((0..slots).map(|_| IngestBuffer::new(capacity)).collect()),
            returned: Condvar::new(),
        }
    }

    pub(crate) fn acquire(&self) -> IngestBuffer {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(buffer) = free.pop() {
                return buffer;
            }
            free = self
                .returned
                .wait(free)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn release(&self, mut buffer: IngestBuffer) {
        buffer.clear();
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buffer);
        self.returned.notify_one();
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolShared {
    jobs: Mutex<VecDeque<Job>>,
    signal: Condvar,
    shutdown: AtomicBool,
}

/// Worker threads shared by every stream of a store.
///
/// Jobs queued before [`shutdown`](Self::shutdown) still run; workers exit
/// once the queue is empty.
pub(crate) struct FlushPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl FlushPool {
    /// Starts `workers` threads.
    pub(crate) fn new(workers: usize) -> Result<Self> {
        let shared = Arc::new(PoolShared {
            jobs: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let thread_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("decaystore-flush-{i}"))
                .spawn(move || Self::worker_loop(&thread_shared))
                .map_err(StoreError::Io)?;
            handles.push(handle);
        }
        Ok(Self {
            shared,
            workers: Mutex::new(handles),
        })
    }

    fn worker_loop(shared: &PoolShared) {
        loop {
            let job = {
                let mut jobs = shared.jobs.lock().unwrap_or_else(PoisonError::into_inner);
                loop {
                    if let Some(job) = jobs.pop_front() {
                        break Some(job);
                    }
                    if shared.shutdown.load(Ordering::Acquire) {
                        break None;
                    }
                    jobs = shared
                        .signal
                        .wait(jobs)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };
            match job {
                Some(job) => job(),
                None => return,
            }
        }
    }

    /// Queues a job. Fails with [`StoreError::Closed`] after shutdown.
    pub(crate) fn execute(&self, job: Job) -> Result<()> {
        let mut jobs = self
            .shared
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        jobs.push_back(job);
        drop(jobs);
        self.shared.signal.notify_one();
        Ok(())
    }

    /// Stops accepting jobs, lets queued ones finish and joins the workers.
    pub(crate) fn shutdown(&self) {
        {
            let _jobs = self
                .shared
                .jobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.shared.shutdown.store(true, Ordering::Release);
        }
        self.shared.signal.notify_all();

        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            // a panicking job already reported itself; nothing to recover here
            let _ = handle.join();
        }
    }
}

impl Drop for FlushPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Default)]
struct FlushState {
    queued: VecDeque<IngestBuffer>,
    running: bool,
}

/// Buffered ingest state of one stream.
pub(crate) struct Ingest {
    #[cfg_attr(not(feature = "logging"), allow(dead_code))]
    stream: StreamId,
    chain: Arc<RwLock<WindowChain>>,
    buffers: BufferPool,
    capacity: usize,
    /// Window sizes a full buffer is laid out as, when batch partitioning.
    partition: Option<Vec<u64>>,
    state: Mutex<FlushState>,
    idle: Condvar,
}

impl Ingest {
    /// Sets up buffering for a stream.
    ///
    /// # Arguments
    ///
    /// * `lengths` - window sizes covering one buffer, newest first; their
    ///   sum is the buffer capacity
    /// * `partition` - lay full buffers out as `lengths` instead of
    ///   appending their elements one at a time
    ///
    /// # Returns
    ///
    /// `None` when `lengths` covers no elements, meaning the stream stays
    /// unbuffered.
    pub(crate) fn new(
        stream: StreamId,
        chain: Arc<RwLock<WindowChain>>,
        lengths: Vec<u64>,
        partition: bool,
    ) -> Option<Self> {
        let capacity = usize::try_from(lengths.iter().sum::<u64>()).ok()?;
        if capacity == 0 {
            return None;
        }

        #[cfg(feature = "logging")]
        log::info!(
            "stream {stream}: {BUFFER_SLOTS} ingest buffers each covering {} windows and {capacity} values",
            lengths.len()
        );

        Some(Self {
            stream,
            chain,
            buffers: BufferPool::new(capacity, BUFFER_SLOTS),
            capacity,
            partition: partition.then_some(lengths),
            state: Mutex::new(FlushState::default()),
            idle: Condvar::new(),
        })
    }

    #[cfg_attr(not(feature = "logging"), allow(dead_code))]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes an empty buffer, blocking while both are in flight.
    pub(crate) fn acquire(&self) -> IngestBuffer {
        self.buffers.acquire()
    }

    /// Queues a full buffer and makes sure a flush job is running for it.
    pub(crate) fn submit(self: &Arc<Self>, buffer: IngestBuffer, pool: &FlushPool) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.queued.push_back(buffer);
            if state.running {
                return;
            }
            state.running = true;
        }
        let this = Arc::clone(self);
        if pool.execute(Box::new(move || this.run_queued())).is_err() {
            self.run_queued();
        }
    }

    /// Applies queued buffers until the queue is empty.
    fn run_queued(&self) {
        loop {
            let buffer = {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                match state.queued.pop_front() {
                    Some(buffer) => buffer,
                    None => {
                        state.running = false;
                        self.idle.notify_all();
                        return;
                    }
                }
            };
            {
                let mut chain = self.chain.write().unwrap_or_else(PoisonError::into_inner);
                match &self.partition {
                    Some(lengths) => chain.append_partitioned(buffer.elements(), lengths),
                    None => append_each(&mut chain, buffer.elements()),
                }
            }
            self.buffers.release(buffer);
        }
    }

    /// Waits for queued buffers, then applies `active` one element at a time.
    pub(crate) fn drain(&self, active: Option<IngestBuffer>) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            while state.running || !state.queued.is_empty() {
                state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
        }
        if let Some(buffer) = active {
            append_each(
                &mut self.chain.write().unwrap_or_else(PoisonError::into_inner),
                buffer.elements(),
            );
            self.buffers.release(buffer);
        }

        #[cfg(feature = "logging")]
        log::debug!("stream {}: ingest buffers drained", self.stream);
    }
}

fn append_each(chain: &mut WindowChain, elements: &[Element]) {
    for &(timestamp, value) in elements {
        chain.append(timestamp, value);
    }
}
