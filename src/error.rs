//! Error types returned by the store and its persistence collaborator.

use std::fmt;
use std::io;

use crate::window::{LandmarkId, StreamId, WindowId};

/// Convenience alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Failures surfaced by a [`BackingStore`](crate::storage::BackingStore).
#[derive(Debug)]
pub enum BackingStoreError {
    /// The requested summary window does not exist.
    SummaryWindowNotFound {
        /// Stream the lookup was made against.
        stream: StreamId,
        /// Missing window.
        id: WindowId,
    },
    /// The requested landmark window does not exist.
    LandmarkWindowNotFound {
        /// Stream the lookup was made against.
        stream: StreamId,
        /// Missing landmark.
        id: LandmarkId,
    },
    /// The store has already been closed.
    Closed,
    /// An I/O error reported by the underlying medium.
    Io(io::Error),
}

impl fmt::Display for BackingStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackingStoreError::SummaryWindowNotFound { stream, id } => {
                write!(f, "summary window {id} not found in stream {stream}")
            }
            BackingStoreError::LandmarkWindowNotFound { stream, id } => {
                write!(f, "landmark window {id} not found in stream {stream}")
            }
            BackingStoreError::Closed => write!(f, "backing store is closed"),
            BackingStoreError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for BackingStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackingStoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BackingStoreError {
    fn from(err: io::Error) -> Self {
        BackingStoreError::Io(err)
    }
}

/// Errors returned by [`SummaryStore`](crate::SummaryStore) operations.
#[derive(Debug)]
pub enum StoreError {
    /// An append or landmark transition carried a timestamp that does not
    /// strictly follow the stream's history. Nothing was modified.
    Ordering {
        /// Stream the call was made against.
        stream: StreamId,
        /// Rejected timestamp.
        timestamp: i64,
        /// Which operation rejected it.
        operation: &'static str,
    },
    /// Invalid decay parameters, stream options, operator index or query
    /// parameters.
    Configuration(String),
    /// Failure reported by the persistence collaborator, passed through
    /// unchanged.
    BackingStore(BackingStoreError),
    /// No stream is registered under this id.
    StreamNotFound(StreamId),
    /// A stream is already registered under this id.
    StreamExists(StreamId),
    /// The store has been closed.
    Closed,
    /// A flush worker thread could not be started.
    Io(io::Error),
}

impl StoreError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        StoreError::Configuration(msg.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Ordering {
                stream,
                timestamp,
                operation,
            } => write!(
                f,
                "out-of-order {operation} in stream {stream}: timestamp {timestamp}"
            ),
            StoreError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            StoreError::BackingStore(e) => write!(f, "backing store error: {e}"),
            StoreError::StreamNotFound(id) => write!(f, "stream {id} not found"),
            StoreError::StreamExists(id) => write!(f, "stream {id} is already registered"),
            StoreError::Closed => write!(f, "store is closed"),
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::BackingStore(e) => Some(e),
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackingStoreError> for StoreError {
    fn from(err: BackingStoreError) -> Self {
        StoreError::BackingStore(err)
    }
}
