//! # decaystore
//!
//! An in-process store that keeps high-rate timestamped streams in bounded
//! space by summarizing older data at progressively coarser granularity.
//!
//! Each stream's history is split into contiguous summary windows. Recent
//! windows are small; as data ages, adjacent windows are merged following a
//! configurable decay shape, so storage grows roughly logarithmically
//! (exponential decay) or polynomially (rational power decay) in the number of
//! values ingested. Landmark windows mark spans whose values are kept exactly.
//!
//! Range queries return point estimates with confidence intervals, derived
//! from the overlapping windows' aggregates and a statistical model of how
//! values are distributed inside a partially covered window.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use decaystore::{CountOperator, Decay, StreamConfig, SumOperator, SummaryStore, WindowOperator};
//!
//! # fn main() -> Result<(), decaystore::StoreError> {
//! let store = SummaryStore::new()?;
//! let operators: Vec<Arc<dyn WindowOperator>> =
//!     vec![Arc::new(CountOperator::new()), Arc::new(SumOperator::new())];
//! store.register_with_config(
//!     7,
//!     Decay::exponential(2.0).build()?,
//!     operators,
//!     &StreamConfig::new().ingest_buffer_size(64),
//! )?;
//!
//! for t in 0..1_000 {
//!     store.append(7, t, (t % 10) as f64)?;
//! }
//! store.flush(7)?;
//!
//! let sum = store.query(7, 900, 999, 1, &[0.95])?;
//! if let Some(estimate) = sum.as_estimate() {
//!     println!("sum ~ {} in [{}, {}]", estimate.value, estimate.ci_low, estimate.ci_high);
//! }
//! # store.close()
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SummaryStore ── registry ──> Stream ── front lock ──> statistics, landmarks, ingest buffer
//!                                  │
//!                                  └── chain lock ──> WindowChain ── MergeScheduler
//!                                                          │
//!                                                          └──> BackingStore
//! ```
//!
//! Persistence is pluggable through [`BackingStore`]; the bundled
//! [`MemoryBackingStore`] keeps everything in process memory.

#![deny(missing_docs)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::similar_names
)]

pub mod chain;
pub mod config;
pub mod error;
pub mod estimator;
pub mod operator;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod store;
pub mod window;
pub mod windowing;

mod ingest;
mod stream;

pub use config::{StoreConfig, StreamConfig, SummaryStoreBuilder};
pub use error::{BackingStoreError, Result, StoreError};
pub use estimator::RangeEstimator;
pub use operator::{
    Aggregate, CountOperator, Estimate, MaxOperator, OperatorKind, QueryContext, QueryResult,
    SumOperator, WindowOperator,
};
pub use scheduler::SchedulerKind;
pub use stats::StreamStatistics;
pub use storage::{BackingStore, MemoryBackingStore, StreamMetadata};
pub use store::SummaryStore;
pub use window::{LandmarkId, LandmarkWindow, StreamId, SummaryWindow, WindowId};
pub use windowing::{Decay, Windowing};
