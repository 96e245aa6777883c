//! Pluggable per-window aggregates.
//!
//! Every summary window carries one [`Aggregate`] per operator registered on
//! its stream. An operator knows how to build an aggregate from raw values,
//! how to union aggregates when the scheduler merges windows, and how to
//! answer a range query from the aggregates of the windows overlapping it
//! plus the exact values held in landmark windows.
//!
//! Count and Sum share the [`RangeEstimator`](crate::estimator::RangeEstimator)
//! and differ only in what they read from each window and how they scale the
//! confidence interval. Operators outside this crate (sketches and the like)
//! keep their state in [`Aggregate::Opaque`].

mod count;
mod max;
mod sum;

pub use count::CountOperator;
pub use max::MaxOperator;
pub use sum::SumOperator;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::stats::StreamStatistics;
use crate::window::{LandmarkWindow, SummaryWindow};

/// Per-window summary produced by a [`WindowOperator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    /// Number of values.
    Count(u64),
    /// Sum of values.
    Sum(f64),
    /// Largest value; negative infinity when empty.
    Max(f64),
    /// Encoded state of an operator defined outside this crate.
    Opaque(Vec<u8>),
}

/// Kind tag used to look operators up by type on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    /// [`CountOperator`].
    Count,
    /// [`SumOperator`].
    Sum,
    /// [`MaxOperator`].
    Max,
    /// Operator defined outside this crate.
    Custom(u32),
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorKind::Count => write!(f, "count"),
            OperatorKind::Sum => write!(f, "sum"),
            OperatorKind::Max => write!(f, "max"),
            OperatorKind::Custom(tag) => write!(f, "custom({tag})"),
        }
    }
}

/// Approximate answer with a confidence interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Point estimate.
    pub value: f64,
    /// Lower end of the confidence interval.
    pub ci_low: f64,
    /// Upper end of the confidence interval.
    pub ci_high: f64,
}

/// Answer returned by [`WindowOperator::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Count/Sum style answer.
    Estimate(Estimate),
    /// Max answer.
    Max {
        /// Largest value in range, `None` when nothing was found.
        value: Option<f64>,
        /// Set when no summary window contributed, so the answer comes only
        /// from landmark values (or is missing).
        summaries_empty: bool,
    },
    /// Answer of an operator defined outside this crate.
    Opaque(Vec<u8>),
}

impl QueryResult {
    /// The estimate, if this is an [`QueryResult::Estimate`].
    pub fn as_estimate(&self) -> Option<&Estimate> {
        match self {
            QueryResult::Estimate(estimate) => Some(estimate),
            _ => None,
        }
    }
}

/// Everything an operator sees when answering a range query.
///
/// `t0` and `t1` are already clipped to the stream's extent. Summary windows
/// are ordered oldest first and together cover `[t0, t1]`; landmark windows
/// are those overlapping it.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    /// Stream statistics at query time.
    pub stats: &'a StreamStatistics,
    /// Overlapping summary windows, oldest first.
    pub summary_windows: &'a [SummaryWindow],
    /// Overlapping landmark windows, oldest first.
    pub landmark_windows: &'a [LandmarkWindow],
    /// Index of the queried operator's aggregate within each window.
    pub operator_index: usize,
    /// Range start, inclusive.
    pub t0: i64,
    /// Range end, inclusive.
    pub t1: i64,
}

impl<'a> QueryContext<'a> {
    /// This operator's aggregate in `window`.
    pub fn aggregate(&self, window: &'a SummaryWindow) -> Option<&'a Aggregate> {
        window.aggregates.get(self.operator_index)
    }
}

/// Contract every aggregate operator satisfies.
///
/// `merge` must be associative and commutative: it is used both for
/// scheduled window merges and for combining windows at query time.
pub trait WindowOperator: Send + Sync + fmt::Debug {
    /// Type tag for [`SummaryStore::operator_index`](crate::SummaryStore::operator_index).
    fn kind(&self) -> OperatorKind;

    /// Aggregate over zero elements.
    fn create_empty(&self) -> Aggregate;

    /// Union of `aggregates`.
    fn merge(&self, aggregates: &[&Aggregate]) -> Aggregate;

    /// Folds one value into `aggregate`.
    fn insert(&self, aggregate: Aggregate, timestamp: i64, value: f64) -> Aggregate;

    /// Answers a query over the clipped range described by `ctx`.
    fn query(&self, ctx: &QueryContext<'_>, params: &[f64]) -> Result<QueryResult>;

    /// Answer for a range holding no data.
    fn empty_result(&self) -> QueryResult;
}

/// Reads the optional confidence level parameter shared by Count and Sum.
///
/// Defaults to 1, which yields the hard lower/upper bounds.
pub(crate) fn confidence_level(kind: OperatorKind, params: &[f64]) -> Result<f64> {
    match params {
        [] => Ok(1.0),
        [c] if *c > 0.0 && *c <= 1.0 => Ok(*c),
        [c] => Err(StoreError::config(format!(
            "{kind} confidence level must be in (0, 1], got {c}"
        ))),
        _ => Err(StoreError::config(format!(
            "{kind} takes at most one parameter (confidence level), got {}",
            params.len()
        ))),
    }
}
