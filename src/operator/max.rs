use crate::error::{Result, StoreError};

use super::{Aggregate, OperatorKind, QueryContext, QueryResult, WindowOperator};

/// Largest value in a time range.
///
/// Boundary windows that are only partly inside the range are included
/// whole, so the answer can exceed the true maximum of the range. Landmark
/// values are filtered by timestamp and are exact. Takes no parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxOperator;

impl MaxOperator {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }
}

fn max_of(aggregate: Option<&Aggregate>) -> f64 {
    match aggregate {
        Some(Aggregate::Max(m)) => *m,
        _ => f64::NEG_INFINITY,
    }
}

impl WindowOperator for MaxOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Max
    }

    fn create_empty(&self) -> Aggregate {
        Aggregate::Max(f64::NEG_INFINITY)
    }

    fn merge(&self, aggregates: &[&Aggregate]) -> Aggregate {
        let max = aggregates
            .iter()
            .map(|a| max_of(Some(*a)))
            .fold(f64::NEG_INFINITY, f64::max);
        Aggregate::Max(max)
    }

    fn insert(&self, aggregate: Aggregate, _timestamp: i64, value: f64) -> Aggregate {
        Aggregate::Max(max_of(Some(&aggregate)).max(value))
    }

    fn query(&self, ctx: &QueryContext<'_>, params: &[f64]) -> Result<QueryResult> {
        if !params.is_empty() {
            return Err(StoreError::config(format!(
                "{} takes no parameters, got {}",
                self.kind(),
                params.len()
            )));
        }
        let summary_max = ctx
            .summary_windows
            .iter()
            .map(|w| max_of(ctx.aggregate(w)))
            .fold(f64::NEG_INFINITY, f64::max);
        let landmark_max = ctx
            .landmark_windows
            .iter()
            .flat_map(|w| w.values.range(ctx.t0..=ctx.t1))
            .map(|(_, &v)| v)
            .fold(f64::NEG_INFINITY, f64::max);
        let max = summary_max.max(landmark_max);
        Ok(QueryResult::Max {
            value: (max > f64::NEG_INFINITY).then_some(max),
            summaries_empty: summary_max == f64::NEG_INFINITY,
        })
    }

    fn empty_result(&self) -> QueryResult {
        QueryResult::Max {
            value: None,
            summaries_empty: true,
        }
    }
}
