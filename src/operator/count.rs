use crate::error::Result;
use crate::estimator::RangeEstimator;
use crate::window::SummaryWindow;

use super::{Aggregate, Estimate, OperatorKind, QueryContext, QueryResult, WindowOperator};

/// Number of elements in a time range.
///
/// Query parameters: optionally one confidence level in `(0, 1]`. The
/// interval width is scaled by the coefficient of variation of the stream's
/// interarrival times, so a perfectly periodic stream gets a point answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountOperator;

impl CountOperator {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }
}

#[allow(clippy::cast_precision_loss)]
fn count_of(ctx: &QueryContext<'_>, window: &SummaryWindow) -> f64 {
    match ctx.aggregate(window) {
        Some(Aggregate::Count(n)) => *n as f64,
        _ => 0.0,
    }
}

impl WindowOperator for CountOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Count
    }

    fn create_empty(&self) -> Aggregate {
        Aggregate::Count(0)
    }

    fn merge(&self, aggregates: &[&Aggregate]) -> Aggregate {
        let total = aggregates
            .iter()
            .map(|a| match a {
                Aggregate::Count(n) => *n,
                _ => 0,
            })
            .sum();
        Aggregate::Count(total)
    }

    fn insert(&self, aggregate: Aggregate, _timestamp: i64, _value: f64) -> Aggregate {
        match aggregate {
            Aggregate::Count(n) => Aggregate::Count(n + 1),
            _ => Aggregate::Count(1),
        }
    }

    fn query(&self, ctx: &QueryContext<'_>, params: &[f64]) -> Result<QueryResult> {
        let confidence = super::confidence_level(self.kind(), params)?;
        let estimator = RangeEstimator::new(
            ctx.t0,
            ctx.t1,
            ctx.summary_windows,
            |w| count_of(ctx, w),
            ctx.landmark_windows,
            |_| 1.0,
        );
        let sd_multiplier = ctx.stats.cv_interarrival();
        Ok(QueryResult::Estimate(
            estimator.estimate(sd_multiplier, confidence),
        ))
    }

    fn empty_result(&self) -> QueryResult {
        QueryResult::Estimate(Estimate {
            value: 0.0,
            ci_low: 0.0,
            ci_high: 0.0,
        })
    }
}
