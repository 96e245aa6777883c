use crate::error::Result;
use crate::estimator::RangeEstimator;
use crate::window::SummaryWindow;

use super::{Aggregate, Estimate, OperatorKind, QueryContext, QueryResult, WindowOperator};

/// Sum of values in a time range.
///
/// Query parameters: optionally one confidence level in `(0, 1]`. The
/// interval is scaled by `sqrt((cv_t^2 + cv_v^2) * |mean_value|)`, combining
/// the variability of arrivals and of values.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumOperator;

impl SumOperator {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }
}

fn sum_of(ctx: &QueryContext<'_>, window: &SummaryWindow) -> f64 {
    match ctx.aggregate(window) {
        Some(Aggregate::Sum(s)) => *s,
        _ => 0.0,
    }
}

impl WindowOperator for SumOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Sum
    }

    fn create_empty(&self) -> Aggregate {
        Aggregate::Sum(0.0)
    }

    fn merge(&self, aggregates: &[&Aggregate]) -> Aggregate {
        let total = aggregates
            .iter()
            .map(|a| match a {
                Aggregate::Sum(s) => *s,
                _ => 0.0,
            })
            .sum();
        Aggregate::Sum(total)
    }

    fn insert(&self, aggregate: Aggregate, _timestamp: i64, value: f64) -> Aggregate {
        match aggregate {
            Aggregate::Sum(s) => Aggregate::Sum(s + value),
            _ => Aggregate::Sum(value),
        }
    }

    fn query(&self, ctx: &QueryContext<'_>, params: &[f64]) -> Result<QueryResult> {
        let confidence = super::confidence_level(self.kind(), params)?;
        let estimator = RangeEstimator::new(
            ctx.t0,
            ctx.t1,
            ctx.summary_windows,
            |w| sum_of(ctx, w),
            ctx.landmark_windows,
            |v| v,
        );
        let cv_t = ctx.stats.cv_interarrival();
        let cv_v = ctx.stats.cv_value();
        let sd_multiplier = ((cv_t * cv_t + cv_v * cv_v) * ctx.stats.mean_value().abs()).sqrt();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StreamStatistics;
    use crate::window::LandmarkWindow;

    #[test]
    fn test_insert_and_merge() {
        let op = SumOperator::new();
        let agg = op.insert(op.insert(op.create_empty(), 0, 1.5), 1, 2.5);
        assert_eq!(agg, Aggregate::Sum(4.0));
        assert_eq!(op.merge(&[&agg, &Aggregate::Sum(-1.0)]), Aggregate::Sum(3.0));
    }

    #[test]
    fn test_query_adds_landmark_values_exactly() {
        let op = SumOperator::new();
        let mut stats = StreamStatistics::new();
        for t in 0..10 {
            stats.append(t, 2.0);
        }
        let windows = [SummaryWindow {
            id: 0,
            t_start: 0,
            t_end: 4,
            c_start: 0,
            c_end: 9,
            prev: None,
            next: None,
            aggregates: vec![Aggregate::Sum(10.0)],
        }];
        let mut landmark = LandmarkWindow::new(0, 5);
        for t in 5..10 {
            landmark.append(t, 2.0);
        }
        landmark.close(9);
        let ctx = QueryContext {
            stats: &stats,
            summary_windows: &windows,
            landmark_windows: std::slice::from_ref(&landmark),
            operator_index: 0,
            t0: 0,
            t1: 9,
        };
        let estimate = *op.query(&ctx, &[]).unwrap().as_estimate().unwrap();
        assert_eq!(estimate.value, 20.0);
        assert_eq!((estimate.ci_low, estimate.ci_high), (20.0, 20.0));
    }
}
