//! Range estimation over partially overlapped windows.
//!
//! Given the summary windows covering `[t0, t1]` (oldest first) and the
//! landmark windows overlapping it, the interior windows lie entirely inside
//! the range and contribute exactly. The two boundary windows are usually cut
//! by the range; their contribution is estimated by assuming their elements
//! are spread uniformly over the window's time span, which gives a binomial
//! mean and variance for each. Landmark values are exact, and the time a
//! landmark occupies inside a boundary window is removed from that window's
//! span before the uniform model is applied.
//!
//! A boundary window's time span runs from its start up to the start of the
//! next window, so gaps between windows are attributed to the older one.

use crate::operator::Estimate;
use crate::window::{LandmarkWindow, SummaryWindow};

/// Length of `[l, r]`.
fn length(l: i64, r: i64) -> i64 {
    r - l + 1
}

/// Overlap between `[a, b]` and `[p, q]`.
fn overlap(a: i64, b: i64, p: i64, q: i64) -> i64 {
    (q.min(b) - a.max(p) + 1).max(0)
}

/// Accumulated mean, variance and hard bounds for one range query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeEstimator {
    mean: f64,
    variance: f64,
    lower_bound: f64,
    upper_bound: f64,
}

impl RangeEstimator {
    /// Builds the estimate for `[t0, t1]`.
    ///
    /// # Arguments
    ///
    /// * `windows` - summary windows covering the range, oldest first
    /// * `window_sum` - the quantity being summed, read from one window
    /// * `landmarks` - landmark windows overlapping the range
    /// * `raw_value` - the quantity being summed, read from one raw value
    pub fn new<F, G>(
        t0: i64,
        t1: i64,
        windows: &[SummaryWindow],
        window_sum: F,
        landmarks: &[LandmarkWindow],
        raw_value: G,
    ) -> Self
    where
        F: Fn(&SummaryWindow) -> f64,
        G: Fn(f64) -> f64,
    {
        let mut estimator = Self {
            mean: 0.0,
            variance: 0.0,
            lower_bound: 0.0,
            upper_bound: 0.0,
        };

        let landmark_sum: f64 = landmarks
            .iter()
            .flat_map(|w| w.values.range(t0..=t1))
            .map(|(_, &v)| raw_value(v))
            .sum();
        estimator.update(landmark_sum, 1, 1);

        let (Some(first), Some(last)) = (windows.first(), windows.last()) else {
            return estimator;
        };
        let n = windows.len();
        let ts = first.t_start;
        let te = last.t_end;
        // 1 + end of the first window's span
        let tm0 = if n > 1 { windows[1].t_start } else { te + 1 };
        // start of the last window's span
        let tm1 = last.t_start;

        let mut left_total = length(ts, tm0 - 1);
        let mut left_hit = overlap(ts, tm0 - 1, t0, t1);
        let mut right_total = if n > 1 { length(tm1, te) } else { 0 };
        let mut right_hit = if n > 1 { overlap(tm1, te, t0, t1) } else { 0 };
        for landmark in landmarks {
            let (ls, le) = (landmark.t_start, landmark.effective_end());
            left_total -= overlap(ls, le, ts, tm0 - 1);
            left_hit -= overlap(ls, le, t0.max(ts), t1.min(tm0 - 1));
            if n > 1 {
                right_total -= overlap(ls, le, tm1, te);
                right_hit -= overlap(ls, le, t0.max(tm1), t1.min(te));
            }
        }

        estimator.update(window_sum(first), left_hit, left_total);
        if n > 1 {
            estimator.update(window_sum(last), right_hit, right_total);
        }
        if n > 2 {
            let middle: f64 = windows[1..n - 1].iter().map(&window_sum).sum();
            estimator.update(middle, 1, 1);
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "[t0, t1] = [{t0}, {t1}], {n} windows, left {left_hit}/{left_total}, \
             right {right_hit}/{right_total}, landmark sum {landmark_sum}"
        );

        estimator
    }

    /// Adds `sum`, of which `hit` out of `total` time units fall in range.
    ///
    /// A partly covered sum may contribute anything between nothing and all
    /// of it, whatever its sign.
    #[allow(clippy::cast_precision_loss)]
    fn update(&mut self, sum: f64, hit: i64, total: i64) {
        if hit == total {
            self.lower_bound += sum;
            self.upper_bound += sum;
        } else {
            self.lower_bound += sum.min(0.0);
            self.upper_bound += sum.max(0.0);
        }
        if total > 0 {
            let ratio = hit as f64 / total as f64;
            self.mean += sum * ratio;
            self.variance += sum.abs() * ratio * (1.0 - ratio);
        }
    }

    /// Point estimate.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Variance under the uniform-occupancy model, before scaling.
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Smallest value consistent with the data.
    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    /// Largest value consistent with the data.
    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    /// Point estimate plus a confidence interval at `confidence_level`.
    ///
    /// The interval is `mean ± z * sd_multiplier * sqrt(variance)` clamped to
    /// the hard bounds, where `z` is the normal quantile of
    /// `(1 + confidence_level) / 2`. A level of 1, or a non-finite spread,
    /// returns the hard bounds.
    pub fn estimate(&self, sd_multiplier: f64, confidence_level: f64) -> Estimate {
        let z = normal_quantile((1.0 + confidence_level) / 2.0);
        let sd = sd_multiplier * self.variance.sqrt();
        let (ci_low, ci_high) = if z.is_infinite() || !sd.is_finite() {
            (self.lower_bound, self.upper_bound)
        } else {
            (
                (self.mean - z * sd).max(self.lower_bound),
                (self.mean + z * sd).min(self.upper_bound),
            )
        };
        Estimate {
            value: self.mean,
            ci_low,
            ci_high,
        }
    }
}

/// Inverse of the standard normal CDF.
///
/// Acklam's rational approximation, relative error below `1.2e-9`. Returns
/// infinities at 0 and 1 and NaN outside `[0, 1]`.
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Aggregate;

    fn window(id: u64, t_start: i64, t_end: i64, count: u64) -> SummaryWindow {
        SummaryWindow {
            id,
            t_start,
            t_end,
            c_start: 0,
            c_end: count.max(1) - 1,
            prev: None,
            next: None,
            aggregates: vec![Aggregate::Count(count)],
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn count_of(w: &SummaryWindow) -> f64 {
        match w.aggregates[0] {
            Aggregate::Count(n) => n as f64,
            _ => 0.0,
        }
    }

    #[test]
    fn test_normal_quantile() {
        assert!((normal_quantile(0.975) - 1.959_963_984_540_054).abs() < 1e-8);
        assert!(normal_quantile(0.5).abs() < 1e-12);
        assert!((normal_quantile(0.01) + 2.326_347_874_040_841).abs() < 1e-8);
        assert!((normal_quantile(0.999) - 3.090_232_306_167_813).abs() < 1e-8);
        assert_eq!(normal_quantile(1.0), f64::INFINITY);
        assert_eq!(normal_quantile(0.0), f64::NEG_INFINITY);
        assert!(normal_quantile(1.5).is_nan());
    }

    #[test]
    fn test_full_overlap_is_exact() {
        let windows = [window(0, 0, 31, 32), window(1, 32, 47, 16), window(2, 48, 49, 2)];
        let est = RangeEstimator::new(0, 49, &windows, count_of, &[], |_| 1.0);
        assert_eq!(est.mean(), 50.0);
        assert_eq!(est.variance(), 0.0);
        assert_eq!(est.lower_bound(), 50.0);
        assert_eq!(est.upper_bound(), 50.0);
    }

    #[test]
    fn test_partial_boundary_windows() {
        // windows [0,9] x10, [10,19] x10, [20,29] x10; query [5, 24]
        let windows = [window(0, 0, 9, 10), window(1, 10, 19, 10), window(2, 20, 29, 10)];
        let est = RangeEstimator::new(5, 24, &windows, count_of, &[], |_| 1.0);
        assert!((est.mean() - 20.0).abs() < 1e-12);
        assert!((est.variance() - 5.0).abs() < 1e-12);
        assert_eq!(est.lower_bound(), 10.0);
        assert_eq!(est.upper_bound(), 30.0);

        let full = est.estimate(1.0, 1.0);
        assert_eq!((full.ci_low, full.ci_high), (10.0, 30.0));

        let ci = est.estimate(1.0, 0.95);
        let half = 1.959_963_984_540_054 * 5.0f64.sqrt();
        assert!((ci.ci_low - (20.0 - half)).abs() < 1e-6);
        assert!((ci.ci_high - (20.0 + half)).abs() < 1e-6);
    }

    #[test]
    fn test_negative_sums_keep_bounds_ordered() {
        // the same layout as above with every value -1
        let windows = [window(0, 0, 9, 10), window(1, 10, 19, 10), window(2, 20, 29, 10)];
        let est = RangeEstimator::new(5, 24, &windows, |w| -count_of(w), &[], |v| v);
        assert!((est.mean() + 20.0).abs() < 1e-12);
        assert!((est.variance() - 5.0).abs() < 1e-12);
        assert_eq!(est.lower_bound(), -30.0);
        assert_eq!(est.upper_bound(), -10.0);

        for confidence in [0.5, 0.9, 0.95, 1.0] {
            let ci = est.estimate(1.0, confidence);
            assert!(est.lower_bound() <= ci.ci_low, "c={confidence} {ci:?}");
            assert!(ci.ci_low <= ci.value, "c={confidence} {ci:?}");
            assert!(ci.value <= ci.ci_high, "c={confidence} {ci:?}");
            assert!(ci.ci_high <= est.upper_bound(), "c={confidence} {ci:?}");
        }
    }

    #[test]
    fn test_single_window() {
        let windows = [window(0, 0, 9, 10)];
        let est = RangeEstimator::new(0, 4, &windows, count_of, &[], |_| 1.0);
        assert!((est.mean() - 5.0).abs() < 1e-12);
        assert_eq!(est.lower_bound(), 0.0);
        assert_eq!(est.upper_bound(), 10.0);
    }

    #[test]
    fn test_landmark_time_excluded_from_boundary_span() {
        // window [0, 19] holds 10 decayed values, landmark [10, 19] holds the rest
        let windows = [window(0, 0, 19, 20)];
        let windows = [SummaryWindow {
            aggregates: vec![Aggregate::Count(10)],
            ..windows[0].clone()
        }];
        let mut landmark = LandmarkWindow::new(0, 10);
        for t in 10..20 {
            landmark.append(t, 1.0);
        }
        landmark.close(19);
        let est = RangeEstimator::new(10, 19, &windows, count_of, &[landmark], |_| 1.0);
        assert_eq!(est.mean(), 10.0);
        assert_eq!(est.variance(), 0.0);
    }

    #[test]
    fn test_landmarks_only() {
        let mut landmark = LandmarkWindow::new(0, 5);
        landmark.append(5, 2.0);
        landmark.append(6, 3.0);
        let est = RangeEstimator::new(0, 10, &[], |_| 0.0, &[landmark], |v| v);
        let e = est.estimate(1.0, 0.9);
        assert_eq!((e.value, e.ci_low, e.ci_high), (5.0, 5.0, 5.0));
    }

    #[test]
    fn test_non_finite_spread_returns_bounds() {
        let windows = [window(0, 0, 9, 10), window(1, 10, 19, 10)];
        let est = RangeEstimator::new(5, 14, &windows, count_of, &[], |_| 1.0);
        let e = est.estimate(f64::NAN, 0.95);
        assert_eq!((e.ci_low, e.ci_high), (est.lower_bound(), est.upper_bound()));
    }
}
