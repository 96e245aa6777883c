//! Running statistics over a stream's arrivals and values.

use serde::{Deserialize, Serialize};

/// First/last timestamp, element count, and the first two moments of
/// interarrival times and values.
///
/// Used to clip queries to the stream's extent and to scale confidence
/// intervals. Landmark values are included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStatistics {
    first_timestamp: Option<i64>,
    last_timestamp: Option<i64>,
    num_values: u64,
    interarrival_sum: f64,
    interarrival_sq_sum: f64,
    value_sum: f64,
    value_sq_sum: f64,
}

impl StreamStatistics {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one arrival. Timestamps must be strictly increasing.
    #[allow(clippy::cast_precision_loss)]
    pub fn append(&mut self, timestamp: i64, value: f64) {
        match self.last_timestamp {
            None => self.first_timestamp = Some(timestamp),
            Some(last) => {
                debug_assert!(timestamp > last);
                let interarrival = (timestamp - last) as f64;
                self.interarrival_sum += interarrival;
                self.interarrival_sq_sum += interarrival * interarrival;
            }
        }
        self.value_sum += value;
        self.value_sq_sum += value * value;
        self.num_values += 1;
        self.last_timestamp = Some(timestamp);
    }

    /// Timestamp of the first arrival.
    pub fn time_range_start(&self) -> Option<i64> {
        self.first_timestamp
    }

    /// Timestamp of the latest arrival.
    pub fn time_range_end(&self) -> Option<i64> {
        self.last_timestamp
    }

    /// Number of values appended, landmark values included.
    pub fn num_values(&self) -> u64 {
        self.num_values
    }

    /// Mean time between consecutive arrivals.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_interarrival(&self) -> f64 {
        if self.num_values > 1 {
            self.interarrival_sum / (self.num_values - 1) as f64
        } else {
            0.0
        }
    }

    /// Sample standard deviation of interarrival times.
    #[allow(clippy::cast_precision_loss)]
    pub fn sd_interarrival(&self) -> f64 {
        if self.num_values > 2 {
            let n = (self.num_values - 1) as f64;
            let ss = self.interarrival_sq_sum - self.interarrival_sum * self.interarrival_sum / n;
            (ss.max(0.0) / (n - 1.0)).sqrt()
        } else {
            0.0
        }
    }

    /// Coefficient of variation of interarrival times.
    pub fn cv_interarrival(&self) -> f64 {
        coefficient_of_variation(self.sd_interarrival(), self.mean_interarrival())
    }

    /// Mean value.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_value(&self) -> f64 {
        if self.num_values > 0 {
            self.value_sum / self.num_values as f64
        } else {
            0.0
        }
    }

    /// Sample standard deviation of values.
    #[allow(clippy::cast_precision_loss)]
    pub fn sd_value(&self) -> f64 {
        if self.num_values > 1 {
            let n = self.num_values as f64;
            let ss = self.value_sq_sum - self.value_sum * self.value_sum / n;
            (ss.max(0.0) / (n - 1.0)).sqrt()
        } else {
            0.0
        }
    }

    /// Coefficient of variation of values.
    pub fn cv_value(&self) -> f64 {
        coefficient_of_variation(self.sd_value(), self.mean_value())
    }
}

/// `sd / mean`; zero spread is 0 regardless of mean, any spread around a
/// zero mean is unbounded.
fn coefficient_of_variation(sd: f64, mean: f64) -> f64 {
    if sd == 0.0 {
        0.0
    } else if mean == 0.0 {
        f64::INFINITY
    } else {
        sd / mean
    }
}
