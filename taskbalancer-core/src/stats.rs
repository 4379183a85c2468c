//! Dispersion statistics over per-instance task counts

use std::fmt;

use crate::error::StatsError;

/// Mean, sample standard deviation and coefficient of variation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub mean: f64,
    /// Sample standard deviation (divisor n - 1)
    pub standard_deviation: f64,
    /// `100 * standard_deviation / mean`
    pub coefficient_of_variation: f64,
}

impl Stats {
    /// Compute stats over `values`.
    ///
    /// Requires at least two samples and a non-zero mean.
    pub fn compute(values: &[u64]) -> Result<Self, StatsError> {
        let n = values.len();
        if n < 2 {
            return Err(StatsError::TooFewSamples(n));
        }

        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        if mean <= 0.0 {
            return Err(StatsError::ZeroMean);
        }

        let squared: f64 = values
            .iter()
            .map(|&v| {
                let diff = v as f64 - mean;
                diff * diff
            })
            .sum();
        let standard_deviation = (squared / (n - 1) as f64).sqrt();

        Ok(Self {
            mean,
            standard_deviation,
            coefficient_of_variation: standard_deviation / mean * 100.0,
        })
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean={:.2}, sd={:.2}, cov={:.2}%",
            self.mean, self.standard_deviation, self.coefficient_of_variation
        )
    }
}
