// Duration statistics for performance comparison
//
// Mean and population standard deviation (divide by n), computed in f64 so a
// one-microsecond slowdown over a constant baseline is still visible.

use super::result::PerformanceResult;

/// Mean and population standard deviation of a sample set, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub samples: usize,
}

/// Summarize duration samples; an empty set summarizes to zeros.
pub fn summarize(durations: &[f64]) -> DurationSummary {
    if durations.is_empty() {
        return DurationSummary {
            mean: 0.0,
            std_dev: 0.0,
            samples: 0,
        };
    }

    let n = durations.len() as f64;
    let mean = durations.iter().sum::<f64>() / n;
    let variance = durations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

    DurationSummary {
        mean,
        std_dev: variance.sqrt(),
        samples: durations.len(),
    }
}

/// Apply the mean / std-dev / threshold rule to baseline and candidate samples.
///
/// `isOverStdDev`: the mean slowdown exceeds one baseline std dev.
/// `isOverThreshold`: the relative slowdown exceeds `threshold`; with a zero
/// baseline mean, any slowdown counts.
pub fn check_durations(baseline: &[f64], candidate: &[f64], threshold: f64) -> PerformanceResult {
    let without = summarize(baseline);
    let with = summarize(candidate);
    let slowdown = with.mean - without.mean;

    let is_over_threshold = if without.mean == 0.0 {
        slowdown > 0.0
    } else {
        slowdown / without.mean > threshold
    };

    PerformanceResult {
        duration_ave: without.mean,
        duration_std_dev: without.std_dev,
        duration_threshold: threshold,
        duration_with_script: with.mean,
        is_over_std_dev: slowdown > without.std_dev,
        is_over_threshold,
    }
}
