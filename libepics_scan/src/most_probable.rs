//! Robust "most probable value" of a scaler rate.
//!
//! Rates are histogrammed in log10 space, each reading weighted by how long it stayed in
//! force, and the value is taken as the mean of the histogram restricted to a window around
//! its peak. Short glitches carry little time and fall outside the window, so they do not pull
//! the result the way they would pull a plain average.
use serde::{Deserialize, Serialize};

use super::sample::SampleSeries;

/// Tuning of the log-rate histogram and the peak window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostProbableParams {
    pub n_bins: usize,
    pub log_min: f64,
    pub log_max: f64,
    /// Added to every rate before taking the log, so a zero rate lands in the underflow
    pub epsilon: f64,
    /// Lower edge of the peak window as a fraction of the peak bin number
    pub window_low: f64,
    /// Upper edge of the peak window as a fraction of the peak bin number
    pub window_high: f64,
    /// Reported when the distribution piles up above the histogram range
    pub saturation: f64,
    /// Weight (seconds) given to the last reading of the window
    pub last_weight: f64,
}

impl Default for MostProbableParams {
    fn default() -> Self {
        Self {
            n_bins: 700,
            log_min: 0.0,
            log_max: 7.0,
            epsilon: 1e-9,
            window_low: 0.8,
            window_high: 1.25,
            saturation: 1e7,
            last_weight: 1.0,
        }
    }
}

/// A weighted histogram with regular bins numbered 1 to n_bins, plus an underflow bin (0) and
/// an overflow bin (n_bins + 1).
#[derive(Debug, Clone)]
pub struct LogRateHistogram {
    n_bins: usize,
    low: f64,
    high: f64,
    contents: Vec<f64>,
}

impl LogRateHistogram {
    pub fn new(n_bins: usize, low: f64, high: f64) -> Self {
        Self {
            n_bins,
            low,
            high,
            contents: vec![0.0; n_bins + 2],
        }
    }

    fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.n_bins as f64
    }

    /// Add `weight` at `x`. NaN goes to the underflow.
    pub fn fill(&mut self, x: f64, weight: f64) {
        let bin = if x.is_nan() || x < self.low {
            0
        } else if x >= self.high {
            self.n_bins + 1
        } else {
            let idx = ((x - self.low) / self.bin_width()) as usize + 1;
            idx.min(self.n_bins)
        };
        self.contents[bin] += weight;
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn underflow(&self) -> f64 {
        self.contents[0]
    }

    pub fn overflow(&self) -> f64 {
        self.contents[self.n_bins + 1]
    }

    /// Content of bin `bin`, 0 and n_bins + 1 being the underflow and overflow
    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents[bin.min(self.n_bins + 1)]
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.low + (bin as f64 - 0.5) * self.bin_width()
    }

    /// The largest regular bin as (bin number, content). Ties go to the lowest bin.
    pub fn peak(&self) -> (usize, f64) {
        let mut best = (1, 0.0);
        for bin in 1..=self.n_bins {
            if self.contents[bin] > best.1 {
                best = (bin, self.contents[bin]);
            }
        }
        best
    }

    /// Content weighted mean of the bin centres over the inclusive range of regular bins
    pub fn mean_in_range(&self, first: usize, last: usize) -> Option<f64> {
        let first = first.max(1);
        let last = last.min(self.n_bins);
        let mut sum = 0.0;
        let mut weighted = 0.0;
        for bin in first..=last {
            sum += self.contents[bin];
            weighted += self.contents[bin] * self.bin_center(bin);
        }
        if sum > 0.0 {
            Some(weighted / sum)
        } else {
            None
        }
    }
}

/// Outcome of the most probable value estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MostProbable {
    /// A clear peak was found; the trimmed mean around it
    Peak(f64),
    /// Most of the weight sits below the histogram range (dead or zero rate)
    Underflow,
    /// No clear peak and the weight above the range dominates; carries the saturation value
    Saturated(f64),
}

impl MostProbable {
    pub fn value(&self) -> f64 {
        match self {
            Self::Peak(v) => *v,
            Self::Underflow => 0.0,
            Self::Saturated(v) => *v,
        }
    }
}

/// Build the time weighted log-rate histogram of a series
pub fn fill_log_histogram(series: &SampleSeries, params: &MostProbableParams) -> LogRateHistogram {
    let mut hist = LogRateHistogram::new(params.n_bins, params.log_min, params.log_max);
    let holds = series.hold_times(params.last_weight);
    for (sample, weight) in series.iter().zip(holds) {
        hist.fill((sample.value + params.epsilon).log10(), weight);
    }
    hist
}

/// Pick the most probable value out of a filled histogram
pub fn estimate(hist: &LogRateHistogram, params: &MostProbableParams) -> MostProbable {
    let (peak_bin, peak) = hist.peak();
    let under = hist.underflow();
    let over = hist.overflow();
    if 10.0 * peak > under && peak > over {
        let first = ((peak_bin as f64 * params.window_low) as usize).max(1);
        let last = ((peak_bin as f64 * params.window_high) as usize).min(hist.n_bins());
        let mean = hist
            .mean_in_range(first, last)
            .unwrap_or_else(|| hist.bin_center(peak_bin));
        MostProbable::Peak(10f64.powf(mean))
    } else if under > over {
        MostProbable::Underflow
    } else {
        MostProbable::Saturated(params.saturation)
    }
}

/// Most probable value of the readings in `series`
pub fn most_probable_value(series: &SampleSeries, params: &MostProbableParams) -> MostProbable {
    estimate(&fill_log_histogram(series, params), params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epics_time::EpicsTime;
    use crate::sample::Sample;
    use approx::assert_relative_eq;

    fn series(points: &[(f64, f64)]) -> SampleSeries {
        SampleSeries::new(
            points
                .iter()
                .map(|(t, v)| Sample::new(EpicsTime::from_seconds(1000.0 + t), *v))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_histogram_edges() {
        let mut hist = LogRateHistogram::new(10, 0.0, 1.0);
        hist.fill(-0.5, 1.0);
        hist.fill(f64::NAN, 1.0);
        hist.fill(1.0, 2.0);
        hist.fill(0.55, 4.0);
        assert_eq!(hist.underflow(), 2.0);
        assert_eq!(hist.overflow(), 2.0);
        assert_eq!(hist.peak(), (6, 4.0));
        assert_relative_eq!(hist.bin_center(6), 0.55, epsilon = 1e-12);
        assert_eq!(hist.mean_in_range(1, 3), None);
    }

    #[test]
    fn test_dominant_peak_resists_glitch() {
        let mut points: Vec<(f64, f64)> = (0..100).map(|i| (i as f64, 1000.0)).collect();
        points.push((100.0, 1.0e6));
        let params = MostProbableParams::default();
        let result = most_probable_value(&series(&points), &params);
        match result {
            MostProbable::Peak(v) => assert_relative_eq!(v, 1000.0, max_relative = 0.03),
            other => panic!("expected a peak, got {other:?}"),
        }
    }

    #[test]
    fn test_time_weighting() {
        // One long reading outweighs many short ones
        let mut points = vec![(0.0, 100.0)];
        points.extend((0..10).map(|i| (90.0 + i as f64, 10000.0)));
        let result = most_probable_value(&series(&points), &MostProbableParams::default());
        assert_relative_eq!(result.value(), 100.0, max_relative = 0.03);
    }

    #[test]
    fn test_dead_channel_is_zero() {
        let points: Vec<(f64, f64)> = (0..20).map(|i| (i as f64, 0.0)).collect();
        let result = most_probable_value(&series(&points), &MostProbableParams::default());
        assert_eq!(result, MostProbable::Underflow);
        assert_eq!(result.value(), 0.0);
    }

    #[test]
    fn test_saturated_channel() {
        let points: Vec<(f64, f64)> = (0..20).map(|i| (i as f64, 5.0e8)).collect();
        let params = MostProbableParams::default();
        let result = most_probable_value(&series(&points), &params);
        assert_eq!(result, MostProbable::Saturated(1e7));
        assert_eq!(result.value(), params.saturation);
    }

    #[test]
    fn test_empty_series_saturates() {
        let result = most_probable_value(&SampleSeries::default(), &MostProbableParams::default());
        assert_eq!(result, MostProbable::Saturated(1e7));
    }

    #[test]
    fn test_single_snapshot() {
        let result = most_probable_value(&series(&[(0.0, 250.0)]), &MostProbableParams::default());
        assert_relative_eq!(result.value(), 250.0, max_relative = 0.03);
    }
}
