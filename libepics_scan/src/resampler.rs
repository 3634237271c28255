use super::grid::Grid;
use super::sample::SampleSeries;

/// Resample an irregular series onto a grid by holding each value forward.
///
/// Bin `i` takes the value of the latest sample at or before `origin + i * bin_width`.
/// A sample that lands exactly on a bin's start time owns that bin. Samples stamped before the
/// origin count as taking effect at the origin, and bins before the first sample keep the
/// default value of zero.
///
/// This walks the samples and the bins together once, so it costs O(samples + bins).
pub fn resample(series: &SampleSeries, grid: &Grid) -> Vec<f64> {
    let n_bins = grid.bin_count();
    let mut bins = vec![0.0; n_bins];
    let samples = series.samples();
    let origin = grid.origin();

    // Next bin to fill
    let mut cursor: usize = 0;
    if let Some(first) = samples.first() {
        let first_offset = first.timestamp.seconds_since(origin);
        while cursor < n_bins && grid.bin_time(cursor) < first_offset {
            cursor += 1;
        }
    }

    for (idx, sample) in samples.iter().enumerate() {
        if cursor >= n_bins {
            break;
        }
        let next_offset = match samples.get(idx + 1) {
            Some(next) => next.timestamp.seconds_since(origin),
            None => f64::INFINITY,
        };
        while cursor < n_bins && grid.bin_time(cursor) < next_offset {
            bins[cursor] = sample.value;
            cursor += 1;
        }
    }

    bins
}

/// A resampled variable, ready to hand to a storage sink
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedSeries {
    pub channel: String,
    pub unit: String,
    pub grid: Grid,
    pub values: Vec<f64>,
}

impl BinnedSeries {
    pub fn new(channel: &str, unit: &str, series: &SampleSeries, grid: Grid) -> Self {
        Self {
            channel: channel.to_string(),
            unit: unit.to_string(),
            values: resample(series, &grid),
            grid,
        }
    }
}
