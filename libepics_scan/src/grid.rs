use super::epics_time::EpicsTime;
use super::error::GridError;

/// Largest grid allowed, 2^28 bins (2 GiB of f64 values)
pub const MAX_BINS: usize = 1 << 28;

/// Grid is the uniform time axis that irregular samples are resampled onto.
///
/// Bin `i` starts `i * bin_width` seconds after the origin. The bin count is always
/// `ceil(duration / bin_width)`, so a duration that is not a whole number of bins still gets
/// a final (truncated) bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    origin: EpicsTime,
    bin_width: f64,
    bin_count: usize,
}

impl Grid {
    /// Create a grid covering `duration` seconds from `origin` with bins `bin_width` seconds wide
    pub fn new(origin: EpicsTime, duration: f64, bin_width: f64) -> Result<Self, GridError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(GridError::BadDuration(duration));
        }
        let bin_count = Self::count_bins(duration, bin_width)?;
        Ok(Self {
            origin,
            bin_width,
            bin_count,
        })
    }

    /// Number of bins needed to cover `duration` seconds
    pub fn count_bins(duration: f64, bin_width: f64) -> Result<usize, GridError> {
        if !bin_width.is_finite() || bin_width <= 0.0 {
            return Err(GridError::BadBinWidth(bin_width));
        }
        let count = (duration / bin_width).ceil();
        if count > MAX_BINS as f64 {
            return Err(GridError::TooManyBins(count));
        }
        Ok(count as usize)
    }

    pub fn origin(&self) -> EpicsTime {
        self.origin
    }

    /// Bin width in seconds
    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Seconds from the origin to the start of bin `idx`
    pub fn bin_time(&self, idx: usize) -> f64 {
        idx as f64 * self.bin_width
    }

    /// Upper edge of the axis, `bin_count * bin_width` seconds
    pub fn span(&self) -> f64 {
        self.bin_time(self.bin_count)
    }

    pub fn bin_low_edges(&self) -> Vec<f64> {
        (0..self.bin_count).map(|idx| self.bin_time(idx)).collect()
    }
}
