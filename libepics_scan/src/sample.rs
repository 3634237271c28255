use super::epics_time::EpicsTime;
use super::error::SeriesError;

/// A single reading of a process variable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: EpicsTime,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: EpicsTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// SampleSeries is the ordered list of readings returned by the historian for one variable
/// over one time window.
///
/// Timestamps never decrease. A series may be empty, which simply means the variable was
/// not recorded in the window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSeries {
    samples: Vec<Sample>,
}

impl SampleSeries {
    /// Create a series, checking that the timestamps are in order
    pub fn new(samples: Vec<Sample>) -> Result<Self, SeriesError> {
        for (idx, pair) in samples.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(SeriesError::OutOfOrder(idx + 1));
            }
        }
        Ok(Self { samples })
    }

    /// Create a series from the parallel value and timestamp arrays the historian hands back
    pub fn from_arrays(values: &[f64], timestamps: &[EpicsTime]) -> Result<Self, SeriesError> {
        if values.len() != timestamps.len() {
            return Err(SeriesError::LengthMismatch(values.len(), timestamps.len()));
        }
        Self::new(
            timestamps
                .iter()
                .zip(values.iter())
                .map(|(t, v)| Sample::new(*t, *v))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Seconds each sample stays in force before the next one replaces it.
    ///
    /// The last sample has no successor, so it is given `last_hold` seconds.
    pub fn hold_times(&self, last_hold: f64) -> Vec<f64> {
        let mut holds: Vec<f64> = self
            .samples
            .windows(2)
            .map(|pair| pair[1].timestamp.seconds_since(pair[0].timestamp))
            .collect();
        if !self.samples.is_empty() {
            holds.push(last_hold);
        }
        holds
    }
}

impl<'a> IntoIterator for &'a SampleSeries {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
