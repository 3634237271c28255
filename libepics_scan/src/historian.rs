use fxhash::FxHashMap;
use std::cell::Cell;

use super::epics_time::EpicsTime;
use super::error::HistorianError;
use super::sample::{Sample, SampleSeries};

/// A resolved reference to one archived variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub name: String,
    pub deployment: String,
    pub id: u64,
}

/// The slow controls historian.
///
/// Resolving a variable name to a handle can be expensive, so callers normally go through a
/// [HandleCache] rather than calling `lookup` directly.
pub trait Historian {
    /// Resolve a variable name within a deployment
    fn lookup(&self, name: &str, deployment: &str) -> Result<ChannelHandle, HistorianError>;

    /// Fetch the readings of a variable from `start` for `duration` seconds.
    ///
    /// The first sample of the series is the value in force at `start` (the last reading at or
    /// before it, stamped at `start`), if the variable had been recorded by then.
    fn fetch(
        &self,
        handle: &ChannelHandle,
        start: EpicsTime,
        duration: f64,
    ) -> Result<SampleSeries, HistorianError>;
}

/// Memo of resolved handles, keyed by deployment then variable name.
///
/// Owned by the caller and never invalidated, so one cache should not outlive the archive it
/// was filled from.
#[derive(Debug, Default)]
pub struct HandleCache {
    handles: FxHashMap<String, FxHashMap<String, ChannelHandle>>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle for a variable, asking the historian only the first time
    pub fn resolve<H: Historian + ?Sized>(
        &mut self,
        historian: &H,
        name: &str,
        deployment: &str,
    ) -> Result<ChannelHandle, HistorianError> {
        if let Some(handle) = self.handles.get(deployment).and_then(|names| names.get(name)) {
            return Ok(handle.clone());
        }
        let handle = historian.lookup(name, deployment)?;
        spdlog::debug!("Resolved {} in deployment {} to handle {}", name, deployment, handle.id);
        self.handles
            .entry(deployment.to_string())
            .or_default()
            .insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Number of cached handles over all deployments
    pub fn len(&self) -> usize {
        self.handles.values().map(|names| names.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Select the readings a historian returns for a window out of a complete, ordered record.
///
/// Takes the last reading at or before `start`, re-stamped at `start`, followed by every
/// reading strictly inside `(start, start + duration)`.
pub fn window_samples(record: &[Sample], start: EpicsTime, duration: f64) -> Vec<Sample> {
    let end = start.add_seconds(duration);
    let first_after = record.partition_point(|s| s.timestamp <= start);
    let mut window = Vec::new();
    if first_after > 0 {
        window.push(Sample::new(start, record[first_after - 1].value));
    }
    window.extend(
        record[first_after..]
            .iter()
            .take_while(|s| s.timestamp < end)
            .copied(),
    );
    window
}

/// A historian that serves records held in memory.
///
/// Useful for feeding data that was fetched some other way through the resampling tools, and
/// for tests. Counts calls to `lookup`.
#[derive(Debug, Default)]
pub struct MemoryHistorian {
    records: FxHashMap<(String, String), Vec<Sample>>,
    lookups: Cell<usize>,
}

impl MemoryHistorian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the record of a variable
    pub fn insert(&mut self, name: &str, deployment: &str, record: SampleSeries) {
        self.records.insert(
            (name.to_string(), deployment.to_string()),
            record.samples().to_vec(),
        );
    }

    /// Number of times `lookup` has been called
    pub fn lookup_count(&self) -> usize {
        self.lookups.get()
    }
}

impl Historian for MemoryHistorian {
    fn lookup(&self, name: &str, deployment: &str) -> Result<ChannelHandle, HistorianError> {
        self.lookups.set(self.lookups.get() + 1);
        let key = (name.to_string(), deployment.to_string());
        if self.records.contains_key(&key) {
            Ok(ChannelHandle {
                name: key.0,
                deployment: key.1,
                id: fxhash::hash64(name),
            })
        } else {
            Err(HistorianError::UnknownChannel(
                name.to_string(),
                deployment.to_string(),
            ))
        }
    }

    fn fetch(
        &self,
        handle: &ChannelHandle,
        start: EpicsTime,
        duration: f64,
    ) -> Result<SampleSeries, HistorianError> {
        let key = (handle.name.clone(), handle.deployment.clone());
        match self.records.get(&key) {
            Some(record) => Ok(SampleSeries::new(window_samples(record, start, duration))?),
            None => Err(HistorianError::UnknownChannel(key.0, key.1)),
        }
    }
}
