use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use time::UtcOffset;

use super::epics_time::EpicsTime;
use super::error::{ConditionError, RunCatalogError};

/// Condition holding the mean beam current of a run, in nA
pub const BEAM_ON_CURRENT: &str = "beam_on_current";

/// The value of a named run condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ConditionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl Display for ConditionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Start and end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTimes {
    pub start: EpicsTime,
    pub end: EpicsTime,
}

impl RunTimes {
    /// Length of the run in seconds
    pub fn duration(&self) -> f64 {
        self.end.seconds_since(self.start)
    }
}

/// The run conditions database (rcdb)
pub trait RunConditions {
    fn run_times(&self, run: u32) -> Result<RunTimes, ConditionError>;

    fn condition(&self, run: u32, name: &str) -> Result<ConditionValue, ConditionError>;

    /// Runs known to the database in the inclusive range, in ascending order
    fn runs(&self, first: u32, last: u32) -> Result<Vec<u32>, ConditionError>;
}

/// Look up the start time and duration (seconds) of a run.
///
/// The beam current recorded for the run is logged when available.
pub fn run_window<R: RunConditions + ?Sized>(
    conditions: &R,
    run: u32,
) -> Result<(EpicsTime, f64), ConditionError> {
    match conditions.condition(run, BEAM_ON_CURRENT) {
        Ok(current) => spdlog::info!("Run {} beam_on_current was {} nA", run, current),
        Err(ConditionError::MissingCondition { .. }) => {
            spdlog::info!("Run {} has no recorded beam_on_current", run)
        }
        Err(e) => return Err(e),
    }
    let times = conditions.run_times(run)?;
    Ok((times.start, times.duration()))
}

/// One run as written in a catalog file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub number: u32,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub conditions: BTreeMap<String, ConditionValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogFile {
    runs: Vec<RunRecord>,
}

/// RunCatalog is a run conditions database exported to a YAML file.
///
/// ```yml
/// runs:
///   - number: 51644
///     start_time: 2018-12-01 10:00:00
///     end_time: 2018-12-01 12:00:00
///     conditions:
///       beam_on_current: 300.0
///       polarimeter_converter: Be 75um
///       collimator_diameter: 5.0mm hole
/// ```
///
/// Times are read at the catalog's UTC offset.
#[derive(Debug, Clone)]
pub struct RunCatalog {
    runs: BTreeMap<u32, RunRecord>,
    time_offset: UtcOffset,
}

impl RunCatalog {
    /// Read a catalog from a YAML file
    pub fn read_catalog_file(path: &Path, time_offset: UtcOffset) -> Result<Self, RunCatalogError> {
        if !path.exists() {
            return Err(RunCatalogError::BadFilePath(path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml_str, time_offset)
    }

    pub fn from_yaml_str(yaml_str: &str, time_offset: UtcOffset) -> Result<Self, RunCatalogError> {
        let file = serde_yaml::from_str::<CatalogFile>(yaml_str)?;
        Self::from_records(file.runs, time_offset)
    }

    pub fn from_records(
        records: Vec<RunRecord>,
        time_offset: UtcOffset,
    ) -> Result<Self, RunCatalogError> {
        let mut runs = BTreeMap::new();
        for record in records {
            let number = record.number;
            if runs.insert(number, record).is_some() {
                return Err(RunCatalogError::DuplicateRun(number));
            }
        }
        Ok(Self { runs, time_offset })
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    fn record(&self, run: u32) -> Result<&RunRecord, ConditionError> {
        self.runs.get(&run).ok_or(ConditionError::UnknownRun(run))
    }
}

impl RunConditions for RunCatalog {
    fn run_times(&self, run: u32) -> Result<RunTimes, ConditionError> {
        let record = self.record(run)?;
        Ok(RunTimes {
            start: EpicsTime::parse(&record.start_time, self.time_offset)?,
            end: EpicsTime::parse(&record.end_time, self.time_offset)?,
        })
    }

    fn condition(&self, run: u32, name: &str) -> Result<ConditionValue, ConditionError> {
        self.record(run)?
            .conditions
            .get(name)
            .cloned()
            .ok_or_else(|| ConditionError::MissingCondition {
                run,
                name: name.to_string(),
            })
    }

    fn runs(&self, first: u32, last: u32) -> Result<Vec<u32>, ConditionError> {
        if first > last {
            return Ok(vec![]);
        }
        Ok(self.runs.range(first..=last).map(|(run, _)| *run).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = "
runs:
  - number: 51644
    start_time: 2018-12-01 10:00:00
    end_time: 2018-12-02 12:30:00
    conditions:
      beam_on_current: 300.0
      polarimeter_converter: Be 75um
      collimator_diameter: 5.0mm hole
  - number: 51647
    start_time: 2018-12-03 00:00:00
    end_time: 2018-12-03 01:00:00
    conditions:
      beam_on_current: 200
  - number: 51700
    start_time: 2018-12-05 00:00:00
    end_time: 2018-12-05 00:30:00
";

    fn catalog() -> RunCatalog {
        RunCatalog::from_yaml_str(CATALOG, UtcOffset::UTC).unwrap()
    }

    #[test]
    fn test_run_window_spans_days() {
        let (start, duration) = run_window(&catalog(), 51644).unwrap();
        assert_eq!(start.format(UtcOffset::UTC).unwrap(), "2018-12-01 10:00:00");
        assert_eq!(duration, 95_400.0);
    }

    #[test]
    fn test_conditions() {
        let cat = catalog();
        assert_eq!(
            cat.condition(51644, "polarimeter_converter").unwrap(),
            ConditionValue::Text("Be 75um".to_string())
        );
        assert_eq!(
            cat.condition(51647, BEAM_ON_CURRENT).unwrap().as_f64(),
            Some(200.0)
        );
        assert_eq!(
            cat.condition(51647, "collimator_diameter"),
            Err(ConditionError::MissingCondition {
                run: 51647,
                name: "collimator_diameter".to_string()
            })
        );
        assert_eq!(cat.condition(1, BEAM_ON_CURRENT), Err(ConditionError::UnknownRun(1)));
    }

    #[test]
    fn test_run_window_without_current() {
        let (_, duration) = run_window(&catalog(), 51700).unwrap();
        assert_eq!(duration, 1800.0);
    }

    #[test]
    fn test_run_range() {
        let cat = catalog();
        assert_eq!(cat.runs(51640, 51650).unwrap(), vec![51644, 51647]);
        assert_eq!(cat.runs(51650, 51640).unwrap(), Vec::<u32>::new());
        assert_eq!(cat.len(), 3);
    }

    #[test]
    fn test_duplicate_run() {
        let record = RunRecord {
            number: 10,
            start_time: String::from("2018-12-01 10:00:00"),
            end_time: String::from("2018-12-01 11:00:00"),
            conditions: BTreeMap::new(),
        };
        assert!(matches!(
            RunCatalog::from_records(vec![record.clone(), record], UtcOffset::UTC),
            Err(RunCatalogError::DuplicateRun(10))
        ));
    }
}
