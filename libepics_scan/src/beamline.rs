use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::error::ConditionError;
use super::run_conditions::{ConditionValue, RunConditions};

/// What to do with a run whose beamline conditions cannot be found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingPolicy {
    /// Log the run and carry on with the next one
    #[default]
    Skip,
    /// Stop the scan and return the error
    Abort,
}

/// Names of the run conditions that describe the beamline geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamlineConditionNames {
    pub converter: String,
    pub collimator: String,
}

impl Default for BeamlineConditionNames {
    fn default() -> Self {
        Self {
            converter: String::from("polarimeter_converter"),
            collimator: String::from("collimator_diameter"),
        }
    }
}

/// Converter and collimator settings of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamlineSetting {
    pub converter: ConditionValue,
    pub collimator: ConditionValue,
}

/// A block of consecutive runs sharing the same beamline setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingSpan {
    pub first_run: u32,
    pub last_run: u32,
    pub setting: BeamlineSetting,
}

impl Display for SettingSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.first_run == self.last_run {
            write!(f, "{}", self.first_run)?;
        } else {
            write!(f, "{} - {}", self.first_run, self.last_run)?;
        }
        write!(
            f,
            " : {} {}",
            self.setting.converter, self.setting.collimator
        )
    }
}

/// Look up the beamline setting of a single run
pub fn lookup_setting<R: RunConditions + ?Sized>(
    conditions: &R,
    run: u32,
    names: &BeamlineConditionNames,
) -> Result<BeamlineSetting, ConditionError> {
    Ok(BeamlineSetting {
        converter: conditions.condition(run, &names.converter)?,
        collimator: conditions.condition(run, &names.collimator)?,
    })
}

/// Scan a run range and group consecutive runs with identical beamline settings.
///
/// Runs with missing conditions are handled according to `policy`; skipped runs do not break
/// a span.
pub fn scan_settings<R: RunConditions + ?Sized>(
    conditions: &R,
    first: u32,
    last: u32,
    names: &BeamlineConditionNames,
    policy: MissingPolicy,
) -> Result<Vec<SettingSpan>, ConditionError> {
    let mut spans: Vec<SettingSpan> = Vec::new();
    for run in conditions.runs(first, last)? {
        let setting = match lookup_setting(conditions, run, names) {
            Ok(s) => s,
            Err(e) => match policy {
                MissingPolicy::Skip => {
                    spdlog::info!("Skipping run {}: {}", run, e);
                    continue;
                }
                MissingPolicy::Abort => return Err(e),
            },
        };
        match spans.last_mut() {
            Some(span) if span.setting == setting => span.last_run = run,
            _ => spans.push(SettingSpan {
                first_run: run,
                last_run: run,
                setting,
            }),
        }
    }
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_conditions::RunCatalog;
    use time::UtcOffset;

    const CATALOG: &str = "
runs:
  - number: 50001
    start_time: 2018-12-01 00:00:00
    end_time: 2018-12-01 01:00:00
    conditions: {polarimeter_converter: Be 75um, collimator_diameter: 5.0mm hole}
  - number: 50002
    start_time: 2018-12-01 01:00:00
    end_time: 2018-12-01 02:00:00
    conditions: {polarimeter_converter: Be 75um, collimator_diameter: 5.0mm hole}
  - number: 50003
    start_time: 2018-12-01 02:00:00
    end_time: 2018-12-01 03:00:00
    conditions: {polarimeter_converter: Be 75um}
  - number: 50004
    start_time: 2018-12-01 03:00:00
    end_time: 2018-12-01 04:00:00
    conditions: {polarimeter_converter: Be 75um, collimator_diameter: 5.0mm hole}
  - number: 50005
    start_time: 2018-12-01 04:00:00
    end_time: 2018-12-01 05:00:00
    conditions: {polarimeter_converter: Be 750um, collimator_diameter: 3.4mm hole}
";

    fn catalog() -> RunCatalog {
        RunCatalog::from_yaml_str(CATALOG, UtcOffset::UTC).unwrap()
    }

    #[test]
    fn test_skip_collapses_spans() {
        let names = BeamlineConditionNames::default();
        let spans = scan_settings(&catalog(), 50000, 60000, &names, MissingPolicy::Skip).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].first_run, spans[0].last_run), (50001, 50004));
        assert_eq!((spans[1].first_run, spans[1].last_run), (50005, 50005));
        assert_eq!(spans[1].to_string(), "50005 : Be 750um 3.4mm hole");
        assert_eq!(spans[0].to_string(), "50001 - 50004 : Be 75um 5.0mm hole");
    }

    #[test]
    fn test_abort_names_missing_condition() {
        let names = BeamlineConditionNames::default();
        let result = scan_settings(&catalog(), 50000, 60000, &names, MissingPolicy::Abort);
        assert_eq!(
            result,
            Err(ConditionError::MissingCondition {
                run: 50003,
                name: "collimator_diameter".to_string()
            })
        );
    }

    #[test]
    fn test_empty_range() {
        let names = BeamlineConditionNames::default();
        let spans = scan_settings(&catalog(), 1, 2, &names, MissingPolicy::Abort).unwrap();
        assert!(spans.is_empty());
    }
}
