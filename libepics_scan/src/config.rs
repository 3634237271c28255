use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::UtcOffset;

use super::beamline::{BeamlineConditionNames, MissingPolicy};
use super::channels::{BEAM_CURRENT_PV, DEFAULT_DEPLOYMENT, HISTORY_DEPLOYMENT};
use super::epics_time::utc_offset_hours;
use super::error::ConfigError;
use super::most_probable::MostProbableParams;

/// First year of beam in Hall D
const FIRST_BEAM_YEAR: i32 = 2015;

/// Structure representing the application configuration. Contains pathing, run, and binning
/// information. Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub archive_path: PathBuf,
    pub deployment: String,
    pub record_deployment: String,
    pub run_catalog_path: Option<PathBuf>,
    pub hdf_path: PathBuf,
    pub first_run_number: u32,
    pub last_run_number: u32,
    pub bin_width_s: f64,
    pub utc_offset_hours: i8,
    pub beam_current_pv: String,
    pub record_first_year: i32,
    pub beamline_conditions: BeamlineConditionNames,
    pub missing_policy: MissingPolicy,
    pub most_probable: MostProbableParams,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            archive_path: PathBuf::from("None"),
            deployment: String::from(DEFAULT_DEPLOYMENT),
            record_deployment: String::from(HISTORY_DEPLOYMENT),
            run_catalog_path: None,
            hdf_path: PathBuf::from("None"),
            first_run_number: 0,
            last_run_number: 0,
            bin_width_s: 1.0,
            utc_offset_hours: 0,
            beam_current_pv: String::from(BEAM_CURRENT_PV),
            record_first_year: FIRST_BEAM_YEAR,
            beamline_conditions: BeamlineConditionNames::default(),
            missing_policy: MissingPolicy::default(),
            most_probable: MostProbableParams::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// The offset from UTC of the wall clock times in the archive and run catalog
    pub fn time_offset(&self) -> Result<UtcOffset, ConfigError> {
        Ok(utc_offset_hours(self.utc_offset_hours)?)
    }

    /// Get the bin width, checking that it is usable
    pub fn bin_width(&self) -> Result<f64, ConfigError> {
        if self.bin_width_s.is_finite() && self.bin_width_s > 0.0 {
            Ok(self.bin_width_s)
        } else {
            Err(ConfigError::BadBinWidth(self.bin_width_s))
        }
    }

    /// Get the path to an output hdf5 file
    pub fn get_hdf_file_name(&self, stem: &str) -> Result<PathBuf, ConfigError> {
        let hdf_file_path: PathBuf = self.hdf_path.join(format!("{stem}.h5"));
        if self.hdf_path.exists() {
            Ok(hdf_file_path)
        } else {
            Err(ConfigError::BadFilePath(self.hdf_path.clone()))
        }
    }

    /// Get the path to an output yaml file
    pub fn get_yaml_file_name(&self, stem: &str) -> Result<PathBuf, ConfigError> {
        if self.hdf_path.exists() {
            Ok(self.hdf_path.join(format!("{stem}.yml")))
        } else {
            Err(ConfigError::BadFilePath(self.hdf_path.clone()))
        }
    }

    /// Construct the run string using the rcdb run format
    pub fn get_run_str(&self, run_number: u32) -> String {
        format!("run_{run_number:0>6}")
    }
}
