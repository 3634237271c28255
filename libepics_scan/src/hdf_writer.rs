use hdf5::types::VarLenUnicode;
use hdf5::File;
use ndarray::Array1;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::HDF5WriterError;
use super::process::{BeamRecord, ColumnSeries};
use super::resampler::BinnedSeries;

const SERIES_NAME: &str = "series";
const COLUMNS_NAME: &str = "columns";
const RECORD_NAME: &str = "record";
const RECORD_TIME_NAME: &str = "time_s";
const RECORD_VALUE_NAME: &str = "value";
const COLUMN_NUMBER_NAME: &str = "column";
const COLUMN_VALUE_NAME: &str = "value";

/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens an HDF5 file for writing resampled slow controls data.
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    file_path: PathBuf,
    series_group: hdf5::Group,
    columns_group: hdf5::Group,
    record_group: hdf5::Group,
    n_written: u64,
}
// Structure
// version
// series
// |---- <name>(dset) - channel, unit, origin, origin_epics, bin_width_s, n_bins
// columns
// |---- <name> - channel, unit, origin, origin_epics, duration_s
// |    |---- column(dset)
// |    |---- value(dset)
// record - channel, deployment, origin, origin_epics, n_samples
// |---- time_s(dset)
// |---- value(dset)

/// Write a string attribute
fn write_str_attr(
    location: &hdf5::Location,
    name: &str,
    value: &str,
) -> Result<(), HDF5WriterError> {
    let value = VarLenUnicode::from_str(value)
        .map_err(|_| HDF5WriterError::BadString(value.to_string()))?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

impl HDFWriter {
    /// Create the writer, opening a file at path and creating the data groups
    pub fn new(path: &Path) -> Result<Self, HDF5WriterError> {
        if path.file_stem().is_none() {
            return Err(HDF5WriterError::BadFilePath(path.to_path_buf()));
        }
        let file_handle = File::create(path)?;
        let version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);
        write_str_attr(&file_handle, "version", &version)?;

        let series_group = file_handle.create_group(SERIES_NAME)?;
        let columns_group = file_handle.create_group(COLUMNS_NAME)?;
        let record_group = file_handle.create_group(RECORD_NAME)?;

        Ok(Self {
            file_handle,
            file_path: path.to_path_buf(),
            series_group,
            columns_group,
            record_group,
            n_written: 0,
        })
    }

    /// Write a resampled series as a single dataset, in bin order
    pub fn write_binned_series(
        &mut self,
        name: &str,
        series: &BinnedSeries,
    ) -> Result<(), HDF5WriterError> {
        let data = Array1::from_vec(series.values.clone());
        let dset = self
            .series_group
            .new_dataset_builder()
            .with_data(&data)
            .create(name)?;
        write_str_attr(&dset, "channel", &series.channel)?;
        write_str_attr(&dset, "unit", &series.unit)?;
        write_str_attr(&dset, "origin", &series.grid.origin().to_string())?;
        dset.new_attr::<u64>()
            .create("origin_epics")?
            .write_scalar(&series.grid.origin().0)?;
        dset.new_attr::<f64>()
            .create("bin_width_s")?
            .write_scalar(&series.grid.bin_width())?;
        dset.new_attr::<u64>()
            .create("n_bins")?
            .write_scalar(&(series.grid.bin_count() as u64))?;
        self.n_written += 1;
        Ok(())
    }

    /// Write a per-column snapshot (column numbers and values)
    pub fn write_column_series(
        &mut self,
        name: &str,
        series: &ColumnSeries,
    ) -> Result<(), HDF5WriterError> {
        let group = self.columns_group.create_group(name)?;
        let columns = Array1::from_vec(series.columns.clone());
        let values = Array1::from_vec(series.values.clone());
        group
            .new_dataset_builder()
            .with_data(&columns)
            .create(COLUMN_NUMBER_NAME)?;
        group
            .new_dataset_builder()
            .with_data(&values)
            .create(COLUMN_VALUE_NAME)?;
        write_str_attr(&group, "channel", &series.channel)?;
        write_str_attr(&group, "unit", &series.unit)?;
        write_str_attr(&group, "origin", &series.origin.to_string())?;
        group
            .new_attr::<u64>()
            .create("origin_epics")?
            .write_scalar(&series.origin.0)?;
        group
            .new_attr::<f64>()
            .create("duration_s")?
            .write_scalar(&series.duration)?;
        self.n_written += 1;
        Ok(())
    }

    /// Write a long record of raw samples as (time, value) columns
    pub fn write_record(&mut self, record: &BeamRecord) -> Result<(), HDF5WriterError> {
        let times = Array1::from_vec(record.time_s.clone());
        let values = Array1::from_vec(record.values.clone());
        self.record_group
            .new_dataset_builder()
            .with_data(&times)
            .create(RECORD_TIME_NAME)?;
        self.record_group
            .new_dataset_builder()
            .with_data(&values)
            .create(RECORD_VALUE_NAME)?;
        write_str_attr(&self.record_group, "channel", &record.channel)?;
        write_str_attr(&self.record_group, "deployment", &record.deployment)?;
        write_str_attr(&self.record_group, "origin", &record.origin.to_string())?;
        self.record_group
            .new_attr::<u64>()
            .create("origin_epics")?
            .write_scalar(&record.origin.0)?;
        self.record_group
            .new_attr::<u64>()
            .create("n_samples")?
            .write_scalar(&(record.len() as u64))?;
        self.n_written += 1;
        Ok(())
    }

    /// Flush and close the file, consuming the writer
    pub fn close(self) -> Result<PathBuf, HDF5WriterError> {
        self.file_handle.flush()?;
        spdlog::info!(
            "{} datasets written to {}.",
            self.n_written,
            self.file_path.to_string_lossy()
        );
        Ok(self.file_path)
    }
}
