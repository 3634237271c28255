//! # epics_scan
//!
//! epics_scan pulls slow controls readings (electron beam current, active collimator pad
//! currents, tagger microscope scaler rates) out of the EPICS archive, lines them up with the
//! run conditions database, and resamples them onto fixed-width bins that can be written to
//! HDF5 and plotted with whatever tool you like.
//!
//! ## Building & Install
//!
//! HDF5 must be installed before building, see the
//! [hdf5-rust](https://github.com/aldanor/hdf5-rust) documentation for how the library is
//! located. To build and install the CLI use `cargo install --path ./epics_scan_cli` from the
//! top level epics_scan repository.
//!
//! ## Data sources
//!
//! The historian and the run conditions database are reached through the
//! [historian::Historian] and [run_conditions::RunConditions] traits. Two local
//! implementations are provided:
//!
//! - [file_archive::FileArchive] reads archive exports laid out as
//!   `<archive_path>/<deployment>/<variable>.csv`, one `YYYY-MM-DD HH:MM:SS,value` per line.
//! - [run_conditions::RunCatalog] reads a YAML export of the run conditions database.
//!
//! Wall clock times in both are read at the configured UTC offset.
//!
//! ## Resampling
//!
//! Archive readings arrive at irregular times. They are held forward onto a uniform grid: each
//! bin takes the value in force at the start of the bin. Scaler rates can also be reduced to a
//! single "most probable value" per window, the trimmed mean around the peak of a time weighted
//! histogram of log10(rate). This suppresses short glitches.
//!
//! ## Configuration
//!
//! A configuration file can be generated with `epics_scan_cli new -p config.yml`. The YAML
//! format is as follows:
//!
//! ```yml
//! archive_path: None
//! deployment: ops
//! record_deployment: history
//! run_catalog_path: null
//! hdf_path: None
//! first_run_number: 0
//! last_run_number: 0
//! bin_width_s: 1.0
//! utc_offset_hours: 0
//! beam_current_pv: IBCAD00CRCUR6
//! record_first_year: 2015
//! beamline_conditions:
//!   converter: polarimeter_converter
//!   collimator: collimator_diameter
//! missing_policy: Skip
//! most_probable:
//!   n_bins: 700
//!   log_min: 0.0
//!   log_max: 7.0
//!   epsilon: 1.0e-9
//!   window_low: 0.8
//!   window_high: 1.25
//!   saturation: 10000000.0
//!   last_weight: 1.0
//! ```
//!
//! ## Output
//!
//! ```text
//! <request>_<window>.h5 - version
//! series
//! |---- <name>(dset) - channel, unit, origin, origin_epics, bin_width_s, n_bins
//! columns
//! |---- <name> - channel, unit, origin, origin_epics, duration_s
//! |    |---- column(dset)
//! |    |---- value(dset)
//! record - channel, deployment, origin, origin_epics, n_samples
//! |---- time_s(dset)
//! |---- value(dset)
//! ```
//!
//! Beamline condition scans are written as YAML lists of run spans.
pub mod beamline;
pub mod channels;
pub mod config;
pub mod epics_time;
pub mod error;
pub mod file_archive;
pub mod grid;
pub mod hdf_writer;
pub mod historian;
pub mod most_probable;
pub mod process;
pub mod resampler;
pub mod run_conditions;
pub mod sample;
