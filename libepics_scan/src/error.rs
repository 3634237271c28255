use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EpicsTimeError {
    #[error("Failed to parse time string {0:?}; expected the format YYYY-MM-DD HH:MM:SS")]
    BadTimeString(String),
    #[error("Time {0} cannot be represented in the EPICS time format")]
    OutOfRange(String),
    #[error("Invalid UTC offset of {0} hours")]
    BadOffset(i8),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("SampleSeries was given {0} values but {1} timestamps")]
    LengthMismatch(usize, usize),
    #[error("SampleSeries timestamps are out of order at sample {0}")]
    OutOfOrder(usize),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("Grid bin width must be a positive number of seconds, got {0}")]
    BadBinWidth(f64),
    #[error("Grid duration must be a non-negative number of seconds, got {0}")]
    BadDuration(f64),
    #[error("Grid would need {0} bins, more than the limit of {max}", max=crate::grid::MAX_BINS)]
    TooManyBins(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("Invalid AC wedge {0:?}; expected the format [io][xy][+-]")]
    BadWedge(String),
    #[error("Invalid TAGM column {0}; columns run from 1 to {max}", max=crate::channels::TAGM_COLUMNS)]
    BadTagmColumn(u32),
}

#[derive(Debug, Error)]
pub enum HistorianError {
    #[error("Historian could not find channel {0} in deployment {1}")]
    UnknownChannel(String, String),
    #[error("Historian archive could not be opened as directory {0:?} does not exist")]
    BadArchivePath(PathBuf),
    #[error("Historian archive file {0:?} has a malformed entry on line {1}")]
    BadEntry(PathBuf, usize),
    #[error("Historian failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Historian failed due to time error: {0}")]
    TimeError(#[from] EpicsTimeError),
    #[error("Historian failed due to SampleSeries error: {0}")]
    SeriesError(#[from] SeriesError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("Run {0} was not found in the run conditions database")]
    UnknownRun(u32),
    #[error("Run {run} has no condition named {name}")]
    MissingCondition { run: u32, name: String },
    #[error("Run conditions lookup failed due to time error: {0}")]
    TimeError(#[from] EpicsTimeError),
}

#[derive(Debug, Error)]
pub enum RunCatalogError {
    #[error("Failed to load run catalog as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Run catalog failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Run catalog failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Run catalog lists run {0} more than once")]
    DuplicateRun(u32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config failed due to time error: {0}")]
    TimeError(#[from] EpicsTimeError),
    #[error("Config has an invalid bin width of {0} seconds")]
    BadBinWidth(f64),
}

#[derive(Debug, Error)]
pub enum HDF5WriterError {
    #[error("HDF5Writer failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("HDF5Writer could not store string attribute {0:?}")]
    BadString(String),
    #[error("HDF5Writer was given the invalid output path {0:?}")]
    BadFilePath(PathBuf),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Historian error: {0}")]
    HistorianError(#[from] HistorianError),
    #[error("Processor failed due to run conditions error: {0}")]
    ConditionError(#[from] ConditionError),
    #[error("Processor failed due to run catalog error: {0}")]
    CatalogError(#[from] RunCatalogError),
    #[error("Processor failed due to Grid error: {0}")]
    GridError(#[from] GridError),
    #[error("Processor failed due to channel error: {0}")]
    ChannelError(#[from] ChannelError),
    #[error("Processor failed due to time error: {0}")]
    TimeError(#[from] EpicsTimeError),
    #[error("Processor failed due to HDF5Writer error: {0}")]
    HDFError(#[from] HDF5WriterError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Processor needs a run catalog to look up run {0}, but none is configured")]
    NoRunCatalog(u32),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
