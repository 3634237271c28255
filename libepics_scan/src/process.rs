use std::path::PathBuf;
use time::{Date, Month, PrimitiveDateTime, Time, UtcOffset};

use super::beamline::{scan_settings, SettingSpan};
use super::channels::{AcWedge, TagmColumn, TAGM_COLUMNS};
use super::config::Config;
use super::epics_time::EpicsTime;
use super::error::{EpicsTimeError, HistorianError, ProcessorError};
use super::file_archive::FileArchive;
use super::grid::Grid;
use super::hdf_writer::HDFWriter;
use super::historian::{HandleCache, Historian};
use super::most_probable::{most_probable_value, MostProbableParams};
use super::resampler::BinnedSeries;
use super::run_conditions::{run_window, RunCatalog, RunConditions};
use super::sample::SampleSeries;

const CURRENT_UNIT: &str = "nA";
const RATE_UNIT: &str = "Hz";

/// A resolved stretch of time to fetch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchWindow {
    pub start: EpicsTime,
    /// Seconds
    pub duration: f64,
}

impl FetchWindow {
    pub fn new(start: EpicsTime, duration: f64) -> Self {
        Self { start, duration }
    }
}

/// How the user asked for a time window
#[derive(Debug, Clone, PartialEq)]
pub enum WindowRequest {
    /// The full length of a run, from the run conditions database
    Run(u32),
    /// An explicit start (`YYYY-MM-DD HH:MM:SS`) and duration in seconds
    Span { start: String, duration: f64 },
}

/// Rates of every TAGM column, one most probable value per column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSeries {
    pub channel: String,
    pub unit: String,
    pub origin: EpicsTime,
    pub duration: f64,
    pub columns: Vec<u32>,
    pub values: Vec<f64>,
}

/// Raw samples of one variable collected over many windows.
///
/// Times are seconds since `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamRecord {
    pub channel: String,
    pub deployment: String,
    pub origin: EpicsTime,
    pub time_s: Vec<f64>,
    pub values: Vec<f64>,
}

impl BeamRecord {
    pub fn new(channel: &str, deployment: &str, origin: EpicsTime) -> Self {
        Self {
            channel: channel.to_string(),
            deployment: deployment.to_string(),
            origin,
            time_s: vec![],
            values: vec![],
        }
    }

    /// Add every sample of a series as a row
    pub fn append(&mut self, series: &SampleSeries) {
        for sample in series {
            self.time_s.push(sample.timestamp.seconds_since(self.origin));
            self.values.push(sample.value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolve a window request into an absolute start and duration
pub fn resolve_window<R: RunConditions + ?Sized>(
    request: &WindowRequest,
    conditions: Option<&R>,
    time_offset: UtcOffset,
) -> Result<FetchWindow, ProcessorError> {
    match request {
        WindowRequest::Run(run) => match conditions {
            Some(c) => {
                let (start, duration) = run_window(c, *run)?;
                Ok(FetchWindow::new(start, duration))
            }
            None => Err(ProcessorError::NoRunCatalog(*run)),
        },
        WindowRequest::Span { start, duration } => Ok(FetchWindow::new(
            EpicsTime::parse(start, time_offset)?,
            *duration,
        )),
    }
}

/// Fetch the samples of a variable, resolving its handle through the cache
pub fn fetch_samples<H: Historian + ?Sized>(
    historian: &H,
    cache: &mut HandleCache,
    pv: &str,
    deployment: &str,
    window: FetchWindow,
) -> Result<SampleSeries, HistorianError> {
    let handle = cache.resolve(historian, pv, deployment)?;
    let series = historian.fetch(&handle, window.start, window.duration)?;
    spdlog::info!("Fetched {} values of {}", series.len(), pv);
    if let Some(first) = series.first() {
        spdlog::info!("  {} {}", first.timestamp, first.value);
    }
    if series.len() > 1 {
        if let Some(last) = series.last() {
            spdlog::info!("  ...");
            spdlog::info!("  {} {}", last.timestamp, last.value);
        }
    }
    Ok(series)
}

/// Fetch a variable and resample it onto bins `bin_width` seconds wide
pub fn binned_series<H: Historian + ?Sized>(
    historian: &H,
    cache: &mut HandleCache,
    pv: &str,
    deployment: &str,
    unit: &str,
    window: FetchWindow,
    bin_width: f64,
) -> Result<BinnedSeries, ProcessorError> {
    let grid = Grid::new(window.start, window.duration, bin_width)?;
    let series = fetch_samples(historian, cache, pv, deployment, window)?;
    let binned = BinnedSeries::new(pv, unit, &series, grid);
    spdlog::info!(
        "Resampled {} onto {} bins of {} s",
        pv,
        grid.bin_count(),
        grid.bin_width()
    );
    Ok(binned)
}

/// Current on one wedge of the active collimator
pub fn ac_current_series<H: Historian + ?Sized>(
    historian: &H,
    cache: &mut HandleCache,
    wedge: &AcWedge,
    deployment: &str,
    window: FetchWindow,
    bin_width: f64,
) -> Result<BinnedSeries, ProcessorError> {
    binned_series(
        historian,
        cache,
        &wedge.pv_name(),
        deployment,
        CURRENT_UNIT,
        window,
        bin_width,
    )
}

/// Scaler rate of one TAGM column
pub fn tagm_rate_series<H: Historian + ?Sized>(
    historian: &H,
    cache: &mut HandleCache,
    column: TagmColumn,
    deployment: &str,
    window: FetchWindow,
    bin_width: f64,
) -> Result<BinnedSeries, ProcessorError> {
    binned_series(
        historian,
        cache,
        &column.pv_name(),
        deployment,
        RATE_UNIT,
        window,
        bin_width,
    )
}

/// Most probable rate of every TAGM column over a window.
///
/// A zero duration window takes a snapshot of the rates in force at the start.
pub fn tagm_energy_series<H: Historian + ?Sized>(
    historian: &H,
    cache: &mut HandleCache,
    deployment: &str,
    window: FetchWindow,
    params: &MostProbableParams,
    progress: &mut dyn FnMut(f32),
) -> Result<ColumnSeries, ProcessorError> {
    let mut columns: Vec<u32> = Vec::with_capacity(TAGM_COLUMNS as usize);
    let mut values: Vec<f64> = Vec::with_capacity(TAGM_COLUMNS as usize);
    for column in TagmColumn::all() {
        let series = fetch_samples(historian, cache, &column.pv_name(), deployment, window)?;
        let rate = most_probable_value(&series, params);
        spdlog::debug!("TAGM column {} most probable rate {:?}", column.number(), rate);
        columns.push(column.number());
        values.push(rate.value());
        progress(column.number() as f32 / TAGM_COLUMNS as f32);
    }
    Ok(ColumnSeries {
        channel: String::from("TAGM:T:*:scaler_t1"),
        unit: String::from(RATE_UNIT),
        origin: window.start,
        duration: window.duration,
        columns,
        values,
    })
}

/// Calendar month windows from January 1st of `first_year` through the month containing `until`
pub fn month_windows(
    first_year: i32,
    until: EpicsTime,
    time_offset: UtcOffset,
) -> Result<Vec<FetchWindow>, EpicsTimeError> {
    let month_start = |year: i32, month: Month| -> Result<EpicsTime, EpicsTimeError> {
        let date = Date::from_calendar_date(year, month, 1)
            .map_err(|_| EpicsTimeError::OutOfRange(format!("{year}-{month}")))?;
        EpicsTime::from_datetime(PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(time_offset))
    };

    let mut windows = Vec::new();
    let (mut year, mut month) = (first_year, Month::January);
    let mut start = month_start(year, month)?;
    while start <= until {
        if month == Month::December {
            year += 1;
        }
        month = month.next();
        let end = month_start(year, month)?;
        windows.push(FetchWindow::new(start, end.seconds_since(start)));
        start = end;
    }
    Ok(windows)
}

/// Collect the raw samples of a variable over a list of windows into one record
pub fn beam_current_record<H: Historian + ?Sized>(
    historian: &H,
    cache: &mut HandleCache,
    pv: &str,
    deployment: &str,
    windows: &[FetchWindow],
    progress: &mut dyn FnMut(f32),
) -> Result<BeamRecord, ProcessorError> {
    let origin = windows.first().map(|w| w.start).unwrap_or_default();
    let mut record = BeamRecord::new(pv, deployment, origin);
    for (idx, window) in windows.iter().enumerate() {
        spdlog::info!("Fetching {} for the month starting {}", pv, window.start);
        let series = fetch_samples(historian, cache, pv, deployment, *window)?;
        record.append(&series);
        progress((idx + 1) as f32 / windows.len() as f32);
    }
    Ok(record)
}

/// What the user wants produced
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    AcCurrent {
        wedge: AcWedge,
        window: WindowRequest,
    },
    BeamCurrent {
        window: WindowRequest,
    },
    TagmRate {
        column: TagmColumn,
        window: WindowRequest,
    },
    TagmEnergy {
        window: WindowRequest,
    },
    BeamRecord {
        until: Option<String>,
    },
    BeamlineScan,
}

/// Load the run catalog, if one is configured
fn load_catalog(config: &Config, offset: UtcOffset) -> Result<Option<RunCatalog>, ProcessorError> {
    match &config.run_catalog_path {
        Some(path) => {
            let catalog = RunCatalog::read_catalog_file(path, offset)?;
            spdlog::info!("Loaded {} runs from {}", catalog.len(), path.to_string_lossy());
            Ok(Some(catalog))
        }
        None => Ok(None),
    }
}

/// File name friendly label for a window
fn window_label(
    config: &Config,
    request: &WindowRequest,
    window: &FetchWindow,
    offset: UtcOffset,
) -> String {
    match request {
        WindowRequest::Run(run) => config.get_run_str(*run),
        WindowRequest::Span { .. } => match window.start.format(offset) {
            Ok(s) => s.replace(['-', ':'], "").replace(' ', "_"),
            Err(_) => format!("{}", window.start.0 >> 32),
        },
    }
}

/// Create the output file for a request
fn open_writer(config: &Config, stem: &str) -> Result<HDFWriter, ProcessorError> {
    let path = config.get_hdf_file_name(stem)?;
    spdlog::info!("Writing output to {}", path.to_string_lossy());
    Ok(HDFWriter::new(&path)?)
}

/// Write the spans of a beamline scan next to the other outputs
fn write_spans(config: &Config, spans: &[SettingSpan]) -> Result<PathBuf, ProcessorError> {
    let path = config.get_yaml_file_name(&format!(
        "beamline_{}_{}",
        config.first_run_number, config.last_run_number
    ))?;
    let yaml_str = serde_yaml::to_string(spans)?;
    std::fs::write(&path, yaml_str)?;
    Ok(path)
}

/// The main entry point of epics_scan.
///
/// Takes a config and a request, fetches and resamples the data, writes it out, and returns the
/// path of the output file. `progress` is called with the completed fraction for the long
/// requests.
pub fn process(
    config: &Config,
    request: &Request,
    progress: &mut dyn FnMut(f32),
) -> Result<PathBuf, ProcessorError> {
    let offset = config.time_offset()?;
    let catalog = load_catalog(config, offset)?;
    let mut cache = HandleCache::new();
    let deployment = config.deployment.as_str();

    match request {
        Request::AcCurrent { wedge, window } => {
            let archive = FileArchive::new(&config.archive_path, offset)?;
            let fetch = resolve_window(window, catalog.as_ref(), offset)?;
            let series = ac_current_series(
                &archive,
                &mut cache,
                wedge,
                deployment,
                fetch,
                config.bin_width()?,
            )?;
            let name = format!("ac_{}", wedge);
            let label = window_label(config, window, &fetch, offset);
            let mut writer = open_writer(config, &format!("{name}_{label}"))?;
            writer.write_binned_series(&name, &series)?;
            Ok(writer.close()?)
        }
        Request::BeamCurrent { window } => {
            let archive = FileArchive::new(&config.archive_path, offset)?;
            let fetch = resolve_window(window, catalog.as_ref(), offset)?;
            let pv = config.beam_current_pv.as_str();
            let grid = Grid::new(fetch.start, fetch.duration, config.bin_width()?)?;
            let series = fetch_samples(&archive, &mut cache, pv, deployment, fetch)?;
            let binned = BinnedSeries::new(pv, CURRENT_UNIT, &series, grid);
            let mut record = BeamRecord::new(pv, deployment, fetch.start);
            record.append(&series);
            let label = window_label(config, window, &fetch, offset);
            let mut writer = open_writer(config, &format!("beam_current_{label}"))?;
            writer.write_binned_series("beam_current", &binned)?;
            writer.write_record(&record)?;
            Ok(writer.close()?)
        }
        Request::TagmRate { column, window } => {
            let archive = FileArchive::new(&config.archive_path, offset)?;
            let fetch = resolve_window(window, catalog.as_ref(), offset)?;
            let series = tagm_rate_series(
                &archive,
                &mut cache,
                *column,
                deployment,
                fetch,
                config.bin_width()?,
            )?;
            let name = format!("tagm_{}", column.number());
            let label = window_label(config, window, &fetch, offset);
            let mut writer = open_writer(config, &format!("{name}_{label}"))?;
            writer.write_binned_series(&name, &series)?;
            Ok(writer.close()?)
        }
        Request::TagmEnergy { window } => {
            let archive = FileArchive::new(&config.archive_path, offset)?;
            let fetch = resolve_window(window, catalog.as_ref(), offset)?;
            let series = tagm_energy_series(
                &archive,
                &mut cache,
                deployment,
                fetch,
                &config.most_probable,
                progress,
            )?;
            let label = window_label(config, window, &fetch, offset);
            let mut writer = open_writer(config, &format!("tagm_rates_{label}"))?;
            writer.write_column_series("tagm_rates", &series)?;
            Ok(writer.close()?)
        }
        Request::BeamRecord { until } => {
            let archive = FileArchive::new(&config.archive_path, offset)?;
            let until = match until {
                Some(s) => EpicsTime::parse(s, offset)?,
                None => EpicsTime::from_datetime(time::OffsetDateTime::now_utc())?,
            };
            let windows = month_windows(config.record_first_year, until, offset)?;
            let record = beam_current_record(
                &archive,
                &mut cache,
                &config.beam_current_pv,
                &config.record_deployment,
                &windows,
                progress,
            )?;
            spdlog::info!(
                "Collected {} samples over {} months",
                record.len(),
                windows.len()
            );
            let mut writer = open_writer(config, "beam_current_record")?;
            writer.write_record(&record)?;
            Ok(writer.close()?)
        }
        Request::BeamlineScan => {
            let catalog = catalog.ok_or(ProcessorError::NoRunCatalog(config.first_run_number))?;
            let spans = scan_settings(
                &catalog,
                config.first_run_number,
                config.last_run_number,
                &config.beamline_conditions,
                config.missing_policy,
            )?;
            for span in spans.iter() {
                spdlog::info!("{}", span);
            }
            progress(1.0);
            write_spans(config, &spans)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::historian::MemoryHistorian;
    use crate::sample::Sample;
    use crate::error::GridError;
    use approx::assert_relative_eq;

    const T0: f64 = 1_543_658_400.0; // 2018-12-01 10:00:00 UTC

    fn series(points: &[(f64, f64)]) -> SampleSeries {
        SampleSeries::new(
            points
                .iter()
                .map(|(t, v)| Sample::new(EpicsTime::from_seconds(T0 + t), *v))
                .collect(),
        )
        .unwrap()
    }

    fn catalog() -> RunCatalog {
        RunCatalog::from_yaml_str(
            "
runs:
  - number: 51644
    start_time: 2018-12-01 10:00:00
    end_time: 2018-12-01 10:00:05
    conditions:
      beam_on_current: 300.0
",
            UtcOffset::UTC,
        )
        .unwrap()
    }

    #[test]
    fn test_ac_current_over_run() {
        let mut historian = MemoryHistorian::new();
        historian.insert(
            "IOCHDCOL:VMICADC4_2",
            "ops",
            series(&[(-10.0, 10.0), (2.5, 20.0), (30.0, 99.0)]),
        );
        let window =
            resolve_window(&WindowRequest::Run(51644), Some(&catalog()), UtcOffset::UTC).unwrap();
        let mut cache = HandleCache::new();
        let wedge: AcWedge = "oy-".parse().unwrap();
        let binned =
            ac_current_series(&historian, &mut cache, &wedge, "ops", window, 1.0).unwrap();
        assert_eq!(binned.values, vec![10.0, 10.0, 10.0, 20.0, 20.0]);
        assert_eq!(binned.unit, "nA");
    }

    #[test]
    fn test_run_without_catalog() {
        let result = resolve_window::<RunCatalog>(&WindowRequest::Run(1), None, UtcOffset::UTC);
        assert!(matches!(result, Err(ProcessorError::NoRunCatalog(1))));
    }

    #[test]
    fn test_energy_series_reuses_handles() {
        let mut historian = MemoryHistorian::new();
        for column in TagmColumn::all() {
            let rate = 100.0 * column.number() as f64;
            historian.insert(&column.pv_name(), "ops", series(&[(0.0, rate), (50.0, rate)]));
        }
        let mut cache = HandleCache::new();
        let window = FetchWindow::new(EpicsTime::from_seconds(T0), 100.0);
        let params = MostProbableParams::default();
        let mut last_progress = 0.0;
        let rates = tagm_energy_series(
            &historian,
            &mut cache,
            "ops",
            window,
            &params,
            &mut |p| last_progress = p,
        )
        .unwrap();
        assert_eq!(rates.columns.len(), TAGM_COLUMNS as usize);
        assert_relative_eq!(rates.values[19], 2000.0, max_relative = 0.03);
        assert_eq!(last_progress, 1.0);

        tagm_energy_series(&historian, &mut cache, "ops", window, &params, &mut |_| ()).unwrap();
        assert_eq!(historian.lookup_count(), TAGM_COLUMNS as usize);
    }

    #[test]
    fn test_missing_column_propagates() {
        let historian = MemoryHistorian::new();
        let mut cache = HandleCache::new();
        let window = FetchWindow::new(EpicsTime::from_seconds(T0), 0.0);
        let result = tagm_rate_series(
            &historian,
            &mut cache,
            TagmColumn::new(20).unwrap(),
            "ops",
            window,
            1.0,
        );
        assert!(matches!(
            result,
            Err(ProcessorError::HistorianError(HistorianError::UnknownChannel(_, _)))
        ));
    }

    #[test]
    fn test_month_windows_cross_years() {
        let until = EpicsTime::parse("2016-02-10 00:00:00", UtcOffset::UTC).unwrap();
        let windows = month_windows(2015, until, UtcOffset::UTC).unwrap();
        assert_eq!(windows.len(), 14);
        assert_eq!(
            windows[0].start.format(UtcOffset::UTC).unwrap(),
            "2015-01-01 00:00:00"
        );
        assert_eq!(windows[0].duration, 31.0 * 86400.0);
        assert_eq!(windows[1].duration, 28.0 * 86400.0);
        assert_eq!(
            windows[12].start.format(UtcOffset::UTC).unwrap(),
            "2016-01-01 00:00:00"
        );
        assert_eq!(windows[13].duration, 29.0 * 86400.0);
    }

    #[test]
    fn test_beam_record_rows() {
        let mut historian = MemoryHistorian::new();
        historian.insert("IBCAD00CRCUR6", "history", series(&[(0.0, 5.0), (10.0, 6.0)]));
        let mut cache = HandleCache::new();
        let start = EpicsTime::from_seconds(T0);
        let windows = [
            FetchWindow::new(start, 5.0),
            FetchWindow::new(start.add_seconds(5.0), 10.0),
        ];
        let record = beam_current_record(
            &historian,
            &mut cache,
            "IBCAD00CRCUR6",
            "history",
            &windows,
            &mut |_| (),
        )
        .unwrap();
        assert_eq!(record.time_s, vec![0.0, 5.0, 10.0]);
        assert_eq!(record.values, vec![5.0, 5.0, 6.0]);
    }

    /// Archive, catalog and output directory for a full run of `process`
    fn make_workspace(tag: &str) -> (PathBuf, Config) {
        let root = std::env::temp_dir().join(format!("epics_scan_process_{tag}_{}", std::process::id()));
        let ops = root.join("archive").join("ops");
        let out = root.join("out");
        std::fs::create_dir_all(&ops).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(
            ops.join("IOCHDCOL:VMICADC4_2.csv"),
            "2018-12-01 09:59:50,10.0\n2018-12-01 10:00:02.5,20.0\n2018-12-01 10:00:30,99.0\n",
        )
        .unwrap();
        std::fs::write(
            root.join("runs.yml"),
            "
runs:
  - number: 51644
    start_time: 2018-12-01 10:00:00
    end_time: 2018-12-01 10:00:05
    conditions:
      beam_on_current: 300.0
      polarimeter_converter: Be 75um
      collimator_diameter: 5.0
  - number: 51645
    start_time: 2018-12-01 11:00:00
    end_time: 2018-12-01 12:00:00
    conditions:
      polarimeter_converter: Be 75um
      collimator_diameter: 5.0
  - number: 51646
    start_time: 2018-12-01 12:00:00
    end_time: 2018-12-01 13:00:00
    conditions:
      polarimeter_converter: Be 750um
      collimator_diameter: 3.4
",
        )
        .unwrap();
        let config = Config {
            archive_path: root.join("archive"),
            run_catalog_path: Some(root.join("runs.yml")),
            hdf_path: out,
            first_run_number: 51644,
            last_run_number: 51646,
            ..Config::default()
        };
        (root, config)
    }

    #[test]
    fn test_process_ac_current_run() {
        let (root, config) = make_workspace("ac");
        let request = Request::AcCurrent {
            wedge: "oy-".parse().unwrap(),
            window: WindowRequest::Run(51644),
        };
        let path = process(&config, &request, &mut |_| ()).unwrap();
        assert_eq!(path, config.hdf_path.join("ac_oy-_run_051644.h5"));
        assert!(path.exists());

        let file = hdf5::File::open(&path).unwrap();
        let values = file
            .dataset("series/ac_oy-")
            .unwrap()
            .read_1d::<f64>()
            .unwrap()
            .to_vec();
        assert_eq!(values, vec![10.0, 10.0, 10.0, 20.0, 20.0]);
        drop(file);
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_process_beamline_scan() {
        let (root, config) = make_workspace("beamline");
        let mut last_progress = 0.0;
        let path = process(&config, &Request::BeamlineScan, &mut |p| last_progress = p).unwrap();
        assert_eq!(path, config.hdf_path.join("beamline_51644_51646.yml"));
        assert_eq!(last_progress, 1.0);

        let spans: Vec<SettingSpan> =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].first_run, spans[0].last_run), (51644, 51645));
        assert_eq!((spans[1].first_run, spans[1].last_run), (51646, 51646));
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_process_rejects_huge_grid() {
        let (root, mut config) = make_workspace("huge");
        config.bin_width_s = 1e-300;
        let request = Request::AcCurrent {
            wedge: "oy-".parse().unwrap(),
            window: WindowRequest::Run(51645),
        };
        assert!(matches!(
            process(&config, &request, &mut |_| ()),
            Err(ProcessorError::GridError(GridError::TooManyBins(_)))
        ));
        std::fs::remove_dir_all(root).unwrap();
    }
}
