//! # epics_scan_cli
//!
//! Part of the epics_scan crate family.
//!
//! Command line front end for fetching and resampling EPICS archive data.
//!
//! ## Use
//!
//! ```bash
//! epics_scan_cli -p config.yml new
//! epics_scan_cli -p config.yml ac --wedge oy- --start "2018-09-01 00:00:00" --duration 1e7
//! epics_scan_cli -p config.yml beam --run 51644
//! epics_scan_cli -p config.yml tagm --column 20 --run 51644
//! epics_scan_cli -p config.yml escan --run 51644
//! epics_scan_cli -p config.yml record --until "2024-11-15 00:00:00"
//! epics_scan_cli -p config.yml beamline
//! ```
//!
//! Output is written to the `hdf_path` directory of the configuration and the log is written to
//! `./epics_scan.log`.
use clap::{value_parser, Arg, ArgMatches, Command};
use indicatif::ProgressBar;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libepics_scan::channels::{AcWedge, TagmColumn};
use libepics_scan::config::Config;
use libepics_scan::process::{process, Request, WindowRequest};

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

/// Loggers writing to ./epics_scan.log, one also echoing to the terminal and one silent there
struct Loggers {
    terminal: Arc<spdlog::Logger>,
    file_only: Arc<spdlog::Logger>,
}

/// Log to the terminal and to ./epics_scan.log
fn init_logging() -> Result<Loggers, spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./epics_scan.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let stdout_sink = Arc::new(
        spdlog::sink::StdStreamSink::builder()
            .std_stream(spdlog::sink::StdStream::Stdout)
            .build()?,
    );
    let terminal = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink.clone())
            .sink(stdout_sink)
            .build()?,
    );
    let file_only = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(terminal.clone());
    Ok(Loggers {
        terminal,
        file_only,
    })
}

/// Run `f` with terminal logging off, so that log lines do not tear through a progress bar.
/// Everything still goes to the log file.
fn with_quiet_terminal<T>(loggers: &Loggers, f: impl FnOnce() -> T) -> T {
    spdlog::set_default_logger(loggers.file_only.clone());
    let result = f();
    spdlog::set_default_logger(loggers.terminal.clone());
    result
}

/// Arguments selecting a time window
fn with_window_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("run")
            .long("run")
            .value_parser(value_parser!(u32))
            .conflicts_with("start")
            .help("Use the full length of this run"),
    )
    .arg(
        Arg::new("start")
            .long("start")
            .help("Start of the window, as \"YYYY-MM-DD HH:MM:SS\""),
    )
    .arg(
        Arg::new("duration")
            .long("duration")
            .value_parser(value_parser!(f64))
            .requires("start")
            .help("Length of the window in seconds"),
    )
}

fn parse_window(matches: &ArgMatches, default_duration: Option<f64>) -> Result<WindowRequest, String> {
    if let Some(run) = matches.get_one::<u32>("run") {
        return Ok(WindowRequest::Run(*run));
    }
    let start = matches
        .get_one::<String>("start")
        .ok_or_else(|| String::from("Either --run or --start is required"))?;
    let duration = matches
        .get_one::<f64>("duration")
        .copied()
        .or(default_duration)
        .ok_or_else(|| String::from("--duration is required with --start"))?;
    Ok(WindowRequest::Span {
        start: start.clone(),
        duration,
    })
}

fn parse_request(matches: &ArgMatches) -> Result<Request, String> {
    match matches.subcommand() {
        Some(("ac", sub)) => {
            let wedge = sub
                .get_one::<String>("wedge")
                .ok_or_else(|| String::from("--wedge is required"))?
                .parse::<AcWedge>()
                .map_err(|e| e.to_string())?;
            Ok(Request::AcCurrent {
                wedge,
                window: parse_window(sub, None)?,
            })
        }
        Some(("beam", sub)) => Ok(Request::BeamCurrent {
            window: parse_window(sub, None)?,
        }),
        Some(("tagm", sub)) => {
            let column = sub
                .get_one::<u32>("column")
                .ok_or_else(|| String::from("--column is required"))?;
            Ok(Request::TagmRate {
                column: TagmColumn::new(*column).map_err(|e| e.to_string())?,
                window: parse_window(sub, None)?,
            })
        }
        Some(("escan", sub)) => Ok(Request::TagmEnergy {
            window: parse_window(sub, Some(0.0))?,
        }),
        Some(("record", sub)) => Ok(Request::BeamRecord {
            until: sub.get_one::<String>("until").cloned(),
        }),
        Some(("beamline", _)) => Ok(Request::BeamlineScan),
        _ => Err(String::from("No command given; see --help")),
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("epics_scan_cli")
        .arg_required_else_help(true)
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .global(true)
                .help("Path to the configuration file"),
        )
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(with_window_args(
            Command::new("ac")
                .about("Resample the current on one active collimator wedge")
                .arg(
                    Arg::new("wedge")
                        .long("wedge")
                        .required(true)
                        .help("Wedge as [io][xy][+-], e.g. oy-"),
                ),
        ))
        .subcommand(with_window_args(
            Command::new("beam").about("Fetch and resample the electron beam current"),
        ))
        .subcommand(with_window_args(
            Command::new("tagm")
                .about("Resample the scaler rate of one TAGM column")
                .arg(
                    Arg::new("column")
                        .long("column")
                        .required(true)
                        .value_parser(value_parser!(u32))
                        .help("TAGM column, 1 to 102"),
                ),
        ))
        .subcommand(with_window_args(
            Command::new("escan")
                .about("Most probable rate of every TAGM column (snapshot if no duration)"),
        ))
        .subcommand(
            Command::new("record")
                .about("Collect the monthly beam current record")
                .arg(
                    Arg::new("until")
                        .long("until")
                        .help("Last time to include, as \"YYYY-MM-DD HH:MM:SS\" (default now)"),
                ),
        )
        .subcommand(
            Command::new("beamline")
                .about("List run spans with the same converter and collimator settings"),
        )
        .get_matches();

    // Initialize feedback
    let loggers = match init_logging() {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Could not create logging: {e}");
            return;
        }
    };

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            spdlog::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => spdlog::info!("Done."),
            Err(e) => spdlog::error!("Could not write template config: {e}"),
        }
        return;
    }

    let request = match parse_request(&matches) {
        Ok(r) => r,
        Err(e) => {
            spdlog::error!("{e}");
            return;
        }
    };

    // Load our config
    spdlog::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("{e}");
            return;
        }
    };
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("Archive Path: {}", config.archive_path.to_string_lossy());
    spdlog::info!("HDF5 Path: {}", config.hdf_path.to_string_lossy());
    match &config.run_catalog_path {
        Some(p) => spdlog::info!("Run Catalog Path: {}", p.to_string_lossy()),
        None => spdlog::info!("Run Catalog Path: None"),
    }
    spdlog::info!("Deployment: {}", config.deployment);
    spdlog::info!("Request: {:?}", request);

    spdlog::info!("Processing... (details in ./epics_scan.log)");
    let pb = ProgressBar::new(100);
    let result = with_quiet_terminal(&loggers, || {
        process(&config, &request, &mut |frac| {
            pb.set_position((frac * 100.0) as u64)
        })
    });
    pb.finish();

    match result {
        Ok(path) => {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            spdlog::info!(
                "Wrote {} ({})",
                path.to_string_lossy(),
                human_bytes::human_bytes(size as f64)
            );
        }
        Err(e) => spdlog::error!("Processing failed with error: {e}"),
    }

    spdlog::info!("Done.");
}
