//! localpoint: trace point-source rays through one FD mirror and camera.
//!
//! Records of rays reaching the camera face go to the output destination;
//! everything else (run parameters, toggles, summary) goes to stderr.
#![allow(clippy::cast_precision_loss)]

use clap::{ArgAction, CommandFactory, Parser};
use env_logger::Env;
use fdtrace_core::run::DEFAULT_RAYS;
use fdtrace_core::{
    OpticalCalibration, OutputTarget, RefocusParams, RunConfig, SegmentDeflection,
    SegmentOverrides,
};
use fdtrace_io::{load_calibration, load_geometry, RecordWriter};
use fdtrace_optics::{apply_segment_overrides, refocus_segments, resolve_thread_count, RayTraceEngine};
use log::{error, info};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    FdtraceIo(#[from] fdtrace_io::Error),

    #[error("{0}")]
    Core(#[from] fdtrace_core::Error),

    #[error("bad {flag} argument {value:?}: {reason}")]
    Usage {
        flag: &'static str,
        value: String,
        reason: String,
    },
}

/// Multi-letter flags accepted with a single leading dash.
const LEGACY_FLAGS: [&str; 15] = [
    "geo", "mir", "rays", "xy", "dz", "seg", "ssp", "segssp", "refocus", "banana", "segr",
    "screen", "calib", "seed", "threads",
];

/// Trace point-source rays onto a Telescope Array FD camera.
#[derive(Parser, Debug)]
#[command(name = "localpoint")]
#[command(author, version, about, long_about = None)]
#[command(args_override_self = true)]
struct Cli {
    /// Input geometry file (default: $RTDATA/fdgeom/geobr.json)
    #[arg(long = "geo", value_name = "FILE")]
    geo: Option<PathBuf>,

    /// Record rays on mirror M
    #[arg(long = "mir", value_name = "M", default_value_t = 0)]
    mir: usize,

    /// Output text file name; NULL writes to standard output
    #[arg(short = 'o', value_name = "FILE", default_value = "out.txt")]
    output: String,

    /// Trace N rays
    #[arg(long = "rays", value_name = "N", default_value_t = DEFAULT_RAYS)]
    rays: u64,

    /// Source is X meters LEFT of screen center and Y meters UP
    #[arg(
        long = "xy",
        num_args = 2,
        value_names = ["X", "Y"],
        allow_negative_numbers = true
    )]
    xy: Option<Vec<f64>>,

    /// Source is Z meters FARTHER from the mirror than the screen
    #[arg(long = "dz", value_name = "Z", allow_negative_numbers = true)]
    dz: Option<f64>,

    /// Deflect segment S by AZ degrees right and ALT degrees up (repeatable)
    #[arg(
        long = "seg",
        num_args = 3,
        value_names = ["S", "AZ", "ALT"],
        action = ArgAction::Append,
        allow_negative_numbers = true
    )]
    seg: Vec<String>,

    /// Override the spot-size parameter of every segment (degrees)
    #[arg(long = "ssp", value_name = "DEG")]
    ssp: Option<f64>,

    /// Override the spot-size parameter of segment S (degrees, repeatable)
    #[arg(
        long = "segssp",
        num_args = 2,
        value_names = ["S", "DEG"],
        action = ArgAction::Append
    )]
    segssp: Vec<String>,

    /// Rebuild segment centres of curvature before tracing
    #[arg(long = "refocus")]
    refocus: bool,

    /// Focus offset for refocusing (meters; implies -refocus)
    #[arg(long = "banana", value_name = "M", allow_negative_numbers = true)]
    banana: Option<f64>,

    /// Segment curvature radius for refocusing (meters; implies -refocus)
    #[arg(long = "segr", value_name = "M")]
    segr: Option<f64>,

    /// Model a paper screen taped over an open camera window
    #[arg(long = "screen")]
    screen: bool,

    /// JSON calibration override file
    #[arg(long = "calib", value_name = "FILE")]
    calib: Option<PathBuf>,

    /// Base random seed
    #[arg(long = "seed", value_name = "SEED", default_value_t = fdtrace_core::run::DEFAULT_SEED)]
    seed: u64,

    /// Worker threads (0 = one per hardware thread)
    #[arg(long = "threads", value_name = "N", default_value_t = 1)]
    threads: usize,
}

/// Rewrites `-geo`-style flags to their `--geo` spelling, leaving values
/// such as `-0.5` untouched.
fn normalize_legacy_flags<I: IntoIterator<Item = OsString>>(args: I) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some(s) if s.len() > 2 && s.starts_with('-') && LEGACY_FLAGS.contains(&&s[1..]) => {
                OsString::from(format!("-{s}"))
            }
            _ => arg,
        })
        .collect()
}

fn default_geometry_path() -> PathBuf {
    match std::env::var_os("RTDATA") {
        Some(root) => PathBuf::from(root).join("fdgeom").join("geobr.json"),
        None => PathBuf::from("geobr.json"),
    }
}

fn parse_value<T: std::str::FromStr>(flag: &'static str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| CliError::Usage {
        flag,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl Cli {
    fn overrides(&self) -> Result<SegmentOverrides> {
        let mut overrides = SegmentOverrides::new();
        for triple in self.seg.chunks(3) {
            let [s, az, alt] = triple else {
                continue;
            };
            let index: usize = parse_value("-seg", s)?;
            let deflection =
                SegmentDeflection::new(parse_value("-seg", az)?, parse_value("-seg", alt)?);
            overrides.set_deflection(index, deflection)?;
        }
        if let Some(spot) = self.ssp {
            overrides.set_global_spot(spot)?;
        }
        for pair in self.segssp.chunks(2) {
            let [s, deg] = pair else {
                continue;
            };
            overrides.set_spot(parse_value("-segssp", s)?, parse_value("-segssp", deg)?)?;
        }
        Ok(overrides)
    }

    fn refocus(&self) -> Option<RefocusParams> {
        (self.refocus || self.banana.is_some() || self.segr.is_some()).then_some(RefocusParams {
            banana_error: self.banana,
            segment_rcurve: self.segr,
        })
    }

    fn run_config(&self) -> Result<RunConfig> {
        let mut config = RunConfig::new()
            .with_mirror(self.mir)
            .with_rays(self.rays)
            .with_overrides(self.overrides()?)
            .with_seed(self.seed)
            .with_threads(resolve_thread_count(self.threads))
            .with_output(OutputTarget::from_arg(&self.output));
        if let Some(xy) = &self.xy {
            config = config.with_source_xy(xy[0], xy[1]);
        }
        if let Some(dz) = self.dz {
            config = config.with_source_dz(dz);
        }
        if let Some(params) = self.refocus() {
            config = config.with_refocus(params);
        }
        config.validate()?;
        Ok(config)
    }

    fn calibration(&self) -> Result<OpticalCalibration> {
        let mut calib = OpticalCalibration::ta_defaults();
        if let Some(path) = &self.calib {
            calib = load_calibration(path, calib)?;
            info!("Calibration overrides from {}", path.display());
        }
        if self.screen {
            calib = calib.with_screen();
            info!("Screen mode: cover refraction and filter disabled");
        }
        Ok(calib)
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.run_config()?;
    let calib = cli.calibration()?;
    let geo_path = cli.geo.clone().unwrap_or_else(default_geometry_path);

    info!("Run parameters:");
    info!("Using mirror {} from geometry {}", config.mirror, geo_path.display());
    info!(
        "Emitting {} rays from ( {:.6}, {:.6}, {:.6} )",
        config.rays, config.source.x, config.source.y, config.source.z
    );
    info!("Writing to {}", config.output);
    info!("Raytrace toggles active: {}", calib.toggles);

    let mut geometry = load_geometry(&geo_path)?;
    let mirror = geometry.mirror(config.mirror)?;
    let spots: Vec<String> = mirror
        .segments()
        .iter()
        .map(|s| format!("{:.3}", s.spot_deg))
        .collect();
    info!("Original SSPs: {}", spots.join(" "));

    if let Some(params) = config.refocus {
        refocus_segments(&mut geometry, config.mirror, params)?;
    }
    if !config.overrides.is_empty() {
        let changed = apply_segment_overrides(&mut geometry, config.mirror, &config.overrides)?;
        info!("Modified {changed} segment(s) of mirror {}", config.mirror);
    }

    let engine = RayTraceEngine::new(&geometry, &calib, &config)?;
    let mut writer = RecordWriter::open(&config.output)?;
    info!("Tracing with {} worker(s), seed {}", engine.threads(), config.seed);

    let start = Instant::now();
    let stats = engine.run(config.rays, &mut writer)?;
    let elapsed = start.elapsed().as_secs_f64();
    stats.log_summary();
    info!(
        "Finished in {:.2} s ({:.0} rays/s)",
        elapsed,
        stats.rays_traced as f64 / elapsed.max(1e-9)
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<OsString> = std::env::args_os().collect();
    if args.len() <= 1 {
        eprintln!("{}", Cli::command().render_help());
        return ExitCode::FAILURE;
    }

    let cli = match Cli::try_parse_from(normalize_legacy_flags(args)) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        let argv = std::iter::once("localpoint")
            .chain(args.iter().copied())
            .map(OsString::from);
        Cli::try_parse_from(normalize_legacy_flags(argv))
    }

    #[test]
    fn test_normalize_keeps_values() {
        let out = normalize_legacy_flags(
            ["localpoint", "-xy", "-0.5", "0.2", "-o", "NULL", "--rays", "10"].map(OsString::from),
        );
        let out: Vec<&str> = out.iter().map(|s| s.to_str().unwrap()).collect();
        assert_eq!(
            out,
            ["localpoint", "--xy", "-0.5", "0.2", "-o", "NULL", "--rays", "10"]
        );
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["-mir", "0"]).unwrap();
        let config = cli.run_config().unwrap();
        assert_eq!(config.rays, DEFAULT_RAYS);
        assert_eq!(config.output, OutputTarget::File(PathBuf::from("out.txt")));
        assert_eq!(config.seed, 1);
        assert_eq!(config.threads, 1);
        assert!(config.refocus.is_none());
        assert!((config.source.z + 3.110).abs() < 1e-12);
    }

    #[test]
    fn test_source_and_output() {
        let cli = parse(&["-xy", "-0.25", "0.1", "-dz", "-0.5", "-o", "NULL"]).unwrap();
        let config = cli.run_config().unwrap();
        assert!((config.source.x + 0.25).abs() < 1e-12);
        assert!((config.source.y - 0.1).abs() < 1e-12);
        assert!((config.source.z + 3.610).abs() < 1e-12);
        assert_eq!(config.output, OutputTarget::Stdout);
    }

    #[test]
    fn test_repeated_flag_takes_last_value() {
        let cli = parse(&[
            "-xy", "0.1", "0.2", "-xy", "-0.3", "0.4", "-dz", "0.1", "-dz", "0.2", "-rays", "5",
            "-rays", "7",
        ])
        .unwrap();
        let config = cli.run_config().unwrap();
        assert!((config.source.x + 0.3).abs() < 1e-12);
        assert!((config.source.y - 0.4).abs() < 1e-12);
        assert!((config.source.z + 2.910).abs() < 1e-12);
        assert_eq!(config.rays, 7);
    }

    #[test]
    fn test_segment_flags() {
        let cli = parse(&[
            "-seg", "3", "0.5", "-0.25", "-seg", "17", "1", "1", "-ssp", "0.2", "-segssp", "4",
            "0.05",
        ])
        .unwrap();
        let config = cli.run_config().unwrap();
        let o = &config.overrides;
        assert_eq!(o.deflection(3), SegmentDeflection::new(0.5, -0.25));
        assert_eq!(o.deflection(17), SegmentDeflection::new(1.0, 1.0));
        assert_eq!(o.spot(4), Some(0.05));
        assert_eq!(o.spot(5), Some(0.2));
    }

    #[test]
    fn test_segment_index_out_of_range() {
        let cli = parse(&["-seg", "18", "0.5", "0.5"]).unwrap();
        assert!(matches!(cli.run_config(), Err(CliError::Core(_))));
        let cli = parse(&["-seg", "x", "0.5", "0.5"]).unwrap();
        assert!(matches!(cli.run_config(), Err(CliError::Usage { flag: "-seg", .. })));
    }

    #[test]
    fn test_refocus_implied() {
        let cli = parse(&["-banana", "0.05"]).unwrap();
        let params = cli.refocus().unwrap();
        assert_eq!(params.banana_error, Some(0.05));
        assert_eq!(params.segment_rcurve, None);
        assert!(parse(&["-refocus"]).unwrap().refocus().is_some());
        assert!(parse(&["-rays", "5"]).unwrap().refocus().is_none());
    }

    #[test]
    fn test_unrecognized_flag_rejected() {
        assert!(parse(&["-bogus", "1"]).is_err());
        assert!(parse(&["-xy", "0.1"]).is_err());
    }

    #[test]
    fn test_screen_calibration() {
        let calib = parse(&["-screen"]).unwrap().calibration().unwrap();
        assert_eq!(calib.filter.thickness, 0.0);
    }
}
