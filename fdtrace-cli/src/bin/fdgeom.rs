//! fdgeom: write and inspect FD geometry files.
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand};
use env_logger::Env;
use fdtrace_core::{SiteGeometry, SiteId};
use fdtrace_io::{load_geometry, save_geometry};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    FdtraceIo(#[from] fdtrace_io::Error),

    #[error("{0}")]
    Core(#[from] fdtrace_core::Error),

    #[error("unknown site {0:?} (expected br, lr or md)")]
    UnknownSite(String),
}

/// Write and inspect Telescope Array FD geometry files.
#[derive(Parser)]
#[command(name = "fdgeom")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an ideal geometry (format chosen by extension: .json or binary)
    Nominal {
        /// Output geometry file
        output: PathBuf,

        /// Station code (br, lr, md)
        #[arg(long, default_value = "br")]
        site: String,

        /// Geometry vintage identifier
        #[arg(long, default_value_t = 1)]
        uniq_id: u32,

        /// Number of mirrors
        #[arg(long, default_value_t = 12)]
        mirrors: usize,
    },

    /// Show a summary of a geometry file
    Info {
        /// Input geometry file
        input: PathBuf,
    },
}

fn print_info(geometry: &SiteGeometry) {
    println!("Site: {} ({})", geometry.site(), geometry.site().code());
    println!(
        "Vintage: {}{}",
        geometry.uniq_id(),
        if geometry.flips_camera_y() {
            " (legacy camera y axis)"
        } else {
            ""
        }
    );
    println!("Mirrors: {}", geometry.mirror_count());
    for (i, mirror) in geometry.mirrors().iter().enumerate() {
        let spots: Vec<String> = mirror
            .segments()
            .iter()
            .map(|s| format!("{:.3}", s.spot_deg))
            .collect();
        println!(
            "  mirror {:2}: ring {}, R = {:.3} m, camera z = {:.3} m, {} segments",
            i,
            mirror.ring(),
            mirror.rcurve(),
            mirror.camera_z(),
            mirror.segment_count()
        );
        println!("    SSPs: {}", spots.join(" "));
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Nominal {
            output,
            site,
            uniq_id,
            mirrors,
        } => {
            let site = SiteId::from_code(&site).ok_or(CliError::UnknownSite(site))?;
            let geometry = SiteGeometry::nominal(site, uniq_id, mirrors)?;
            save_geometry(&output, &geometry)?;
            info!(
                "Wrote nominal {} geometry ({} mirrors) to {}",
                site,
                mirrors,
                output.display()
            );
        }
        Commands::Info { input } => {
            let geometry = load_geometry(&input)?;
            print_info(&geometry);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
