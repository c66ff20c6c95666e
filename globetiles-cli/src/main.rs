//! GlobeTiles CLI - Command-line interface
//!
//! This binary queries the globetiles elevation model and manages its
//! configuration and file store.

mod commands;
mod error;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::common::{load_config, start_logging};
use commands::compose::ComposeArgs;
use commands::config::ConfigCommands;
use commands::elevation::ElevationArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "globetiles")]
#[command(version = globetiles::VERSION)]
#[command(about = "Tiled elevation data for virtual globes", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.globetiles/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Look up the elevation of one location
    Elevation {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Target resolution in arc-seconds (default: finest level)
        #[arg(long)]
        resolution: Option<f64>,

        /// Seconds to wait for each round of tile arrivals
        #[arg(long, default_value = "30")]
        wait_secs: u64,
    },

    /// Compose a grid of elevations over a sector, fetching synchronously
    Compose {
        #[arg(long, allow_hyphen_values = true)]
        min_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        min_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lon: f64,

        /// Samples along each axis
        #[arg(long, default_value = "64")]
        samples: u32,

        /// CSV output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Manage the on-disk tile store
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let command = match cli.command {
        Commands::Config { command } => {
            return commands::config::run(command, cli.config.as_deref());
        }
        other => other,
    };

    let config = load_config(cli.config.as_deref())?;
    let _logging = start_logging(&config);

    match command {
        Commands::Elevation {
            lat,
            lon,
            resolution,
            wait_secs,
        } => commands::elevation::run(
            &config,
            ElevationArgs {
                lat,
                lon,
                resolution_arcsec: resolution,
                wait: Duration::from_secs(wait_secs),
            },
        ),
        Commands::Compose {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
            samples,
            output,
        } => commands::compose::run(
            &config,
            ComposeArgs {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
                samples,
                output,
            },
        ),
        Commands::Cache { action } => commands::cache::run(&config, action),
        Commands::Config { .. } => Ok(()), // handled before loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "globetiles",
            "elevation",
            "--lat",
            "-33.9",
            "--lon",
            "-70.5",
        ])
        .unwrap();

        match cli.command {
            Commands::Elevation {
                lat, lon, wait_secs, ..
            } => {
                assert_eq!(lat, -33.9);
                assert_eq!(lon, -70.5);
                assert_eq!(wait_secs, 30);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from([
            "globetiles",
            "cache",
            "list",
            "--config",
            "/tmp/globetiles.ini",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/globetiles.ini")));
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::List
            }
        ));
    }

    #[test]
    fn test_compose_requires_bounds() {
        assert!(Cli::try_parse_from(["globetiles", "compose", "--min-lat", "1"]).is_err());
    }
}
