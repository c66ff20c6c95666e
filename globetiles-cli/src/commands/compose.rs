//! Blocking grid composition.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use globetiles::config::ConfigFile;
use globetiles::geo::{LatLon, Sector};
use tracing::info;

use super::common::open_elevation_model;
use crate::error::CliError;

/// Arguments of `globetiles compose`.
#[derive(Debug, Clone)]
pub struct ComposeArgs {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    /// Samples per axis
    pub samples: u32,
    pub output: Option<PathBuf>,
}

/// Compose a regular grid of elevations over a sector and emit it as CSV.
pub fn run(config: &ConfigFile, args: ComposeArgs) -> Result<(), CliError> {
    if args.samples < 2 {
        return Err(CliError::InvalidArgument(format!(
            "samples must be at least 2, got {}",
            args.samples
        )));
    }
    let sector = Sector::new(args.min_lat, args.max_lat, args.min_lon, args.max_lon)
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;

    let points = grid_points(&sector, args.samples);
    let session = open_elevation_model(config)?;
    let mut elevations = vec![session.model.missing_data_replacement(); points.len()];
    session
        .model
        .compose_elevations(&sector, &points, args.samples, &mut elevations)?;

    let csv = to_csv(&points, &elevations);
    match args.output {
        Some(path) => {
            fs::write(&path, csv).map_err(|error| CliError::FileWrite {
                path: path.display().to_string(),
                error,
            })?;
            info!(path = %path.display(), points = points.len(), "Wrote composed grid");
            println!("Wrote {} samples to {}", points.len(), path.display());
        }
        None => print!("{}", csv),
    }
    Ok(())
}

/// Row-major grid from the north-west corner, `samples` per axis.
fn grid_points(sector: &Sector, samples: u32) -> Vec<LatLon> {
    let steps = f64::from(samples - 1);
    let mut points = Vec::with_capacity((samples * samples) as usize);
    for row in 0..samples {
        let lat = sector.max_lat() - sector.delta_lat() * f64::from(row) / steps;
        for col in 0..samples {
            let lon = sector.min_lon() + sector.delta_lon() * f64::from(col) / steps;
            points.push(LatLon::new(lat, lon));
        }
    }
    points
}

fn to_csv(points: &[LatLon], elevations: &[f64]) -> String {
    let mut csv = String::from("lat,lon,elevation\n");
    for (point, elevation) in points.iter().zip(elevations) {
        let _ = writeln!(csv, "{:.6},{:.6},{:.2}", point.lat, point.lon, elevation);
    }
    csv
}
