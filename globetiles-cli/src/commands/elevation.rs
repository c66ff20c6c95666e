//! Point elevation lookup.

use std::time::Duration;

use globetiles::config::ConfigFile;
use globetiles::geo::{LatLon, Sector};
use tracing::debug;

use super::common::open_elevation_model;
use crate::error::CliError;

/// Arguments of `globetiles elevation`.
#[derive(Debug, Clone)]
pub struct ElevationArgs {
    pub lat: f64,
    pub lon: f64,
    /// Target resolution in arc-seconds; `None` asks for the finest level
    pub resolution_arcsec: Option<f64>,
    pub wait: Duration,
}

/// Look up one elevation, refining until the target level has arrived
/// or the wait budget is spent.
pub fn run(config: &ConfigFile, args: ElevationArgs) -> Result<(), CliError> {
    let session = open_elevation_model(config)?;
    let model = &session.model;

    if !model.contains(args.lat, args.lon) {
        return Err(CliError::InvalidArgument(format!(
            "{} is outside the dataset coverage {:?}",
            LatLon::new(args.lat, args.lon),
            model.sector()
        )));
    }

    let point = LatLon::new(args.lat, args.lon);
    let sector = Sector::bounding(&[point])
        .ok_or_else(|| CliError::InvalidArgument("empty location list".to_string()))?;
    let resolution = args
        .resolution_arcsec
        .map(|arcsec| (arcsec / 3600.0).to_radians())
        .unwrap_or_else(|| model.best_resolution());

    // Level zero first, so there is always a coarse answer.
    model.get_elevation(args.lat, args.lon);
    model.fetcher().wait_for_pending(args.wait);

    let mut out = [model.missing_data_signal()];
    let mut achieved = None;
    for _ in 0..=model.level_set().levels().len() {
        achieved = model.get_elevations(&sector, &[point], resolution, &mut out);
        if model.fetcher().pending_count() == 0 {
            break;
        }
        if !model.fetcher().wait_for_pending(args.wait) {
            debug!("Gave up waiting for tiles");
            break;
        }
    }

    match achieved {
        Some(texel) => {
            let value = if out[0] == model.missing_data_signal() {
                model.missing_data_replacement()
            } else {
                out[0]
            };
            println!("Location:   {}", point);
            println!("Elevation:  {:.1} m", value);
            println!("Resolution: {:.2} arc-seconds", texel.to_degrees() * 3600.0);
        }
        None => {
            println!("Location:   {}", point);
            println!("Elevation:  unavailable");
        }
    }

    let stats = model.stats();
    debug!(?stats, "Elevation lookup finished");
    Ok(())
}
