//! Request simplification: grid-resolution adaptation and frequency-set reduction.

use log::debug;

use crate::common::config::GridConfig;
use crate::error::{CoverageError, Result};
use crate::geometry::RoomModel;
use crate::propagation::FrequencyBand;

/// Horizontal resolution for a floor area: fine for small rooms, coarse for large ones, and
/// never so fine that `layers` grid layers exceed `max_points`.
pub fn adaptive_resolution(floor_area_m2: f64, layers: usize, max_points: usize) -> f64 {
    let area = floor_area_m2.max(0.0);
    let preset: f64 = if area <= 25.0 {
        0.25
    } else if area <= 100.0 {
        0.5
    } else if area <= 400.0 {
        1.0
    } else {
        2.0
    };
    let budget = (area * layers.max(1) as f64 / max_points.max(1) as f64).sqrt();
    preset.max(budget)
}

/// Collapses raw frequencies to one representative frequency per band, ordered by band.
///
/// Fails with `InvalidConfiguration` for an empty list or any non-positive or non-finite value.
pub fn reduce_frequencies(frequencies_mhz: &[f64]) -> Result<Vec<f64>> {
    if frequencies_mhz.is_empty() {
        return Err(CoverageError::InvalidConfiguration("No frequencies given".into()));
    }
    let mut bands = Vec::new();
    for &f in frequencies_mhz {
        if !(f > 0.0) || !f.is_finite() {
            return Err(CoverageError::InvalidConfiguration(format!("Invalid frequency {} MHz", f)));
        }
        bands.push(FrequencyBand::from_frequency(f));
    }
    bands.sort();
    bands.dedup();
    Ok(bands.iter().map(FrequencyBand::center_frequency_mhz).collect())
}

/// What the engine actually computes for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPlan {
    pub frequencies_mhz: Vec<f64>,
    pub resolution_m: f64,
    pub vertical_resolution_m: f64,
}

pub fn plan_request(room: &RoomModel, frequencies_mhz: &[f64], grid: &GridConfig) -> Result<RequestPlan> {
    let frequencies = reduce_frequencies(frequencies_mhz)?;
    let layers = ((room.bounds.size().z / grid.vertical_resolution_m).floor() as usize).max(1);
    let resolution = if grid.adaptive {
        adaptive_resolution(room.floor_area(), layers, grid.max_points)
    } else {
        grid.resolution_m
    };
    if frequencies.len() < frequencies_mhz.len() || resolution != grid.resolution_m {
        debug!(
            "Simplified request: {} -> {} frequencies, resolution {:.2} m",
            frequencies_mhz.len(),
            frequencies.len(),
            resolution
        );
    }
    Ok(RequestPlan {
        frequencies_mhz: frequencies,
        resolution_m: resolution,
        vertical_resolution_m: grid.vertical_resolution_m,
    })
}
