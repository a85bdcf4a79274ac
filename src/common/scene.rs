//! Scene loading, parsing, and validation logic.
//!
//! A scene bundles everything one planning run needs: the scanned room, the existing
//! transmitters, the requested frequencies and, optionally, measured samples and
//! candidate locations for placement.

use anyhow::Context;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::coverage::MeasuredSample;
use crate::error::{CoverageError, Result};
use crate::geometry::{Point3D, RoomModel};
use crate::raytracer::RFTransmitter;

/// Scene elements further outside the room bounds than this are reported (m).
const OUT_OF_BOUNDS_TOLERANCE_M: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub room: RoomModel,
    /// Existing network; may be empty when planning from scratch.
    #[serde(default)]
    pub transmitters: Vec<RFTransmitter>,
    pub frequencies_mhz: Vec<f64>,
    /// Measured samples used to correct the predicted map.
    #[serde(default)]
    pub measurements: Vec<MeasuredSample>,
    /// Locations to consider for a new device; generated when empty.
    #[serde(default)]
    pub candidate_locations: Vec<Point3D>,
    /// Locations for single-point predictions.
    #[serde(default)]
    pub prediction_points: Vec<Point3D>,
}

/// Load and parse a scene from a file.
///
/// # Parameters
///
/// * `path` - Path to the scene JSON file
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &Path) -> Result<Scene> {
    let load_error = |e: anyhow::Error| CoverageError::SceneLoad {
        path: path.display().to_string(),
        message: format!("{:#}", e),
    };
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(load_error)?;
    let scene: Scene = serde_json::from_str(&data).context("Invalid JSON format").map_err(load_error)?;

    validate_scene(&scene)?;
    for id in scene.room.out_of_bounds_elements(OUT_OF_BOUNDS_TOLERANCE_M) {
        warn!("Scene element {} lies outside room {} bounds", id, scene.room.id);
    }
    for tx in &scene.transmitters {
        if !scene.room.bounds.contains_with_tolerance(&tx.location, OUT_OF_BOUNDS_TOLERANCE_M) {
            warn!("Transmitter {} at {:?} lies outside room {} bounds", tx.id, tx.location, scene.room.id);
        }
    }
    Ok(scene)
}

/// Validate scene contents.
///
/// # Returns
///
/// `Ok(())` if validation passes, the first problem found otherwise.
pub fn validate_scene(scene: &Scene) -> Result<()> {
    const MAX_TRANSMITTERS: usize = 256;

    scene.room.validate()?;

    if scene.transmitters.len() > MAX_TRANSMITTERS {
        return Err(CoverageError::InvalidConfiguration(format!(
            "Transmitter count {} exceeds maximum of {}",
            scene.transmitters.len(),
            MAX_TRANSMITTERS
        )));
    }
    let mut ids = HashSet::new();
    for tx in &scene.transmitters {
        if !ids.insert(tx.id.as_str()) {
            return Err(CoverageError::InvalidConfiguration(format!("Duplicate transmitter id found: {}", tx.id)));
        }
        tx.validate()?;
    }

    if scene.frequencies_mhz.is_empty() {
        return Err(CoverageError::InvalidConfiguration("Scene must request at least one frequency".into()));
    }
    if let Some(f) = scene.frequencies_mhz.iter().find(|f| !f.is_finite() || **f <= 0.0) {
        return Err(CoverageError::InvalidConfiguration(format!("Invalid frequency {} MHz, must be positive", f)));
    }

    for sample in &scene.measurements {
        if let Some((band, rssi)) = sample.rssi_by_band.iter().find(|(_, r)| !r.is_finite()) {
            return Err(CoverageError::InvalidConfiguration(format!(
                "Measurement at {:?} has invalid {} RSSI {}",
                sample.location,
                band.label(),
                rssi
            )));
        }
    }
    Ok(())
}
