//! Per-environment parameter tables and optional environmental corrections.
//!
//! Profiles are built once per environment type and passed by reference into the loss
//! functions; nothing here is recomputed per grid point.

use serde::{Deserialize, Serialize};

use super::band::FrequencyBand;
use crate::geometry::FloorConstruction;

/// Building usage class driving the empirical model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentType {
    #[default]
    Residential,
    Office,
    Commercial,
    Industrial,
}

/// Parameters of the indoor propagation model for one environment type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    pub kind: EnvironmentType,
    /// Path loss exponent (n) of the distance term.
    ///
    /// - n = 2.0: free space
    /// - n = 2.2 to 3.0: open-plan to partitioned indoor spaces
    pub path_loss_exponent: f64,
    /// Standard deviation for log-normal shadowing (σ) in dB.
    pub shadowing_sigma_db: f64,
    /// Floor construction assumed when the room model does not say otherwise.
    pub floor_construction: FloorConstruction,
    /// Starting confidence of point predictions in this environment, `(0, 1]`.
    pub base_confidence: f64,
    /// Noise-floor rise caused by other emitters typical of the environment (dB).
    pub clutter_noise_offset_db: f64,
}

impl EnvironmentProfile {
    pub fn for_environment(kind: EnvironmentType) -> Self {
        match kind {
            EnvironmentType::Residential => Self {
                kind,
                path_loss_exponent: 2.8,
                shadowing_sigma_db: 8.0,
                floor_construction: FloorConstruction::WoodFrame,
                base_confidence: 0.9,
                clutter_noise_offset_db: 0.0,
            },
            EnvironmentType::Office => Self {
                kind,
                path_loss_exponent: 3.0,
                shadowing_sigma_db: 10.0,
                floor_construction: FloorConstruction::Concrete,
                base_confidence: 0.85,
                clutter_noise_offset_db: 2.0,
            },
            EnvironmentType::Commercial => Self {
                kind,
                path_loss_exponent: 2.2,
                shadowing_sigma_db: 10.0,
                floor_construction: FloorConstruction::Concrete,
                base_confidence: 0.8,
                clutter_noise_offset_db: 4.0,
            },
            EnvironmentType::Industrial => Self {
                kind,
                path_loss_exponent: 2.5,
                shadowing_sigma_db: 12.0,
                floor_construction: FloorConstruction::SteelConcrete,
                base_confidence: 0.7,
                clutter_noise_offset_db: 6.0,
            },
        }
    }
}

impl Default for EnvironmentProfile {
    fn default() -> Self {
        Self::for_environment(EnvironmentType::default())
    }
}

/// Density of clutter (people, shelving, equipment) not captured by the room scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClutterLevel {
    Low,
    Medium,
    High,
}

impl ClutterLevel {
    fn loss_multiplier(&self) -> f64 {
        match self {
            ClutterLevel::Low => 1.0,
            ClutterLevel::Medium => 1.03,
            ClutterLevel::High => 1.06,
        }
    }
}

/// Optional corrections applied after the base loss model.
///
/// The application order is fixed: humidity (additive), then temperature (additive), then
/// clutter (multiplicative on the running total). Additive terms therefore get scaled by
/// clutter; swapping the order would change the result.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentalConditions {
    #[serde(default)]
    pub humidity_percent: Option<f64>,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub clutter: Option<ClutterLevel>,
}

impl EnvironmentalConditions {
    pub fn is_empty(&self) -> bool {
        self.humidity_percent.is_none() && self.temperature_c.is_none() && self.clutter.is_none()
    }

    /// Corrected loss for a path of `distance_m` at `frequency_mhz`.
    pub fn apply(&self, loss_db: f64, distance_m: f64, frequency_mhz: f64) -> f64 {
        let distance = distance_m.max(0.0);
        let mut loss = loss_db;
        if let Some(humidity) = self.humidity_percent {
            loss += humidity_correction_db(humidity, distance, frequency_mhz);
        }
        if let Some(temperature) = self.temperature_c {
            loss += temperature_correction_db(temperature, distance);
        }
        if let Some(clutter) = self.clutter {
            loss *= clutter.loss_multiplier();
        }
        loss
    }
}

/// Extra absorption from humidity above 50 % RH; drier air adds nothing.
pub fn humidity_correction_db(humidity_percent: f64, distance_m: f64, frequency_mhz: f64) -> f64 {
    let per_meter = match FrequencyBand::from_frequency(frequency_mhz) {
        FrequencyBand::Band2_4GHz => 0.002,
        FrequencyBand::Band5GHz => 0.004,
        FrequencyBand::Band6GHz => 0.005,
    };
    let excess = (humidity_percent.clamp(0.0, 100.0) - 50.0).max(0.0) / 50.0;
    excess * per_meter * distance_m
}

/// Small loss increase for temperatures away from 20 °C.
pub fn temperature_correction_db(temperature_c: f64, distance_m: f64) -> f64 {
    (temperature_c - 20.0).abs() * 0.001 * distance_m
}
