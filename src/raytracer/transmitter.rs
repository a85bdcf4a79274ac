//! Transmitters (routers, extenders, mesh nodes) and their antenna patterns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoverageError, Result};
use crate::geometry::{Point3D, Vector3D};
use crate::propagation::FrequencyBand;

/// Allowed transmit power range in dBm.
pub const MIN_TX_POWER_DBM: f64 = -10.0;
pub const MAX_TX_POWER_DBM: f64 = 36.0;

/// Role of the device, used for cost estimates when recommending additions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Router,
    Extender,
    MeshNode,
}

impl DeviceKind {
    /// Relative purchase and installation cost (router = 1.0).
    pub fn relative_cost(&self) -> f64 {
        match self {
            DeviceKind::Router => 1.0,
            DeviceKind::Extender => 0.6,
            DeviceKind::MeshNode => 0.8,
        }
    }
}

/// Per-band radio settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub tx_power_dbm: f64,
    #[serde(default)]
    pub antenna_gain_dbi: f64,
}

/// Horizontal radiation pattern. Gains are relative to the peak gain in `BandConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AntennaPattern {
    #[default]
    Omnidirectional,
    /// Parabolic roll-off around the boresight, floored at the front-to-back ratio.
    Directional {
        azimuth_deg: f64,
        beamwidth_deg: f64,
        front_to_back_db: f64,
    },
    /// Flat inside the sector, parabolic roll-off outside it.
    Sector {
        azimuth_deg: f64,
        sector_width_deg: f64,
        front_to_back_db: f64,
    },
}

impl AntennaPattern {
    /// Gain relative to peak (dB, always ≤ 0) towards `direction`.
    ///
    /// Only the horizontal component is used; a purely vertical direction gets peak gain.
    pub fn relative_gain_db(&self, direction: &Vector3D) -> f64 {
        let horizontal = (direction.x * direction.x + direction.y * direction.y).sqrt();
        let bearing = if horizontal < 1e-9 { None } else { Some(direction.y.atan2(direction.x).to_degrees()) };
        match (*self, bearing) {
            (AntennaPattern::Omnidirectional, _) | (_, None) => 0.0,
            (
                AntennaPattern::Directional {
                    azimuth_deg,
                    beamwidth_deg,
                    front_to_back_db,
                },
                Some(bearing),
            ) => {
                let off = angle_difference_deg(bearing, azimuth_deg);
                let bw = beamwidth_deg.max(1.0);
                -(12.0 * (off / bw).powi(2)).min(front_to_back_db.max(0.0))
            }
            (
                AntennaPattern::Sector {
                    azimuth_deg,
                    sector_width_deg,
                    front_to_back_db,
                },
                Some(bearing),
            ) => {
                let off = angle_difference_deg(bearing, azimuth_deg);
                let half = sector_width_deg.max(1.0) / 2.0;
                if off <= half {
                    0.0
                } else {
                    -(12.0 * ((off - half) / (2.0 * half)).powi(2)).min(front_to_back_db.max(0.0))
                }
            }
        }
    }
}

/// Absolute difference of two bearings, folded into `[0, 180]`.
fn angle_difference_deg(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 { 360.0 - diff } else { diff }
}

/// A transmitter placed in the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RFTransmitter {
    pub id: String,
    #[serde(default)]
    pub kind: DeviceKind,
    pub location: Point3D,
    /// Radio settings per supported band. A transmitter without an entry for a band does
    /// not serve that band.
    pub bands: BTreeMap<FrequencyBand, BandConfig>,
    #[serde(default)]
    pub pattern: AntennaPattern,
}

impl RFTransmitter {
    /// Tri-band device with typical consumer radio settings, used to evaluate placement
    /// candidates.
    pub fn standard(id: impl Into<String>, kind: DeviceKind, location: Point3D) -> Self {
        let mut bands = BTreeMap::new();
        bands.insert(FrequencyBand::Band2_4GHz, BandConfig { tx_power_dbm: 20.0, antenna_gain_dbi: 2.0 });
        bands.insert(FrequencyBand::Band5GHz, BandConfig { tx_power_dbm: 23.0, antenna_gain_dbi: 3.0 });
        bands.insert(FrequencyBand::Band6GHz, BandConfig { tx_power_dbm: 23.0, antenna_gain_dbi: 3.0 });
        Self {
            id: id.into(),
            kind,
            location,
            bands,
            pattern: AntennaPattern::Omnidirectional,
        }
    }

    pub fn band_config(&self, band: FrequencyBand) -> Option<&BandConfig> {
        self.bands.get(&band)
    }

    pub fn serves(&self, band: FrequencyBand) -> bool {
        self.bands.contains_key(&band)
    }

    /// Effective radiated power towards `direction` (dBm), or `None` if the band is not served.
    pub fn eirp_dbm(&self, band: FrequencyBand, direction: &Vector3D) -> Option<f64> {
        let config = self.band_config(band)?;
        Some(config.tx_power_dbm + config.antenna_gain_dbi + self.pattern.relative_gain_db(direction))
    }

    pub fn validate(&self) -> Result<()> {
        if self.bands.is_empty() {
            return Err(CoverageError::InvalidConfiguration(format!("Transmitter {} has no bands configured", self.id)));
        }
        let loc = &self.location;
        if !(loc.x.is_finite() && loc.y.is_finite() && loc.z.is_finite()) {
            return Err(CoverageError::InvalidConfiguration(format!("Transmitter {} has a non-finite location", self.id)));
        }
        for (band, config) in &self.bands {
            if !(MIN_TX_POWER_DBM..=MAX_TX_POWER_DBM).contains(&config.tx_power_dbm) {
                return Err(CoverageError::InvalidConfiguration(format!(
                    "Transmitter {} power {} dBm on {} outside {}..{} dBm",
                    self.id, config.tx_power_dbm, band, MIN_TX_POWER_DBM, MAX_TX_POWER_DBM
                )));
            }
            if !config.antenna_gain_dbi.is_finite() {
                return Err(CoverageError::InvalidConfiguration(format!("Transmitter {} has a non-finite gain on {}", self.id, band)));
            }
        }
        Ok(())
    }
}

/// Checks a transmitter set: non-empty, unique ids, each transmitter valid.
pub fn validate_transmitters(transmitters: &[RFTransmitter]) -> Result<()> {
    if transmitters.is_empty() {
        return Err(CoverageError::CalculationFailed("No transmitters given".into()));
    }
    let mut seen = std::collections::HashSet::new();
    for tx in transmitters {
        if !seen.insert(tx.id.as_str()) {
            return Err(CoverageError::InvalidConfiguration(format!("Duplicate transmitter id {}", tx.id)));
        }
        tx.validate()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn omni_gain_is_flat() {
        let p = AntennaPattern::Omnidirectional;
        assert_eq!(p.relative_gain_db(&Vector3D::new(1.0, 0.0, 0.0)), 0.0);
        assert_eq!(p.relative_gain_db(&Vector3D::new(-1.0, -1.0, 0.3)), 0.0);
    }

    #[test]
    fn directional_rolls_off_and_floors_at_front_to_back() {
        let p = AntennaPattern::Directional {
            azimuth_deg: 0.0,
            beamwidth_deg: 60.0,
            front_to_back_db: 20.0,
        };
        assert_abs_diff_eq!(p.relative_gain_db(&Vector3D::new(1.0, 0.0, 0.0)), 0.0);
        // 30° off boresight with a 60° beam: -12 × 0.25 = -3 dB
        let off = Vector3D::new(30f64.to_radians().cos(), 30f64.to_radians().sin(), 0.0);
        assert_abs_diff_eq!(p.relative_gain_db(&off), -3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.relative_gain_db(&Vector3D::new(-1.0, 0.0, 0.0)), -20.0);
    }

    #[test]
    fn sector_is_flat_inside() {
        let p = AntennaPattern::Sector {
            azimuth_deg: 90.0,
            sector_width_deg: 120.0,
            front_to_back_db: 25.0,
        };
        assert_eq!(p.relative_gain_db(&Vector3D::new(0.5, 1.0, 0.0)), 0.0);
        assert!(p.relative_gain_db(&Vector3D::new(0.0, -1.0, 0.0)) < -10.0);
    }

    #[test]
    fn eirp_per_band() {
        let tx = RFTransmitter::standard("r", DeviceKind::Router, Point3D::new(0.0, 0.0, 1.0));
        let dir = Vector3D::new(1.0, 0.0, 0.0);
        assert_eq!(tx.eirp_dbm(FrequencyBand::Band2_4GHz, &dir), Some(22.0));
        assert_eq!(tx.eirp_dbm(FrequencyBand::Band5GHz, &dir), Some(26.0));
        let mut single = tx.clone();
        single.bands.remove(&FrequencyBand::Band6GHz);
        assert_eq!(single.eirp_dbm(FrequencyBand::Band6GHz, &dir), None);
    }

    #[test]
    fn transmitter_validation() {
        let mut tx = RFTransmitter::standard("r", DeviceKind::Router, Point3D::new(0.0, 0.0, 1.0));
        assert!(tx.validate().is_ok());
        tx.bands.insert(FrequencyBand::Band5GHz, BandConfig { tx_power_dbm: 40.0, antenna_gain_dbi: 0.0 });
        assert!(matches!(tx.validate(), Err(CoverageError::InvalidConfiguration(_))));

        let a = RFTransmitter::standard("same", DeviceKind::Router, Point3D::new(0.0, 0.0, 1.0));
        let b = RFTransmitter::standard("same", DeviceKind::Extender, Point3D::new(1.0, 0.0, 1.0));
        assert!(matches!(validate_transmitters(&[a, b]), Err(CoverageError::InvalidConfiguration(_))));
        assert!(matches!(validate_transmitters(&[]), Err(CoverageError::CalculationFailed(_))));
    }

    #[test]
    fn transmitter_json_uses_band_labels() {
        let tx = RFTransmitter::standard("r", DeviceKind::MeshNode, Point3D::new(1.0, 2.0, 1.5));
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"5GHz\""));
        let back: RFTransmitter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }
}
