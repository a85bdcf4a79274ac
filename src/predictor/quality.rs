//! Link-quality estimate from a predicted signal: SNR, throughput, reliability and
//! interference risk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::coverage::{MIN_RSSI_DBM, SignalStrength};
use crate::propagation::{EnvironmentProfile, EnvironmentType, FrequencyBand};

/// Thermal-plus-receiver noise floor of a quiet environment (dBm).
pub fn base_noise_floor_dbm(band: FrequencyBand) -> f64 {
    match band {
        FrequencyBand::Band2_4GHz => -95.0,
        FrequencyBand::Band5GHz => -92.0,
        FrequencyBand::Band6GHz => -90.0,
    }
}

pub fn noise_floor_dbm(band: FrequencyBand, profile: &EnvironmentProfile) -> f64 {
    base_noise_floor_dbm(band) + profile.clutter_noise_offset_db
}

/// PHY rate ceiling of a typical client on the band (Mbps).
pub fn max_throughput_mbps(band: FrequencyBand) -> f64 {
    match band {
        FrequencyBand::Band2_4GHz => 600.0,
        FrequencyBand::Band5GHz | FrequencyBand::Band6GHz => 2400.0,
    }
}

/// Fraction of the band's peak rate reachable at a given SNR.
pub fn spectral_efficiency(snr_db: f64) -> f64 {
    match snr_db {
        s if s >= 35.0 => 1.0,
        s if s >= 30.0 => 0.85,
        s if s >= 25.0 => 0.7,
        s if s >= 20.0 => 0.55,
        s if s >= 15.0 => 0.4,
        s if s >= 10.0 => 0.25,
        s if s >= 5.0 => 0.1,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterferenceRisk {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandQuality {
    pub rssi_dbm: f64,
    pub noise_floor_dbm: f64,
    pub snr_db: f64,
    pub throughput_mbps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalQualityEstimate {
    /// Band the client would associate on; `None` when no band carries signal.
    pub band: Option<FrequencyBand>,
    pub snr_db: f64,
    pub estimated_throughput_mbps: f64,
    /// In `(0, 1]`; 1 when every band agrees.
    pub reliability: f64,
    pub interference_risk: InterferenceRisk,
    pub per_band: BTreeMap<FrequencyBand, BandQuality>,
}

fn band_quality(band: FrequencyBand, rssi_dbm: f64, profile: &EnvironmentProfile) -> BandQuality {
    let noise = noise_floor_dbm(band, profile);
    let snr = rssi_dbm - noise;
    BandQuality {
        rssi_dbm,
        noise_floor_dbm: noise,
        snr_db: snr,
        throughput_mbps: spectral_efficiency(snr) * max_throughput_mbps(band),
    }
}

/// Spread of the per-band RSSI values turned into a reliability score.
///
/// # Formula
///
/// ```text
/// R = 1 / (1 + σ² / 10)
/// ```
///
/// where `σ²` is the population variance of the per-band RSSI (dB²).
fn reliability(signal: &SignalStrength) -> f64 {
    let values: Vec<f64> = signal.rssi_by_band.values().copied().collect();
    if values.len() < 2 {
        return 1.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    1.0 / (1.0 + variance / 10.0)
}

fn interference_risk(band: Option<FrequencyBand>, snr_db: f64, profile: &EnvironmentProfile) -> InterferenceRisk {
    let congestion = match band {
        Some(FrequencyBand::Band2_4GHz) | None => 4.0,
        Some(FrequencyBand::Band5GHz) => 1.0,
        Some(FrequencyBand::Band6GHz) => 0.0,
    };
    let margin = if snr_db < 15.0 { 3.0 } else { 0.0 };
    match profile.clutter_noise_offset_db + congestion + margin {
        s if s >= 8.0 => InterferenceRisk::High,
        s if s >= 4.0 => InterferenceRisk::Moderate,
        _ => InterferenceRisk::Low,
    }
}

pub fn predict_signal_quality(signal: &SignalStrength, environment: EnvironmentType) -> SignalQualityEstimate {
    let profile = EnvironmentProfile::for_environment(environment);
    let per_band: BTreeMap<FrequencyBand, BandQuality> = signal
        .rssi_by_band
        .iter()
        .map(|(&band, &rssi)| (band, band_quality(band, rssi, &profile)))
        .collect();

    let (snr, throughput) = match signal.dominant_band.and_then(|b| per_band.get(&b)) {
        Some(q) => (q.snr_db, q.throughput_mbps),
        None => (MIN_RSSI_DBM - noise_floor_dbm(FrequencyBand::Band2_4GHz, &profile), 0.0),
    };

    SignalQualityEstimate {
        band: signal.dominant_band,
        snr_db: snr,
        estimated_throughput_mbps: throughput,
        reliability: reliability(signal),
        interference_risk: interference_risk(signal.dominant_band, snr, &profile),
        per_band,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3D;
    use approx::assert_abs_diff_eq;

    fn signal(bands: &[(FrequencyBand, f64)]) -> SignalStrength {
        SignalStrength::new(Point3D::new(0.0, 0.0, 0.0), bands.iter().copied().collect())
    }

    #[test]
    fn efficiency_steps() {
        assert_eq!(spectral_efficiency(40.0), 1.0);
        assert_eq!(spectral_efficiency(35.0), 1.0);
        assert_eq!(spectral_efficiency(34.9), 0.85);
        assert_eq!(spectral_efficiency(12.0), 0.25);
        assert_eq!(spectral_efficiency(4.9), 0.0);
    }

    #[test]
    fn strong_5ghz_signal_in_a_house() {
        let q = predict_signal_quality(&signal(&[(FrequencyBand::Band5GHz, -55.0)]), EnvironmentType::Residential);
        assert_eq!(q.band, Some(FrequencyBand::Band5GHz));
        assert_abs_diff_eq!(q.snr_db, 37.0);
        assert_abs_diff_eq!(q.estimated_throughput_mbps, 2400.0);
        assert_abs_diff_eq!(q.reliability, 1.0);
        assert_eq!(q.interference_risk, InterferenceRisk::Low);
    }

    #[test]
    fn noisier_environment_lowers_snr() {
        let s = signal(&[(FrequencyBand::Band2_4GHz, -70.0)]);
        let home = predict_signal_quality(&s, EnvironmentType::Residential);
        let plant = predict_signal_quality(&s, EnvironmentType::Industrial);
        assert_abs_diff_eq!(home.snr_db - plant.snr_db, 6.0);
        assert!(plant.estimated_throughput_mbps <= home.estimated_throughput_mbps);
        assert_eq!(plant.interference_risk, InterferenceRisk::High);
    }

    #[test]
    fn band_disagreement_reduces_reliability() {
        let agree = predict_signal_quality(&signal(&[(FrequencyBand::Band2_4GHz, -60.0), (FrequencyBand::Band5GHz, -60.0)]), EnvironmentType::Office);
        let split = predict_signal_quality(&signal(&[(FrequencyBand::Band2_4GHz, -50.0), (FrequencyBand::Band5GHz, -70.0)]), EnvironmentType::Office);
        assert_abs_diff_eq!(agree.reliability, 1.0);
        // Variance 100 dB²
        assert_abs_diff_eq!(split.reliability, 1.0 / 11.0, epsilon = 1e-12);
    }

    #[test]
    fn no_signal_has_no_throughput() {
        let q = predict_signal_quality(&signal(&[]), EnvironmentType::Office);
        assert_eq!(q.band, None);
        assert_eq!(q.estimated_throughput_mbps, 0.0);
        assert!(q.per_band.is_empty());
    }
}
