//! Single-point prediction with a confidence score, and outage probability.
//!
//! Predictions are cached per predictor, keyed on the room, the transmitters, the requested
//! frequencies and the location.

use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::coverage::{CoverageEngine, SignalStrength, push_scene};
use crate::error::{CoverageError, Result};
use crate::geometry::{Point3D, RoomModel};
use crate::optimizer::{AdaptiveCache, CacheKeyBuilder, CacheStats};
use crate::propagation::{EnvironmentProfile, EnvironmentType, FrequencyBand, sample_shadowing_db};
use crate::raytracer::{RFTransmitter, free_space_estimate};

/// Confidence bounds; a prediction is never reported as certain or worthless.
const MIN_CONFIDENCE: f64 = 0.1;
const MAX_CONFIDENCE: f64 = 0.99;

/// Distance (m) up to which distance does not reduce confidence.
const CONFIDENT_RANGE_M: f64 = 5.0;

/// Penalty applied to confidence when the simplified free-space estimate is used.
const SIMPLIFIED_CONFIDENCE_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPrediction {
    pub location: Point3D,
    pub signal: SignalStrength,
    /// Confidence in `[0.1, 0.99]`.
    pub confidence: f64,
    pub environment: EnvironmentType,
    /// Obstacles on the dominant path from the serving transmitter.
    pub obstacle_count: usize,
    pub distance_to_serving_m: f64,
    /// Set when ray tracing failed and the free-space estimate was used instead.
    pub simplified: bool,
}

/// Confidence of a prediction.
///
/// # Formula
///
/// ```text
/// C = C_env × f_d × 0.95^k,  clamped to [0.1, 0.99]
/// f_d = max(0.5, 1 − 0.02 × max(0, d − 5))
/// ```
///
/// - `C_env`: environment base confidence (residential highest, industrial lowest)
/// - `d`: distance to the serving transmitter (m)
/// - `k`: obstacles on the dominant path
pub fn prediction_confidence(profile: &EnvironmentProfile, distance_m: f64, obstacle_count: usize) -> f64 {
    let distance = if distance_m.is_finite() { distance_m.max(0.0) } else { 0.0 };
    let distance_factor = (1.0 - 0.02 * (distance - CONFIDENT_RANGE_M).max(0.0)).max(0.5);
    let obstacle_factor = 0.95f64.powi(obstacle_count.min(i32::MAX as usize) as i32);
    (profile.base_confidence * distance_factor * obstacle_factor).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Free-space-only signal: strongest transmitter per band, no obstacles.
pub fn simplified_signal(location: Point3D, transmitters: &[RFTransmitter], frequencies_mhz: &[f64], rx_gain_dbi: f64) -> Option<SignalStrength> {
    let mut rssi_by_band = BTreeMap::new();
    for &frequency in frequencies_mhz.iter().filter(|f| **f > 0.0 && f.is_finite()) {
        let band = FrequencyBand::from_frequency(frequency);
        let best = transmitters
            .iter()
            .filter_map(|tx| free_space_estimate(tx, band.center_frequency_mhz(), &location, rx_gain_dbi))
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))));
        if let Some(rssi) = best {
            rssi_by_band.insert(band, rssi);
        }
    }
    if rssi_by_band.is_empty() { None } else { Some(SignalStrength::new(location, rssi_by_band)) }
}

fn prediction_cache_key(location: &Point3D, transmitters: &[RFTransmitter], room: &RoomModel, frequencies_mhz: &[f64]) -> String {
    let mut key = CacheKeyBuilder::new("prediction/v1");
    push_scene(&mut key, room, transmitters);
    key.push_u64(frequencies_mhz.len() as u64);
    for f in frequencies_mhz {
        key.push_f64(*f);
    }
    key.push_f64(location.x).push_f64(location.y).push_f64(location.z);
    key.finish()
}

/// High-level prediction API on top of a shared [`CoverageEngine`].
pub struct SignalPredictor {
    engine: Arc<CoverageEngine>,
    cache: AdaptiveCache<SignalPrediction>,
}

impl SignalPredictor {
    /// Uses the engine's cache settings for its own prediction cache.
    pub fn new(engine: Arc<CoverageEngine>) -> Self {
        let cache = AdaptiveCache::new(engine.config().cache.strategy);
        Self { engine, cache }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn engine(&self) -> &CoverageEngine {
        &self.engine
    }

    pub fn profile(&self) -> &EnvironmentProfile {
        self.engine.profile()
    }

    /// Signal at `location` with a confidence score.
    ///
    /// Recoverable engine errors (bad room data, unusable inputs) fall back to the
    /// free-space estimate with reduced confidence; other errors propagate.
    pub fn predict_signal_strength(&self, location: Point3D, transmitters: &[RFTransmitter], room: &RoomModel, frequencies_mhz: &[f64]) -> Result<SignalPrediction> {
        if !self.engine.config().cache.enabled {
            return self.compute_prediction(location, transmitters, room, frequencies_mhz);
        }
        let key = prediction_cache_key(&location, transmitters, room, frequencies_mhz);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Prediction cache hit at {:?}", location);
            return Ok(hit);
        }
        let prediction = self.compute_prediction(location, transmitters, room, frequencies_mhz)?;
        self.cache.insert(key, prediction.clone());
        Ok(prediction)
    }

    fn compute_prediction(&self, location: Point3D, transmitters: &[RFTransmitter], room: &RoomModel, frequencies_mhz: &[f64]) -> Result<SignalPrediction> {
        let profile = self.profile();
        match self.engine.calculate_point(room, transmitters, frequencies_mhz, location) {
            Ok(signal) => {
                let (distance, obstacles) = self.serving_path_details(room, transmitters, &signal);
                Ok(SignalPrediction {
                    location,
                    confidence: prediction_confidence(profile, distance, obstacles),
                    environment: profile.kind,
                    obstacle_count: obstacles,
                    distance_to_serving_m: distance,
                    signal,
                    simplified: false,
                })
            }
            Err(err) if err.is_recoverable() => {
                let rx_gain = self.engine.config().ray_tracing.receiver_gain_dbi;
                let Some(signal) = simplified_signal(location, transmitters, frequencies_mhz, rx_gain) else {
                    return Err(err);
                };
                warn!("Prediction at {:?} fell back to free-space estimate: {}", location, err);
                let distance = nearest_distance(&location, transmitters);
                Ok(SignalPrediction {
                    location,
                    confidence: (prediction_confidence(profile, distance, 0) * SIMPLIFIED_CONFIDENCE_FACTOR).max(MIN_CONFIDENCE),
                    environment: profile.kind,
                    obstacle_count: 0,
                    distance_to_serving_m: distance,
                    signal,
                    simplified: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Distance to, and obstacles on the dominant path from, the transmitter serving the
    /// dominant band.
    fn serving_path_details(&self, room: &RoomModel, transmitters: &[RFTransmitter], signal: &SignalStrength) -> (f64, usize) {
        let Some(band) = signal.dominant_band else {
            return (nearest_distance(&signal.location, transmitters), 0);
        };
        let tracer = self.engine.tracer(room);
        let frequency = band.center_frequency_mhz();
        transmitters
            .iter()
            .filter(|tx| tx.serves(band))
            .map(|tx| (tx, tracer.trace(tx, frequency, &signal.location)))
            .max_by(|a, b| a.1.combined_power_dbm.total_cmp(&b.1.combined_power_dbm))
            .map(|(tx, result)| (tx.location.distance_to(&signal.location), result.dominant_obstacle_count()))
            .unwrap_or_else(|| (nearest_distance(&signal.location, transmitters), 0))
    }

    /// Probability that the best signal at `location` falls below `threshold_dbm` once
    /// log-normal shadowing is applied, estimated from `trials` seeded samples.
    pub fn predict_outage_probability(
        &self,
        location: Point3D,
        transmitters: &[RFTransmitter],
        room: &RoomModel,
        frequencies_mhz: &[f64],
        threshold_dbm: f64,
        trials: usize,
        seed: u64,
    ) -> Result<f64> {
        if trials == 0 {
            return Err(CoverageError::InvalidConfiguration("Outage estimation needs at least one trial".into()));
        }
        let prediction = self.predict_signal_strength(location, transmitters, room, frequencies_mhz)?;
        let mean = prediction.signal.best_rssi();
        let sigma = self.profile().shadowing_sigma_db;
        let mut rng = StdRng::seed_from_u64(seed);
        let outages = (0..trials).filter(|_| mean + sample_shadowing_db(sigma, &mut rng) < threshold_dbm).count();
        Ok(outages as f64 / trials as f64)
    }
}

fn nearest_distance(location: &Point3D, transmitters: &[RFTransmitter]) -> f64 {
    transmitters.iter().map(|tx| tx.location.distance_to(location)).fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::EngineConfig;
    use crate::geometry::{BoundingBox, FloorDescription, WallElement, WallMaterial};
    use crate::raytracer::DeviceKind;

    fn room() -> RoomModel {
        RoomModel {
            id: "flat".into(),
            bounds: BoundingBox::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(12.0, 8.0, 3.0)),
            walls: vec![
                WallElement::new("a", Point3D::new(6.0, 0.0, 0.0), Point3D::new(6.0, 8.0, 0.0), 3.0, 0.2, WallMaterial::Concrete).unwrap(),
                WallElement::new("b", Point3D::new(9.0, 0.0, 0.0), Point3D::new(9.0, 8.0, 0.0), 3.0, 0.1, WallMaterial::Drywall).unwrap(),
            ],
            furniture: Vec::new(),
            openings: Vec::new(),
            floor: FloorDescription::default(),
        }
    }

    fn predictor(kind: EnvironmentType) -> SignalPredictor {
        let mut config = EngineConfig::default();
        config.environment.kind = kind;
        config.memory.enabled = false;
        config.concurrency.worker_threads = Some(2);
        SignalPredictor::new(Arc::new(CoverageEngine::new(config).unwrap()))
    }

    fn router() -> Vec<RFTransmitter> {
        vec![RFTransmitter::standard("ap", DeviceKind::Router, Point3D::new(2.0, 4.0, 1.5))]
    }

    #[test]
    fn confidence_drops_with_distance_and_obstacles() {
        let profile = EnvironmentProfile::for_environment(EnvironmentType::Office);
        let near = prediction_confidence(&profile, 2.0, 0);
        let far = prediction_confidence(&profile, 20.0, 0);
        let blocked = prediction_confidence(&profile, 2.0, 3);
        assert!(near > far);
        assert!(near > blocked);
        assert!((0.1..=0.99).contains(&prediction_confidence(&profile, 1e6, 500)));
        assert!(prediction_confidence(&profile, f64::NAN, 0).is_finite());
    }

    #[test]
    fn residential_more_confident_than_industrial() {
        let location = Point3D::new(10.0, 4.0, 1.2);
        let res = predictor(EnvironmentType::Residential).predict_signal_strength(location, &router(), &room(), &[5180.0]).unwrap();
        let ind = predictor(EnvironmentType::Industrial).predict_signal_strength(location, &router(), &room(), &[5180.0]).unwrap();
        assert!(res.confidence > ind.confidence);
        assert_eq!(res.obstacle_count, 2);
        assert!(!res.simplified);
    }

    #[test]
    fn behind_walls_is_weaker_and_less_certain() {
        let p = predictor(EnvironmentType::Office);
        let near = p.predict_signal_strength(Point3D::new(4.0, 4.0, 1.2), &router(), &room(), &[5180.0]).unwrap();
        let far = p.predict_signal_strength(Point3D::new(11.0, 4.0, 1.2), &router(), &room(), &[5180.0]).unwrap();
        assert!(near.signal.best_rssi() > far.signal.best_rssi());
        assert!(near.confidence > far.confidence);
    }

    #[test]
    fn falls_back_when_room_has_no_walls() {
        let mut bare = room();
        bare.walls.clear();
        let p = predictor(EnvironmentType::Residential);
        let prediction = p.predict_signal_strength(Point3D::new(5.0, 4.0, 1.2), &router(), &bare, &[2412.0]).unwrap();
        assert!(prediction.simplified);
        assert!(prediction.signal.rssi(FrequencyBand::Band2_4GHz).is_some());
        // No transmitters at all: nothing to fall back on
        assert!(p.predict_signal_strength(Point3D::new(5.0, 4.0, 1.2), &[], &bare, &[2412.0]).is_err());
    }

    #[test]
    fn repeated_prediction_served_from_cache() {
        let p = predictor(EnvironmentType::Office);
        let location = Point3D::new(8.0, 4.0, 1.2);
        let first = p.predict_signal_strength(location, &router(), &room(), &[5180.0]).unwrap();
        let traced = p.engine().points_evaluated();
        let second = p.predict_signal_strength(location, &router(), &room(), &[5180.0]).unwrap();
        assert_eq!(first, second);
        assert_eq!(p.engine().points_evaluated(), traced);
        assert_eq!(p.cache_stats().hits, 1);

        // A different location or network is a new entry
        p.predict_signal_strength(Point3D::new(8.5, 4.0, 1.2), &router(), &room(), &[5180.0]).unwrap();
        let mut moved = router();
        moved[0].location.x = 3.0;
        p.predict_signal_strength(location, &moved, &room(), &[5180.0]).unwrap();
        let stats = p.cache_stats();
        assert_eq!((stats.hits, stats.entries), (1, 3));
    }

    #[test]
    fn disabled_cache_recomputes_predictions() {
        let mut config = EngineConfig::default();
        config.memory.enabled = false;
        config.cache.enabled = false;
        let p = SignalPredictor::new(Arc::new(CoverageEngine::new(config).unwrap()));
        let location = Point3D::new(8.0, 4.0, 1.2);
        p.predict_signal_strength(location, &router(), &room(), &[5180.0]).unwrap();
        p.predict_signal_strength(location, &router(), &room(), &[5180.0]).unwrap();
        assert_eq!(p.engine().points_evaluated(), 2);
        assert_eq!(p.cache_stats().entries, 0);
    }

    #[test]
    fn outage_probability_is_seeded_and_ordered() {
        let p = predictor(EnvironmentType::Office);
        let location = Point3D::new(11.0, 4.0, 1.2);
        let a = p.predict_outage_probability(location, &router(), &room(), &[5180.0], -70.0, 2000, 42).unwrap();
        let b = p.predict_outage_probability(location, &router(), &room(), &[5180.0], -70.0, 2000, 42).unwrap();
        assert_eq!(a, b);
        let strict = p.predict_outage_probability(location, &router(), &room(), &[5180.0], -50.0, 2000, 42).unwrap();
        assert!(strict >= a);
        assert!((0.0..=1.0).contains(&a));
        assert!(p.predict_outage_probability(location, &router(), &room(), &[5180.0], -70.0, 0, 42).is_err());
    }
}
