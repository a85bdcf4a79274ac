//! What-if analysis for adding a device, and ranking of candidate placements.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::prediction::SignalPredictor;
use crate::coverage::{CoverageImprovement, CoverageMap, IMPROVEMENT_THRESHOLDS_DBM, MIN_RSSI_DBM, SignalStrength, analyze_improvement};
use crate::error::{CoverageError, Result};
use crate::geometry::{Point3D, RoomModel};
use crate::raytracer::{DeviceKind, RFTransmitter};

/// RSSI counted as "covered" when scoring candidates.
const COVERED_DBM: f64 = IMPROVEMENT_THRESHOLDS_DBM[0];

/// Existing-network signal at a candidate good enough to carry a mesh backhaul.
const BACKHAUL_DBM: f64 = -65.0;

/// Heights above the floor at which lattice candidates are generated (m).
const CANDIDATE_HEIGHTS_M: [f64; 2] = [1.0, 2.0];

/// Horizontal spacing of generated candidates (m).
const CANDIDATE_SPACING_M: f64 = 2.0;

/// Devices set on a furniture surface sit this far above it (m).
const SURFACE_CLEARANCE_M: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementObjective {
    MaxCoverage,
    MinInterference,
    #[default]
    Balanced,
}

impl PlacementObjective {
    /// Weights of (coverage, interference, accessibility).
    fn weights(&self) -> (f64, f64, f64) {
        match self {
            PlacementObjective::MaxCoverage => (1.0, 0.0, 0.0),
            PlacementObjective::MinInterference => (0.2, 0.8, 0.0),
            PlacementObjective::Balanced => (0.5, 0.3, 0.2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningCode {
    OptimalBackhaul,
    WeakSpotCoverage,
    CentralLocation,
    ElevatedPlacement,
    LowInterference,
    AccessiblePower,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecommendation {
    /// 1 is the best candidate.
    pub rank: usize,
    pub location: Point3D,
    pub score: f64,
    pub coverage_score: f64,
    pub interference_score: f64,
    pub accessibility_score: f64,
    /// Share of the room at or above −70 dBm with the device added (percent).
    pub expected_coverage_percent: f64,
    pub reasoning: Vec<ReasoningCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementPrediction {
    pub candidate_id: String,
    pub analysis: CoverageImprovement,
    /// Newly covered floor area per unit of relative device cost (m²).
    pub cost_benefit_ratio: f64,
    /// In `[0.1, 0.99]`.
    pub recommendation_confidence: f64,
    pub worthwhile: bool,
}

/// Map of the same grid with every band at the floor value; stands in for "no network yet".
fn floor_map(like: &CoverageMap) -> Result<CoverageMap> {
    let cells = (0..like.grid.cell_count())
        .map(|i| {
            like.get(i)
                .map(|s| SignalStrength::new(s.location, s.rssi_by_band.keys().map(|&band| (band, MIN_RSSI_DBM)).collect()))
        })
        .collect();
    CoverageMap::from_cells(like.room_id.clone(), like.grid.clone(), like.frequencies_mhz.clone(), cells)
}

/// Lattice points at desk and shelf height plus the top of every furniture placement surface.
pub fn generate_candidate_locations(room: &RoomModel) -> Vec<Point3D> {
    let min = room.bounds.min;
    let size = room.bounds.size();
    let columns = (size.x / CANDIDATE_SPACING_M).floor().max(1.0) as usize;
    let rows = (size.y / CANDIDATE_SPACING_M).floor().max(1.0) as usize;
    let step_x = size.x / columns as f64;
    let step_y = size.y / rows as f64;

    let mut candidates = Vec::new();
    for height in CANDIDATE_HEIGHTS_M {
        let z = min.z + height;
        if z >= room.bounds.max.z {
            continue;
        }
        for ix in 0..columns {
            for iy in 0..rows {
                let p = Point3D::new(min.x + (ix as f64 + 0.5) * step_x, min.y + (iy as f64 + 0.5) * step_y, z);
                if room.contains_point(&p) {
                    candidates.push(p);
                }
            }
        }
    }
    for item in &room.furniture {
        for surface in &item.placement_surfaces {
            let p = Point3D::new(surface.center.x, surface.center.y, surface.center.z + SURFACE_CLEARANCE_M);
            if room.contains_point(&p) {
                candidates.push(p);
            }
        }
    }
    candidates
}

fn on_placement_surface(room: &RoomModel, p: &Point3D) -> bool {
    room.furniture.iter().flat_map(|f| &f.placement_surfaces).any(|s| {
        (p.x - s.center.x).abs() <= s.width / 2.0 && (p.y - s.center.y).abs() <= s.depth / 2.0 && (p.z - s.center.z).abs() <= 0.3
    })
}

/// How easy it is to install and power a device at `p`.
fn accessibility_score(room: &RoomModel, p: &Point3D) -> f64 {
    if on_placement_surface(room, p) {
        return 1.0;
    }
    let elevation = p.z - room.bounds.min.z;
    let height_score = if (0.8..=2.2).contains(&elevation) {
        1.0
    } else if elevation < 0.8 {
        0.6
    } else {
        0.7
    };
    height_score * 0.8
}

fn is_central(room: &RoomModel, p: &Point3D) -> bool {
    let size = room.bounds.size();
    let half_diagonal = (size.x * size.x + size.y * size.y).sqrt() / 2.0;
    p.horizontal_distance_to(&room.bounds.center()) <= 0.25 * half_diagonal
}

impl SignalPredictor {
    /// Coverage gain from adding `candidate` to the `baseline` network.
    ///
    /// The baseline map comes from the engine cache when available; the candidate's own map
    /// is merged into it in linear power.
    pub fn predict_coverage_improvement(
        &self,
        baseline: &[RFTransmitter],
        candidate: &RFTransmitter,
        room: &RoomModel,
        frequencies_mhz: &[f64],
    ) -> Result<ImprovementPrediction> {
        let candidate_map = self.engine().calculate_coverage(room, std::slice::from_ref(candidate), frequencies_mhz)?;
        let baseline_map = if baseline.is_empty() {
            Arc::new(floor_map(&candidate_map)?)
        } else {
            self.engine().calculate_coverage(room, baseline, frequencies_mhz)?
        };
        let improved = baseline_map.combine(&candidate_map)?;
        let analysis = analyze_improvement(&baseline_map, &improved, room.floor_area());

        let primary = analysis
            .primary()
            .ok_or_else(|| CoverageError::CalculationFailed("Improvement analysis produced no thresholds".into()))?;
        let cost_benefit_ratio = primary.newly_served_area_m2 / candidate.kind.relative_cost();
        let gain_factor = 0.5 + 0.5 * (primary.absolute_improvement / 20.0).clamp(0.0, 1.0);
        let recommendation_confidence = (self.profile().base_confidence * gain_factor).clamp(0.1, 0.99);
        let worthwhile = primary.absolute_improvement > 0.0;

        info!(
            "Candidate {} adds {:.1} points of coverage ({:.1} m², cost-benefit {:.2})",
            candidate.id, primary.absolute_improvement, primary.newly_served_area_m2, cost_benefit_ratio
        );
        Ok(ImprovementPrediction {
            candidate_id: candidate.id.clone(),
            analysis,
            cost_benefit_ratio,
            recommendation_confidence,
            worthwhile,
        })
    }

    /// Scores every candidate location for a new device and returns them best first.
    ///
    /// With no candidates given, a coarse lattice and the furniture placement surfaces are
    /// used instead.
    pub fn find_optimal_placement(
        &self,
        room: &RoomModel,
        existing: &[RFTransmitter],
        candidates: &[Point3D],
        objective: PlacementObjective,
        frequencies_mhz: &[f64],
    ) -> Result<Vec<PlacementRecommendation>> {
        let generated;
        let candidates = if candidates.is_empty() {
            generated = generate_candidate_locations(room);
            &generated[..]
        } else {
            candidates
        };
        if candidates.is_empty() {
            return Err(CoverageError::InsufficientData(format!("No candidate locations in room {}", room.id)));
        }

        let existing_map = if existing.is_empty() { None } else { Some(self.engine().calculate_coverage(room, existing, frequencies_mhz)?) };
        let kind = if existing.is_empty() { DeviceKind::Router } else { DeviceKind::MeshNode };
        let (w_coverage, w_interference, w_access) = objective.weights();

        let mut recommendations = Vec::with_capacity(candidates.len());
        for (i, location) in candidates.iter().enumerate() {
            let device = RFTransmitter::standard(format!("candidate-{}", i), kind, *location);
            let candidate_map = self.engine().calculate_coverage(room, std::slice::from_ref(&device), frequencies_mhz)?;

            let (expected, interference_score, existing_rssi) = match &existing_map {
                Some(existing_map) => {
                    let combined = existing_map.combine(&candidate_map)?;
                    let served_by_candidate = candidate_map.iter().filter(|(_, s)| s.best_rssi() >= COVERED_DBM).count();
                    let overlap = candidate_map
                        .iter()
                        .filter(|(idx, s)| s.best_rssi() >= COVERED_DBM && existing_map.get(*idx).is_some_and(|e| e.best_rssi() >= COVERED_DBM))
                        .count();
                    let interference = 1.0 - overlap as f64 / served_by_candidate.max(1) as f64;
                    let at_location = self.predict_signal_strength(*location, existing, room, frequencies_mhz)?.signal.best_rssi();
                    (combined.percent_above(COVERED_DBM), interference, Some(at_location))
                }
                None => (candidate_map.percent_above(COVERED_DBM), 1.0, None),
            };

            let coverage_score = expected / 100.0;
            let accessibility = accessibility_score(room, location);
            let score = w_coverage * coverage_score + w_interference * interference_score + w_access * accessibility;

            let mut reasoning = Vec::new();
            if existing_rssi.is_some_and(|r| r >= BACKHAUL_DBM) {
                reasoning.push(ReasoningCode::OptimalBackhaul);
            }
            if existing_rssi.is_some_and(|r| r < COVERED_DBM) {
                reasoning.push(ReasoningCode::WeakSpotCoverage);
            }
            if is_central(room, location) {
                reasoning.push(ReasoningCode::CentralLocation);
            }
            if location.z - room.bounds.min.z >= 1.5 {
                reasoning.push(ReasoningCode::ElevatedPlacement);
            }
            if existing_map.is_some() && interference_score >= 0.8 {
                reasoning.push(ReasoningCode::LowInterference);
            }
            if on_placement_surface(room, location) {
                reasoning.push(ReasoningCode::AccessiblePower);
            }

            debug!("Candidate {:?}: score {:.3} (coverage {:.3}, interference {:.3}, access {:.3})", location, score, coverage_score, interference_score, accessibility);
            recommendations.push(PlacementRecommendation {
                rank: 0,
                location: *location,
                score,
                coverage_score,
                interference_score,
                accessibility_score: accessibility,
                expected_coverage_percent: expected,
                reasoning,
            });
        }

        recommendations.sort_by(|a, b| b.score.total_cmp(&a.score));
        for (i, r) in recommendations.iter_mut().enumerate() {
            r.rank = i + 1;
        }
        info!("Ranked {} placement candidates for room {} ({:?})", recommendations.len(), room.id, objective);
        Ok(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::EngineConfig;
    use crate::coverage::CoverageEngine;
    use crate::geometry::{BoundingBox, FloorDescription, FurnitureItem, FurnitureType, PlacementSurface, WallElement, WallMaterial};

    fn house() -> RoomModel {
        RoomModel {
            id: "house".into(),
            bounds: BoundingBox::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(16.0, 8.0, 2.8)),
            walls: vec![
                WallElement::new("mid", Point3D::new(8.0, 0.0, 0.0), Point3D::new(8.0, 8.0, 0.0), 2.8, 0.25, WallMaterial::Concrete).unwrap(),
                WallElement::new("east", Point3D::new(12.0, 0.0, 0.0), Point3D::new(12.0, 8.0, 0.0), 2.8, 0.3, WallMaterial::Metal).unwrap(),
            ],
            furniture: vec![FurnitureItem {
                id: "sideboard".into(),
                bounds: BoundingBox::new(Point3D::new(13.0, 3.5, 0.0), Point3D::new(14.0, 4.5, 0.9)),
                kind: FurnitureType::Cabinet,
                confidence: 0.9,
                placement_surfaces: vec![PlacementSurface {
                    center: Point3D::new(13.5, 4.0, 0.9),
                    width: 1.0,
                    depth: 1.0,
                }],
            }],
            openings: Vec::new(),
            floor: FloorDescription::default(),
        }
    }

    fn predictor() -> SignalPredictor {
        let mut config = EngineConfig::default();
        config.grid.resolution_m = 1.0;
        config.memory.enabled = false;
        config.concurrency.worker_threads = Some(2);
        SignalPredictor::new(Arc::new(CoverageEngine::new(config).unwrap()))
    }

    fn router() -> Vec<RFTransmitter> {
        vec![RFTransmitter::standard("ap", DeviceKind::Router, Point3D::new(2.0, 4.0, 1.5))]
    }

    #[test]
    fn generated_candidates_include_surfaces() {
        let candidates = generate_candidate_locations(&house());
        // 8 × 4 lattice at two heights plus one surface
        assert_eq!(candidates.len(), 65);
        assert!(candidates.iter().any(|p| p.distance_to(&Point3D::new(13.5, 4.0, 1.0)) < 1e-9));
        assert!(candidates.iter().all(|p| house().contains_point(p)));
    }

    #[test]
    fn accessibility_prefers_surfaces_and_desk_height() {
        let room = house();
        assert_eq!(accessibility_score(&room, &Point3D::new(13.5, 4.0, 1.0)), 1.0);
        assert!(accessibility_score(&room, &Point3D::new(4.0, 4.0, 1.2)) > accessibility_score(&room, &Point3D::new(4.0, 4.0, 0.2)));
    }

    #[test]
    fn far_side_extender_improves_coverage() {
        let p = predictor();
        let room = house();
        let extender = RFTransmitter::standard("ext", DeviceKind::Extender, Point3D::new(14.0, 4.0, 1.5));
        let prediction = p.predict_coverage_improvement(&router(), &extender, &room, &[5180.0]).unwrap();
        let primary = prediction.analysis.primary().unwrap();
        assert!(primary.improved_percent >= primary.baseline_percent);
        assert!(prediction.worthwhile);
        assert!(prediction.cost_benefit_ratio > 0.0);
        assert!((0.1..=0.99).contains(&prediction.recommendation_confidence));
    }

    #[test]
    fn improvement_from_nothing() {
        let p = predictor();
        let router = RFTransmitter::standard("ap", DeviceKind::Router, Point3D::new(4.0, 4.0, 1.5));
        let prediction = p.predict_coverage_improvement(&[], &router, &house(), &[2412.0]).unwrap();
        let primary = prediction.analysis.primary().unwrap();
        assert_eq!(primary.baseline_percent, 0.0);
        assert!(primary.improved_percent > 0.0);
        assert_eq!(primary.relative_improvement, None);
    }

    #[test]
    fn placement_ranks_far_side_above_next_to_router() {
        let p = predictor();
        let room = house();
        let near = Point3D::new(3.0, 4.0, 1.5);
        let far = Point3D::new(14.0, 4.0, 1.5);
        let ranked = p.find_optimal_placement(&room, &router(), &[near, far], PlacementObjective::MaxCoverage, &[5180.0]).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].location, far);
        assert!(ranked[0].score >= ranked[1].score);
        assert!(ranked[0].reasoning.contains(&ReasoningCode::ElevatedPlacement));
    }

    #[test]
    fn repeated_placement_search_traces_nothing_new() {
        let p = predictor();
        let room = house();
        let candidates = [Point3D::new(3.0, 4.0, 1.5), Point3D::new(14.0, 4.0, 1.5)];
        let first = p.find_optimal_placement(&room, &router(), &candidates, PlacementObjective::Balanced, &[5180.0]).unwrap();
        let traced = p.engine().points_evaluated();
        let second = p.find_optimal_placement(&room, &router(), &candidates, PlacementObjective::Balanced, &[5180.0]).unwrap();
        assert_eq!(first, second);
        assert_eq!(p.engine().points_evaluated(), traced);
        assert_eq!(p.cache_stats().hits, 2);
    }

    #[test]
    fn placement_without_candidates_uses_generated_set() {
        let p = predictor();
        let ranked = p.find_optimal_placement(&house(), &[], &[], PlacementObjective::Balanced, &[2412.0]).unwrap();
        assert_eq!(ranked.len(), 65);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(ranked.last().unwrap().rank, 65);
    }
}
