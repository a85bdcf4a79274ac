//! Path construction between one transmitter and one receiver.
//!
//! For each query the tracer tries, in order:
//! 1. the direct line of sight,
//! 2. one specular reflection per wall (image method),
//! 3. two reflections per ordered wall pair,
//! 4. inter-floor paths, when a multi-floor model is configured and the endpoints sit on
//!    different floors (these replace 1-3).
//!
//! A candidate is kept only if its received power exceeds the configured minimum. Failing
//! geometry (no reflection point on the wall, endpoints on opposite sides) silently drops
//! the candidate; an empty result is valid and callers fall back to [`free_space_estimate`].

use log::trace;

use super::path::{MultipathResult, ObstacleHit, PathKind, RayPath, RaySegment};
use super::transmitter::RFTransmitter;
use crate::common::config::{MultiFloorConfig, RayTracingConfig};
use crate::geometry::types::material_frequency_factor;
use crate::geometry::{Point3D, RoomModel, Vector3D, WallElement, mirror_across_wall, same_side_of_wall, segment_box_intersection, wall_crossing};
use crate::propagation::{
    EnvironmentProfile, EnvironmentalConditions, FrequencyBand, floor_penetration_loss, free_space_path_loss, itu_indoor_path_loss,
    multi_floor_path_loss, reflection_loss, wall_penetration_loss,
};

/// Legs shorter than this are evaluated at this length; keeps the log terms finite.
pub const MIN_SEGMENT_DISTANCE_M: f64 = 0.1;

/// Reflection points closer than this to an endpoint are degenerate.
const DEGENERATE_LEG_M: f64 = 1e-6;

/// Frequency exponent applied to opening and furniture losses (tabulated at 2.4 GHz).
const OBSTACLE_FREQUENCY_EXPONENT: f64 = 0.3;

/// Traces paths through one room. Cheap to construct; holds only borrows.
pub struct RayTracer<'a> {
    room: &'a RoomModel,
    config: &'a RayTracingConfig,
    profile: &'a EnvironmentProfile,
    multi_floor: Option<&'a MultiFloorConfig>,
    conditions: Option<&'a EnvironmentalConditions>,
}

impl<'a> RayTracer<'a> {
    pub fn new(room: &'a RoomModel, config: &'a RayTracingConfig, profile: &'a EnvironmentProfile) -> Self {
        Self {
            room,
            config,
            profile,
            multi_floor: None,
            conditions: None,
        }
    }

    pub fn with_multi_floor(mut self, multi_floor: Option<&'a MultiFloorConfig>) -> Self {
        self.multi_floor = multi_floor;
        self
    }

    /// Environmental corrections applied to every path's total loss.
    pub fn with_conditions(mut self, conditions: Option<&'a EnvironmentalConditions>) -> Self {
        self.conditions = conditions.filter(|c| !c.is_empty());
        self
    }

    /// All accepted paths from `tx` to `rx` at `frequency_mhz`.
    pub fn trace_paths(&self, tx: &RFTransmitter, frequency_mhz: f64, rx: &Point3D) -> Vec<RayPath> {
        let band = FrequencyBand::from_frequency(frequency_mhz);
        if !tx.serves(band) {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        let floors = self.floors_between(&tx.location, rx);
        match (self.multi_floor, floors) {
            (Some(multi_floor), floors) if floors > 0 => {
                candidates.extend(self.inter_floor_paths(tx, band, frequency_mhz, rx, multi_floor, floors));
            }
            _ => {
                candidates.extend(self.direct_path(tx, band, frequency_mhz, rx));
                if self.config.enable_reflections {
                    candidates.extend(self.room.walls.iter().filter_map(|wall| self.single_reflection(tx, band, frequency_mhz, rx, wall)));
                }
                if self.config.enable_double_reflections {
                    candidates.extend(self.double_reflection_paths(tx, band, frequency_mhz, rx));
                }
            }
        }

        let total = candidates.len();
        candidates.retain(|p| p.received_power_dbm > self.config.min_signal_dbm);
        trace!("tx {} -> {:?} @ {} MHz: {}/{} paths above threshold", tx.id, rx, frequency_mhz, candidates.len(), total);
        candidates
    }

    /// Accepted paths combined in linear power.
    pub fn trace(&self, tx: &RFTransmitter, frequency_mhz: f64, rx: &Point3D) -> MultipathResult {
        MultipathResult::from_paths(self.trace_paths(tx, frequency_mhz, rx))
    }

    /// Received power of the direct path alone, obstacles included, with no threshold.
    /// Used when [`trace`](Self::trace) finds nothing.
    pub fn direct_estimate(&self, tx: &RFTransmitter, frequency_mhz: f64, rx: &Point3D) -> Option<f64> {
        let band = FrequencyBand::from_frequency(frequency_mhz);
        self.direct_path(tx, band, frequency_mhz, rx).map(|p| p.received_power_dbm)
    }

    fn floors_between(&self, a: &Point3D, b: &Point3D) -> u32 {
        match self.multi_floor {
            Some(mf) => {
                let base = self.room.bounds.min.z;
                (mf.floor_index(&self.room.floor, a.z, base) - mf.floor_index(&self.room.floor, b.z, base)).unsigned_abs() as u32
            }
            None => 0,
        }
    }

    /// Everything the straight segment `a→b` passes through, skipping `excluded` walls.
    ///
    /// A wall crossed inside one of its openings contributes the opening's loss instead of
    /// its own.
    pub fn obstacles_along(&self, a: &Point3D, b: &Point3D, frequency_mhz: f64, excluded: &[&str]) -> Vec<ObstacleHit> {
        let mut hits = Vec::new();
        let obstacle_factor = material_frequency_factor(frequency_mhz, OBSTACLE_FREQUENCY_EXPONENT);

        for wall in &self.room.walls {
            if excluded.contains(&wall.id.as_str()) {
                continue;
            }
            let Some(crossing) = wall_crossing(a, b, wall) else {
                continue;
            };
            let tolerance = wall.thickness.max(0.05);
            match self.room.wall_openings(&wall.id).find(|o| o.bounds.contains_with_tolerance(&crossing.point, tolerance)) {
                Some(opening) => hits.push(ObstacleHit::Opening {
                    opening_id: opening.id.clone(),
                    kind: opening.kind,
                    loss_db: opening.kind.penetration_loss_db() * obstacle_factor,
                }),
                None => hits.push(ObstacleHit::Wall {
                    wall_id: wall.id.clone(),
                    material: wall.material,
                    thickness: wall.thickness,
                    incidence_angle: crossing.incidence_angle,
                    loss_db: wall_penetration_loss(wall.material, wall.thickness, frequency_mhz, crossing.incidence_angle),
                }),
            }
        }

        for item in &self.room.furniture {
            if let Some((t_enter, t_exit)) = segment_box_intersection(a, b, &item.bounds) {
                if t_exit - t_enter > 1e-6 {
                    hits.push(ObstacleHit::Furniture {
                        furniture_id: item.id.clone(),
                        kind: item.kind,
                        loss_db: item.kind.attenuation_db() * item.confidence.clamp(0.0, 1.0) * obstacle_factor,
                    });
                }
            }
        }
        hits
    }

    fn segment(&self, a: &Point3D, b: &Point3D, frequency_mhz: f64, excluded: &[&str]) -> RaySegment {
        let distance = a.distance_to(b);
        RaySegment {
            start: *a,
            end: *b,
            distance,
            propagation_loss_db: free_space_path_loss(distance.max(MIN_SEGMENT_DISTANCE_M), frequency_mhz),
            obstacles: self.obstacles_along(a, b, frequency_mhz, excluded),
        }
    }

    /// Builds the path and folds the environmental correction into its extra loss.
    fn finish(&self, kind: PathKind, segments: Vec<RaySegment>, extra_loss_db: f64, eirp_dbm: f64, frequency_mhz: f64, reflections: u32) -> RayPath {
        let correction = match self.conditions {
            Some(conditions) => {
                let raw = segments.iter().map(RaySegment::total_loss_db).sum::<f64>() + extra_loss_db;
                let distance = segments.iter().map(|s| s.distance).sum::<f64>();
                conditions.apply(raw, distance, frequency_mhz) - raw
            }
            None => 0.0,
        };
        RayPath::new(kind, segments, extra_loss_db + correction, eirp_dbm, self.config.receiver_gain_dbi, reflections)
    }

    fn direct_path(&self, tx: &RFTransmitter, band: FrequencyBand, frequency_mhz: f64, rx: &Point3D) -> Option<RayPath> {
        let eirp = tx.eirp_dbm(band, &Vector3D::between(&tx.location, rx))?;
        let segment = self.segment(&tx.location, rx, frequency_mhz, &[]);
        Some(self.finish(PathKind::Direct, vec![segment], 0.0, eirp, frequency_mhz, 0))
    }

    /// Image method: mirror the transmitter across the wall and intersect the line from the
    /// image to the receiver with the finite wall.
    fn single_reflection(&self, tx: &RFTransmitter, band: FrequencyBand, frequency_mhz: f64, rx: &Point3D, wall: &WallElement) -> Option<RayPath> {
        if !same_side_of_wall(&tx.location, rx, wall) {
            return None;
        }
        let image = mirror_across_wall(&tx.location, wall);
        let hit = wall_crossing(&image, rx, wall)?;
        if hit.point.distance_to(&tx.location) < DEGENERATE_LEG_M || hit.point.distance_to(rx) < DEGENERATE_LEG_M {
            return None;
        }
        let eirp = tx.eirp_dbm(band, &Vector3D::between(&tx.location, &hit.point))?;
        let excluded = [wall.id.as_str()];
        let legs = vec![
            self.segment(&tx.location, &hit.point, frequency_mhz, &excluded),
            self.segment(&hit.point, rx, frequency_mhz, &excluded),
        ];
        let loss = reflection_loss(wall.material, hit.incidence_angle);
        Some(self.finish(PathKind::SingleReflection, legs, loss, eirp, frequency_mhz, 1))
    }

    fn double_reflection_paths(&self, tx: &RFTransmitter, band: FrequencyBand, frequency_mhz: f64, rx: &Point3D) -> Vec<RayPath> {
        let walls: Vec<&WallElement> = self.room.walls.iter().take(self.config.max_double_reflection_walls).collect();
        let mut paths = Vec::new();
        for (i, first) in walls.iter().enumerate() {
            for (j, second) in walls.iter().enumerate() {
                if i == j {
                    continue;
                }
                if let Some(path) = self.double_reflection(tx, band, frequency_mhz, rx, first, second) {
                    paths.push(path);
                }
            }
        }
        paths
    }

    /// Reflects off `first`, then `second`. The transmitter image is mirrored twice and the
    /// reflection points are recovered back to front.
    fn double_reflection(
        &self,
        tx: &RFTransmitter,
        band: FrequencyBand,
        frequency_mhz: f64,
        rx: &Point3D,
        first: &WallElement,
        second: &WallElement,
    ) -> Option<RayPath> {
        let image1 = mirror_across_wall(&tx.location, first);
        let image2 = mirror_across_wall(&image1, second);
        let hit2 = wall_crossing(&image2, rx, second)?;
        let hit1 = wall_crossing(&image1, &hit2.point, first)?;
        let (p1, p2) = (hit1.point, hit2.point);

        if !same_side_of_wall(&tx.location, &p2, first) || !same_side_of_wall(&p1, rx, second) {
            return None;
        }
        if p1.distance_to(&tx.location) < DEGENERATE_LEG_M || p2.distance_to(&p1) < DEGENERATE_LEG_M || rx.distance_to(&p2) < DEGENERATE_LEG_M {
            return None;
        }

        let eirp = tx.eirp_dbm(band, &Vector3D::between(&tx.location, &p1))?;
        let excluded = [first.id.as_str(), second.id.as_str()];
        let legs = vec![
            self.segment(&tx.location, &p1, frequency_mhz, &excluded),
            self.segment(&p1, &p2, frequency_mhz, &excluded),
            self.segment(&p2, rx, frequency_mhz, &excluded),
        ];
        let loss = reflection_loss(first.material, hit1.incidence_angle) + reflection_loss(second.material, hit2.incidence_angle);
        Some(self.finish(PathKind::DoubleReflection, legs, loss, eirp, frequency_mhz, 2))
    }

    /// Straight through the slabs, plus one path per vertical opening.
    ///
    /// Opening paths pay the indoor distance loss over both legs (apportioned by length) and
    /// only the part of the floor loss the opening does not bypass.
    fn inter_floor_paths(&self, tx: &RFTransmitter, band: FrequencyBand, frequency_mhz: f64, rx: &Point3D, multi_floor: &MultiFloorConfig, floors: u32) -> Vec<RayPath> {
        let construction = multi_floor.construction(&self.room.floor, self.profile);
        let mut paths = Vec::new();

        let distance = tx.location.distance_to(rx);
        let horizontal = tx.location.horizontal_distance_to(rx);
        let vertical = (rx.z - tx.location.z).abs();
        if let Some(eirp) = tx.eirp_dbm(band, &Vector3D::between(&tx.location, rx)) {
            let loss = multi_floor_path_loss(distance.max(MIN_SEGMENT_DISTANCE_M), horizontal, vertical, frequency_mhz, floors, construction, self.profile);
            let segment = RaySegment {
                start: tx.location,
                end: *rx,
                distance,
                propagation_loss_db: loss,
                obstacles: self.obstacles_along(&tx.location, rx, frequency_mhz, &[]),
            };
            paths.push(self.finish(PathKind::InterFloor, vec![segment], 0.0, eirp, frequency_mhz, 0));
        }

        for opening in self.room.vertical_openings() {
            let center = opening.bounds.center();
            let z = ((tx.location.z + rx.z) / 2.0).clamp(opening.bounds.min.z, opening.bounds.max.z);
            let via = Point3D::new(center.x, center.y, z);
            let Some(eirp) = tx.eirp_dbm(band, &Vector3D::between(&tx.location, &via)) else {
                continue;
            };
            let d1 = tx.location.distance_to(&via);
            let d2 = via.distance_to(rx);
            let total = (d1 + d2).max(MIN_SEGMENT_DISTANCE_M);
            let distance_loss = itu_indoor_path_loss(total, frequency_mhz, 0, self.profile);
            let legs = vec![
                RaySegment {
                    start: tx.location,
                    end: via,
                    distance: d1,
                    propagation_loss_db: distance_loss * d1 / total,
                    obstacles: self.obstacles_along(&tx.location, &via, frequency_mhz, &[]),
                },
                RaySegment {
                    start: via,
                    end: *rx,
                    distance: d2,
                    propagation_loss_db: distance_loss * d2 / total,
                    obstacles: self.obstacles_along(&via, rx, frequency_mhz, &[]),
                },
            ];
            let residual_floor_loss = (1.0 - opening.kind.vertical_bonus()) * floor_penetration_loss(floors, frequency_mhz, construction);
            paths.push(self.finish(PathKind::InterFloorOpening, legs, residual_floor_loss, eirp, frequency_mhz, 0));
        }
        paths
    }
}

/// Simplified estimate used when tracing yields nothing or the inputs are unusable:
/// EIRP + receiver gain − free-space loss, ignoring every obstacle.
pub fn free_space_estimate(tx: &RFTransmitter, frequency_mhz: f64, rx: &Point3D, rx_gain_dbi: f64) -> Option<f64> {
    let band = FrequencyBand::from_frequency(frequency_mhz);
    let eirp = tx.eirp_dbm(band, &Vector3D::between(&tx.location, rx))?;
    let distance = tx.location.distance_to(rx).max(MIN_SEGMENT_DISTANCE_M);
    Some(eirp + rx_gain_dbi - free_space_path_loss(distance, frequency_mhz))
}
