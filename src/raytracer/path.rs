//! Ray paths and the obstacles they traverse.
//!
//! Paths are built once per transmitter/receiver pair and never modified afterwards.

use serde::{Deserialize, Serialize};

use crate::geometry::{FurnitureType, OpeningKind, Point3D, WallMaterial};
use crate::propagation::{NO_SIGNAL_DBM, combine_powers_dbm};

/// Something a segment passes through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObstacleHit {
    Wall {
        wall_id: String,
        material: WallMaterial,
        thickness: f64,
        incidence_angle: f64,
        loss_db: f64,
    },
    Furniture {
        furniture_id: String,
        kind: FurnitureType,
        loss_db: f64,
    },
    /// A door, window or doorway cut into a wall; replaces that wall's loss.
    Opening {
        opening_id: String,
        kind: OpeningKind,
        loss_db: f64,
    },
}

impl ObstacleHit {
    pub fn loss_db(&self) -> f64 {
        match self {
            ObstacleHit::Wall { loss_db, .. } | ObstacleHit::Furniture { loss_db, .. } | ObstacleHit::Opening { loss_db, .. } => *loss_db,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ObstacleHit::Wall { wall_id, .. } => wall_id,
            ObstacleHit::Furniture { furniture_id, .. } => furniture_id,
            ObstacleHit::Opening { opening_id, .. } => opening_id,
        }
    }
}

/// How a path reaches the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Direct,
    SingleReflection,
    DoubleReflection,
    /// Straight through one or more floor slabs.
    InterFloor,
    /// Through a stairwell, elevator shaft or atrium.
    InterFloorOpening,
}

/// One straight leg of a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaySegment {
    pub start: Point3D,
    pub end: Point3D,
    pub distance: f64,
    /// Distance-dependent loss of the leg (dB), without obstacles.
    pub propagation_loss_db: f64,
    pub obstacles: Vec<ObstacleHit>,
}

impl RaySegment {
    pub fn obstacle_loss_db(&self) -> f64 {
        self.obstacles.iter().map(ObstacleHit::loss_db).sum()
    }

    pub fn total_loss_db(&self) -> f64 {
        self.propagation_loss_db + self.obstacle_loss_db()
    }
}

/// A complete transmitter-to-receiver path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RayPath {
    pub kind: PathKind,
    pub segments: Vec<RaySegment>,
    pub total_distance: f64,
    /// Segment losses plus reflection losses (dB).
    pub total_loss_db: f64,
    pub received_power_dbm: f64,
    pub reflection_count: u32,
}

impl RayPath {
    /// Assembles a path from its legs. `extra_loss_db` covers losses not attributed to a leg
    /// (reflections, floor slabs).
    pub fn new(kind: PathKind, segments: Vec<RaySegment>, extra_loss_db: f64, eirp_dbm: f64, rx_gain_dbi: f64, reflection_count: u32) -> Self {
        let total_distance = segments.iter().map(|s| s.distance).sum();
        let total_loss_db = segments.iter().map(RaySegment::total_loss_db).sum::<f64>() + extra_loss_db;
        Self {
            kind,
            segments,
            total_distance,
            total_loss_db,
            received_power_dbm: eirp_dbm + rx_gain_dbi - total_loss_db,
            reflection_count,
        }
    }

    pub fn obstacles(&self) -> impl Iterator<Item = &ObstacleHit> {
        self.segments.iter().flat_map(|s| s.obstacles.iter())
    }

    pub fn obstacle_count(&self) -> usize {
        self.segments.iter().map(|s| s.obstacles.len()).sum()
    }
}

/// Accepted paths at one receiver, combined in linear power.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipathResult {
    pub paths: Vec<RayPath>,
    pub combined_power_dbm: f64,
    pub dominant_power_dbm: f64,
    /// Combined minus dominant power (dB, ≥ 0). Large margins mean no single path dominates.
    pub fading_margin_db: f64,
}

impl MultipathResult {
    pub fn from_paths(paths: Vec<RayPath>) -> Self {
        if paths.is_empty() {
            return Self {
                paths,
                combined_power_dbm: NO_SIGNAL_DBM,
                dominant_power_dbm: NO_SIGNAL_DBM,
                fading_margin_db: 0.0,
            };
        }
        let combined = combine_powers_dbm(paths.iter().map(|p| p.received_power_dbm));
        let dominant = paths.iter().map(|p| p.received_power_dbm).fold(f64::NEG_INFINITY, f64::max);
        Self {
            paths,
            combined_power_dbm: combined,
            dominant_power_dbm: dominant,
            fading_margin_db: (combined - dominant).max(0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn dominant_path(&self) -> Option<&RayPath> {
        self.paths.iter().max_by(|a, b| a.received_power_dbm.total_cmp(&b.received_power_dbm))
    }

    /// Obstacles on the dominant path, 0 when nothing was found.
    pub fn dominant_obstacle_count(&self) -> usize {
        self.dominant_path().map(RayPath::obstacle_count).unwrap_or(0)
    }
}
