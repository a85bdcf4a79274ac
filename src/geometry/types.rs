//! Value types for room geometry.
//!
//! Every type here is immutable once handed to the engine. Coordinates are meters, with the
//! z axis pointing up from the floor of the scanned room.

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};

/// Lengths below this are treated as zero when validating geometry.
pub const GEOMETRY_EPSILON: f64 = 1e-9;

/// Point in room coordinates (meters).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Point3D) -> f64 {
        Vector3D::between(self, other).length()
    }

    /// Distance of the floor-plane projections, ignoring height.
    pub fn horizontal_distance_to(&self, other: &Point3D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation; `t = 0` is `self`, `t = 1` is `other`.
    pub fn lerp(&self, other: &Point3D, t: f64) -> Point3D {
        Point3D::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }

    pub fn to_2d(&self) -> Point2D {
        Point2D { x: self.x, y: self.y }
    }
}

/// Floor-plane point used by outlines and 2D intersection tests.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Direction or displacement in room coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Vector pointing from `from` to `to`.
    pub fn between(from: &Point3D, to: &Point3D) -> Self {
        Self::new(to.x - from.x, to.y - from.y, to.z - from.z)
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction. A zero vector stays zero instead of becoming NaN.
    pub fn normalize(&self) -> Vector3D {
        let len = self.length();
        if len < GEOMETRY_EPSILON {
            return Vector3D::default();
        }
        self.scale(1.0 / len)
    }

    pub fn dot(&self, other: &Vector3D) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector3D) -> Vector3D {
        Vector3D::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Angle in radians between two vectors, in `[0, π]`. Zero-length input yields 0.
    pub fn angle_between(&self, other: &Vector3D) -> f64 {
        let denom = self.length() * other.length();
        if denom < GEOMETRY_EPSILON {
            return 0.0;
        }
        (self.dot(other) / denom).clamp(-1.0, 1.0).acos()
    }

    pub fn scale(&self, factor: f64) -> Vector3D {
        Vector3D::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

/// Axis-aligned box. `min <= max` holds component-wise for every constructed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBoundingBox")]
pub struct BoundingBox {
    pub min: Point3D,
    pub max: Point3D,
}

#[derive(Deserialize)]
struct RawBoundingBox {
    min: Point3D,
    max: Point3D,
}

impl From<RawBoundingBox> for BoundingBox {
    fn from(raw: RawBoundingBox) -> Self {
        BoundingBox::new(raw.min, raw.max)
    }
}

impl BoundingBox {
    /// Builds a box from two arbitrary corners, sorting each component.
    pub fn new(a: Point3D, b: Point3D) -> Self {
        Self {
            min: Point3D::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3D::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn center(&self) -> Point3D {
        self.min.lerp(&self.max, 0.5)
    }

    pub fn size(&self) -> Vector3D {
        Vector3D::between(&self.min, &self.max)
    }

    pub fn floor_area(&self) -> f64 {
        let s = self.size();
        s.x * s.y
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: &Point3D) -> bool {
        self.contains_with_tolerance(p, 0.0)
    }

    pub fn contains_with_tolerance(&self, p: &Point3D, tolerance: f64) -> bool {
        p.x >= self.min.x - tolerance
            && p.x <= self.max.x + tolerance
            && p.y >= self.min.y - tolerance
            && p.y <= self.max.y + tolerance
            && p.z >= self.min.z - tolerance
            && p.z <= self.max.z + tolerance
    }
}

/// Construction material of a wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallMaterial {
    Drywall,
    Concrete,
    Brick,
    Wood,
    Glass,
    Metal,
}

/// Empirical RF properties of a material at 2.4 GHz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialProperties {
    /// Penetration loss per 10 cm of material (dB).
    pub attenuation_db_per_10cm: f64,
    /// Loss floor for thin sheets of the material (dB).
    pub minimum_loss_db: f64,
    /// Magnitude of the reflection coefficient at normal incidence, in `(0, 1)`.
    pub reflection_coefficient: f64,
    /// Exponent of the `(f / 2.4 GHz)` frequency scaling.
    pub frequency_exponent: f64,
}

impl WallMaterial {
    pub fn properties(&self) -> MaterialProperties {
        match self {
            WallMaterial::Drywall => MaterialProperties {
                attenuation_db_per_10cm: 1.5,
                minimum_loss_db: 2.0,
                reflection_coefficient: 0.4,
                frequency_exponent: 0.3,
            },
            WallMaterial::Concrete => MaterialProperties {
                attenuation_db_per_10cm: 5.5,
                minimum_loss_db: 8.0,
                reflection_coefficient: 0.7,
                frequency_exponent: 0.3,
            },
            WallMaterial::Brick => MaterialProperties {
                attenuation_db_per_10cm: 4.0,
                minimum_loss_db: 6.0,
                reflection_coefficient: 0.6,
                frequency_exponent: 0.3,
            },
            WallMaterial::Wood => MaterialProperties {
                attenuation_db_per_10cm: 2.0,
                minimum_loss_db: 3.0,
                reflection_coefficient: 0.45,
                frequency_exponent: 0.25,
            },
            WallMaterial::Glass => MaterialProperties {
                attenuation_db_per_10cm: 3.0,
                minimum_loss_db: 2.0,
                reflection_coefficient: 0.5,
                frequency_exponent: 0.35,
            },
            WallMaterial::Metal => MaterialProperties {
                attenuation_db_per_10cm: 12.0,
                minimum_loss_db: 20.0,
                reflection_coefficient: 0.95,
                frequency_exponent: 0.2,
            },
        }
    }
}

/// `(f / 2400 MHz) ^ exponent`, with non-positive frequencies treated as 2.4 GHz.
pub fn material_frequency_factor(frequency_mhz: f64, exponent: f64) -> f64 {
    if frequency_mhz <= 0.0 {
        return 1.0;
    }
    (frequency_mhz / 2400.0).powf(exponent)
}

/// Vertical wall slab between two floor-plane endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallElement {
    pub id: String,
    /// Start point; its z is the wall's base height.
    pub start: Point3D,
    pub end: Point3D,
    pub height: f64,
    pub thickness: f64,
    pub material: WallMaterial,
}

impl WallElement {
    /// Creates a wall, rejecting zero-length or non-positive-height slabs.
    pub fn new(id: impl Into<String>, start: Point3D, end: Point3D, height: f64, thickness: f64, material: WallMaterial) -> Result<Self> {
        let wall = Self {
            id: id.into(),
            start,
            end,
            height,
            thickness,
            material,
        };
        wall.validate()?;
        Ok(wall)
    }

    pub fn validate(&self) -> Result<()> {
        if self.length() < GEOMETRY_EPSILON {
            return Err(CoverageError::InvalidConfiguration(format!("Wall {} has zero length", self.id)));
        }
        if self.height <= 0.0 || self.thickness <= 0.0 {
            return Err(CoverageError::InvalidConfiguration(format!(
                "Wall {} must have positive height and thickness (got {} m, {} m)",
                self.id, self.height, self.thickness
            )));
        }
        Ok(())
    }

    /// Length of the wall's floor-plane footprint.
    pub fn length(&self) -> f64 {
        self.start.horizontal_distance_to(&self.end)
    }

    pub fn base_z(&self) -> f64 {
        self.start.z
    }

    pub fn top_z(&self) -> f64 {
        self.start.z + self.height
    }

    pub fn spans_height(&self, z: f64) -> bool {
        z >= self.base_z() - GEOMETRY_EPSILON && z <= self.top_z() + GEOMETRY_EPSILON
    }

    /// Unit normal of the wall plane (horizontal).
    pub fn normal(&self) -> Vector3D {
        let d = Vector3D::new(self.end.x - self.start.x, self.end.y - self.start.y, 0.0);
        Vector3D::new(-d.y, d.x, 0.0).normalize()
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            Point3D::new(self.start.x, self.start.y, self.base_z()),
            Point3D::new(self.end.x, self.end.y, self.top_z()),
        )
    }
}

/// Furniture categories produced by the room scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FurnitureType {
    Sofa,
    Bed,
    Table,
    Desk,
    Chair,
    Cabinet,
    Bookshelf,
    Refrigerator,
    Appliance,
    Television,
    Other,
}

impl FurnitureType {
    /// Through-loss of a typical item at 2.4 GHz (dB).
    pub fn attenuation_db(&self) -> f64 {
        match self {
            FurnitureType::Sofa | FurnitureType::Bed => 3.0,
            FurnitureType::Table | FurnitureType::Desk => 2.0,
            FurnitureType::Chair => 1.0,
            FurnitureType::Cabinet | FurnitureType::Bookshelf => 4.0,
            FurnitureType::Refrigerator | FurnitureType::Appliance => 12.0,
            FurnitureType::Television => 6.0,
            FurnitureType::Other => 3.0,
        }
    }
}

/// Flat top of a furniture item where a device could be placed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementSurface {
    pub center: Point3D,
    pub width: f64,
    pub depth: f64,
}

/// Detected furniture item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FurnitureItem {
    pub id: String,
    pub bounds: BoundingBox,
    #[serde(rename = "type")]
    pub kind: FurnitureType,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub placement_surfaces: Vec<PlacementSurface>,
}

/// Kinds of openings. Doors, windows and doorways sit in walls; the rest connect floors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningKind {
    Door,
    Window,
    Doorway,
    Stairwell,
    Elevator,
    Atrium,
}

impl OpeningKind {
    pub fn is_vertical(&self) -> bool {
        matches!(self, OpeningKind::Stairwell | OpeningKind::Elevator | OpeningKind::Atrium)
    }

    /// Loss through a wall opening (dB at 2.4 GHz), replacing the wall's own loss.
    pub fn penetration_loss_db(&self) -> f64 {
        match self {
            OpeningKind::Door => 3.0,
            OpeningKind::Window => 2.0,
            OpeningKind::Doorway => 0.0,
            OpeningKind::Stairwell | OpeningKind::Elevator | OpeningKind::Atrium => 0.0,
        }
    }

    /// Fraction of floor-penetration loss avoided by travelling through a vertical opening.
    pub fn vertical_bonus(&self) -> f64 {
        match self {
            OpeningKind::Stairwell => 0.6,
            OpeningKind::Elevator => 0.3,
            OpeningKind::Atrium => 0.8,
            OpeningKind::Door | OpeningKind::Window | OpeningKind::Doorway => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opening {
    pub id: String,
    pub kind: OpeningKind,
    pub bounds: BoundingBox,
    /// Wall the opening is cut into; `None` for vertical openings.
    #[serde(default)]
    pub wall_id: Option<String>,
}

/// How floors between storeys are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorConstruction {
    WoodFrame,
    #[default]
    Concrete,
    SteelConcrete,
}

/// Storey information of the scanned room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorDescription {
    /// Floor-to-floor height in meters.
    #[serde(default = "default_storey_height")]
    pub storey_height: f64,
    /// Slab construction reported by the scan; the environment's default applies when absent.
    #[serde(default)]
    pub construction: Option<FloorConstruction>,
    /// Optional floor outline; when present, grid points outside it are not evaluated.
    #[serde(default)]
    pub outline: Vec<Point2D>,
}

fn default_storey_height() -> f64 {
    3.0
}

impl Default for FloorDescription {
    fn default() -> Self {
        Self {
            storey_height: default_storey_height(),
            construction: None,
            outline: Vec::new(),
        }
    }
}

/// Aggregate room produced by the scanning collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomModel {
    pub id: String,
    pub bounds: BoundingBox,
    #[serde(default)]
    pub walls: Vec<WallElement>,
    #[serde(default)]
    pub furniture: Vec<FurnitureItem>,
    #[serde(default)]
    pub openings: Vec<Opening>,
    #[serde(default)]
    pub floor: FloorDescription,
}

impl RoomModel {
    /// Checks the minimum data a coverage run needs.
    pub fn validate(&self) -> Result<()> {
        let size = self.bounds.size();
        if size.x <= GEOMETRY_EPSILON || size.y <= GEOMETRY_EPSILON || size.z <= GEOMETRY_EPSILON {
            return Err(CoverageError::InsufficientData(format!("Room {} has degenerate bounds", self.id)));
        }
        if self.walls.is_empty() {
            return Err(CoverageError::InsufficientData(format!("Room {} has no walls", self.id)));
        }
        for wall in &self.walls {
            wall.validate()?;
        }
        if !(self.floor.storey_height > 0.0) || !self.floor.storey_height.is_finite() {
            return Err(CoverageError::InvalidConfiguration(format!(
                "Room {} storey height must be positive, got {}",
                self.id, self.floor.storey_height
            )));
        }
        Ok(())
    }

    /// Ids of walls, furniture and openings lying outside the bounds by more than `tolerance`.
    ///
    /// Scanner output is noisy; callers log these rather than rejecting the room.
    pub fn out_of_bounds_elements(&self, tolerance: f64) -> Vec<String> {
        let mut ids = Vec::new();
        for wall in &self.walls {
            if !self.bounds.contains_with_tolerance(&wall.start, tolerance) || !self.bounds.contains_with_tolerance(&wall.end, tolerance) {
                ids.push(wall.id.clone());
            }
        }
        for item in &self.furniture {
            if !self.bounds.contains_with_tolerance(&item.bounds.min, tolerance) || !self.bounds.contains_with_tolerance(&item.bounds.max, tolerance) {
                ids.push(item.id.clone());
            }
        }
        for opening in &self.openings {
            if !self.bounds.contains_with_tolerance(&opening.bounds.center(), tolerance) {
                ids.push(opening.id.clone());
            }
        }
        ids
    }

    /// True if the point is inside the bounds and, when an outline is given, inside the outline.
    pub fn contains_point(&self, p: &Point3D) -> bool {
        if !self.bounds.contains(p) {
            return false;
        }
        if self.floor.outline.len() < 3 {
            return true;
        }
        super::intersection::point_in_polygon(&p.to_2d(), &self.floor.outline)
    }

    pub fn wall_openings<'a>(&'a self, wall_id: &'a str) -> impl Iterator<Item = &'a Opening> + 'a {
        self.openings.iter().filter(move |o| o.wall_id.as_deref() == Some(wall_id))
    }

    pub fn vertical_openings(&self) -> impl Iterator<Item = &Opening> {
        self.openings.iter().filter(|o| o.kind.is_vertical())
    }

    pub fn floor_area(&self) -> f64 {
        self.bounds.floor_area()
    }
}
