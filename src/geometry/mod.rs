//! Room geometry: immutable value types and the intersection tests built on them.
//!
//! - `types`: points, vectors, boxes, walls, furniture, openings and the aggregate room
//! - `intersection`: wall crossings, box clipping, mirror images, outline containment

pub mod intersection;
pub mod types;

pub use intersection::{WallCrossing, mirror_across_wall, same_side_of_wall, segment_box_intersection, wall_crossing};
pub use types::{
    BoundingBox, FloorConstruction, FloorDescription, FurnitureItem, FurnitureType, Opening, OpeningKind, PlacementSurface, Point2D, Point3D,
    RoomModel, Vector3D, WallElement, WallMaterial,
};
