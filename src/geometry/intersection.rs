//! Intersection tests used by the ray tracer and the grid builder.
//!
//! Contains helper functions for:
//! - Parametric segment-segment intersection on the floor plane
//! - Parametric crossing of a 3D ray segment with a vertical wall slab
//! - Slab-method clipping of a segment against an axis-aligned box
//! - Mirror images across wall planes (image method for reflections)
//! - Point-in-polygon tests for floor outlines
//!
//! Walls are vertical, so every wall test reduces to a 2D test on the floor plane followed
//! by a height check at the crossing parameter.

use super::types::{BoundingBox, GEOMETRY_EPSILON, Point2D, Point3D, Vector3D, WallElement};

/// Where a segment crosses a wall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallCrossing {
    /// Parameter along the segment, in `[0, 1]`.
    pub t: f64,
    pub point: Point3D,
    /// Angle between the segment direction and the wall normal (radians, `[0, π/2]`).
    pub incidence_angle: f64,
}

/// Parameters `(t, u)` of the crossing of segments `p1→q1` and `p2→q2`, both in `[0, 1]`.
///
/// Parallel and collinear segments return `None`; a ray grazing along a wall face does not
/// cross it.
pub fn segment_intersection_params(p1: &Point2D, q1: &Point2D, p2: &Point2D, q2: &Point2D) -> Option<(f64, f64)> {
    let rx = q1.x - p1.x;
    let ry = q1.y - p1.y;
    let sx = q2.x - p2.x;
    let sy = q2.y - p2.y;
    let denom = rx * sy - ry * sx;
    if denom.abs() < GEOMETRY_EPSILON {
        return None;
    }
    let qpx = p2.x - p1.x;
    let qpy = p2.y - p1.y;
    let t = (qpx * sy - qpy * sx) / denom;
    let u = (qpx * ry - qpy * rx) / denom;
    let range = -GEOMETRY_EPSILON..=1.0 + GEOMETRY_EPSILON;
    if range.contains(&t) && range.contains(&u) {
        Some((t.clamp(0.0, 1.0), u.clamp(0.0, 1.0)))
    } else {
        None
    }
}

/// Crossing of the 3D segment `a→b` with the wall slab, if the crossing point lies within
/// the wall's length and height.
pub fn wall_crossing(a: &Point3D, b: &Point3D, wall: &WallElement) -> Option<WallCrossing> {
    let (t, _) = segment_intersection_params(&a.to_2d(), &b.to_2d(), &wall.start.to_2d(), &wall.end.to_2d())?;
    let point = a.lerp(b, t);
    if !wall.spans_height(point.z) {
        return None;
    }
    let direction = Vector3D::between(a, b);
    let angle = direction.angle_between(&wall.normal());
    // Normal orientation is arbitrary; fold into [0, π/2]
    let incidence_angle = if angle > std::f64::consts::FRAC_PI_2 { std::f64::consts::PI - angle } else { angle };
    Some(WallCrossing { t, point, incidence_angle })
}

/// Entry and exit parameters of segment `a→b` through the box (slab method).
///
/// Returns `None` when the segment misses the box. A segment starting inside the box
/// enters at `t = 0`.
pub fn segment_box_intersection(a: &Point3D, b: &Point3D, bbox: &BoundingBox) -> Option<(f64, f64)> {
    let origin = [a.x, a.y, a.z];
    let dir = [b.x - a.x, b.y - a.y, b.z - a.z];
    let min = [bbox.min.x, bbox.min.y, bbox.min.z];
    let max = [bbox.max.x, bbox.max.y, bbox.max.z];

    let mut t_enter: f64 = 0.0;
    let mut t_exit: f64 = 1.0;
    for axis in 0..3 {
        if dir[axis].abs() < GEOMETRY_EPSILON {
            if origin[axis] < min[axis] || origin[axis] > max[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dir[axis];
        let mut t0 = (min[axis] - origin[axis]) * inv;
        let mut t1 = (max[axis] - origin[axis]) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_enter = t_enter.max(t0);
        t_exit = t_exit.min(t1);
        if t_enter > t_exit {
            return None;
        }
    }
    Some((t_enter, t_exit))
}

/// Signed distance of `p` from the wall line in the floor plane.
fn signed_distance_to_wall(p: &Point3D, wall: &WallElement) -> f64 {
    let n = wall.normal();
    (p.x - wall.start.x) * n.x + (p.y - wall.start.y) * n.y
}

/// Mirror image of `p` across the (infinite, vertical) plane of the wall. Height is preserved.
pub fn mirror_across_wall(p: &Point3D, wall: &WallElement) -> Point3D {
    let n = wall.normal();
    let d = signed_distance_to_wall(p, wall);
    Point3D::new(p.x - 2.0 * d * n.x, p.y - 2.0 * d * n.y, p.z)
}

/// True when both points lie strictly on the same side of the wall plane.
pub fn same_side_of_wall(a: &Point3D, b: &Point3D, wall: &WallElement) -> bool {
    let da = signed_distance_to_wall(a, wall);
    let db = signed_distance_to_wall(b, wall);
    (da > GEOMETRY_EPSILON && db > GEOMETRY_EPSILON) || (da < -GEOMETRY_EPSILON && db < -GEOMETRY_EPSILON)
}

/// Even-odd ray casting test. Points on the boundary may fall either way.
pub fn point_in_polygon(p: &Point2D, polygon: &[Point2D]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let pi = &polygon[i];
        let pj = &polygon[j];
        if (pi.y > p.y) != (pj.y > p.y) {
            let x_cross = pj.x + (p.y - pj.y) * (pi.x - pj.x) / (pi.y - pj.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
