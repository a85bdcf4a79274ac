//! Dense evaluation lattice over a room.
//!
//! Cells are addressed by integer coordinates `(ix, iy, iz)` and a flat index
//! `(iz × ny + iy) × nx + ix`. World coordinates are only ever derived from indices, never
//! used as keys.

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};
use crate::geometry::{BoundingBox, Point3D, RoomModel};

/// Shape of a lattice. Two maps can be combined only if their specs are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub bounds: BoundingBox,
    pub resolution_m: f64,
    pub vertical_resolution_m: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

/// Cell count and the offset that centres the cells inside an extent.
fn axis_layout(extent: f64, step: f64) -> (usize, f64) {
    let count = ((extent / step) + 1e-9).floor().max(1.0) as usize;
    let offset = (extent - count as f64 * step) / 2.0;
    (count, offset)
}

impl GridSpec {
    pub fn new(bounds: BoundingBox, resolution_m: f64, vertical_resolution_m: f64) -> Result<Self> {
        if !(resolution_m > 0.0) || !(vertical_resolution_m > 0.0) {
            return Err(CoverageError::InvalidConfiguration(format!(
                "Grid resolution must be positive (horizontal {}, vertical {})",
                resolution_m, vertical_resolution_m
            )));
        }
        let size = bounds.size();
        let (nx, _) = axis_layout(size.x, resolution_m);
        let (ny, _) = axis_layout(size.y, resolution_m);
        let (nz, _) = axis_layout(size.z, vertical_resolution_m);
        Ok(Self {
            bounds,
            resolution_m,
            vertical_resolution_m,
            nx,
            ny,
            nz,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn flat_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        (iz * self.ny + iy) * self.nx + ix
    }

    pub fn coords(&self, flat: usize) -> (usize, usize, usize) {
        let ix = flat % self.nx;
        let iy = (flat / self.nx) % self.ny;
        let iz = flat / (self.nx * self.ny);
        (ix, iy, iz)
    }

    fn axis_coordinate(min: f64, extent: f64, step: f64, i: usize) -> f64 {
        let (_, offset) = axis_layout(extent, step);
        min + (offset + (i as f64 + 0.5) * step)
    }

    /// World position of a cell centre.
    pub fn point(&self, flat: usize) -> Point3D {
        let (ix, iy, iz) = self.coords(flat);
        let size = self.bounds.size();
        Point3D::new(
            Self::axis_coordinate(self.bounds.min.x, size.x, self.resolution_m, ix),
            Self::axis_coordinate(self.bounds.min.y, size.y, self.resolution_m, iy),
            Self::axis_coordinate(self.bounds.min.z, size.z, self.vertical_resolution_m, iz),
        )
    }

    fn axis_index(value: f64, min: f64, extent: f64, step: f64, count: usize) -> Option<usize> {
        let (_, offset) = axis_layout(extent, step);
        let i = ((value - min - offset) / step - 0.5).round();
        if i < 0.0 || i >= count as f64 || !i.is_finite() { None } else { Some(i as usize) }
    }

    /// Flat index of the cell whose centre is nearest to `p`, if `p` falls on the lattice.
    pub fn index_of(&self, p: &Point3D) -> Option<usize> {
        let size = self.bounds.size();
        let ix = Self::axis_index(p.x, self.bounds.min.x, size.x, self.resolution_m, self.nx)?;
        let iy = Self::axis_index(p.y, self.bounds.min.y, size.y, self.resolution_m, self.ny)?;
        let iz = Self::axis_index(p.z, self.bounds.min.z, size.z, self.vertical_resolution_m, self.nz)?;
        Some(self.flat_index(ix, iy, iz))
    }
}

/// A lattice plus the subset of cells that are actually evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageGrid {
    pub spec: GridSpec,
    active: Vec<bool>,
}

impl CoverageGrid {
    /// Lattice over the room bounds, keeping only cells whose centre is inside the room.
    ///
    /// Fails with `CalculationFailed` when the lattice would hold more than `max_points` cells.
    pub fn for_room(room: &RoomModel, resolution_m: f64, vertical_resolution_m: f64, max_points: usize) -> Result<Self> {
        let spec = GridSpec::new(room.bounds, resolution_m, vertical_resolution_m)?;
        if spec.cell_count() > max_points {
            return Err(CoverageError::CalculationFailed(format!(
                "Room {} needs {} grid points at {} m, limit is {}",
                room.id,
                spec.cell_count(),
                resolution_m,
                max_points
            )));
        }
        let active: Vec<bool> = (0..spec.cell_count()).map(|i| room.contains_point(&spec.point(i))).collect();
        let grid = Self { spec, active };
        if grid.active_count() == 0 {
            return Err(CoverageError::CalculationFailed(format!("Room {} has no grid points inside its bounds", room.id)));
        }
        Ok(grid)
    }

    /// One-cell lattice centred exactly on `location`.
    pub fn single_point(location: Point3D, resolution_m: f64, vertical_resolution_m: f64) -> Result<Self> {
        let spec = GridSpec::new(BoundingBox::new(location, location), resolution_m, vertical_resolution_m)?;
        Ok(Self { spec, active: vec![true] })
    }

    pub fn is_active(&self, flat: usize) -> bool {
        self.active.get(flat).copied().unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }

    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.active.iter().enumerate().filter(|(_, a)| **a).map(|(i, _)| i)
    }

    pub fn point(&self, flat: usize) -> Point3D {
        self.spec.point(flat)
    }
}
