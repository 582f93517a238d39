//! Uniform-grid parameterization over quantized scene bounds.
//!
//! The grid covers the scene with cells of side `radius / cell_ratio` and
//! is decomposed into cubic power-of-two meta-grids: cells inside one
//! meta-grid can be ordered along a Morton curve while meta-grids
//! themselves stay in raster order. Grid dimensions are padded up to a
//! whole number of meta-grids, never truncated, so coverage of the scene
//! bounds is guaranteed.

pub(crate) mod binning;
mod morton;

use glam::{IVec3, UVec3, Vec3};

use crate::backend::ComputeBackend;
use crate::error::PrepError;
use crate::types::Point3;

/// Cell ordering applied inside the grid.
///
/// `Morton` orders cells along a Z-curve within each meta-grid; `Raster`
/// uses plain row-major order over the full grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveOrder {
    Morton,
    Raster,
}

/// Integer-quantized axis-aligned bounds of a particle set.
///
/// `max` carries a +1 cell margin: coordinates are floored during
/// quantization, which systematically under-covers the true maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneBounds {
    pub min: IVec3,
    pub max: IVec3,
}

impl SceneBounds {
    /// Reduce a particle set to its enclosing quantized bounds.
    ///
    /// Fails only on an empty set; callers guarantee N >= 1.
    pub fn estimate<B: ComputeBackend>(backend: &B, points: &[Point3]) -> Result<Self, PrepError> {
        let (mn, mx) = backend
            .reduce_bounds(points)
            .ok_or(PrepError::EmptyPointSet)?;
        Ok(Self {
            min: IVec3::from_array(mn),
            max: IVec3::from_array(mx) + IVec3::ONE,
        })
    }

    /// Scene extent per axis, in world units.
    #[inline]
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min).as_vec3()
    }

    /// World-space origin of the grid.
    #[inline]
    pub fn grid_min(&self) -> Vec3 {
        self.min.as_vec3()
    }
}

/// Derived grid parameters for one particle set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridInfo {
    /// Side length of one cell, in world units.
    pub cell_size: f32,
    /// World-space position of cell (0, 0, 0).
    pub grid_min: Vec3,
    /// Per-axis reciprocal of the cell size over the snapped grid extent.
    pub grid_delta: Vec3,
    /// Grid dimension before meta-grid padding (diagnostics only).
    pub raw_dims: UVec3,
    /// Grid dimension per axis, padded to a whole number of meta-grids.
    pub dims: UVec3,
    /// Side length of one cubic meta-grid, in cells (power of two).
    pub meta_grid_dim: u32,
    /// Cells per meta-grid (`meta_grid_dim^3`).
    pub meta_grid_size: u32,
    /// Number of meta-grids per axis.
    pub meta_dims: UVec3,
    /// Total cell count, including meta-grid padding.
    pub num_cells: u32,
}

impl GridInfo {
    /// Plan a grid over `bounds` with the given cell size.
    ///
    /// The meta-grid dimension is the largest power of two not exceeding
    /// half the smallest raw dimension; this bounds wasted padding while
    /// keeping each meta-grid cubic and curve-orderable. Degenerate tiny
    /// grids degrade to `meta_grid_dim == 1`, which is plain raster order.
    pub fn plan(bounds: SceneBounds, cell_size: f32) -> Result<Self, PrepError> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(PrepError::InvalidConfig(format!(
                "cell size must be positive and finite, got {}",
                cell_size
            )));
        }
        let extent = bounds.extent();
        for axis in 0..3 {
            if extent.to_array()[axis] <= 0.0 {
                return Err(PrepError::ZeroExtent { axis });
            }
        }

        let raw_dims = (extent / cell_size).ceil().as_uvec3().max(UVec3::ONE);

        // Snap the covered extent to a whole number of cells before taking
        // the reciprocal, so cell_coord() and the planned dimensions agree.
        let snapped = raw_dims.as_vec3() * cell_size;
        let grid_delta = raw_dims.as_vec3() / snapped;

        let min_dim = raw_dims.min_element();
        let mut meta_grid_dim = prev_power_of_two(min_dim) / 2;
        if meta_grid_dim == 0 {
            meta_grid_dim = 1;
        }
        let meta_grid_size = meta_grid_dim * meta_grid_dim * meta_grid_dim;

        let meta_dims = UVec3::new(
            raw_dims.x.div_ceil(meta_grid_dim),
            raw_dims.y.div_ceil(meta_grid_dim),
            raw_dims.z.div_ceil(meta_grid_dim),
        );
        // Padding can slightly grow the total cell count beyond the naive
        // estimate; the curve math needs every meta-grid complete.
        let dims = meta_dims * meta_grid_dim;

        let num_cells = (meta_dims.x as u64 * meta_dims.y as u64 * meta_dims.z as u64)
            * meta_grid_size as u64;
        let num_cells = u32::try_from(num_cells).map_err(|_| {
            PrepError::InvalidConfig(format!(
                "grid of {}x{}x{} cells exceeds the addressable cell count",
                dims.x, dims.y, dims.z
            ))
        })?;

        Ok(Self {
            cell_size,
            grid_min: bounds.grid_min(),
            grid_delta,
            raw_dims,
            dims,
            meta_grid_dim,
            meta_grid_size,
            meta_dims,
            num_cells,
        })
    }

    /// Cell coordinate containing `p`, clamped into the grid.
    ///
    /// Points used to build the grid always land inside it; clamping makes
    /// the mapping total for query sets that stray outside the scene.
    #[inline]
    pub fn cell_coord(&self, p: Point3) -> UVec3 {
        let f = ((p.to_vec3() - self.grid_min) * self.grid_delta).floor();
        f.clamp(Vec3::ZERO, (self.dims - UVec3::ONE).as_vec3())
            .as_uvec3()
    }

    /// Linear cell id for a coordinate under the given ordering.
    #[inline]
    pub fn cell_index(&self, c: UVec3, curve: CurveOrder) -> u32 {
        debug_assert!(c.x < self.dims.x && c.y < self.dims.y && c.z < self.dims.z);
        match curve {
            CurveOrder::Raster => c.x + c.y * self.dims.x + c.z * self.dims.x * self.dims.y,
            CurveOrder::Morton => {
                let meta = c / self.meta_grid_dim;
                let local = c % self.meta_grid_dim;
                let meta_raster =
                    meta.x + meta.y * self.meta_dims.x + meta.z * self.meta_dims.x * self.meta_dims.y;
                meta_raster * self.meta_grid_size + morton::morton3(local.x, local.y, local.z)
            }
        }
    }

    /// True if a signed coordinate lies inside the padded grid.
    #[inline]
    pub(crate) fn contains_coord(&self, c: IVec3) -> bool {
        c.x >= 0
            && c.y >= 0
            && c.z >= 0
            && (c.x as u32) < self.dims.x
            && (c.y as u32) < self.dims.y
            && (c.z as u32) < self.dims.z
    }
}

/// Largest power of two `<= x`; 0 for 0.
#[inline]
fn prev_power_of_two(x: u32) -> u32 {
    if x == 0 {
        0
    } else {
        1 << (31 - x.leading_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;

    fn bounds(min: [i32; 3], max: [i32; 3]) -> SceneBounds {
        SceneBounds {
            min: IVec3::from_array(min),
            max: IVec3::from_array(max),
        }
    }

    #[test]
    fn test_estimate_adds_margin() {
        let points = [Point3::new(0.5, 0.5, 0.5), Point3::new(3.9, 1.2, 2.0)];
        let b = SceneBounds::estimate(&CpuBackend, &points).unwrap();
        assert_eq!(b.min, IVec3::new(0, 0, 0));
        assert_eq!(b.max, IVec3::new(4, 2, 3));
    }

    #[test]
    fn test_plan_dims_are_meta_multiples() {
        let b = bounds([0, 0, 0], [37, 19, 53]);
        let grid = GridInfo::plan(b, 1.0).unwrap();
        assert_eq!(grid.dims % grid.meta_grid_dim, UVec3::ZERO);
        assert_eq!(grid.dims, grid.meta_dims * grid.meta_grid_dim);
        assert_eq!(
            grid.num_cells,
            grid.meta_dims.x * grid.meta_dims.y * grid.meta_dims.z * grid.meta_grid_size
        );
        // meta dim is the largest power of two <= min(raw)/2
        assert_eq!(grid.raw_dims.min_element(), 19);
        assert_eq!(grid.meta_grid_dim, 8);
    }

    #[test]
    fn test_plan_tiny_grid_degrades_to_raster() {
        let b = bounds([0, 0, 0], [1, 8, 8]);
        let grid = GridInfo::plan(b, 1.0).unwrap();
        assert_eq!(grid.meta_grid_dim, 1);
        assert_eq!(grid.dims, grid.raw_dims);
        // meta_grid_dim 1 makes Morton and raster identical
        for z in 0..grid.dims.z {
            for y in 0..grid.dims.y {
                for x in 0..grid.dims.x {
                    let c = UVec3::new(x, y, z);
                    assert_eq!(
                        grid.cell_index(c, CurveOrder::Morton),
                        grid.cell_index(c, CurveOrder::Raster)
                    );
                }
            }
        }
    }

    #[test]
    fn test_plan_rejects_zero_extent() {
        let b = bounds([0, 0, 0], [4, 0, 4]);
        assert!(matches!(
            GridInfo::plan(b, 1.0),
            Err(PrepError::ZeroExtent { axis: 1 })
        ));
    }

    #[test]
    fn test_cell_index_is_bijective() {
        let b = bounds([0, 0, 0], [8, 8, 8]);
        let grid = GridInfo::plan(b, 1.0).unwrap();
        for curve in [CurveOrder::Morton, CurveOrder::Raster] {
            let mut seen = vec![false; grid.num_cells as usize];
            for z in 0..grid.dims.z {
                for y in 0..grid.dims.y {
                    for x in 0..grid.dims.x {
                        let id = grid.cell_index(UVec3::new(x, y, z), curve) as usize;
                        assert!(id < seen.len());
                        assert!(!seen[id], "duplicate id under {:?}", curve);
                        seen[id] = true;
                    }
                }
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn test_cell_coord_clamps_strays() {
        let b = bounds([0, 0, 0], [4, 4, 4]);
        let grid = GridInfo::plan(b, 1.0).unwrap();
        assert_eq!(
            grid.cell_coord(Point3::new(-3.0, 1.5, 99.0)),
            UVec3::new(0, 1, grid.dims.z - 1)
        );
    }
}
