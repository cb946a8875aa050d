//! Mesh → narrow-band volume conversion pipeline.
//!
//! Turns a triangle/quad mesh given in grid index space into a sparse
//! narrow-band signed distance field (level set) or unsigned distance
//! field, plus an optional closest-primitive index grid.
//!
//! # Pipeline
//!
//! 1. **Rasterize** ([`voxelizer`]): per-polygon parallel flood fill writes
//!    negated squared distances, closest-primitive indices, and the
//!    intersecting-voxel mask in a thin shell around the surface
//! 2. **Sign** ([`contour`], [`sign`]): slice-wise contour tracing flips
//!    the exterior positive, boundary-constrained flood fills repair
//!    stragglers, and closest-point direction voting settles the voxels on
//!    the surface itself
//! 3. **Scale** ([`xform`]): `sqrt` + world scaling, signed flood fill of
//!    the far field, background swap
//! 4. **Expand** ([`expand`]): narrow-band dilation with exact per-voxel
//!    re-measurement against the inherited closest primitive
//! 5. **Smooth** ([`renorm`]): one upwind eikonal step blends away bumps
//!    from overlapping geometry
//!
//! The conversion does not require a manifold mesh, consistent winding, or
//! freedom from self-intersection; it does assume a closed surface for the
//! signed output.
//!
//! Author: Moroya Sakamoto

pub mod contour;
pub mod expand;
pub mod renorm;
pub mod sign;
pub mod voxelizer;
pub mod xform;

use glam::UVec4;
use thiserror::Error;
use tracing::debug;

use crate::geom::INVALID_IDX;
use crate::interrupt::{Interrupter, NullInterrupter};
use crate::transform::Transform;
use crate::tree::{Tree, TreeValue};

/// Conversion flag: keep the closest-primitive index grid in the output.
pub const GENERATE_PRIM_INDEX_GRID: u32 = 0x1;

/// Build a triangle polygon entry.
#[inline]
pub fn tri(a: u32, b: u32, c: u32) -> UVec4 {
    UVec4::new(a, b, c, INVALID_IDX)
}

/// Build a quad polygon entry.
#[inline]
pub fn quad(a: u32, b: u32, c: u32, d: u32) -> UVec4 {
    UVec4::new(a, b, c, d)
}

/// Interpretation of a grid's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridClass {
    /// No particular interpretation (e.g. unsigned distances).
    Unknown,
    /// Narrow-band signed distance field.
    LevelSet,
}

/// A sparse tree annotated with its index→world transform and class.
pub struct Grid<T: TreeValue> {
    /// Voxel payload.
    pub tree: Tree<T>,
    /// Index-space → world-space mapping.
    pub transform: Transform,
    /// Interpretation of the stored values.
    pub class: GridClass,
}

impl<T: TreeValue> Grid<T> {
    /// Create an empty grid with the given background value.
    pub fn new(background: T, transform: Transform) -> Self {
        Grid {
            tree: Tree::new(background),
            transform,
            class: GridClass::Unknown,
        }
    }
}

/// Conversion failures.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The interrupter tripped; output grids hold partial results that
    /// should be discarded.
    #[error("conversion interrupted")]
    Interrupted,

    /// A polygon references a vertex outside the point list.
    #[error("polygon {polygon} references vertex {vertex}, but only {point_count} points given")]
    VertexOutOfRange {
        /// Offending polygon index.
        polygon: usize,
        /// Out-of-range vertex index.
        vertex: u32,
        /// Number of points supplied.
        point_count: usize,
    },

    /// A polygon has fewer than three valid vertices.
    #[error("polygon {polygon} has fewer than 3 valid vertices")]
    DegeneratePolygon {
        /// Offending polygon index.
        polygon: usize,
    },
}

/// Conversion tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct MeshToVolumeConfig {
    /// Bitset of conversion flags ([`GENERATE_PRIM_INDEX_GRID`]).
    pub flags: u32,
    /// Number of (contour trace → sign propagation) rounds, at least 1.
    pub sign_sweeps: u32,
    /// CFL factor for the renormalization step size.
    pub cfl: f64,
}

impl Default for MeshToVolumeConfig {
    fn default() -> Self {
        MeshToVolumeConfig {
            flags: 0,
            sign_sweeps: 1,
            cfl: 1.0,
        }
    }
}

/// Mesh to signed/unsigned distance field converter.
///
/// Points are given in grid index space; polygons are `UVec4` entries whose
/// fourth component is [`INVALID_IDX`] for triangles (see [`tri`] and
/// [`quad`]). Band widths are in voxel units and are clamped to at least
/// one voxel.
///
/// The signed conversion requires a closed surface but tolerates
/// self-intersections, degenerate faces, and inconsistent winding.
pub struct MeshToVolume<I: Interrupter = NullInterrupter> {
    transform: Transform,
    config: MeshToVolumeConfig,
    interrupter: I,

    dist_grid: Grid<f32>,
    index_grid: Grid<i32>,
    intersecting_voxels: Tree<bool>,
}

impl MeshToVolume<NullInterrupter> {
    /// Create a converter for the given transform.
    pub fn new(transform: Transform) -> Self {
        MeshToVolume {
            transform,
            config: MeshToVolumeConfig::default(),
            interrupter: NullInterrupter,
            dist_grid: Grid::new(f32::MAX, transform),
            index_grid: Grid::new(INVALID_IDX as i32, transform),
            intersecting_voxels: Tree::new(false),
        }
    }
}

impl<I: Interrupter> MeshToVolume<I> {
    /// Replace the whole configuration.
    pub fn with_config(mut self, config: MeshToVolumeConfig) -> Self {
        self.config = config;
        self.config.sign_sweeps = self.config.sign_sweeps.max(1);
        self
    }

    /// Set the conversion flags bitset.
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.config.flags = flags;
        self
    }

    /// Set the number of sign sweeps (clamped to at least 1).
    pub fn with_sign_sweeps(mut self, sign_sweeps: u32) -> Self {
        self.config.sign_sweeps = sign_sweeps.max(1);
        self
    }

    /// Attach an interrupter polled by every pipeline stage.
    pub fn with_interrupter<J: Interrupter>(self, interrupter: J) -> MeshToVolume<J> {
        MeshToVolume {
            transform: self.transform,
            config: self.config,
            interrupter,
            dist_grid: self.dist_grid,
            index_grid: self.index_grid,
            intersecting_voxels: self.intersecting_voxels,
        }
    }

    /// The signed/unsigned distance grid produced by the last conversion.
    pub fn dist_grid(&self) -> &Grid<f32> {
        &self.dist_grid
    }

    /// The closest-primitive index grid, if [`GENERATE_PRIM_INDEX_GRID`]
    /// was requested.
    pub fn index_grid(&self) -> Option<&Grid<i32>> {
        (self.config.flags & GENERATE_PRIM_INDEX_GRID != 0).then_some(&self.index_grid)
    }

    /// Consume the converter, returning the distance grid and, when
    /// requested, the index grid.
    pub fn into_grids(self) -> (Grid<f32>, Option<Grid<i32>>) {
        let index = (self.config.flags & GENERATE_PRIM_INDEX_GRID != 0).then_some(self.index_grid);
        (self.dist_grid, index)
    }

    /// Reset the output grids to their empty state.
    pub fn clear(&mut self) {
        self.dist_grid = Grid::new(f32::MAX, self.transform);
        self.index_grid = Grid::new(INVALID_IDX as i32, self.transform);
        self.intersecting_voxels = Tree::new(false);
    }

    /// Convert a mesh into a narrow-band level set.
    ///
    /// `ex_band_width` and `in_band_width` are the exterior and interior
    /// band widths in voxel units, clamped to at least `1 + 1e-7`.
    pub fn convert_to_level_set(
        &mut self,
        points: &[glam::Vec3],
        polys: &[UVec4],
        ex_band_width: f64,
        in_band_width: f64,
    ) -> Result<(), ConvertError> {
        // The band is exclusive, the shortest valid distance is > 1 voxel.
        let ex = ex_band_width.max(1.0 + 1e-7);
        let inb = in_band_width.max(1.0 + 1e-7);
        let vs = self.transform.voxel_size();
        self.do_convert(points, polys, vs * ex, vs * inb, false)?;
        self.dist_grid.class = GridClass::LevelSet;
        Ok(())
    }

    /// Convert a mesh into an unsigned distance field. The surface does not
    /// need to be closed.
    pub fn convert_to_unsigned_distance_field(
        &mut self,
        points: &[glam::Vec3],
        polys: &[UVec4],
        ex_band_width: f64,
    ) -> Result<(), ConvertError> {
        let ex = ex_band_width.max(1.0 + 1e-7);
        let vs = self.transform.voxel_size();
        self.do_convert(points, polys, vs * ex, 0.0, true)?;
        self.dist_grid.class = GridClass::Unknown;
        Ok(())
    }

    fn do_convert(
        &mut self,
        points: &[glam::Vec3],
        polys: &[UVec4],
        ex_band: f64,
        in_band: f64,
        unsigned_dist: bool,
    ) -> Result<(), ConvertError> {
        self.clear();
        validate_polygons(points, polys)?;

        let vs = self.transform.voxel_size();

        self.check_interrupt()?;

        debug!(
            points = points.len(),
            polygons = polys.len(),
            "rasterizing mesh"
        );
        let rasterized = voxelizer::voxelize_mesh(points, polys, &self.interrupter);
        self.check_interrupt()?;

        self.dist_grid.tree.merge(rasterized.sqr_dist);
        self.index_grid.tree.merge(rasterized.prim_index);
        self.intersecting_voxels.merge(rasterized.intersection);

        if !unsigned_dist {
            // Determine the inside/outside state of the rasterized band.
            for _ in 0..self.config.sign_sweeps.max(1) {
                self.check_interrupt()?;
                contour::trace(
                    &mut self.dist_grid.tree,
                    &self.intersecting_voxels,
                    &self.interrupter,
                );
                self.check_interrupt()?;
                contour::propagate_sign(
                    &mut self.dist_grid.tree,
                    &self.intersecting_voxels,
                    &self.interrupter,
                );
            }
            self.check_interrupt()?;

            sign::intersecting_voxel_sign(
                points,
                polys,
                &mut self.dist_grid.tree,
                &self.index_grid.tree,
                &self.intersecting_voxels,
            );
            self.check_interrupt()?;

            // Drop intersecting voxels left over from self-intersecting
            // parts of the mesh, then the stray shell voxels around them.
            sign::intersecting_voxel_cleaner(&self.dist_grid.tree, &mut self.intersecting_voxels);
            self.check_interrupt()?;

            sign::shell_voxel_cleaner(
                &mut self.dist_grid.tree,
                &mut self.index_grid.tree,
                &self.intersecting_voxels,
            );
            self.check_interrupt()?;
        }

        if self.dist_grid.tree.is_empty() {
            debug!("no voxels rasterized, returning empty grids");
            return Ok(());
        }

        xform::sqrt_and_scale(&mut self.dist_grid.tree, vs as f32, unsigned_dist);
        self.check_interrupt()?;

        if !unsigned_dist {
            // Propagate sign information to the inactive far field, then
            // re-express it in band widths.
            self.dist_grid.tree.signed_flood_fill();
            self.check_interrupt()?;
            xform::voxel_sign(&mut self.dist_grid.tree, ex_band as f32, in_band as f32);

            // Smooth out bumps caused by self-intersecting and overlapping
            // portions of the mesh and renormalize the level set.
            let offset = (0.8 * vs) as f32;
            renorm::offset(&mut self.dist_grid.tree, -offset);
            self.check_interrupt()?;
            renorm::renormalize(&mut self.dist_grid.tree, vs, self.config.cfl);
            renorm::offset(&mut self.dist_grid.tree, offset);

            self.intersecting_voxels.clear();
        }
        self.check_interrupt()?;

        // Narrow-band dilation.
        let min_width = vs * 2.0;
        if in_band > min_width || ex_band > min_width {
            expand::expand_narrow_band(
                points,
                polys,
                &mut self.dist_grid.tree,
                &mut self.index_grid.tree,
                ex_band,
                in_band,
                vs,
                &self.interrupter,
            )?;
        }

        if self.config.flags & GENERATE_PRIM_INDEX_GRID == 0 {
            self.index_grid.tree.clear();
        }

        // A tight band keeps some of the rasterized shell outside the
        // requested widths; trim it back to the background.
        let min_trim_width = vs * 3.0;
        if in_band < min_trim_width || ex_band < min_trim_width {
            xform::trim(&mut self.dist_grid.tree, ex_band as f32, in_band as f32);
        }
        self.check_interrupt()?;

        self.dist_grid.tree.prune_inactive();

        debug!(
            active = self.dist_grid.tree.active_voxel_count(),
            leaves = self.dist_grid.tree.leaf_count(),
            "conversion finished"
        );
        Ok(())
    }

    #[inline]
    fn check_interrupt(&self) -> Result<(), ConvertError> {
        if self.interrupter.was_interrupted() {
            Err(ConvertError::Interrupted)
        } else {
            Ok(())
        }
    }
}

fn validate_polygons(points: &[glam::Vec3], polys: &[UVec4]) -> Result<(), ConvertError> {
    let point_count = points.len();
    for (polygon, p) in polys.iter().enumerate() {
        for k in 0..3 {
            let vertex = p[k];
            if vertex == INVALID_IDX {
                return Err(ConvertError::DegeneratePolygon { polygon });
            }
            if vertex as usize >= point_count {
                return Err(ConvertError::VertexOutOfRange {
                    polygon,
                    vertex,
                    point_count,
                });
            }
        }
        if p.w != INVALID_IDX && p.w as usize >= point_count {
            return Err(ConvertError::VertexOutOfRange {
                polygon,
                vertex: p.w,
                point_count,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_validate_rejects_bad_input() {
        let points = vec![Vec3::ZERO, Vec3::X, Vec3::Y];

        let out_of_range = vec![tri(0, 1, 7)];
        assert!(matches!(
            validate_polygons(&points, &out_of_range),
            Err(ConvertError::VertexOutOfRange { polygon: 0, vertex: 7, .. })
        ));

        let degenerate = vec![UVec4::new(0, INVALID_IDX, 2, INVALID_IDX)];
        assert!(matches!(
            validate_polygons(&points, &degenerate),
            Err(ConvertError::DegeneratePolygon { polygon: 0 })
        ));

        let ok = vec![tri(0, 1, 2), quad(0, 1, 2, 1)];
        assert!(validate_polygons(&points, &ok).is_ok());
    }

    #[test]
    fn test_empty_polygon_list() {
        let mut converter = MeshToVolume::new(Transform::with_voxel_size(1.0));
        converter
            .convert_to_level_set(&[], &[], 3.0, 3.0)
            .expect("empty input is not an error");
        assert!(converter.dist_grid().tree.is_empty());
    }

    #[test]
    fn test_index_grid_gated_by_flag() {
        let converter = MeshToVolume::new(Transform::with_voxel_size(1.0));
        assert!(converter.index_grid().is_none());

        let converter = converter.with_flags(GENERATE_PRIM_INDEX_GRID);
        assert!(converter.index_grid().is_some());
    }

    #[test]
    fn test_sign_sweeps_clamped() {
        let converter =
            MeshToVolume::new(Transform::with_voxel_size(1.0)).with_sign_sweeps(0);
        assert_eq!(converter.config.sign_sweeps, 1);
    }
}
