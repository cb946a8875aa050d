//! Sign resolution and cleanup at the surface shell.
//!
//! Three leaf-parallel passes over the rasterized band:
//!
//! - [`intersecting_voxel_sign`]: settles the sign of voxels on the
//!   surface itself by comparing closest-point directions with those of
//!   already-outside neighbors
//! - [`intersecting_voxel_cleaner`]: drops intersecting voxels that came
//!   from rasterizing self-intersecting patches (no outside neighbor at
//!   all)
//! - [`shell_voxel_cleaner`]: drops interior-marked voxels that lost their
//!   boundary and floors the rest to the half-diagonal shell value

use glam::{DVec3, IVec3, UVec4, Vec3};
use rayon::prelude::*;

use crate::geom::{closest_tri_point, COORD_OFFSETS, INVALID_IDX, VOXEL_HALF_DIAGONAL};
use crate::tree::{LeafNode, Tree};

/// Interior shell floor: negated half-diagonal (squared-distance units).
const SHELL_FLOOR: f32 = -(VOXEL_HALF_DIAGONAL as f32);

/// For every interior-marked intersecting voxel, flip it to outside when
/// any non-intersecting, outside-marked neighbor agrees in closest-point
/// direction (positive dot product).
pub fn intersecting_voxel_sign(
    points: &[Vec3],
    polys: &[UVec4],
    dist: &mut Tree<f32>,
    index: &Tree<i32>,
    intersection: &Tree<bool>,
) {
    let dist_ref: &Tree<f32> = dist;
    let leaves: Vec<&LeafNode<bool>> = intersection.iter_leaves().collect();

    let flips: Vec<IVec3> = leaves
        .par_iter()
        .flat_map_iter(|leaf| {
            let mut local = Vec::new();
            for pos in leaf.iter_on() {
                let ijk = leaf.pos_to_coord(pos);
                if dist_ref.get_value(ijk) >= 0.0 {
                    continue;
                }

                let dir = closest_point_dir(points, polys, index, ijk);

                for offset in COORD_OFFSETS {
                    let n_ijk = ijk + offset;
                    if intersection.is_value_on(n_ijk) {
                        continue;
                    }
                    let Some(n_val) = dist_ref.probe_value(n_ijk) else {
                        continue;
                    };
                    if n_val < 0.0 {
                        continue;
                    }

                    let n_dir = closest_point_dir(points, polys, index, n_ijk);
                    if n_dir.dot(dir) > 0.0 {
                        local.push(ijk);
                        break;
                    }
                }
            }
            local
        })
        .collect();

    for ijk in flips {
        let v = dist.get_value(ijk);
        if v < 0.0 {
            dist.set_value(ijk, -v);
        }
    }
}

/// Unit direction from a voxel's closest point on its recorded polygon to
/// the voxel center. Zero when the voxel center lies on the polygon.
fn closest_point_dir(points: &[Vec3], polys: &[UVec4], index: &Tree<i32>, ijk: IVec3) -> DVec3 {
    let prim_index = index.get_value(ijk);
    if prim_index < 0 {
        return DVec3::ZERO;
    }

    let center = ijk.as_dvec3();
    let prim = polys[prim_index as usize];

    let p0 = points[prim.x as usize].as_dvec3();
    let p1 = points[prim.y as usize].as_dvec3();
    let p2 = points[prim.z as usize].as_dvec3();

    let (dist, mut uv) = closest_tri_point(p0, p1, p2, center);
    let mut mid = p1;

    // Quads: take the closer of the two triangulations.
    if prim.w != INVALID_IDX {
        let p3 = points[prim.w as usize].as_dvec3();
        let (second, uv2) = closest_tri_point(p0, p3, p2, center);
        if second < dist {
            mid = p3;
            uv = uv2;
        }
    }

    let closest = p0 * uv.x + mid * uv.y + p2 * (1.0 - uv.x - uv.y);
    (center - closest).normalize_or_zero()
}

/// Deactivate intersecting voxels with no outside-marked neighbor at all;
/// they were set while rasterizing self-intersecting parts of the mesh.
pub fn intersecting_voxel_cleaner(dist: &Tree<f32>, intersection: &mut Tree<bool>) {
    let background = intersection.background();

    let mut leaves = intersection.leaves_mut_sorted();
    leaves.par_iter_mut().for_each(|leaf| {
        let spurious: Vec<usize> = leaf
            .iter_on()
            .filter(|&pos| {
                let ijk = leaf.pos_to_coord(pos);
                !COORD_OFFSETS
                    .iter()
                    .any(|offset| matches!(dist.probe_value(ijk + *offset), Some(v) if v > 0.0))
            })
            .collect();
        for pos in spurious {
            leaf.set_value_off(pos, background);
        }
    });
    drop(leaves);

    intersection.prune_inactive();
}

/// Deactivate interior-marked shell voxels with no intersecting voxel in
/// their 18-neighborhood; clamp the surviving ones to the shell floor.
pub fn shell_voxel_cleaner(dist: &mut Tree<f32>, index: &mut Tree<i32>, intersection: &Tree<bool>) {
    let dist_background = dist.background();
    let index_background = index.background();

    let dist_ref: &Tree<f32> = dist;
    let leaves: Vec<&LeafNode<f32>> = dist_ref.iter_leaves().collect();

    // (coordinate, deactivate?) - clamp otherwise.
    let decisions: Vec<(IVec3, bool)> = leaves
        .par_iter()
        .flat_map_iter(|leaf| {
            let mut local = Vec::new();
            for pos in leaf.iter_on() {
                let value = leaf.value(pos);
                if value > 0.0 {
                    continue;
                }
                let ijk = leaf.pos_to_coord(pos);
                if intersection.is_value_on(ijk) {
                    continue;
                }

                let keep = COORD_OFFSETS[..18]
                    .iter()
                    .any(|offset| intersection.is_value_on(ijk + *offset));

                if !keep {
                    local.push((ijk, true));
                } else if value > SHELL_FLOOR {
                    local.push((ijk, false));
                }
            }
            local
        })
        .collect();

    for (ijk, deactivate) in decisions {
        if deactivate {
            dist.set_value_off(ijk, dist_background);
            index.set_value_off(ijk, index_background);
        } else {
            dist.set_value(ijk, SHELL_FLOOR);
        }
    }

    dist.prune_inactive();
    index.prune_inactive();
}
