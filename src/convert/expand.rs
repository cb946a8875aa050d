//! Narrow-band dilation: grow the rasterized band out to the requested
//! widths, one leaf ring of voxels per round.
//!
//! A boolean mask seeded from the current band topology is dilated by one
//! voxel (26-neighborhood) per round. Each newly covered voxel inherits
//! the closest-primitive candidate from its best 18-neighbor, re-measures
//! the exact distance to that polygon, and joins the band only when it
//! still fits the side's width. Rounds repeat until nothing is accepted.

use glam::{DVec3, IVec3, UVec4, Vec3};
use rayon::prelude::*;
use tracing::trace;

use super::ConvertError;
use crate::geom::{tri_to_point_dist_sqr, COORD_OFFSETS, INVALID_IDX};
use crate::interrupt::Interrupter;
use crate::tree::{LeafNode, Tree, LEAF_DIM};

/// Grow the band of `dist`/`index` to `ex_band`/`in_band` (world units).
#[allow(clippy::too_many_arguments)]
pub fn expand_narrow_band<I: Interrupter>(
    points: &[Vec3],
    polys: &[UVec4],
    dist: &mut Tree<f32>,
    index: &mut Tree<i32>,
    ex_band: f64,
    in_band: f64,
    voxel_size: f64,
    interrupter: &I,
) -> Result<(), ConvertError> {
    // Initial voxel mask: the current band topology.
    let mut mask: Tree<bool> = Tree::new(false);
    mask.topology_union(dist);

    preallocate_leaves(dist, ex_band, in_band, voxel_size, interrupter)?;

    index.topology_union(dist);

    let mut rounds = 0usize;
    while !mask.is_empty() {
        if interrupter.was_interrupted() {
            return Err(ConvertError::Interrupted);
        }

        mask.dilate_active();
        expand_round(
            points, polys, dist, index, &mut mask, ex_band, in_band, voxel_size,
        );
        mask.prune_inactive();
        rounds += 1;
    }
    trace!(rounds, "narrow-band expansion finished");

    Ok(())
}

/// Allocate the leaves the expansion will write into: each round touches
/// the six face-adjacent leaves of the previous ring, bounded per side by
/// `ceil(band / leaf_extent) + 1` rounds. Leaves diagonal to the band are
/// reached by later rounds once their face neighbors exist.
fn preallocate_leaves<I: Interrupter>(
    dist: &mut Tree<f32>,
    ex_band: f64,
    in_band: f64,
    voxel_size: f64,
    interrupter: &I,
) -> Result<(), ConvertError> {
    let leaf_extent = f64::from(LEAF_DIM - 1) * voxel_size;
    let in_rounds = (in_band / leaf_extent).ceil() as usize + 1;
    let ex_rounds = (ex_band / leaf_extent).ceil() as usize + 1;

    let face_steps = [
        IVec3::new(-LEAF_DIM, 0, 0),
        IVec3::new(LEAF_DIM, 0, 0),
        IVec3::new(0, -LEAF_DIM, 0),
        IVec3::new(0, LEAF_DIM, 0),
        IVec3::new(0, 0, -LEAF_DIM),
        IVec3::new(0, 0, LEAF_DIM),
    ];

    let mut current = dist.leaf_origins_sorted();
    for round in 0..in_rounds.max(ex_rounds) {
        if interrupter.was_interrupted() {
            return Err(ConvertError::Interrupted);
        }

        let mut fresh = Vec::with_capacity(2 * current.len());
        for origin in &current {
            // The side is judged by the leaf's origin voxel.
            let inside = dist.get_value(*origin) < 0.0;
            if inside && round >= in_rounds {
                continue;
            }
            if !inside && round >= ex_rounds {
                continue;
            }

            for step in face_steps {
                let neighbor = *origin + step;
                if dist.probe_leaf(neighbor).is_none() {
                    dist.touch_leaf(neighbor);
                    fresh.push(neighbor);
                }
            }
        }

        if fresh.is_empty() {
            break;
        }
        current = fresh;
    }
    Ok(())
}

/// Per-leaf write plan produced by the read-only measurement phase.
struct LeafPlan {
    origin: IVec3,
    /// Mask leaf has no backing dist/index leaves; all its voxels retire.
    retire: bool,
    accepts: Vec<(usize, f32, i32)>,
    rejects: Vec<usize>,
}

#[allow(clippy::too_many_arguments)]
fn expand_round(
    points: &[Vec3],
    polys: &[UVec4],
    dist: &mut Tree<f32>,
    index: &mut Tree<i32>,
    mask: &mut Tree<bool>,
    ex_band: f64,
    in_band: f64,
    voxel_size: f64,
) {
    let dist_ref: &Tree<f32> = dist;
    let index_ref: &Tree<i32> = index;
    let mask_leaves: Vec<&LeafNode<bool>> = mask.iter_leaves().collect();

    // Phase 1: measure against the pre-round band, leaf-parallel.
    let plans: Vec<LeafPlan> = mask_leaves
        .par_iter()
        .map(|mask_leaf| {
            let origin = mask_leaf.origin();

            let (Some(dist_leaf), Some(_)) = (
                dist_ref.probe_leaf(origin),
                index_ref.probe_leaf(origin),
            ) else {
                return LeafPlan {
                    origin,
                    retire: true,
                    accepts: Vec::new(),
                    rejects: Vec::new(),
                };
            };

            let mut accepts = Vec::new();
            let mut rejects = Vec::new();

            for pos in mask_leaf.iter_on() {
                if dist_leaf.is_on(pos) {
                    rejects.push(pos);
                    continue;
                }

                let ijk = mask_leaf.pos_to_coord(pos);
                let Some(prim) = closest_neighbor_prim(dist_ref, index_ref, ijk) else {
                    rejects.push(pos);
                    continue;
                };

                let d = dist_to_prim(points, polys, prim, ijk) * voxel_size;
                let inside = dist_leaf.value(pos) < 0.0;

                if !inside && d < ex_band {
                    accepts.push((pos, d as f32, prim));
                } else if inside && d < in_band {
                    accepts.push((pos, -(d as f32), prim));
                } else {
                    rejects.push(pos);
                }
            }

            LeafPlan {
                origin,
                retire: false,
                accepts,
                rejects,
            }
        })
        .collect();

    // Phase 2: apply.
    for plan in plans {
        let mask_leaf = mask
            .probe_leaf_mut(plan.origin)
            .expect("mask leaf vanished mid-round");

        if plan.retire {
            mask_leaf.set_all_off();
            continue;
        }
        for pos in plan.rejects {
            mask_leaf.set_off(pos);
        }
        if plan.accepts.is_empty() {
            continue;
        }

        let dist_leaf = dist.probe_leaf_mut(plan.origin).expect("preallocated");
        for &(pos, value, _) in &plan.accepts {
            dist_leaf.set_value_on(pos, value);
        }
        let index_leaf = index.probe_leaf_mut(plan.origin).expect("unioned");
        for &(pos, _, prim) in &plan.accepts {
            index_leaf.set_value_on(pos, prim);
        }
    }
}

/// Primitive recorded at the 18-neighbor with the smallest `|dist|`.
fn closest_neighbor_prim(dist: &Tree<f32>, index: &Tree<i32>, ijk: IVec3) -> Option<i32> {
    let mut best = f32::MAX;
    let mut prim = INVALID_IDX as i32;
    for offset in &COORD_OFFSETS[..18] {
        let n_ijk = ijk + *offset;
        if let Some(v) = dist.probe_value(n_ijk) {
            let magnitude = v.abs();
            if magnitude < best {
                best = magnitude;
                prim = index.get_value(n_ijk);
            }
        }
    }
    (prim >= 0).then_some(prim)
}

/// Exact index-space distance from the voxel center to polygon `prim`.
fn dist_to_prim(points: &[Vec3], polys: &[UVec4], prim: i32, ijk: IVec3) -> f64 {
    let center = ijk.as_dvec3();
    let verts = polys[prim as usize];

    let p0: DVec3 = points[verts.x as usize].as_dvec3();
    let p1 = points[verts.y as usize].as_dvec3();
    let p2 = points[verts.z as usize].as_dvec3();

    let mut dist = tri_to_point_dist_sqr(p0, p1, p2, center);
    if verts.w != INVALID_IDX {
        let p3 = points[verts.w as usize].as_dvec3();
        let second = tri_to_point_dist_sqr(p0, p3, p2, center);
        if second < dist {
            dist = second;
        }
    }
    dist.sqrt()
}
