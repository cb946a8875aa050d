//! Slice-wise sign tracing and boundary-constrained sign propagation.
//!
//! After rasterization every active voxel stores a negated value. The
//! contour tracer sweeps 2D x-slices, walking y then z with tree-depth
//! adaptive strides, and turns the strips outside the surface positive;
//! the intersecting-voxel mask acts as the boundary. `propagate_sign` then
//! repairs regions the scanline logic could not reach (typically behind
//! concave features) with flood fills that never cross the boundary.

use glam::IVec3;
use rayon::prelude::*;
use std::collections::VecDeque;

use crate::geom::COORD_OFFSETS;
use crate::interrupt::Interrupter;
use crate::tree::{Tree, INTERNAL_DIM, LEAF_DIM};

/// Step sizes per value depth: skip a whole internal node, a leaf, or a
/// single voxel.
const STEPS: [i32; 3] = [INTERNAL_DIM, LEAF_DIM, 1];

/// Trace every x-slice of the active bounding box, flipping sign to
/// positive on voxels identified as outside. Parallelizes over x-slabs of
/// internal-node width; each slab owns its slices, and all reads go
/// against the pre-trace snapshot, so the result is deterministic.
pub fn trace<I: Interrupter>(dist: &mut Tree<f32>, intersection: &Tree<bool>, interrupter: &I) {
    let Some((min, max)) = dist.leaf_bounding_box() else {
        return;
    };
    let (lo, hi) = snap_to_tiles(min, max);

    let mut slabs = Vec::new();
    let mut x = lo.x;
    while x <= hi.x {
        slabs.push((x, (x + INTERNAL_DIM - 1).min(hi.x)));
        x += INTERNAL_DIM;
    }

    let dist_ref: &Tree<f32> = dist;
    let flips: Vec<Vec<IVec3>> = slabs
        .par_iter()
        .map(|&(x0, x1)| {
            let mut flips = Vec::new();
            let mut x = x0;
            while x <= x1 {
                if interrupter.was_interrupted() {
                    break;
                }
                let step = scan_slice(dist_ref, intersection, lo, hi, x, &mut flips);
                x += step;
            }
            flips
        })
        .collect();

    for ijk in flips.into_iter().flatten() {
        if let Some(v) = dist.probe_value(ijk) {
            if v < 0.0 {
                dist.set_value(ijk, -v);
            }
        }
    }
}

/// Snap the leaf bounding box outward to internal-node tile corners.
fn snap_to_tiles(min: IVec3, max: IVec3) -> (IVec3, IVec3) {
    let mut lo = IVec3::ZERO;
    let mut hi = IVec3::ZERO;
    for axis in 0..3 {
        lo[axis] = min[axis].div_euclid(INTERNAL_DIM) * INTERNAL_DIM;
        let tiles = (max[axis] - lo[axis]) / INTERNAL_DIM + 1;
        hi[axis] = lo[axis] + tiles * INTERNAL_DIM;
    }
    (lo, hi)
}

/// Scan one x-slice, walking y then z with depth-adaptive strides.
/// Records sign flips (always towards positive) into `flips` and returns
/// the smallest step encountered, which the caller uses as its x-stride.
fn scan_slice(
    dist: &Tree<f32>,
    intersection: &Tree<bool>,
    lo: IVec3,
    hi: IVec3,
    x: i32,
    flips: &mut Vec<IVec3>,
) -> i32 {
    let mut min_step = INTERNAL_DIM;

    let mut last_voxel_was_out = true;
    let mut last_k = lo.z;

    let mut y = lo.y;
    while y <= hi.y {
        let mut row_step = STEPS[dist.value_depth(IVec3::new(x, y, lo.z))];

        let mut z = lo.z;
        while z <= hi.z {
            let ijk = IVec3::new(x, y, z);
            let step_z = STEPS[dist.value_depth(ijk)];
            row_step = row_step.min(step_z);
            min_step = min_step.min(step_z);

            if dist.is_value_on(ijk) {
                if intersection.is_value_on(ijk) {
                    // Boundary crossing.
                    last_voxel_was_out = false;
                    last_k = z;
                } else if last_voxel_was_out {
                    flip_outside(dist, ijk, flips);
                } else {
                    // Probe the +y / +z neighbors for a known outside voxel.
                    let mut outside = false;
                    for n in [3usize, 5] {
                        let n_ijk = ijk + COORD_OFFSETS[n];
                        if matches!(dist.probe_value(n_ijk), Some(v) if v > 0.0) {
                            outside = true;
                            break;
                        }
                    }

                    if outside {
                        last_voxel_was_out = true;
                        flip_outside(dist, ijk, flips);

                        // Backtrack down z to the last boundary.
                        let mut bz = z - 1;
                        while bz >= last_k {
                            let b_ijk = IVec3::new(x, y, bz);
                            if intersection.is_value_on(b_ijk) {
                                break;
                            }
                            flip_outside(dist, b_ijk, flips);
                            bz -= 1;
                        }
                        last_k = z;
                    } else {
                        last_k = last_k.min(z);
                    }
                }
            }

            z += step_z;
        }

        y += row_step;
    }

    min_step
}

/// Record a flip to positive for an active, still-negative voxel.
#[inline]
fn flip_outside(dist: &Tree<f32>, ijk: IVec3, flips: &mut Vec<IVec3>) {
    if matches!(dist.probe_value(ijk), Some(v) if v < 0.0) {
        flips.push(ijk);
    }
}

/// Sparse scan for sign inconsistencies: an interior-marked voxel with an
/// outside-marked face neighbor seeds a [`surface_tracer`] flood that
/// re-flips the whole mislabeled region.
pub fn propagate_sign<I: Interrupter>(
    dist: &mut Tree<f32>,
    intersection: &Tree<bool>,
    interrupter: &I,
) {
    let mut seeds = Vec::new();

    'leaves: for origin in dist.leaf_origins_sorted() {
        if interrupter.was_interrupted() {
            break 'leaves;
        }
        let Some(leaf) = dist.probe_leaf(origin) else {
            continue;
        };
        for pos in leaf.iter_on() {
            let ijk = leaf.pos_to_coord(pos);

            // Ignore intersecting voxels.
            if intersection.is_value_on(ijk) {
                continue;
            }
            if leaf.value(pos) < 0.0 {
                for offset in &COORD_OFFSETS[..6] {
                    let n_ijk = ijk + *offset;
                    if matches!(dist.probe_value(n_ijk), Some(v) if v > 0.0) {
                        seeds.push(ijk);
                        break;
                    }
                }
            }
        }
    }

    for seed in seeds {
        if interrupter.was_interrupted() {
            break;
        }
        surface_tracer(seed, dist, intersection);
    }
}

/// Flood fill from an interior-marked seed, flipping signs to positive.
/// Only visits active negative voxels and never crosses the boundary
/// defined by the intersecting-voxel mask.
pub fn surface_tracer(seed: IVec3, dist: &mut Tree<f32>, intersection: &Tree<bool>) {
    let mut stack: VecDeque<IVec3> = VecDeque::new();
    stack.push_back(seed);

    while let Some(ijk) = stack.pop_back() {
        let Some(v) = dist.probe_value(ijk) else {
            continue;
        };
        if v >= 0.0 {
            continue;
        }
        dist.set_value(ijk, -v);

        for offset in &COORD_OFFSETS[..6] {
            let n_ijk = ijk + *offset;
            // Don't cross the interface.
            if intersection.is_value_on(n_ijk) {
                continue;
            }
            if matches!(dist.probe_value(n_ijk), Some(nv) if nv < 0.0) {
                stack.push_back(n_ijk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::NullInterrupter;

    /// Build a 1D "tube" along z: intersecting shell voxels at z = 3 and
    /// z = 10, interior between them, exterior elsewhere; all values start
    /// negated the way the voxelizer leaves them.
    fn shell_line() -> (Tree<f32>, Tree<bool>) {
        let mut dist = Tree::new(f32::MAX);
        let mut intersection = Tree::new(false);
        for z in 0..=13 {
            dist.set_value(IVec3::new(0, 0, z), -1.0);
        }
        for z in [3, 10] {
            intersection.set_active_state(IVec3::new(0, 0, z), true);
        }
        (dist, intersection)
    }

    #[test]
    fn test_trace_paints_entry_strip() {
        let (mut dist, intersection) = shell_line();
        trace(&mut dist, &intersection, &NullInterrupter);

        // Everything before the first boundary crossing is outside.
        for z in 0..3 {
            assert!(
                dist.get_value(IVec3::new(0, 0, z)) > 0.0,
                "z = {} should be positive",
                z
            );
        }
        // The enclosed span stays negative.
        for z in 4..10 {
            assert!(
                dist.get_value(IVec3::new(0, 0, z)) < 0.0,
                "z = {} should stay negative",
                z
            );
        }
    }

    #[test]
    fn test_propagate_sign_repairs_trailing_strip() {
        let (mut dist, intersection) = shell_line();
        trace(&mut dist, &intersection, &NullInterrupter);

        // Seed an outside voxel next to the trailing strip the slice scan
        // leaves negative, as a neighboring slice would have.
        dist.set_value(IVec3::new(0, 1, 12), 1.0);
        propagate_sign(&mut dist, &intersection, &NullInterrupter);

        for z in 11..=13 {
            assert!(
                dist.get_value(IVec3::new(0, 0, z)) > 0.0,
                "z = {} should be repaired to positive",
                z
            );
        }
        // Interior is protected by the boundary.
        for z in 4..10 {
            assert!(dist.get_value(IVec3::new(0, 0, z)) < 0.0);
        }
    }

    #[test]
    fn test_surface_tracer_respects_boundary() {
        let (mut dist, intersection) = shell_line();
        surface_tracer(IVec3::new(0, 0, 13), &mut dist, &intersection);

        assert!(dist.get_value(IVec3::new(0, 0, 12)) > 0.0);
        assert!(dist.get_value(IVec3::new(0, 0, 11)) > 0.0);
        // The boundary voxel itself and the region behind it are untouched.
        assert!(dist.get_value(IVec3::new(0, 0, 10)) < 0.0);
        assert!(dist.get_value(IVec3::new(0, 0, 9)) < 0.0);
    }
}
