//! Value-domain transforms: squared-distance → world-space distance,
//! far-field sign assignment, and band trimming.

use rayon::prelude::*;

use crate::tree::{Tree, LEAF_SIZE};

/// Replace each active value `v` by `sign(v) * voxel_size * sqrt(|v|)`,
/// converting the working negated-squared-distance encoding into signed
/// world-space distances. In unsigned mode the sign is always positive.
pub fn sqrt_and_scale(dist: &mut Tree<f32>, voxel_size: f32, unsigned_dist: bool) {
    let mut leaves = dist.leaves_mut_sorted();
    leaves.par_iter_mut().for_each(|leaf| {
        let on: Vec<usize> = leaf.iter_on().collect();
        for pos in on {
            let v = leaf.value(pos);
            let w = if !unsigned_dist && v < 0.0 {
                -voxel_size
            } else {
                voxel_size
            };
            leaf.set_value_only(pos, w * v.abs().sqrt());
        }
    });
}

/// Rewrite inactive values to the signed band widths: `+ex_band` on the
/// outside, `-in_band` on the inside (signs were assigned by the preceding
/// signed flood fill). Tiles follow the same rule, and the tree background
/// becomes `+ex_band`.
pub fn voxel_sign(dist: &mut Tree<f32>, ex_band: f32, in_band: f32) {
    let mut leaves = dist.leaves_mut_sorted();
    leaves.par_iter_mut().for_each(|leaf| {
        for pos in 0..LEAF_SIZE {
            if !leaf.is_on(pos) {
                let v = leaf.value(pos);
                leaf.set_value_only(pos, if v < 0.0 { -in_band } else { ex_band });
            }
        }
    });
    drop(leaves);

    dist.for_each_tile_mut(|value, _active| {
        *value = if *value < 0.0 { -in_band } else { ex_band };
    });
    dist.set_background(ex_band);
}

/// Deactivate voxels whose value lies outside the requested band, setting
/// them to the matching signed background.
pub fn trim(dist: &mut Tree<f32>, ex_band: f32, in_band: f32) {
    let mut leaves = dist.leaves_mut_sorted();
    leaves.par_iter_mut().for_each(|leaf| {
        let on: Vec<usize> = leaf.iter_on().collect();
        for pos in on {
            let v = leaf.value(pos);
            if v < 0.0 {
                if v <= -in_band {
                    leaf.set_value_off(pos, -in_band);
                }
            } else if v >= ex_band {
                leaf.set_value_off(pos, ex_band);
            }
        }
    });
}
