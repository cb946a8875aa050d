//! Mesh rasterization (Deep Fried Edition)
//!
//! Rasterizes triangles/quads into three sparse trees: negated squared
//! distances, closest-primitive indices, and the intersecting-voxel mask.
//! Only a thin shell of voxels around each polygon is populated; the flood
//! fill stops as soon as a voxel's squared distance leaves the
//! half-diagonal threshold.
//!
//! # Deep Fried Optimizations
//! - **Per-worker trees**: Rayon fold builds private trees per worker,
//!   joined pairwise with the magnitude-min combine rule.
//! - **LastPrim dedup**: a per-worker index tree skips re-evaluating a
//!   neighbor voxel for the same polygon.
//! - **Leaf-buffered BFS**: polygons spanning many leaves trade the deque
//!   for an auxiliary bool tree swept leaf by leaf, amortizing allocation.
//!
//! Author: Moroya Sakamoto

use std::collections::VecDeque;

use glam::{DVec3, IVec3, UVec4, Vec3};
use rayon::prelude::*;

use crate::geom::{
    nearest_coord, tri_to_point_dist_sqr, COORD_OFFSETS, INVALID_IDX, VOXEL_HALF_DIAGONAL,
};
use crate::interrupt::Interrupter;
use crate::tree::Tree;

/// Edge span (index-space units) below which the deque-based seed fill is
/// used; longer polygons take the leaf-buffered path.
const SHORT_EDGE_SPAN: f64 = 200.0;

/// The three trees produced by rasterization.
pub struct VoxelizerOutput {
    /// Negated squared distances; the negation marks values not yet sign
    /// resolved, magnitudes are true index-space squared distances.
    pub sqr_dist: Tree<f32>,
    /// Closest polygon per active voxel.
    pub prim_index: Tree<i32>,
    /// Voxels whose nearest point on the mesh lies within half a voxel
    /// diagonal.
    pub intersection: Tree<bool>,
}

impl VoxelizerOutput {
    fn empty() -> Self {
        VoxelizerOutput {
            sqr_dist: Tree::new(f32::MAX),
            prim_index: Tree::new(INVALID_IDX as i32),
            intersection: Tree::new(false),
        }
    }
}

/// Rasterize all polygons in parallel, reducing the per-worker trees
/// pairwise with [`combine`].
pub fn voxelize_mesh<I: Interrupter>(
    points: &[Vec3],
    polys: &[UVec4],
    interrupter: &I,
) -> VoxelizerOutput {
    (0..polys.len())
        .into_par_iter()
        .fold(
            || Worker::new(points, polys, interrupter),
            |mut worker, n| {
                worker.voxelize_polygon(n);
                worker
            },
        )
        .map(Worker::into_output)
        .reduce(VoxelizerOutput::empty, combine)
}

/// Join rule: for every active voxel in `right`, keep whichever side has
/// the smaller true squared distance (values are stored negated, ties keep
/// `left`). The intersection masks are unioned.
pub fn combine(mut left: VoxelizerOutput, right: VoxelizerOutput) -> VoxelizerOutput {
    if left.sqr_dist.is_empty() {
        return right;
    }

    for leaf in right.sqr_dist.iter_leaves() {
        for pos in leaf.iter_on() {
            let ijk = leaf.pos_to_coord(pos);
            let rhs = leaf.value(pos);
            if -rhs < left.sqr_dist.get_value(ijk).abs() {
                left.sqr_dist.set_value(ijk, rhs);
                left.prim_index
                    .set_value(ijk, right.prim_index.get_value(ijk));
            }
        }
    }
    left.intersection.merge(right.intersection);
    left
}

struct Worker<'a, I> {
    points: &'a [Vec3],
    polys: &'a [UVec4],
    interrupter: &'a I,

    sqr_dist: Tree<f32>,
    prim_index: Tree<i32>,
    intersection: Tree<bool>,

    // Skips re-evaluating a voxel for the polygon that last touched it.
    last_prim: Tree<i32>,
}

impl<'a, I: Interrupter> Worker<'a, I> {
    fn new(points: &'a [Vec3], polys: &'a [UVec4], interrupter: &'a I) -> Self {
        Worker {
            points,
            polys,
            interrupter,
            sqr_dist: Tree::new(f32::MAX),
            prim_index: Tree::new(INVALID_IDX as i32),
            intersection: Tree::new(false),
            last_prim: Tree::new(INVALID_IDX as i32),
        }
    }

    fn into_output(self) -> VoxelizerOutput {
        VoxelizerOutput {
            sqr_dist: self.sqr_dist,
            prim_index: self.prim_index,
            intersection: self.intersection,
        }
    }

    #[inline]
    fn point(&self, vertex: u32) -> DVec3 {
        self.points[vertex as usize].as_dvec3()
    }

    fn voxelize_polygon(&mut self, n: usize) {
        if self.interrupter.was_interrupted() {
            return;
        }

        let verts = self.polys[n];
        let p0 = self.point(verts.x);
        let p1 = self.point(verts.y);
        let p2 = self.point(verts.z);

        if short_edge(p0, p1, p2) {
            self.seed_fill(n, verts);
        } else {
            self.leaf_buffered_fill(n, p0);
        }
    }

    /// Deque flood fill seeded from every vertex of the polygon.
    fn seed_fill(&mut self, n: usize, verts: UVec4) {
        let prim = n as i32;
        let mut queue: VecDeque<IVec3> = VecDeque::new();

        for k in 0..4 {
            let vertex = verts[k];
            if k == 3 && vertex == INVALID_IDX {
                break;
            }
            let ijk = nearest_coord(self.point(vertex));
            self.eval_voxel(ijk, n);
            queue.push_back(ijk);
        }

        while let Some(ijk) = queue.pop_back() {
            if self.interrupter.was_interrupted() {
                break;
            }

            self.intersection.set_active_state(ijk, true);

            for offset in COORD_OFFSETS {
                let n_ijk = ijk + offset;
                if self.last_prim.get_value(n_ijk) != prim {
                    self.last_prim.set_value(n_ijk, prim);
                    if self.eval_voxel(n_ijk, n) {
                        queue.push_back(n_ijk);
                    }
                }
            }
        }
    }

    /// BFS over an auxiliary bool tree, swept leaf by leaf. Used for large
    /// polygons whose shell spans many leaves.
    fn leaf_buffered_fill(&mut self, n: usize, p0: DVec3) {
        let prim = n as i32;

        let ijk = nearest_coord(p0);
        self.eval_voxel(ijk, n);
        self.last_prim.set_value(ijk, prim);

        let mut aux: Tree<bool> = Tree::new(false);
        aux.set_active_state(ijk, true);

        while !aux.is_empty() {
            if self.interrupter.was_interrupted() {
                break;
            }

            for origin in aux.leaf_origins_sorted() {
                if self.interrupter.was_interrupted() {
                    break;
                }

                let Some(leaf) = aux.probe_leaf_mut(origin) else {
                    continue;
                };
                let batch: Vec<IVec3> = leaf.iter_on().map(|pos| leaf.pos_to_coord(pos)).collect();
                leaf.set_all_off();

                for ijk in batch {
                    self.intersection.set_active_state(ijk, true);

                    for offset in COORD_OFFSETS {
                        let n_ijk = ijk + offset;
                        if self.last_prim.get_value(n_ijk) != prim {
                            self.last_prim.set_value(n_ijk, prim);
                            if self.eval_voxel(n_ijk, n) {
                                aux.set_active_state(n_ijk, true);
                            }
                        }
                    }
                }
            }

            aux.prune_inactive();
        }
    }

    /// Measure voxel `ijk` against polygon `n`; record the squared distance
    /// (negated) and primitive index when strictly closer than what is
    /// already stored. Returns whether `ijk` is an intersecting voxel.
    fn eval_voxel(&mut self, ijk: IVec3, n: usize) -> bool {
        let center = ijk.as_dvec3();
        let verts = self.polys[n];

        let p0 = self.point(verts.x);
        let p1 = self.point(verts.y);
        let p2 = self.point(verts.z);

        let mut dist = tri_to_point_dist_sqr(p0, p1, p2, center);

        // Quads are split along the v0-v2 diagonal.
        if verts.w != INVALID_IDX {
            let p3 = self.point(verts.w);
            let second = tri_to_point_dist_sqr(p0, p3, p2, center);
            if second < dist {
                dist = second;
            }
        }

        let tmp = dist as f32;
        if tmp < self.sqr_dist.get_value(ijk).abs() {
            self.sqr_dist.set_value(ijk, -tmp);
            self.prim_index.set_value(ijk, n as i32);
        }

        dist < VOXEL_HALF_DIAGONAL
    }
}

#[inline]
fn short_edge(v0: DVec3, v1: DVec3, v2: DVec3) -> bool {
    let mut edge_max = (v1.x - v0.x).abs();
    edge_max = edge_max.max((v1.y - v0.y).abs());
    edge_max = edge_max.max((v1.z - v0.z).abs());
    edge_max = edge_max.max((v0.x - v2.x).abs());
    edge_max = edge_max.max((v0.y - v2.y).abs());
    edge_max = edge_max.max((v0.z - v2.z).abs());
    edge_max < SHORT_EDGE_SPAN
}
