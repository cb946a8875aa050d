//! Common test helpers for NARROWBAND integration tests
//!
//! Author: Moroya Sakamoto

use narrowband::prelude::*;

// ============================================================================
// Standard test meshes (all coordinates in grid index space)
// ============================================================================

/// Axis-aligned cube of the given half extent centered at the origin,
/// triangulated into 12 faces.
pub fn cube_mesh(half_extent: f32) -> (Vec<Vec3>, Vec<UVec4>) {
    let e = half_extent;
    let points = vec![
        Vec3::new(-e, -e, -e),
        Vec3::new(e, -e, -e),
        Vec3::new(e, e, -e),
        Vec3::new(-e, e, -e),
        Vec3::new(-e, -e, e),
        Vec3::new(e, -e, e),
        Vec3::new(e, e, e),
        Vec3::new(-e, e, e),
    ];
    let polys = vec![
        // -z / +z
        tri(0, 1, 2),
        tri(0, 2, 3),
        tri(4, 6, 5),
        tri(4, 7, 6),
        // -y / +y
        tri(0, 5, 1),
        tri(0, 4, 5),
        tri(3, 2, 6),
        tri(3, 6, 7),
        // -x / +x
        tri(0, 3, 7),
        tri(0, 7, 4),
        tri(1, 5, 6),
        tri(1, 6, 2),
    ];
    (points, polys)
}

/// Closed tetrahedron with legs of the given length along the axes.
/// When `flip_one_face` is set, one face has reversed winding.
pub fn tetra_mesh(scale: f32, flip_one_face: bool) -> (Vec<Vec3>, Vec<UVec4>) {
    let s = scale;
    let points = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(s, 0.0, 0.0),
        Vec3::new(0.0, s, 0.0),
        Vec3::new(0.0, 0.0, s),
    ];
    let mut polys = vec![tri(0, 2, 1), tri(0, 1, 3), tri(0, 3, 2), tri(1, 2, 3)];
    if flip_one_face {
        polys[3] = tri(1, 3, 2);
    }
    (points, polys)
}

/// Self-intersecting "bowtie" quad in the z = 0 plane.
pub fn bowtie_mesh(extent: f32) -> (Vec<Vec3>, Vec<UVec4>) {
    let e = extent;
    let points = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(e, 0.0, 0.0),
        Vec3::new(0.0, e, 0.0),
        Vec3::new(e, e, 0.0),
    ];
    (points, vec![quad(0, 1, 2, 3)])
}

// ============================================================================
// Assertion helpers
// ============================================================================

/// Assert two f32 values are close within tolerance.
#[allow(dead_code)]
pub fn assert_close(a: f32, b: f32, tol: f32, msg: &str) {
    assert!(
        (a - b).abs() < tol,
        "{}: {} vs {} (diff={}, tol={})",
        msg,
        a,
        b,
        (a - b).abs(),
        tol
    );
}

/// Exact index-space distance from a voxel center to one polygon.
#[allow(dead_code)]
pub fn exact_poly_dist(points: &[Vec3], poly: UVec4, ijk: IVec3) -> f64 {
    let center = ijk.as_dvec3();
    let p0 = points[poly.x as usize].as_dvec3();
    let p1 = points[poly.y as usize].as_dvec3();
    let p2 = points[poly.z as usize].as_dvec3();

    let mut dist = tri_to_point_dist_sqr(p0, p1, p2, center);
    if poly.w != INVALID_IDX {
        let p3 = points[poly.w as usize].as_dvec3();
        let second = tri_to_point_dist_sqr(p0, p3, p2, center);
        if second < dist {
            dist = second;
        }
    }
    dist.sqrt()
}

/// Collect every active voxel of a grid as (coordinate, value).
#[allow(dead_code)]
pub fn active_voxels(grid: &Grid<f32>) -> Vec<(IVec3, f32)> {
    let mut out = Vec::new();
    for origin in grid.tree.leaf_origins_sorted() {
        let leaf = grid.tree.probe_leaf(origin).unwrap();
        for pos in leaf.iter_on() {
            out.push((leaf.pos_to_coord(pos), leaf.value(pos)));
        }
    }
    out
}
