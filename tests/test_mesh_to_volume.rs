//! Integration tests: mesh → volume conversion end to end
//!
//! Covers the unsigned and signed pipelines, band containment, sign
//! correctness for closed meshes, winding independence, self-intersecting
//! input, interruption, and the closest-primitive index grid.
//!
//! Author: Moroya Sakamoto

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;
use narrowband::prelude::*;

// ============================================================================
// Unsigned distance fields
// ============================================================================

#[test]
fn single_triangle_udf_distances() {
    let points = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(10.0, 0.0, 0.0),
        Vec3::new(0.0, 10.0, 0.0),
    ];
    let polys = vec![tri(0, 1, 2)];

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(1.0));
    converter
        .convert_to_unsigned_distance_field(&points, &polys, 6.0)
        .unwrap();
    let grid = converter.dist_grid();

    // On the face.
    let on_face = grid
        .tree
        .probe_value(IVec3::new(1, 1, 0))
        .expect("face voxel in band");
    assert!(on_face.abs() < 1e-3, "expected ~0, got {}", on_face);

    // Five voxels above a vertex.
    let above = grid
        .tree
        .probe_value(IVec3::new(0, 0, 5))
        .expect("voxel at distance 5 inside a band of 6");
    assert_close(above, 5.0, 1e-3, "distance above vertex");

    // Far away: outside the band.
    assert!(!grid.tree.is_value_on(IVec3::new(20, 20, 0)));
}

#[test]
fn udf_is_nonnegative_and_in_band() {
    let points = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(10.0, 0.0, 0.0),
        Vec3::new(0.0, 10.0, 0.0),
    ];
    let polys = vec![tri(0, 1, 2)];

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(0.5));
    converter
        .convert_to_unsigned_distance_field(&points, &polys, 4.0)
        .unwrap();
    let grid = converter.dist_grid();
    let band = 4.0 * 0.5;

    let voxels = active_voxels(grid);
    assert!(!voxels.is_empty());
    for (ijk, v) in voxels {
        assert!(v >= 0.0, "UDF value at {:?} is negative: {}", ijk, v);
        assert!(v < band + 1e-4, "UDF value at {:?} exceeds band: {}", ijk, v);
    }
    assert_eq!(grid.class, GridClass::Unknown);
}

#[test]
fn udf_values_match_recorded_primitive() {
    let points = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(10.0, 0.0, 0.0),
        Vec3::new(0.0, 10.0, 0.0),
        Vec3::new(10.0, 10.0, 4.0),
    ];
    let polys = vec![tri(0, 1, 2), tri(1, 3, 2)];
    let voxel_size = 0.5f64;

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(voxel_size))
        .with_flags(GENERATE_PRIM_INDEX_GRID);
    converter
        .convert_to_unsigned_distance_field(&points, &polys, 5.0)
        .unwrap();

    let dist = converter.dist_grid();
    let index = converter.index_grid().expect("index grid requested");

    for (ijk, v) in active_voxels(dist) {
        let prim = index
            .tree
            .probe_value(ijk)
            .unwrap_or_else(|| panic!("no primitive recorded at {:?}", ijk));
        assert!(prim >= 0);
        let exact = exact_poly_dist(&points, polys[prim as usize], ijk) * voxel_size;
        assert_close(
            v.abs(),
            exact as f32,
            1e-3,
            &format!("voxel {:?} vs polygon {}", ijk, prim),
        );
    }
}

// ============================================================================
// Signed distance fields
// ============================================================================

#[test]
fn unit_cube_level_set() {
    // Unit cube in world space at voxel size 0.1: half extent 5 in index
    // space. Bands of 6 voxels cover the whole interior (max depth 0.5).
    let voxel_size = 0.1f64;
    let (points, polys) = cube_mesh(5.0);

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(voxel_size));
    converter
        .convert_to_level_set(&points, &polys, 6.0, 6.0)
        .unwrap();
    let grid = converter.dist_grid();
    assert_eq!(grid.class, GridClass::LevelSet);

    // Center of the cube: 0.5 from every face.
    let center = grid
        .tree
        .probe_value(IVec3::ZERO)
        .expect("center is within the interior band");
    assert_close(center, -0.5, 5e-3, "center distance");

    // One cube-width outside a face center.
    let outside = grid
        .tree
        .probe_value(IVec3::new(10, 0, 0))
        .expect("outside probe within the exterior band");
    assert_close(outside, 0.5, 5e-3, "outside distance");

    // Interior mass is the cube volume in voxels, plus/minus the surface
    // layer.
    let negatives = active_voxels(grid).iter().filter(|(_, v)| *v < 0.0).count();
    assert!(
        (600..1600).contains(&negatives),
        "interior voxel count out of range: {}",
        negatives
    );

    // Signs: inside negative, outside positive (via values or background).
    for p in [
        IVec3::new(3, 3, 3),
        IVec3::new(-3, 2, 0),
        IVec3::new(0, 0, -4),
    ] {
        assert!(grid.tree.get_value(p) < 0.0, "{:?} should be inside", p);
    }
    for p in [
        IVec3::new(9, 9, 9),
        IVec3::new(-20, 0, 0),
        IVec3::new(0, 14, 0),
    ] {
        assert!(grid.tree.get_value(p) > 0.0, "{:?} should be outside", p);
    }
}

#[test]
fn level_set_band_containment() {
    let voxel_size = 0.1f64;
    let (points, polys) = cube_mesh(5.0);
    let (ex, inb) = (5.0, 4.0);

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(voxel_size));
    converter
        .convert_to_level_set(&points, &polys, ex, inb)
        .unwrap();
    let grid = converter.dist_grid();

    let ex_world = (ex * voxel_size) as f32;
    let in_world = (inb * voxel_size) as f32;
    // Renormalization may relax values slightly past the band; allow one
    // voxel of slack.
    let slack = voxel_size as f32;

    for (ijk, v) in active_voxels(grid) {
        assert!(
            v <= ex_world + slack && v >= -(in_world + slack),
            "value at {:?} out of band: {}",
            ijk,
            v
        );
    }
}

#[test]
fn vertices_lie_in_rasterized_band() {
    let voxel_size = 0.1f64;
    let (points, polys) = cube_mesh(5.0);

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(voxel_size));
    converter
        .convert_to_level_set(&points, &polys, 6.0, 6.0)
        .unwrap();
    let grid = converter.dist_grid();

    // Sampling at each vertex's voxel must land within half a voxel
    // diagonal of the surface (plus renormalization slack).
    let bound = (3.0f64.sqrt() * voxel_size) as f32 + 1e-3;
    for p in &points {
        let ijk = nearest_coord(p.as_dvec3());
        let v = grid.tree.get_value(ijk);
        assert!(
            v.abs() <= bound,
            "vertex voxel {:?} too far from surface: {}",
            ijk,
            v
        );
    }
}

#[test]
fn tetrahedron_signs_survive_flipped_winding() {
    let voxel_size = 0.25f64;
    let inside_probes = [IVec3::new(2, 2, 2), IVec3::new(1, 1, 1)];
    let outside_probes = [IVec3::new(8, 8, 8), IVec3::new(-4, -4, -4)];

    for flipped in [false, true] {
        let (points, polys) = tetra_mesh(12.0, flipped);
        let mut converter = MeshToVolume::new(Transform::with_voxel_size(voxel_size));
        converter
            .convert_to_level_set(&points, &polys, 4.0, 4.0)
            .unwrap();
        let grid = converter.dist_grid();

        for p in inside_probes {
            assert!(
                grid.tree.get_value(p) < 0.0,
                "{:?} should be inside (flipped = {})",
                p,
                flipped
            );
        }
        for p in outside_probes {
            assert!(
                grid.tree.get_value(p) > 0.0,
                "{:?} should be outside (flipped = {})",
                p,
                flipped
            );
        }
    }
}

#[test]
fn bowtie_quad_converts_cleanly() {
    let voxel_size = 0.5f64;
    let (points, polys) = bowtie_mesh(8.0);
    let (ex, inb) = (3.0, 3.0);

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(voxel_size));
    converter
        .convert_to_level_set(&points, &polys, ex, inb)
        .unwrap();
    let grid = converter.dist_grid();
    assert!(grid.tree.active_voxel_count() > 0);

    // Every surviving voxel stays within the requested band of the true
    // surface; no stray interior blob escapes the cleaners.
    let ex_world = (ex * voxel_size) as f32;
    let in_world = (inb * voxel_size) as f32;
    let slack = voxel_size as f32;
    for (ijk, v) in active_voxels(grid) {
        assert!(
            v <= ex_world + slack && v >= -(in_world + slack),
            "value at {:?} out of band: {}",
            ijk,
            v
        );
    }
}

// ============================================================================
// Determinism, interruption, error handling
// ============================================================================

#[test]
fn conversion_is_deterministic() {
    let voxel_size = 0.2f64;
    let (points, polys) = tetra_mesh(10.0, false);

    let run = || {
        let mut converter = MeshToVolume::new(Transform::with_voxel_size(voxel_size));
        converter
            .convert_to_level_set(&points, &polys, 3.0, 3.0)
            .unwrap();
        let (grid, _) = converter.into_grids();
        active_voxels(&grid)
    };

    let first = run();
    let second = run();
    assert_eq!(first.len(), second.len());
    for ((ijk_a, a), (ijk_b, b)) in first.iter().zip(second.iter()) {
        assert_eq!(ijk_a, ijk_b);
        assert_eq!(a.to_bits(), b.to_bits(), "value differs at {:?}", ijk_a);
    }
}

/// Interrupter that trips after a fixed number of polls.
struct CountdownInterrupter {
    polls: AtomicUsize,
    limit: usize,
}

impl CountdownInterrupter {
    fn new(limit: usize) -> Self {
        CountdownInterrupter {
            polls: AtomicUsize::new(0),
            limit,
        }
    }
}

impl Interrupter for CountdownInterrupter {
    fn was_interrupted(&self) -> bool {
        self.polls.fetch_add(1, Ordering::Relaxed) >= self.limit
    }
}

#[test]
fn interrupt_mid_voxelization() {
    let (points, polys) = cube_mesh(20.0);

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(1.0))
        .with_interrupter(CountdownInterrupter::new(8));
    let result = converter.convert_to_level_set(&points, &polys, 3.0, 3.0);

    assert!(matches!(result, Err(ConvertError::Interrupted)));
    // Partial output is well formed: either empty or a sane band.
    let _ = converter.dist_grid().tree.active_voxel_count();
}

#[test]
fn invalid_input_is_rejected() {
    let points = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
    let polys = vec![tri(0, 1, 9)];

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(1.0));
    let result = converter.convert_to_level_set(&points, &polys, 3.0, 3.0);
    assert!(matches!(
        result,
        Err(ConvertError::VertexOutOfRange {
            polygon: 0,
            vertex: 9,
            ..
        })
    ));
}

#[test]
fn empty_mesh_yields_empty_grids() {
    let mut converter = MeshToVolume::new(Transform::with_voxel_size(1.0));
    converter
        .convert_to_unsigned_distance_field(&[], &[], 3.0)
        .unwrap();
    assert!(converter.dist_grid().tree.is_empty());

    converter.convert_to_level_set(&[], &[], 3.0, 3.0).unwrap();
    assert!(converter.dist_grid().tree.is_empty());
}

#[test]
fn index_grid_follows_band() {
    let voxel_size = 0.25f64;
    let (points, polys) = tetra_mesh(12.0, false);

    let mut converter = MeshToVolume::new(Transform::with_voxel_size(voxel_size))
        .with_flags(GENERATE_PRIM_INDEX_GRID);
    converter
        .convert_to_level_set(&points, &polys, 3.0, 3.0)
        .unwrap();

    let dist = converter.dist_grid();
    let index = converter.index_grid().expect("requested");

    for (ijk, _) in active_voxels(dist) {
        let prim = index
            .tree
            .probe_value(ijk)
            .unwrap_or_else(|| panic!("missing primitive at {:?}", ijk));
        assert!((0..polys.len() as i32).contains(&prim));
    }
}
