//! Point/triangle proximity queries and the canonical voxel neighbor table.
//!
//! All queries run in `f64` (grid values are stored as `f32`, but the
//! rasterizer compares squared distances that can differ by less than
//! single precision resolves).
//!
//! Author: Moroya Sakamoto

use glam::{DVec2, DVec3, IVec3};

/// Sentinel index meaning "no polygon" / "no vertex".
///
/// A polygon whose fourth component equals `INVALID_IDX` is a triangle.
pub const INVALID_IDX: u32 = u32::MAX;

/// Voxel half-diagonal threshold, compared against index-space *squared*
/// distances. A voxel whose squared distance to a polygon is below this
/// value is an intersecting voxel; the same magnitude is used as the
/// interior shell floor.
pub const VOXEL_HALF_DIAGONAL: f64 = 0.866_025_403_784_438_61;

/// Canonical 26-neighborhood offsets.
///
/// Indices 0..6 are the face neighbors in the order `-X, +X, -Y, +Y, -Z, +Z`
/// (the contour tracer probes indices 3 and 5). Indices 0..18 are the 18
/// face+edge neighbors; 18..26 are the corners.
pub const COORD_OFFSETS: [IVec3; 26] = [
    // 6 faces
    IVec3::new(-1, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, 0, -1),
    IVec3::new(0, 0, 1),
    // 12 edges
    IVec3::new(-1, -1, 0),
    IVec3::new(-1, 1, 0),
    IVec3::new(1, -1, 0),
    IVec3::new(1, 1, 0),
    IVec3::new(-1, 0, -1),
    IVec3::new(-1, 0, 1),
    IVec3::new(1, 0, -1),
    IVec3::new(1, 0, 1),
    IVec3::new(0, -1, -1),
    IVec3::new(0, -1, 1),
    IVec3::new(0, 1, -1),
    IVec3::new(0, 1, 1),
    // 8 corners
    IVec3::new(-1, -1, -1),
    IVec3::new(-1, -1, 1),
    IVec3::new(-1, 1, -1),
    IVec3::new(-1, 1, 1),
    IVec3::new(1, -1, -1),
    IVec3::new(1, -1, 1),
    IVec3::new(1, 1, -1),
    IVec3::new(1, 1, 1),
];

/// Nearest integer voxel coordinate of an index-space point.
#[inline]
pub fn nearest_coord(p: DVec3) -> IVec3 {
    IVec3::new(
        p.x.round() as i32,
        p.y.round() as i32,
        p.z.round() as i32,
    )
}

const DEGENERATE_EPS: f64 = 1e-12;

/// Squared distance from point `p` to triangle `(a, b, c)`.
///
/// Returns a finite, non-negative value for degenerate triangles
/// (zero-area faces collapse to their edges or vertices).
pub fn tri_to_point_dist_sqr(a: DVec3, b: DVec3, c: DVec3, p: DVec3) -> f64 {
    let v10 = b - a;
    let v21 = c - b;
    let v02 = a - c;

    let p0 = p - a;
    let p1 = p - b;
    let p2 = p - c;

    let n = v10.cross(v02);

    // Does the point project onto the face interior?
    let sign_p0 = v10.cross(n).dot(p0);
    let sign_p1 = v21.cross(n).dot(p1);
    let sign_p2 = v02.cross(n).dot(p2);

    let n_len_sq = n.length_squared();
    if sign_p0 >= 0.0 && sign_p1 >= 0.0 && sign_p2 >= 0.0 && n_len_sq > DEGENERATE_EPS {
        let h = n.dot(p0);
        return h * h / n_len_sq;
    }

    // Closest point lies on an edge or vertex.
    let d0 = (p0 - v10 * clamp01(v10.dot(p0) / v10.length_squared().max(DEGENERATE_EPS)))
        .length_squared();
    let d1 = (p1 - v21 * clamp01(v21.dot(p1) / v21.length_squared().max(DEGENERATE_EPS)))
        .length_squared();
    let d2 = (p2 - v02 * clamp01(v02.dot(p2) / v02.length_squared().max(DEGENERATE_EPS)))
        .length_squared();

    d0.min(d1).min(d2)
}

/// Closest point on triangle `(a, b, c)` to `p`.
///
/// Returns the squared distance and barycentric coordinates `(u, v)` such
/// that the closest point is `a*u + b*v + c*(1 - u - v)`.
pub fn closest_tri_point(a: DVec3, b: DVec3, c: DVec3, p: DVec3) -> (f64, DVec2) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (ap.length_squared(), DVec2::new(1.0, 0.0)); // vertex a
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (bp.length_squared(), DVec2::new(0.0, 1.0)); // vertex b
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3).max(DEGENERATE_EPS);
        let q = a + ab * t;
        return ((p - q).length_squared(), DVec2::new(1.0 - t, t)); // edge ab
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (cp.length_squared(), DVec2::new(0.0, 0.0)); // vertex c
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6).max(DEGENERATE_EPS);
        let q = a + ac * t;
        return ((p - q).length_squared(), DVec2::new(1.0 - t, 0.0)); // edge ac
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6)).max(DEGENERATE_EPS);
        let q = b + (c - b) * t;
        return ((p - q).length_squared(), DVec2::new(0.0, 1.0 - t)); // edge bc
    }

    let sum = va + vb + vc;
    if sum.abs() <= DEGENERATE_EPS {
        // Degenerate face, fall back to the closest edge.
        let t_ab = clamp01(d1 / (d1 - d3).max(DEGENERATE_EPS));
        let t_ac = clamp01(d2 / (d2 - d6).max(DEGENERATE_EPS));
        let q_ab = a + ab * t_ab;
        let q_ac = a + ac * t_ac;
        let dist_ab = (p - q_ab).length_squared();
        let dist_ac = (p - q_ac).length_squared();
        return if dist_ab < dist_ac {
            (dist_ab, DVec2::new(1.0 - t_ab, t_ab))
        } else {
            (dist_ac, DVec2::new(1.0 - t_ac, 0.0))
        };
    }

    // Interior of the face.
    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    let q = a + ab * v + ac * w;
    ((p - q).length_squared(), DVec2::new(1.0 - v - w, v))
}

#[inline(always)]
fn clamp01(t: f64) -> f64 {
    t.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tri() -> (DVec3, DVec3, DVec3) {
        (
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn test_dist_above_face() {
        let (a, b, c) = unit_tri();
        let d = tri_to_point_dist_sqr(a, b, c, DVec3::new(0.25, 0.25, 2.0));
        assert!((d - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_dist_to_vertex() {
        let (a, b, c) = unit_tri();
        let d = tri_to_point_dist_sqr(a, b, c, DVec3::new(-3.0, -4.0, 0.0));
        assert!((d - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_dist_to_edge() {
        let (a, b, c) = unit_tri();
        // Below the ab edge midpoint.
        let d = tri_to_point_dist_sqr(a, b, c, DVec3::new(0.5, -2.0, 0.0));
        assert!((d - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_closest_point_matches_dist() {
        let (a, b, c) = unit_tri();
        let samples = [
            DVec3::new(0.2, 0.2, 1.0),
            DVec3::new(-1.0, -1.0, 0.5),
            DVec3::new(2.0, 2.0, -0.3),
            DVec3::new(0.5, -0.5, 0.0),
            DVec3::new(-0.5, 0.5, 2.0),
        ];
        for p in samples {
            let exact = tri_to_point_dist_sqr(a, b, c, p);
            let (dist, uv) = closest_tri_point(a, b, c, p);
            assert!(
                (exact - dist).abs() < 1e-9,
                "mismatch at {:?}: {} vs {}",
                p,
                exact,
                dist
            );
            // Reconstruct the closest point from the barycentrics.
            let q = a * uv.x + b * uv.y + c * (1.0 - uv.x - uv.y);
            assert!(((p - q).length_squared() - dist).abs() < 1e-9);
        }
    }

    #[test]
    fn test_degenerate_triangle_is_finite() {
        // All three vertices collinear.
        let a = DVec3::ZERO;
        let b = DVec3::new(1.0, 0.0, 0.0);
        let c = DVec3::new(2.0, 0.0, 0.0);
        let p = DVec3::new(1.0, 3.0, 0.0);

        let d = tri_to_point_dist_sqr(a, b, c, p);
        assert!(d.is_finite());
        assert!((d - 9.0).abs() < 1e-9);

        let (d2, _) = closest_tri_point(a, b, c, p);
        assert!(d2.is_finite());
        assert!((d2 - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_offsets_table_shape() {
        // 6 faces, 12 edges, 8 corners; no duplicates; no zero entry.
        for (i, o) in COORD_OFFSETS.iter().enumerate() {
            let nonzero = (o.x != 0) as u32 + (o.y != 0) as u32 + (o.z != 0) as u32;
            let expected = if i < 6 {
                1
            } else if i < 18 {
                2
            } else {
                3
            };
            assert_eq!(nonzero, expected, "offset {} = {:?}", i, o);
        }
        assert_eq!(COORD_OFFSETS[3], IVec3::new(0, 1, 0));
        assert_eq!(COORD_OFFSETS[5], IVec3::new(0, 0, 1));
    }

    #[test]
    fn test_nearest_coord() {
        assert_eq!(
            nearest_coord(DVec3::new(1.4, -1.6, 0.5)),
            IVec3::new(1, -2, 1)
        );
    }
}
