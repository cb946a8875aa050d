//! Index-space ↔ world-space mapping for uniform voxel grids.

use glam::{DVec3, IVec3};

/// Uniform scaling transform between grid index space and world space.
///
/// The conversion pipeline itself only consumes the voxel size; the output
/// grids carry the transform so callers can place results in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    voxel_size: f64,
}

impl Transform {
    /// Create a transform with the given uniform voxel size.
    ///
    /// # Panics
    /// Panics if `voxel_size` is not a positive finite number.
    pub fn with_voxel_size(voxel_size: f64) -> Self {
        assert!(
            voxel_size.is_finite() && voxel_size > 0.0,
            "voxel size must be positive and finite, got {}",
            voxel_size
        );
        Transform { voxel_size }
    }

    /// Edge length of one voxel in world units.
    #[inline]
    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Map an index-space position to world space.
    #[inline]
    pub fn index_to_world(&self, p: DVec3) -> DVec3 {
        p * self.voxel_size
    }

    /// Map a voxel coordinate (its center) to world space.
    #[inline]
    pub fn coord_to_world(&self, ijk: IVec3) -> DVec3 {
        ijk.as_dvec3() * self.voxel_size
    }

    /// Map a world-space position to continuous index space.
    #[inline]
    pub fn world_to_index(&self, p: DVec3) -> DVec3 {
        p / self.voxel_size
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform { voxel_size: 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let t = Transform::with_voxel_size(0.25);
        let p = DVec3::new(1.0, -2.0, 3.5);
        let back = t.world_to_index(t.index_to_world(p));
        assert!((back - p).length() < 1e-12);
    }

    #[test]
    fn test_coord_to_world() {
        let t = Transform::with_voxel_size(0.5);
        assert_eq!(
            t.coord_to_world(IVec3::new(2, 0, -4)),
            DVec3::new(1.0, 0.0, -2.0)
        );
    }
}
