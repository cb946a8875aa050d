//! # NARROWBAND
//!
//! **Narrow-band signed distance fields from polygon meshes.**
//!
//! Converts a triangle/quad mesh (given in grid index space) into a sparse
//! narrow-band signed distance field (level set) or unsigned distance field,
//! together with an optional closest-primitive index grid.
//!
//! ## Features
//!
//! - **Sparse storage**: three-level VDB-style tree, only the narrow band is
//!   resident
//! - **Parallel rasterization**: per-polygon flood fill, Rayon fold/reduce
//! - **Sign resolution**: slice-wise contour tracing, boundary-constrained
//!   sign propagation, closest-point direction voting at the surface
//! - **Band control**: exact narrow-band dilation with per-voxel closest
//!   primitive tracking, one-step eikonal renormalization
//! - **Robust input**: self-intersecting meshes, degenerate faces, and
//!   inconsistent winding are all handled; no manifoldness requirement
//!
//! ## Example
//!
//! ```rust
//! use narrowband::prelude::*;
//!
//! // A single triangle in grid index space (voxel size 0.5).
//! let points = vec![
//!     Vec3::new(0.0, 0.0, 0.0),
//!     Vec3::new(10.0, 0.0, 0.0),
//!     Vec3::new(0.0, 10.0, 0.0),
//! ];
//! let polys = vec![tri(0, 1, 2)];
//!
//! let mut converter = MeshToVolume::new(Transform::with_voxel_size(0.5));
//! converter
//!     .convert_to_unsigned_distance_field(&points, &polys, 3.0)
//!     .unwrap();
//!
//! let grid = converter.dist_grid();
//! assert!(grid.tree.active_voxel_count() > 0);
//! ```
//!
//! ## Author
//!
//! Moroya Sakamoto

#![warn(missing_docs)]

pub mod convert;
pub mod geom;
pub mod interrupt;
pub mod transform;
pub mod tree;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::convert::{
        quad, tri, ConvertError, Grid, GridClass, MeshToVolume, MeshToVolumeConfig,
        GENERATE_PRIM_INDEX_GRID,
    };
    pub use crate::geom::{
        closest_tri_point, nearest_coord, tri_to_point_dist_sqr, COORD_OFFSETS, INVALID_IDX,
    };
    pub use crate::interrupt::{AtomicInterrupter, Interrupter, NullInterrupter};
    pub use crate::transform::Transform;
    pub use crate::tree::{LeafNode, LeafScratch, Tree, TreeValue, LEAF_DIM};
    pub use glam::{IVec3, UVec4, Vec3};
}

pub use convert::MeshToVolume;
pub use transform::Transform;
pub use tree::Tree;
