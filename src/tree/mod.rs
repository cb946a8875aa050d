//! Sparse voxel tree (Deep Fried Edition)
//!
//! Three-level VDB-style tree: a root hash map of internal nodes, internal
//! nodes of 8x8x8 children (64 voxels of span per axis), and dense 8x8x8
//! leaves with active-state bitmasks. Regions without a leaf are covered by
//! constant *tiles* carrying a value and an active state, so a narrow band
//! plus signed far-field backgrounds stay cheap.
//!
//! # Architecture
//!
//! - **Tree<T>**: generic over `f32` (distances), `i32` (primitive
//!   indices) and `bool` (masks)
//! - **Tiles**: inactive constant regions; `touch_leaf` densifies a tile
//!   into a leaf that inherits its value
//! - **Bulk ops**: `merge`, `topology_union`, `prune_inactive`,
//!   `signed_flood_fill`, 26-neighborhood dilation
//! - **Parallel access**: `leaves_mut_sorted` hands out disjoint `&mut`
//!   leaves for Rayon passes; [`LeafScratch`] owns per-leaf side buffers
//!
//! # Usage
//!
//! ```rust
//! use narrowband::tree::Tree;
//! use glam::IVec3;
//!
//! let mut tree = Tree::new(f32::MAX);
//! tree.set_value(IVec3::new(1, 2, 3), -0.5);
//!
//! assert_eq!(tree.get_value(IVec3::new(1, 2, 3)), -0.5);
//! assert_eq!(tree.get_value(IVec3::new(100, 0, 0)), f32::MAX);
//! assert_eq!(tree.active_voxel_count(), 1);
//! ```
//!
//! Author: Moroya Sakamoto

pub mod internal;
pub mod leaf;
mod ops;
mod scratch;

use std::collections::HashMap;

use glam::IVec3;

pub use internal::{Child, InternalNode, INTERNAL_DIM, INTERNAL_LOG2};
pub use leaf::{LeafNode, OnIter, LEAF_DIM, LEAF_LOG2, LEAF_SIZE};
pub use scratch::LeafScratch;

/// Values storable in a [`Tree`].
pub trait TreeValue: Copy + PartialEq + Send + Sync + 'static {}

impl TreeValue for f32 {}
impl TreeValue for i32 {}
impl TreeValue for bool {}

/// Origin of the internal node containing `ijk`.
#[inline]
pub(crate) fn internal_origin(ijk: IVec3) -> IVec3 {
    let m = !(INTERNAL_DIM - 1);
    IVec3::new(ijk.x & m, ijk.y & m, ijk.z & m)
}

/// Sparse voxel tree with a uniform background value.
pub struct Tree<T: TreeValue> {
    root: HashMap<IVec3, InternalNode<T>>,
    background: T,
}

impl<T: TreeValue> Tree<T> {
    /// Create an empty tree with the given background value.
    pub fn new(background: T) -> Self {
        Tree {
            root: HashMap::new(),
            background,
        }
    }

    /// The background value returned for unallocated regions.
    #[inline]
    pub fn background(&self) -> T {
        self.background
    }

    /// Replace the background value for unallocated regions.
    ///
    /// Allocated tiles and leaf values are left untouched; callers that
    /// need existing inactive values rewritten do so before swapping.
    pub fn set_background(&mut self, background: T) {
        self.background = background;
    }

    /// Value at `ijk`: the stored value if allocated (active or not),
    /// otherwise the background.
    pub fn get_value(&self, ijk: IVec3) -> T {
        match self.root.get(&internal_origin(ijk)) {
            None => self.background,
            Some(node) => match node.child(InternalNode::<T>::child_index(ijk)) {
                Child::Tile { value, .. } => *value,
                Child::Leaf(leaf) => leaf.value(LeafNode::<T>::coord_to_pos(ijk)),
            },
        }
    }

    /// `Some(value)` if the voxel at `ijk` is active.
    pub fn probe_value(&self, ijk: IVec3) -> Option<T> {
        match self.root.get(&internal_origin(ijk)) {
            None => None,
            Some(node) => match node.child(InternalNode::<T>::child_index(ijk)) {
                Child::Tile { value, active } => active.then_some(*value),
                Child::Leaf(leaf) => {
                    let pos = LeafNode::<T>::coord_to_pos(ijk);
                    leaf.is_on(pos).then(|| leaf.value(pos))
                }
            },
        }
    }

    /// Whether the voxel at `ijk` is active.
    pub fn is_value_on(&self, ijk: IVec3) -> bool {
        match self.root.get(&internal_origin(ijk)) {
            None => false,
            Some(node) => match node.child(InternalNode::<T>::child_index(ijk)) {
                Child::Tile { active, .. } => *active,
                Child::Leaf(leaf) => leaf.is_on(LeafNode::<T>::coord_to_pos(ijk)),
            },
        }
    }

    /// Set the value at `ijk` and mark the voxel active.
    pub fn set_value(&mut self, ijk: IVec3, value: T) {
        self.touch_leaf(ijk)
            .set_value_on(LeafNode::<T>::coord_to_pos(ijk), value);
    }

    /// Set the value at `ijk` and mark the voxel inactive.
    pub fn set_value_off(&mut self, ijk: IVec3, value: T) {
        self.touch_leaf(ijk)
            .set_value_off(LeafNode::<T>::coord_to_pos(ijk), value);
    }

    /// Set only the active state at `ijk`, preserving the stored value.
    pub fn set_active_state(&mut self, ijk: IVec3, on: bool) {
        let leaf = self.touch_leaf(ijk);
        let pos = LeafNode::<T>::coord_to_pos(ijk);
        if on {
            leaf.set_on(pos);
        } else {
            leaf.set_off(pos);
        }
    }

    /// Depth at which the value of `ijk` is resolved: 0 for an unallocated
    /// root region, 1 for an internal-node tile, 2 for a leaf voxel.
    pub fn value_depth(&self, ijk: IVec3) -> usize {
        match self.root.get(&internal_origin(ijk)) {
            None => 0,
            Some(node) => match node.child(InternalNode::<T>::child_index(ijk)) {
                Child::Tile { .. } => 1,
                Child::Leaf(_) => 2,
            },
        }
    }

    /// The leaf containing `ijk`, creating it from the covering tile or the
    /// background if needed.
    pub fn touch_leaf(&mut self, ijk: IVec3) -> &mut LeafNode<T> {
        let background = self.background;
        self.root
            .entry(internal_origin(ijk))
            .or_insert_with_key(|origin| InternalNode::new(*origin, background))
            .touch_leaf(ijk)
    }

    /// The leaf containing `ijk`, if allocated.
    pub fn probe_leaf(&self, ijk: IVec3) -> Option<&LeafNode<T>> {
        self.root
            .get(&internal_origin(ijk))
            .and_then(|node| node.probe_leaf(ijk))
    }

    /// Mutable variant of [`probe_leaf`](Self::probe_leaf).
    pub fn probe_leaf_mut(&mut self, ijk: IVec3) -> Option<&mut LeafNode<T>> {
        self.root
            .get_mut(&internal_origin(ijk))
            .and_then(|node| node.probe_leaf_mut(ijk))
    }

    /// Iterate all leaves (unordered).
    pub fn iter_leaves(&self) -> impl Iterator<Item = &LeafNode<T>> {
        self.root.values().flat_map(|node| node.iter_leaves())
    }

    /// Iterate all leaves mutably (unordered).
    pub fn iter_leaves_mut(&mut self) -> impl Iterator<Item = &mut LeafNode<T>> {
        self.root
            .values_mut()
            .flat_map(|node| node.iter_leaves_mut())
    }

    /// Origins of all leaves, sorted lexicographically.
    pub fn leaf_origins_sorted(&self) -> Vec<IVec3> {
        let mut origins: Vec<IVec3> = self.iter_leaves().map(|l| l.origin()).collect();
        origins.sort_unstable_by_key(|o| (o.x, o.y, o.z));
        origins
    }

    /// Disjoint mutable references to all leaves, sorted by origin.
    /// The sort keeps parallel passes aligned with [`LeafScratch`] buffers.
    pub fn leaves_mut_sorted(&mut self) -> Vec<&mut LeafNode<T>> {
        let mut leaves: Vec<&mut LeafNode<T>> = self.iter_leaves_mut().collect();
        leaves.sort_unstable_by_key(|l| {
            let o = l.origin();
            (o.x, o.y, o.z)
        });
        leaves
    }

    /// Apply `f` to every tile's value and active flag.
    pub fn for_each_tile_mut(&mut self, mut f: impl FnMut(&mut T, &mut bool)) {
        for node in self.root.values_mut() {
            for index in 0..internal::INTERNAL_SIZE {
                if let Child::Tile { value, active } = node.child_mut(index) {
                    f(value, active);
                }
            }
        }
    }

    /// Number of allocated leaves.
    pub fn leaf_count(&self) -> usize {
        self.iter_leaves().count()
    }

    /// Number of active voxels, counting active tiles at full resolution.
    pub fn active_voxel_count(&self) -> usize {
        let mut count = 0;
        for node in self.root.values() {
            for index in 0..internal::INTERNAL_SIZE {
                match node.child(index) {
                    Child::Tile { active, .. } => {
                        if *active {
                            count += LEAF_SIZE;
                        }
                    }
                    Child::Leaf(leaf) => count += leaf.on_count(),
                }
            }
        }
        count
    }

    /// `true` when the tree has no active voxels.
    pub fn is_empty(&self) -> bool {
        for node in self.root.values() {
            for index in 0..internal::INTERNAL_SIZE {
                match node.child(index) {
                    Child::Tile { active, .. } => {
                        if *active {
                            return false;
                        }
                    }
                    Child::Leaf(leaf) => {
                        if !leaf.is_empty() {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Bounding box over allocated leaves as inclusive voxel coordinates.
    pub fn leaf_bounding_box(&self) -> Option<(IVec3, IVec3)> {
        let mut bounds: Option<(IVec3, IVec3)> = None;
        for leaf in self.iter_leaves() {
            let lo = leaf.origin();
            let hi = lo + IVec3::splat(LEAF_DIM - 1);
            bounds = Some(match bounds {
                None => (lo, hi),
                Some((min, max)) => (min.min(lo), max.max(hi)),
            });
        }
        bounds
    }

    /// Drop all nodes, keeping the background.
    pub fn clear(&mut self) {
        self.root.clear();
    }

    pub(crate) fn root(&self) -> &HashMap<IVec3, InternalNode<T>> {
        &self.root
    }
}
