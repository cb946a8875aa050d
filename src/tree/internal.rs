//! Internal nodes: 8x8x8 tables of leaf pointers or constant tiles.

use glam::IVec3;

use super::leaf::{LeafNode, LEAF_LOG2};
use super::TreeValue;

/// Log2 of the internal-node edge length in children.
pub const INTERNAL_LOG2: u32 = 3;
/// Internal-node span in voxels per axis.
pub const INTERNAL_DIM: i32 = 1 << (INTERNAL_LOG2 + LEAF_LOG2);
/// Number of child slots per internal node.
pub const INTERNAL_SIZE: usize = 1 << (3 * INTERNAL_LOG2);

/// One child slot of an internal node: either a dense leaf or a constant
/// tile covering the leaf's 8x8x8 region.
pub enum Child<T> {
    /// Constant region. Inactive tiles carry the signed background of their
    /// side; active tiles stand for a fully active constant block.
    Tile {
        /// Value of every voxel in the region.
        value: T,
        /// Active state of every voxel in the region.
        active: bool,
    },
    /// Dense leaf node.
    Leaf(Box<LeafNode<T>>),
}

/// Internal tree node covering a 64x64x64 voxel region.
pub struct InternalNode<T> {
    origin: IVec3,
    children: Vec<Child<T>>,
}

impl<T: TreeValue> InternalNode<T> {
    /// Create a node at `origin` (must be 64-aligned) of inactive
    /// `background` tiles.
    pub fn new(origin: IVec3, background: T) -> Self {
        InternalNode {
            origin,
            children: (0..INTERNAL_SIZE)
                .map(|_| Child::Tile {
                    value: background,
                    active: false,
                })
                .collect(),
        }
    }

    /// The minimum voxel coordinate covered by this node.
    #[inline]
    pub fn origin(&self) -> IVec3 {
        self.origin
    }

    /// Child slot index of a voxel coordinate.
    #[inline]
    pub fn child_index(ijk: IVec3) -> usize {
        ((((ijk.x >> LEAF_LOG2) & 7) << 6)
            | (((ijk.y >> LEAF_LOG2) & 7) << 3)
            | ((ijk.z >> LEAF_LOG2) & 7)) as usize
    }

    /// Leaf origin of a child slot.
    #[inline]
    pub fn child_origin(&self, index: usize) -> IVec3 {
        self.origin
            + IVec3::new(
                (((index >> 6) & 7) as i32) << LEAF_LOG2,
                (((index >> 3) & 7) as i32) << LEAF_LOG2,
                ((index & 7) as i32) << LEAF_LOG2,
            )
    }

    /// Shared access to a child slot.
    #[inline]
    pub fn child(&self, index: usize) -> &Child<T> {
        &self.children[index]
    }

    /// Mutable access to a child slot.
    #[inline]
    pub fn child_mut(&mut self, index: usize) -> &mut Child<T> {
        &mut self.children[index]
    }

    /// Get the leaf for `ijk`, densifying a covering tile if necessary.
    pub fn touch_leaf(&mut self, ijk: IVec3) -> &mut LeafNode<T> {
        let index = Self::child_index(ijk);
        let tile = match &self.children[index] {
            Child::Tile { value, active } => Some((*value, *active)),
            Child::Leaf(_) => None,
        };
        if let Some((value, active)) = tile {
            let origin = self.child_origin(index);
            let leaf = if active {
                LeafNode::new_active(origin, value)
            } else {
                LeafNode::new(origin, value)
            };
            self.children[index] = Child::Leaf(Box::new(leaf));
        }
        match &mut self.children[index] {
            Child::Leaf(leaf) => leaf,
            Child::Tile { .. } => unreachable!(),
        }
    }

    /// The leaf containing `ijk`, if one exists.
    #[inline]
    pub fn probe_leaf(&self, ijk: IVec3) -> Option<&LeafNode<T>> {
        match &self.children[Self::child_index(ijk)] {
            Child::Leaf(leaf) => Some(leaf),
            Child::Tile { .. } => None,
        }
    }

    /// Mutable variant of [`probe_leaf`](Self::probe_leaf).
    #[inline]
    pub fn probe_leaf_mut(&mut self, ijk: IVec3) -> Option<&mut LeafNode<T>> {
        match &mut self.children[Self::child_index(ijk)] {
            Child::Leaf(leaf) => Some(leaf),
            Child::Tile { .. } => None,
        }
    }

    /// Iterate the node's leaves.
    pub fn iter_leaves(&self) -> impl Iterator<Item = &LeafNode<T>> {
        self.children.iter().filter_map(|c| match c {
            Child::Leaf(leaf) => Some(&**leaf),
            Child::Tile { .. } => None,
        })
    }

    /// Iterate the node's leaves mutably.
    pub fn iter_leaves_mut(&mut self) -> impl Iterator<Item = &mut LeafNode<T>> {
        self.children.iter_mut().filter_map(|c| match c {
            Child::Leaf(leaf) => Some(&mut **leaf),
            Child::Tile { .. } => None,
        })
    }

    /// Replace every tile with an inactive tile of `value`.
    pub fn fill_tiles(&mut self, value: T) {
        for child in &mut self.children {
            if let Child::Tile { value: v, active } = child {
                *v = value;
                *active = false;
            }
        }
    }

    /// `true` when every child is an inactive tile holding `background`.
    pub fn is_background(&self, background: T) -> bool {
        self.children.iter().all(|c| match c {
            Child::Tile { value, active } => !*active && *value == background,
            Child::Leaf(_) => false,
        })
    }
}
