//! Per-leaf auxiliary buffers for out-of-place leaf transforms.

use glam::IVec3;
use rayon::prelude::*;

use super::leaf::LEAF_SIZE;
use super::{Tree, TreeValue};

/// One auxiliary value buffer per leaf, sorted by leaf origin.
///
/// Passes that need a stencil over the source tree write their results
/// here (reading the tree shared, writing their own buffer), then merge
/// back with a second pass over [`Tree::leaves_mut_sorted`], which hands
/// out leaves in the same order.
pub struct LeafScratch<T: TreeValue> {
    entries: Vec<(IVec3, Box<[T; LEAF_SIZE]>)>,
}

impl<T: TreeValue> LeafScratch<T> {
    /// Snapshot one buffer per leaf of `tree`, initialized to the leaf's
    /// current values.
    pub fn new(tree: &Tree<T>) -> Self {
        let mut entries: Vec<(IVec3, Box<[T; LEAF_SIZE]>)> = tree
            .iter_leaves()
            .map(|leaf| {
                let mut buffer = Box::new([tree.background(); LEAF_SIZE]);
                for pos in 0..LEAF_SIZE {
                    buffer[pos] = leaf.value(pos);
                }
                (leaf.origin(), buffer)
            })
            .collect();
        entries.sort_unstable_by_key(|(o, _)| (o.x, o.y, o.z));
        LeafScratch { entries }
    }

    /// Number of buffers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when there are no buffers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Update every buffer in parallel; `f` receives the leaf origin and
    /// its buffer.
    pub fn par_update(&mut self, f: impl Fn(IVec3, &mut [T; LEAF_SIZE]) + Sync) {
        self.entries
            .par_iter_mut()
            .for_each(|(origin, buffer)| f(*origin, buffer));
    }

    /// The buffers, sorted by leaf origin.
    pub fn as_slice(&self) -> &[(IVec3, Box<[T; LEAF_SIZE]>)] {
        &self.entries
    }
}
