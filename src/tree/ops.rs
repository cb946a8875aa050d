//! Bulk tree operations: merge, topology union, pruning, sign filling,
//! and mask dilation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use glam::IVec3;

use super::internal::{Child, InternalNode, INTERNAL_DIM, INTERNAL_SIZE};
use super::leaf::{LeafNode, LEAF_SIZE};
use super::{Tree, TreeValue};

impl<T: TreeValue> Tree<T> {
    /// Merge `other` into this tree, left-biased: nodes and voxels absent
    /// here are moved in, voxels already present here win.
    pub fn merge(&mut self, mut other: Tree<T>) {
        let background = self.background;
        let origins: Vec<IVec3> = other.root.keys().copied().collect();
        for origin in origins {
            let mut onode = other.root.remove(&origin).unwrap();
            match self.root.entry(origin) {
                Entry::Vacant(e) => {
                    e.insert(onode);
                }
                Entry::Occupied(mut e) => {
                    let snode = e.get_mut();
                    for index in 0..INTERNAL_SIZE {
                        let ochild = std::mem::replace(
                            onode.child_mut(index),
                            Child::Tile {
                                value: background,
                                active: false,
                            },
                        );
                        let pristine = matches!(
                            snode.child(index),
                            Child::Tile { value, active } if !*active && *value == background
                        );
                        match ochild {
                            Child::Tile { value, active } => {
                                if pristine && (active || value != background) {
                                    *snode.child_mut(index) = Child::Tile { value, active };
                                }
                            }
                            Child::Leaf(ol) => {
                                if pristine {
                                    *snode.child_mut(index) = Child::Leaf(ol);
                                } else if let Child::Leaf(sl) = snode.child_mut(index) {
                                    for pos in ol.iter_on() {
                                        if !sl.is_on(pos) {
                                            sl.set_value_on(pos, ol.value(pos));
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Union the node and active-voxel topology of `other` into this tree.
    ///
    /// Leaves are allocated here wherever `other` has a leaf (even an
    /// all-inactive one), and every voxel active in `other` becomes active
    /// here. Values already stored here are untouched.
    pub fn topology_union<U: TreeValue>(&mut self, other: &Tree<U>) {
        for onode in other.root().values() {
            for index in 0..INTERNAL_SIZE {
                match onode.child(index) {
                    Child::Leaf(ol) => {
                        let sl = self.touch_leaf(ol.origin());
                        sl.union_mask(ol.mask());
                    }
                    Child::Tile { active: true, .. } => {
                        let origin = onode.origin();
                        let background = self.background;
                        let node = self
                            .root
                            .entry(origin)
                            .or_insert_with(|| InternalNode::new(origin, background));
                        match node.child_mut(index) {
                            Child::Leaf(sl) => sl.set_all_on(),
                            Child::Tile { active, .. } => *active = true,
                        }
                    }
                    Child::Tile { active: false, .. } => {}
                }
            }
        }
    }

    /// Collapse all-inactive constant leaves into tiles and drop nodes that
    /// hold nothing but inactive background.
    pub fn prune_inactive(&mut self) {
        let background = self.background;
        self.root.retain(|_, node| {
            for index in 0..INTERNAL_SIZE {
                let collapse = match node.child(index) {
                    Child::Leaf(leaf) if leaf.is_empty() => leaf.uniform_value(),
                    _ => None,
                };
                if let Some(value) = collapse {
                    *node.child_mut(index) = Child::Tile {
                        value,
                        active: false,
                    };
                }
            }
            !node.is_background(background)
        });
    }
}

impl Tree<bool> {
    /// Activate the full 26-neighborhood of every active voxel (one step of
    /// mask dilation).
    pub fn dilate_active(&mut self) {
        let coords: Vec<IVec3> = self
            .iter_leaves()
            .flat_map(|leaf| leaf.iter_on().map(move |pos| leaf.pos_to_coord(pos)))
            .collect();

        for ijk in coords {
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        if dx == 0 && dy == 0 && dz == 0 {
                            continue;
                        }
                        let n_ijk = ijk + IVec3::new(dx, dy, dz);
                        if !self.is_value_on(n_ijk) {
                            self.set_active_state(n_ijk, true);
                        }
                    }
                }
            }
        }
    }
}

impl Tree<f32> {
    /// Fill every inactive voxel and tile with `±background`, matching the
    /// sign of the nearest active value in scan order.
    ///
    /// Works column-wise along z inside leaves and internal nodes; at root
    /// level, gaps between internal nodes whose facing signs are both
    /// negative are plugged with interior (negative) tile nodes, so fully
    /// enclosed regions read back as inside.
    pub fn signed_flood_fill(&mut self) {
        let bg = self.background.abs();

        let mut origins: Vec<IVec3> = self.root.keys().copied().collect();
        origins.sort_unstable_by_key(|o| (o.x, o.y, o.z));

        let mut spans: HashMap<IVec3, (f32, f32)> = HashMap::new();
        for origin in &origins {
            let node = self.root.get_mut(origin).unwrap();
            if let Some(span) = signed_fill_internal(node, bg) {
                spans.insert(*origin, span);
            }
        }

        // Root pass: walk each (x, y) column of node origins in ascending z.
        let mut i = 0;
        while i < origins.len() {
            let col = (origins[i].x, origins[i].y);
            let mut carried: Option<f32> = None;
            let mut prev_z: Option<i32> = None;
            while i < origins.len() && (origins[i].x, origins[i].y) == col {
                let origin = origins[i];
                match spans.get(&origin) {
                    Some(&(first, last)) => {
                        if let (Some(c), Some(pz)) = (carried, prev_z) {
                            // Plug enclosed gaps between two inside-facing nodes.
                            if c < 0.0 && first < 0.0 {
                                let mut z = pz + INTERNAL_DIM;
                                while z < origin.z {
                                    let gap = IVec3::new(col.0, col.1, z);
                                    self.root
                                        .entry(gap)
                                        .or_insert_with(|| InternalNode::new(gap, -bg));
                                    z += INTERNAL_DIM;
                                }
                            }
                        }
                        carried = Some(last);
                    }
                    None => {
                        if let Some(c) = carried {
                            self.root
                                .get_mut(&origin)
                                .unwrap()
                                .fill_tiles(c.signum() * bg);
                        }
                    }
                }
                prev_z = Some(origin.z);
                i += 1;
            }
        }
    }
}

fn sign_of(v: f32) -> f32 {
    if v < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Fill the inactive voxels/tiles of one internal node. Returns the signs
/// of the node's first and last active values in scan order, or `None` if
/// the node has no active voxels.
fn signed_fill_internal(node: &mut InternalNode<f32>, bg: f32) -> Option<(f32, f32)> {
    let mut slot_spans: Vec<Option<(f32, f32)>> = Vec::with_capacity(INTERNAL_SIZE);
    for index in 0..INTERNAL_SIZE {
        let span = match node.child_mut(index) {
            Child::Leaf(leaf) => signed_fill_leaf(leaf, bg),
            Child::Tile { .. } => None,
        };
        slot_spans.push(span);
    }

    let (node_first, _) = slot_spans.iter().flatten().next().copied()?;

    let mut carried = node_first;
    for col in 0..(INTERNAL_SIZE / 8) {
        let base = col * 8;
        // Leading slots of a column inherit the first leaf sign in it.
        let col_first = (0..8).find_map(|cz| slot_spans[base + cz].map(|s| s.0));
        let mut cur = col_first.unwrap_or(carried);
        for cz in 0..8 {
            let index = base + cz;
            match slot_spans[index] {
                Some((_, last)) => cur = last,
                None => match node.child_mut(index) {
                    Child::Tile { value, .. } => *value = cur * bg,
                    Child::Leaf(leaf) => leaf_fill_values(leaf, cur * bg),
                },
            }
        }
        carried = cur;
    }

    Some((node_first, carried))
}

/// Fill the inactive voxels of one leaf with `±bg` by z-scanline. Returns
/// the signs of the first and last active values, or `None` for an
/// all-inactive leaf.
fn signed_fill_leaf(leaf: &mut LeafNode<f32>, bg: f32) -> Option<(f32, f32)> {
    let mut lines: [Option<(usize, usize)>; 64] = [None; 64];
    let mut first_sign = 1.0f32;
    let mut any = false;

    for pos in leaf.iter_on() {
        let entry = &mut lines[pos >> 3];
        if let Some((_, last)) = entry {
            *last = pos;
        } else {
            *entry = Some((pos, pos));
        }
        if !any {
            first_sign = sign_of(leaf.value(pos));
            any = true;
        }
    }
    if !any {
        return None;
    }

    let mut carried = first_sign;
    for (line, entry) in lines.iter().enumerate() {
        let base = line << 3;
        match entry {
            Some((first, _)) => {
                let mut cur = sign_of(leaf.value(*first));
                for z in 0..8 {
                    let pos = base + z;
                    if leaf.is_on(pos) {
                        cur = sign_of(leaf.value(pos));
                    } else {
                        leaf.set_value_only(pos, cur * bg);
                    }
                }
                carried = cur;
            }
            None => {
                // No signal on this scanline, continue the previous one.
                for z in 0..8 {
                    leaf.set_value_only(base + z, carried * bg);
                }
            }
        }
    }

    Some((first_sign, carried))
}

fn leaf_fill_values(leaf: &mut LeafNode<f32>, value: f32) {
    for pos in 0..LEAF_SIZE {
        leaf.set_value_only(pos, value);
    }
}
