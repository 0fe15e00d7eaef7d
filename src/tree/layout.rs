//! Rectangular phylogram layout in tree units.
//!
//! x is the distance from the root along branch lengths, y is the leaf slot
//! index. Conversion to pixels is done by the drawing driver.

use super::{CladeId, Tree};

/// Stand-in for clades without a recorded branch length.
pub const DEFAULT_MISSING_LENGTH: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct TreeLayout {
    positions: Vec<Option<(f32, f32)>>,
    slot_spans: Vec<Option<(f32, f32)>>,
    collapsed_extents: Vec<Option<f32>>,
    /// Clades that are drawn, in canonical order. Descendants of collapsed
    /// clades are left out.
    pub visible: Vec<CladeId>,
    /// Largest x reached, including the far edge of collapsed triangles.
    pub width: f32,
    /// Number of leaf slots; a collapsed clade takes one slot.
    pub slots: usize,
}

impl TreeLayout {
    pub fn rectangular(tree: &Tree, missing_length: f64) -> Self {
        let arena_len = tree
            .all_clades()
            .map(|id| id.index() + 1)
            .max()
            .unwrap_or(0);

        let mut layout = Self {
            positions: vec![None; arena_len],
            slot_spans: vec![None; arena_len],
            collapsed_extents: vec![None; arena_len],
            visible: Vec::new(),
            width: 0.0,
            slots: 0,
        };

        let root = tree.root();
        let root_x = tree[root].length().unwrap_or(0.0) as f32;
        layout.place_tips(tree, root, root_x, missing_length);
        layout.place_internal_clades(tree);
        layout
    }

    /// Pre-order pass: x offsets, the visible list and one slot per tip.
    fn place_tips(&mut self, tree: &Tree, root: CladeId, root_x: f32, missing_length: f64) {
        let mut stack = vec![(root, root_x)];
        while let Some((id, x_pos)) = stack.pop() {
            let clade = &tree[id];
            self.visible.push(id);
            self.width = self.width.max(x_pos);

            if clade.is_leaf() || clade.style.collapsed {
                let y = self.slots as f32;
                self.slots += 1;
                self.slot_spans[id.index()] = Some((y, y));
                self.positions[id.index()] = Some((x_pos, y));

                if !clade.is_leaf() {
                    let extent = x_pos + subtree_depth(tree, id, missing_length) as f32;
                    self.collapsed_extents[id.index()] = Some(extent);
                    self.width = self.width.max(extent);
                }
                continue;
            }

            // x is known now; y is filled in once every child has a slot.
            self.positions[id.index()] = Some((x_pos, 0.0));
            for &child in clade.children().iter().rev() {
                let branch_length = tree[child].length().unwrap_or(missing_length) as f32;
                stack.push((child, x_pos + branch_length));
            }
        }
    }

    /// Reverse pre-order pass: each expanded internal clade sits midway
    /// between its first and last child.
    fn place_internal_clades(&mut self, tree: &Tree) {
        for &id in self.visible.iter().rev() {
            let clade = &tree[id];
            if clade.is_leaf() || clade.style.collapsed {
                continue;
            }

            let mut first_y = f32::MAX;
            let mut last_y = f32::MIN;
            let mut first_slot = f32::MAX;
            let mut last_slot = f32::MIN;
            for &child in clade.children() {
                if let Some((_, child_y)) = self.positions[child.index()] {
                    first_y = first_y.min(child_y);
                    last_y = last_y.max(child_y);
                }
                if let Some((start, end)) = self.slot_spans[child.index()] {
                    first_slot = first_slot.min(start);
                    last_slot = last_slot.max(end);
                }
            }

            self.slot_spans[id.index()] = Some((first_slot, last_slot));
            if let Some(position) = &mut self.positions[id.index()] {
                position.1 = (first_y + last_y) / 2.0;
            }
        }
    }

    /// Position of a visible clade in tree units.
    pub fn position(&self, id: CladeId) -> Option<(f32, f32)> {
        self.positions.get(id.index()).copied().flatten()
    }

    /// First and last leaf slot covered by the clade.
    pub fn slot_span(&self, id: CladeId) -> Option<(f32, f32)> {
        self.slot_spans.get(id.index()).copied().flatten()
    }

    /// Far x edge of a collapsed clade's subtree.
    pub fn collapsed_extent(&self, id: CladeId) -> Option<f32> {
        self.collapsed_extents.get(id.index()).copied().flatten()
    }
}

/// Longest root-to-tip distance inside the subtree at `id`.
fn subtree_depth(tree: &Tree, id: CladeId, missing_length: f64) -> f64 {
    let mut deepest = 0.0f64;
    let mut stack = vec![(id, 0.0f64)];
    while let Some((current, depth)) = stack.pop() {
        deepest = deepest.max(depth);
        for &child in tree[current].children() {
            stack.push((child, depth + tree[child].length().unwrap_or(missing_length)));
        }
    }
    deepest
}

/// A round scale-bar length for a tree `total` units wide.
pub fn nice_tick_span(total: f32) -> Option<f32> {
    if total <= f32::EPSILON {
        return None;
    }

    let magnitude = 10.0f32.powf(total.log10().floor());
    let normalized = total / magnitude;

    let nice = if normalized < 2.0 {
        0.5
    } else if normalized < 5.0 {
        1.0
    } else {
        2.0
    };

    Some(nice * magnitude)
}
