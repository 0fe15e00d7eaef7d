use std::collections::HashMap;
use std::fmt;
use std::ops::{Index, IndexMut};

use thiserror::Error;

use crate::style::{CladeStyle, TreeStyle};

pub mod layout;

/// Stable identity of a clade within its [`Tree`].
///
/// Ids are handed out in creation order and never reused, so they double as
/// element ids for exported documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CladeId(usize);

impl CladeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CladeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("clade {0} does not belong to this tree")]
    UnknownClade(CladeId),
    #[error("clade {child} already has parent {parent}")]
    AlreadyParented { child: CladeId, parent: CladeId },
    #[error("clade {0} is the root of this tree")]
    IsRoot(CladeId),
    #[error("clade {0} has been moved into another tree")]
    Moved(CladeId),
    #[error("attaching clade {child} under {parent} would create a cycle")]
    Cycle { child: CladeId, parent: CladeId },
}

/// Node of a phylogenetic tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Clade {
    id: CladeId,
    pub name: Option<String>,
    pub support: Option<String>,
    length: Option<f64>,
    pub style: CladeStyle,
    parent: Option<CladeId>,
    children: Vec<CladeId>,
    moved: bool,
}

impl Clade {
    fn new(id: CladeId) -> Self {
        Self {
            id,
            name: None,
            support: None,
            length: None,
            style: CladeStyle::default(),
            parent: None,
            children: Vec::new(),
            moved: false,
        }
    }

    pub fn id(&self) -> CladeId {
        self.id
    }

    /// Branch length above this clade; `None` when no length was recorded.
    pub fn length(&self) -> Option<f64> {
        self.length
    }

    /// Sets the branch length. NaN is stored as "no length".
    pub fn set_length(&mut self, length: Option<f64>) {
        self.length = length.filter(|value| !value.is_nan());
    }

    pub fn parent(&self) -> Option<CladeId> {
        self.parent
    }

    pub fn children(&self) -> &[CladeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The label branch decorations are matched against.
    pub fn decoration_text(&self) -> Option<&str> {
        if self.is_leaf() {
            self.name.as_deref()
        } else {
            self.support.as_deref()
        }
    }
}

/// Phylogenetic tree: an arena of clades with one root.
///
/// Clades created with [`Tree::new_clade`] start detached and only become part
/// of the tree once attached below the root with [`Tree::add_child`].
#[derive(Debug, Clone)]
pub struct Tree {
    clades: Vec<Clade>,
    root: CladeId,
    pub label: Option<String>,
    pub style: TreeStyle,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A tree holding a single, empty root clade.
    pub fn new() -> Self {
        Self {
            clades: vec![Clade::new(CladeId(0))],
            root: CladeId(0),
            label: None,
            style: TreeStyle::default(),
        }
    }

    pub fn root(&self) -> CladeId {
        self.root
    }

    pub fn get(&self, id: CladeId) -> Option<&Clade> {
        self.clades.get(id.0)
    }

    pub fn get_mut(&mut self, id: CladeId) -> Option<&mut Clade> {
        self.clades.get_mut(id.0)
    }

    /// Creates a detached clade without attributes.
    pub fn new_clade(&mut self) -> CladeId {
        let id = CladeId(self.clades.len());
        self.clades.push(Clade::new(id));
        id
    }

    /// Creates a detached clade with the given attributes.
    pub fn new_clade_with(
        &mut self,
        name: Option<String>,
        support: Option<String>,
        length: Option<f64>,
    ) -> CladeId {
        let id = self.new_clade();
        let clade = &mut self[id];
        clade.name = name;
        clade.support = support;
        clade.set_length(length);
        id
    }

    /// Creates a clade and appends it straight to `parent`'s children.
    pub(crate) fn push_child(&mut self, parent: CladeId) -> CladeId {
        let child = self.new_clade();
        self[parent].children.push(child);
        self[child].parent = Some(parent);
        child
    }

    /// Appends `child` to the children of `parent`.
    pub fn add_child(&mut self, parent: CladeId, child: CladeId) -> Result<(), TreeError> {
        self.check(parent)?;
        self.check(child)?;

        if child == self.root {
            return Err(TreeError::IsRoot(child));
        }
        if let Some(existing) = self[child].parent {
            return Err(TreeError::AlreadyParented {
                child,
                parent: existing,
            });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(TreeError::Cycle { child, parent });
        }

        self[parent].children.push(child);
        self[child].parent = Some(parent);
        Ok(())
    }

    /// Detaches `child` from `parent`. Returns `false` if it was not a child.
    pub fn remove_child(&mut self, parent: CladeId, child: CladeId) -> bool {
        let Some(position) = self
            .get(parent)
            .and_then(|clade| clade.children.iter().position(|&id| id == child))
        else {
            return false;
        };

        self[parent].children.remove(position);
        self[child].parent = None;
        true
    }

    pub fn clear_children(&mut self, parent: CladeId) {
        let Some(clade) = self.get_mut(parent) else {
            return;
        };
        let children = std::mem::take(&mut clade.children);
        for child in children {
            self[child].parent = None;
        }
    }

    /// Walks the parent chain up from `id`.
    pub fn find_root(&self, id: CladeId) -> CladeId {
        let mut current = id;
        while let Some(parent) = self[current].parent {
            current = parent;
        }
        current
    }

    /// Pre-order depth-first walk below `id`, children in index order.
    /// `id` itself is not yielded.
    pub fn descendants(&self, id: CladeId) -> Descendants<'_> {
        let stack = self
            .get(id)
            .map(|clade| clade.children.iter().rev().copied().collect())
            .unwrap_or_default();
        Descendants { tree: self, stack }
    }

    /// Canonical traversal order: the root, then its descendants in pre-order.
    pub fn all_clades(&self) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![self.root],
        }
    }

    pub fn leaves(&self) -> impl Iterator<Item = CladeId> + '_ {
        self.all_clades().filter(move |&id| self[id].is_leaf())
    }

    pub fn internal_clades(&self) -> impl Iterator<Item = CladeId> + '_ {
        self.all_clades().filter(move |&id| !self[id].is_leaf())
    }

    pub fn clade_count(&self) -> usize {
        self.all_clades().count()
    }

    /// Sum of branch lengths from the root down to `id`.
    ///
    /// The root's own branch is not included; `missing` stands in for clades
    /// without a recorded length.
    pub fn length_from_root(&self, id: CladeId, missing: f64) -> f64 {
        let mut total = 0.0;
        let mut current = id;
        while let Some(parent) = self[current].parent {
            total += self[current].length.unwrap_or(missing);
            current = parent;
        }
        total
    }

    /// Number of leaves in the subtree rooted at `id`; a leaf counts itself.
    pub fn leaf_count(&self, id: CladeId) -> usize {
        if self[id].is_leaf() {
            return 1;
        }
        self.descendants(id)
            .filter(|&descendant| self[descendant].is_leaf())
            .count()
    }

    /// Deep copy of the subtree below `id` as a new tree with a fresh root.
    pub fn clone_subtree(&self, id: CladeId) -> Result<SubtreeClone, TreeError> {
        self.check(id)?;

        let mut copy = Tree::new();
        copy.label = self.label.clone();
        copy.style = self.style.clone();

        let mut mapping = HashMap::new();
        let root = copy.root;
        copy.copy_attributes(root, &self[id]);
        mapping.insert(id, root);

        for original in self.descendants(id) {
            let source = &self[original];
            let new_id = copy.new_clade();
            copy.copy_attributes(new_id, source);
            if let Some(parent) = source.parent.and_then(|p| mapping.get(&p).copied()) {
                copy[parent].children.push(new_id);
                copy[new_id].parent = Some(parent);
            }
            mapping.insert(original, new_id);
        }

        Ok(SubtreeClone {
            tree: copy,
            mapping,
        })
    }

    /// Moves the detached subtree at `id` into a tree of its own.
    ///
    /// Fails if `id` still has a parent, is this tree's root, or was already
    /// moved out.
    pub fn split_off(&mut self, id: CladeId) -> Result<Tree, TreeError> {
        self.check(id)?;
        if id == self.root {
            return Err(TreeError::IsRoot(id));
        }
        if let Some(parent) = self[id].parent {
            return Err(TreeError::AlreadyParented { child: id, parent });
        }

        let split = self.clone_subtree(id)?.into_tree();
        let moved: Vec<CladeId> = std::iter::once(id).chain(self.descendants(id)).collect();
        for clade in moved {
            self[clade].moved = true;
        }
        Ok(split)
    }

    /// Orders every clade's children by the number of leaves below them.
    pub fn ladderize(&mut self, increasing: bool) {
        let reachable: Vec<CladeId> = self.all_clades().collect();

        // Reverse pre-order sees every child before its parent.
        let mut sizes = vec![0usize; self.clades.len()];
        for &id in reachable.iter().rev() {
            let clade = &self[id];
            sizes[id.0] = if clade.is_leaf() {
                1
            } else {
                clade.children.iter().map(|child| sizes[child.0]).sum()
            };
        }

        for id in reachable {
            let children = &mut self.clades[id.0].children;
            if increasing {
                children.sort_by_key(|child| sizes[child.0]);
            } else {
                children.sort_by_key(|child| std::cmp::Reverse(sizes[child.0]));
            }
        }
    }

    /// Reverses the order of every tip under `id`.
    pub fn rotate(&mut self, id: CladeId) {
        if self.get(id).is_none() {
            return;
        }
        let below: Vec<CladeId> = std::iter::once(id).chain(self.descendants(id)).collect();
        for clade in below {
            self[clade].children.reverse();
        }
    }

    fn copy_attributes(&mut self, target: CladeId, source: &Clade) {
        let clade = &mut self[target];
        clade.name = source.name.clone();
        clade.support = source.support.clone();
        clade.length = source.length;
        clade.style = source.style.clone();
    }

    fn check(&self, id: CladeId) -> Result<(), TreeError> {
        match self.get(id) {
            None => Err(TreeError::UnknownClade(id)),
            Some(clade) if clade.moved => Err(TreeError::Moved(id)),
            Some(_) => Ok(()),
        }
    }

    fn is_ancestor_or_self(&self, ancestor: CladeId, id: CladeId) -> bool {
        let mut current = Some(id);
        while let Some(clade) = current {
            if clade == ancestor {
                return true;
            }
            current = self[clade].parent;
        }
        false
    }
}

impl Index<CladeId> for Tree {
    type Output = Clade;

    fn index(&self, id: CladeId) -> &Clade {
        &self.clades[id.0]
    }
}

impl IndexMut<CladeId> for Tree {
    fn index_mut(&mut self, id: CladeId) -> &mut Clade {
        &mut self.clades[id.0]
    }
}

/// Pre-order iterator over clade ids; see [`Tree::all_clades`].
pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<CladeId>,
}

impl Iterator for Descendants<'_> {
    type Item = CladeId;

    fn next(&mut self) -> Option<CladeId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.tree[id].children.iter().rev().copied());
        Some(id)
    }
}

/// Result of [`Tree::clone_subtree`]: the copy plus a map from original ids to
/// the ids of their copies.
#[derive(Debug, Clone)]
pub struct SubtreeClone {
    pub tree: Tree,
    mapping: HashMap<CladeId, CladeId>,
}

impl SubtreeClone {
    /// The id in the copy that corresponds to `original`, if it was copied.
    pub fn handle(&self, original: CladeId) -> Option<CladeId> {
        self.mapping.get(&original).copied()
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Color;

    /// ((A:1,B:2)X:1,C:3);
    fn sample_tree() -> (Tree, [CladeId; 5]) {
        let mut tree = Tree::new();
        let root = tree.root();
        let x = tree.new_clade_with(None, Some("X".into()), Some(1.0));
        let a = tree.new_clade_with(Some("A".into()), None, Some(1.0));
        let b = tree.new_clade_with(Some("B".into()), None, Some(2.0));
        let c = tree.new_clade_with(Some("C".into()), None, Some(3.0));
        tree.add_child(root, x).unwrap();
        tree.add_child(x, a).unwrap();
        tree.add_child(x, b).unwrap();
        tree.add_child(root, c).unwrap();
        (tree, [root, x, a, b, c])
    }

    #[test]
    fn canonical_order_is_preorder_from_root() {
        let (tree, [root, x, a, b, c]) = sample_tree();
        let order: Vec<CladeId> = tree.all_clades().collect();
        assert_eq!(order, vec![root, x, a, b, c]);
        let below_x: Vec<CladeId> = tree.descendants(x).collect();
        assert_eq!(below_x, vec![a, b]);
    }

    #[test]
    fn add_child_rejects_parented_clade() {
        let (mut tree, [root, x, a, ..]) = sample_tree();
        assert_eq!(
            tree.add_child(root, a),
            Err(TreeError::AlreadyParented { child: a, parent: x })
        );
        assert_eq!(tree.add_child(x, root), Err(TreeError::IsRoot(root)));
    }

    #[test]
    fn add_child_rejects_cycles() {
        let mut tree = Tree::new();
        let p = tree.new_clade();
        let q = tree.new_clade();
        tree.add_child(p, q).unwrap();
        assert_eq!(
            tree.add_child(q, p),
            Err(TreeError::Cycle { child: p, parent: q })
        );
    }

    #[test]
    fn remove_child_detaches_and_reports_absence() {
        let (mut tree, [root, x, a, ..]) = sample_tree();
        assert!(!tree.remove_child(root, a));
        assert!(tree.remove_child(x, a));
        assert_eq!(tree[a].parent(), None);
        assert_eq!(tree.find_root(a), a);
        assert_eq!(tree.leaf_count(root), 2);

        tree.add_child(root, a).unwrap();
        assert_eq!(tree.leaf_count(root), 3);
    }

    #[test]
    fn clear_children_orphans_every_child() {
        let (mut tree, [root, x, a, b, _]) = sample_tree();
        tree.clear_children(x);
        assert!(tree[x].is_leaf());
        assert_eq!(tree[a].parent(), None);
        assert_eq!(tree[b].parent(), None);
        assert_eq!(tree.clade_count(), 3);
        assert_eq!(tree.find_root(x), root);
    }

    #[test]
    fn leaves_and_internal_nodes_partition_the_tree() {
        let (tree, [root, x, a, b, c]) = sample_tree();
        assert_eq!(tree.leaves().collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(tree.internal_clades().collect::<Vec<_>>(), vec![root, x]);
    }

    #[test]
    fn length_from_root_substitutes_missing_lengths() {
        let (mut tree, [root, x, _, b, _]) = sample_tree();
        assert_eq!(tree.length_from_root(root, 1.0), 0.0);
        assert_eq!(tree.length_from_root(b, 1.0), 3.0);

        tree[x].set_length(Some(f64::NAN));
        assert_eq!(tree[x].length(), None);
        assert_eq!(tree.length_from_root(b, 0.5), 2.5);
    }

    #[test]
    fn full_clone_is_independent() {
        let (tree, [_, x, ..]) = sample_tree();
        let mut copy = tree.clone();
        copy[x].style.branch_color = Some(Color::from_rgb(255, 0, 0));
        copy[x].name = Some("renamed".into());

        assert_eq!(tree[x].style.branch_color, None);
        assert_eq!(tree[x].name, None);
        assert_eq!(copy.all_clades().count(), tree.all_clades().count());
    }

    #[test]
    fn subtree_clone_has_fresh_root_and_handles() {
        let (tree, [_, x, a, b, c]) = sample_tree();
        let subtree = tree.clone_subtree(x).unwrap();

        let copy = &subtree.tree;
        assert_eq!(copy.clade_count(), 3);
        assert_eq!(copy[copy.root()].parent(), None);
        assert_eq!(copy[copy.root()].support.as_deref(), Some("X"));

        let b_copy = subtree.handle(b).unwrap();
        assert_eq!(copy[b_copy].name.as_deref(), Some("B"));
        assert_eq!(copy.length_from_root(b_copy, 0.0), 2.0);
        assert!(subtree.handle(c).is_none());
        assert!(subtree.handle(a).is_some());
    }

    #[test]
    fn split_off_requires_a_detached_clade() {
        let (mut tree, [root, x, ..]) = sample_tree();
        assert_eq!(
            tree.split_off(x).unwrap_err(),
            TreeError::AlreadyParented { child: x, parent: root }
        );
        assert_eq!(tree.split_off(root).unwrap_err(), TreeError::IsRoot(root));

        assert!(tree.remove_child(root, x));
        let split = tree.split_off(x).unwrap();
        assert_eq!(split.clade_count(), 3);

        assert_eq!(tree.add_child(root, x), Err(TreeError::Moved(x)));
        assert_eq!(tree.split_off(x).unwrap_err(), TreeError::Moved(x));
    }

    #[test]
    fn ladderize_orders_children_by_size() {
        let (mut tree, [root, x, _, _, c]) = sample_tree();
        tree.ladderize(true);
        assert_eq!(tree[root].children(), &[c, x]);
        tree.ladderize(false);
        assert_eq!(tree[root].children(), &[x, c]);
    }

    #[test]
    fn rotate_reverses_all_tips_below() {
        let (mut tree, [root, ..]) = sample_tree();
        tree.rotate(root);
        let names: Vec<&str> = tree
            .leaves()
            .filter_map(|id| tree[id].name.as_deref())
            .collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let (mut tree, [root, ..]) = sample_tree();
        let stranger = CladeId(99);
        assert_eq!(
            tree.add_child(root, stranger),
            Err(TreeError::UnknownClade(stranger))
        );
        assert!(!tree.remove_child(stranger, root));
        assert!(tree.clone_subtree(stranger).is_err());
    }
}
