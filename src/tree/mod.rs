//! Ranked-tree storage: node arena, O(1) append, and restartable
//! pre-/post-order traversal cursors.
//!
//! Modeled on `cranelift-codegen`'s IR storage: entities live in one arena
//! and are addressed by a small `Copy` handle (`NodeId`), and traversal is
//! a stateful cursor rather than a borrowed iterator chain
//! (`cranelift-codegen/src/cursor.rs`), so a walk can be interrupted,
//! resumed, or restarted after the tree underneath it has been rewritten.

pub mod symbol;

use crate::entity::{entity_impl, PrimaryMap};
use crate::error::{Error, Result};
use symbol::SymbolRef;

/// A handle to a [`Node`] stored in an [`Arena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);
entity_impl!(NodeId, "n");

/// A node of a ranked tree.
///
/// `prev_sibling_or_last_child` is the compact pointer described in spec
/// §3: on the first child of a parent it holds that parent's *last*
/// child (so appending is O(1)); on every other child it holds the
/// literal previous sibling.
///
/// `prev_digram`/`next_digram` thread together, at each child index `i`,
/// every node that currently participates in the same digram as this one
/// at that index. They are owned and maintained by [`crate::digram::DigramIndex`],
/// not by the arena itself.
#[derive(Debug)]
pub struct Node {
    pub label: SymbolRef,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
    prev_sibling_or_last_child: Option<NodeId>,
    pub(crate) prev_digram: Vec<Option<NodeId>>,
    pub(crate) next_digram: Vec<Option<NodeId>>,
}

impl Node {
    fn new(label: SymbolRef) -> Self {
        let rank = label.rank();
        Node {
            label,
            parent: None,
            first_child: None,
            next_sibling: None,
            prev_sibling_or_last_child: None,
            prev_digram: vec![None; rank],
            next_digram: vec![None; rank],
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }

    pub fn rank(&self) -> usize {
        self.label.rank()
    }
}

/// Owns all node storage for one or more ranked trees (the evolving axiom
/// and every grammar rule body share this arena).
#[derive(Debug, Default)]
pub struct Arena {
    nodes: PrimaryMap<NodeId, Node>,
}

impl Arena {
    pub fn new() -> Self {
        Arena {
            nodes: PrimaryMap::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Creates a fresh, childless node wearing `label`. Its children must
    /// be attached with [`Arena::append_child`] before the rank invariant
    /// holds.
    pub fn new_node(&mut self, label: SymbolRef) -> NodeId {
        self.nodes.push(Node::new(label))
    }

    /// Appends `child` as the next child of `parent`, in O(1), using the
    /// `prev_sibling_or_last_child` trick to find the current last child
    /// without walking the sibling list.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        self.nodes[child].next_sibling = None;

        match self.nodes[parent].first_child {
            None => {
                self.nodes[parent].first_child = Some(child);
                self.nodes[child].prev_sibling_or_last_child = Some(child);
            }
            Some(first) => {
                let last = self.nodes[first]
                    .prev_sibling_or_last_child
                    .expect("first child always links to the last child");
                self.nodes[last].next_sibling = Some(child);
                self.nodes[child].prev_sibling_or_last_child = Some(last);
                self.nodes[first].prev_sibling_or_last_child = Some(child);
            }
        }
    }

    /// Returns the `i`-th child of `n` (0-indexed), walking the sibling
    /// list. Ranks are small and bounded by the configured `max_rank`, so
    /// this is not worth indexing further.
    pub fn nth_child(&self, n: NodeId, i: usize) -> NodeId {
        let mut cur = self.nodes[n].first_child.expect("node has no children");
        for _ in 0..i {
            cur = self.nodes[cur].next_sibling.expect("child index out of range");
        }
        cur
    }

    /// The index of `child` within its parent's child list.
    pub fn child_index(&self, parent: NodeId, child: NodeId) -> usize {
        let mut cur = self.nodes[parent].first_child;
        let mut i = 0;
        while let Some(c) = cur {
            if c == child {
                return i;
            }
            cur = self.nodes[c].next_sibling;
            i += 1;
        }
        panic!("child does not belong to parent")
    }

    /// Ordered `(index, child)` pairs for `n`'s children.
    pub fn child_entries(&self, n: NodeId) -> ChildEntries<'_> {
        ChildEntries {
            arena: self,
            next: self.nodes[n].first_child,
            index: 0,
        }
    }

    /// Detaches `n` from its parent and siblings. Does not touch `n`'s own
    /// children. `n` must not be reattached without going through
    /// [`Arena::append_child`] again.
    pub fn detach(&mut self, n: NodeId) {
        let parent = self.nodes[n].parent;
        let next = self.nodes[n].next_sibling;
        let is_first = parent
            .map(|p| self.nodes[p].first_child == Some(n))
            .unwrap_or(false);

        if let Some(p) = parent {
            if is_first {
                self.nodes[p].first_child = next;
                if let Some(next) = next {
                    let last = self.nodes[n].prev_sibling_or_last_child;
                    self.nodes[next].prev_sibling_or_last_child = last;
                }
            } else {
                let prev = self.nodes[n]
                    .prev_sibling_or_last_child
                    .expect("non-first child has a previous sibling");
                match next {
                    Some(next) => {
                        self.nodes[prev].next_sibling = Some(next);
                        self.nodes[next].prev_sibling_or_last_child = Some(prev);
                    }
                    None => {
                        self.nodes[prev].next_sibling = None;
                        let first = self.nodes[p].first_child.expect("parent has children");
                        self.nodes[first].prev_sibling_or_last_child = Some(prev);
                    }
                }
            }
        }

        self.nodes[n].parent = None;
        self.nodes[n].next_sibling = None;
        self.nodes[n].prev_sibling_or_last_child = None;
    }

    /// Replaces `old` with `new` at `old`'s former position among its
    /// parent's children. `new` must currently be parentless. If `old` had
    /// no parent (it was a tree root), `new` is simply left parentless;
    /// the caller is responsible for updating whatever held the root
    /// reference.
    pub fn replace_in_place(&mut self, old: NodeId, new: NodeId) {
        let parent = self.nodes[old].parent;
        let next = self.nodes[old].next_sibling;
        let is_first = parent
            .map(|p| self.nodes[p].first_child == Some(old))
            .unwrap_or(false);

        self.nodes[new].next_sibling = next;
        self.nodes[new].parent = parent;

        let Some(p) = parent else {
            self.nodes[new].prev_sibling_or_last_child = None;
            return;
        };

        if is_first {
            self.nodes[p].first_child = Some(new);
            // `old` carried the last-child pointer; propagate it, and fix
            // up the new "literal previous sibling" on whatever follows.
            let last = self.nodes[old].prev_sibling_or_last_child;
            self.nodes[new].prev_sibling_or_last_child = last;
            if let Some(next) = next {
                self.nodes[next].prev_sibling_or_last_child = Some(new);
            }
        } else {
            let prev = self.nodes[old]
                .prev_sibling_or_last_child
                .expect("non-first child has a previous sibling");
            self.nodes[prev].next_sibling = Some(new);
            self.nodes[new].prev_sibling_or_last_child = Some(prev);
            match next {
                Some(next) => {
                    self.nodes[next].prev_sibling_or_last_child = Some(new);
                }
                None => {
                    let first = self.nodes[p].first_child.expect("parent has children");
                    self.nodes[first].prev_sibling_or_last_child = Some(new);
                }
            }
        }
    }

    pub fn pre_order(&self, root: NodeId) -> PreOrder<'_> {
        PreOrder {
            arena: self,
            stack: vec![root],
        }
    }

    pub fn post_order(&self, root: NodeId) -> PostOrder<'_> {
        let mut cursor = PostOrder {
            arena: self,
            stack: Vec::new(),
        };
        cursor.push_leftmost(root);
        cursor
    }

    /// Asserts every structural invariant in spec §3 holds for the tree
    /// rooted at `root`: rank, sibling linkage, and absence of cycles
    /// (tortoise-and-hare over pre-order).
    pub fn check_tree(&self, root: NodeId) -> Result<()> {
        // Cycle detection first and on its own: it must tolerate a
        // genuinely cyclic graph without looping forever, so it cannot
        // rely on any of the helpers below that collect a full pre-order
        // sequence into a `Vec`.
        self.check_acyclic(root)?;
        self.check_rank(root)?;

        // Sibling linkage, checked per parent.
        for n in self.pre_order_nodes(root) {
            let mut prev: Option<NodeId> = None;
            for (i, (_, child)) in self.child_entries(n).enumerate() {
                if i == 0 {
                    if self.nodes[n].first_child != Some(child) {
                        return Err(Error::invariant("first child pointer mismatch"));
                    }
                } else if self.nodes[child].prev_sibling_or_last_child != prev {
                    return Err(Error::invariant("previous-sibling pointer mismatch"));
                }
                prev = Some(child);
            }
            if let (Some(first), Some(last)) = (self.nodes[n].first_child, prev) {
                if self.nodes[first].prev_sibling_or_last_child != Some(last) {
                    return Err(Error::invariant("last-child pointer mismatch"));
                }
            }
        }

        Ok(())
    }

    /// Asserts `n`'s child count equals its label's rank, recursively.
    pub fn check_rank(&self, root: NodeId) -> Result<()> {
        for n in self.pre_order_nodes(root) {
            let count = self.child_entries(n).count();
            if count != self.nodes[n].rank() {
                return Err(Error::invariant(format!(
                    "node labelled {} has {} children but rank {}",
                    self.nodes[n].label,
                    count,
                    self.nodes[n].rank()
                )));
            }
        }
        Ok(())
    }

    /// Collects the full pre-order sequence. Only safe to call once
    /// [`Arena::check_acyclic`] has passed: an actually-cyclic graph would
    /// make this loop forever.
    fn pre_order_nodes(&self, root: NodeId) -> Vec<NodeId> {
        self.pre_order(root).collect()
    }

    /// Tortoise-and-hare over the pre-order sequence (spec §4.1): a slow
    /// cursor and a cursor advancing twice as fast are compared at every
    /// step. In a genuine tree the slow cursor exhausts the sequence
    /// within `len(arena) + 1` steps; in a cyclic graph the walk repeats a
    /// node, which the two cursors are guaranteed to witness within the
    /// same bound. Neither cursor ever collects its sequence into memory,
    /// so this terminates even when the input is cyclic.
    fn check_acyclic(&self, root: NodeId) -> Result<()> {
        let mut slow = self.pre_order(root);
        let mut fast = self.pre_order(root);
        let bound = self.nodes.len() + 1;

        for _ in 0..bound {
            let s = match slow.next() {
                Some(s) => s,
                None => return Ok(()),
            };
            let f = match (fast.next(), fast.next()) {
                (Some(_), None) | (None, _) => return Ok(()),
                (Some(_), Some(f2)) => f2,
            };
            if s == f {
                return Err(Error::invariant("cycle detected in tree"));
            }
        }
        Err(Error::invariant("cycle detected in tree"))
    }
}

/// Lazy, restartable sequence of `(index, NodeId)` child entries.
pub struct ChildEntries<'a> {
    arena: &'a Arena,
    next: Option<NodeId>,
    index: usize,
}

impl<'a> Iterator for ChildEntries<'a> {
    type Item = (usize, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        let item = (self.index, cur);
        self.next = self.arena.nodes[cur].next_sibling;
        self.index += 1;
        Some(item)
    }
}

/// A restartable pre-order (parent before children, left to right) cursor.
pub struct PreOrder<'a> {
    arena: &'a Arena,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let n = self.stack.pop()?;
        let children: Vec<NodeId> = self.arena.child_entries(n).map(|(_, c)| c).collect();
        self.stack.extend(children.into_iter().rev());
        Some(n)
    }
}

/// A restartable post-order (children before parent, left to right) cursor.
pub struct PostOrder<'a> {
    arena: &'a Arena,
    stack: Vec<(NodeId, usize)>,
}

impl<'a> PostOrder<'a> {
    fn push_leftmost(&mut self, mut n: NodeId) {
        loop {
            self.stack.push((n, 0));
            match self.arena.nodes[n].first_child {
                Some(c) => n = c,
                None => break,
            }
        }
    }
}

impl<'a> Iterator for PostOrder<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            let (n, visited_children) = *self.stack.last()?;
            let total = self.arena.child_entries(n).count();
            if visited_children < total {
                self.stack.last_mut().unwrap().1 += 1;
                let next_child = self.arena.nth_child(n, visited_children);
                self.push_leftmost(next_child);
                continue;
            }
            self.stack.pop();
            return Some(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::symbol::Symbol;
    use super::*;

    fn leaf(arena: &mut Arena, label: &SymbolRef) -> NodeId {
        arena.new_node(label.clone())
    }

    #[test]
    fn append_child_is_o1_and_preserves_order() {
        let mut arena = Arena::new();
        let leaf_sym = Symbol::terminal("L", 0);
        let parent_sym = Symbol::terminal("P", 3);

        let p = arena.new_node(parent_sym);
        let c0 = leaf(&mut arena, &leaf_sym);
        let c1 = leaf(&mut arena, &leaf_sym);
        let c2 = leaf(&mut arena, &leaf_sym);
        arena.append_child(p, c0);
        arena.append_child(p, c1);
        arena.append_child(p, c2);

        let order: Vec<NodeId> = arena.child_entries(p).map(|(_, c)| c).collect();
        assert_eq!(order, vec![c0, c1, c2]);
        arena.check_tree(p).unwrap();
    }

    #[test]
    fn pre_and_post_order_visit_every_node_once() {
        let mut arena = Arena::new();
        let leaf_sym = Symbol::terminal("L", 0);
        let parent_sym = Symbol::terminal("P", 2);

        let root = arena.new_node(parent_sym.clone());
        let left = arena.new_node(parent_sym.clone());
        let l0 = leaf(&mut arena, &leaf_sym);
        let l1 = leaf(&mut arena, &leaf_sym);
        arena.append_child(left, l0);
        arena.append_child(left, l1);
        let right = leaf(&mut arena, &Symbol::terminal("R", 0));
        arena.append_child(root, left);
        arena.append_child(root, right);

        let pre: Vec<NodeId> = arena.pre_order(root).collect();
        assert_eq!(pre, vec![root, left, l0, l1, right]);

        let post: Vec<NodeId> = arena.post_order(root).collect();
        assert_eq!(post, vec![l0, l1, left, right, root]);
    }

    #[test]
    fn replace_in_place_splices_into_middle_position() {
        let mut arena = Arena::new();
        let leaf_sym = Symbol::terminal("L", 0);
        let parent_sym = Symbol::terminal("P", 3);

        let p = arena.new_node(parent_sym);
        let c0 = leaf(&mut arena, &leaf_sym);
        let c1 = leaf(&mut arena, &leaf_sym);
        let c2 = leaf(&mut arena, &leaf_sym);
        arena.append_child(p, c0);
        arena.append_child(p, c1);
        arena.append_child(p, c2);

        let replacement_sym = Symbol::terminal("M", 0);
        let m = arena.new_node(replacement_sym);
        arena.replace_in_place(c1, m);

        let order: Vec<NodeId> = arena.child_entries(p).map(|(_, c)| c).collect();
        assert_eq!(order, vec![c0, m, c2]);
        arena.check_tree(p).unwrap();
    }

    #[test]
    fn check_rank_rejects_mismatched_child_count() {
        let mut arena = Arena::new();
        let parent_sym = Symbol::terminal("P", 2);
        let p = arena.new_node(parent_sym);
        let leaf_sym = Symbol::terminal("L", 0);
        let c0 = leaf(&mut arena, &leaf_sym);
        arena.append_child(p, c0);

        assert!(arena.check_rank(p).is_err());
    }
}
