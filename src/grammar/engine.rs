//! The TreeRePair outer loop: `build()`, `replace()`, and the two-phase
//! `optimize()` pruning pass.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::stats::{compute_stats, Stats};
use crate::digram::{Digram, DigramIndex};
use crate::error::{Error, Result};
use crate::tree::symbol::{new_nonterminal, SymbolKind, SymbolRef};
use crate::tree::{Arena, NodeId};

/// Owns the evolving axiom tree, the grammar's rule bodies, and the
/// digram index that drives `build()`. `optimize()` consumes the index
/// and must not be followed by any further digram operation (spec §4.3:
/// "after pruning, the digram index is no longer maintained").
pub struct Engine {
    arena: Arena,
    index: Option<DigramIndex>,
    axiom: NodeId,
    rules: HashMap<SymbolRef, NodeId>,
    max_rank: Option<usize>,
    next_rule_id: usize,
}

impl Engine {
    /// Takes ownership of an already-populated arena and builds the
    /// initial digram index over `axiom`.
    pub fn new(mut arena: Arena, axiom: NodeId, max_rank: Option<usize>) -> Result<Self> {
        let mut index = DigramIndex::new(max_rank);
        index.build(&mut arena, axiom)?;
        Ok(Engine {
            arena,
            index: Some(index),
            axiom,
            rules: HashMap::new(),
            max_rank,
            next_rule_id: 0,
        })
    }

    pub fn axiom(&self) -> NodeId {
        self.axiom
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn rules(&self) -> &HashMap<SymbolRef, NodeId> {
        &self.rules
    }

    /// Repeatedly replaces the most frequent digram until none remains
    /// with more than one occurrence.
    pub fn build(&mut self) -> Result<()> {
        debug!("starting grammar inference");
        loop {
            let best = {
                let index = self.index.as_ref().expect("build() runs before optimize()");
                index.best()
            };
            match best {
                Some(digram) => self.replace(digram)?,
                None => break,
            }
        }
        debug!(rules = self.rules.len(), "grammar inference converged");
        Ok(())
    }

    /// Introduces a fresh Nonterminal for `digram` and rewrites every
    /// occurrence in its occurrence set (spec §4.3).
    fn replace(&mut self, digram: Digram) -> Result<()> {
        let rank = digram.parent.rank() + digram.child.rank() - 1;
        let name = format!("S{}", self.next_rule_id);
        self.next_rule_id += 1;
        trace!(rule = %name, parent = ?digram.parent, child = ?digram.child, "replacing digram");
        let nonterminal = new_nonterminal(name, rank);
        let formals = nonterminal.formals().to_vec();

        let body_root = self.arena.new_node(digram.parent.clone());
        let mut next_formal = 0;
        for i in 0..digram.parent.rank() {
            if i == digram.index {
                let child_node = self.arena.new_node(digram.child.clone());
                for _ in 0..digram.child.rank() {
                    let p = self.arena.new_node(formals[next_formal].clone());
                    self.arena.append_child(child_node, p);
                    next_formal += 1;
                }
                self.arena.append_child(body_root, child_node);
            } else {
                let p = self.arena.new_node(formals[next_formal].clone());
                self.arena.append_child(body_root, p);
                next_formal += 1;
            }
        }
        self.rules.insert(nonterminal.clone(), body_root);

        let occurrences = {
            let index = self.index.as_ref().unwrap();
            index.occurrences(&self.arena, digram.id)
        };
        for parent_node in occurrences {
            self.rewrite_occurrence(parent_node, digram.index, &nonterminal)?;
        }
        Ok(())
    }

    /// Rewrites one occurrence `parent_node` of a just-introduced digram
    /// at child position `index` into an invocation of `nonterminal`.
    fn rewrite_occurrence(
        &mut self,
        parent_node: NodeId,
        index: usize,
        nonterminal: &SymbolRef,
    ) -> Result<()> {
        let grandparent = self.arena.node(parent_node).parent();

        let idx = self.index.as_mut().unwrap();
        idx.remove_node(&mut self.arena, parent_node);

        let children: Vec<(usize, NodeId)> = self.arena.child_entries(parent_node).collect();
        let digram_child = children
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, c)| *c)
            .expect("occurrence parent has a child at the digram's index");

        self.index
            .as_mut()
            .unwrap()
            .remove_node(&mut self.arena, digram_child);

        let invocation = self.arena.new_node(nonterminal.clone());

        for (i, child) in children {
            if i == index {
                let grandchildren: Vec<NodeId> = self
                    .arena
                    .child_entries(digram_child)
                    .map(|(_, g)| g)
                    .collect();
                for g in grandchildren {
                    self.arena.detach(g);
                    self.arena.append_child(invocation, g);
                }
            } else {
                self.arena.detach(child);
                self.arena.append_child(invocation, child);
            }
        }

        if grandparent.is_some() {
            self.arena.replace_in_place(parent_node, invocation);
        } else {
            self.axiom = invocation;
        }

        self.index
            .as_mut()
            .unwrap()
            .add_node(&mut self.arena, invocation);
        Ok(())
    }

    /// Two-phase pruning: inline every rule used exactly once, then walk
    /// the remaining rules deepest-first and inline any with non-positive
    /// savings. Drops the digram index: nothing past this point may call
    /// `build()` again.
    pub fn optimize(&mut self) -> Result<()> {
        debug!(rules = self.rules.len(), "pruning grammar");
        self.index = None;
        self.inline_singletons()?;
        self.prune_unprofitable()?;
        debug!(rules = self.rules.len(), "pruning complete");
        Ok(())
    }

    fn compute_stats(&self) -> Result<Stats> {
        compute_stats(&self.arena, self.axiom, &self.rules)
    }

    fn inline_singletons(&mut self) -> Result<()> {
        loop {
            let stats = self.compute_stats()?;
            let target = stats
                .order
                .iter()
                .find(|nt| stats.ref_count.get(*nt).copied().unwrap_or(0) == 1)
                .cloned();
            match target {
                Some(nt) => self.inline_rule(&nt)?,
                None => break,
            }
        }
        Ok(())
    }

    fn prune_unprofitable(&mut self) -> Result<()> {
        loop {
            let stats = self.compute_stats()?;
            let mut to_prune = None;
            for nt in &stats.order {
                let rank = nt.rank() as isize;
                let size = *stats.size.get(nt).unwrap_or(&0) as isize;
                let ref_count = *stats.ref_count.get(nt).unwrap_or(&0) as isize;
                let savings = ref_count * (size - rank - 1) - size;
                if savings <= 0 {
                    to_prune = Some(nt.clone());
                    break;
                }
            }
            match to_prune {
                Some(nt) => self.inline_rule(&nt)?,
                None => break,
            }
        }
        Ok(())
    }

    /// Replaces every occurrence of `nt` (in the axiom and every other
    /// rule body) with a fresh instantiation of its body, substituting
    /// Parameters with the occurrence's own children, then drops the
    /// rule.
    fn inline_rule(&mut self, nt: &SymbolRef) -> Result<()> {
        let body_root = self
            .rules
            .remove(nt)
            .ok_or_else(|| Error::invariant("attempted to inline an unknown rule"))?;

        let mut roots = vec![self.axiom];
        roots.extend(self.rules.values().copied());

        let mut occurrences = Vec::new();
        for r in roots {
            for n in self.arena.pre_order(r).collect::<Vec<_>>() {
                if self.arena.node(n).label == *nt {
                    occurrences.push(n);
                }
            }
        }

        for occ in occurrences {
            let children: Vec<NodeId> = self.arena.child_entries(occ).map(|(_, c)| c).collect();
            for c in &children {
                self.arena.detach(*c);
            }
            let parent = self.arena.node(occ).parent();
            let replacement = self.instantiate(body_root, &children);
            if parent.is_some() {
                self.arena.replace_in_place(occ, replacement);
            } else {
                self.axiom = replacement;
            }
        }

        Ok(())
    }

    /// Clones `template` into fresh nodes, substituting each Parameter
    /// leaf with the corresponding entry of `args` (moved, not cloned:
    /// each formal is referenced exactly once per instantiation).
    fn instantiate(&mut self, template: NodeId, args: &[NodeId]) -> NodeId {
        let label = self.arena.node(template).label.clone();
        if let SymbolKind::Parameter { index, .. } = &label.kind {
            return args[*index];
        }

        let fresh = self.arena.new_node(label);
        let children: Vec<NodeId> = self.arena.child_entries(template).map(|(_, c)| c).collect();
        for c in children {
            let instantiated = self.instantiate(c, args);
            self.arena.append_child(fresh, instantiated);
        }
        fresh
    }

    /// Fully expands the grammar back into a terminal-only tree, for
    /// round-trip testing of semantic preservation (spec §8 property 5).
    /// Builds into a fresh arena so the engine's own storage is untouched.
    pub fn expand(&self) -> (Arena, NodeId) {
        let mut out = Arena::new();
        let root = Self::expand_into(&self.arena, &self.rules, &mut out, self.axiom);
        (out, root)
    }

    fn expand_into(
        src: &Arena,
        rules: &HashMap<SymbolRef, NodeId>,
        out: &mut Arena,
        n: NodeId,
    ) -> NodeId {
        let label = src.node(n).label.clone();
        if label.is_nonterminal() {
            if let Some(&body) = rules.get(&label) {
                let args: Vec<NodeId> = src
                    .child_entries(n)
                    .map(|(_, c)| Self::expand_into(src, rules, out, c))
                    .collect();
                return Self::expand_body(src, rules, out, body, &args);
            }
        }
        let fresh = out.new_node(label);
        for (_, c) in src.child_entries(n) {
            let child = Self::expand_into(src, rules, out, c);
            out.append_child(fresh, child);
        }
        fresh
    }

    fn expand_body(
        src: &Arena,
        rules: &HashMap<SymbolRef, NodeId>,
        out: &mut Arena,
        body: NodeId,
        args: &[NodeId],
    ) -> NodeId {
        let label = src.node(body).label.clone();
        if let SymbolKind::Parameter { index, .. } = &label.kind {
            return args[*index];
        }
        if label.is_nonterminal() {
            if let Some(&nested_body) = rules.get(&label) {
                let nested_args: Vec<NodeId> = src
                    .child_entries(body)
                    .map(|(_, c)| Self::expand_body(src, rules, out, c, args))
                    .collect();
                return Self::expand_body(src, rules, out, nested_body, &nested_args);
            }
        }
        let fresh = out.new_node(label);
        for (_, c) in src.child_entries(body) {
            let child = Self::expand_body(src, rules, out, c, args);
            out.append_child(fresh, child);
        }
        fresh
    }

    /// Asserts the tree and digram-index invariants (spec §8 property 7).
    /// Only meaningful before `optimize()` drops the index.
    pub fn check_invariants(&self) -> Result<()> {
        self.arena.check_tree(self.axiom)?;
        for &body in self.rules.values() {
            self.arena.check_tree(body)?;
        }
        if let Some(index) = &self.index {
            index.check_digrams(&self.arena)?;
        }
        Ok(())
    }

    pub fn max_rank(&self) -> Option<usize> {
        self.max_rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::symbol::Symbol;

    fn leaf(arena: &mut Arena, label: &SymbolRef) -> NodeId {
        arena.new_node(label.clone())
    }

    /// Scenario S4: A(B(C), A(B(C), B(C))) with ranks A=2, B=1, C=0.
    #[test]
    fn build_compresses_repeated_digrams_and_preserves_shape() {
        let mut arena = Arena::new();
        let a = Symbol::terminal("A", 2);
        let b = Symbol::terminal("B", 1);
        let c = Symbol::terminal("C", 0);

        let make_bc = |arena: &mut Arena| {
            let bnode = arena.new_node(b.clone());
            let cnode = leaf(arena, &c);
            arena.append_child(bnode, cnode);
            bnode
        };

        let root = arena.new_node(a.clone());
        let left = make_bc(&mut arena);
        let inner = arena.new_node(a.clone());
        let inner_left = make_bc(&mut arena);
        let inner_right = make_bc(&mut arena);
        arena.append_child(inner, inner_left);
        arena.append_child(inner, inner_right);
        arena.append_child(root, left);
        arena.append_child(root, inner);

        arena.check_tree(root).unwrap();

        let mut engine = Engine::new(arena, root, None).unwrap();
        engine.build().unwrap();
        engine.check_invariants().unwrap();

        let (expanded_arena, expanded_root) = engine.expand();
        assert_tree_shape_eq(
            engine.arena(),
            engine.axiom(),
            &expanded_arena,
            expanded_root,
        );
    }

    /// Engine and expansion may live in different arenas; compare
    /// structurally (label display string plus shape) rather than by
    /// `NodeId`.
    fn assert_tree_shape_eq(a1: &Arena, n1: NodeId, a2: &Arena, n2: NodeId) {
        // Expansion must fully eliminate nonterminals: only the original
        // terminal alphabet should remain.
        assert!(!a2.node(n2).label.is_nonterminal());
        assert!(!a2.node(n2).label.is_parameter());

        let c1: Vec<(usize, NodeId)> = a1.child_entries(n1).collect();
        let c2: Vec<(usize, NodeId)> = a2.child_entries(n2).collect();
        assert_eq!(c1.len(), c2.len());
        for ((_, x1), (_, x2)) in c1.into_iter().zip(c2.into_iter()) {
            assert_tree_shape_eq(a1, x1, a2, x2);
        }
    }

    #[test]
    fn optimize_inlines_single_use_rules() {
        let mut arena = Arena::new();
        let a = Symbol::terminal("A", 1);
        let b = Symbol::terminal("B", 1);
        let c = Symbol::terminal("C", 0);

        let root = arena.new_node(a);
        let mid = arena.new_node(b);
        let leaf_node = arena.new_node(c);
        arena.append_child(mid, leaf_node);
        arena.append_child(root, mid);

        let mut engine = Engine::new(arena, root, None).unwrap();
        engine.build().unwrap();
        engine.optimize().unwrap();
        // A single-occurrence B0C digram, with no repetition anywhere,
        // should leave no rules behind after Phase A/B pruning.
        assert!(engine.rules().is_empty());
    }
}
