//! The digram index proper: interning, occurrence tracking and the
//! overlap rule, layered on top of [`super::heap::DigramHeap`].

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use super::heap::DigramHeap;
use super::DigramId;
use crate::entity::PrimaryMap;
use crate::error::Result;
use crate::tree::symbol::SymbolRef;
use crate::tree::{Arena, NodeId};

/// A digram as handed back by [`DigramIndex::best`]: enough to drive
/// [`crate::engine::Engine::replace`] without a further index lookup.
#[derive(Clone)]
pub struct Digram {
    pub id: DigramId,
    pub parent: SymbolRef,
    pub index: usize,
    pub child: SymbolRef,
}

/// Per-digram bookkeeping: the occurrence set (as both a membership
/// `HashSet` for O(1) overlap checks and an intrusive list threaded
/// through `Node::prev_digram`/`next_digram` for deterministic iteration)
/// plus this digram's current slot in the frequency heap.
pub(crate) struct DigramRecord {
    pub(crate) parent: SymbolRef,
    pub(crate) index: usize,
    pub(crate) child: SymbolRef,
    pub(crate) members: HashSet<NodeId>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    pub(crate) heap_index: Option<usize>,
}

impl DigramRecord {
    pub(crate) fn new(parent: SymbolRef, index: usize, child: SymbolRef) -> Self {
        DigramRecord {
            parent,
            index,
            child,
            members: HashSet::new(),
            head: None,
            tail: None,
            heap_index: None,
        }
    }
}

/// Maintains the interning table, every digram's occurrence set, and the
/// frequency max-heap for one evolving tree.
pub struct DigramIndex {
    records: PrimaryMap<DigramId, DigramRecord>,
    // Three-level interning table, keyed by pointer identity at each
    // level: parent symbol -> child index -> child symbol -> DigramId.
    intern_table: HashMap<usize, HashMap<usize, HashMap<usize, DigramId>>>,
    heap: DigramHeap,
    max_rank: Option<usize>,
}

impl DigramIndex {
    pub fn new(max_rank: Option<usize>) -> Self {
        DigramIndex {
            records: PrimaryMap::new(),
            intern_table: HashMap::new(),
            heap: DigramHeap::new(),
            max_rank,
        }
    }

    fn intern(&mut self, parent: SymbolRef, index: usize, child: SymbolRef) -> DigramId {
        let parent_key = parent.ptr_key();
        let child_key = child.ptr_key();
        let by_index = self.intern_table.entry(parent_key).or_default();
        let by_child = by_index.entry(index).or_default();
        match by_child.entry(child_key) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let id = self.records.push(DigramRecord::new(parent, index, child));
                e.insert(id);
                id
            }
        }
    }

    fn lookup(&self, parent: &SymbolRef, index: usize, child: &SymbolRef) -> Option<DigramId> {
        self.intern_table
            .get(&parent.ptr_key())?
            .get(&index)?
            .get(&child.ptr_key())
            .copied()
    }

    /// Builds the index from scratch over the tree rooted at `root`: a
    /// post-order walk calling [`DigramIndex::add`] on every
    /// (parent, index, child) edge.
    pub fn build(&mut self, arena: &mut Arena, root: NodeId) -> Result<()> {
        let order: Vec<NodeId> = arena.post_order(root).collect();
        for parent in order {
            let edges: Vec<(usize, NodeId)> = arena.child_entries(parent).collect();
            for (i, child) in edges {
                self.add(arena, parent, i, child);
            }
        }
        Ok(())
    }

    /// Records the edge `parent --i--> child` as an occurrence of its
    /// digram, unless `max_rank` forbids it or the overlap rule excludes
    /// `parent` because `child` already serves as an occurrence-parent for
    /// the very same digram (spec §4.2's "overlap rule").
    pub fn add(&mut self, arena: &mut Arena, parent: NodeId, i: usize, child: NodeId) {
        let parent_label = arena.node(parent).label.clone();
        let child_label = arena.node(child).label.clone();

        if let Some(max_rank) = self.max_rank {
            if parent_label.rank() + child_label.rank() - 1 > max_rank {
                return;
            }
        }

        let digram_id = self.intern(parent_label.clone(), i, child_label.clone());

        if self.records[digram_id].members.contains(&child) {
            return;
        }
        if !self.records[digram_id].members.insert(parent) {
            return;
        }

        match self.records[digram_id].tail {
            Some(t) => {
                arena.node_mut(t).next_digram[i] = Some(parent);
                arena.node_mut(parent).prev_digram[i] = Some(t);
            }
            None => {
                self.records[digram_id].head = Some(parent);
                arena.node_mut(parent).prev_digram[i] = None;
            }
        }
        arena.node_mut(parent).next_digram[i] = None;
        self.records[digram_id].tail = Some(parent);

        if self.records[digram_id].heap_index.is_some() {
            self.heap.update_increased(digram_id, &mut self.records);
        } else {
            self.heap.push(digram_id, &mut self.records);
        }
    }

    /// Removes the edge `parent --i--> child` as an occurrence, if it is
    /// currently one; a no-op otherwise (callers may legitimately ask to
    /// remove an edge whose occurrence was already cleared, e.g. when
    /// `remove_node` is invoked on both endpoints of the same edge).
    pub fn remove(&mut self, arena: &mut Arena, parent: NodeId, i: usize, child: NodeId) {
        let parent_label = arena.node(parent).label.clone();
        let child_label = arena.node(child).label.clone();
        let Some(digram_id) = self.lookup(&parent_label, i, &child_label) else {
            return;
        };
        if !self.records[digram_id].members.remove(&parent) {
            return;
        }

        let prev = arena.node(parent).prev_digram[i];
        let next = arena.node(parent).next_digram[i];
        match prev {
            Some(p) => arena.node_mut(p).next_digram[i] = next,
            None => self.records[digram_id].head = next,
        }
        match next {
            Some(n) => arena.node_mut(n).prev_digram[i] = prev,
            None => self.records[digram_id].tail = prev,
        }
        arena.node_mut(parent).prev_digram[i] = None;
        arena.node_mut(parent).next_digram[i] = None;

        if self.records[digram_id].members.is_empty() {
            self.heap.remove(digram_id, &mut self.records);
        } else {
            self.heap.update_decreased(digram_id, &mut self.records);
        }
    }

    /// Processes the incoming edge from `n`'s parent (if any) and all of
    /// `n`'s outgoing edges.
    pub fn add_node(&mut self, arena: &mut Arena, n: NodeId) {
        if let Some(p) = arena.node(n).parent() {
            let i = arena.child_index(p, n);
            self.add(arena, p, i, n);
        }
        for i in 0..arena.node(n).rank() {
            let c = arena.nth_child(n, i);
            self.add(arena, n, i, c);
        }
    }

    /// Mirror of [`DigramIndex::add_node`].
    pub fn remove_node(&mut self, arena: &mut Arena, n: NodeId) {
        if let Some(p) = arena.node(n).parent() {
            let i = arena.child_index(p, n);
            self.remove(arena, p, i, n);
        }
        for i in 0..arena.node(n).rank() {
            let c = arena.nth_child(n, i);
            self.remove(arena, n, i, c);
        }
    }

    /// The most frequent digram, or `None` if no digram has more than one
    /// non-overlapping occurrence.
    pub fn best(&self) -> Option<Digram> {
        let id = self.heap.peek()?;
        let rec = &self.records[id];
        if rec.members.len() > 1 {
            Some(Digram {
                id,
                parent: rec.parent.clone(),
                index: rec.index,
                child: rec.child.clone(),
            })
        } else {
            None
        }
    }

    /// The occurrence-parents of `id`, in the deterministic order of the
    /// intrusive list (insertion order, modulo removals).
    pub fn occurrences(&self, arena: &Arena, id: DigramId) -> Vec<NodeId> {
        let rec = &self.records[id];
        let mut out = Vec::with_capacity(rec.members.len());
        let mut cur = rec.head;
        while let Some(n) = cur {
            out.push(n);
            cur = arena.node(n).next_digram[rec.index];
        }
        out
    }

    /// Asserts the digram-threading invariant (spec §3) for every digram
    /// currently indexed: intrusive-list neighbors agree on label
    /// identity at the shared child index, and the heap's intrusive
    /// position matches this digram's actual slot.
    pub fn check_digrams(&self, arena: &Arena) -> Result<()> {
        use crate::error::Error;

        for (id, rec) in self.records.iter() {
            let mut count = 0;
            let mut cur = rec.head;
            let mut prev: Option<NodeId> = None;
            while let Some(n) = cur {
                if arena.node(n).prev_digram[rec.index] != prev {
                    return Err(Error::invariant("digram list back-pointer mismatch"));
                }
                if !rec.members.contains(&n) {
                    return Err(Error::invariant("digram list node missing from occurrence set"));
                }
                let child = arena.nth_child(n, rec.index);
                if arena.node(child).label != rec.child {
                    return Err(Error::invariant("digram occurrence child label mismatch"));
                }
                count += 1;
                prev = Some(n);
                cur = arena.node(n).next_digram[rec.index];
            }
            if prev != rec.tail {
                return Err(Error::invariant("digram list tail mismatch"));
            }
            if count != rec.members.len() {
                return Err(Error::invariant("digram occurrence count mismatch"));
            }
            if let Some(pos) = rec.heap_index {
                if self.heap.peek_slot(pos) != Some(id) {
                    return Err(Error::invariant("digram heap index mismatch"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::symbol::Symbol;

    #[test]
    fn overlap_rule_caps_a_chain_at_half_length() {
        // A(A(A(A(B)))): a right-leaning chain of 4 `A` nodes rank 1,
        // terminated in a `B` leaf. Non-overlapping `A --0--> A`
        // occurrences must cap at floor(4/2) = 2 (spec scenario S6), not
        // 3 (every adjacent pair).
        let mut arena = Arena::new();
        let a = Symbol::terminal("A", 1);
        let b = Symbol::terminal("B", 0);

        let n4 = arena.new_node(a.clone());
        let leaf = arena.new_node(b);
        arena.append_child(n4, leaf);

        let n3 = arena.new_node(a.clone());
        arena.append_child(n3, n4);
        let n2 = arena.new_node(a.clone());
        arena.append_child(n2, n3);
        let n1 = arena.new_node(a.clone());
        arena.append_child(n1, n2);

        let mut index = DigramIndex::new(None);
        index.build(&mut arena, n1).unwrap();

        let best = index.best().expect("A-0-A digram present");
        assert_eq!(index.occurrences(&arena, best.id).len(), 2);
        index.check_digrams(&arena).unwrap();
    }

    #[test]
    fn max_rank_filters_out_overly_large_digrams() {
        let mut arena = Arena::new();
        let a = Symbol::terminal("A", 2);
        let leaf = Symbol::terminal("L", 0);

        let root = arena.new_node(a.clone());
        let left = arena.new_node(a);
        let l0 = arena.new_node(leaf.clone());
        let l1 = arena.new_node(leaf.clone());
        arena.append_child(left, l0);
        arena.append_child(left, l1);
        let r = arena.new_node(Symbol::terminal("L", 0));
        arena.append_child(root, left);
        arena.append_child(root, r);

        // combined rank of A-0-A would be 2+2-1=3; cap at 2 so it's
        // filtered at add() time.
        let mut index = DigramIndex::new(Some(2));
        index.build(&mut arena, root).unwrap();
        assert!(index.best().is_none());
    }
}
