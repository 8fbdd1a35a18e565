//! `compute_stats`: per-rule size and reference counts, the `uses`/
//! `used_by` relation between rules, and the descending-closure-size
//! ordering `optimize`'s Phase B walks.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::tree::symbol::SymbolRef;
use crate::tree::Arena;

/// Snapshot of grammar statistics as of one `compute_stats` call. Stale as
/// soon as any rule is inlined or pruned; callers recompute after every
/// structural change rather than patching this incrementally.
pub struct Stats {
    pub size: HashMap<SymbolRef, usize>,
    pub ref_count: HashMap<SymbolRef, usize>,
    pub uses: HashMap<SymbolRef, HashMap<SymbolRef, usize>>,
    pub used_by: HashMap<SymbolRef, HashMap<SymbolRef, usize>>,
    /// Every live nonterminal, sorted by descending transitive-closure
    /// size (most-deeply-nested rules first).
    pub order: Vec<SymbolRef>,
}

/// Walks `axiom` and every rule body in `rules`, tallying per-rule size
/// and every Nonterminal-to-Nonterminal reference, then verifies the
/// grammar is linear (no rule transitively uses itself) before handing
/// back the descending-closure-size order Phase B consumes.
pub fn compute_stats(
    arena: &Arena,
    axiom: crate::tree::NodeId,
    rules: &HashMap<SymbolRef, crate::tree::NodeId>,
) -> Result<Stats> {
    let mut size = HashMap::new();
    let mut ref_count: HashMap<SymbolRef, usize> = HashMap::new();
    let mut uses: HashMap<SymbolRef, HashMap<SymbolRef, usize>> = HashMap::new();
    let mut used_by: HashMap<SymbolRef, HashMap<SymbolRef, usize>> = HashMap::new();

    for nt in rules.keys() {
        ref_count.entry(nt.clone()).or_insert(0);
    }

    for (nt, &body) in rules {
        let mut sz = 0;
        for n in arena.pre_order(body) {
            sz += 1;
            let label = &arena.node(n).label;
            if label.is_nonterminal() && rules.contains_key(label) {
                *ref_count.entry(label.clone()).or_insert(0) += 1;
                *uses.entry(nt.clone()).or_default().entry(label.clone()).or_insert(0) += 1;
                *used_by.entry(label.clone()).or_default().entry(nt.clone()).or_insert(0) += 1;
            }
        }
        size.insert(nt.clone(), sz);
    }

    for n in arena.pre_order(axiom) {
        let label = &arena.node(n).label;
        if label.is_nonterminal() && rules.contains_key(label) {
            *ref_count.entry(label.clone()).or_insert(0) += 1;
        }
    }

    let closure = transitive_closure(rules, &uses);
    for (nt, reach) in &closure {
        if reach.contains(nt) {
            return Err(Error::invariant(format!(
                "grammar rule {nt} is not linear: it transitively uses itself"
            )));
        }
    }

    // Tie-break on the rule's name rather than its `SymbolRef` identity:
    // names are assigned "S0", "S1", ... in strictly increasing creation
    // order, so this keeps Phase B's walk order reproducible bit-for-bit
    // across runs, where an `Rc` pointer address would not be (spec §5).
    let mut order: Vec<SymbolRef> = rules.keys().cloned().collect();
    order.sort_by(|a, b| {
        let sa = closure.get(a).map(HashSet::len).unwrap_or(0);
        let sb = closure.get(b).map(HashSet::len).unwrap_or(0);
        sb.cmp(&sa).then_with(|| a.display_label().cmp(b.display_label()))
    });

    Ok(Stats {
        size,
        ref_count,
        uses,
        used_by,
        order,
    })
}

/// Worklist fixpoint over the direct `uses` relation.
fn transitive_closure(
    rules: &HashMap<SymbolRef, crate::tree::NodeId>,
    uses: &HashMap<SymbolRef, HashMap<SymbolRef, usize>>,
) -> HashMap<SymbolRef, HashSet<SymbolRef>> {
    let mut closure: HashMap<SymbolRef, HashSet<SymbolRef>> = HashMap::new();
    for nt in rules.keys() {
        closure.insert(nt.clone(), HashSet::new());
    }

    let mut changed = true;
    while changed {
        changed = false;
        for nt in rules.keys() {
            let Some(direct) = uses.get(nt) else {
                continue;
            };
            let mut additions = Vec::new();
            {
                let current = &closure[nt];
                for used in direct.keys() {
                    if !current.contains(used) {
                        additions.push(used.clone());
                    }
                    if let Some(nested) = closure.get(used) {
                        for transitive in nested {
                            if !current.contains(transitive) {
                                additions.push(transitive.clone());
                            }
                        }
                    }
                }
            }
            if !additions.is_empty() {
                let entry = closure.get_mut(nt).unwrap();
                for a in additions {
                    entry.insert(a);
                }
                changed = true;
            }
        }
    }
    closure
}
