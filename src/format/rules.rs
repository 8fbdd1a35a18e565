//! Section 1 of the binary format: the grammar's rule set, as a
//! self-contained `serde_json` blob (spec §6: "encoding the rule set's
//! shape is out of scope; any canonical representation a matching
//! decoder can replay is acceptable").
//!
//! Rule bodies are written directly, including any literal leaf baked
//! into a rule during grammar inference — string payloads are written as
//! an index into the (already deduplicated) string table rather than
//! duplicating their bytes, but are otherwise self-contained and do not
//! go through the MRU-delta stream the AST stream uses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tree::symbol::{new_nonterminal, Symbol, SymbolKind, SymbolRef};
use crate::tree::{Arena, NodeId};

#[derive(Serialize, Deserialize)]
pub struct RuleEntry {
    pub name: String,
    pub rank: usize,
    pub body: RuleNode,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RuleNode {
    Terminal { label: String, children: Vec<RuleNode> },
    Number { value: f64 },
    Str { index: usize },
    Nonterminal { name: String, children: Vec<RuleNode> },
    Parameter { index: usize },
}

/// Rule names are assigned `"S{n}"` in monotonically increasing creation
/// order (`grammar::Engine::replace`); sorting by that suffix recovers a
/// deterministic order from the engine's unordered `HashMap`.
fn rule_sort_key(name: &str) -> u64 {
    name.strip_prefix('S')
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

/// The grammar's rule names in the same deterministic order the binary
/// format assigns them AST-stream tags: this must be called with the
/// exact same `rules` map passed to [`encode_rules`] so the tag table the
/// AST-stream encoder builds matches the one [`rule_names_in_order`]
/// reconstructs from the decoded rule section.
pub fn sorted_rule_names(rules: &HashMap<SymbolRef, NodeId>) -> Vec<String> {
    let mut names: Vec<&str> = rules.keys().map(|s| s.display_label()).collect();
    names.sort_by_key(|n| rule_sort_key(n));
    names.into_iter().map(str::to_string).collect()
}

pub fn encode_rules(
    arena: &Arena,
    rules: &HashMap<SymbolRef, NodeId>,
    number_of: &HashMap<usize, f64>,
    string_index_of: &HashMap<usize, usize>,
) -> Vec<u8> {
    let mut entries: Vec<(&SymbolRef, &NodeId)> = rules.iter().collect();
    entries.sort_by_key(|(sym, _)| rule_sort_key(sym.display_label()));

    let out: Vec<RuleEntry> = entries
        .into_iter()
        .map(|(sym, &body)| RuleEntry {
            name: sym.display_label().to_string(),
            rank: sym.rank(),
            body: encode_node(arena, body, number_of, string_index_of),
        })
        .collect();

    serde_json::to_vec(&out).expect("rule entries always serialize")
}

fn encode_node(
    arena: &Arena,
    n: NodeId,
    number_of: &HashMap<usize, f64>,
    string_index_of: &HashMap<usize, usize>,
) -> RuleNode {
    let label = arena.node(n).label.clone();
    match &label.kind {
        SymbolKind::Parameter { index, .. } => RuleNode::Parameter { index: *index },
        SymbolKind::Nonterminal { name, .. } => RuleNode::Nonterminal {
            name: name.clone(),
            children: arena
                .child_entries(n)
                .map(|(_, c)| encode_node(arena, c, number_of, string_index_of))
                .collect(),
        },
        SymbolKind::Terminal { label: text } => {
            if let Some(&value) = number_of.get(&label.ptr_key()) {
                RuleNode::Number { value }
            } else if let Some(&index) = string_index_of.get(&label.ptr_key()) {
                RuleNode::Str { index }
            } else {
                RuleNode::Terminal {
                    label: text.clone(),
                    children: arena
                        .child_entries(n)
                        .map(|(_, c)| encode_node(arena, c, number_of, string_index_of))
                        .collect(),
                }
            }
        }
    }
}

/// Decodes section 1's bytes into a fresh arena holding every rule body,
/// the rule map the engine expects, and the name -> Nonterminal symbol
/// table the AST-stream decoder needs to resolve rule-invocation tags.
pub fn decode_rules(
    bytes: &[u8],
) -> Result<(Arena, HashMap<SymbolRef, NodeId>, HashMap<String, SymbolRef>)> {
    let entries: Vec<RuleEntry> =
        serde_json::from_slice(bytes).map_err(|e| Error::malformed(format!("rule section: {e}")))?;

    let mut nonterminals = HashMap::new();
    for entry in &entries {
        nonterminals.insert(entry.name.clone(), new_nonterminal(entry.name.clone(), entry.rank));
    }

    let mut arena = Arena::new();
    let mut rules = HashMap::new();
    for entry in &entries {
        let sym = nonterminals[&entry.name].clone();
        let formals = sym.formals().to_vec();
        let body = decode_node(&mut arena, &entry.body, &formals, &nonterminals)?;
        rules.insert(sym, body);
    }

    Ok((arena, rules, nonterminals))
}

/// The rule names in the order they were written, i.e. the order that
/// also determines their AST-stream grammar tags.
pub fn rule_names_in_order(bytes: &[u8]) -> Result<Vec<String>> {
    let entries: Vec<RuleEntry> =
        serde_json::from_slice(bytes).map_err(|e| Error::malformed(format!("rule section: {e}")))?;
    Ok(entries.into_iter().map(|e| e.name).collect())
}

fn decode_node(
    arena: &mut Arena,
    node: &RuleNode,
    own_formals: &[SymbolRef],
    nonterminals: &HashMap<String, SymbolRef>,
) -> Result<NodeId> {
    match node {
        RuleNode::Parameter { index } => {
            let formal = own_formals
                .get(*index)
                .ok_or_else(|| Error::malformed("parameter index out of range"))?;
            Ok(arena.new_node(formal.clone()))
        }
        RuleNode::Number { value } => {
            let label = Symbol::terminal(format!("Number:{:x}", value.to_bits()), 0);
            Ok(arena.new_node(label))
        }
        RuleNode::Str { index } => {
            let label = Symbol::terminal(format!("String#{index}"), 0);
            Ok(arena.new_node(label))
        }
        RuleNode::Nonterminal { name, children } => {
            let sym = nonterminals
                .get(name)
                .ok_or_else(|| Error::malformed(format!("reference to unknown rule `{name}`")))?
                .clone();
            let id = arena.new_node(sym);
            for c in children {
                let child = decode_node(arena, c, own_formals, nonterminals)?;
                arena.append_child(id, child);
            }
            Ok(id)
        }
        RuleNode::Terminal { label, children } => {
            let sym = Symbol::terminal(label.clone(), children.len());
            let id = arena.new_node(sym);
            for c in children {
                let child = decode_node(arena, c, own_formals, nonterminals)?;
                arena.append_child(id, child);
            }
            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::symbol::new_nonterminal;

    #[test]
    fn round_trips_a_rule_with_a_baked_in_literal_and_a_parameter() {
        let mut arena = Arena::new();
        let nt = new_nonterminal("S0", 1);
        let formal = nt.formals()[0].clone();

        let body_root = arena.new_node(Symbol::terminal("BinaryExpression", 3));
        let op = arena.new_node(Symbol::terminal("String#0", 0));
        let left = arena.new_node(formal);
        let right = arena.new_node(Symbol::terminal("Number:3ff0000000000000", 0));
        arena.append_child(body_root, op);
        arena.append_child(body_root, left);
        arena.append_child(body_root, right);

        let mut rules = HashMap::new();
        rules.insert(nt.clone(), body_root);

        let mut number_of = HashMap::new();
        number_of.insert(arena.node(right).label.ptr_key(), 1.0);
        let mut string_index_of = HashMap::new();
        string_index_of.insert(arena.node(op).label.ptr_key(), 0usize);

        let bytes = encode_rules(&arena, &rules, &number_of, &string_index_of);
        let (decoded_arena, decoded_rules, nonterminals) = decode_rules(&bytes).unwrap();

        assert_eq!(decoded_rules.len(), 1);
        let sym = &nonterminals["S0"];
        let body = decoded_rules[sym];
        assert_eq!(decoded_arena.node(body).label.display_label(), "BinaryExpression");
        let children: Vec<NodeId> = decoded_arena.child_entries(body).map(|(_, c)| c).collect();
        assert!(decoded_arena.node(children[1]).label.is_parameter());
    }
}
