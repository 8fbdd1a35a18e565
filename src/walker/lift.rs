//! Schema-driven lifting of a generic JSON parse tree into the ranked
//! tree the engine consumes (spec §4.6), plus the string table, the
//! node-kind usage set, and per-scope-node `ScopeInfo` it produces along
//! the way.
//!
//! Primitive leaves are interned *per distinct value*, not per kind: two
//! `NumericLiteral(1)` nodes share a `Number` Terminal, but a
//! `NumericLiteral(2)` gets a different one. This matters once grammar
//! inference runs — TreeRePair bakes a rank-0 child straight into its
//! rule's body rather than parameterizing it (a leaf contributes no
//! formals), so if every number shared one label regardless of value,
//! compression would silently collapse distinct literals onto whichever
//! one happened to seed the rule. Keying the label on the value itself
//! means two occurrences only ever merge when they actually agree.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use super::schema::{descriptor_for, FieldKind};
use super::scope::{resolve_scope, ScopeInfo};
use super::strings::StringTable;
use crate::error::{Error, Result};
use crate::tree::symbol::{Symbol, SymbolRef};
use crate::tree::{Arena, NodeId};

/// Everything the walker produced from one parse tree.
pub struct WalkOutput {
    pub arena: Arena,
    pub root: NodeId,
    /// Interned strings in descending-frequency order.
    pub strings: Vec<String>,
    /// `Symbol::ptr_key() -> final string-table index`, for every
    /// distinct string-valued Terminal the walker created.
    pub string_index_of: HashMap<usize, usize>,
    /// `Symbol::ptr_key() -> value`, for every distinct number-valued
    /// Terminal the walker created.
    pub number_of: HashMap<usize, f64>,
    pub kinds_used: HashSet<String>,
    pub scopes: HashMap<NodeId, ScopeInfo>,
}

/// Lifts `root`, a `serde_json::Value` produced by an external parser in
/// the `{"type": "<kind>", ...fields}` convention, into a [`WalkOutput`].
pub fn walk(root: &Value) -> Result<WalkOutput> {
    let mut walker = Walker {
        arena: Arena::new(),
        symbols: HashMap::new(),
        strings: StringTable::new(),
        string_provisional: HashMap::new(),
        number_of: HashMap::new(),
        kinds_used: HashSet::new(),
        scopes: HashMap::new(),
    };
    let root_id = walker.lift(root)?;
    debug!(
        kinds = walker.kinds_used.len(),
        strings = walker.strings.len(),
        "walked program into ranked tree"
    );

    let (strings, remap) = walker.strings.finalize();
    let string_index_of = walker
        .string_provisional
        .into_iter()
        .map(|(ptr, provisional)| (ptr, remap[provisional]))
        .collect();

    Ok(WalkOutput {
        arena: walker.arena,
        root: root_id,
        strings,
        string_index_of,
        number_of: walker.number_of,
        kinds_used: walker.kinds_used,
        scopes: walker.scopes,
    })
}

struct Walker {
    arena: Arena,
    symbols: HashMap<(String, usize), SymbolRef>,
    strings: StringTable,
    string_provisional: HashMap<usize, usize>,
    number_of: HashMap<usize, f64>,
    kinds_used: HashSet<String>,
    scopes: HashMap<NodeId, ScopeInfo>,
}

impl Walker {
    fn intern(&mut self, label: &str, rank: usize) -> SymbolRef {
        let key = (label.to_string(), rank);
        self.symbols
            .entry(key)
            .or_insert_with(|| Symbol::terminal(label, rank))
            .clone()
    }

    fn leaf(&mut self, label: &str) -> NodeId {
        let sym = self.intern(label, 0);
        self.arena.new_node(sym)
    }

    fn lift(&mut self, node: &Value) -> Result<NodeId> {
        let kind = node["type"]
            .as_str()
            .ok_or_else(|| Error::schema("AST node is missing its \"type\" field"))?;
        let descriptor = descriptor_for(kind)
            .ok_or_else(|| Error::schema(format!("unknown node kind `{kind}`")))?;
        self.kinds_used.insert(kind.to_string());

        let rank = descriptor.fields.len();
        let label = self.intern(kind, rank);
        let id = self.arena.new_node(label);

        for field in descriptor.fields {
            let child = match field.kind {
                FieldKind::Child => self.lift(&node[field.name])?,
                FieldKind::OptionalChild => {
                    let v = &node[field.name];
                    if v.is_null() {
                        self.leaf("Undefined")
                    } else {
                        self.lift(v)?
                    }
                }
                FieldKind::ChildArray => {
                    let items = node[field.name].as_array().ok_or_else(|| {
                        Error::schema(format!("`{kind}.{}` expected an array", field.name))
                    })?;
                    let list_label = self.intern("List", items.len());
                    let list_id = self.arena.new_node(list_label);
                    for item in items {
                        let c = self.lift(item)?;
                        self.arena.append_child(list_id, c);
                    }
                    list_id
                }
                FieldKind::Primitive => self.lift_primitive(&node[field.name])?,
            };
            self.arena.append_child(id, child);
        }

        if descriptor.is_scope {
            self.scopes.insert(id, resolve_scope(node));
        }

        Ok(id)
    }

    fn lift_primitive(&mut self, value: &Value) -> Result<NodeId> {
        match value {
            Value::String(s) => {
                let label = self.intern(&format!("String:{s}"), 0);
                let provisional = self.strings.intern(s);
                self.string_provisional.insert(label.ptr_key(), provisional);
                Ok(self.arena.new_node(label))
            }
            Value::Number(n) => {
                let f = n
                    .as_f64()
                    .ok_or_else(|| Error::schema("primitive number is not representable as f64"))?;
                let label = self.intern(&format!("Number:{:x}", f.to_bits()), 0);
                self.number_of.insert(label.ptr_key(), f);
                Ok(self.arena.new_node(label))
            }
            Value::Bool(true) => Ok(self.leaf("True")),
            Value::Bool(false) => Ok(self.leaf("False")),
            Value::Null => Ok(self.leaf("Null")),
            other => Err(Error::schema(format!(
                "unsupported primitive field value: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifts_a_small_program_with_shared_terminal_identity() {
        let program = json!({
            "type": "Script",
            "body": [
                {
                    "type": "VariableDeclaration",
                    "kind": "let",
                    "declarations": [{
                        "type": "VariableDeclarator",
                        "id": {"type": "Identifier", "name": "x"},
                        "init": {"type": "NumericLiteral", "value": 1.0},
                    }],
                },
                {
                    "type": "VariableDeclaration",
                    "kind": "let",
                    "declarations": [{
                        "type": "VariableDeclarator",
                        "id": {"type": "Identifier", "name": "y"},
                        "init": {"type": "NumericLiteral", "value": 1.0},
                    }],
                },
            ],
        });

        let out = walk(&program).unwrap();
        out.arena.check_tree(out.root).unwrap();
        assert!(out.kinds_used.contains("VariableDeclaration"));
        assert!(out.kinds_used.contains("Identifier"));
        assert_eq!(out.strings.len(), 3); // "let", "x", "y"

        // Two `VariableDeclaration` subtrees differing only in the bound
        // name still use the *same* interned Terminal label at every
        // level except the `Identifier`'s own name leaf, so the digram
        // index can find the repeated shape.
        let body_list = out.arena.nth_child(out.root, 0);
        let (decl0, decl1) = {
            let mut it = out.arena.child_entries(body_list);
            (it.next().unwrap().1, it.next().unwrap().1)
        };
        assert_eq!(out.arena.node(decl0).label, out.arena.node(decl1).label);

        // But the two repeated `NumericLiteral(1.0)` leaves share a
        // symbol, since they carry the same value.
        let lit0 = {
            let declarator = out.arena.nth_child(decl0, 1); // declarations list
            let declarator = out.arena.nth_child(declarator, 0);
            out.arena.nth_child(declarator, 1) // init
        };
        let lit1 = {
            let declarator = out.arena.nth_child(decl1, 1);
            let declarator = out.arena.nth_child(declarator, 0);
            out.arena.nth_child(declarator, 1)
        };
        assert_eq!(out.arena.node(lit0).label, out.arena.node(lit1).label);
    }

    #[test]
    fn distinct_literal_values_get_distinct_labels() {
        let a = json!({"type": "NumericLiteral", "value": 1.0});
        let b = json!({"type": "NumericLiteral", "value": 2.0});
        let out_a = walk(&a).unwrap();
        let out_b = walk(&b).unwrap();
        let leaf_a = out_a.arena.nth_child(out_a.root, 0);
        let leaf_b = out_b.arena.nth_child(out_b.root, 0);
        assert_ne!(out_a.arena.node(leaf_a).label, out_b.arena.node(leaf_b).label);
    }

    #[test]
    fn unknown_node_kind_is_a_schema_mismatch() {
        let bad = json!({"type": "WhileStatement"});
        assert!(walk(&bad).is_err());
    }
}
