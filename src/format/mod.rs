//! The binary file format (spec §6): three concatenated sections
//! (grammar rules, string table, AST stream) produced by running a
//! parsed program through the [`crate::walker`] and
//! [`crate::grammar::Engine`], and the mirror decoder that replays
//! exactly what this crate's own encoder writes (spec's Non-goal: a
//! general external-grammar BinAST decoder is out of scope).

pub mod ast;
pub mod rules;
pub mod strings;
pub mod tags;

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::debug;

use crate::codec::{ByteStreamBuffer, ByteStreamSource};
use crate::error::{Error, Result};
use crate::grammar::Engine;
use crate::tree::symbol::{SymbolKind, SymbolRef};
use crate::tree::{Arena, NodeId};
use crate::walker::{self, descriptor_for, FieldKind};
use ast::DecodedPayloads;
use tags::GrammarTagTable;

/// Encodes a parsed program (the `{"type": ..., ...}` JSON convention
/// [`walker::walk`] consumes) into the three-section binary file.
pub fn encode_program(program: &Value, max_rank: Option<usize>, mru_cell_bits: u32) -> Result<Vec<u8>> {
    let walked = walker::walk(program)?;

    let mut engine = Engine::new(walked.arena, walked.root, max_rank)?;
    engine.build()?;
    engine.check_invariants()?;
    engine.optimize()?;

    let rule_names = rules::sorted_rule_names(engine.rules());
    let table = GrammarTagTable::new(&rule_names);

    let (ast_bytes, string_refs) = ast::encode_ast(
        engine.arena(),
        engine.axiom(),
        &table,
        &walked.number_of,
        &walked.string_index_of,
    )?;
    let rules_bytes = rules::encode_rules(
        engine.arena(),
        engine.rules(),
        &walked.number_of,
        &walked.string_index_of,
    );
    let string_table_bytes = strings::encode_string_table(&walked.strings, &string_refs, mru_cell_bits)?;

    let mut out = ByteStreamBuffer::new();
    out.write_varint(rules_bytes.len() as u64);
    out.write_bytes(&rules_bytes);
    out.write_bytes(&string_table_bytes);
    out.write_bytes(&ast_bytes);
    debug!(
        rules_bytes = rules_bytes.len(),
        strings_bytes = string_table_bytes.len(),
        ast_bytes = ast_bytes.len(),
        "encoded program"
    );
    Ok(out.to_vec())
}

/// Decodes a file produced by [`encode_program`] back into a JSON value
/// in the same `{"type": ..., ...}` convention the walker accepts,
/// fully expanding every grammar rule invocation back to terminals.
pub fn decode_program(bytes: &[u8], mru_cell_bits: u32) -> Result<Value> {
    let mut src = ByteStreamSource::new(bytes);

    let rules_len = src.read_varint()? as usize;
    let rules_bytes = src.read_bytes(rules_len)?;
    let (mut arena, rules, nonterminals) = rules::decode_rules(rules_bytes)?;
    let rule_names = rules::rule_names_in_order(rules_bytes)?;
    let table = GrammarTagTable::new(&rule_names);

    let (strings, string_queue) = strings::decode_string_table(&mut src, mru_cell_bits)?;

    let (root, mut payloads) = ast::decode_ast(
        &mut arena,
        &mut src,
        &table,
        &nonterminals,
        &strings,
        string_queue,
    )?;
    if !src.is_exhausted() {
        return Err(Error::malformed("trailing bytes after the AST stream"));
    }

    let expanded = expand_tree(&mut arena, &rules, &mut payloads, root);
    let result = render(&arena, &strings, &payloads, expanded);
    debug!(rules = rule_names.len(), "decoded program");
    result
}

/// Replaces every Nonterminal-invocation node under `n` with a fresh
/// instantiation of its rule body, recursively, leaving only the
/// original terminal alphabet. Mirrors [`crate::grammar::Engine`]'s own
/// rule-inlining, but in place in a single arena rather than src/out
/// arenas, since decode has no further use for the un-expanded form.
fn expand_tree(
    arena: &mut Arena,
    rules: &HashMap<SymbolRef, NodeId>,
    payloads: &mut DecodedPayloads,
    n: NodeId,
) -> NodeId {
    let label = arena.node(n).label.clone();
    if label.is_nonterminal() {
        if let Some(&body) = rules.get(&label) {
            let children: Vec<NodeId> = arena.child_entries(n).map(|(_, c)| c).collect();
            let args: Vec<NodeId> = children
                .into_iter()
                .map(|c| expand_tree(arena, rules, payloads, c))
                .collect();
            return expand_body(arena, rules, payloads, body, &args);
        }
    }

    let children: Vec<NodeId> = arena.child_entries(n).map(|(_, c)| c).collect();
    let fresh = arena.new_node(label);
    for c in children {
        let child = expand_tree(arena, rules, payloads, c);
        arena.append_child(fresh, child);
    }
    carry_payload(payloads, n, fresh);
    fresh
}

/// As [`expand_tree`], but walking a rule *body* where leaves may be
/// Parameters resolved against `args` (the already-expanded arguments of
/// the enclosing invocation).
fn expand_body(
    arena: &mut Arena,
    rules: &HashMap<SymbolRef, NodeId>,
    payloads: &mut DecodedPayloads,
    body: NodeId,
    args: &[NodeId],
) -> NodeId {
    let label = arena.node(body).label.clone();
    if let SymbolKind::Parameter { index, .. } = &label.kind {
        return args[*index];
    }
    if label.is_nonterminal() {
        if let Some(&nested_body) = rules.get(&label) {
            let children: Vec<NodeId> = arena.child_entries(body).map(|(_, c)| c).collect();
            let nested_args: Vec<NodeId> = children
                .into_iter()
                .map(|c| expand_body(arena, rules, payloads, c, args))
                .collect();
            return expand_body(arena, rules, payloads, nested_body, &nested_args);
        }
    }

    let children: Vec<NodeId> = arena.child_entries(body).map(|(_, c)| c).collect();
    let fresh = arena.new_node(label);
    for c in children {
        let child = expand_body(arena, rules, payloads, c, args);
        arena.append_child(fresh, child);
    }
    carry_payload(payloads, body, fresh);
    fresh
}

fn carry_payload(payloads: &mut DecodedPayloads, old: NodeId, fresh: NodeId) {
    if let Some(&v) = payloads.numbers.get(&old) {
        payloads.numbers.insert(fresh, v);
    }
    if let Some(v) = payloads.strings.get(&old).cloned() {
        payloads.strings.insert(fresh, v);
    }
}

/// Renders a fully-expanded, terminal-only tree back into the walker's
/// JSON convention.
fn render(arena: &Arena, strings: &[String], payloads: &DecodedPayloads, n: NodeId) -> Result<Value> {
    if let Some(&v) = payloads.numbers.get(&n) {
        return Ok(json!(v));
    }
    if let Some(v) = payloads.strings.get(&n) {
        return Ok(json!(v));
    }

    let label = arena.node(n).label.clone();
    let SymbolKind::Terminal { label: text } = &label.kind else {
        return Err(Error::invariant("expanded tree still contains a non-terminal node"));
    };

    if let Some(hex) = text.strip_prefix("Number:") {
        let bits = u64::from_str_radix(hex, 16)
            .map_err(|e| Error::malformed(format!("malformed baked-in number literal: {e}")))?;
        return Ok(json!(f64::from_bits(bits)));
    }
    if let Some(idx) = text.strip_prefix("String#") {
        let idx: usize = idx
            .parse()
            .map_err(|e| Error::malformed(format!("malformed baked-in string literal: {e}")))?;
        let s = strings
            .get(idx)
            .ok_or_else(|| Error::malformed("baked-in string literal index out of range"))?;
        return Ok(json!(s));
    }

    match text.as_str() {
        "Null" | "Undefined" => Ok(Value::Null),
        "True" => Ok(json!(true)),
        "False" => Ok(json!(false)),
        "List" => {
            let items: Result<Vec<Value>> = arena
                .child_entries(n)
                .map(|(_, c)| render(arena, strings, payloads, c))
                .collect();
            Ok(Value::Array(items?))
        }
        kind => {
            let descriptor = descriptor_for(kind)
                .ok_or_else(|| Error::malformed(format!("unknown node kind `{kind}` in decoded tree")))?;
            let children: Vec<NodeId> = arena.child_entries(n).map(|(_, c)| c).collect();
            if children.len() != descriptor.fields.len() {
                return Err(Error::malformed(format!(
                    "node kind `{kind}` has {} children but schema expects {}",
                    children.len(),
                    descriptor.fields.len()
                )));
            }
            let mut obj = serde_json::Map::new();
            obj.insert("type".to_string(), json!(kind));
            for (field, child) in descriptor.fields.iter().zip(children) {
                let value = match field.kind {
                    FieldKind::Child | FieldKind::OptionalChild | FieldKind::ChildArray | FieldKind::Primitive => {
                        render(arena, strings, payloads, child)?
                    }
                };
                obj.insert(field.name.to_string(), value);
            }
            Ok(Value::Object(obj))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn program_with_repetition() -> Value {
        json!({
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
                        "init": {"type": "NumericLiteral", "value": 2.0},
                    }],
                },
                {
                    "type": "ExpressionStatement",
                    "expression": {
                        "type": "BinaryExpression",
                        "operator": "+",
                        "left": {"type": "Identifier", "name": "x"},
                        "right": {"type": "Identifier", "name": "y"},
                    },
                },
            ],
        })
    }

    #[test]
    fn encode_then_decode_recovers_the_original_program() {
        let program = program_with_repetition();
        let bytes = encode_program(&program, None, 2).unwrap();
        let decoded = decode_program(&bytes, 2).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn encode_then_decode_round_trips_with_a_tight_max_rank() {
        let program = program_with_repetition();
        let bytes = encode_program(&program, Some(3), 2).unwrap();
        let decoded = decode_program(&bytes, 2).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let program = program_with_repetition();
        let mut bytes = encode_program(&program, None, 2).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(decode_program(&bytes, 2).is_err());
    }
}
