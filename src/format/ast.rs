//! Section 3 of the binary format: the axiom tree, tag-stream encoded
//! (spec §6).
//!
//! Memoization (`MEMO_RECORD`/`MEMO_REPLAY`) is applied only to
//! Nonterminal-invocation nodes: a schema-kind or reserved-tag leaf
//! already costs at most a couple of bytes, so wrapping it in a memo slot
//! cannot pay for itself, but two invocations of the same rule over
//! identical argument subtrees — which does happen, e.g. two calls
//! passing the same literal — collapse to a single replayed reference.
//! Candidates are found via a bottom-up structural hash computed once per
//! encode, then confirmed with a real structural comparison so a hash
//! collision can never cause an incorrect replay.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use super::tags::{self, GrammarTagTable, GrammarTagTarget};
use crate::error::{Error, Result};
use crate::tree::symbol::{Symbol, SymbolKind, SymbolRef};
use crate::tree::{Arena, NodeId};
use crate::walker::SCHEMA;

/// Side tables the decoder fills in alongside the reconstructed tree,
/// since a decoded `Number`/`String` leaf carries no payload of its own.
#[derive(Default)]
pub struct DecodedPayloads {
    pub numbers: HashMap<NodeId, f64>,
    pub strings: HashMap<NodeId, String>,
}

pub fn encode_ast(
    arena: &Arena,
    root: NodeId,
    table: &GrammarTagTable,
    number_of: &HashMap<usize, f64>,
    string_index_of: &HashMap<usize, usize>,
) -> Result<(Vec<u8>, Vec<usize>)> {
    let hashes = compute_hashes(arena, root);
    let mut buf = crate::codec::ByteStreamBuffer::new();
    let mut string_refs = Vec::new();
    let mut memo_by_hash: HashMap<u64, Vec<usize>> = HashMap::new();
    let mut memo_store: Vec<NodeId> = Vec::new();

    encode_node(
        arena,
        root,
        table,
        number_of,
        string_index_of,
        &hashes,
        &mut memo_by_hash,
        &mut memo_store,
        &mut buf,
        &mut string_refs,
    )?;

    Ok((buf.to_vec(), string_refs))
}

#[allow(clippy::too_many_arguments)]
fn encode_node(
    arena: &Arena,
    n: NodeId,
    table: &GrammarTagTable,
    number_of: &HashMap<usize, f64>,
    string_index_of: &HashMap<usize, usize>,
    hashes: &HashMap<NodeId, u64>,
    memo_by_hash: &mut HashMap<u64, Vec<usize>>,
    memo_store: &mut Vec<NodeId>,
    buf: &mut crate::codec::ByteStreamBuffer,
    string_refs: &mut Vec<usize>,
) -> Result<()> {
    let is_nonterminal = arena.node(n).label.is_nonterminal();
    if is_nonterminal {
        let h = hashes[&n];
        if let Some(candidates) = memo_by_hash.get(&h) {
            if let Some(&slot) = candidates.iter().find(|&&idx| same_shape(arena, memo_store[idx], n)) {
                buf.write_varint(tags::MEMO_REPLAY);
                buf.write_varint(slot as u64);
                return Ok(());
            }
        }
        buf.write_varint(tags::MEMO_RECORD);
        emit_real(
            arena,
            n,
            table,
            number_of,
            string_index_of,
            hashes,
            memo_by_hash,
            memo_store,
            buf,
            string_refs,
        )?;
        memo_by_hash.entry(h).or_default().push(memo_store.len());
        memo_store.push(n);
        return Ok(());
    }

    emit_real(
        arena,
        n,
        table,
        number_of,
        string_index_of,
        hashes,
        memo_by_hash,
        memo_store,
        buf,
        string_refs,
    )
}

#[allow(clippy::too_many_arguments)]
fn emit_real(
    arena: &Arena,
    n: NodeId,
    table: &GrammarTagTable,
    number_of: &HashMap<usize, f64>,
    string_index_of: &HashMap<usize, usize>,
    hashes: &HashMap<NodeId, u64>,
    memo_by_hash: &mut HashMap<u64, Vec<usize>>,
    memo_store: &mut Vec<NodeId>,
    buf: &mut crate::codec::ByteStreamBuffer,
    string_refs: &mut Vec<usize>,
) -> Result<()> {
    let label = arena.node(n).label.clone();

    let mut encode_children = |buf: &mut crate::codec::ByteStreamBuffer,
                                string_refs: &mut Vec<usize>|
     -> Result<()> {
        for (_, c) in arena.child_entries(n) {
            encode_node(
                arena,
                c,
                table,
                number_of,
                string_index_of,
                hashes,
                memo_by_hash,
                memo_store,
                buf,
                string_refs,
            )?;
        }
        Ok(())
    };

    match &label.kind {
        SymbolKind::Nonterminal { name, .. } => {
            let tag = table
                .rule_tag(name)
                .ok_or_else(|| Error::invariant(format!("rule `{name}` has no AST-stream tag")))?;
            buf.write_varint(tag);
            encode_children(buf, string_refs)
        }
        SymbolKind::Parameter { .. } => Err(Error::invariant(
            "a Parameter leaf cannot appear in the axiom tree",
        )),
        SymbolKind::Terminal { label: text } => {
            if let Some(&value) = number_of.get(&label.ptr_key()) {
                buf.write_varint(tags::TAG_NUMBER);
                buf.write_bytes(&value.to_le_bytes());
                return Ok(());
            }
            if let Some(&index) = string_index_of.get(&label.ptr_key()) {
                buf.write_varint(tags::TAG_STRING);
                string_refs.push(index);
                return Ok(());
            }
            match text.as_str() {
                "Null" => {
                    buf.write_varint(tags::TAG_NULL);
                    Ok(())
                }
                "Undefined" => {
                    buf.write_varint(tags::TAG_UNDEFINED);
                    Ok(())
                }
                "True" => {
                    buf.write_varint(tags::TAG_TRUE);
                    Ok(())
                }
                "False" => {
                    buf.write_varint(tags::TAG_FALSE);
                    Ok(())
                }
                "List" => {
                    buf.write_varint(tags::TAG_LIST);
                    buf.write_varint(label.rank() as u64);
                    encode_children(buf, string_refs)
                }
                kind => {
                    let index = SCHEMA
                        .iter()
                        .position(|d| d.kind == kind)
                        .ok_or_else(|| Error::invariant(format!("unknown AST-stream terminal `{kind}`")))?;
                    buf.write_varint(table.schema_tag(index));
                    encode_children(buf, string_refs)
                }
            }
        }
    }
}

fn same_shape(arena: &Arena, a: NodeId, b: NodeId) -> bool {
    if arena.node(a).label != arena.node(b).label {
        return false;
    }
    let ca: Vec<NodeId> = arena.child_entries(a).map(|(_, c)| c).collect();
    let cb: Vec<NodeId> = arena.child_entries(b).map(|(_, c)| c).collect();
    ca.len() == cb.len()
        && ca
            .iter()
            .zip(cb.iter())
            .all(|(&x, &y)| same_shape(arena, x, y))
}

fn compute_hashes(arena: &Arena, root: NodeId) -> HashMap<NodeId, u64> {
    let mut hashes = HashMap::new();
    for n in arena.post_order(root) {
        let mut hasher = DefaultHasher::new();
        match &arena.node(n).label.kind {
            SymbolKind::Terminal { label } => {
                0u8.hash(&mut hasher);
                label.hash(&mut hasher);
            }
            SymbolKind::Nonterminal { name, .. } => {
                1u8.hash(&mut hasher);
                name.hash(&mut hasher);
            }
            SymbolKind::Parameter { owner, index } => {
                2u8.hash(&mut hasher);
                owner.hash(&mut hasher);
                index.hash(&mut hasher);
            }
        }
        for (_, c) in arena.child_entries(n) {
            hashes[&c].hash(&mut hasher);
        }
        hashes.insert(n, hasher.finish());
    }
    hashes
}

/// Decodes an AST stream produced by [`encode_ast`] into a fresh subtree
/// of `arena`, returning its root and the payload side tables.
pub fn decode_ast(
    arena: &mut Arena,
    src: &mut crate::codec::ByteStreamSource,
    table: &GrammarTagTable,
    nonterminals: &HashMap<String, SymbolRef>,
    strings: &[String],
    mut string_queue: VecDeque<u32>,
) -> Result<(NodeId, DecodedPayloads)> {
    let mut memo: Vec<NodeId> = Vec::new();
    let mut payloads = DecodedPayloads::default();
    let root = decode_node(
        arena,
        src,
        table,
        nonterminals,
        strings,
        &mut string_queue,
        &mut memo,
        &mut payloads,
    )?;
    Ok((root, payloads))
}

#[allow(clippy::too_many_arguments)]
fn decode_node(
    arena: &mut Arena,
    src: &mut crate::codec::ByteStreamSource,
    table: &GrammarTagTable,
    nonterminals: &HashMap<String, SymbolRef>,
    strings: &[String],
    string_queue: &mut VecDeque<u32>,
    memo: &mut Vec<NodeId>,
    payloads: &mut DecodedPayloads,
) -> Result<NodeId> {
    let tag = src.read_varint()?;

    if tag == tags::MEMO_REPLAY {
        let idx = src.read_varint()? as usize;
        let root = *memo
            .get(idx)
            .ok_or_else(|| Error::malformed("memo replay referenced an unknown slot"))?;
        return Ok(clone_subtree(arena, root, payloads));
    }

    if tag == tags::MEMO_RECORD {
        let id = decode_node(arena, src, table, nonterminals, strings, string_queue, memo, payloads)?;
        memo.push(id);
        return Ok(id);
    }

    decode_real(tag, arena, src, table, nonterminals, strings, string_queue, memo, payloads)
}

#[allow(clippy::too_many_arguments)]
fn decode_real(
    tag: u64,
    arena: &mut Arena,
    src: &mut crate::codec::ByteStreamSource,
    table: &GrammarTagTable,
    nonterminals: &HashMap<String, SymbolRef>,
    strings: &[String],
    string_queue: &mut VecDeque<u32>,
    memo: &mut Vec<NodeId>,
    payloads: &mut DecodedPayloads,
) -> Result<NodeId> {
    match tag {
        tags::TAG_NULL => Ok(arena.new_node(Symbol::terminal("Null", 0))),
        tags::TAG_UNDEFINED => Ok(arena.new_node(Symbol::terminal("Undefined", 0))),
        tags::TAG_TRUE => Ok(arena.new_node(Symbol::terminal("True", 0))),
        tags::TAG_FALSE => Ok(arena.new_node(Symbol::terminal("False", 0))),
        tags::TAG_NUMBER => {
            let bytes = src.read_bytes(8)?;
            let value = f64::from_le_bytes(bytes.try_into().expect("read_bytes(8) yields 8 bytes"));
            let id = arena.new_node(Symbol::terminal("Number", 0));
            payloads.numbers.insert(id, value);
            Ok(id)
        }
        tags::TAG_STRING => {
            let idx = string_queue
                .pop_front()
                .ok_or_else(|| Error::malformed("AST stream has more strings than the index stream"))?
                as usize;
            let value = strings
                .get(idx)
                .ok_or_else(|| Error::malformed("string index out of range"))?
                .clone();
            let id = arena.new_node(Symbol::terminal("String", 0));
            payloads.strings.insert(id, value);
            Ok(id)
        }
        tags::TAG_LIST => {
            let len = src.read_varint()? as usize;
            let id = arena.new_node(Symbol::terminal("List", len));
            for _ in 0..len {
                let c = decode_node(arena, src, table, nonterminals, strings, string_queue, memo, payloads)?;
                arena.append_child(id, c);
            }
            Ok(id)
        }
        _ => match table.resolve(tag) {
            Some(GrammarTagTarget::Schema(i)) => {
                let descriptor = SCHEMA
                    .get(i)
                    .ok_or_else(|| Error::malformed("schema tag out of range"))?;
                let id = arena.new_node(Symbol::terminal(descriptor.kind, descriptor.fields.len()));
                for _ in descriptor.fields {
                    let c = decode_node(arena, src, table, nonterminals, strings, string_queue, memo, payloads)?;
                    arena.append_child(id, c);
                }
                Ok(id)
            }
            Some(GrammarTagTarget::Rule(name)) => {
                let sym = nonterminals
                    .get(name)
                    .ok_or_else(|| Error::malformed(format!("reference to unknown rule `{name}`")))?
                    .clone();
                let rank = sym.rank();
                let id = arena.new_node(sym);
                for _ in 0..rank {
                    let c = decode_node(arena, src, table, nonterminals, strings, string_queue, memo, payloads)?;
                    arena.append_child(id, c);
                }
                Ok(id)
            }
            None => Err(Error::malformed(format!("unrecognized AST-stream tag {tag}"))),
        },
    }
}

fn clone_subtree(arena: &mut Arena, root: NodeId, payloads: &mut DecodedPayloads) -> NodeId {
    let label = arena.node(root).label.clone();
    let children: Vec<NodeId> = arena.child_entries(root).map(|(_, c)| c).collect();
    let fresh = arena.new_node(label);
    for c in children {
        let cloned = clone_subtree(arena, c, payloads);
        arena.append_child(fresh, cloned);
    }
    if let Some(&v) = payloads.numbers.get(&root) {
        payloads.numbers.insert(fresh, v);
    }
    if let Some(v) = payloads.strings.get(&root).cloned() {
        payloads.strings.insert(fresh, v);
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::symbol::new_nonterminal;

    #[test]
    fn round_trips_a_tree_with_a_repeated_zero_argument_rule() {
        let mut arena = Arena::new();
        let nt = new_nonterminal("S0", 0);
        let inv1 = arena.new_node(nt.clone());
        let inv2 = arena.new_node(nt.clone());
        let root_sym = Symbol::terminal("List", 2);
        let root = arena.new_node(root_sym);
        arena.append_child(root, inv1);
        arena.append_child(root, inv2);

        let body = arena.new_node(Symbol::terminal("Identifier", 1));
        let name = arena.new_node(Symbol::terminal("String:x", 0));
        arena.append_child(body, name);
        let mut rules = HashMap::new();
        rules.insert(nt.clone(), body);

        let mut string_index_of = HashMap::new();
        string_index_of.insert(arena.node(name).label.ptr_key(), 0usize);
        let number_of = HashMap::new();

        let rule_names = vec!["S0".to_string()];
        let table = GrammarTagTable::new(&rule_names);

        let (ast_bytes, string_refs) =
            encode_ast(&arena, root, &table, &number_of, &string_index_of).unwrap();
        // Neither invocation's arguments reference the string table; the
        // axiom here carries no string-valued leaves of its own.
        assert!(string_refs.is_empty());

        let (mut decoded_arena, decoded_rules, nonterminals) = {
            let bytes = super::super::rules::encode_rules(&arena, &rules, &number_of, &string_index_of);
            super::super::rules::decode_rules(&bytes).unwrap()
        };
        let mut src = crate::codec::ByteStreamSource::new(&ast_bytes);
        let strings = vec!["x".to_string()];
        let queue: VecDeque<u32> = string_refs.iter().map(|&i| i as u32).collect();
        let (decoded_root, payloads) =
            decode_ast(&mut decoded_arena, &mut src, &table, &nonterminals, &strings, queue).unwrap();
        assert!(src.is_exhausted());

        decoded_arena.check_tree(decoded_root).unwrap();
        let kids: Vec<NodeId> = decoded_arena.child_entries(decoded_root).map(|(_, c)| c).collect();
        assert_eq!(kids.len(), 2);
        for &k in &kids {
            assert!(decoded_arena.node(k).label.is_nonterminal());
        }
        assert!(decoded_rules.contains_key(&nonterminals["S0"]));
        let _ = payloads;
    }
}
