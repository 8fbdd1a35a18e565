//! End-to-end coverage of the full pipeline: walk -> grammar inference ->
//! binary format -> decode -> grammar expansion, exercised through
//! [`binjs_treerepair::format::encode_program`]/`decode_program` rather
//! than any one module's internals.

use binjs_treerepair::format::{decode_program, encode_program};
use serde_json::json;

fn program_with_many_repeats() -> serde_json::Value {
    let mut declarations = Vec::new();
    for name in ["a", "b", "c", "d", "e"] {
        declarations.push(json!({
            "type": "VariableDeclaration",
            "kind": "let",
            "declarations": [{
                "type": "VariableDeclarator",
                "id": {"type": "Identifier", "name": name},
                "init": {"type": "NumericLiteral", "value": 0.0},
            }],
        }));
    }
    declarations.push(json!({
        "type": "FunctionDeclaration",
        "id": {"type": "Identifier", "name": "add"},
        "params": [
            {"type": "Identifier", "name": "x"},
            {"type": "Identifier", "name": "y"},
        ],
        "body": {
            "type": "BlockStatement",
            "body": [{
                "type": "ReturnStatement",
                "argument": {
                    "type": "BinaryExpression",
                    "operator": "+",
                    "left": {"type": "Identifier", "name": "x"},
                    "right": {"type": "Identifier", "name": "y"},
                },
            }],
        },
    }));
    json!({"type": "Script", "body": declarations})
}

#[test]
fn round_trips_a_program_with_many_repeated_declarations() {
    let program = program_with_many_repeats();
    let bytes = encode_program(&program, None, 2).unwrap();
    let decoded = decode_program(&bytes, 2).unwrap();
    assert_eq!(decoded, program);
}

#[test]
fn round_trips_across_every_valid_mru_cell_width() {
    let program = program_with_many_repeats();
    for bits in 1..=5 {
        let bytes = encode_program(&program, None, bits).unwrap();
        let decoded = decode_program(&bytes, bits).unwrap();
        assert_eq!(decoded, program, "mismatch at mru_cell_bits = {bits}");
    }
}

#[test]
fn round_trips_with_if_else_and_call_expressions() {
    let program = json!({
        "type": "Script",
        "body": [{
            "type": "IfStatement",
            "test": {"type": "Identifier", "name": "ready"},
            "consequent": {
                "type": "ExpressionStatement",
                "expression": {
                    "type": "CallExpression",
                    "callee": {"type": "Identifier", "name": "go"},
                    "arguments": [{"type": "StringLiteral", "value": "now"}],
                },
            },
            "alternate": {
                "type": "ExpressionStatement",
                "expression": {
                    "type": "CallExpression",
                    "callee": {"type": "Identifier", "name": "wait"},
                    "arguments": [],
                },
            },
        }],
    });

    let bytes = encode_program(&program, None, 2).unwrap();
    let decoded = decode_program(&bytes, 2).unwrap();
    assert_eq!(decoded, program);
}

#[test]
fn round_trips_booleans_and_null_literals() {
    let program = json!({
        "type": "Script",
        "body": [
            {
                "type": "ExpressionStatement",
                "expression": {"type": "BooleanLiteral", "value": true},
            },
            {
                "type": "ExpressionStatement",
                "expression": {"type": "BooleanLiteral", "value": false},
            },
            {
                "type": "ExpressionStatement",
                "expression": {"type": "NullLiteral"},
            },
        ],
    });

    let bytes = encode_program(&program, None, 2).unwrap();
    let decoded = decode_program(&bytes, 2).unwrap();
    assert_eq!(decoded, program);
}

#[test]
fn a_tight_max_rank_still_round_trips() {
    let program = program_with_many_repeats();
    let bytes = encode_program(&program, Some(2), 2).unwrap();
    let decoded = decode_program(&bytes, 2).unwrap();
    assert_eq!(decoded, program);
}

#[test]
fn round_trips_omitted_optional_fields_as_explicit_nulls() {
    let program = json!({
        "type": "Script",
        "body": [
            {
                "type": "VariableDeclaration",
                "kind": "let",
                "declarations": [{
                    "type": "VariableDeclarator",
                    "id": {"type": "Identifier", "name": "x"},
                    "init": null,
                }],
            },
            {
                "type": "IfStatement",
                "test": {"type": "Identifier", "name": "x"},
                "consequent": {"type": "ReturnStatement", "argument": null},
                "alternate": null,
            },
        ],
    });

    let bytes = encode_program(&program, None, 2).unwrap();
    let decoded = decode_program(&bytes, 2).unwrap();
    assert_eq!(decoded, program);
}

#[test]
fn unknown_node_kind_is_rejected_before_any_bytes_are_written() {
    let program = json!({"type": "WhileStatement", "test": null, "body": null});
    assert!(encode_program(&program, None, 2).is_err());
}

#[test]
fn truncated_file_is_malformed_input_not_a_panic() {
    let program = program_with_many_repeats();
    let mut bytes = encode_program(&program, None, 2).unwrap();
    bytes.truncate(3);
    assert!(decode_program(&bytes, 2).is_err());
}

#[test]
fn garbage_input_is_malformed_input_not_a_panic() {
    let garbage = vec![0xffu8; 64];
    assert!(decode_program(&garbage, 2).is_err());
}

#[test]
fn trailing_bytes_after_a_well_formed_file_are_rejected() {
    let program = program_with_many_repeats();
    let mut bytes = encode_program(&program, None, 2).unwrap();
    bytes.push(0x00);
    assert!(decode_program(&bytes, 2).is_err());
}
