//! Lexical scope resolution (spec §4.6): for each scope-bearing node
//! (script, block, function body), the set of names it declares
//! lexically, the names it declares as `var`s, its parameter names, and
//! the names it references but does not itself declare.

use std::collections::HashSet;

use serde_json::Value;

#[derive(Debug, Default, Clone)]
pub struct ScopeInfo {
    pub lexically_declared_names: Vec<String>,
    pub var_declared_names: Vec<String>,
    pub parameter_names: Vec<String>,
    pub captured_names: Vec<String>,
}

/// Computes the [`ScopeInfo`] for a scope-bearing json node (as matched
/// by `schema::NodeDescriptor::is_scope`): `Script`, `FunctionDeclaration`,
/// or `BlockStatement`.
pub fn resolve_scope(node: &Value) -> ScopeInfo {
    let mut lexically_declared = Vec::new();
    let mut var_declared = Vec::new();
    let mut parameters = Vec::new();

    if node["type"] == "FunctionDeclaration" {
        if let Some(params) = node["params"].as_array() {
            for p in params {
                if let Some(name) = p["name"].as_str() {
                    parameters.push(name.to_string());
                }
            }
        }
    }

    let body = scope_body(node);
    for stmt in body.iter().flat_map(|b| b.iter()) {
        collect_declarations(stmt, &mut lexically_declared, &mut var_declared);
    }

    let mut declared: HashSet<&str> = HashSet::new();
    declared.extend(lexically_declared.iter().map(String::as_str));
    declared.extend(var_declared.iter().map(String::as_str));
    declared.extend(parameters.iter().map(String::as_str));

    let mut referenced = Vec::new();
    for stmt in body.iter().flat_map(|b| b.iter()) {
        collect_references(stmt, &mut referenced);
    }
    let mut captured = Vec::new();
    let mut seen = HashSet::new();
    for name in referenced {
        if !declared.contains(name.as_str()) && seen.insert(name.clone()) {
            captured.push(name);
        }
    }

    ScopeInfo {
        lexically_declared_names: dedup_preserve_order(lexically_declared),
        var_declared_names: dedup_preserve_order(var_declared),
        parameter_names: parameters,
        captured_names: captured,
    }
}

fn scope_body(node: &Value) -> Option<Vec<Value>> {
    match node["type"].as_str()? {
        "Script" | "BlockStatement" => node["body"].as_array().cloned(),
        "FunctionDeclaration" => node["body"]["body"].as_array().cloned(),
        _ => None,
    }
}

fn dedup_preserve_order(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.into_iter().filter(|n| seen.insert(n.clone())).collect()
}

/// Collects `let`/`const` bindings into `lexical` and `var` bindings
/// (including function declarations, which are `var`-like) into `vars`,
/// descending into nested blocks and statements but not into nested
/// function bodies (their own declarations belong to their own scope).
fn collect_declarations(node: &Value, lexical: &mut Vec<String>, vars: &mut Vec<String>) {
    match node["type"].as_str() {
        Some("VariableDeclaration") => {
            let is_var = node["kind"] == "var";
            if let Some(decls) = node["declarations"].as_array() {
                for d in decls {
                    if let Some(name) = d["id"]["name"].as_str() {
                        if is_var {
                            vars.push(name.to_string());
                        } else {
                            lexical.push(name.to_string());
                        }
                    }
                }
            }
        }
        Some("FunctionDeclaration") => {
            if let Some(name) = node["id"]["name"].as_str() {
                vars.push(name.to_string());
            }
            // Do not descend: this introduces its own scope.
        }
        Some("BlockStatement") => {
            if let Some(body) = node["body"].as_array() {
                for stmt in body {
                    collect_declarations(stmt, lexical, vars);
                }
            }
        }
        Some("IfStatement") => {
            collect_declarations(&node["consequent"], lexical, vars);
            if !node["alternate"].is_null() {
                collect_declarations(&node["alternate"], lexical, vars);
            }
        }
        _ => {}
    }
}

/// Collects every `Identifier` name referenced in an expression or
/// sub-statement position, not stopping at nested function boundaries
/// (a nested function may capture an outer name).
fn collect_references(node: &Value, out: &mut Vec<String>) {
    match node["type"].as_str() {
        Some("Identifier") => {
            if let Some(name) = node["name"].as_str() {
                out.push(name.to_string());
            }
        }
        Some("VariableDeclaration") => {
            if let Some(decls) = node["declarations"].as_array() {
                for d in decls {
                    if !d["init"].is_null() {
                        collect_references(&d["init"], out);
                    }
                }
            }
        }
        Some("BinaryExpression") | Some("AssignmentExpression") => {
            collect_references(&node["left"], out);
            collect_references(&node["right"], out);
        }
        Some("CallExpression") => {
            collect_references(&node["callee"], out);
            if let Some(args) = node["arguments"].as_array() {
                for a in args {
                    collect_references(a, out);
                }
            }
        }
        Some("ReturnStatement") => {
            if !node["argument"].is_null() {
                collect_references(&node["argument"], out);
            }
        }
        Some("ExpressionStatement") => {
            collect_references(&node["expression"], out);
        }
        Some("IfStatement") => {
            collect_references(&node["test"], out);
            collect_references(&node["consequent"], out);
            if !node["alternate"].is_null() {
                collect_references(&node["alternate"], out);
            }
        }
        Some("BlockStatement") => {
            if let Some(body) = node["body"].as_array() {
                for stmt in body {
                    collect_references(stmt, out);
                }
            }
        }
        Some("FunctionDeclaration") => {
            if let Some(params) = node["params"].as_array() {
                for p in params {
                    collect_references(p, out);
                }
            }
            collect_references(&node["body"], out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn function_scope_separates_params_locals_and_captures() {
        let func = json!({
            "type": "FunctionDeclaration",
            "id": {"type": "Identifier", "name": "f"},
            "params": [{"type": "Identifier", "name": "x"}],
            "body": {
                "type": "BlockStatement",
                "body": [
                    {
                        "type": "VariableDeclaration",
                        "kind": "let",
                        "declarations": [{
                            "type": "VariableDeclarator",
                            "id": {"type": "Identifier", "name": "y"},
                            "init": null,
                        }],
                    },
                    {
                        "type": "ExpressionStatement",
                        "expression": {
                            "type": "BinaryExpression",
                            "operator": "+",
                            "left": {"type": "Identifier", "name": "x"},
                            "right": {"type": "Identifier", "name": "outer"},
                        },
                    },
                ],
            },
        });

        let scope = resolve_scope(&func);
        assert_eq!(scope.parameter_names, vec!["x"]);
        assert_eq!(scope.lexically_declared_names, vec!["y"]);
        assert!(scope.var_declared_names.is_empty());
        assert_eq!(scope.captured_names, vec!["outer".to_string()]);
    }
}
