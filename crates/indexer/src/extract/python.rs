//! Python structural extraction via tree-sitter.
//!
//! Walks top-level and nested functions and classes, emitting dotted
//! qualified names rooted at the module path. Class bodies are captured
//! only up to a bounded prefix; the methods inside get their own blocks.

use model::SymbolType;
use tree_sitter::{Node, Parser};

use crate::error::IndexError;
use crate::extract::CodeUnit;

/// Class snippets stop after this many lines; the definition plus its
/// docstring is what retrieval needs.
const CLASS_PREFIX_LINES: usize = 20;

pub fn extract(path: &str, source: &str) -> Result<Vec<CodeUnit>, IndexError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::language())
        .map_err(|e| IndexError::Parse { path: path.to_string(), message: e.to_string() })?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| IndexError::Parse {
            path: path.to_string(),
            message: "tree-sitter returned no tree".into(),
        })?;

    let lines: Vec<&str> = source.lines().collect();
    let mut units = Vec::new();
    walk(
        tree.root_node(),
        source,
        &lines,
        &module_prefix(path),
        &mut units,
    );
    Ok(units)
}

/// `src/billing/cart.py` → `src.billing.cart`
fn module_prefix(path: &str) -> String {
    path.trim_end_matches(".py").replace('/', ".")
}

fn walk(node: Node, source: &str, lines: &[&str], scope: &str, units: &mut Vec<CodeUnit>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_definition" => {
                if let Some(unit) = function_unit(child, source, lines, scope) {
                    let nested_scope = unit.symbol_name.clone();
                    units.push(unit);
                    if let Some(body) = child.child_by_field_name("body") {
                        walk(body, source, lines, &nested_scope, units);
                    }
                }
            }
            "class_definition" => {
                if let Some(unit) = class_unit(child, source, lines, scope) {
                    let nested_scope = unit.symbol_name.clone();
                    units.push(unit);
                    if let Some(body) = child.child_by_field_name("body") {
                        walk(body, source, lines, &nested_scope, units);
                    }
                }
            }
            "decorated_definition" => {
                // The decorator wraps the real definition.
                walk(child, source, lines, scope, units);
            }
            _ => {}
        }
    }
}

fn function_unit(node: Node, source: &str, lines: &[&str], scope: &str) -> Option<CodeUnit> {
    let name = node_text(node.child_by_field_name("name")?, source);
    let parameters = node
        .child_by_field_name("parameters")
        .map(|p| node_text(p, source))
        .unwrap_or_else(|| "()".to_string());

    let start = node.start_position().row;
    let end = node.end_position().row;
    let snippet = lines[start..=end.min(lines.len() - 1)].join("\n");

    let symbol_type = if scope.contains('.') && is_method_scope(node) {
        SymbolType::Method
    } else {
        SymbolType::Function
    };

    Some(CodeUnit {
        symbol_name: format!("{scope}.{name}"),
        symbol_type,
        line_start: start as u32 + 1,
        line_end: end as u32 + 1,
        code_snippet: snippet,
        docstring: docstring(node, source),
        signature: format!("{name}{parameters}"),
    })
}

fn class_unit(node: Node, source: &str, lines: &[&str], scope: &str) -> Option<CodeUnit> {
    let name = node_text(node.child_by_field_name("name")?, source);
    let start = node.start_position().row;
    let end = (start + CLASS_PREFIX_LINES).min(lines.len().saturating_sub(1));
    let snippet = lines[start..=end].join("\n");

    Some(CodeUnit {
        symbol_name: format!("{scope}.{name}"),
        symbol_type: SymbolType::Class,
        line_start: start as u32 + 1,
        line_end: end as u32 + 1,
        code_snippet: snippet,
        docstring: docstring(node, source),
        signature: format!("class {name}"),
    })
}

/// A definition directly inside a class body is a method.
fn is_method_scope(node: Node) -> bool {
    node.parent()
        .and_then(|body| body.parent())
        .map(|grand| grand.kind() == "class_definition")
        .unwrap_or(false)
}

/// First statement of the body, when it is a bare string literal.
fn docstring(node: Node, source: &str) -> String {
    let Some(body) = node.child_by_field_name("body") else {
        return String::new();
    };
    let Some(first) = body.named_child(0) else {
        return String::new();
    };
    if first.kind() != "expression_statement" {
        return String::new();
    }
    let Some(expr) = first.named_child(0) else {
        return String::new();
    };
    if expr.kind() != "string" {
        return String::new();
    }
    strip_quotes(&node_text(expr, source))
}

fn strip_quotes(raw: &str) -> String {
    let trimmed = raw
        .trim_start_matches(['r', 'b', 'u', 'f', 'R', 'B', 'U', 'F'])
        .trim();
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if trimmed.len() >= quote.len() * 2
            && trimmed.starts_with(quote)
            && trimmed.ends_with(quote)
        {
            return trimmed[quote.len()..trimmed.len() - quote.len()].trim().to_string();
        }
    }
    trimmed.to_string()
}

fn node_text(node: Node, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
"""Cart module."""


def total(items, tax_rate):
    """Sum item prices with tax."""
    subtotal = sum(i.price for i in items)
    return subtotal * (1 + tax_rate)


class Cart:
    """A shopping cart."""

    def __init__(self, user_id):
        self.user_id = user_id
        self.items = []

    def add(self, item):
        """Add one item."""
        self.items.append(item)


def helper():
    def inner():
        return 1
    return inner()
"#;

    fn units() -> Vec<CodeUnit> {
        extract("src/cart.py", SAMPLE).unwrap()
    }

    #[test]
    fn test_qualified_names() {
        let names: Vec<String> = units().iter().map(|u| u.symbol_name.clone()).collect();
        assert!(names.contains(&"src.cart.total".to_string()));
        assert!(names.contains(&"src.cart.Cart".to_string()));
        assert!(names.contains(&"src.cart.Cart.add".to_string()));
        assert!(names.contains(&"src.cart.helper.inner".to_string()));
    }

    #[test]
    fn test_symbol_types() {
        let units = units();
        let find = |name: &str| units.iter().find(|u| u.symbol_name == name).unwrap();
        assert_eq!(find("src.cart.total").symbol_type, SymbolType::Function);
        assert_eq!(find("src.cart.Cart").symbol_type, SymbolType::Class);
        assert_eq!(find("src.cart.Cart.add").symbol_type, SymbolType::Method);
        assert_eq!(find("src.cart.helper.inner").symbol_type, SymbolType::Function);
    }

    #[test]
    fn test_docstrings() {
        let units = units();
        let find = |name: &str| units.iter().find(|u| u.symbol_name == name).unwrap();
        assert_eq!(find("src.cart.total").docstring, "Sum item prices with tax.");
        assert_eq!(find("src.cart.Cart").docstring, "A shopping cart.");
        assert_eq!(find("src.cart.Cart.add").docstring, "Add one item.");
        assert_eq!(find("src.cart.helper").docstring, "");
    }

    #[test]
    fn test_signatures_and_lines() {
        let units = units();
        let total = units.iter().find(|u| u.symbol_name == "src.cart.total").unwrap();
        assert_eq!(total.signature, "total(items, tax_rate)");
        assert!(total.line_start < total.line_end);
        assert!(total.code_snippet.contains("subtotal"));
    }

    #[test]
    fn test_class_snippet_bounded() {
        let mut body = String::from("class Big:\n    \"\"\"Doc.\"\"\"\n");
        for i in 0..60 {
            body.push_str(&format!("    x{i} = {i}\n"));
        }
        let units = extract("big.py", &body).unwrap();
        let class = units.iter().find(|u| u.symbol_name == "big.Big").unwrap();
        let snippet_lines = class.code_snippet.lines().count();
        assert!(snippet_lines <= 21, "snippet has {snippet_lines} lines");
    }

    #[test]
    fn test_syntax_error_still_extracts_valid_prefix() {
        // tree-sitter is error-tolerant; the broken tail must not panic.
        let source = "def ok():\n    return 1\n\ndef broken(:\n";
        let units = extract("m.py", source).unwrap();
        assert!(units.iter().any(|u| u.symbol_name == "m.ok"));
    }
}
