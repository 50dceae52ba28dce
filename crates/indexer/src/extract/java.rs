//! Java structural extraction.
//!
//! The tree-sitter grammar drives declaration discovery; exact end lines
//! come from brace counting that respects string literals, char literals,
//! and both comment forms. When the parse degrades (error nodes), a regex
//! sweep over class and method signatures takes over with the same
//! brace-counting end computation. Javadoc immediately above a
//! declaration becomes the docstring in both paths.

use std::sync::LazyLock;

use model::SymbolType;
use regex::Regex;
use tree_sitter::{Node, Parser};
use tracing::debug;

use crate::extract::CodeUnit;

static PACKAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^package\s+([\w.]+);").expect("package pattern"));

static CLASS_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:public|private|protected)?\s*(?:static)?\s*(?:abstract|final)?\s*class\s+(\w+)")
        .expect("class pattern")
});

static METHOD_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:public|private|protected)?\s*(?:static)?\s*([\w<>\[\]]+)\s+(\w+)\s*\(([^)]*)\)")
        .expect("method pattern")
});

pub fn extract(path: &str, source: &str) -> Vec<CodeUnit> {
    let package = PACKAGE
        .captures(source)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let lines: Vec<&str> = source.lines().collect();

    let mut parser = Parser::new();
    if parser.set_language(&tree_sitter_java::language()).is_ok() {
        if let Some(tree) = parser.parse(source, None) {
            if !tree.root_node().has_error() {
                return extract_from_tree(tree.root_node(), source, &lines, &package);
            }
            debug!(path, "java parse has errors, falling back to regex extraction");
        }
    }
    extract_with_regex(source, &lines, &package)
}

fn extract_from_tree(root: Node, source: &str, lines: &[&str], package: &str) -> Vec<CodeUnit> {
    let mut units = Vec::new();
    visit(root, source, lines, package, None, &mut units);
    units
}

fn visit(
    node: Node,
    source: &str,
    lines: &[&str],
    package: &str,
    enclosing_class: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_declaration" => {
                let Some(name_node) = child.child_by_field_name("name") else {
                    continue;
                };
                let class_name = node_text(name_node, source);
                let start = child.start_position().row;
                let end = find_block_end(lines, start);
                units.push(CodeUnit {
                    symbol_name: qualify(package, None, &class_name),
                    symbol_type: SymbolType::Class,
                    line_start: start as u32 + 1,
                    line_end: end as u32 + 1,
                    code_snippet: lines[start..=end].join("\n"),
                    docstring: javadoc_above(lines, start),
                    signature: format!("class {class_name}"),
                });
                visit(child, source, lines, package, Some(&class_name), units);
            }
            "method_declaration" => {
                let Some(name_node) = child.child_by_field_name("name") else {
                    continue;
                };
                let method_name = node_text(name_node, source);
                let return_type = child
                    .child_by_field_name("type")
                    .map(|n| node_text(n, source))
                    .unwrap_or_else(|| "void".to_string());
                let parameters = child
                    .child_by_field_name("parameters")
                    .map(|n| parameter_list(n, source))
                    .unwrap_or_default();

                let start = child.start_position().row;
                let end = find_block_end(lines, start);
                units.push(CodeUnit {
                    symbol_name: qualify(package, enclosing_class, &method_name),
                    symbol_type: SymbolType::Method,
                    line_start: start as u32 + 1,
                    line_end: end as u32 + 1,
                    code_snippet: lines[start..=end].join("\n"),
                    docstring: javadoc_above(lines, start),
                    signature: format!("{return_type} {method_name}({parameters})"),
                });
            }
            _ => visit(child, source, lines, package, enclosing_class, units),
        }
    }
}

fn parameter_list(parameters: Node, source: &str) -> String {
    let text = node_text(parameters, source);
    text.trim_start_matches('(').trim_end_matches(')').trim().to_string()
}

fn extract_with_regex(source: &str, lines: &[&str], package: &str) -> Vec<CodeUnit> {
    let mut units = Vec::new();

    for captures in CLASS_DECL.captures_iter(source) {
        let class_name = &captures[1];
        let start = line_of_offset(source, captures.get(0).map(|m| m.start()).unwrap_or(0));
        let end = find_block_end(lines, start);
        units.push(CodeUnit {
            symbol_name: qualify(package, None, class_name),
            symbol_type: SymbolType::Class,
            line_start: start as u32 + 1,
            line_end: end as u32 + 1,
            code_snippet: lines[start..=end].join("\n"),
            docstring: javadoc_above(lines, start),
            signature: format!("class {class_name}"),
        });
    }

    for captures in METHOD_DECL.captures_iter(source) {
        let return_type = &captures[1];
        // The class pattern also matches here with `class` as the type.
        if matches!(return_type, "class" | "interface" | "enum" | "record" | "new" | "return") {
            continue;
        }
        let method_name = &captures[2];
        let start = line_of_offset(source, captures.get(0).map(|m| m.start()).unwrap_or(0));
        let end = find_block_end(lines, start);
        units.push(CodeUnit {
            symbol_name: qualify(package, None, method_name),
            symbol_type: SymbolType::Method,
            line_start: start as u32 + 1,
            line_end: end as u32 + 1,
            code_snippet: lines[start..=end].join("\n"),
            docstring: javadoc_above(lines, start),
            signature: format!("{return_type} {method_name}({})", captures[3].trim()),
        });
    }

    units
}

fn qualify(package: &str, enclosing_class: Option<&str>, name: &str) -> String {
    match (package.is_empty(), enclosing_class) {
        (true, None) => name.to_string(),
        (true, Some(class)) => format!("{class}.{name}"),
        (false, None) => format!("{package}.{name}"),
        (false, Some(class)) => format!("{package}.{class}.{name}"),
    }
}

fn line_of_offset(source: &str, offset: usize) -> usize {
    source[..offset].bytes().filter(|&b| b == b'\n').count()
}

/// Find the closing brace of the block opening at `start` (0-indexed line),
/// ignoring braces inside string literals, char literals, `//` comments,
/// and `/* */` comments. Returns the 0-indexed line of the matching `}`;
/// unbalanced input is cut off after 100 lines.
pub fn find_block_end(lines: &[&str], start: usize) -> usize {
    let mut depth: i32 = 0;
    let mut found_open = false;
    let mut in_string = false;
    let mut in_char = false;
    let mut in_multi_comment = false;

    for (index, line) in lines.iter().enumerate().skip(start) {
        let chars: Vec<char> = line.chars().collect();
        let mut j = 0;
        while j < chars.len() {
            let c = chars[j];
            let next = chars.get(j + 1).copied();
            let escaped = j > 0 && chars[j - 1] == '\\';

            if in_multi_comment {
                if c == '*' && next == Some('/') {
                    in_multi_comment = false;
                    j += 2;
                    continue;
                }
                j += 1;
                continue;
            }

            if !in_string && !in_char {
                if c == '/' && next == Some('*') {
                    in_multi_comment = true;
                    j += 2;
                    continue;
                }
                if c == '/' && next == Some('/') {
                    break; // rest of line is a comment
                }
            }

            if c == '"' && !escaped && !in_char {
                in_string = !in_string;
            } else if c == '\'' && !escaped && !in_string {
                in_char = !in_char;
            } else if !in_string && !in_char {
                if c == '{' {
                    depth += 1;
                    found_open = true;
                } else if c == '}' {
                    depth -= 1;
                    if found_open && depth == 0 {
                        return index;
                    }
                }
            }

            j += 1;
        }
    }

    (start + 100).min(lines.len().saturating_sub(1))
}

/// Collect the `/** … */` block directly above a declaration, up to 20
/// lines back, flattened to a single line.
pub fn javadoc_above(lines: &[&str], declaration_line: usize) -> String {
    let mut collected: Vec<&str> = Vec::new();
    let mut index = declaration_line;

    while index > 0 && declaration_line - index < 20 {
        index -= 1;
        let line = lines[index].trim();

        if line.starts_with("/**") {
            collected.push(line);
            let cleaned: Vec<String> = collected
                .iter()
                .rev()
                .map(|l| {
                    l.trim_start_matches("/**")
                        .trim_end_matches("*/")
                        .trim_start_matches('*')
                        .trim()
                        .to_string()
                })
                .filter(|l| !l.is_empty())
                .collect();
            return cleaned.join(" ");
        }

        if line.starts_with('*') || line.starts_with("*/") {
            collected.push(line);
            continue;
        }

        if !line.is_empty() && !line.starts_with("//") {
            break;
        }
    }

    String::new()
}

fn node_text(node: Node, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"package com.acme.billing;

/**
 * Shopping cart operations.
 */
public class Cart {

    private final List<Item> items = new ArrayList<>();

    /**
     * Total of all items.
     * Includes tax.
     */
    public BigDecimal total(BigDecimal taxRate) {
        String weird = "not a brace: {";
        // also not a brace: {
        char c = '{';
        /* and { here */
        return items.stream()
            .map(Item::price)
            .reduce(BigDecimal.ZERO, BigDecimal::add)
            .multiply(taxRate);
    }

    public void clear() {
        items.clear();
    }
}
"#;

    #[test]
    fn test_class_and_methods_extracted() {
        let units = extract("src/main/java/com/acme/billing/Cart.java", SAMPLE);
        let names: Vec<&str> = units.iter().map(|u| u.symbol_name.as_str()).collect();
        assert!(names.contains(&"com.acme.billing.Cart"));
        assert!(names.contains(&"com.acme.billing.Cart.total"));
        assert!(names.contains(&"com.acme.billing.Cart.clear"));
    }

    #[test]
    fn test_javadoc_captured() {
        let units = extract("Cart.java", SAMPLE);
        let class = units.iter().find(|u| u.symbol_type == SymbolType::Class).unwrap();
        assert_eq!(class.docstring, "Shopping cart operations.");

        let total = units.iter().find(|u| u.symbol_name.ends_with(".total")).unwrap();
        assert_eq!(total.docstring, "Total of all items. Includes tax.");

        let clear = units.iter().find(|u| u.symbol_name.ends_with(".clear")).unwrap();
        assert_eq!(clear.docstring, "");
    }

    #[test]
    fn test_method_end_lines_by_brace_counting() {
        let units = extract("Cart.java", SAMPLE);
        let total = units.iter().find(|u| u.symbol_name.ends_with(".total")).unwrap();
        assert!(total.code_snippet.starts_with("    public BigDecimal total"));
        assert!(total.code_snippet.trim_end().ends_with('}'));
        // The braces inside the string, char, and comments must not end
        // the method early.
        assert!(total.code_snippet.contains("multiply(taxRate)"));
    }

    #[test]
    fn test_brace_counter_ignores_literals_and_comments() {
        let lines: Vec<&str> = vec![
            "void f() {",
            "    String s = \"{{{\";",
            "    char c = '{';",
            "    // { comment",
            "    /* {",
            "       { */",
            "    g();",
            "}",
            "void next() {}",
        ];
        assert_eq!(find_block_end(&lines, 0), 7);
    }

    #[test]
    fn test_brace_counter_unbalanced_cuts_off() {
        let lines: Vec<&str> = vec!["void f() {", "    g();"];
        assert_eq!(find_block_end(&lines, 0), 1);
    }

    #[test]
    fn test_regex_fallback_on_broken_source() {
        // Unclosed generic makes the tree-sitter parse error out.
        let broken = r#"package com.acme;

public class Broken {
    public List<String names() {
        return names;
    }
}
"#;
        let units = extract("Broken.java", broken);
        assert!(units.iter().any(|u| u.symbol_name == "com.acme.Broken"));
    }

    #[test]
    fn test_signature_shape() {
        let units = extract("Cart.java", SAMPLE);
        let total = units.iter().find(|u| u.symbol_name.ends_with(".total")).unwrap();
        assert_eq!(total.signature, "BigDecimal total(BigDecimal taxRate)");
    }

    #[test]
    fn test_no_package() {
        let source = "class Lone { void go() {} }";
        let units = extract("Lone.java", source);
        assert!(units.iter().any(|u| u.symbol_name == "Lone"));
        assert!(units.iter().any(|u| u.symbol_name == "Lone.go"));
    }
}
