//! Language extractors: structural blocks out of source text.

pub mod java;
pub mod python;

use model::SymbolType;

use crate::error::IndexError;

/// Languages the indexer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Java,
}

impl Language {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Python => ".py",
            Self::Java => ".java",
        }
    }

    /// Pick the language for a file path, if any.
    pub fn for_path(path: &str) -> Option<Self> {
        if path.ends_with(".py") {
            Some(Self::Python)
        } else if path.ends_with(".java") {
            Some(Self::Java)
        } else {
            None
        }
    }
}

/// One extracted structural unit, before storage concerns are attached.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    /// Dotted qualified name, e.g. `src.cart.Cart.total`.
    pub symbol_name: String,
    pub symbol_type: SymbolType,
    /// 1-indexed, inclusive.
    pub line_start: u32,
    pub line_end: u32,
    pub code_snippet: String,
    pub docstring: String,
    pub signature: String,
}

/// Extract all units from one file, dispatching on its extension.
pub fn extract_units(path: &str, source: &str) -> Result<Vec<CodeUnit>, IndexError> {
    match Language::for_path(path) {
        Some(Language::Python) => python::extract(path, source),
        Some(Language::Java) => Ok(java::extract(path, source)),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_for_path() {
        assert_eq!(Language::for_path("src/cart.py"), Some(Language::Python));
        assert_eq!(Language::for_path("Cart.java"), Some(Language::Java));
        assert_eq!(Language::for_path("README.md"), None);
    }

    #[test]
    fn test_unknown_extension_yields_nothing() {
        assert!(extract_units("README.md", "# hi").unwrap().is_empty());
    }
}
