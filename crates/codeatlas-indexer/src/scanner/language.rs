//! Language detection and grammar dispatch.
//!
//! Files with an unmapped extension are silently excluded, never an error.

use std::path::Path;

/// Languages with extraction support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    TypeScript,
    /// JavaScript parses with the TSX grammar, a superset.
    JavaScript,
    Python,
    Go,
}

impl Language {
    /// Detect the language of a file from its extension.
    pub fn from_path(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "rs" => Some(Language::Rust),
            "ts" | "tsx" => Some(Language::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "py" | "pyi" => Some(Language::Python),
            "go" => Some(Language::Go),
            _ => None,
        }
    }

    /// Storage name, recorded on File nodes.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Go => "go",
        }
    }

    /// The tree-sitter grammar for this language.
    pub fn grammar(&self) -> tree_sitter::Language {
        match self {
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            // TSX is a superset of both TypeScript and JavaScript.
            Language::TypeScript | Language::JavaScript => {
                tree_sitter_typescript::LANGUAGE_TSX.into()
            }
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }

    pub const ALL: [Language; 5] = [
        Language::Rust,
        Language::TypeScript,
        Language::JavaScript,
        Language::Python,
        Language::Go,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_supported_extensions() {
        assert_eq!(
            Language::from_path(&PathBuf::from("main.rs")),
            Some(Language::Rust)
        );
        assert_eq!(
            Language::from_path(&PathBuf::from("a.ts")),
            Some(Language::TypeScript)
        );
        assert_eq!(
            Language::from_path(&PathBuf::from("App.tsx")),
            Some(Language::TypeScript)
        );
        assert_eq!(
            Language::from_path(&PathBuf::from("index.mjs")),
            Some(Language::JavaScript)
        );
        assert_eq!(
            Language::from_path(&PathBuf::from("mod.py")),
            Some(Language::Python)
        );
        assert_eq!(
            Language::from_path(&PathBuf::from("main.go")),
            Some(Language::Go)
        );
    }

    #[test]
    fn test_unknown_extension_is_none() {
        assert_eq!(Language::from_path(&PathBuf::from("README.md")), None);
        assert_eq!(Language::from_path(&PathBuf::from("Makefile")), None);
        assert_eq!(Language::from_path(&PathBuf::from("style.css")), None);
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert_eq!(
            Language::from_path(&PathBuf::from("MAIN.RS")),
            Some(Language::Rust)
        );
    }

    #[test]
    fn test_every_language_has_a_grammar() {
        for lang in Language::ALL {
            // Loading the grammar must not panic.
            let _ = lang.grammar();
        }
    }
}
