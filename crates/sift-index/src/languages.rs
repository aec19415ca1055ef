//! Language detection and per-language grammar tables.
//!
//! Each supported language is a closed variant carrying its own node-type
//! tables: which syntax nodes become chunks, which of those are containers
//! eligible for parent/child splitting, which nodes are imports, and what
//! the comment kinds look like. Dispatch is by file extension only.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Semantic category of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Function,
    Class,
    Interface,
    TypeAlias,
    Enum,
    Module,
    Variable,
    Document,
    Table,
}

impl ChunkType {
    pub const ALL: [Self; 9] = [
        Self::Function,
        Self::Class,
        Self::Interface,
        Self::TypeAlias,
        Self::Enum,
        Self::Module,
        Self::Variable,
        Self::Document,
        Self::Table,
    ];

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::TypeAlias => "type_alias",
            Self::Enum => "enum",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Document => "document",
            Self::Table => "table",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "type_alias" => Some(Self::TypeAlias),
            "enum" => Some(Self::Enum),
            "module" => Some(Self::Module),
            "variable" => Some(Self::Variable),
            "document" => Some(Self::Document),
            "table" => Some(Self::Table),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Supported language with its tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Json,
    Yaml,
    Toml,
}

impl Lang {
    /// Identifier used in payloads and config.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
        }
    }

    /// Structured-data formats bypass the grammar parser entirely.
    #[must_use]
    pub fn is_structured_data(self) -> bool {
        matches!(self, Self::Json | Self::Yaml | Self::Toml)
    }

    /// Get the tree-sitter grammar, if this language has one.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Self::Json | Self::Yaml | Self::Toml => None,
        }
    }

    /// AST node kinds that become chunks, with their chunk type.
    #[must_use]
    pub fn chunk_type_for(self, kind: &str) -> Option<ChunkType> {
        let table: &[(&str, ChunkType)] = match self {
            Self::Rust => &[
                ("function_item", ChunkType::Function),
                ("struct_item", ChunkType::Class),
                ("impl_item", ChunkType::Class),
                ("trait_item", ChunkType::Interface),
                ("enum_item", ChunkType::Enum),
                ("type_item", ChunkType::TypeAlias),
                ("mod_item", ChunkType::Module),
                ("const_item", ChunkType::Variable),
                ("static_item", ChunkType::Variable),
                ("macro_definition", ChunkType::Function),
            ],
            Self::Python => &[
                ("function_definition", ChunkType::Function),
                ("class_definition", ChunkType::Class),
                ("decorated_definition", ChunkType::Function),
            ],
            Self::JavaScript => &[
                ("function_declaration", ChunkType::Function),
                ("generator_function_declaration", ChunkType::Function),
                ("class_declaration", ChunkType::Class),
                ("method_definition", ChunkType::Function),
                ("lexical_declaration", ChunkType::Variable),
                ("variable_declaration", ChunkType::Variable),
            ],
            Self::TypeScript => &[
                ("function_declaration", ChunkType::Function),
                ("generator_function_declaration", ChunkType::Function),
                ("class_declaration", ChunkType::Class),
                ("abstract_class_declaration", ChunkType::Class),
                ("method_definition", ChunkType::Function),
                ("interface_declaration", ChunkType::Interface),
                ("type_alias_declaration", ChunkType::TypeAlias),
                ("enum_declaration", ChunkType::Enum),
                ("module", ChunkType::Module),
                ("internal_module", ChunkType::Module),
                ("lexical_declaration", ChunkType::Variable),
                ("variable_declaration", ChunkType::Variable),
            ],
            Self::Go => &[
                ("function_declaration", ChunkType::Function),
                ("method_declaration", ChunkType::Function),
                ("type_declaration", ChunkType::Class),
                ("const_declaration", ChunkType::Variable),
                ("var_declaration", ChunkType::Variable),
            ],
            Self::Json | Self::Yaml | Self::Toml => &[],
        };
        table.iter().find(|(k, _)| *k == kind).map(|(_, t)| *t)
    }

    /// Container node kinds eligible for parent/child splitting.
    #[must_use]
    pub fn is_container(self, kind: &str) -> bool {
        let kinds: &[&str] = match self {
            Self::Rust => &["impl_item", "trait_item", "mod_item"],
            Self::Python => &["class_definition"],
            Self::JavaScript => &["class_declaration"],
            Self::TypeScript => &[
                "class_declaration",
                "abstract_class_declaration",
                "module",
                "internal_module",
            ],
            Self::Go => &["type_declaration"],
            Self::Json | Self::Yaml | Self::Toml => &[],
        };
        kinds.contains(&kind)
    }

    /// Node kinds carrying import statements.
    #[must_use]
    pub fn import_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["use_declaration"],
            Self::Python => &["import_statement", "import_from_statement"],
            Self::JavaScript | Self::TypeScript => &["import_statement"],
            Self::Go => &["import_declaration"],
            Self::Json | Self::Yaml | Self::Toml => &[],
        }
    }

    /// Comment node kinds, used for doc-block extraction.
    #[must_use]
    pub fn comment_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["line_comment", "block_comment"],
            Self::Python | Self::Go | Self::JavaScript | Self::TypeScript => &["comment"],
            Self::Json | Self::Yaml | Self::Toml => &[],
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "rs" => Some(Lang::Rust),
        "py" | "pyi" => Some(Lang::Python),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" | "tsx" | "mts" | "cts" => Some(Lang::TypeScript),
        "go" => Some(Lang::Go),
        "json" | "jsonc" => Some(Lang::Json),
        "yaml" | "yml" => Some(Lang::Yaml),
        "toml" => Some(Lang::Toml),
        _ => None,
    }
}

/// Check if a file can be chunked (grammar language or structured data).
#[must_use]
pub fn is_indexable(path: &Path) -> bool {
    detect_language(path).is_some()
}
