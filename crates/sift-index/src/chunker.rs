//! Grammar-driven chunking via tree-sitter.
//!
//! One source file becomes an ordered list of typed chunks. Oversized
//! container nodes are split into a `parent` chunk plus `child` chunks for
//! the nested declarations; a matched node below the split threshold fully
//! consumes its subtree.

use tree_sitter::{Node, Parser};

use crate::data;
use crate::languages::{ChunkType, Lang, detect_language};

/// Role of a chunk in the parent/child hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRole {
    Regular,
    Parent,
    Child,
}

impl ChunkRole {
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Parent => "parent",
            Self::Child => "child",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regular" => Some(Self::Regular),
            "parent" => Some(Self::Parent),
            "child" => Some(Self::Child),
            _ => None,
        }
    }
}

/// One unit of indexed content extracted from a file.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub file_path: String,
    pub chunk_type: ChunkType,
    pub name: String,
    pub signature: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub language: Lang,
    pub doc: String,
    /// Raw import strings of the whole file, denormalized onto every chunk.
    pub imports: Vec<String>,
    pub role: ChunkRole,
    /// `file_path:start_line` of the enclosing parent; present iff child.
    pub parent_key: Option<String>,
}

impl Chunk {
    /// Key other chunks use to reference this one as their parent.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.file_path, self.start_line)
    }
}

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Nodes shorter than this are noise and skipped outright.
    pub min_len: usize,
    /// Containers longer than this are split into parent + children.
    /// Also caps stored parent content and data-document chunks.
    pub max_len: usize,
    /// Maximum signature length (first line, truncated).
    pub signature_len: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_len: 50,
            max_len: 1500,
            signature_len: 120,
        }
    }
}

/// Parse one file into chunks. Fails soft: files without a known grammar
/// or that do not parse produce an empty list.
#[must_use]
pub fn parse(file_path: &str, source: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    let Some(lang) = detect_language(std::path::Path::new(file_path)) else {
        return Vec::new();
    };
    if lang.is_structured_data() {
        return data::chunk_document(file_path, source, lang, config);
    }
    match parse_grammar(file_path, source, lang, config) {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::warn!(file = file_path, error = %e, "chunking failed, skipping file");
            Vec::new()
        }
    }
}

fn parse_grammar(
    file_path: &str,
    source: &str,
    lang: Lang,
    config: &ChunkerConfig,
) -> Result<Vec<Chunk>, String> {
    let grammar = lang
        .grammar()
        .ok_or_else(|| format!("no grammar for {lang}"))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| format!("set_language failed: {e}"))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| format!("parse failed for {file_path}"))?;

    let root = tree.root_node();
    let imports = extract_imports(source, &root, lang);

    let ctx = WalkCtx {
        source,
        file_path,
        lang,
        imports: &imports,
        config,
    };
    let mut chunks = Vec::new();
    walk(&ctx, &root, None, &mut chunks);
    Ok(chunks)
}

/// Shared context for the recursive walk.
struct WalkCtx<'a> {
    source: &'a str,
    file_path: &'a str,
    lang: Lang,
    imports: &'a [String],
    config: &'a ChunkerConfig,
}

fn walk(ctx: &WalkCtx<'_>, node: &Node, active_parent: Option<&str>, out: &mut Vec<Chunk>) {
    let child_count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        let Some(chunk_type) = ctx.lang.chunk_type_for(child.kind()) else {
            walk(ctx, &child, active_parent, out);
            continue;
        };

        let text = &ctx.source[child.byte_range()];
        let len = text.chars().count();
        if len < ctx.config.min_len {
            // One-liners and stubs are noise; the subtree goes with them.
            continue;
        }

        if ctx.lang.is_container(child.kind()) && len > ctx.config.max_len {
            let chunk = make_chunk(
                ctx,
                &child,
                chunk_type,
                truncate_chars(text, ctx.config.max_len),
                ChunkRole::Parent,
                None,
            );
            let key = chunk.key();
            out.push(chunk);
            walk(ctx, &child, Some(&key), out);
            continue;
        }

        let role = if active_parent.is_some() {
            ChunkRole::Child
        } else {
            ChunkRole::Regular
        };
        out.push(make_chunk(
            ctx,
            &child,
            chunk_type,
            text.to_owned(),
            role,
            active_parent.map(ToOwned::to_owned),
        ));
        // A matched node fully consumes its subtree.
    }
}

fn make_chunk(
    ctx: &WalkCtx<'_>,
    node: &Node,
    chunk_type: ChunkType,
    content: String,
    role: ChunkRole,
    parent_key: Option<String>,
) -> Chunk {
    let signature = truncate_chars(
        content.lines().next().unwrap_or_default(),
        ctx.config.signature_len,
    );
    Chunk {
        name: extract_name(node, ctx.source, 0)
            .unwrap_or_else(|| node.kind().to_owned()),
        signature,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        doc: extract_doc(node, ctx.source, ctx.lang),
        imports: ctx.imports.to_vec(),
        file_path: ctx.file_path.to_owned(),
        language: ctx.lang,
        chunk_type,
        content,
        role,
        parent_key,
    }
}

/// First identifier-like child, recursing into wrapped declarations
/// (export statements, decorated definitions, variable declarators).
fn extract_name(node: &Node, source: &str, depth: u8) -> Option<String> {
    if depth > 3 {
        return None;
    }
    if let Some(n) = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
    {
        return Some(source[n.byte_range()].to_owned());
    }
    let child_count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        if child.kind().contains("identifier") {
            return Some(source[child.byte_range()].to_owned());
        }
    }
    for i in 0..child_count {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        if let Some(name) = extract_name(&child, source, depth + 1) {
            return Some(name);
        }
    }
    None
}

/// Leading comment block: a contiguous run of comment siblings directly
/// above the node, with no blank line in between.
fn extract_doc(node: &Node, source: &str, lang: Lang) -> String {
    let comment_kinds = lang.comment_kinds();
    let mut parts: Vec<&str> = Vec::new();
    let mut boundary = node.start_position().row;
    let mut cursor = node.prev_sibling();

    while let Some(sib) = cursor {
        if !comment_kinds.contains(&sib.kind()) {
            break;
        }
        if boundary.saturating_sub(sib.end_position().row) > 1 {
            break;
        }
        parts.push(&source[sib.byte_range()]);
        boundary = sib.start_position().row;
        cursor = sib.prev_sibling();
    }

    parts.reverse();
    parts.join("\n")
}

/// Collect raw import strings; each import node is a leaf for this walk.
fn extract_imports(source: &str, root: &Node, lang: Lang) -> Vec<String> {
    let import_kinds = lang.import_kinds();
    if import_kinds.is_empty() {
        return Vec::new();
    }
    let mut imports = Vec::new();
    collect_imports(source, root, import_kinds, &mut imports);
    imports
}

fn collect_imports(source: &str, node: &Node, kinds: &[&str], out: &mut Vec<String>) {
    let child_count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        if kinds.contains(&child.kind()) {
            out.push(import_path(source, &child));
        } else {
            collect_imports(source, &child, kinds, out);
        }
    }
}

/// The literal module path: the first string child stripped of quotes,
/// falling back to the raw statement text.
fn import_path(source: &str, node: &Node) -> String {
    let child_count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        if child.kind().contains("string") {
            let raw = &source[child.byte_range()];
            return raw.trim_matches(['"', '\'', '`']).to_owned();
        }
    }
    source[node.byte_range()].trim().to_owned()
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => s[..i].to_owned(),
        None => s.to_owned(),
    }
}
