//! Text assembly for embeddings and description prompts.

use crate::chunker::Chunk;

const MAX_EMBED_CHARS: usize = 4000;

/// Text embedded into the code vector space: structural context first,
/// then the chunk body, capped to keep embedding requests bounded.
#[must_use]
pub fn build_embedding_text(chunk: &Chunk) -> String {
    let mut text = format!(
        "{} {} {} in {}\n",
        chunk.language.id(),
        chunk.chunk_type.id(),
        chunk.name,
        chunk.file_path
    );
    if !chunk.doc.is_empty() {
        text.push_str(&chunk.doc);
        text.push('\n');
    }
    if !chunk.signature.is_empty() && chunk.signature != chunk.content.lines().next().unwrap_or_default() {
        text.push_str(&chunk.signature);
        text.push('\n');
    }
    text.push_str(&chunk.content);
    crate::chunker::truncate_chars(&text, MAX_EMBED_CHARS)
}

/// Prompt asking the generator for a one-sentence natural-language
/// description, embedded into the description vector space.
#[must_use]
pub fn description_prompt(chunk: &Chunk) -> String {
    format!(
        "Describe in one sentence what this {} {} named `{}` does. \
         Reply with the sentence only, no preamble.\n\n```{}\n{}\n```",
        chunk.language.id(),
        chunk.chunk_type.id(),
        chunk.name,
        chunk.language.id(),
        chunk.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{ChunkRole, ChunkerConfig, parse};

    fn sample_chunk() -> Chunk {
        let source = "// Adds two numbers.\nfn add(a: u32, b: u32) -> u32 {\n    a + b\n}\n";
        parse("src/math.rs", source, &ChunkerConfig { min_len: 10, ..ChunkerConfig::default() })
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn embedding_text_carries_structure_and_doc() {
        let chunk = sample_chunk();
        let text = build_embedding_text(&chunk);
        assert!(text.starts_with("rust function add in src/math.rs"));
        assert!(text.contains("Adds two numbers."));
        assert!(text.contains("a + b"));
    }

    #[test]
    fn embedding_text_is_capped() {
        let mut chunk = sample_chunk();
        chunk.content = "x".repeat(10_000);
        assert!(build_embedding_text(&chunk).chars().count() <= MAX_EMBED_CHARS);
    }

    #[test]
    fn description_prompt_names_the_chunk() {
        let chunk = sample_chunk();
        let prompt = description_prompt(&chunk);
        assert!(prompt.contains("`add`"));
        assert!(prompt.contains("```rust"));
        assert_eq!(chunk.role, ChunkRole::Regular);
    }
}
