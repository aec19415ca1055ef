//! Chunking for structured data files (JSON, YAML, TOML).
//!
//! A file whose root is a single-level mapping is split per top-level key;
//! everything else becomes one document chunk. YAML multi-document streams
//! produce one chunk per document.

use serde::Deserialize;

use crate::chunker::{Chunk, ChunkRole, ChunkerConfig, truncate_chars};
use crate::languages::{ChunkType, Lang};

pub(crate) fn chunk_document(
    file_path: &str,
    source: &str,
    lang: Lang,
    config: &ChunkerConfig,
) -> Vec<Chunk> {
    match lang {
        Lang::Json => match serde_json::from_str::<serde_json::Value>(source) {
            Ok(value) => split_value(file_path, source, lang, ChunkType::Document, &value, config),
            Err(e) => {
                tracing::warn!(file = file_path, error = %e, "invalid JSON, skipping");
                Vec::new()
            }
        },
        Lang::Toml => match source.parse::<toml::Value>() {
            Ok(value) => {
                let json = toml_to_json(value);
                split_value(file_path, source, lang, ChunkType::Table, &json, config)
            }
            Err(e) => {
                tracing::warn!(file = file_path, error = %e, "invalid TOML, skipping");
                Vec::new()
            }
        },
        Lang::Yaml => chunk_yaml(file_path, source, config),
        _ => Vec::new(),
    }
}

/// One whole-document chunk, plus one chunk per object/array-valued
/// top-level key when the root is a mapping. Scalar keys stay document-only.
fn split_value(
    file_path: &str,
    source: &str,
    lang: Lang,
    chunk_type: ChunkType,
    value: &serde_json::Value,
    config: &ChunkerConfig,
) -> Vec<Chunk> {
    let file_name = base_name(file_path);
    let mut chunks = vec![data_chunk(file_path, lang, chunk_type, file_name, source, config)];
    if let serde_json::Value::Object(map) = value {
        for (key, v) in map {
            if !v.is_object() && !v.is_array() {
                continue;
            }
            let content = serde_json::to_string_pretty(v).unwrap_or_default();
            chunks.push(data_chunk(file_path, lang, chunk_type, key.clone(), &content, config));
        }
    }
    chunks
}

fn chunk_yaml(file_path: &str, source: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    let mut docs: Vec<serde_yaml::Value> = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(source) {
        match serde_yaml::Value::deserialize(doc) {
            Ok(value) => docs.push(value),
            Err(e) => {
                tracing::warn!(file = file_path, error = %e, "invalid YAML, skipping");
                return Vec::new();
            }
        }
    }

    if docs.len() <= 1 {
        let value = docs.into_iter().next().unwrap_or(serde_yaml::Value::Null);
        let json = yaml_to_json(value);
        return split_value(file_path, source, Lang::Yaml, ChunkType::Document, &json, config);
    }

    // Multi-document stream: one chunk per document, named after its
    // Kubernetes-style identity when present.
    docs.into_iter()
        .enumerate()
        .map(|(i, value)| {
            let name = yaml_doc_name(&value).unwrap_or_else(|| format!("document_{i}"));
            let content = serde_yaml::to_string(&value).unwrap_or_default();
            data_chunk(file_path, Lang::Yaml, ChunkType::Document, name, &content, config)
        })
        .collect()
}

fn yaml_doc_name(value: &serde_yaml::Value) -> Option<String> {
    let kind = value.get("kind")?.as_str()?;
    let name = value.get("metadata")?.get("name")?.as_str()?;
    Some(format!("{kind}/{name}"))
}

fn data_chunk(
    file_path: &str,
    lang: Lang,
    chunk_type: ChunkType,
    name: String,
    content: &str,
    config: &ChunkerConfig,
) -> Chunk {
    let line_count = content.lines().count().max(1);
    Chunk {
        content: truncate_chars(content, config.max_len),
        signature: truncate_chars(content.lines().next().unwrap_or_default(), config.signature_len),
        file_path: file_path.to_owned(),
        chunk_type,
        name,
        start_line: 1,
        end_line: line_count,
        language: lang,
        doc: String::new(),
        imports: Vec::new(),
        role: ChunkRole::Regular,
        parent_key: None,
    }
}

fn base_name(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .file_name()
        .map_or_else(|| file_path.to_owned(), |n| n.to_string_lossy().into_owned())
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn yaml_to_json(value: serde_yaml::Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use crate::chunker::{ChunkerConfig, parse};
    use crate::languages::ChunkType;

    #[test]
    fn json_object_splits_per_key() {
        let source = r#"{
  "scripts": { "build": "tsc", "test": "vitest" },
  "dependencies": { "react": "^18.0.0" },
  "name": "demo"
}"#;
        let chunks = parse("package.json", source, &ChunkerConfig::default());
        let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
        // Whole document first, then one chunk per structured key.
        // Scalar "name" does not get its own chunk.
        assert_eq!(names, vec!["package.json", "scripts", "dependencies"]);
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::Document));
    }

    #[test]
    fn json_array_root_is_single_document() {
        let chunks = parse("list.json", r#"[1, 2, 3]"#, &ChunkerConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name, "list.json");
    }

    #[test]
    fn invalid_json_fails_soft() {
        assert!(parse("bad.json", "{ nope", &ChunkerConfig::default()).is_empty());
    }

    #[test]
    fn toml_tables_split_per_key() {
        let source = r#"
[package]
name = "demo"
version = "0.1.0"

[dependencies]
serde = "1"
"#;
        let chunks = parse("Cargo.toml", source, &ChunkerConfig::default());
        let mut names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Cargo.toml", "dependencies", "package"]);
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::Table));
    }

    #[test]
    fn yaml_multi_document_named_by_kind() {
        let source = r"
kind: Deployment
metadata:
  name: api
spec:
  replicas: 2
---
kind: Service
metadata:
  name: api-svc
";
        let chunks = parse("deploy.yaml", source, &ChunkerConfig::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name, "Deployment/api");
        assert_eq!(chunks[1].name, "Service/api-svc");
    }

    #[test]
    fn yaml_single_document_splits_per_key() {
        let source = r"
server:
  host: localhost
  port: 8080
debug: true
";
        let chunks = parse("config.yaml", source, &ChunkerConfig::default());
        let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
        // Scalar "debug" is not split out.
        assert_eq!(names, vec!["config.yaml", "server"]);
    }

    #[test]
    fn oversized_document_content_is_capped() {
        let big: String = (0..500).map(|i| format!("\"k{i}\": {i}, ")).collect();
        let source = format!("{{ \"data\": {{ {big} \"last\": 0 }} }}");
        let config = ChunkerConfig {
            max_len: 300,
            ..ChunkerConfig::default()
        };
        let chunks = parse("big.json", &source, &config);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 300));
    }
}
