//! Import resolution: raw import strings to project-relative file paths.
//!
//! Only project-internal imports resolve; bare package names and stdlib
//! modules map to `None` and never enter the dependency graph.

use std::collections::HashSet;

/// Resolver configuration.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Project-relative directory that alias roots point at, e.g. `src`.
    pub source_root: String,
    /// Prefix rewrites tried in order, first match wins.
    pub aliases: Vec<(String, String)>,
}

/// Resolve one raw import against the importing file's path. Returns a
/// normalized project-relative path without an extension guess, or `None`
/// for external imports.
#[must_use]
pub fn resolve(config: &ResolverConfig, importer: &str, raw: &str) -> Option<String> {
    if raw.starts_with("./") || raw.starts_with("../") {
        let dir = parent_dir(importer);
        return normalize(&format!("{dir}/{raw}"));
    }
    for (prefix, replacement) in &config.aliases {
        if let Some(rest) = raw.strip_prefix(prefix.as_str()) {
            return normalize(&format!("{replacement}/{rest}"));
        }
    }
    for prefix in ["@/", "~/"] {
        if let Some(rest) = raw.strip_prefix(prefix) {
            return normalize(&format!("{}/{rest}", config.source_root));
        }
    }
    None
}

/// Resolve a batch of raw imports, dropping externals and duplicates while
/// preserving first-seen order.
#[must_use]
pub fn resolve_all(config: &ResolverConfig, importer: &str, raws: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raws.iter()
        .filter_map(|raw| resolve(config, importer, raw))
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Lexical `.`/`..` normalization. Escaping above the project root is an
/// unresolvable import, not an error.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
