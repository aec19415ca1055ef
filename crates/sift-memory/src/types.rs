//! Memory record model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// What kind of knowledge a record holds. Each type lives in its own
/// collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Things that happened: events, decisions, outcomes.
    Episodic,
    /// Facts and relationships.
    Semantic,
    /// How-to knowledge: workflows, commands, conventions.
    Procedural,
}

impl MemoryType {
    pub const ALL: [Self; 3] = [Self::Episodic, Self::Semantic, Self::Procedural];

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
        }
    }
}

impl FromStr for MemoryType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(Self::Episodic),
            "semantic" => Ok(Self::Semantic),
            "procedural" => Ok(Self::Procedural),
            other => Err(MemoryError::InvalidType(other.to_owned())),
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Visibility of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Private to one agent.
    Agent,
    /// Shared within a project.
    Project,
    /// Visible everywhere.
    Global,
}

impl MemoryScope {
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Project => "project",
            Self::Global => "global",
        }
    }
}

impl FromStr for MemoryScope {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "project" => Ok(Self::Project),
            "global" => Ok(Self::Global),
            other => Err(MemoryError::InvalidScope(other.to_owned())),
        }
    }
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A stored memory record as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub scope: MemoryScope,
    /// In `[0, 1]`.
    pub importance: f64,
    pub tags: Vec<String>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

/// A recall result with its ranking breakdown.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub record: MemoryRecord,
    /// Raw cosine similarity from the store.
    pub similarity: f32,
    /// Similarity weighted by time decay and importance.
    pub final_score: f64,
}
