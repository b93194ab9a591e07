//! Core data model: thoughts, sessions, edges, graph nodes, and the
//! request/response shapes used by the store, graph, and reflection engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ThoughtMemoryError;

/// Unique identifier for a Thought.
///
/// Serializes as a plain string (caller-supplied id or a fresh UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThoughtId(String);

impl ThoughtId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThoughtId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThoughtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ThoughtId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ThoughtId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque metadata map carried by sessions and edges.
pub type Metadata = HashMap<String, serde_json::Value>;

/// The atomic memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub id: ThoughtId,
    pub timestamp_utc: DateTime<Utc>,
    pub session_id: String,
    pub category: String,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub raw_text: String,
    pub cleaned_text: String,
    pub embedding_vector: Vec<f32>,
    pub embedding_dim: usize,
}

impl Thought {
    /// Build a new thought, validating the invariants from §3/§7:
    /// non-empty session id, confidence in [0, 1], non-empty texts,
    /// non-empty embedding vector, and `embedding_dim == |embedding_vector|`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Option<ThoughtId>,
        session_id: impl Into<String>,
        category: impl Into<String>,
        confidence: f64,
        tags: Vec<String>,
        raw_text: impl Into<String>,
        cleaned_text: impl Into<String>,
        embedding_vector: Vec<f32>,
    ) -> Result<Self, ThoughtMemoryError> {
        let session_id = session_id.into();
        let category = category.into();
        let raw_text = raw_text.into();
        let cleaned_text = cleaned_text.into();

        if session_id.trim().is_empty() {
            return Err(ThoughtMemoryError::validation("session_id must be non-empty"));
        }
        if category.trim().is_empty() {
            return Err(ThoughtMemoryError::validation("category must be non-empty"));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ThoughtMemoryError::validation(format!(
                "confidence {confidence} out of range [0, 1]"
            )));
        }
        if raw_text.is_empty() || cleaned_text.is_empty() {
            return Err(ThoughtMemoryError::validation(
                "raw_text and cleaned_text must be non-empty",
            ));
        }
        if embedding_vector.is_empty() {
            return Err(ThoughtMemoryError::validation(
                "embedding_vector must be non-empty",
            ));
        }

        let embedding_dim = embedding_vector.len();
        Ok(Self {
            id: id.unwrap_or_default(),
            timestamp_utc: Utc::now(),
            session_id,
            category,
            confidence,
            tags,
            raw_text,
            cleaned_text,
            embedding_vector,
            embedding_dim,
        })
    }
}

/// Session lineage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub parent_session_id: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub metadata: Metadata,
}

/// A directed relation between two thought ids, as persisted in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: i64,
    pub source_id: ThoughtId,
    pub target_id: ThoughtId,
    pub relation: String,
    pub weight: f64,
    pub created_at_utc: DateTime<Utc>,
    pub metadata: Metadata,
}

/// Canonical edge relations privileged by graph algorithms. Other
/// free-form strings are accepted but not treated specially.
pub mod relation {
    pub const SEMANTIC_SIMILARITY: &str = "semantic-similarity";
    pub const EXPLICIT_REFERENCE: &str = "explicit-reference";
    pub const TEMPORAL_SUCCESSOR: &str = "temporal-successor";
}

/// A mirror of thought identity into the graph's node space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub thought_id: ThoughtId,
    pub session_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub metadata: Metadata,
}

/// Filters applied by `retrieve` and as the metadata overlay of `semantic_search`.
#[derive(Debug, Clone, Default)]
pub struct ThoughtFilters {
    pub session_id: Option<String>,
    pub category: Option<String>,
    pub min_confidence: Option<f64>,
    pub start_time_utc: Option<DateTime<Utc>>,
    pub end_time_utc: Option<DateTime<Utc>>,
    pub tags_any: Option<Vec<String>>,
}

impl ThoughtFilters {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    /// Post-SQL filter: the row survives if it matches every `Some` field.
    pub fn matches(&self, thought: &Thought) -> bool {
        if let Some(ref s) = self.session_id {
            if &thought.session_id != s {
                return false;
            }
        }
        if let Some(ref c) = self.category {
            if &thought.category != c {
                return false;
            }
        }
        if let Some(min_conf) = self.min_confidence {
            if thought.confidence < min_conf {
                return false;
            }
        }
        if let Some(start) = self.start_time_utc {
            if thought.timestamp_utc < start {
                return false;
            }
        }
        if let Some(end) = self.end_time_utc {
            if thought.timestamp_utc > end {
                return false;
            }
        }
        if let Some(ref any) = self.tags_any {
            if !any.iter().any(|t| thought.tags.contains(t)) {
                return false;
            }
        }
        true
    }
}

/// A thought annotated with the scores that produced its rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredThought {
    pub thought: Thought,
    pub semantic_score: f64,
    #[serde(default)]
    pub recency_score: f64,
    pub score: f64,
}

/// Result of one `parse_and_store` ingestion call.
#[derive(Debug, Clone)]
pub struct ParseStoreResult {
    pub cleaned_output: String,
    pub thoughts: Vec<Thought>,
    pub used_linear_fallback: bool,
}

/// Result of one reflection cycle.
#[derive(Debug, Clone)]
pub struct ReflectionResult {
    pub reflection_text: String,
    pub prompt_used: String,
    pub recalled_thoughts: Vec<Thought>,
    pub stored_reflections: Vec<Thought>,
    pub latency_ms: f64,
}
