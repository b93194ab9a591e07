//! Persistent store for tagged reasoning fragments: parsing, hybrid
//! semantic+metadata+recency retrieval, a typed thought graph, and a
//! reflection cycle that synthesizes and persists meta-thoughts.
//!
//! # Example
//!
//! ```
//! use thoughtmemory::{HashEmbedder, ThoughtStore, VectorBackendKind};
//!
//! let store = ThoughtStore::open_in_memory(16, VectorBackendKind::Dense).unwrap();
//! let _embedder = HashEmbedder::new(16);
//! assert_eq!(store.embedding_dim(), 16);
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod reflection;
pub mod store;
pub mod vector_index;

pub use config::ThoughtMemoryConfig;
pub use embedding::{Embedder, ExternalEmbedder, HashEmbedder};
pub use error::{StoreError, StoreResult, ThoughtMemoryError, ThoughtMemoryResult};
pub use graph::ThoughtGraph;
pub use model::{
    relation, Edge, GraphNode, ParseStoreResult, ReflectionResult, ScoredThought, Session,
    Thought, ThoughtFilters, ThoughtId,
};
pub use parser::{
    clean_thought_tags, clean_thought_tags_linear, parse_and_clean, parse_structured_thoughts,
    parse_thought_tags, parse_thought_tags_linear, ParsedStructuredThought, TagMap,
};
pub use pipeline::{aparse_and_store, parse_and_store, ParseAndStoreOptions};
pub use reflection::{ReflectOptions, ReflectionEngine, MODES as REFLECTION_MODES};
pub use store::ThoughtStore;
pub use vector_index::{DenseVectorIndex, VectorBackendKind, VectorIndex};

#[cfg(feature = "embeddings")]
pub use embedding::FastEmbedEmbedder;
#[cfg(feature = "embeddings")]
pub use vector_index::SqliteVecIndex;

/// Crate version, exposed for diagnostics and CLI `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
