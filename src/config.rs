//! Runtime configuration, grounded on the teacher's CLI defaults
//! (`src/bin/plexus.rs`'s `--db` default resolution via `dirs`) generalized
//! into a reusable config struct per SPEC_FULL.md §10.

use std::path::PathBuf;

use crate::vector_index::VectorBackendKind;

/// Configuration for opening a `ThoughtStore`/`ThoughtGraph` pair.
#[derive(Debug, Clone)]
pub struct ThoughtMemoryConfig {
    pub db_path: PathBuf,
    pub embedding_dim: usize,
    pub vector_backend: VectorBackendKind,
    pub default_tag_name: String,
}

impl Default for ThoughtMemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            embedding_dim: 384,
            vector_backend: VectorBackendKind::Auto,
            default_tag_name: "thought".to_string(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("thoughtmemory")
        .join("thoughts.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_dimension_and_tag_name() {
        let cfg = ThoughtMemoryConfig::default();
        assert_eq!(cfg.embedding_dim, 384);
        assert_eq!(cfg.default_tag_name, "thought");
        assert_eq!(cfg.vector_backend, VectorBackendKind::Auto);
    }
}
