//! Thought Store: persists thoughts and session lineage in SQLite, maintains
//! an in-memory vector index in lock-step, and exposes filtered retrieval
//! and hybrid semantic search.
//!
//! Grounded on the teacher's `storage/sqlite.rs` (WAL-mode schema init,
//! transaction-scoped atomic writes, dynamic filter queries) generalized to
//! this crate's schema; hybrid-ranking and lineage-recall semantics are
//! grounded on `examples/original_source/thought_wrapper/tms/store.py`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, ThoughtMemoryError, ThoughtMemoryResult};
use crate::embedding::cosine_similarity;
use crate::graph::ThoughtGraph;
use crate::model::{ScoredThought, Thought, ThoughtFilters, ThoughtId};
use crate::vector_index::{DenseVectorIndex, VectorBackendKind, VectorIndex};

struct StoreInner {
    conn: Connection,
    vector_index: Box<dyn VectorIndex>,
}

/// Persists thoughts + session lineage; owns the database handle and the
/// in-memory vector index, both guarded by one mutex (§5).
pub struct ThoughtStore {
    inner: Mutex<StoreInner>,
    embedding_dim: usize,
    /// Read-through cache of recently-touched thoughts, mirroring the
    /// teacher's `PlexusEngine::contexts: DashMap` in-memory cache pattern.
    thought_cache: DashMap<ThoughtId, Thought>,
}

impl ThoughtStore {
    pub fn open(path: &Path, embedding_dim: usize, backend: VectorBackendKind) -> ThoughtMemoryResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::from)?;
            }
        }
        let conn = Connection::open(path).map_err(StoreError::from)?;
        Self::from_connection(conn, embedding_dim, backend)
    }

    pub fn open_in_memory(embedding_dim: usize, backend: VectorBackendKind) -> ThoughtMemoryResult<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        Self::from_connection(conn, embedding_dim, backend)
    }

    fn from_connection(conn: Connection, embedding_dim: usize, backend: VectorBackendKind) -> ThoughtMemoryResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(StoreError::from)?;
        init_schema(&conn).map_err(StoreError::from)?;

        let vector_index = resolve_vector_backend(backend, embedding_dim);

        let store = Self {
            inner: Mutex::new(StoreInner { conn, vector_index }),
            embedding_dim,
            thought_cache: DashMap::new(),
        };
        store.hydrate_vector_index()?;
        Ok(store)
    }

    fn hydrate_vector_index(&self) -> ThoughtMemoryResult<()> {
        let mut guard = self.inner.lock().unwrap();
        let items = query_all_vectors(&guard.conn).map_err(StoreError::from)?;
        guard.vector_index.build(&items)?;
        Ok(())
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Access shared with `ThoughtGraph`, whose tables live in this same
    /// connection so graph writes serialize with store writes (§9).
    pub(crate) fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> ThoughtMemoryResult<R>,
    ) -> ThoughtMemoryResult<R> {
        let guard = self.inner.lock().unwrap();
        f(&guard.conn)
    }

    // ---- sessions -----------------------------------------------------

    pub fn create_session(
        &self,
        session_id: &str,
        parent_session_id: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> ThoughtMemoryResult<()> {
        if session_id.trim().is_empty() {
            return Err(ThoughtMemoryError::validation("session_id must be non-empty"));
        }
        let mut guard = self.inner.lock().unwrap();
        let now = Utc::now();

        if let Some(parent) = parent_session_id {
            Self::ensure_session_auto(&guard.conn, parent, now).map_err(StoreError::from)?;
        }

        let metadata_json = serde_json::to_string(&metadata.unwrap_or(serde_json::json!({})))
            .map_err(StoreError::from)?;
        guard
            .conn
            .execute(
                "INSERT INTO sessions(session_id, parent_session_id, created_at_utc, metadata_json) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(session_id) DO UPDATE SET \
                     parent_session_id = excluded.parent_session_id, \
                     metadata_json = excluded.metadata_json",
                params![session_id, parent_session_id, now.to_rfc3339(), metadata_json],
            )
            .map_err(StoreError::from)?;
        tracing::debug!(session_id, parent = parent_session_id, "session created/updated");
        Ok(())
    }

    fn ensure_session_auto(conn: &Connection, session_id: &str, now: DateTime<Utc>) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO sessions(session_id, parent_session_id, created_at_utc, metadata_json) \
             VALUES (?1, NULL, ?2, '{}') ON CONFLICT(session_id) DO NOTHING",
            params![session_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_session_parent(&self, session_id: &str) -> ThoughtMemoryResult<Option<String>> {
        let guard = self.inner.lock().unwrap();
        let result: Option<Option<String>> = guard
            .conn
            .query_row(
                "SELECT parent_session_id FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map_err(StoreError::from)?;
        Ok(result.flatten())
    }

    /// Ancestor chain, cycle-guarded: stops and returns the accumulated
    /// prefix on revisit rather than raising (§3).
    pub fn get_session_lineage(&self, session_id: &str, include_self: bool) -> ThoughtMemoryResult<Vec<String>> {
        let guard = self.inner.lock().unwrap();
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = if include_self {
            Some(session_id.to_string())
        } else {
            guard
                .conn
                .query_row(
                    "SELECT parent_session_id FROM sessions WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()
                .map_err(StoreError::from)?
                .flatten()
        };

        while let Some(id) = current {
            if visited.contains(&id) {
                break;
            }
            visited.insert(id.clone());
            chain.push(id.clone());
            current = guard
                .conn
                .query_row(
                    "SELECT parent_session_id FROM sessions WHERE session_id = ?1",
                    params![id],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()
                .map_err(StoreError::from)?
                .flatten();
        }
        Ok(chain)
    }

    // ---- thought writes -------------------------------------------------

    pub fn store(&self, thought: Thought) -> ThoughtMemoryResult<Thought> {
        let mut result = self.batch_store(vec![thought])?;
        Ok(result.remove(0))
    }

    /// Atomic batch insert: either every thought is visible afterward, or
    /// none are. The vector index is only mutated after the transaction
    /// commits (§4.3, §7 Persistence failure).
    pub fn batch_store(&self, thoughts: Vec<Thought>) -> ThoughtMemoryResult<Vec<Thought>> {
        for t in &thoughts {
            if t.embedding_dim != self.embedding_dim || t.embedding_vector.len() != self.embedding_dim {
                return Err(ThoughtMemoryError::validation(format!(
                    "thought {} has embedding_dim {} but store expects {}",
                    t.id, t.embedding_dim, self.embedding_dim
                )));
            }
        }
        if thoughts.is_empty() {
            return Ok(thoughts);
        }

        let mut guard = self.inner.lock().unwrap();
        let now = Utc::now();
        let tx = guard.conn.transaction().map_err(StoreError::from)?;

        for t in &thoughts {
            Self::ensure_session_auto(&tx, &t.session_id, now).map_err(StoreError::from)?;

            let tags_json = serde_json::to_string(&t.tags).map_err(StoreError::from)?;
            let blob = f32_vec_to_blob(&t.embedding_vector);
            tx.execute(
                "INSERT INTO thoughts(id, timestamp_utc, session_id, category, confidence, \
                     tags_json, raw_text, cleaned_text, embedding_dim, embedding_blob, payload_json) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, '{}') \
                 ON CONFLICT(id) DO UPDATE SET \
                     timestamp_utc = excluded.timestamp_utc, \
                     session_id = excluded.session_id, \
                     category = excluded.category, \
                     confidence = excluded.confidence, \
                     tags_json = excluded.tags_json, \
                     raw_text = excluded.raw_text, \
                     cleaned_text = excluded.cleaned_text, \
                     embedding_dim = excluded.embedding_dim, \
                     embedding_blob = excluded.embedding_blob",
                params![
                    t.id.as_str(),
                    t.timestamp_utc.to_rfc3339(),
                    t.session_id,
                    t.category,
                    t.confidence,
                    tags_json,
                    t.raw_text,
                    t.cleaned_text,
                    t.embedding_dim as i64,
                    blob,
                ],
            )
            .map_err(StoreError::from)?;
        }

        tx.commit().map_err(StoreError::from)?;

        // Vector index update happens only after commit.
        for t in &thoughts {
            let upserted = guard
                .vector_index
                .upsert(&t.id, &t.embedding_vector)
                .unwrap_or(false);
            if !upserted {
                let items = query_all_vectors(&guard.conn).map_err(StoreError::from)?;
                guard.vector_index.build(&items)?;
                break;
            }
        }
        for t in &thoughts {
            self.thought_cache.insert(t.id.clone(), t.clone());
        }
        tracing::info!(count = thoughts.len(), "batch_store committed");

        Ok(thoughts)
    }

    // ---- reads ----------------------------------------------------------

    pub fn get_thought_by_id(&self, id: &ThoughtId) -> ThoughtMemoryResult<Option<Thought>> {
        if let Some(cached) = self.thought_cache.get(id) {
            return Ok(Some(cached.clone()));
        }
        let guard = self.inner.lock().unwrap();
        let row = fetch_thought_row(&guard.conn, id.as_str()).map_err(StoreError::from)?;
        if let Some(ref t) = row {
            self.thought_cache.insert(id.clone(), t.clone());
        }
        Ok(row)
    }

    /// Pure metadata query: AND of (session, category, min-confidence, time
    /// range); `tags_any` applied post-SQL. Ordered by timestamp DESC.
    pub fn retrieve(&self, filters: &ThoughtFilters, limit: usize) -> ThoughtMemoryResult<Vec<Thought>> {
        let guard = self.inner.lock().unwrap();
        let mut sql = String::from(
            "SELECT id, timestamp_utc, session_id, category, confidence, tags_json, \
                    raw_text, cleaned_text, embedding_dim, embedding_blob FROM thoughts WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref s) = filters.session_id {
            sql.push_str(" AND session_id = ?");
            args.push(Box::new(s.clone()));
        }
        if let Some(ref c) = filters.category {
            sql.push_str(" AND category = ?");
            args.push(Box::new(c.clone()));
        }
        if let Some(min_conf) = filters.min_confidence {
            sql.push_str(" AND confidence >= ?");
            args.push(Box::new(min_conf));
        }
        if let Some(start) = filters.start_time_utc {
            sql.push_str(" AND timestamp_utc >= ?");
            args.push(Box::new(start.to_rfc3339()));
        }
        if let Some(end) = filters.end_time_utc {
            sql.push_str(" AND timestamp_utc <= ?");
            args.push(Box::new(end.to_rfc3339()));
        }
        sql.push_str(" ORDER BY timestamp_utc DESC");

        let mut stmt = guard.conn.prepare(&sql).map_err(StoreError::from)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), row_to_thought)
            .map_err(StoreError::from)?;

        let mut out = Vec::new();
        for r in rows {
            let t = r.map_err(StoreError::from)?;
            if filters.tags_any.is_some() && !filters.matches(&t) {
                continue;
            }
            out.push(t);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Hybrid ranking: `score = alpha * cosine + (1 - alpha) * recency`.
    pub fn semantic_search(
        &self,
        query_vec: &[f32],
        filters: &ThoughtFilters,
        limit: usize,
        alpha: f64,
        max_candidates: usize,
    ) -> ThoughtMemoryResult<Vec<ScoredThought>> {
        if query_vec.len() != self.embedding_dim {
            return Err(ThoughtMemoryError::validation(format!(
                "query vector dimension {} does not match store dimension {}",
                query_vec.len(),
                self.embedding_dim
            )));
        }
        let candidate_k = std::cmp::max(limit * 10, std::cmp::min(max_candidates, 1000));

        let candidates = {
            let guard = self.inner.lock().unwrap();
            guard.vector_index.search(query_vec, candidate_k)?
        };
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        for (id, score) in &candidates {
            if let Some(t) = self.get_thought_by_id(id)? {
                if filters.matches(&t) {
                    rows.push((t, *score as f64));
                }
            }
        }
        Ok(rank_scored(&rows, alpha, limit))
    }

    /// Lineage-scoped recall with optional graph-hop expansion (§4.3).
    pub fn recall_from_prior_sessions(
        &self,
        query_vec: &[f32],
        current_session_id: &str,
        graph: Option<&ThoughtGraph>,
        limit: usize,
        alpha: f64,
        graph_hops: usize,
    ) -> ThoughtMemoryResult<Vec<ScoredThought>> {
        let ancestors: HashSet<String> = self
            .get_session_lineage(current_session_id, false)?
            .into_iter()
            .collect();
        if ancestors.is_empty() {
            return Ok(Vec::new());
        }

        let widened_limit = std::cmp::max(30, limit * 4);
        let wide_hits = self.semantic_search(query_vec, &ThoughtFilters::default(), widened_limit, alpha, 1000)?;
        let mut seeds: Vec<ScoredThought> = wide_hits
            .into_iter()
            .filter(|hit| ancestors.contains(&hit.thought.session_id))
            .collect();

        let mut merged: std::collections::HashMap<ThoughtId, ScoredThought> = std::collections::HashMap::new();
        for hit in seeds.drain(..) {
            merged
                .entry(hit.thought.id.clone())
                .and_modify(|existing| {
                    if hit.score > existing.score {
                        *existing = hit.clone();
                    }
                })
                .or_insert(hit);
        }

        if let (Some(graph), true) = (graph, graph_hops > 0) {
            let mut top_seeds: Vec<_> = merged.values().cloned().collect();
            top_seeds.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            top_seeds.truncate(5);

            for seed in &top_seeds {
                let neighbor_ids = graph.neighbors(&seed.thought.id, graph_hops, None, 25)?;
                for nid in neighbor_ids {
                    let Some(thought) = self.get_thought_by_id(&nid)? else {
                        continue;
                    };
                    if !ancestors.contains(&thought.session_id) {
                        continue;
                    }
                    let scored = score_by_cosine(&thought, query_vec, alpha, Utc::now(), 1.0);
                    let decayed = ScoredThought {
                        thought: scored.thought,
                        semantic_score: scored.semantic_score * 0.85,
                        recency_score: scored.recency_score,
                        score: scored.score * 0.85,
                    };
                    merged
                        .entry(nid)
                        .and_modify(|existing| {
                            if decayed.score > existing.score {
                                *existing = decayed.clone();
                            }
                        })
                        .or_insert(decayed);
                }
            }
        }

        let mut out: Vec<ScoredThought> = merged.into_values().collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(limit);
        Ok(out)
    }

    // ---- async dispatch wrappers (§5, §10) -------------------------------

    pub async fn astore(self: &Arc<Self>, thought: Thought) -> ThoughtMemoryResult<Thought> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.store(thought))
            .await
            .expect("astore worker thread panicked")
    }

    pub async fn abatch_store(self: &Arc<Self>, thoughts: Vec<Thought>) -> ThoughtMemoryResult<Vec<Thought>> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.batch_store(thoughts))
            .await
            .expect("abatch_store worker thread panicked")
    }

    pub async fn aretrieve(self: &Arc<Self>, filters: ThoughtFilters, limit: usize) -> ThoughtMemoryResult<Vec<Thought>> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.retrieve(&filters, limit))
            .await
            .expect("aretrieve worker thread panicked")
    }

    pub async fn acreate_session(
        self: &Arc<Self>,
        session_id: String,
        parent_session_id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> ThoughtMemoryResult<()> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            this.create_session(&session_id, parent_session_id.as_deref(), metadata)
        })
        .await
        .expect("acreate_session worker thread panicked")
    }
}

fn resolve_vector_backend(backend: VectorBackendKind, dimension: usize) -> Box<dyn VectorIndex> {
    match backend {
        VectorBackendKind::Dense => Box::new(DenseVectorIndex::new(dimension)),
        VectorBackendKind::Auto => {
            #[cfg(feature = "embeddings")]
            {
                match crate::vector_index::SqliteVecIndex::open_in_memory(dimension) {
                    Ok(idx) => return Box::new(idx),
                    Err(e) => {
                        tracing::warn!(error = %e, "sqlite-vec backend unavailable, degrading to dense index");
                    }
                }
            }
            Box::new(DenseVectorIndex::new(dimension))
        }
        #[cfg(feature = "embeddings")]
        VectorBackendKind::SqliteVec => match crate::vector_index::SqliteVecIndex::open_in_memory(dimension) {
            Ok(idx) => Box::new(idx),
            Err(_) => Box::new(DenseVectorIndex::new(dimension)),
        },
    }
}

/// Blend a precomputed semantic score (the vector index's own normalized
/// similarity, §4.3 — never recomputed from raw vectors) with recency.
fn blend_score(thought: &Thought, semantic_score: f64, alpha: f64, now: DateTime<Utc>, max_age: f64) -> ScoredThought {
    let age = (now - thought.timestamp_utc).num_milliseconds().max(0) as f64 / 1000.0;
    let recency_score = 1.0 - (age / max_age.max(1.0));
    let score = alpha * semantic_score + (1.0 - alpha) * recency_score;
    ScoredThought {
        thought: thought.clone(),
        semantic_score,
        recency_score,
        score,
    }
}

/// Rank rows already carrying the vector index's semantic score (used by
/// `semantic_search`, which sources candidates — and their scores — from
/// the index rather than recomputing similarity here).
fn rank_scored(rows: &[(Thought, f64)], alpha: f64, limit: usize) -> Vec<ScoredThought> {
    if rows.is_empty() {
        return Vec::new();
    }
    let now = Utc::now();
    let max_age = rows
        .iter()
        .map(|(t, _)| (now - t.timestamp_utc).num_milliseconds().max(0) as f64 / 1000.0)
        .fold(1.0_f64, f64::max);

    let mut scored: Vec<ScoredThought> = rows
        .iter()
        .map(|(t, sem)| blend_score(t, *sem, alpha, now, max_age))
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// Score a thought not sourced from the vector index (the graph-hop
/// expansion path in `recall_from_prior_sessions`, where there is no index
/// candidate score to reuse) by computing cosine similarity directly.
fn score_by_cosine(thought: &Thought, query: &[f32], alpha: f64, now: DateTime<Utc>, max_age: f64) -> ScoredThought {
    let semantic_score = cosine_similarity(query, &thought.embedding_vector);
    blend_score(thought, semantic_score, alpha, now, max_age)
}

fn f32_vec_to_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

fn blob_to_f32_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn row_to_thought(row: &rusqlite::Row) -> rusqlite::Result<Thought> {
    let timestamp_str: String = row.get(1)?;
    let tags_json: String = row.get(5)?;
    let blob: Vec<u8> = row.get(9)?;
    let embedding_dim: i64 = row.get(8)?;

    let timestamp_utc = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(Thought {
        id: ThoughtId::from_string(row.get::<_, String>(0)?),
        timestamp_utc,
        session_id: row.get(2)?,
        category: row.get(3)?,
        confidence: row.get(4)?,
        tags,
        raw_text: row.get(6)?,
        cleaned_text: row.get(7)?,
        embedding_vector: blob_to_f32_vec(&blob),
        embedding_dim: embedding_dim as usize,
    })
}

fn fetch_thought_row(conn: &Connection, id: &str) -> rusqlite::Result<Option<Thought>> {
    conn.query_row(
        "SELECT id, timestamp_utc, session_id, category, confidence, tags_json, \
                raw_text, cleaned_text, embedding_dim, embedding_blob FROM thoughts WHERE id = ?1",
        params![id],
        row_to_thought,
    )
    .optional()
}

fn query_all_vectors(conn: &Connection) -> rusqlite::Result<Vec<(ThoughtId, Vec<f32>)>> {
    let mut stmt = conn.prepare("SELECT id, embedding_blob FROM thoughts")?;
    let rows = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let blob: Vec<u8> = row.get(1)?;
        Ok((ThoughtId::from_string(id), blob_to_f32_vec(&blob)))
    })?;
    rows.collect()
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            parent_session_id TEXT,
            created_at_utc TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        );
        CREATE TABLE IF NOT EXISTS thoughts (
            id TEXT PRIMARY KEY,
            timestamp_utc TEXT NOT NULL,
            session_id TEXT NOT NULL,
            category TEXT NOT NULL,
            confidence REAL NOT NULL,
            tags_json TEXT NOT NULL DEFAULT '[]',
            raw_text TEXT NOT NULL,
            cleaned_text TEXT NOT NULL,
            embedding_dim INTEGER NOT NULL,
            embedding_blob BLOB NOT NULL,
            payload_json TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_thoughts_session ON thoughts(session_id);
        CREATE INDEX IF NOT EXISTS idx_thoughts_category ON thoughts(category);
        CREATE INDEX IF NOT EXISTS idx_thoughts_confidence ON thoughts(confidence);
        CREATE INDEX IF NOT EXISTS idx_thoughts_timestamp ON thoughts(timestamp_utc);
        CREATE TABLE IF NOT EXISTS thought_graph_nodes (
            thought_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            timestamp_utc TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        );
        CREATE TABLE IF NOT EXISTS thought_graph_edges (
            edge_id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            relation TEXT NOT NULL,
            weight REAL NOT NULL,
            created_at_utc TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_edges_source ON thought_graph_edges(source_id);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON thought_graph_edges(target_id);
        CREATE INDEX IF NOT EXISTS idx_edges_relation ON thought_graph_edges(relation);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedder, HashEmbedder};

    fn store_with(dim: usize) -> ThoughtStore {
        ThoughtStore::open_in_memory(dim, VectorBackendKind::Dense).unwrap()
    }

    fn thought(session: &str, text: &str, vector: Vec<f32>) -> Thought {
        Thought::new(None, session, "reasoning", 0.9, vec![], text, text, vector).unwrap()
    }

    #[test]
    fn round_trip_store_and_get() {
        let store = store_with(4);
        let t = thought("s1", "hello", vec![1.0, 0.0, 0.0, 0.0]);
        let stored = store.store(t.clone()).unwrap();
        let fetched = store.get_thought_by_id(&stored.id).unwrap().unwrap();
        assert_eq!(fetched.cleaned_text, t.cleaned_text);
        assert_eq!(fetched.embedding_vector, t.embedding_vector);
    }

    #[test]
    fn batch_atomicity_rolls_back_on_dimension_mismatch() {
        let store = store_with(4);
        let valid = thought("s1", "ok", vec![1.0, 0.0, 0.0, 0.0]);
        let mut invalid = thought("s1", "bad", vec![1.0, 0.0, 0.0, 0.0]);
        invalid.embedding_dim = 3;
        invalid.embedding_vector = vec![1.0, 0.0, 0.0];

        let result = store.batch_store(vec![valid, invalid]);
        assert!(result.is_err());
        assert!(store.retrieve(&ThoughtFilters::default(), 10).unwrap().is_empty());
    }

    #[test]
    fn hybrid_ranking_orthogonal_vectors() {
        let store = store_with(4);
        store.store(thought("s1", "a", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        store.store(thought("s1", "b", vec![0.0, 1.0, 0.0, 0.0])).unwrap();

        let results = store
            .semantic_search(&[1.0, 0.0, 0.0, 0.0], &ThoughtFilters::default(), 10, 1.0, 1000)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score > results[1].score);
        assert_eq!(results[0].thought.cleaned_text, "a");
    }

    #[test]
    fn ranking_is_monotonically_non_increasing() {
        let store = store_with(8);
        let embedder = HashEmbedder::new(8);
        for text in ["alpha", "beta", "gamma", "delta"] {
            store.store(thought("s1", text, embedder.embed(text))).unwrap();
        }
        let results = store
            .semantic_search(&embedder.embed("alpha"), &ThoughtFilters::default(), 10, 0.7, 1000)
            .unwrap();
        for w in results.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }

    #[test]
    fn session_lineage_has_no_cycle() {
        let store = store_with(4);
        store.create_session("root", None, None).unwrap();
        store.create_session("child", Some("root"), None).unwrap();
        let lineage = store.get_session_lineage("child", false).unwrap();
        assert_eq!(lineage, vec!["root".to_string()]);
    }

    #[test]
    fn create_session_last_writer_wins_on_parent() {
        let store = store_with(4);
        store.create_session("root-a", None, None).unwrap();
        store.create_session("root-b", None, None).unwrap();
        store.create_session("child", Some("root-a"), None).unwrap();
        store.create_session("child", Some("root-b"), None).unwrap();
        assert_eq!(store.get_session_parent("child").unwrap(), Some("root-b".to_string()));
    }
}
