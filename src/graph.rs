//! Thought Graph: a directed, labeled, weighted multigraph over thought ids.
//!
//! Shares the store's connection and mutex (§9 Design Notes) rather than
//! owning a second lock — `ThoughtGraph` holds a non-owning `Arc<ThoughtStore>`
//! back-reference and never shadows thought records.
//!
//! Grounded on the teacher's `graph/edge.rs`/`graph/node.rs` newtype-id idiom
//! and `storage/sqlite.rs`'s BFS-over-SQL traversal shape; algorithmic
//! semantics (temporal-link lookup, semantic-neighbor threshold, fetch caps,
//! connected-components clustering) are grounded on
//! `examples/original_source/thought_wrapper/tms/graph.py`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::{StoreError, ThoughtMemoryError, ThoughtMemoryResult};
use crate::model::{relation, ThoughtFilters, ThoughtId};
use crate::store::ThoughtStore;

/// Default similarity threshold for `add_thought`'s semantic-neighbor linking.
pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.80;

pub struct ThoughtGraph {
    store: Arc<ThoughtStore>,
}

impl ThoughtGraph {
    pub fn new(store: Arc<ThoughtStore>) -> Self {
        Self { store }
    }

    /// Upsert a thought into the graph node space, optionally storing it,
    /// linking it to its temporal predecessor, and/or linking it to its
    /// semantic neighbors. All edges for one call commit atomically.
    #[allow(clippy::too_many_arguments)]
    pub fn add_thought(
        &self,
        thought: &crate::model::Thought,
        store_if_missing: bool,
        semantic_neighbors: usize,
        semantic_threshold: Option<f64>,
        temporal_link: bool,
    ) -> ThoughtMemoryResult<()> {
        if store_if_missing && self.store.get_thought_by_id(&thought.id)?.is_none() {
            self.store.store(thought.clone())?;
        }

        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO thought_graph_nodes(thought_id, session_id, timestamp_utc, metadata_json) \
                 VALUES (?1, ?2, ?3, '{}') \
                 ON CONFLICT(thought_id) DO UPDATE SET \
                     session_id = excluded.session_id, timestamp_utc = excluded.timestamp_utc",
                params![
                    thought.id.as_str(),
                    thought.session_id,
                    thought.timestamp_utc.to_rfc3339()
                ],
            )
            .map_err(StoreError::from)?;
            Ok(())
        })?;

        let mut pending: Vec<(ThoughtId, ThoughtId, &str, f64)> = Vec::new();

        if temporal_link {
            if let Some(prev) = self.most_recent_earlier_in_session(&thought.session_id, thought.timestamp_utc, &thought.id)? {
                pending.push((prev, thought.id.clone(), relation::TEMPORAL_SUCCESSOR, 1.0));
            }
        }

        if semantic_neighbors > 0 {
            let threshold = semantic_threshold.unwrap_or(DEFAULT_SEMANTIC_THRESHOLD);
            let hits = self.store.semantic_search(
                &thought.embedding_vector,
                &ThoughtFilters::default(),
                semantic_neighbors + 5,
                1.0,
                1000,
            )?;
            for hit in hits {
                if hit.thought.id == thought.id {
                    continue;
                }
                if hit.semantic_score >= threshold {
                    pending.push((hit.thought.id, thought.id.clone(), relation::SEMANTIC_SIMILARITY, hit.semantic_score));
                }
            }
        }

        if !pending.is_empty() {
            self.link_many_str(&pending)?;
        }
        tracing::debug!(thought_id = thought.id.as_str(), "add_thought committed");
        Ok(())
    }

    fn most_recent_earlier_in_session(
        &self,
        session_id: &str,
        before: DateTime<Utc>,
        exclude: &ThoughtId,
    ) -> ThoughtMemoryResult<Option<ThoughtId>> {
        self.store.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT thought_id FROM thought_graph_nodes \
                     WHERE session_id = ?1 AND timestamp_utc <= ?2 AND thought_id != ?3 \
                     ORDER BY timestamp_utc DESC LIMIT 1",
                    params![session_id, before.to_rfc3339(), exclude.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)?;
            Ok(found.map(ThoughtId::from_string))
        })
    }

    /// Self-edges silently ignored; negative weights rejected.
    pub fn link(
        &self,
        source: &ThoughtId,
        target: &ThoughtId,
        relation: &str,
        weight: f64,
        bidirectional: bool,
    ) -> ThoughtMemoryResult<()> {
        if weight < 0.0 {
            return Err(ThoughtMemoryError::validation("edge weight must be >= 0"));
        }
        if source == target {
            return Ok(());
        }
        let mut edges = vec![(source.clone(), target.clone(), relation, weight)];
        if bidirectional {
            edges.push((target.clone(), source.clone(), relation, weight));
        }
        self.link_many_str(&edges)
    }

    /// One transaction; partial failure rolls back all. Self-edges are
    /// dropped before the transaction opens; negative weights reject the
    /// whole batch.
    pub fn link_many(&self, edges: &[(ThoughtId, ThoughtId, String, f64)]) -> ThoughtMemoryResult<()> {
        let borrowed: Vec<(ThoughtId, ThoughtId, &str, f64)> = edges
            .iter()
            .map(|(s, t, r, w)| (s.clone(), t.clone(), r.as_str(), *w))
            .collect();
        self.link_many_str(&borrowed)
    }

    fn link_many_str(&self, edges: &[(ThoughtId, ThoughtId, &str, f64)]) -> ThoughtMemoryResult<()> {
        for (_, _, _, w) in edges {
            if *w < 0.0 {
                return Err(ThoughtMemoryError::validation("edge weight must be >= 0"));
            }
        }
        let filtered: Vec<_> = edges.iter().filter(|(s, t, _, _)| s != t).collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.store.with_conn(|conn| {
            let now = Utc::now();
            let tx = conn.unchecked_transaction().map_err(StoreError::from)?;
            for (source, target, relation, weight) in &filtered {
                tx.execute(
                    "INSERT INTO thought_graph_edges(source_id, target_id, relation, weight, created_at_utc, metadata_json) \
                     VALUES (?1, ?2, ?3, ?4, ?5, '{}')",
                    params![source.as_str(), target.as_str(), relation, weight, now.to_rfc3339()],
                )
                .map_err(StoreError::from)?;
            }
            tx.commit().map_err(StoreError::from)?;
            Ok(())
        })
    }

    /// BFS in edge direction, bounded per-node out-degree fetch cap
    /// `max(remaining*2, 8)` for deterministic latency. Returns the
    /// deduplicated set of reachable node ids within `hops`.
    pub fn neighbors(
        &self,
        id: &ThoughtId,
        hops: usize,
        relations: Option<&[String]>,
        limit: usize,
    ) -> ThoughtMemoryResult<Vec<ThoughtId>> {
        let mut visited = HashSet::new();
        visited.insert(id.clone());
        let mut frontier = vec![id.clone()];
        let mut out: Vec<ThoughtId> = Vec::new();

        for _ in 0..hops {
            if out.len() >= limit {
                break;
            }
            let mut next_frontier = Vec::new();
            for node in &frontier {
                let remaining = limit.saturating_sub(out.len());
                if remaining == 0 {
                    break;
                }
                let fetch_cap = std::cmp::max(remaining * 2, 8);
                let edges = self.fetch_outgoing(node, relations, fetch_cap)?;
                for target in edges {
                    if visited.insert(target.clone()) {
                        out.push(target.clone());
                        next_frontier.push(target);
                        if out.len() >= limit {
                            break;
                        }
                    }
                }
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }
        out.truncate(limit);
        Ok(out)
    }

    /// Fetches up to `limit` outgoing edges regardless of relation, then
    /// filters by `relations` in Rust — the cap bounds total per-node
    /// out-degree examined, not the count of matching edges.
    fn fetch_outgoing(
        &self,
        node: &ThoughtId,
        relations: Option<&[String]>,
        limit: usize,
    ) -> ThoughtMemoryResult<Vec<ThoughtId>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT target_id, relation FROM thought_graph_edges WHERE source_id = ?1 LIMIT ?2")
                .map_err(StoreError::from)?;
            let rows = stmt
                .query_map(params![node.as_str(), limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(StoreError::from)?;
            let mut out = Vec::new();
            for r in rows {
                let (target, edge_relation) = r.map_err(StoreError::from)?;
                if let Some(allowed) = relations {
                    if !allowed.iter().any(|rel| rel == &edge_relation) {
                        continue;
                    }
                }
                out.push(ThoughtId::from_string(target));
            }
            Ok(out)
        })
    }

    /// Bounded BFS enumerating simple (no-repeat) paths, up to `limit`
    /// paths of at most `max_depth` edges. Trivial `source == target`
    /// returns `[[source]]`.
    pub fn find_paths(
        &self,
        source: &ThoughtId,
        target: &ThoughtId,
        max_depth: usize,
        limit: usize,
        relations: Option<&[String]>,
    ) -> ThoughtMemoryResult<Vec<Vec<ThoughtId>>> {
        if source == target {
            return Ok(vec![vec![source.clone()]]);
        }

        let mut results = Vec::new();
        let mut queue: VecDeque<Vec<ThoughtId>> = VecDeque::new();
        queue.push_back(vec![source.clone()]);

        while let Some(path) = queue.pop_front() {
            if results.len() >= limit {
                break;
            }
            if path.len() as isize - 1 >= max_depth as isize {
                continue;
            }
            let last = path.last().unwrap();
            let next_ids = self.fetch_outgoing(last, relations, 64)?;
            for next in next_ids {
                if path.contains(&next) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(next.clone());
                if &next == target {
                    results.push(extended);
                    if results.len() >= limit {
                        break;
                    }
                } else {
                    queue.push_back(extended);
                }
            }
        }
        Ok(results)
    }

    /// Connected components over `semantic-similarity` edges treated
    /// undirected. This is the only clustering algorithm implemented —
    /// documented as canonical rather than a fallback (SPEC_FULL.md §9).
    pub fn cluster_by_topic(&self, min_cluster_size: usize) -> ThoughtMemoryResult<Vec<Vec<ThoughtId>>> {
        let min_cluster_size = min_cluster_size.max(1);
        let adjacency = self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT source_id, target_id FROM thought_graph_edges WHERE relation = ?1",
                )
                .map_err(StoreError::from)?;
            let rows = stmt
                .query_map(params![relation::SEMANTIC_SIMILARITY], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(StoreError::from)?;

            let mut adj: HashMap<String, HashSet<String>> = HashMap::new();
            for r in rows {
                let (a, b) = r.map_err(StoreError::from)?;
                adj.entry(a.clone()).or_default().insert(b.clone());
                adj.entry(b).or_default().insert(a);
            }
            Ok(adj)
        })?;

        let mut visited = HashSet::new();
        let mut clusters: Vec<Vec<String>> = Vec::new();

        for node in adjacency.keys() {
            if visited.contains(node) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::new();
            queue.push_back(node.clone());
            visited.insert(node.clone());
            while let Some(n) = queue.pop_front() {
                component.push(n.clone());
                if let Some(neighbors) = adjacency.get(&n) {
                    for nb in neighbors {
                        if visited.insert(nb.clone()) {
                            queue.push_back(nb.clone());
                        }
                    }
                }
            }
            if component.len() >= min_cluster_size {
                component.sort();
                clusters.push(component);
            }
        }
        clusters.sort_by(|a, b| a.first().cmp(&b.first()));

        Ok(clusters
            .into_iter()
            .map(|c| c.into_iter().map(ThoughtId::from_string).collect())
            .collect())
    }

    /// Nodes with `start <= timestamp <= end`, optionally filtered by
    /// session, ordered by timestamp ascending.
    pub fn temporal_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        session: Option<&str>,
        limit: usize,
    ) -> ThoughtMemoryResult<Vec<ThoughtId>> {
        self.store.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT thought_id FROM thought_graph_nodes WHERE timestamp_utc >= ?1 AND timestamp_utc <= ?2",
            );
            if session.is_some() {
                sql.push_str(" AND session_id = ?3");
            }
            sql.push_str(" ORDER BY timestamp_utc ASC LIMIT ?4");

            let mut stmt = conn.prepare(&sql).map_err(StoreError::from)?;
            let rows = if let Some(s) = session {
                stmt.query_map(
                    params![start.to_rfc3339(), end.to_rfc3339(), s, limit as i64],
                    |row| row.get::<_, String>(0),
                )
                .map_err(StoreError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::from)?
            } else {
                stmt.query_map(
                    params![start.to_rfc3339(), end.to_rfc3339(), limit as i64],
                    |row| row.get::<_, String>(0),
                )
                .map_err(StoreError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::from)?
            };
            Ok(rows.into_iter().map(ThoughtId::from_string).collect())
        })
    }

    // ---- async dispatch wrappers (§5, §10) -------------------------------

    pub async fn aadd_thought(
        self: Arc<Self>,
        thought: crate::model::Thought,
        store_if_missing: bool,
        semantic_neighbors: usize,
        semantic_threshold: Option<f64>,
        temporal_link: bool,
    ) -> ThoughtMemoryResult<()> {
        tokio::task::spawn_blocking(move || {
            self.add_thought(&thought, store_if_missing, semantic_neighbors, semantic_threshold, temporal_link)
        })
        .await
        .expect("aadd_thought worker thread panicked")
    }

    pub async fn aneighbors(
        self: Arc<Self>,
        id: ThoughtId,
        hops: usize,
        relations: Option<Vec<String>>,
        limit: usize,
    ) -> ThoughtMemoryResult<Vec<ThoughtId>> {
        tokio::task::spawn_blocking(move || self.neighbors(&id, hops, relations.as_deref(), limit))
            .await
            .expect("aneighbors worker thread panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Thought;
    use crate::vector_index::VectorBackendKind;

    fn thought(session: &str, text: &str, vector: Vec<f32>) -> Thought {
        Thought::new(None, session, "reasoning", 0.9, vec![], text, text, vector).unwrap()
    }

    #[test]
    fn self_edges_are_dropped() {
        let store = Arc::new(ThoughtStore::open_in_memory(4, VectorBackendKind::Dense).unwrap());
        let graph = ThoughtGraph::new(store);
        let id = ThoughtId::from_string("a");
        graph.link(&id, &id, relation::EXPLICIT_REFERENCE, 1.0, false).unwrap();
        let paths = graph.find_paths(&id, &id, 3, 5, None).unwrap();
        assert_eq!(paths, vec![vec![id]]);
    }

    #[test]
    fn negative_weight_rejected() {
        let store = Arc::new(ThoughtStore::open_in_memory(4, VectorBackendKind::Dense).unwrap());
        let graph = ThoughtGraph::new(store);
        let a = ThoughtId::from_string("a");
        let b = ThoughtId::from_string("b");
        let err = graph.link(&a, &b, relation::EXPLICIT_REFERENCE, -1.0, false);
        assert!(err.is_err());
    }

    #[test]
    fn temporal_link_connects_same_session_predecessor() {
        let store = Arc::new(ThoughtStore::open_in_memory(4, VectorBackendKind::Dense).unwrap());
        let graph = ThoughtGraph::new(store.clone());

        let t1 = store.store(thought("s1", "first", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        graph.add_thought(&t1, false, 0, None, true).unwrap();
        let t2 = store.store(thought("s1", "second", vec![0.0, 1.0, 0.0, 0.0])).unwrap();
        graph.add_thought(&t2, false, 0, None, true).unwrap();

        let neighbors = graph.neighbors(&t1.id, 1, None, 10).unwrap();
        assert_eq!(neighbors, vec![t2.id]);
    }

    #[test]
    fn cluster_suppresses_below_min_size() {
        let store = Arc::new(ThoughtStore::open_in_memory(4, VectorBackendKind::Dense).unwrap());
        let graph = ThoughtGraph::new(store);
        let a = ThoughtId::from_string("a");
        let b = ThoughtId::from_string("b");
        graph.link(&a, &b, relation::SEMANTIC_SIMILARITY, 0.9, false).unwrap();
        let clusters = graph.cluster_by_topic(3).unwrap();
        assert!(clusters.is_empty());
        let clusters = graph.cluster_by_topic(2).unwrap();
        assert_eq!(clusters.len(), 1);
    }
}
