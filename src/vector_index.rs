//! Vector Index: inner-product top-k over L2-normalized float32 vectors.
//!
//! Polymorphic over `{build, upsert?, search}` (§9 Design Notes): `upsert` is
//! optional — callers detect the backend's capability and rebuild when it is
//! unsupported, rather than treating the trait as a capability hierarchy.

use crate::embedding::l2_normalize;
use crate::error::{ThoughtMemoryError, ThoughtMemoryResult};
use crate::model::ThoughtId;

/// Whether a backend supports in-place upsert, used by callers (the store)
/// to decide between incremental update and full rebuild.
pub trait VectorIndex: Send + Sync {
    /// Replace the index contents wholesale.
    fn build(&mut self, items: &[(ThoughtId, Vec<f32>)]) -> ThoughtMemoryResult<()>;

    /// Insert or update a single id's vector, if supported.
    /// Returns `Ok(false)` when the backend doesn't support upsert — the
    /// caller must fall back to `build` over the full candidate set.
    fn upsert(&mut self, id: &ThoughtId, vector: &[f32]) -> ThoughtMemoryResult<bool>;

    /// Inner product against unit-normalized vectors, highest score first.
    /// The query is normalized by the index, not the caller.
    fn search(&self, query: &[f32], top_k: usize) -> ThoughtMemoryResult<Vec<(ThoughtId, f32)>>;

    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-major f32 matrix with growable capacity (doubles on overflow,
/// initial capacity 16). Supports in-place upsert.
pub struct DenseVectorIndex {
    dimension: usize,
    ids: Vec<ThoughtId>,
    // id -> row index, for upsert lookup.
    index_of: std::collections::HashMap<ThoughtId, usize>,
    data: Vec<f32>, // row-major, capacity rows * dimension
    capacity_rows: usize,
}

impl DenseVectorIndex {
    const INITIAL_CAPACITY: usize = 16;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            index_of: std::collections::HashMap::new(),
            data: vec![0.0; Self::INITIAL_CAPACITY * dimension],
            capacity_rows: Self::INITIAL_CAPACITY,
        }
    }

    fn ensure_capacity(&mut self, rows_needed: usize) {
        if rows_needed <= self.capacity_rows {
            return;
        }
        let mut new_capacity = self.capacity_rows.max(1);
        while new_capacity < rows_needed {
            new_capacity *= 2;
        }
        let mut new_data = vec![0.0; new_capacity * self.dimension];
        new_data[..self.data.len()].copy_from_slice(&self.data);
        self.data = new_data;
        self.capacity_rows = new_capacity;
    }

    fn row_mut(&mut self, row: usize) -> &mut [f32] {
        let start = row * self.dimension;
        &mut self.data[start..start + self.dimension]
    }

    fn row(&self, row: usize) -> &[f32] {
        let start = row * self.dimension;
        &self.data[start..start + self.dimension]
    }
}

impl VectorIndex for DenseVectorIndex {
    fn build(&mut self, items: &[(ThoughtId, Vec<f32>)]) -> ThoughtMemoryResult<()> {
        for (_, v) in items {
            if v.len() != self.dimension {
                return Err(ThoughtMemoryError::validation(format!(
                    "vector dimension {} does not match index dimension {}",
                    v.len(),
                    self.dimension
                )));
            }
        }
        self.ids.clear();
        self.index_of.clear();
        self.ensure_capacity(items.len().max(Self::INITIAL_CAPACITY));
        for (row, (id, vector)) in items.iter().enumerate() {
            let mut normalized = vector.clone();
            l2_normalize(&mut normalized);
            let dim = self.dimension;
            self.data[row * dim..row * dim + dim].copy_from_slice(&normalized);
            self.ids.push(id.clone());
            self.index_of.insert(id.clone(), row);
        }
        Ok(())
    }

    fn upsert(&mut self, id: &ThoughtId, vector: &[f32]) -> ThoughtMemoryResult<bool> {
        if vector.len() != self.dimension {
            return Err(ThoughtMemoryError::validation(format!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        let mut normalized = vector.to_vec();
        l2_normalize(&mut normalized);

        if let Some(&row) = self.index_of.get(id) {
            self.row_mut(row).copy_from_slice(&normalized);
        } else {
            let row = self.ids.len();
            self.ensure_capacity(row + 1);
            self.row_mut(row).copy_from_slice(&normalized);
            self.ids.push(id.clone());
            self.index_of.insert(id.clone(), row);
        }
        Ok(true)
    }

    fn search(&self, query: &[f32], top_k: usize) -> ThoughtMemoryResult<Vec<(ThoughtId, f32)>> {
        if query.len() != self.dimension {
            return Err(ThoughtMemoryError::validation(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }
        let mut normalized_query = query.to_vec();
        l2_normalize(&mut normalized_query);

        let mut scored: Vec<(ThoughtId, f32)> = (0..self.ids.len())
            .map(|row| {
                let dot: f32 = self
                    .row(row)
                    .iter()
                    .zip(normalized_query.iter())
                    .map(|(a, b)| a * b)
                    .sum();
                (self.ids[row].clone(), dot)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// sqlite-vec-backed persistent index (§4.3 External ANN backend), behind
/// the `embeddings` feature. Upsert is unsupported — the store must detect
/// this (via `upsert` returning `Ok(false)`) and fall back to `build`.
#[cfg(feature = "embeddings")]
pub mod sqlite_vec_backend {
    use super::*;
    use rusqlite::Connection;
    use sqlite_vec::sqlite3_vec_init;
    use std::sync::Once;

    fn register_vec_extension() {
        static INIT: Once = Once::new();
        INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        });
    }

    fn f32_slice_as_bytes(slice: &[f32]) -> &[u8] {
        unsafe { std::slice::from_raw_parts(slice.as_ptr() as *const u8, slice.len() * 4) }
    }

    /// Flat inner-product index over normalized vectors, persisted via a
    /// sqlite-vec `vec0` virtual table. Presence of the extension is
    /// detected at construction; `SqliteVecIndex::open` returning `Err`
    /// is the caller's signal to degrade to `DenseVectorIndex` (§7,
    /// Backend unavailability).
    pub struct SqliteVecIndex {
        conn: Connection,
        dimension: usize,
        len: usize,
    }

    impl SqliteVecIndex {
        pub fn open_in_memory(dimension: usize) -> ThoughtMemoryResult<Self> {
            register_vec_extension();
            let conn = Connection::open_in_memory()
                .map_err(|e| ThoughtMemoryError::BackendUnavailable(e.to_string()))?;
            Self::init(conn, dimension)
        }

        pub fn open(path: &std::path::Path, dimension: usize) -> ThoughtMemoryResult<Self> {
            register_vec_extension();
            let conn = Connection::open(path)
                .map_err(|e| ThoughtMemoryError::BackendUnavailable(e.to_string()))?;
            Self::init(conn, dimension)
        }

        fn init(conn: Connection, dimension: usize) -> ThoughtMemoryResult<Self> {
            conn.execute_batch(&format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS vec_thoughts USING vec0(\
                     thought_id TEXT PRIMARY KEY, embedding float[{dimension}])"
            ))
            .map_err(|e| ThoughtMemoryError::BackendUnavailable(e.to_string()))?;
            let len: i64 = conn
                .query_row("SELECT COUNT(*) FROM vec_thoughts", [], |row| row.get(0))
                .unwrap_or(0);
            Ok(Self {
                conn,
                dimension,
                len: len as usize,
            })
        }
    }

    impl VectorIndex for SqliteVecIndex {
        fn build(&mut self, items: &[(ThoughtId, Vec<f32>)]) -> ThoughtMemoryResult<()> {
            for (_, v) in items {
                if v.len() != self.dimension {
                    return Err(ThoughtMemoryError::validation(
                        "vector dimension mismatch for sqlite-vec index",
                    ));
                }
            }
            let tx = self
                .conn
                .transaction()
                .map_err(|e| ThoughtMemoryError::Storage(e.into()))?;
            tx.execute("DELETE FROM vec_thoughts", [])
                .map_err(|e| ThoughtMemoryError::Storage(e.into()))?;
            for (id, vector) in items {
                let mut normalized = vector.clone();
                l2_normalize(&mut normalized);
                let bytes = f32_slice_as_bytes(&normalized);
                tx.execute(
                    "INSERT INTO vec_thoughts(thought_id, embedding) VALUES (?1, ?2)",
                    rusqlite::params![id.as_str(), bytes],
                )
                .map_err(|e| ThoughtMemoryError::Storage(e.into()))?;
            }
            tx.commit().map_err(|e| ThoughtMemoryError::Storage(e.into()))?;
            self.len = items.len();
            Ok(())
        }

        fn upsert(&mut self, _id: &ThoughtId, _vector: &[f32]) -> ThoughtMemoryResult<bool> {
            // vec0 virtual tables do not support per-row upsert reliably
            // across versions; the store must rebuild instead (§4.3).
            Ok(false)
        }

        fn search(&self, query: &[f32], top_k: usize) -> ThoughtMemoryResult<Vec<(ThoughtId, f32)>> {
            if query.len() != self.dimension {
                return Err(ThoughtMemoryError::validation(
                    "query dimension mismatch for sqlite-vec index",
                ));
            }
            let mut normalized_query = query.to_vec();
            l2_normalize(&mut normalized_query);
            let bytes = f32_slice_as_bytes(&normalized_query);

            let mut stmt = self
                .conn
                .prepare(
                    "SELECT thought_id, distance FROM vec_thoughts \
                     WHERE embedding MATCH ?1 AND k = ?2",
                )
                .map_err(|e| ThoughtMemoryError::Storage(e.into()))?;

            let rows = stmt
                .query_map(rusqlite::params![bytes, top_k as i64], |row| {
                    let id: String = row.get(0)?;
                    let distance: f64 = row.get(1)?;
                    Ok((id, distance))
                })
                .map_err(|e| ThoughtMemoryError::Storage(e.into()))?;

            let mut out = Vec::new();
            for r in rows {
                let (id, distance) = r.map_err(|e| ThoughtMemoryError::Storage(e.into()))?;
                // Unit vectors: L2_dist^2 = 2(1 - cos_sim).
                let similarity = (1.0 - (distance * distance) / 2.0) as f32;
                out.push((ThoughtId::from_string(id), similarity));
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn len(&self) -> usize {
            self.len
        }
    }
}

#[cfg(feature = "embeddings")]
pub use sqlite_vec_backend::SqliteVecIndex;

/// Which backend a `ThoughtStore` should use for its vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorBackendKind {
    /// Prefer sqlite-vec when the `embeddings` feature is compiled in and
    /// the extension loads; otherwise degrade to dense without error.
    #[default]
    Auto,
    Dense,
    #[cfg(feature = "embeddings")]
    SqliteVec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_search_orders_by_similarity() {
        let mut idx = DenseVectorIndex::new(4);
        idx.build(&[
            (ThoughtId::from_string("a"), vec![1.0, 0.0, 0.0, 0.0]),
            (ThoughtId::from_string("b"), vec![0.0, 1.0, 0.0, 0.0]),
        ])
        .unwrap();

        let results = idx.search(&[1.0, 0.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(results[0].0.as_str(), "a");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn upsert_updates_existing_row() {
        let mut idx = DenseVectorIndex::new(3);
        idx.upsert(&ThoughtId::from_string("a"), &[1.0, 0.0, 0.0])
            .unwrap();
        idx.upsert(&ThoughtId::from_string("a"), &[0.0, 1.0, 0.0])
            .unwrap();
        assert_eq!(idx.len(), 1);
        let results = idx.search(&[0.0, 1.0, 0.0], 1).unwrap();
        assert!(results[0].1 > 0.99);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut idx = DenseVectorIndex::new(2);
        for i in 0..40 {
            idx.upsert(&ThoughtId::from_string(format!("id{i}")), &[1.0, 0.0])
                .unwrap();
        }
        assert_eq!(idx.len(), 40);
    }

    #[test]
    fn dimension_mismatch_is_validation_error() {
        let mut idx = DenseVectorIndex::new(4);
        let err = idx.upsert(&ThoughtId::from_string("a"), &[1.0, 0.0]);
        assert!(matches!(err, Err(ThoughtMemoryError::Validation(_))));
    }
}
