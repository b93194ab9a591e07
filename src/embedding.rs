//! Embedder interface: maps text to a fixed-dimension unit vector.
//!
//! `HashEmbedder` is deterministic and offline, used as the default and in
//! tests. `ExternalEmbedder` adapts any externally-sourced vector (e.g. an
//! ML model's raw output) to the store's dimension. A production
//! `fastembed`-backed embedder is available behind the `embeddings` feature,
//! grounded on the teacher's `adapter/embedding.rs::FastEmbedEmbedder`.

use sha2::{Digest, Sha256};

/// Trait for embedding text into a fixed-dimension unit vector.
pub trait Embedder: Send + Sync {
    /// The dimensionality of vectors this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed `text` into a vector of length `dimension()`, L2-normalized.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic, offline embedder. Generates `dimension / 16` blocks of
/// 16-bit unsigned integers from `SHA-256(text || block_index_LE32)`, maps
/// each into `[-1, 1]`, truncates/pads to `dimension`, and L2-normalizes.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be positive");
        Self { dimension }
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return vec![0.0; self.dimension];
        }

        let blocks_needed = self.dimension.div_ceil(16);
        let mut values: Vec<f32> = Vec::with_capacity(blocks_needed * 16);

        for block_index in 0..blocks_needed {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update((block_index as u32).to_le_bytes());
            let digest = hasher.finalize();

            for chunk in digest.chunks_exact(2) {
                let u = u16::from_le_bytes([chunk[0], chunk[1]]);
                let mapped = (u as f32 / 65535.0) * 2.0 - 1.0;
                values.push(mapped);
            }
        }

        values.truncate(self.dimension);
        l2_normalize(&mut values);
        values
    }
}

/// Adapts an externally-produced vector (e.g. from an ML model call that
/// happens outside the crate) to this embedder's fixed dimension: pads with
/// zeros or truncates, then renormalizes.
pub struct ExternalEmbedder<F> {
    dimension: usize,
    producer: F,
}

impl<F> ExternalEmbedder<F>
where
    F: Fn(&str) -> Vec<f32> + Send + Sync,
{
    pub fn new(dimension: usize, producer: F) -> Self {
        Self { dimension, producer }
    }
}

impl<F> Embedder for ExternalEmbedder<F>
where
    F: Fn(&str) -> Vec<f32> + Send + Sync,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = (self.producer)(text);
        v.resize(self.dimension, 0.0);
        l2_normalize(&mut v);
        v
    }
}

pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot as f64
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::Embedder;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Production embedder backed by `fastembed` (ONNX Runtime). Wraps
    /// `TextEmbedding` in a `Mutex` because its `embed` method requires
    /// `&mut self`, while `Embedder` uses `&self`.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
        dimension: usize,
    }

    impl FastEmbedEmbedder {
        pub fn new(model: EmbeddingModel, dimension: usize) -> Result<Self, String> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options).map_err(|e| e.to_string())?;
            Ok(Self {
                model: Mutex::new(embedding),
                dimension,
            })
        }

        pub fn default_model() -> Result<Self, String> {
            Self::new(EmbeddingModel::NomicEmbedTextV15, 768)
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed(&self, text: &str) -> Vec<f32> {
            let mut model = self.model.lock().unwrap();
            let mut embeddings = model
                .embed(vec![text], None)
                .expect("fastembed inference failed");
            let mut v = embeddings.pop().unwrap_or_default();
            v.resize(self.dimension, 0.0);
            super::l2_normalize(&mut v);
            v
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_unit_norm() {
        let e = HashEmbedder::new(32);
        let v1 = e.embed("hello world");
        let v2 = e.embed("hello world");
        assert_eq!(v1, v2);
        assert_eq!(v1.len(), 32);
        let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn different_text_different_vector() {
        let e = HashEmbedder::new(32);
        assert_ne!(e.embed("a"), e.embed("b"));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashEmbedder::new(16);
        assert_eq!(e.embed(""), vec![0.0; 16]);
    }

    #[test]
    fn external_embedder_pads_and_renormalizes() {
        let e = ExternalEmbedder::new(8, |_text: &str| vec![1.0, 1.0, 1.0]);
        let v = e.embed("x");
        assert_eq!(v.len(), 8);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
