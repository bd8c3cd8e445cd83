//! Embedder capability and vector utilities.
//!
//! Defines the [`Embedder`] trait that turns buffered lines into vectors,
//! plus the vector helpers used for cosine similarity. Concrete providers (OpenAI,
//! Ollama, fastembed) live in the `logmine` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Batch text embedding.
///
/// `embed` returns one vector per input text, in input order, all of the
/// same dimension. From the pipeline's point of view it is a single
/// blocking call; implementations may batch or parallelize internally.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `texts`, preserving order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Whether embeddings can be computed at all. A disabled embedder turns
    /// the clusterer into a pass-through for matched records only.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Scale `v` to unit length. Zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Full pairwise cosine similarity matrix, row-major.
pub fn similarity_matrix(vectors: &[&[f32]]) -> Vec<Vec<f32>> {
    let unit: Vec<Vec<f32>> = vectors.iter().map(|v| normalize(v)).collect();
    unit.iter()
        .map(|a| unit.iter().map(|b| dot(a, b)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_keeps_zero_vector() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
        let n = normalize(&[3.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 1e-6 && (n[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_matrix_is_cosine() {
        let a = [1.0f32, 0.0];
        let b = [1.0f32, 1.0];
        let c = [-2.0f32, 0.0];
        let d = [0.0f32, 3.0];
        let m = similarity_matrix(&[&a, &b, &c, &d]);
        assert!((m[0][0] - 1.0).abs() < 1e-6);
        assert!((m[0][1] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((m[1][0] - m[0][1]).abs() < 1e-6);
        assert!((m[0][2] + 1.0).abs() < 1e-6);
        assert!(m[0][3].abs() < 1e-6);
    }

    #[test]
    fn test_similarity_matrix_zero_vector_row() {
        let zero = [0.0f32, 0.0];
        let a = [1.0f32, 0.0];
        let m = similarity_matrix(&[&zero, &a]);
        assert_eq!(m[0], vec![0.0, 0.0]);
    }
}
