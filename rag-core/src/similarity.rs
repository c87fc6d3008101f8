//! Similarity functions used to rank stored vectors against a query.

use serde::{Deserialize, Serialize};

/// How a query vector is compared with stored vectors.
///
/// Every metric yields a similarity where higher means more relevant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine of the angle between the vectors, in `[-1, 1]`.
    #[default]
    Cosine,
    /// Raw dot product; equals cosine for unit-length vectors.
    DotProduct,
    /// `1 / (1 + d)` where `d` is the Euclidean distance, in `(0, 1]`.
    Euclidean,
}

impl DistanceMetric {
    /// Score `a` against `b`. Both slices must have the same length.
    pub fn similarity(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::DotProduct => dot(a, b),
            DistanceMetric::Euclidean => 1.0 / (1.0 + euclidean_distance_squared(a, b).sqrt()),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = magnitude(a);
    let norm_b = magnitude(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let s = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_minus_one() {
        let s = cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]);
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn euclidean_identical_vectors_score_one() {
        let s = DistanceMetric::Euclidean.similarity(&[0.5, 0.5], &[0.5, 0.5]);
        assert_eq!(s, 1.0);
        let far = DistanceMetric::Euclidean.similarity(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((far - 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn dot_product_is_unnormalised() {
        assert_eq!(DistanceMetric::DotProduct.similarity(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }
}
