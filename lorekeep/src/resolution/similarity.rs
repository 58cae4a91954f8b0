//! Name similarity measures used for fuzzy matching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which similarity measure the resolver uses for fuzzy matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Normalized Levenshtein ratio
    #[default]
    EditDistance,
    /// Cosine similarity of name embeddings
    Embedding,
    /// The larger of the two
    Max,
}

/// Produces embeddings for entity names.
#[async_trait]
pub trait NameEmbedder: Send + Sync + std::fmt::Debug {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Levenshtein distance over chars.
pub fn levenshtein_distance(str1: &str, str2: &str) -> usize {
    let chars1: Vec<char> = str1.chars().collect();
    let chars2: Vec<char> = str2.chars().collect();
    let len2 = chars2.len();

    // Two rows are enough; `prev[j]` is the distance between chars1[..i-1] and chars2[..j].
    let mut prev: Vec<usize> = (0..=len2).collect();
    let mut curr = vec![0; len2 + 1];

    for (i, c1) in chars1.iter().enumerate() {
        curr[0] = i + 1;
        for (j, c2) in chars2.iter().enumerate() {
            let cost = usize::from(c1 != c2);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[len2]
}

/// `1 - distance / max_len`, in [0, 1]. Two empty strings are identical.
pub fn edit_similarity(str1: &str, str2: &str) -> f32 {
    let max_len = str1.chars().count().max(str2.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(str1, str2) as f32 / max_len as f32
}

/// Cosine similarity, mapped to 0 for mismatched or zero vectors and clamped to [0, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        crate::confidence::clamp_unit(dot_product / (norm_a * norm_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
        assert_eq!(levenshtein_distance("zoë", "zoe"), 1);
    }

    #[test]
    fn test_edit_similarity() {
        assert_eq!(edit_similarity("", ""), 1.0);
        assert!((edit_similarity("postgres", "postgresql") - 0.8).abs() < 1e-6);
        assert!(edit_similarity("rust", "java") < 0.5);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }
}
