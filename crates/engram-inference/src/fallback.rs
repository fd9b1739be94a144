//! Deterministic fallback embeddings.
//!
//! When the embedding backend is down or times out, search degrades to a
//! hash-seeded embedding instead of failing the request. Quality drops
//! but the pipeline keeps returning keyword-ranked results.

use sha2::{Digest, Sha256};

use engram_core::Vector;

/// Produce a deterministic unit-length embedding for `text`.
///
/// Each whitespace token contributes weight to dimensions chosen by its
/// SHA-256 digest, so shared vocabulary still yields nonzero cosine
/// similarity between related texts. Identical input always yields an
/// identical vector.
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vector {
    let mut vector = vec![0.0f32; dimension.max(1)];

    for token in text.split_whitespace() {
        let digest = Sha256::digest(token.to_lowercase().as_bytes());
        // Four (index, sign) pairs per token, read off the digest.
        for pair in digest.chunks_exact(8) {
            let idx = u64::from_le_bytes(pair.try_into().expect("chunk of 8")) as usize
                % vector.len();
            let sign = if pair[0] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }

    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_for_same_input() {
        let a = deterministic_embedding("rust async runtime", 64);
        let b = deterministic_embedding("rust async runtime", 64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_inputs_differ() {
        let a = deterministic_embedding("rust async runtime", 64);
        let b = deterministic_embedding("gardening in spring", 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unit_length() {
        let v = deterministic_embedding("some text with several tokens", 128);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm = {norm}");
    }

    #[test]
    fn test_shared_vocabulary_is_closer_than_disjoint() {
        let cos = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        let base = deterministic_embedding("rust borrow checker lifetimes", 256);
        let related = deterministic_embedding("rust borrow checker errors", 256);
        let unrelated = deterministic_embedding("banana bread recipe ideas", 256);
        assert!(cos(&base, &related) > cos(&base, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = deterministic_embedding("", 32);
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(v.len(), 32);
    }
}
