//! Cosine similarity between embedding vectors.

/// `dot(a, b) / (|a| * |b|)`, accumulated in `f64`.
///
/// Both slices must have the same length. The result is NaN when either
/// vector has zero magnitude; callers exclude such vectors with
/// [`is_scorable`] first.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "cosine_similarity on vectors of different length");

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// A vector can be scored if it is non-empty and has non-zero magnitude.
pub fn is_scorable(v: &[f32]) -> bool {
    v.iter().any(|x| *x != 0.0) && v.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn identical_vectors_score_one() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < EPS);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < EPS);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < EPS);
    }

    #[test]
    fn magnitude_does_not_matter() {
        let s = cosine_similarity(&[3.0, 4.0], &[6.0, 8.0]);
        assert!((s - 1.0).abs() < EPS);
    }

    #[test]
    fn zero_vector_is_nan_and_not_scorable() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_nan());
        assert!(!is_scorable(&[0.0, 0.0]));
        assert!(!is_scorable(&[]));
        assert!(is_scorable(&[0.0, 0.1]));
    }
}
