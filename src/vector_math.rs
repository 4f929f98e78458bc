use std::cmp::Ordering;

use crate::core::errors::ApiError;

pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, ApiError> {
    if query.is_empty() || candidate.is_empty() {
        return Err(ApiError::Retrieval("Vectors must not be empty".to_string()));
    }
    if query.len() != candidate.len() {
        return Err(ApiError::Retrieval(format!(
            "Vector length mismatch: {} != {}",
            query.len(),
            candidate.len()
        )));
    }

    let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
    let denom = l2_norm(query) * l2_norm(candidate);
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// Scores every candidate against `query` and keeps the best `limit`.
///
/// Sorted by score descending; equal scores fall back to ascending id so the
/// order is stable across runs.
pub fn rank_top_k<'a, I>(
    query: &[f32],
    candidates: I,
    limit: usize,
) -> Result<Vec<(&'a str, f32)>, ApiError>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut scores = Vec::new();
    for (id, embedding) in candidates {
        let score = cosine_similarity(query, embedding)?;
        scores.push((id, score));
    }

    scores.sort_by(|left, right| {
        right
            .1
            .partial_cmp(&left.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.0.cmp(right.0))
    });
    scores.truncate(limit);
    Ok(scores)
}

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn cosine_is_one_for_identical_vectors() {
        let vec = vec![1.0, 2.0, 3.0, 4.0];
        let score = cosine_similarity(&vec, &vec).expect("cosine should work");
        assert!(approx_eq(score, 1.0));
    }

    #[test]
    fn cosine_is_zero_for_orthogonal_vectors() {
        let score = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).expect("cosine should work");
        assert!(approx_eq(score, 0.0));
    }

    #[test]
    fn cosine_rejects_mismatched_dimensions() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0]).unwrap_err();
        assert!(matches!(err, ApiError::Retrieval(_)));
    }

    #[test]
    fn ranking_returns_highest_similarity_first() {
        let query = vec![1.0, 0.0];
        let a = vec![0.8, 0.2];
        let b = vec![0.1, 0.9];
        let c = vec![0.9, 0.0];
        let candidates = vec![("a", a.as_slice()), ("b", b.as_slice()), ("c", c.as_slice())];
        let ranked = rank_top_k(&query, candidates, 2).expect("ranking should work");

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "c");
        assert_eq!(ranked[1].0, "a");
    }

    #[test]
    fn ties_are_broken_by_id() {
        let query = vec![1.0, 0.0];
        let same = vec![2.0, 0.0];
        let candidates = vec![("z#0", same.as_slice()), ("a#3", same.as_slice())];
        let ranked = rank_top_k(&query, candidates, 5).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["a#3", "z#0"]);
    }
}
