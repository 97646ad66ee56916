//! k-distance analysis for choosing `eps`.

use serde::{Deserialize, Serialize};

use crate::embedding::cosine_distance;

/// Sorted k-distance curve plus the elbow it suggests as `eps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KDistanceReport {
    pub k: usize,
    /// Distance of every point to its k-th nearest neighbour, ascending.
    pub distances: Vec<f32>,
    pub suggested_eps: Option<f32>,
}

impl KDistanceReport {
    pub fn from_vectors(vectors: &[Vec<f32>], k: usize) -> Self {
        let distances = k_distances(vectors, k);
        let suggested_eps = suggest_eps(&distances);
        Self {
            k,
            distances,
            suggested_eps,
        }
    }
}

/// Distance from each point to its `k`-th nearest neighbour, sorted
/// ascending. The point itself counts as its first neighbour, so `k = 1`
/// yields all zeros. `k` larger than the point count is clamped.
pub fn k_distances(vectors: &[Vec<f32>], k: usize) -> Vec<f32> {
    if k == 0 || vectors.is_empty() {
        return Vec::new();
    }
    let k = k.min(vectors.len());

    let mut out: Vec<f32> = vectors
        .iter()
        .map(|a| {
            let mut row: Vec<f32> = vectors.iter().map(|b| cosine_distance(a, b)).collect();
            row.sort_by(f32::total_cmp);
            row[k - 1]
        })
        .collect();
    out.sort_by(f32::total_cmp);
    out
}

/// Elbow of an ascending k-distance curve: the point furthest below the
/// chord joining its first and last values, with both axes normalised.
///
/// Returns `None` for fewer than three points or a curve without a knee.
pub fn suggest_eps(distances: &[f32]) -> Option<f32> {
    let n = distances.len();
    if n < 3 {
        return None;
    }
    let first = distances[0];
    let span = distances[n - 1] - first;
    if span <= f32::EPSILON {
        return None;
    }

    let (index, gap) = distances
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let x = i as f32 / (n - 1) as f32;
            let y = (d - first) / span;
            (i, x - y)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    (gap > 0.0).then(|| distances[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_is_first_neighbour() {
        let v = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(k_distances(&v, 1), vec![0.0, 0.0]);
        let d = k_distances(&v, 2);
        assert!((d[0] - 1.0).abs() < 1e-6 && (d[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn k_is_clamped_and_zero_is_empty() {
        let v = vec![vec![1.0, 0.0], vec![1.0, 0.1]];
        assert_eq!(k_distances(&v, 10).len(), 2);
        assert!(k_distances(&v, 0).is_empty());
        assert!(k_distances(&[], 2).is_empty());
    }

    #[test]
    fn elbow_sits_before_the_jump() {
        let curve = [0.01, 0.01, 0.02, 0.02, 0.03, 0.5, 0.9];
        assert_eq!(suggest_eps(&curve), Some(0.03));
    }

    #[test]
    fn no_elbow_for_flat_or_short_curves() {
        assert_eq!(suggest_eps(&[0.2, 0.2, 0.2, 0.2]), None);
        assert_eq!(suggest_eps(&[0.1, 0.9]), None);
    }
}
