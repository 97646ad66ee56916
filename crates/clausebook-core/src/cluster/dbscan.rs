//! Density-based clustering over cosine distance.

use crate::embedding::cosine_distance;

/// Label given to points that belong to no dense region.
pub const NOISE: i32 = -1;

/// DBSCAN over `points` using cosine distance.
///
/// A point's neighbourhood is every point (itself included) within `eps`.
/// Points with at least `min_samples` neighbours are core points; clusters
/// grow from core points through their neighbourhoods. Cluster labels are
/// assigned `0, 1, ...` in order of each cluster's first core point; border
/// points join the first cluster that reaches them; everything else is
/// [`NOISE`].
pub fn dbscan(points: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<i32> {
    let n = points.len();
    let neighbourhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| i == j || cosine_distance(&points[i], &points[j]) <= eps)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighbourhoods
        .iter()
        .map(|nb| nb.len() >= min_samples)
        .collect();

    let mut labels = vec![NOISE; n];
    let mut next_label = 0;

    for start in 0..n {
        if labels[start] != NOISE || !is_core[start] {
            continue;
        }
        labels[start] = next_label;
        let mut stack = vec![start];
        while let Some(p) = stack.pop() {
            if !is_core[p] {
                continue;
            }
            for &q in &neighbourhoods[p] {
                if labels[q] == NOISE {
                    labels[q] = next_label;
                    stack.push(q);
                }
            }
        }
        next_label += 1;
    }

    labels
}
