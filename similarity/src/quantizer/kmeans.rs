//! Shared k-means training used by [`crate::index::ivf`] (k-means++ init)
//! and [`crate::quantizer::product`] (random init).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distance::squared_euclidean_distance;

pub const DEFAULT_MAX_ITERS: usize = 20;

/// How the initial centroids are chosen.
pub enum Init {
    /// k-means++: first centroid uniform, each subsequent centroid chosen
    /// with probability proportional to its squared distance to the
    /// nearest already-selected centroid.
    KMeansPlusPlus { seed: u64 },
    /// Uniformly random distinct training points, used by PQ subspace
    /// training.
    Random { seed: u64 },
}

/// Runs Lloyd's algorithm (assign, then update) for up to `max_iters`
/// rounds, exiting early when cluster assignments stop changing. Empty
/// clusters keep their previous centroid rather than being reseeded.
///
/// `vectors` must have at least `k` points and constant dimensionality.
pub fn train(vectors: &[Vec<f32>], k: usize, max_iters: usize, init: Init) -> Vec<Vec<f32>> {
    assert!(!vectors.is_empty() && k > 0 && vectors.len() >= k);
    let dim = vectors[0].len();

    let mut centroids = match init {
        Init::KMeansPlusPlus { seed } => kmeans_plus_plus(vectors, k, seed),
        Init::Random { seed } => random_init(vectors, k, seed),
    };

    let mut assignments = vec![0usize; vectors.len()];

    for _ in 0..max_iters {
        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let nearest = nearest_centroid(v, &centroids);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }

        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (v, &a) in vectors.iter().zip(assignments.iter()) {
            counts[a] += 1;
            for (s, &x) in sums[a].iter_mut().zip(v.iter()) {
                *s += x;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                continue; // keep previous centroid
            }
            for (centroid_x, &sum_x) in centroids[c].iter_mut().zip(sums[c].iter()) {
                *centroid_x = sum_x / counts[c] as f32;
            }
        }

        if !changed {
            break;
        }
    }

    centroids
}

fn nearest_centroid(v: &[f32], centroids: &[Vec<f32>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_euclidean_distance(v, c)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap()
}

fn random_init(vectors: &[Vec<f32>], k: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..vectors.len()).collect();
    // partial Fisher-Yates: only shuffle the first k slots we need.
    for i in 0..k.min(indices.len()) {
        let j = rng.gen_range(i..indices.len());
        indices.swap(i, j);
    }
    indices[..k].iter().map(|&i| vectors[i].clone()).collect()
}

fn kmeans_plus_plus(vectors: &[Vec<f32>], k: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = Vec::with_capacity(k);

    let first = rng.gen_range(0..vectors.len());
    centroids.push(vectors[first].clone());

    while centroids.len() < k {
        let dists: Vec<f32> = vectors
            .iter()
            .map(|v| {
                centroids
                    .iter()
                    .map(|c| squared_euclidean_distance(v, c))
                    .fold(f32::INFINITY, f32::min)
            })
            .collect();
        let total: f32 = dists.iter().sum();
        if total <= 0.0 {
            // All remaining points coincide with a chosen centroid; pad with
            // uniform picks rather than looping forever.
            let idx = rng.gen_range(0..vectors.len());
            centroids.push(vectors[idx].clone());
            continue;
        }
        let target = rng.gen_range(0.0..total);
        let mut acc = 0.0;
        let mut chosen = vectors.len() - 1;
        for (i, &d) in dists.iter().enumerate() {
            acc += d;
            if acc >= target {
                chosen = i;
                break;
            }
        }
        centroids.push(vectors[chosen].clone());
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn converges_to_two_well_separated_clusters() {
        let vectors = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![10.0, 10.1],
        ];
        let centroids = train(
            &vectors,
            2,
            DEFAULT_MAX_ITERS,
            Init::KMeansPlusPlus { seed: 42 },
        );
        assert_eq!(centroids.len(), 2);
        let near_origin = centroids
            .iter()
            .any(|c| squared_euclidean_distance(c, &[0.0, 0.0]) < 1.0);
        let near_ten = centroids
            .iter()
            .any(|c| squared_euclidean_distance(c, &[10.0, 10.0]) < 1.0);
        assert!(near_origin && near_ten);
    }

    #[test]
    fn empty_clusters_keep_previous_centroid() {
        // Two points, three requested centroids: one centroid will start
        // with no assigned points across iterations.
        let vectors = vec![vec![0.0], vec![0.0]];
        let centroids = train(&vectors, 2, DEFAULT_MAX_ITERS, Init::Random { seed: 1 });
        assert_eq!(centroids.len(), 2);
    }
}
