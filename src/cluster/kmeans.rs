//! Seeded k-means (k-means++ seeding, Lloyd iterations).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tuning knobs for [`kmeans`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansOptions {
    pub seed: u64,
    pub max_iter: usize,
    /// Independent restarts; the run with the lowest inertia wins.
    pub n_init: usize,
    /// Convergence threshold on centroid movement, relative to the mean
    /// per-column variance of the data.
    pub tolerance: f64,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iter: 300,
            n_init: 10,
            tolerance: 1e-4,
        }
    }
}

/// Outcome of a k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster index per input row. Indices are numbered by first appearance.
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances from each row to its centroid.
    pub inertia: f64,
    pub iterations: usize,
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

fn mean_variance(data: &[Vec<f64>]) -> f64 {
    let n = data.len() as f64;
    let dim = data[0].len();
    if dim == 0 {
        return 0.0;
    }
    let total: f64 = (0..dim)
        .map(|j| {
            let mean = data.iter().map(|r| r[j]).sum::<f64>() / n;
            data.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / dim as f64
}

/// Picks initial centroids, each new one drawn with probability
/// proportional to its squared distance from the nearest chosen centroid.
fn plus_plus_init(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.random_range(0..data.len())].clone());

    let mut dist: Vec<f64> = data
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = dist.iter().sum();
        let idx = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = data.len() - 1;
            for (i, d) in dist.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.random_range(0..data.len())
        };

        let centroid = data[idx].clone();
        for (d, p) in dist.iter_mut().zip(data) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

fn compute_centroids(data: &[Vec<f64>], labels: &[usize], k: usize) -> Vec<Vec<f64>> {
    let dim = data[0].len();
    let mut sums = vec![vec![0.0; dim]; k];
    let mut counts = vec![0usize; k];
    for (row, &label) in data.iter().zip(labels) {
        counts[label] += 1;
        for (s, v) in sums[label].iter_mut().zip(row) {
            *s += v;
        }
    }
    for (sum, count) in sums.iter_mut().zip(&counts) {
        if *count > 0 {
            sum.iter_mut().for_each(|s| *s /= *count as f64);
        }
    }
    sums
}

/// Refills empty clusters with the point farthest from its own centroid,
/// taken from a cluster that has more than one member.
fn repair_empty(data: &[Vec<f64>], labels: &mut [usize], centroids: &[Vec<f64>], k: usize) {
    let mut counts = vec![0usize; k];
    for &l in labels.iter() {
        counts[l] += 1;
    }

    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let donor = data
            .iter()
            .enumerate()
            .filter(|(i, _)| counts[labels[*i]] > 1)
            .map(|(i, p)| (i, squared_distance(p, &centroids[labels[i]])))
            .fold(None::<(usize, f64)>, |best, (i, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            });

        if let Some((i, _)) = donor {
            counts[labels[i]] -= 1;
            labels[i] = empty;
            counts[empty] += 1;
        }
    }
}

fn single_run(
    data: &[Vec<f64>],
    k: usize,
    opts: &KMeansOptions,
    tol: f64,
    rng: &mut StdRng,
) -> KMeansResult {
    let mut centroids = plus_plus_init(data, k, rng);
    let mut labels = vec![0usize; data.len()];
    let mut iterations = 0;

    for iter in 0..opts.max_iter.max(1) {
        iterations = iter + 1;
        for (label, point) in labels.iter_mut().zip(data) {
            *label = nearest(point, &centroids).0;
        }
        repair_empty(data, &mut labels, &centroids, k);

        let updated = compute_centroids(data, &labels, k);
        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| squared_distance(a, b))
            .sum();
        centroids = updated;
        if shift <= tol {
            break;
        }
    }

    let inertia = data
        .iter()
        .zip(&labels)
        .map(|(p, &l)| squared_distance(p, &centroids[l]))
        .sum();

    KMeansResult {
        labels,
        centroids,
        inertia,
        iterations,
    }
}

/// Renumbers clusters so that label 0 is the cluster of the first row,
/// label 1 the next new cluster encountered, and so on.
fn relabel_by_first_appearance(result: KMeansResult) -> KMeansResult {
    let k = result.centroids.len();
    let mut mapping = vec![usize::MAX; k];
    let mut next = 0;
    for &l in &result.labels {
        if mapping[l] == usize::MAX {
            mapping[l] = next;
            next += 1;
        }
    }
    // Clusters that ended up empty keep their relative order at the end.
    for m in mapping.iter_mut().filter(|m| **m == usize::MAX) {
        *m = next;
        next += 1;
    }

    let mut centroids = vec![Vec::new(); k];
    for (old, centroid) in result.centroids.into_iter().enumerate() {
        centroids[mapping[old]] = centroid;
    }
    KMeansResult {
        labels: result.labels.iter().map(|&l| mapping[l]).collect(),
        centroids,
        inertia: result.inertia,
        iterations: result.iterations,
    }
}

/// Clusters `data` into `k` groups.
///
/// Rows must share one dimension and `1 <= k <= data.len()`; callers
/// validate this. The result is deterministic for a given seed.
pub fn kmeans(data: &[Vec<f64>], k: usize, opts: &KMeansOptions) -> KMeansResult {
    debug_assert!(k >= 1 && k <= data.len());
    let tol = opts.tolerance * mean_variance(data);
    let mut rng = StdRng::seed_from_u64(opts.seed);

    let mut best = single_run(data, k, opts, tol, &mut rng);
    for _ in 1..opts.n_init.max(1) {
        let run = single_run(data, k, opts, tol, &mut rng);
        tracing::trace!(inertia = run.inertia, iterations = run.iterations, "k-means restart");
        if run.inertia < best.inertia {
            best = run;
        }
    }
    relabel_by_first_appearance(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for i in 0..6 {
            data.push(vec![0.0 + i as f64 * 0.1, 0.0]);
            data.push(vec![10.0 + i as f64 * 0.1, 10.0]);
        }
        data
    }

    #[test]
    fn test_separates_two_groups() {
        let result = kmeans(&two_groups(), 2, &KMeansOptions::default());
        assert_eq!(result.labels.iter().filter(|&&l| l == 0).count(), 6);
        assert_eq!(result.labels.iter().filter(|&&l| l == 1).count(), 6);
        // Alternating input rows alternate groups.
        assert_eq!(result.labels[0], 0);
        assert_eq!(result.labels[1], 1);
        assert!((result.centroids[0][1] - 0.0).abs() < 1e-9);
        assert!((result.centroids[1][1] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let data: Vec<Vec<f64>> = (0..30)
            .map(|i| vec![(i * 7 % 11) as f64, (i * 3 % 5) as f64])
            .collect();
        let opts = KMeansOptions::default();
        assert_eq!(kmeans(&data, 4, &opts), kmeans(&data, 4, &opts));
    }

    #[test]
    fn test_k_equals_n_gives_singletons() {
        let data = vec![vec![0.0], vec![1.0], vec![5.0]];
        let result = kmeans(&data, 3, &KMeansOptions::default());
        assert_eq!(result.labels, vec![0, 1, 2]);
        assert_eq!(result.inertia, 0.0);
    }

    #[test]
    fn test_no_empty_clusters_with_duplicates() {
        // Three distinct values, heavy duplication of one.
        let mut data = vec![vec![0.0]; 10];
        data.push(vec![1.0]);
        data.push(vec![2.0]);
        let result = kmeans(&data, 3, &KMeansOptions::default());
        for label in 0..3 {
            assert!(result.labels.contains(&label), "cluster {label} is empty");
        }
    }

    #[test]
    fn test_repair_moves_farthest_point() {
        let data = vec![vec![0.0], vec![1.0], vec![9.0]];
        let mut labels = vec![0, 0, 0];
        let centroids = vec![vec![0.0], vec![100.0]];
        repair_empty(&data, &mut labels, &centroids, 2);
        assert_eq!(labels, vec![0, 0, 1]);
    }
}
