//! Silhouette coefficient for choosing the cluster count.

/// Mean silhouette coefficient over all rows, using Euclidean distance.
///
/// Returns `None` unless there are at least two clusters and fewer clusters
/// than rows. Rows in singleton clusters score 0.
pub fn silhouette_score(data: &[Vec<f64>], labels: &[usize]) -> Option<f64> {
    let n = data.len();
    if n == 0 || labels.len() != n {
        return None;
    }
    let k = labels.iter().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }
    let populated = sizes.iter().filter(|&&s| s > 0).count();
    if populated < 2 || populated >= n {
        return None;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }

        let mut sums = vec![0.0; k];
        for j in 0..n {
            if i != j {
                sums[labels[j]] += distance(&data[i], &data[j]);
            }
        }

        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    Some(total / n as f64)
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    super::kmeans::squared_distance(a, b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_separated_scores_high() {
        let data = vec![vec![0.0], vec![0.1], vec![10.0], vec![10.1]];
        let score = silhouette_score(&data, &[0, 0, 1, 1]).unwrap();
        assert!(score > 0.95);
    }

    #[test]
    fn test_bad_split_scores_lower() {
        let data = vec![vec![0.0], vec![0.1], vec![10.0], vec![10.1]];
        let good = silhouette_score(&data, &[0, 0, 1, 1]).unwrap();
        let bad = silhouette_score(&data, &[0, 1, 0, 1]).unwrap();
        assert!(bad < good);
        assert!(bad < 0.0);
    }

    #[test]
    fn test_invalid_label_counts() {
        let data = vec![vec![0.0], vec![1.0], vec![2.0]];
        assert_eq!(silhouette_score(&data, &[0, 0, 0]), None);
        assert_eq!(silhouette_score(&data, &[0, 1, 2]), None);
        assert_eq!(silhouette_score(&[], &[]), None);
    }

    #[test]
    fn test_singleton_scores_zero() {
        // Row 2 is alone: it contributes 0, the pair scores 1 each.
        let data = vec![vec![0.0], vec![0.0], vec![5.0]];
        let score = silhouette_score(&data, &[0, 0, 1]).unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-12);
    }
}
