//! Starting parameters for an EM run.

use crate::config::Initialization;
use crate::error::Result;
use crate::gaussian::{Covariance, Gaussian};
use crate::gmm::{Component, Mixture};
use crate::rng::Random;

/// Per-dimension variance of the whole dataset.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GlobalStats {
    /// Population variances, floored.
    pub variances: Vec<f64>,
}

impl GlobalStats {
    pub fn compute(data: &[Vec<f64>], dim: usize, min_variance: f64) -> Self {
        let n = data.len() as f64;
        let mut mean = vec![0.0; dim];
        for x in data {
            for (m, v) in mean.iter_mut().zip(x) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut variances = vec![0.0; dim];
        for x in data {
            for ((s, v), m) in variances.iter_mut().zip(x).zip(&mean) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut variances {
            *s = (*s / n).max(min_variance);
        }

        Self { variances }
    }
}

/// Picks `k` starting means from the dataset.
pub(crate) fn initial_means(
    data: &[Vec<f64>],
    k: usize,
    init: Initialization,
    rng: &mut Random,
) -> Vec<Vec<f64>> {
    match init {
        Initialization::Random => rng
            .distinct_indices(data.len(), k)
            .into_iter()
            .map(|i| data[i].clone())
            .collect(),
        Initialization::KMeansPlusPlus => kmeans_plus_plus(data, k, rng),
    }
}

/// D² seeding: the first mean is uniform, each next one is drawn with
/// probability proportional to the squared distance to the nearest mean
/// chosen so far.
fn kmeans_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut Random) -> Vec<Vec<f64>> {
    let mut means = Vec::with_capacity(k);
    let first = &data[rng.index(data.len())];
    means.push(first.clone());

    let mut distances: Vec<f64> = data.iter().map(|x| squared_distance(x, first)).collect();

    while means.len() < k {
        let chosen = &data[rng.weighted_index(&distances)];
        for (d, x) in distances.iter_mut().zip(data) {
            *d = d.min(squared_distance(x, chosen));
        }
        means.push(chosen.clone());
    }

    means
}

#[inline]
fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Fresh parameters: sampled means, uniform weights, global variance.
pub(crate) fn initialize(
    mixture: &mut Mixture,
    data: &[Vec<f64>],
    global: &GlobalStats,
    init: Initialization,
    min_variance: f64,
    rng: &mut Random,
) -> Result<()> {
    let k = mixture.n_components();
    let covariance_type = mixture.covariance_type();
    let weight = 1.0 / k as f64;

    let components = initial_means(data, k, init, rng)
        .into_iter()
        .map(|mean| {
            let covariance = Covariance::from_variances(covariance_type, &global.variances, min_variance);
            Ok(Component::new(weight, Gaussian::new(mean, covariance)?))
        })
        .collect::<Result<Vec<_>>>()?;

    mixture.set_components(components);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaussian::CovarianceType;

    fn blobs() -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for i in 0..30 {
            let jitter = (i as f64 * 0.7).sin() * 0.05;
            data.push(vec![jitter, jitter]);
            data.push(vec![10.0 + jitter, 10.0 - jitter]);
            data.push(vec![-10.0 - jitter, 10.0 + jitter]);
        }
        data
    }

    #[test]
    fn test_global_stats() {
        let data = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let stats = GlobalStats::compute(&data, 2, 1e-6);
        assert_eq!(stats.variances, vec![1.0, 1e-6]);
    }

    #[test]
    fn test_random_init_uses_distinct_samples() {
        let data: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let mut rng = Random::seeded(11);
        let mut means = initial_means(&data, 10, Initialization::Random, &mut rng);
        means.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(means, data);
    }

    #[test]
    fn test_kmeans_plus_plus_spreads_seeds() {
        let data = blobs();
        for seed in 0..20 {
            let mut rng = Random::seeded(seed);
            let means = initial_means(&data, 3, Initialization::KMeansPlusPlus, &mut rng);
            let mut clusters: Vec<i64> = means.iter().map(|m| (m[0] / 10.0).round() as i64).collect();
            clusters.sort_unstable();
            assert_eq!(clusters, vec![-1, 0, 1], "seed {}", seed);
        }
    }

    #[test]
    fn test_kmeans_plus_plus_on_identical_points() {
        let data = vec![vec![1.0, 1.0]; 5];
        let mut rng = Random::seeded(2);
        let means = initial_means(&data, 3, Initialization::KMeansPlusPlus, &mut rng);
        assert_eq!(means.len(), 3);
    }

    #[test]
    fn test_initialize_is_reproducible() {
        let data = blobs();
        let global = GlobalStats::compute(&data, 2, 1e-6);
        let mut a = Mixture::new(3, CovarianceType::Diagonal);
        let mut b = Mixture::new(3, CovarianceType::Diagonal);

        initialize(&mut a, &data, &global, Initialization::KMeansPlusPlus, 1e-6, &mut Random::seeded(5)).unwrap();
        initialize(&mut b, &data, &global, Initialization::KMeansPlusPlus, 1e-6, &mut Random::seeded(5)).unwrap();

        assert_eq!(a, b);
        let total: f64 = a.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(a.components()[0].gaussian.covariance().variances(), global.variances);
    }
}
