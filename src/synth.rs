//! Synthetic datasets drawn from known Gaussians.

use crate::error::Result;
use crate::gaussian::Gaussian;
use crate::rng::Random;

/// Centers of the blobs drawn by [`three_blobs`].
pub const THREE_BLOB_CENTERS: [[f64; 2]; 3] = [[0.0, 0.0], [1.0, 1.0], [2.0, 1.0]];

/// Per-blob standard deviations used by [`three_blobs`].
pub const THREE_BLOB_SPREADS: [f64; 3] = [0.1, 0.1, 0.2];

/// Draws `n` samples from `gaussian`.
pub fn fill_gaussian(rng: &mut Random, gaussian: &Gaussian, n: usize) -> Vec<Vec<f64>> {
    (0..n).map(|_| gaussian.sample(rng)).collect()
}

/// `n` samples from each of three isotropic 2-D blobs, blob by blob.
pub fn three_blobs(rng: &mut Random, n: usize) -> Result<Vec<Vec<f64>>> {
    let mut data = Vec::with_capacity(3 * n);
    for (center, spread) in THREE_BLOB_CENTERS.iter().zip(THREE_BLOB_SPREADS) {
        let blob = Gaussian::diagonal(center.to_vec(), vec![spread * spread; 2])?;
        data.extend(fill_gaussian(rng, &blob, n));
    }
    Ok(data)
}

/// `n` samples from each of `gaussians` random diagonal Gaussians in `dim`
/// dimensions.
///
/// Means are uniform in `[0, 1)`. Each dimension gets a standard deviation
/// drawn from `[0, 0.05 + u * 0.1)` with `u` uniform per Gaussian. Returns
/// the samples together with the generating Gaussians.
pub fn random_mixture(
    rng: &mut Random,
    dim: usize,
    gaussians: usize,
    n: usize,
) -> Result<(Vec<Vec<f64>>, Vec<Gaussian>)> {
    let mut data = Vec::with_capacity(gaussians * n);
    let mut sources = Vec::with_capacity(gaussians);

    for _ in 0..gaussians {
        let mean: Vec<f64> = (0..dim).map(|_| rng.uniform()).collect();
        let width = 0.05 + rng.uniform() * 0.1;
        // Zero spread would give a singular covariance.
        let variances: Vec<f64> = (0..dim)
            .map(|_| {
                let sd = rng.uniform() * width;
                (sd * sd).max(f64::MIN_POSITIVE)
            })
            .collect();

        let gaussian = Gaussian::diagonal(mean, variances)?;
        data.extend(fill_gaussian(rng, &gaussian, n));
        sources.push(gaussian);
    }

    Ok((data, sources))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_blobs_layout() {
        let mut rng = Random::seeded(1);
        let data = three_blobs(&mut rng, 200).unwrap();
        assert_eq!(data.len(), 600);

        for (b, center) in THREE_BLOB_CENTERS.iter().enumerate() {
            let blob = &data[b * 200..(b + 1) * 200];
            for d in 0..2 {
                let mean: f64 = blob.iter().map(|x| x[d]).sum::<f64>() / 200.0;
                assert!((mean - center[d]).abs() < 0.05, "blob {} dim {}: {}", b, d, mean);
            }
        }
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = three_blobs(&mut Random::seeded(7), 10).unwrap();
        let b = three_blobs(&mut Random::seeded(7), 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_mixture_shapes() {
        let mut rng = Random::seeded(3);
        let (data, sources) = random_mixture(&mut rng, 50, 4, 25).unwrap();
        assert_eq!(data.len(), 100);
        assert_eq!(sources.len(), 4);
        assert!(data.iter().all(|x| x.len() == 50));
        for g in &sources {
            assert!(g.mean().iter().all(|&m| (0.0..1.0).contains(&m)));
            assert!(g.covariance().variances().iter().all(|&v| v > 0.0 && v < 0.15 * 0.15));
        }
    }
}
