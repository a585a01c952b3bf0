//! RANSAC homography fitting.
//!
//! Minimal four-point samples are drawn without replacement, samples with three
//! collinear points on either side are skipped, the hypothesis with the most
//! inliers wins and the iteration budget shrinks as the inlier ratio improves.
//! The winner is refined by least squares over its inliers.

use log::debug;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use target_core::{AlignError, AlignResult, Point, RansacConfig};

use crate::homography::{has_collinear_triple, Homography};

/// Pairs needed to determine a homography
pub const MIN_SAMPLES: usize = 4;

#[derive(Debug, Clone)]
pub struct RansacFit {
    pub homography: Homography,
    /// Indices of the pairs within the reprojection threshold
    pub inliers: Vec<usize>,
    pub iterations: usize,
}

impl RansacFit {
    pub fn inlier_ratio(&self, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            self.inliers.len() as f64 / total as f64
        }
    }
}

pub struct RansacEstimator {
    config: RansacConfig,
}

impl RansacEstimator {
    pub fn new(config: RansacConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Fit `dst ≈ H(src)` robustly
    pub fn estimate(&self, src: &[Point], dst: &[Point]) -> AlignResult<RansacFit> {
        let n = src.len();
        if n != dst.len() {
            return Err(AlignError::InvalidInput(format!(
                "{} source points but {} destination points",
                n,
                dst.len()
            )));
        }
        if n < MIN_SAMPLES {
            return Err(AlignError::InsufficientCorrespondences {
                found: n,
                required: MIN_SAMPLES,
            });
        }

        let mut rng: ChaCha8Rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        let threshold_sq = self.config.reprojection_threshold * self.config.reprojection_threshold;

        let mut best: Option<(Homography, Vec<usize>)> = None;
        let mut sample_indices: Vec<usize> = Vec::with_capacity(MIN_SAMPLES);
        let mut sample_src: Vec<Point> = Vec::with_capacity(MIN_SAMPLES);
        let mut sample_dst: Vec<Point> = Vec::with_capacity(MIN_SAMPLES);

        let mut iterations = 0;
        let mut max_iter = self.config.max_iterations;

        while iterations < max_iter {
            iterations += 1;

            random_sample_into(&mut rng, n, MIN_SAMPLES, &mut sample_indices);
            sample_src.clear();
            sample_dst.clear();
            for &i in &sample_indices {
                sample_src.push(src[i]);
                sample_dst.push(dst[i]);
            }
            if has_collinear_triple(&sample_src) || has_collinear_triple(&sample_dst) {
                continue;
            }

            let Some(h) = Homography::estimate(&sample_src, &sample_dst) else {
                continue;
            };

            let inliers = count_inliers(src, dst, &h, threshold_sq);
            let improved = match &best {
                Some((_, best_inliers)) => inliers.len() > best_inliers.len(),
                None => inliers.len() >= MIN_SAMPLES,
            };
            if improved {
                let ratio = inliers.len() as f64 / n as f64;
                max_iter = max_iter.min(adaptive_iterations(ratio, MIN_SAMPLES, self.config.confidence));
                best = Some((h, inliers));
            }
        }

        let Some((h, inliers)) = best else {
            return Err(AlignError::GeometryUnsolvable(format!(
                "no homography supported by at least {} of {} pairs after {} iterations",
                MIN_SAMPLES, n, iterations
            )));
        };

        // Least squares on the consensus set; keep it only if support does not drop
        let inlier_src: Vec<Point> = inliers.iter().map(|&i| src[i]).collect();
        let inlier_dst: Vec<Point> = inliers.iter().map(|&i| dst[i]).collect();
        let (homography, inliers) = match Homography::estimate(&inlier_src, &inlier_dst) {
            Some(refined) => {
                let refined_inliers = count_inliers(src, dst, &refined, threshold_sq);
                if refined_inliers.len() >= inliers.len() {
                    (refined, refined_inliers)
                } else {
                    (h, inliers)
                }
            }
            None => (h, inliers),
        };

        debug!(
            "RANSAC: {} of {} inliers after {} iterations",
            inliers.len(),
            n,
            iterations
        );
        Ok(RansacFit {
            homography,
            inliers,
            iterations,
        })
    }
}

fn count_inliers(src: &[Point], dst: &[Point], h: &Homography, threshold_sq: f64) -> Vec<usize> {
    src.iter()
        .zip(dst)
        .enumerate()
        .filter(|(_, (s, d))| h.transfer_error_sq(s, d) <= threshold_sq)
        .map(|(i, _)| i)
        .collect()
}

/// Floyd's algorithm: `k` distinct indices from `0..n`
fn random_sample_into<R: Rng>(rng: &mut R, n: usize, k: usize, buffer: &mut Vec<usize>) {
    debug_assert!(k <= n, "Cannot sample {} indices from {}", k, n);
    buffer.clear();
    for j in (n - k)..n {
        let t = rng.random_range(0..=j);
        if buffer.contains(&t) {
            buffer.push(j);
        } else {
            buffer.push(t);
        }
    }
}

/// Iterations needed to draw one all-inlier sample with the given confidence
pub fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }

    // N = log(1 - confidence) / log(1 - w^n)
    let w_n = inlier_ratio.powi(sample_size as i32);
    let log_outlier = (1.0 - w_n).ln();
    if log_outlier >= 0.0 {
        return usize::MAX;
    }
    let n = ((1.0 - confidence).ln() / log_outlier).ceil();
    if n.is_finite() && n >= 1.0 { n as usize } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> RansacConfig {
        RansacConfig {
            seed: Some(seed),
            ..RansacConfig::default()
        }
    }

    fn known_homography() -> Homography {
        Homography::from_row_slice(&[1.1, 0.2, 30.0, -0.1, 0.95, 12.0, 2e-4, 1e-4, 1.0])
    }

    fn scattered_points(n: usize, seed: u64) -> Vec<Point> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| Point::new(rng.random_range(0.0..400.0), rng.random_range(0.0..300.0)))
            .collect()
    }

    #[test]
    fn test_too_few_pairs() {
        let pts = scattered_points(3, 1);
        let result = RansacEstimator::new(config(0)).estimate(&pts, &pts);
        assert_eq!(
            result.unwrap_err(),
            AlignError::InsufficientCorrespondences { found: 3, required: 4 }
        );
    }

    #[test]
    fn test_length_mismatch() {
        let pts = scattered_points(6, 1);
        let result = RansacEstimator::new(config(0)).estimate(&pts, &pts[..5]);
        assert!(matches!(result, Err(AlignError::InvalidInput(_))));
    }

    #[test]
    fn test_recovers_homography_with_outliers() {
        let h = known_homography();
        let src = scattered_points(60, 2);
        let mut dst: Vec<Point> = src.iter().map(|p| h.project(p).unwrap()).collect();
        let junk = scattered_points(20, 3);
        for (i, j) in junk.into_iter().enumerate() {
            dst[i * 3] = j;
        }

        let fit = RansacEstimator::new(config(7)).estimate(&src, &dst).unwrap();
        assert!(fit.inliers.len() >= 40, "{} inliers", fit.inliers.len());
        for p in &src {
            let err = (fit.homography.project(p).unwrap() - h.project(p).unwrap()).norm();
            assert!(err < 0.1, "error {}", err);
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let h = known_homography();
        let src = scattered_points(30, 4);
        let mut dst: Vec<Point> = src.iter().map(|p| h.project(p).unwrap()).collect();
        dst[0] = Point::new(5.0, 5.0);
        dst[1] = Point::new(300.0, 10.0);

        let a = RansacEstimator::new(config(11)).estimate(&src, &dst).unwrap();
        let b = RansacEstimator::new(config(11)).estimate(&src, &dst).unwrap();
        assert_eq!(a.homography, b.homography);
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_collinear_pairs_are_unsolvable() {
        let src: Vec<Point> = (0..10).map(|i| Point::new(i as f64 * 10.0, 5.0)).collect();
        let result = RansacEstimator::new(config(0)).estimate(&src, &src);
        assert!(matches!(result, Err(AlignError::GeometryUnsolvable(_))));
    }

    #[test]
    fn test_adaptive_iterations() {
        assert_eq!(adaptive_iterations(1.0, 4, 0.995), 1);
        assert_eq!(adaptive_iterations(0.0, 4, 0.995), usize::MAX);
        let half = adaptive_iterations(0.5, 4, 0.995);
        // log(0.005) / log(1 - 1/16) ≈ 82.1
        assert_eq!(half, 83);
        assert!(adaptive_iterations(0.9, 4, 0.995) < half);
    }

    #[test]
    fn test_sampling_is_distinct() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut buf = Vec::new();
        for _ in 0..100 {
            random_sample_into(&mut rng, 6, 4, &mut buf);
            let mut sorted = buf.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 4);
            assert!(buf.iter().all(|&i| i < 6));
        }
    }
}
