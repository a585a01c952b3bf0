use image::RgbImage;
use rayon::prelude::*;
use target_core::{AlignError, AlignResult, FloatImage};

/// `(0.01 * 255)^2`
pub const C1: f64 = 6.5025;
/// `(0.03 * 255)^2`
pub const C2: f64 = 58.5225;

const WINDOW: usize = 11;
const WINDOW_SIGMA: f32 = 1.5;

/// Mean structural similarity of two equally sized planes
pub fn plane_ssim(a: &FloatImage, b: &FloatImage) -> AlignResult<f64> {
    let (a2, b2, ab) = (a.multiply(a)?, b.multiply(b)?, a.multiply(b)?);
    if a.data().is_empty() {
        return Err(AlignError::InvalidInput("cannot score an empty image".into()));
    }

    let blur = |p: &FloatImage| p.gaussian_blur_sized(WINDOW, WINDOW_SIGMA);
    let (mu1, mu2) = (blur(a), blur(b));
    let (s11, s22, s12) = (blur(&a2), blur(&b2), blur(&ab));

    let sum: f64 = (0..mu1.data().len())
        .into_par_iter()
        .map(|i| {
            let (m1, m2) = (mu1.data()[i] as f64, mu2.data()[i] as f64);
            let (m1_sq, m2_sq, m1_m2) = (m1 * m1, m2 * m2, m1 * m2);
            let sigma1_sq = s11.data()[i] as f64 - m1_sq;
            let sigma2_sq = s22.data()[i] as f64 - m2_sq;
            let sigma12 = s12.data()[i] as f64 - m1_m2;

            let numerator = (2.0 * m1_m2 + C1) * (2.0 * sigma12 + C2);
            let denominator = (m1_sq + m2_sq + C1) * (sigma1_sq + sigma2_sq + C2);
            numerator / denominator
        })
        .sum();
    Ok(sum / mu1.data().len() as f64)
}

/// Structural similarity of two colour images in percent, averaged over the three channels
pub fn similarity_score(reference: &RgbImage, aligned: &RgbImage) -> AlignResult<f64> {
    if reference.dimensions() != aligned.dimensions() {
        return Err(AlignError::dimension_mismatch(reference.dimensions(), aligned.dimensions()));
    }

    let channels: Vec<f64> = (0..3)
        .into_par_iter()
        .map(|c| {
            plane_ssim(
                &FloatImage::from_rgb_channel(reference, c),
                &FloatImage::from_rgb_channel(aligned, c),
            )
        })
        .collect::<AlignResult<_>>()?;
    Ok(channels.iter().sum::<f64>() / 3.0 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use proptest::prelude::*;

    fn pattern(width: u32, height: u32, phase: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                ((x * 7 + y * 3 + phase) % 256) as u8,
                (((x / 4 + y / 4 + phase) % 2) * 200) as u8,
                ((x * y + phase) % 251) as u8,
            ])
        })
    }

    #[test]
    fn test_self_similarity_is_100() {
        let img = pattern(40, 30, 0);
        let score = similarity_score(&img, &img).unwrap();
        assert!((score - 100.0).abs() < 1e-9, "score {}", score);
    }

    #[test]
    fn test_different_images_score_lower() {
        let a = pattern(40, 30, 0);
        let b = pattern(40, 30, 37);
        let score = similarity_score(&a, &b).unwrap();
        assert!(score < 90.0, "score {}", score);
        let noisy = RgbImage::from_fn(40, 30, |x, y| {
            let p = a.get_pixel(x, y);
            let n = ((x * 13 + y * 7) % 5) as u8;
            Rgb([p[0].saturating_add(n), p[1].saturating_add(n), p[2].saturating_add(n)])
        });
        let close = similarity_score(&a, &noisy).unwrap();
        assert!(close > score);
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = similarity_score(&pattern(10, 10, 0), &pattern(10, 11, 0));
        assert_eq!(
            result.unwrap_err(),
            AlignError::DimensionMismatch {
                left_width: 10,
                left_height: 10,
                right_width: 10,
                right_height: 11
            }
        );
    }

    #[test]
    fn test_flat_images() {
        let black = RgbImage::new(12, 12);
        assert!((similarity_score(&black, &black).unwrap() - 100.0).abs() < 1e-9);
        let white = RgbImage::from_pixel(12, 12, Rgb([255, 255, 255]));
        assert!(similarity_score(&black, &white).unwrap() < 1.0);
    }

    proptest! {
        #[test]
        fn prop_similarity_is_symmetric(
            a in prop::collection::vec(any::<u8>(), 16 * 16 * 3),
            b in prop::collection::vec(any::<u8>(), 16 * 16 * 3),
        ) {
            let a = RgbImage::from_raw(16, 16, a).unwrap();
            let b = RgbImage::from_raw(16, 16, b).unwrap();
            let ab = similarity_score(&a, &b).unwrap();
            let ba = similarity_score(&b, &a).unwrap();
            prop_assert!((ab - ba).abs() < 1e-9);
            prop_assert!(ab <= 100.0 + 1e-9);
        }
    }
}
