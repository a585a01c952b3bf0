use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use image::GrayImage;
use target_core::{BinaryDescriptor, FloatImage, Keypoint};

const DESCRIPTOR_SIZE: usize = 32;
const N_PAIRS: usize = DESCRIPTOR_SIZE * 8;

/// Side of the square patch the test points are drawn from
pub const PATCH_SIZE: usize = 31;

/// Test points are clamped to this radius so rotated pairs stay near the patch
const MAX_OFFSET: f32 = 13.0;

/// Fixed seed so every run, and both images, share one sampling pattern
const PATTERN_SEED: u64 = 0x0B51_EF00;

/// Smoothing applied before the intensity tests
pub(crate) const BLUR_SIGMA: f32 = 2.0;
pub(crate) const BLUR_KSIZE: usize = 7;

/// Where a descriptor is sampled, in level-image coordinates
#[derive(Debug, Clone, Copy)]
pub struct SamplePoint {
    pub x: f32,
    pub y: f32,
    /// `None` samples the pattern unrotated
    pub angle: Option<f32>,
}

/// 256 point-pair intensity tests (BRIEF), optionally steered by keypoint orientation
#[derive(Debug, Clone)]
pub struct BriefPattern {
    pairs: Vec<(f32, f32, f32, f32)>,
}

impl Default for BriefPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl BriefPattern {
    /// Isotropic Gaussian pairs, sigma = patch / 5
    pub fn new() -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
        let sigma = PATCH_SIZE as f32 / 5.0;
        let mut sample = || (gaussian(&mut rng) * sigma).round().clamp(-MAX_OFFSET, MAX_OFFSET);
        let pairs = (0..N_PAIRS)
            .map(|_| (sample(), sample(), sample(), sample()))
            .collect();
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Descriptor of one location on a pre-smoothed plane
    pub fn describe(&self, img: &FloatImage, at: SamplePoint) -> BinaryDescriptor {
        let (s, c) = at.angle.map_or((0.0, 1.0), |a| a.sin_cos());
        let mut d = [0u8; DESCRIPTOR_SIZE];

        for (i, &(dx1, dy1, dx2, dy2)) in self.pairs.iter().enumerate() {
            // Rotate the pair and round to the nearest pixel
            let (rx1, ry1) = (
                (at.x + c * dx1 - s * dy1).round() as isize,
                (at.y + s * dx1 + c * dy1).round() as isize,
            );
            let (rx2, ry2) = (
                (at.x + c * dx2 - s * dy2).round() as isize,
                (at.y + s * dx2 + c * dy2).round() as isize,
            );

            let bit = (img.at(rx1, ry1) < img.at(rx2, ry2)) as u8;
            d[i / 8] |= bit << (i % 8);
        }
        d
    }

    /// Descriptors for many locations on the same plane, in input order
    pub fn describe_all(&self, img: &FloatImage, points: &[SamplePoint]) -> Vec<BinaryDescriptor> {
        points.par_iter().map(|&p| self.describe(img, p)).collect()
    }
}

/// Unsteered BRIEF on the full-resolution image, for detectors that assign no orientation
pub struct BriefExtractor {
    pattern: BriefPattern,
}

impl Default for BriefExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl BriefExtractor {
    pub fn new() -> Self {
        Self {
            pattern: BriefPattern::new(),
        }
    }

    /// Keypoints whose pattern would leave the image are dropped
    pub fn compute(&self, img: &GrayImage, keypoints: &[Keypoint]) -> (Vec<Keypoint>, Vec<BinaryDescriptor>) {
        let smooth = FloatImage::from_gray(img, 1.0).gaussian_blur_sized(BLUR_KSIZE, BLUR_SIGMA);
        let margin = MAX_OFFSET + 1.0;
        let (w, h) = (img.width() as f32, img.height() as f32);

        keypoints
            .par_iter()
            .filter(|kp| kp.x >= margin && kp.y >= margin && kp.x < w - margin && kp.y < h - margin)
            .map(|kp| {
                let d = self.pattern.describe(&smooth, SamplePoint { x: kp.x, y: kp.y, angle: None });
                (*kp, d)
            })
            .unzip()
    }
}

/// Standard normal sample via Box-Muller
fn gaussian<R: Rng>(rng: &mut R) -> f32 {
    let u1: f32 = 1.0 - rng.random::<f32>();
    let u2: f32 = rng.random::<f32>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}
