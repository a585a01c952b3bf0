use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use target_core::{AlignResult, BinaryDescriptor, FloatImage, Keypoint};

use crate::brief::{BriefPattern, SamplePoint, BLUR_KSIZE, BLUR_SIGMA, PATCH_SIZE};
use crate::fast::FastDetector;
use crate::pyramid::ImagePyramid;

/// Radius of the intensity-centroid patch
pub const HALF_PATCH: usize = PATCH_SIZE / 2;

/// Detection border; rotated test pairs reach 13 * sqrt(2) from the centre
pub const EDGE_THRESHOLD: usize = 19;

pub const HARRIS_K: f32 = 0.04;
const HARRIS_BLOCK: isize = 7;

/// Harris corner measure over a 7x7 block of Sobel gradients
pub fn harris_response(img: &FloatImage, x: f32, y: f32) -> f32 {
    let (cx, cy) = (x.round() as isize, y.round() as isize);
    let half = HARRIS_BLOCK / 2;
    // Gradients on the 0-255 scale, normalized per block
    let scale = 1.0 / (4.0 * HARRIS_BLOCK as f32 * 255.0);
    let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);

    for py in cy - half..=cy + half {
        for px in cx - half..=cx + half {
            let p = |dx: isize, dy: isize| img.at(px + dx, py + dy);
            let ix = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1) - p(-1, -1) - 2.0 * p(-1, 0) - p(-1, 1)) * scale;
            let iy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1) - p(-1, -1) - 2.0 * p(0, -1) - p(1, -1)) * scale;
            a += ix * ix;
            b += iy * iy;
            c += ix * iy;
        }
    }
    a * b - c * c - HARRIS_K * (a + b) * (a + b)
}

/// Intensity-centroid orientation in radians, `[0, 2π)`
pub fn centroid_angle(img: &FloatImage, x: f32, y: f32) -> f32 {
    let half = HALF_PATCH as isize;
    let (cx, cy) = (x.round() as isize, y.round() as isize);
    let mut m10 = 0.0f64;
    let mut m01 = 0.0f64;

    for dy in -half..=half {
        for dx in -half..=half {
            if dx * dx + dy * dy > half * half {
                continue;
            }
            let val = img.at(cx + dx, cy + dy) as f64;
            m10 += dx as f64 * val;
            m01 += dy as f64 * val;
        }
    }

    (m01.atan2(m10) as f32).rem_euclid(2.0 * std::f32::consts::PI)
}

/// Multi-scale FAST ranked by Harris response, with intensity-centroid orientation
pub struct OrbDetector {
    fast: FastDetector,
    n_features: usize,
}

impl OrbDetector {
    /// `n_features == 0` keeps every corner on every level
    pub fn new(fast_threshold: u8, n_features: usize) -> AlignResult<Self> {
        Ok(Self {
            fast: FastDetector::new(fast_threshold)?.with_border(EDGE_THRESHOLD),
            n_features,
        })
    }

    pub fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let pyramid = ImagePyramid::build(img, 2 * EDGE_THRESHOLD + 1);
        let budget = if self.n_features == 0 {
            vec![usize::MAX; pyramid.len()]
        } else {
            pyramid.features_per_level(self.n_features)
        };

        let mut keypoints = Vec::new();
        for (level, &quota) in pyramid.levels().iter().zip(&budget) {
            let plane = FloatImage::from_gray(&level.image, 1.0);
            let mut corners: Vec<(Keypoint, f32)> = self
                .fast
                .detect(&level.image)
                .into_par_iter()
                .map(|c| {
                    let harris = harris_response(&plane, c.x, c.y);
                    (c, harris)
                })
                .collect();
            // Stable: equal scores keep FAST order
            corners.sort_by(|a, b| b.1.total_cmp(&a.1));
            let found = corners.len();

            keypoints.extend(corners.into_iter().take(quota).map(|(c, harris)| Keypoint {
                x: c.x * level.scale,
                y: c.y * level.scale,
                size: PATCH_SIZE as f32 * level.scale,
                angle: centroid_angle(&plane, c.x, c.y),
                response: harris,
                octave: level.level as i32,
            }));
            debug!("ORB level {}: {} corners, kept {}", level.level, found, found.min(quota));
        }
        keypoints
    }
}

/// Steered BRIEF (rBRIEF) descriptors computed on the pyramid level matching each keypoint's size
pub struct OrbExtractor {
    pattern: BriefPattern,
}

impl Default for OrbExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl OrbExtractor {
    pub fn new() -> Self {
        Self {
            pattern: BriefPattern::new(),
        }
    }

    /// Keypoints too close to the border of their level are dropped; survivors get the measured orientation
    pub fn compute(&self, img: &GrayImage, keypoints: &[Keypoint]) -> (Vec<Keypoint>, Vec<BinaryDescriptor>) {
        let pyramid = ImagePyramid::build(img, 2 * EDGE_THRESHOLD + 1);
        if pyramid.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let planes: Vec<(FloatImage, FloatImage)> = pyramid
            .levels()
            .par_iter()
            .map(|level| {
                let raw = FloatImage::from_gray(&level.image, 1.0);
                let smooth = raw.gaussian_blur_sized(BLUR_KSIZE, BLUR_SIGMA);
                (raw, smooth)
            })
            .collect();

        keypoints
            .par_iter()
            .filter_map(|kp| {
                let level = pyramid.level_for_size(kp.size, PATCH_SIZE as f32);
                let info = &pyramid.levels()[level];
                let (raw, smooth) = &planes[level];
                let (lx, ly) = (kp.x / info.scale, kp.y / info.scale);

                let margin = (HALF_PATCH + 1) as f32;
                if lx < margin
                    || ly < margin
                    || lx >= raw.width() as f32 - margin
                    || ly >= raw.height() as f32 - margin
                {
                    return None;
                }

                let angle = centroid_angle(raw, lx, ly);
                let descriptor = self.pattern.describe(smooth, SamplePoint { x: lx, y: ly, angle: Some(angle) });
                Some((
                    Keypoint {
                        angle,
                        octave: level as i32,
                        ..*kp
                    },
                    descriptor,
                ))
            })
            .unzip()
    }
}
