use image::GrayImage;
use rayon::prelude::*;
use target_core::{AlignError, AlignResult, Keypoint};

/// Bresenham circle of radius 3, clockwise from the left
const CIRCLE: [(i32, i32); 16] = [
    (-3, 0), (-3, 1), (-2, 2), (-1, 3),
    (0, 3), (1, 3), (2, 2), (3, 1),
    (3, 0), (3, -1), (2, -2), (1, -3),
    (0, -3), (-1, -3), (-2, -2), (-3, -1),
];

/// Contiguous circle pixels required for a corner (FAST-9)
const ARC_LENGTH: usize = 9;

/// Diameter reported for full-resolution FAST keypoints
pub const FAST_KEYPOINT_SIZE: f32 = 7.0;

/// Keypoint with corner response score for NMS
#[derive(Debug, Clone, Copy)]
pub struct ScoredCorner {
    pub x: usize,
    pub y: usize,
    pub response: f32,
}

pub struct FastDetector {
    threshold: u8,
    border: usize,
    nms_radius: f32,
}

impl FastDetector {
    /// Creates a new FAST detector with validation
    pub fn new(threshold: u8) -> AlignResult<Self> {
        // 0 would detect everything, >127 overflows the u8 comparisons
        if threshold == 0 || threshold > 127 {
            return Err(AlignError::InvalidConfig(format!(
                "FAST threshold {} outside 1-127",
                threshold
            )));
        }
        Ok(Self {
            threshold,
            border: 3,
            nms_radius: 3.0,
        })
    }

    /// Keep candidates at least `border` pixels from the image edge (minimum 3)
    pub fn with_border(mut self, border: usize) -> Self {
        self.border = border.max(3);
        self
    }

    pub fn with_nms_radius(mut self, radius: f32) -> Self {
        self.nms_radius = radius;
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Detect corners and return them as keypoints, strongest first
    pub fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let scored = self.detect_with_response(img);
        let kept = non_maximum_suppression(&scored, self.nms_radius);
        kept.into_iter()
            .map(|c| Keypoint {
                x: c.x as f32,
                y: c.y as f32,
                size: FAST_KEYPOINT_SIZE,
                angle: 0.0,
                response: c.response,
                octave: 0,
            })
            .collect()
    }

    /// Detect corners with response scores, row-major order
    pub fn detect_with_response(&self, img: &GrayImage) -> Vec<ScoredCorner> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        if w <= 2 * self.border || h <= 2 * self.border {
            return Vec::new();
        }
        let data = img.as_raw();
        let t = self.threshold;

        (self.border..h - self.border)
            .into_par_iter()
            .flat_map_iter(|y| {
                let mut v = Vec::new();
                for x in self.border..w - self.border {
                    let p = data[y * w + x];
                    let mut ring = [0u8; 16];
                    for (i, &(dx, dy)) in CIRCLE.iter().enumerate() {
                        let xx = (x as i32 + dx) as usize;
                        let yy = (y as i32 + dy) as usize;
                        ring[i] = data[yy * w + xx];
                    }

                    let (pi, ti) = (p as i16, t as i16);
                    let bright = ring.map(|q| q as i16 >= pi + ti);
                    let dark = ring.map(|q| q as i16 <= pi - ti);

                    let response = if has_arc(&bright) {
                        arc_response(&ring, p, &bright)
                    } else if has_arc(&dark) {
                        arc_response(&ring, p, &dark)
                    } else {
                        continue;
                    };
                    v.push(ScoredCorner { x, y, response });
                }
                v
            })
            .collect()
    }
}

/// True when `ARC_LENGTH` consecutive flags are set, wrapping around the circle
fn has_arc(flags: &[bool; 16]) -> bool {
    let mask = flags
        .iter()
        .enumerate()
        .fold(0u16, |m, (i, &f)| m | ((f as u16) << i));

    // A run of n set bits survives n - 1 rotate-and-AND steps
    let mut run = mask;
    for i in 1..ARC_LENGTH as u32 {
        run &= mask.rotate_left(i);
        if run == 0 {
            return false;
        }
    }
    run != 0
}

/// Mean absolute difference of the qualifying circle pixels from the centre
fn arc_response(ring: &[u8; 16], p: u8, flags: &[bool; 16]) -> f32 {
    let (sum, count) = ring
        .iter()
        .zip(flags)
        .filter(|&(_, &f)| f)
        .fold((0i32, 0i32), |(s, c), (&q, _)| (s + (q as i32 - p as i32).abs(), c + 1));
    sum as f32 / count.max(1) as f32
}

/// Non-Maximum Suppression to remove nearby redundant corners
pub fn non_maximum_suppression(corners: &[ScoredCorner], min_distance: f32) -> Vec<ScoredCorner> {
    if corners.is_empty() {
        return Vec::new();
    }

    // Stable sort keeps row-major order among equal responses
    let mut sorted = corners.to_vec();
    sorted.sort_by(|a, b| b.response.partial_cmp(&a.response).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<ScoredCorner> = Vec::new();
    let min_distance_sq = min_distance * min_distance;

    for candidate in sorted {
        let is_local_maximum = kept.iter().all(|accepted| {
            let dx = candidate.x as f32 - accepted.x as f32;
            let dy = candidate.y as f32 - accepted.y as f32;
            dx * dx + dy * dy >= min_distance_sq
        });
        if is_local_maximum {
            kept.push(candidate);
        }
    }

    kept
}
