//! Scale-invariant keypoints: difference-of-Gaussian extrema with sub-pixel
//! refinement, dominant gradient orientations and 4x4x8 gradient histograms.
//!
//! All angles are radians in image coordinates (x right, y down), so a
//! keypoint's angle grows clockwise on screen.

use image::GrayImage;
use log::debug;
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use std::f32::consts::PI;
use target_core::{AlignResult, FloatDescriptor, FloatImage, Keypoint};

const ORI_BINS: usize = 36;
const ORI_PEAK_RATIO: f32 = 0.8;
const ORI_SIGMA_FACTOR: f32 = 1.5;
const ORI_RADIUS_FACTOR: f32 = 3.0 * ORI_SIGMA_FACTOR;

const DESCR_WIDTH: usize = 4;
const DESCR_BINS: usize = 8;
const DESCR_SCALE_FACTOR: f32 = 3.0;
const DESCR_MAG_THRESHOLD: f32 = 0.2;

const MAX_INTERP_STEPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiftParams {
    /// Blur of the first image of every octave
    pub sigma: f32,
    /// Layers per octave searched for extrema
    pub n_layers: usize,
    /// Blur already present in the input
    pub assumed_blur: f32,
    pub border: usize,
    pub contrast_threshold: f32,
    /// Maximum principal curvature ratio
    pub edge_threshold: f32,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            sigma: 1.6,
            n_layers: 3,
            assumed_blur: 0.5,
            border: 5,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
        }
    }
}

struct Octave {
    // n_layers + 3 blurred images
    gaussians: Vec<FloatImage>,
    // n_layers + 2 differences of consecutive blurs
    dogs: Vec<FloatImage>,
}

#[derive(Debug, Clone, Copy)]
struct Extremum {
    octave: usize,
    layer: usize,
    x: usize,
    y: usize,
}

#[derive(Debug, Clone, Copy)]
struct Refined {
    octave: usize,
    layer: usize,
    x: usize,
    y: usize,
    /// Sub-pixel offset in (x, y, layer)
    offset: Vector3<f32>,
    contrast: f32,
}

/// Gaussian scale space of one image; octave 0 is the image upsampled 2x
pub struct ScaleSpace {
    octaves: Vec<Octave>,
    params: SiftParams,
}

impl ScaleSpace {
    pub fn build(img: &GrayImage, params: SiftParams) -> AlignResult<Self> {
        if img.width() == 0 || img.height() == 0 {
            return Ok(Self { octaves: Vec::new(), params });
        }
        let s = params.n_layers;

        // Doubling the input doubles its assumed blur too
        let doubled = FloatImage::from_gray(img, 1.0 / 255.0).upsample_double();
        let prior = 2.0 * params.assumed_blur;
        let sig_diff = (params.sigma * params.sigma - prior * prior).max(0.01).sqrt();
        let mut base = doubled.gaussian_blur(sig_diff);

        let min_dim = base.width().min(base.height()) as f32;
        let n_octaves = (min_dim.log2().floor() as i32 - 2).max(1) as usize;

        // Incremental blur taking layer i - 1 to layer i
        let k = 2f32.powf(1.0 / s as f32);
        let mut sigmas = vec![params.sigma; s + 3];
        for (i, sig) in sigmas.iter_mut().enumerate().skip(1) {
            let prev = params.sigma * k.powi(i as i32 - 1);
            let total = prev * k;
            *sig = (total * total - prev * prev).sqrt();
        }

        let min_size = 2 * params.border + 3;
        let mut octaves = Vec::with_capacity(n_octaves);
        for _ in 0..n_octaves {
            if base.width() < min_size || base.height() < min_size {
                break;
            }
            let mut gaussians = Vec::with_capacity(s + 3);
            gaussians.push(base);
            for &sig in &sigmas[1..] {
                let next = gaussians[gaussians.len() - 1].gaussian_blur(sig);
                gaussians.push(next);
            }

            let dogs = gaussians
                .windows(2)
                .map(|pair| pair[1].subtract(&pair[0]))
                .collect::<AlignResult<Vec<_>>>()?;

            base = gaussians[s].downsample_half();
            octaves.push(Octave { gaussians, dogs });
        }

        Ok(Self { octaves, params })
    }

    pub fn n_octaves(&self) -> usize {
        self.octaves.len()
    }

    pub fn params(&self) -> &SiftParams {
        &self.params
    }

    /// Refined, oriented extrema in input-image coordinates
    pub fn detect(&self) -> Vec<Keypoint> {
        let candidates = self.find_extrema();
        let keypoints: Vec<Keypoint> = candidates
            .par_iter()
            .filter_map(|e| self.refine(e))
            .flat_map_iter(|r| self.oriented_keypoints(&r))
            .collect();
        debug!(
            "SIFT: {} octaves, {} extrema, {} keypoints",
            self.octaves.len(),
            candidates.len(),
            keypoints.len()
        );
        keypoints
    }

    /// Descriptors for arbitrary keypoints, sampled at the octave and layer matching their size
    pub fn compute(&self, keypoints: &[Keypoint]) -> Vec<FloatDescriptor> {
        keypoints
            .par_iter()
            .map(|kp| {
                let Some((octave, layer)) = self.octave_layer_for(kp.size) else {
                    return [0.0; 128];
                };
                let img = &self.octaves[octave].gaussians[layer];
                let to_octave = 2.0 / (1u32 << octave) as f32;
                let scl = kp.size * 0.5 * to_octave;
                descriptor(img, kp.x * to_octave, kp.y * to_octave, kp.angle, scl)
            })
            .collect()
    }

    fn find_extrema(&self) -> Vec<Extremum> {
        let s = self.params.n_layers;
        let threshold = 0.5 * self.params.contrast_threshold / s as f32;
        let border = self.params.border;
        let mut out = Vec::new();

        for (o, octave) in self.octaves.iter().enumerate() {
            let (w, h) = (octave.dogs[0].width(), octave.dogs[0].height());
            for layer in 1..=s {
                let (prev, cur, next) = (&octave.dogs[layer - 1], &octave.dogs[layer], &octave.dogs[layer + 1]);
                let found: Vec<Extremum> = (border..h - border)
                    .into_par_iter()
                    .flat_map_iter(|y| {
                        (border..w - border)
                            .filter(move |&x| is_extremum(prev, cur, next, x, y, threshold))
                            .map(move |x| Extremum { octave: o, layer, x, y })
                    })
                    .collect();
                out.extend(found);
            }
        }
        out
    }

    fn derivatives(&self, e: &Extremum) -> (Vector3<f32>, Matrix3<f32>) {
        let dogs = &self.octaves[e.octave].dogs;
        let (prev, cur, next) = (&dogs[e.layer - 1], &dogs[e.layer], &dogs[e.layer + 1]);
        let (x, y) = (e.x, e.y);
        let v = cur.get(x, y);

        let gradient = Vector3::new(
            (cur.get(x + 1, y) - cur.get(x - 1, y)) * 0.5,
            (cur.get(x, y + 1) - cur.get(x, y - 1)) * 0.5,
            (next.get(x, y) - prev.get(x, y)) * 0.5,
        );

        let dxx = cur.get(x + 1, y) + cur.get(x - 1, y) - 2.0 * v;
        let dyy = cur.get(x, y + 1) + cur.get(x, y - 1) - 2.0 * v;
        let dss = next.get(x, y) + prev.get(x, y) - 2.0 * v;
        let dxy = (cur.get(x + 1, y + 1) - cur.get(x - 1, y + 1) - cur.get(x + 1, y - 1)
            + cur.get(x - 1, y - 1))
            * 0.25;
        let dxs = (next.get(x + 1, y) - next.get(x - 1, y) - prev.get(x + 1, y) + prev.get(x - 1, y)) * 0.25;
        let dys = (next.get(x, y + 1) - next.get(x, y - 1) - prev.get(x, y + 1) + prev.get(x, y - 1)) * 0.25;

        let hessian = Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss);
        (gradient, hessian)
    }

    /// Quadratic interpolation of an extremum; `None` when it drifts away, is weak or lies on an edge
    fn refine(&self, start: &Extremum) -> Option<Refined> {
        let s = self.params.n_layers;
        let border = self.params.border;
        let mut e = *start;
        let (w, h) = {
            let dog = &self.octaves[e.octave].dogs[0];
            (dog.width(), dog.height())
        };

        let mut step = 0;
        let (gradient, hessian, offset) = loop {
            let (gradient, hessian) = self.derivatives(&e);
            let offset = -hessian.try_inverse()? * gradient;

            if offset.iter().all(|v| v.abs() < 0.5) {
                break (gradient, hessian, offset);
            }
            if offset.iter().any(|v| !v.is_finite() || v.abs() > 1e6) {
                return None;
            }

            let nx = e.x as isize + offset.x.round() as isize;
            let ny = e.y as isize + offset.y.round() as isize;
            let nl = e.layer as isize + offset.z.round() as isize;
            if nl < 1
                || nl > s as isize
                || nx < border as isize
                || nx >= (w - border) as isize
                || ny < border as isize
                || ny >= (h - border) as isize
            {
                return None;
            }
            e = Extremum { octave: e.octave, layer: nl as usize, x: nx as usize, y: ny as usize };

            step += 1;
            if step >= MAX_INTERP_STEPS {
                return None;
            }
        };

        let value = self.octaves[e.octave].dogs[e.layer].get(e.x, e.y);
        let contrast = value + 0.5 * gradient.dot(&offset);
        if contrast.abs() * (s as f32) < self.params.contrast_threshold {
            return None;
        }

        let (dxx, dyy, dxy) = (hessian[(0, 0)], hessian[(1, 1)], hessian[(0, 1)]);
        let trace = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let r = self.params.edge_threshold;
        if det <= 0.0 || trace * trace * r >= (r + 1.0) * (r + 1.0) * det {
            return None;
        }

        Some(Refined {
            octave: e.octave,
            layer: e.layer,
            x: e.x,
            y: e.y,
            offset,
            contrast,
        })
    }

    /// One keypoint per dominant orientation of a refined extremum
    fn oriented_keypoints(&self, r: &Refined) -> Vec<Keypoint> {
        let s = self.params.n_layers as f32;
        let octave_scale = (1u32 << r.octave) as f32;
        // Blur of the extremum relative to its octave
        let scl_octave = self.params.sigma * 2f32.powf((r.layer as f32 + r.offset.z) / s);

        let img = &self.octaves[r.octave].gaussians[r.layer];
        let radius = (ORI_RADIUS_FACTOR * scl_octave).round() as isize;
        let hist = orientation_histogram(img, r.x as isize, r.y as isize, radius, ORI_SIGMA_FACTOR * scl_octave);
        let max = hist.iter().cloned().fold(0.0f32, f32::max);
        let threshold = max * ORI_PEAK_RATIO;

        // Octave 0 is the doubled image
        let base = Keypoint {
            x: (r.x as f32 + r.offset.x) * octave_scale * 0.5,
            y: (r.y as f32 + r.offset.y) * octave_scale * 0.5,
            size: scl_octave * octave_scale,
            angle: 0.0,
            response: r.contrast.abs(),
            octave: r.octave as i32,
        };

        let n = ORI_BINS;
        let mut out = Vec::new();
        for j in 0..n {
            let left = hist[(j + n - 1) % n];
            let right = hist[(j + 1) % n];
            if hist[j] > left && hist[j] > right && hist[j] >= threshold {
                let mut bin = j as f32 + 0.5 * (left - right) / (left - 2.0 * hist[j] + right);
                if bin < 0.0 {
                    bin += n as f32;
                } else if bin >= n as f32 {
                    bin -= n as f32;
                }
                let mut angle = bin * 2.0 * PI / n as f32;
                if angle >= 2.0 * PI - f32::EPSILON {
                    angle = 0.0;
                }
                out.push(Keypoint { angle, ..base });
            }
        }
        out
    }

    /// Octave and Gaussian layer whose blur matches a keypoint diameter
    fn octave_layer_for(&self, size: f32) -> Option<(usize, usize)> {
        if self.octaves.is_empty() {
            return None;
        }
        let s = self.params.n_layers;
        // size = sigma * 2^(octave + layer / s)
        let v = (size.max(f32::EPSILON) / self.params.sigma).log2();
        if v <= 0.0 {
            return Some((0, 0));
        }
        let mut octave = v.floor() as usize;
        let mut layer = ((v - octave as f32) * s as f32).round() as usize;
        if layer == 0 && octave > 0 {
            octave -= 1;
            layer = s;
        }
        if octave >= self.octaves.len() {
            octave = self.octaves.len() - 1;
            layer = ((v - octave as f32) * s as f32).round() as usize;
        }
        Some((octave, layer.min(s + 2)))
    }
}

fn is_extremum(prev: &FloatImage, cur: &FloatImage, next: &FloatImage, x: usize, y: usize, threshold: f32) -> bool {
    let v = cur.get(x, y);
    if v.abs() <= threshold {
        return false;
    }
    let neighbours = |f: &dyn Fn(f32) -> bool| {
        for img in [prev, cur, next] {
            for yy in y - 1..=y + 1 {
                for xx in x - 1..=x + 1 {
                    if std::ptr::eq(img, cur) && xx == x && yy == y {
                        continue;
                    }
                    if !f(img.get(xx, yy)) {
                        return false;
                    }
                }
            }
        }
        true
    };
    if v > 0.0 {
        neighbours(&|n| v >= n)
    } else {
        neighbours(&|n| v <= n)
    }
}

/// Smoothed 36-bin histogram of Gaussian-weighted gradient orientations around (x, y)
fn orientation_histogram(img: &FloatImage, x: isize, y: isize, radius: isize, sigma: f32) -> [f32; ORI_BINS] {
    let (w, h) = (img.width() as isize, img.height() as isize);
    let expf = -1.0 / (2.0 * sigma * sigma);
    let mut raw = [0.0f32; ORI_BINS];

    for i in -radius..=radius {
        let yy = y + i;
        if yy <= 0 || yy >= h - 1 {
            continue;
        }
        for j in -radius..=radius {
            let xx = x + j;
            if xx <= 0 || xx >= w - 1 {
                continue;
            }
            let (ux, uy) = (xx as usize, yy as usize);
            let dx = img.get(ux + 1, uy) - img.get(ux - 1, uy);
            let dy = img.get(ux, uy + 1) - img.get(ux, uy - 1);
            let weight = (((i * i + j * j) as f32) * expf).exp();
            let mag = (dx * dx + dy * dy).sqrt();
            let ori = dy.atan2(dx).rem_euclid(2.0 * PI);
            let bin = ((ori * ORI_BINS as f32 / (2.0 * PI)).round() as usize) % ORI_BINS;
            raw[bin] += weight * mag;
        }
    }

    let n = ORI_BINS;
    let mut hist = [0.0f32; ORI_BINS];
    for (i, out) in hist.iter_mut().enumerate() {
        let at = |d: isize| raw[(i as isize + d).rem_euclid(n as isize) as usize];
        *out = (at(-2) + at(2)) * (1.0 / 16.0) + (at(-1) + at(1)) * (4.0 / 16.0) + at(0) * (6.0 / 16.0);
    }
    hist
}

/// 4x4 spatial by 8 orientation histogram, normalized, clipped at 0.2 and renormalized
fn descriptor(img: &FloatImage, px: f32, py: f32, angle: f32, scl: f32) -> FloatDescriptor {
    let d = DESCR_WIDTH;
    let n = DESCR_BINS;
    let (w, h) = (img.width() as isize, img.height() as isize);
    let (cx, cy) = (px.round() as isize, py.round() as isize);

    let hist_width = DESCR_SCALE_FACTOR * scl;
    let diag = ((w * w + h * h) as f32).sqrt();
    let radius = (hist_width * std::f32::consts::SQRT_2 * (d as f32 + 1.0) * 0.5)
        .round()
        .min(diag) as isize;
    let (sin_t, cos_t) = angle.sin_cos();
    let (cos_t, sin_t) = (cos_t / hist_width, sin_t / hist_width);
    let exp_scale = -1.0 / (d as f32 * d as f32 * 0.5);
    let bins_per_rad = n as f32 / (2.0 * PI);

    // (d + 2) x (d + 2) x (n + 2) with a guard band for trilinear spill
    let stride_r = (d + 2) * (n + 2);
    let stride_c = n + 2;
    let mut hist = vec![0.0f32; (d + 2) * stride_r];

    for i in -radius..=radius {
        for j in -radius..=radius {
            // Offset rotated into the keypoint frame, in histogram cells
            let c_rot = j as f32 * cos_t + i as f32 * sin_t;
            let r_rot = -(j as f32) * sin_t + i as f32 * cos_t;
            let rbin = r_rot + d as f32 / 2.0 - 0.5;
            let cbin = c_rot + d as f32 / 2.0 - 0.5;
            let (r, c) = (cy + i, cx + j);

            if rbin <= -1.0 || rbin >= d as f32 || cbin <= -1.0 || cbin >= d as f32 {
                continue;
            }
            if r <= 0 || r >= h - 1 || c <= 0 || c >= w - 1 {
                continue;
            }
            let (ur, uc) = (r as usize, c as usize);
            let dx = img.get(uc + 1, ur) - img.get(uc - 1, ur);
            let dy = img.get(uc, ur + 1) - img.get(uc, ur - 1);
            let mag = (dx * dx + dy * dy).sqrt() * ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
            let obin = (dy.atan2(dx) - angle).rem_euclid(2.0 * PI) * bins_per_rad;

            let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
            let (fr, fc, fo) = (rbin - r0, cbin - c0, obin - o0);
            let o0 = (o0 as usize) % n;
            let base = (r0 as isize + 1) as usize * stride_r + (c0 as isize + 1) as usize * stride_c + o0;

            let v_r1 = mag * fr;
            let v_r0 = mag - v_r1;
            let v_rc11 = v_r1 * fc;
            let v_rc10 = v_r1 - v_rc11;
            let v_rc01 = v_r0 * fc;
            let v_rc00 = v_r0 - v_rc01;

            for (cell, v) in [
                (base, v_rc00),
                (base + stride_c, v_rc01),
                (base + stride_r, v_rc10),
                (base + stride_r + stride_c, v_rc11),
            ] {
                let hi = v * fo;
                hist[cell] += v - hi;
                hist[cell + 1] += hi;
            }
        }
    }

    let mut out = [0.0f32; 128];
    for r in 0..d {
        for c in 0..d {
            let idx = (r + 1) * stride_r + (c + 1) * stride_c;
            // Fold the wrap-around bin back onto bin 0
            hist[idx] += hist[idx + n];
            for o in 0..n {
                out[(r * d + c) * n + o] = hist[idx + o];
            }
        }
    }

    normalize(&mut out);
    for v in out.iter_mut() {
        *v = v.min(DESCR_MAG_THRESHOLD);
    }
    normalize(&mut out);
    out
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blob_image(size: u32, cx: f32, cy: f32, radius: f32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            Luma([if d < radius { 220 } else { 30 }])
        })
    }

    fn textured_image(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let v = ((x / 12 * 7 + y / 9 * 13) % 5) as u8 * 45 + ((x * y) % 3) as u8;
            Luma([v])
        })
    }

    fn euclidean(a: &FloatDescriptor, b: &FloatDescriptor) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
    }

    #[test]
    fn test_scale_space_shape() {
        let img = GrayImage::from_pixel(64, 48, Luma([100]));
        let space = ScaleSpace::build(&img, SiftParams::default()).unwrap();
        assert!(space.n_octaves() >= 3);
        let first = &space.octaves[0];
        assert_eq!(first.gaussians.len(), 6);
        assert_eq!(first.dogs.len(), 5);
        assert_eq!((first.gaussians[0].width(), first.gaussians[0].height()), (128, 96));
        assert_eq!(space.octaves[1].gaussians[0].width(), 64);
    }

    #[test]
    fn test_empty_image() {
        let space = ScaleSpace::build(&GrayImage::new(0, 0), SiftParams::default()).unwrap();
        assert_eq!(space.n_octaves(), 0);
        assert!(space.detect().is_empty());
        assert_eq!(space.compute(&[Keypoint::new(1.0, 1.0, 4.0)]).len(), 1);
    }

    #[test]
    fn test_flat_image_has_no_keypoints() {
        let img = GrayImage::from_pixel(64, 64, Luma([90]));
        let space = ScaleSpace::build(&img, SiftParams::default()).unwrap();
        assert!(space.detect().is_empty());
    }

    #[test]
    fn test_blob_is_detected_at_its_centre() {
        let img = blob_image(96, 48.0, 48.0, 8.0);
        let space = ScaleSpace::build(&img, SiftParams::default()).unwrap();
        let keypoints = space.detect();
        assert!(!keypoints.is_empty());
        let best = keypoints
            .iter()
            .max_by(|a, b| a.response.total_cmp(&b.response))
            .unwrap();
        assert!((best.x - 48.0).abs() < 2.0, "x = {}", best.x);
        assert!((best.y - 48.0).abs() < 2.0, "y = {}", best.y);
        // Blob of radius 8 responds at a blur near 8 / sqrt(2)
        assert!(best.size > 4.0 && best.size < 24.0, "size = {}", best.size);
    }

    #[test]
    fn test_keypoints_are_valid() {
        let img = textured_image(120);
        let space = ScaleSpace::build(&img, SiftParams::default()).unwrap();
        for kp in space.detect() {
            assert!(kp.x >= 0.0 && kp.x < 120.0 && kp.y >= 0.0 && kp.y < 120.0);
            assert!(kp.angle >= 0.0 && kp.angle < 2.0 * PI);
            assert!(kp.size > 0.0 && kp.response > 0.0);
        }
    }

    #[test]
    fn test_descriptor_is_unit_and_clipped() {
        let img = textured_image(120);
        let space = ScaleSpace::build(&img, SiftParams::default()).unwrap();
        let kp = Keypoint { angle: 0.7, ..Keypoint::new(60.0, 60.0, 6.4) };
        let desc = space.compute(&[kp])[0];
        let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
        assert!(desc.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(desc.iter().filter(|&&v| v > 0.0).count() > 8);
    }

    #[test]
    fn test_descriptor_translation_invariance() {
        let a = textured_image(120);
        // Same content shifted by (12, 9), a multiple of the texture cell
        let b = GrayImage::from_fn(120, 120, |x, y| *a.get_pixel((x + 12).min(119), (y + 9).min(119)));
        let sa = ScaleSpace::build(&a, SiftParams::default()).unwrap();
        let sb = ScaleSpace::build(&b, SiftParams::default()).unwrap();
        let da = sa.compute(&[Keypoint::new(60.0, 60.0, 5.0)])[0];
        let db = sb.compute(&[Keypoint::new(48.0, 51.0, 5.0)])[0];
        let other = sb.compute(&[Keypoint::new(30.0, 70.0, 5.0)])[0];
        assert!(euclidean(&da, &db) < 0.05);
        assert!(euclidean(&da, &other) > euclidean(&da, &db));
    }

    #[test]
    fn test_octave_layer_for_size() {
        let img = GrayImage::from_pixel(128, 128, Luma([0]));
        let space = ScaleSpace::build(&img, SiftParams::default()).unwrap();
        // size = 1.6 * 2^(o + l / 3)
        assert_eq!(space.octave_layer_for(1.6 * 2f32.powf(1.0 + 2.0 / 3.0)), Some((1, 2)));
        assert_eq!(space.octave_layer_for(1.6 * 2.0), Some((0, 3)));
        assert_eq!(space.octave_layer_for(0.5), Some((0, 0)));
        let (o, _) = space.octave_layer_for(1e6).unwrap();
        assert_eq!(o, space.n_octaves() - 1);
    }
}
