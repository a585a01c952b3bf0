use image::{GrayImage, RgbImage};
use rayon::prelude::*;

use crate::error::{AlignError, AlignResult};

/// Row-major single-channel `f32` image
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl FloatImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> AlignResult<Self> {
        if data.len() != width * height {
            return Err(AlignError::InvalidInput(format!(
                "plane data length mismatch: expected {}, got {}",
                width * height,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Gray levels multiplied by `scale`
    pub fn from_gray(img: &GrayImage, scale: f32) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw().iter().map(|&v| v as f32 * scale).collect(),
        }
    }

    pub fn from_rgb_channel(img: &RgbImage, channel: usize) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.pixels().map(|p| p.0[channel] as f32).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Sample with coordinates clamped to the border
    #[inline]
    pub fn at(&self, x: isize, y: isize) -> f32 {
        let xx = x.clamp(0, self.width as isize - 1) as usize;
        let yy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[yy * self.width + xx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| v as f64).sum::<f64>() / self.data.len() as f64
    }

    fn check_same_size(&self, other: &FloatImage) -> AlignResult<()> {
        if self.width != other.width || self.height != other.height {
            return Err(AlignError::dimension_mismatch(
                (self.width as u32, self.height as u32),
                (other.width as u32, other.height as u32),
            ));
        }
        Ok(())
    }

    /// Element-wise `self - other`
    pub fn subtract(&self, other: &FloatImage) -> AlignResult<FloatImage> {
        self.check_same_size(other)?;
        let data = self.data.iter().zip(&other.data).map(|(a, b)| a - b).collect();
        Ok(Self { width: self.width, height: self.height, data })
    }

    /// Element-wise `self * other`
    pub fn multiply(&self, other: &FloatImage) -> AlignResult<FloatImage> {
        self.check_same_size(other)?;
        let data = self.data.iter().zip(&other.data).map(|(a, b)| a * b).collect();
        Ok(Self { width: self.width, height: self.height, data })
    }

    /// Gaussian blur with the kernel size derived from sigma (`2 * round(4 * sigma) + 1`)
    pub fn gaussian_blur(&self, sigma: f32) -> FloatImage {
        let ksize = 2 * (4.0 * sigma).round().max(1.0) as usize + 1;
        self.gaussian_blur_sized(ksize, sigma)
    }

    /// Separable Gaussian blur with a fixed odd kernel size and reflect-101 borders
    pub fn gaussian_blur_sized(&self, ksize: usize, sigma: f32) -> FloatImage {
        if self.data.is_empty() || sigma <= 0.0 {
            return self.clone();
        }
        let kernel = gaussian_kernel(ksize | 1, sigma);
        let half = (kernel.len() / 2) as isize;
        let (w, h) = (self.width, self.height);

        let mut horizontal = vec![0.0f32; w * h];
        horizontal
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                let src = &self.data[y * w..(y + 1) * w];
                for (x, out) in row.iter_mut().enumerate() {
                    let mut acc = 0.0;
                    for (k, &weight) in kernel.iter().enumerate() {
                        let xx = reflect101(x as isize + k as isize - half, w);
                        acc += weight * src[xx];
                    }
                    *out = acc;
                }
            });

        let mut data = vec![0.0f32; w * h];
        data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (k, &weight) in kernel.iter().enumerate() {
                let yy = reflect101(y as isize + k as isize - half, h);
                let src = &horizontal[yy * w..(yy + 1) * w];
                for (out, &v) in row.iter_mut().zip(src) {
                    *out += weight * v;
                }
            }
        });

        Self { width: w, height: h, data }
    }

    /// Keep every second pixel in both directions
    pub fn downsample_half(&self) -> FloatImage {
        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);
        let mut out = FloatImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                out.data[y * w + x] = self.get((2 * x).min(self.width - 1), (2 * y).min(self.height - 1));
            }
        }
        out
    }

    /// Double both dimensions with bilinear interpolation
    pub fn upsample_double(&self) -> FloatImage {
        let w = self.width * 2;
        let h = self.height * 2;
        let mut out = FloatImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                out.data[y * w + x] = self.bilinear_sample(x as f32 * 0.5, y as f32 * 0.5);
            }
        }
        out
    }

    /// Resample to the target size using bilinear interpolation
    pub fn resize(&self, target_width: usize, target_height: usize) -> FloatImage {
        let mut out = FloatImage::new(target_width, target_height);
        let x_ratio = self.width as f32 / target_width as f32;
        let y_ratio = self.height as f32 / target_height as f32;
        for y in 0..target_height {
            for x in 0..target_width {
                out.data[y * target_width + x] =
                    self.bilinear_sample(x as f32 * x_ratio, y as f32 * y_ratio);
            }
        }
        out
    }

    /// Sample at fractional coordinates using bilinear interpolation, clamped to the border
    pub fn bilinear_sample(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.width - 1) as f32);
        let y = y.clamp(0.0, (self.height - 1) as f32);
        let x1 = x.floor() as usize;
        let y1 = y.floor() as usize;
        let x2 = (x1 + 1).min(self.width - 1);
        let y2 = (y1 + 1).min(self.height - 1);

        let fx = x - x1 as f32;
        let fy = y - y1 as f32;

        let p11 = self.get(x1, y1);
        let p12 = self.get(x2, y1);
        let p21 = self.get(x1, y2);
        let p22 = self.get(x2, y2);

        let top = p11 * (1.0 - fx) + p12 * fx;
        let bottom = p21 * (1.0 - fx) + p22 * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    let center = (ksize / 2) as f32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - center;
            (-d * d / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Mirror an index into `0..n` without repeating the edge sample (`dcb|abcd|cba`)
#[inline]
fn reflect101(mut i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize) -> FloatImage {
        let data = (0..width * height).map(|i| (i % width) as f32).collect();
        FloatImage::from_vec(width, height, data).unwrap()
    }

    #[test]
    fn test_from_vec_length_check() {
        assert!(FloatImage::from_vec(3, 3, vec![0.0; 8]).is_err());
        assert!(FloatImage::from_vec(3, 3, vec![0.0; 9]).is_ok());
    }

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-3, 1), 0);
    }

    #[test]
    fn test_kernel_is_normalized() {
        let k = gaussian_kernel(11, 1.5);
        assert_eq!(k.len(), 11);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(k[5] > k[4] && (k[4] - k[6]).abs() < 1e-7);
    }

    #[test]
    fn test_blur_preserves_constant() {
        let img = FloatImage::from_vec(16, 9, vec![42.0; 16 * 9]).unwrap();
        let blurred = img.gaussian_blur_sized(11, 1.5);
        for &v in blurred.data() {
            assert!((v - 42.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_blur_preserves_linear_ramp_interior() {
        let img = ramp(32, 8);
        let blurred = img.gaussian_blur(1.0);
        for x in 6..26 {
            assert!((blurred.get(x, 4) - x as f32).abs() < 1e-3);
        }
    }

    #[test]
    fn test_resampling_dimensions() {
        let img = ramp(10, 6);
        assert_eq!(img.downsample_half().width(), 5);
        assert_eq!(img.downsample_half().height(), 3);
        assert_eq!(img.downsample_half().get(2, 1), 4.0);
        let up = img.upsample_double();
        assert_eq!((up.width(), up.height()), (20, 12));
        assert!((up.get(3, 0) - 1.5).abs() < 1e-6);
        let resized = img.resize(5, 3);
        assert!((resized.get(1, 1) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_arithmetic_dimension_check() {
        let a = ramp(4, 4);
        let b = ramp(5, 4);
        assert!(matches!(a.subtract(&b), Err(AlignError::DimensionMismatch { .. })));
        let d = a.subtract(&a).unwrap();
        assert!(d.data().iter().all(|&v| v == 0.0));
        let sq = a.multiply(&a).unwrap();
        assert_eq!(sq.get(3, 0), 9.0);
    }

    #[test]
    fn test_bilinear_sample() {
        let img = ramp(4, 4);
        assert!((img.bilinear_sample(1.25, 2.0) - 1.25).abs() < 1e-6);
        assert_eq!(img.bilinear_sample(-5.0, 0.0), 0.0);
        assert_eq!(img.bilinear_sample(10.0, 0.0), 3.0);
    }
}
