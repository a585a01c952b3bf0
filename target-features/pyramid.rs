use image::GrayImage;

/// Standard ORB scale factor between consecutive levels
pub const SCALE_FACTOR: f32 = 1.2;
pub const MAX_LEVELS: usize = 8;

/// One resampled copy of the base image
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub level: usize,
    /// Base-image pixels per level pixel
    pub scale: f32,
    pub image: GrayImage,
}

/// Image pyramid for multi-scale feature detection
#[derive(Debug, Clone)]
pub struct ImagePyramid {
    levels: Vec<PyramidLevel>,
}

impl ImagePyramid {
    /// Build up to `MAX_LEVELS` levels, stopping once a level would be smaller than `min_size`
    pub fn build(img: &GrayImage, min_size: usize) -> Self {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let mut levels = Vec::new();
        let mut scale = 1.0f32;

        for level in 0..MAX_LEVELS {
            let scaled_width = ((width as f32) / scale).round() as usize;
            let scaled_height = ((height as f32) / scale).round() as usize;

            // Stop when image becomes too small for meaningful detection
            if scaled_width < min_size || scaled_height < min_size {
                break;
            }

            let image = if level == 0 {
                img.clone()
            } else {
                downsample_image(img, scaled_width, scaled_height)
            };
            levels.push(PyramidLevel { level, scale, image });
            scale *= SCALE_FACTOR;
        }

        Self { levels }
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level whose scale best matches a keypoint diameter, given the diameter at level 0
    pub fn level_for_size(&self, size: f32, base_size: f32) -> usize {
        if self.levels.is_empty() || size <= base_size {
            return 0;
        }
        let level = ((size / base_size).ln() / SCALE_FACTOR.ln()).round() as usize;
        level.min(self.levels.len() - 1)
    }

    /// Split `total` features over the levels proportionally to their area
    pub fn features_per_level(&self, total: usize) -> Vec<usize> {
        let n = self.levels.len();
        if n == 0 {
            return Vec::new();
        }
        let factor = 1.0 / (SCALE_FACTOR * SCALE_FACTOR);
        let first = total as f32 * (1.0 - factor) / (1.0 - factor.powi(n as i32));

        let mut budget = Vec::with_capacity(n);
        let mut assigned = 0usize;
        let mut desired = first;
        for _ in 0..n - 1 {
            let count = desired.round() as usize;
            budget.push(count);
            assigned += count;
            desired *= factor;
        }
        budget.push(total.saturating_sub(assigned));
        budget
    }
}

/// Downsample image using bilinear interpolation
fn downsample_image(img: &GrayImage, target_width: usize, target_height: usize) -> GrayImage {
    let (src_width, src_height) = (img.width() as usize, img.height() as usize);
    let x_ratio = src_width as f32 / target_width as f32;
    let y_ratio = src_height as f32 / target_height as f32;

    let mut downsampled = vec![0u8; target_width * target_height];
    for y in 0..target_height {
        for x in 0..target_width {
            let value = bilinear_sample(img, x as f32 * x_ratio, y as f32 * y_ratio);
            downsampled[y * target_width + x] = value.round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayImage::from_raw(target_width as u32, target_height as u32, downsampled)
        .unwrap_or_else(|| GrayImage::new(target_width as u32, target_height as u32))
}

/// Sample image at fractional coordinates using bilinear interpolation
fn bilinear_sample(img: &GrayImage, x: f32, y: f32) -> f32 {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let data = img.as_raw();
    let x1 = (x.floor() as usize).min(width - 1);
    let y1 = (y.floor() as usize).min(height - 1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);

    let fx = x - x1 as f32;
    let fy = y - y1 as f32;

    let p11 = data[y1 * width + x1] as f32;
    let p12 = data[y1 * width + x2] as f32;
    let p21 = data[y2 * width + x1] as f32;
    let p22 = data[y2 * width + x2] as f32;

    let top = p11 * (1.0 - fx) + p12 * fx;
    let bottom = p21 * (1.0 - fx) + p22 * fx;
    top * (1.0 - fy) + bottom * fy
}
