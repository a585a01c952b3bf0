use image::{ImageBuffer, Pixel, RgbImage};
use rayon::prelude::*;
use target_core::{AlignError, AlignResult};

/// Float HSV: hue in degrees `[0, 360)`, saturation `[0, 1]`, value `[0, 255]`
#[derive(Debug, Clone, PartialEq)]
pub struct HsvImage {
    width: u32,
    height: u32,
    data: Vec<[f32; 3]>,
}

impl HsvImage {
    pub fn from_rgb(img: &RgbImage) -> Self {
        let data = img
            .as_raw()
            .par_chunks_exact(3)
            .map(|p| rgb_to_hsv([p[0], p[1], p[2]]))
            .collect();
        Self {
            width: img.width(),
            height: img.height(),
            data,
        }
    }

    pub fn to_rgb(&self) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        out.par_chunks_exact_mut(3)
            .zip(self.data.par_iter())
            .for_each(|(px, &hsv)| px.copy_from_slice(&hsv_to_rgb(hsv)));
        out
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 3]] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [[f32; 3]] {
        &mut self.data
    }
}

pub fn rgb_to_hsv(rgb: [u8; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(|c| c as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { delta / v } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };
    [h, s, v]
}

pub fn hsv_to_rgb(hsv: [f32; 3]) -> [u8; 3] {
    let [h, s, v] = hsv;
    let c = v * s;
    let hp = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    [r, g, b].map(|ch| (ch + m).round().clamp(0.0, 255.0) as u8)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

/// Per-channel mean and standard deviation
#[derive(Debug, Clone, PartialEq)]
pub struct ColorStats {
    channels: Vec<ChannelStats>,
}

impl ColorStats {
    pub fn of_image<P>(img: &ImageBuffer<P, Vec<u8>>) -> AlignResult<Self>
    where
        P: Pixel<Subpixel = u8>,
    {
        let n_channels = P::CHANNEL_COUNT as usize;
        if img.width() == 0 || img.height() == 0 || n_channels == 0 {
            return Err(AlignError::InvalidInput(format!(
                "cannot compute statistics of a {}x{} image with {} channels",
                img.width(),
                img.height(),
                n_channels
            )));
        }
        let raw = img.as_raw();
        let channels = (0..n_channels)
            .map(|c| channel_stats(raw.iter().skip(c).step_by(n_channels).map(|&v| v as f64)))
            .collect();
        Ok(Self { channels })
    }

    pub fn of_hsv(img: &HsvImage) -> AlignResult<Self> {
        if img.pixels().is_empty() {
            return Err(AlignError::InvalidInput(format!(
                "cannot compute statistics of a {}x{} image",
                img.width(),
                img.height()
            )));
        }
        let channels = (0..3)
            .map(|c| channel_stats(img.pixels().iter().map(|p| p[c] as f64)))
            .collect();
        Ok(Self { channels })
    }

    pub fn channels(&self) -> &[ChannelStats] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<ChannelStats> {
        self.channels.get(index).copied()
    }
}

/// Two-pass mean and variance
fn channel_stats<I>(values: I) -> ChannelStats
where
    I: Iterator<Item = f64> + Clone,
{
    let (sum, count) = values.clone().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    let mean = sum / count as f64;
    let variance = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    ChannelStats {
        mean,
        std_dev: variance.sqrt(),
    }
}
