use image::RgbImage;
use log::{debug, warn};
use rayon::prelude::*;
use target_core::{AlignError, AlignResult, ZeroVariancePolicy};

use crate::color::{ColorStats, HsvImage};

/// HSV value channel
pub const LUMINANCE_CHANNEL: usize = 2;

/// Shift and scale the value channel of `target` so its mean and deviation match `source`.
///
/// Hue and saturation are left untouched; the result is clipped to `[0, 255]`.
pub fn adjust_brightness(source: &RgbImage, target: &RgbImage, policy: ZeroVariancePolicy) -> AlignResult<RgbImage> {
    let source_hsv = HsvImage::from_rgb(source);
    let mut target_hsv = HsvImage::from_rgb(target);

    let source_v = luminance_stats(&source_hsv)?;
    let target_v = luminance_stats(&target_hsv)?;

    let ratio = if target_v.std_dev > 0.0 {
        source_v.std_dev / target_v.std_dev
    } else {
        match policy {
            ZeroVariancePolicy::SkipScaling => {
                warn!("target value channel is flat, shifting the mean only");
                1.0
            }
            ZeroVariancePolicy::Fail => {
                return Err(AlignError::DegenerateStatistics(
                    "target value channel has zero standard deviation".into(),
                ));
            }
        }
    };
    debug!(
        "brightness: value mean {:.2} -> {:.2}, scale {:.4}",
        target_v.mean, source_v.mean, ratio
    );

    target_hsv.pixels_mut().par_iter_mut().for_each(|p| {
        let v = (p[LUMINANCE_CHANNEL] as f64 - target_v.mean) * ratio + source_v.mean;
        p[LUMINANCE_CHANNEL] = v.clamp(0.0, 255.0) as f32;
    });
    Ok(target_hsv.to_rgb())
}

fn luminance_stats(img: &HsvImage) -> AlignResult<crate::color::ChannelStats> {
    ColorStats::of_hsv(img)?
        .channel(LUMINANCE_CHANNEL)
        .ok_or_else(|| AlignError::InvalidInput("image has no value channel".into()))
}
