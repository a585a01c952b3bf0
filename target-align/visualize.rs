use std::path::PathBuf;

use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use log::{info, warn};
use target_matching::FeatureMatches;

use crate::pipeline::{PipelineObserver, PipelineStage};

const MATCH_COLORS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 128, 255]),
    Rgb([255, 255, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
];

/// Reference on the left, scene on the right, one line per correspondence
pub fn draw_matches(object: &RgbImage, scene: &RgbImage, matches: &FeatureMatches) -> RgbImage {
    let width = object.width() + scene.width();
    let height = object.height().max(scene.height());
    let mut canvas = RgbImage::new(width, height);
    imageops::replace(&mut canvas, object, 0, 0);
    imageops::replace(&mut canvas, scene, object.width() as i64, 0);

    let offset = object.width() as f32;
    for (i, c) in matches.correspondences.iter().enumerate() {
        let (Some(a), Some(b)) = (
            matches.object.keypoints.get(c.query_idx),
            matches.scene.keypoints.get(c.train_idx),
        ) else {
            continue;
        };
        let color = MATCH_COLORS[i % MATCH_COLORS.len()];
        let (start, end) = ((a.x, a.y), (b.x + offset, b.y));
        draw_line_segment_mut(&mut canvas, start, end, color);
        draw_hollow_circle_mut(&mut canvas, (start.0 as i32, start.1 as i32), 3, color);
        draw_hollow_circle_mut(&mut canvas, (end.0 as i32, end.1 as i32), 3, color);
    }
    canvas
}

/// Writes the match visualization to `path`; a failed write is only logged
pub struct MatchesWriter {
    path: PathBuf,
}

impl MatchesWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PipelineObserver for MatchesWriter {
    fn on_stage(&mut self, stage: &PipelineStage) {
        if let PipelineStage::Failed(err) = stage {
            warn!("alignment failed: {}", err);
        }
    }

    fn on_matches(&mut self, object: &RgbImage, scene: &RgbImage, matches: &FeatureMatches) {
        let canvas = draw_matches(object, scene, matches);
        match canvas.save(&self.path) {
            Ok(()) => info!(
                "wrote {} matches to {}",
                matches.correspondences.len(),
                self.path.display()
            ),
            Err(e) => warn!("could not write matches to {}: {}", self.path.display(), e),
        }
    }
}

/// Equal-weight blend of the reference and the aligned scene; pixels outside
/// `aligned` keep the reference at half strength
pub fn blend_overlay(object: &RgbImage, aligned: &RgbImage) -> RgbImage {
    RgbImage::from_fn(object.width(), object.height(), |x, y| {
        let a = object.get_pixel(x, y);
        let b = aligned.get_pixel_checked(x, y).copied().unwrap_or(Rgb([0, 0, 0]));
        Rgb(std::array::from_fn(|c| ((a[c] as u16 + b[c] as u16 + 1) / 2) as u8))
    })
}

/// Writes the reference/aligned overlay to `path`; a failed write is only logged
pub struct OverlayWriter {
    path: PathBuf,
}

impl OverlayWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PipelineObserver for OverlayWriter {
    fn on_aligned(&mut self, object: &RgbImage, aligned: &RgbImage) {
        match blend_overlay(object, aligned).save(&self.path) {
            Ok(()) => info!("wrote overlay to {}", self.path.display()),
            Err(e) => warn!("could not write overlay to {}: {}", self.path.display(), e),
        }
    }
}

/// Forwards every hook to each observer in turn
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn PipelineObserver>>,
}

impl ObserverSet {
    pub fn push(&mut self, observer: impl PipelineObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl PipelineObserver for ObserverSet {
    fn on_stage(&mut self, stage: &PipelineStage) {
        self.observers.iter_mut().for_each(|o| o.on_stage(stage));
    }

    fn on_matches(&mut self, object: &RgbImage, scene: &RgbImage, matches: &FeatureMatches) {
        self.observers.iter_mut().for_each(|o| o.on_matches(object, scene, matches));
    }

    fn on_aligned(&mut self, object: &RgbImage, aligned: &RgbImage) {
        self.observers.iter_mut().for_each(|o| o.on_aligned(object, aligned));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use target_core::{Correspondence, DescriptorSet, Features, Keypoint};

    fn features(points: &[(f32, f32)]) -> Features {
        Features {
            keypoints: points.iter().map(|&(x, y)| Keypoint::new(x, y, 7.0)).collect(),
            descriptors: DescriptorSet::Binary(vec![[0u8; 32]; points.len()]),
        }
    }

    fn sample() -> (RgbImage, RgbImage, FeatureMatches) {
        let object = RgbImage::from_pixel(20, 10, Rgb([40, 40, 40]));
        let scene = RgbImage::from_pixel(30, 25, Rgb([80, 80, 80]));
        let matches = FeatureMatches {
            object: features(&[(5.0, 5.0), (15.0, 5.0)]),
            scene: features(&[(10.0, 20.0), (25.0, 3.0)]),
            correspondences: vec![
                Correspondence { query_idx: 0, train_idx: 0, distance: 1.0 },
                Correspondence { query_idx: 1, train_idx: 7, distance: 1.0 },
            ],
        };
        (object, scene, matches)
    }

    #[test]
    fn test_canvas_layout() {
        let (object, scene, matches) = sample();
        let canvas = draw_matches(&object, &scene, &matches);
        assert_eq!(canvas.dimensions(), (50, 25));
        assert_eq!(canvas.get_pixel(0, 9), &Rgb([40, 40, 40]));
        // Below the shorter reference
        assert_eq!(canvas.get_pixel(0, 20), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(49, 24), &Rgb([80, 80, 80]));
        // First correspondence endpoint on the scene side
        assert_eq!(canvas.get_pixel(30, 20), &MATCH_COLORS[0]);
    }

    #[test]
    fn test_writer_failure_is_silent() {
        let (object, scene, matches) = sample();
        let mut writer = MatchesWriter::new("/nonexistent-dir/matches.png");
        writer.on_matches(&object, &scene, &matches);
    }

    #[test]
    fn test_overlay_blends_evenly() {
        let object = RgbImage::from_pixel(4, 3, Rgb([200, 100, 0]));
        let mut aligned = RgbImage::from_pixel(4, 3, Rgb([100, 100, 255]));
        aligned.put_pixel(1, 1, Rgb([200, 100, 0]));
        let overlay = blend_overlay(&object, &aligned);
        assert_eq!(overlay.dimensions(), (4, 3));
        assert_eq!(overlay.get_pixel(0, 0), &Rgb([150, 100, 128]));
        assert_eq!(overlay.get_pixel(1, 1), &Rgb([200, 100, 0]));

        // Smaller aligned image: the rest fades against black
        let overlay = blend_overlay(&object, &RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])));
        assert_eq!(overlay.get_pixel(3, 2), &Rgb([100, 50, 0]));
    }

    #[test]
    fn test_observer_set_writes_overlay() {
        let path = std::env::temp_dir().join(format!("target-align-overlay-{}.png", std::process::id()));
        let object = RgbImage::from_pixel(6, 5, Rgb([10, 20, 30]));
        let aligned = RgbImage::from_pixel(6, 5, Rgb([30, 40, 50]));

        let mut observers = ObserverSet::default();
        assert!(observers.is_empty());
        observers.push(OverlayWriter::new(&path));
        observers.push(MatchesWriter::new("/nonexistent-dir/matches.png"));
        assert_eq!(observers.len(), 2);
        observers.on_stage(&PipelineStage::GeometryResolved);
        observers.on_aligned(&object, &aligned);

        let written = image::open(&path).unwrap().to_rgb8();
        assert_eq!(written.get_pixel(5, 4), &Rgb([20, 30, 40]));
        std::fs::remove_file(path).ok();
    }
}
