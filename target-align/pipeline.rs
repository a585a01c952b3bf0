use std::borrow::Cow;
use std::time::Instant;

use image::{imageops, GrayImage, RgbImage};
use log::{debug, info};
use target_core::{AlignConfig, AlignError, AlignResult, SceneRescale, TargetObjectImage};
use target_features::extract_features;
use target_geometry::{GeometryResolver, Homography};
use target_matching::{apply_filter, find_matches, FeatureMatches};

use crate::brightness::adjust_brightness;
use crate::similarity::similarity_score;

/// Where a run is; every run moves forward through these or ends in `Failed`
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    Idle,
    BrightnessAdjusted,
    FeaturesExtracted,
    Matched,
    Filtered,
    GeometryResolved,
    Scored,
    Done,
    Failed(AlignError),
}

/// Diagnostic hooks; nothing an observer does changes the result
pub trait PipelineObserver {
    fn on_stage(&mut self, _stage: &PipelineStage) {}

    /// Filtered matches between the reference and the working scene
    fn on_matches(&mut self, _object: &RgbImage, _scene: &RgbImage, _matches: &FeatureMatches) {}

    /// The reference and the scene resampled into its frame
    fn on_aligned(&mut self, _object: &RgbImage, _aligned: &RgbImage) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Brightness normalization, features, matching, geometry and scoring for one configuration
pub struct AlignmentPipeline {
    config: AlignConfig,
    stage: PipelineStage,
}

impl AlignmentPipeline {
    pub fn new(config: AlignConfig) -> AlignResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stage: PipelineStage::Idle,
        })
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Last stage reached
    pub fn stage(&self) -> &PipelineStage {
        &self.stage
    }

    /// Locate `object` inside `scene`
    pub fn run(
        &mut self,
        object: &RgbImage,
        scene: &RgbImage,
        observer: &mut dyn PipelineObserver,
    ) -> AlignResult<TargetObjectImage> {
        self.stage = PipelineStage::Idle;
        let t0 = Instant::now();

        match self.execute(object, scene, observer) {
            Ok(result) => {
                self.advance(PipelineStage::Done, observer);
                info!(
                    "alignment done in {:.2?}: similarity {:.2}",
                    t0.elapsed(),
                    result.similarity
                );
                Ok(result)
            }
            Err(err) => {
                self.advance(PipelineStage::Failed(err.clone()), observer);
                Err(err)
            }
        }
    }

    fn advance(&mut self, stage: PipelineStage, observer: &mut dyn PipelineObserver) {
        advance(&mut self.stage, stage, observer);
    }

    fn execute(
        &mut self,
        object: &RgbImage,
        scene: &RgbImage,
        observer: &mut dyn PipelineObserver,
    ) -> AlignResult<TargetObjectImage> {
        let Self { config, stage } = self;
        let cfg: &AlignConfig = config;
        for (name, img) in [("reference", object), ("scene", scene)] {
            if img.width() == 0 || img.height() == 0 {
                return Err(AlignError::InvalidInput(format!(
                    "{} image is empty ({}x{})",
                    name,
                    img.width(),
                    img.height()
                )));
            }
        }

        let adjusted = adjust_brightness(object, scene, cfg.zero_variance)?;
        advance(stage, PipelineStage::BrightnessAdjusted, observer);

        let (working, scene_frame) = rescale_scene(&adjusted, object.dimensions(), cfg.scene_rescale);

        let object_gray: GrayImage = imageops::grayscale(object);
        let scene_gray: GrayImage = imageops::grayscale(&*working);
        let (object_features, scene_features) = rayon::join(
            || extract_features(&object_gray, &cfg.features),
            || extract_features(&scene_gray, &cfg.features),
        );
        let (object_features, scene_features) = (object_features?, scene_features?);
        info!(
            "features: {} reference, {} scene",
            object_features.len(),
            scene_features.len()
        );
        advance(stage, PipelineStage::FeaturesExtracted, observer);

        let raw = find_matches(&object_features.descriptors, &scene_features.descriptors, &cfg.features)?;
        advance(stage, PipelineStage::Matched, observer);

        let correspondences = apply_filter(raw, &cfg.features)?;
        info!("{} correspondences after filtering", correspondences.len());
        let matches = FeatureMatches {
            object: object_features,
            scene: scene_features,
            correspondences,
        };
        advance(stage, PipelineStage::Filtered, observer);
        observer.on_matches(object, &working, &matches);

        // Matching ran on the working scene; resampling reads the full one
        let resolution = GeometryResolver::from_config(cfg).resolve(
            matches.point_pairs()?,
            object.dimensions(),
            &adjusted,
            &scene_frame,
        )?;
        info!(
            "geometry: {} pairs after margins, {} inliers, corners {:?}",
            resolution.retained_pairs, resolution.inliers, resolution.corners
        );
        advance(stage, PipelineStage::GeometryResolved, observer);
        observer.on_aligned(object, &resolution.aligned);

        let similarity = similarity_score(object, &resolution.aligned)?;
        advance(stage, PipelineStage::Scored, observer);

        Ok(TargetObjectImage {
            aligned: resolution.aligned,
            corners: resolution.corners,
            similarity,
        })
    }
}

fn advance(current: &mut PipelineStage, stage: PipelineStage, observer: &mut dyn PipelineObserver) {
    debug!("pipeline stage: {:?}", stage);
    observer.on_stage(&stage);
    *current = stage;
}

/// Resize the scene to the reference size when asked; returns the working scene and
/// the map from working-scene to original-scene pixel coordinates
pub fn rescale_scene(
    scene: &RgbImage,
    reference_size: (u32, u32),
    rescale: SceneRescale,
) -> (Cow<'_, RgbImage>, Homography) {
    let (sw, sh) = scene.dimensions();
    let (rw, rh) = reference_size;
    if rescale == SceneRescale::None || (sw, sh) == (rw, rh) {
        return (Cow::Borrowed(scene), Homography::identity());
    }

    let resized = imageops::resize(scene, rw, rh, imageops::FilterType::Triangle);
    let (sx, sy) = (sw as f64 / rw as f64, sh as f64 / rh as f64);
    // Pixel centres line up: x_scene + 0.5 = sx * (x_work + 0.5)
    let frame = Homography::from_row_slice(&[sx, 0.0, (sx - 1.0) / 2.0, 0.0, sy, (sy - 1.0) / 2.0, 0.0, 0.0, 1.0]);
    debug!("scene rescaled {}x{} -> {}x{}", sw, sh, rw, rh);
    (Cow::Owned(resized), frame)
}
