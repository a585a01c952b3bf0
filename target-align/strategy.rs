use image::RgbImage;
use target_core::{AlignConfig, AlignError, AlignResult, TargetObjectImage};

use crate::pipeline::{AlignmentPipeline, NoopObserver, PipelineObserver};

/// How a target is located in a scene
#[derive(Debug, Clone, PartialEq)]
pub enum TargetFinderStrategy {
    /// Learned object detection; reserved
    ObjectDetect,
    /// Local features, robust homography and dewarping
    FeatureMatch(AlignConfig),
}

impl Default for TargetFinderStrategy {
    fn default() -> Self {
        TargetFinderStrategy::FeatureMatch(AlignConfig::default())
    }
}

impl TargetFinderStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            TargetFinderStrategy::ObjectDetect => "object-detect",
            TargetFinderStrategy::FeatureMatch(_) => "feature-match",
        }
    }

    pub fn align(
        &self,
        object: &RgbImage,
        scene: &RgbImage,
        observer: &mut dyn PipelineObserver,
    ) -> AlignResult<TargetObjectImage> {
        match self {
            TargetFinderStrategy::ObjectDetect => Err(AlignError::NotImplemented("learned object detection")),
            TargetFinderStrategy::FeatureMatch(config) => {
                AlignmentPipeline::new(config.clone())?.run(object, scene, observer)
            }
        }
    }
}

/// Owns the active strategy; reconfiguring replaces it wholesale
#[derive(Debug, Clone, Default)]
pub struct TargetFinder {
    strategy: TargetFinderStrategy,
}

impl TargetFinder {
    pub fn new(strategy: TargetFinderStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &TargetFinderStrategy {
        &self.strategy
    }

    pub fn set_strategy(&mut self, strategy: TargetFinderStrategy) {
        self.strategy = strategy;
    }

    pub fn process(&self, object: &RgbImage, scene: &RgbImage) -> AlignResult<TargetObjectImage> {
        self.process_with(object, scene, &mut NoopObserver)
    }

    pub fn process_with(
        &self,
        object: &RgbImage,
        scene: &RgbImage,
        observer: &mut dyn PipelineObserver,
    ) -> AlignResult<TargetObjectImage> {
        log::info!("running {} strategy", self.strategy.name());
        self.strategy.align(object, scene, observer)
    }
}
