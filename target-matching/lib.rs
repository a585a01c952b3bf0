//! Descriptor matching and correspondence filtering.
//!
//! Object descriptors are the queries, scene descriptors the train set. Float
//! descriptors go through a kd-forest 2-NN search and the ratio test; binary
//! descriptors through exact Hamming search or LSH, then the score-percent cut.

pub mod brute_force;
pub mod filter;
pub mod kdforest;
pub mod lsh;

pub use brute_force::{hamming_distance, match_hamming};
pub use filter::{lowe_ratio, score_percent};
pub use kdforest::{match_knn, ForestParams, KdForest};
pub use lsh::{match_lsh, LshIndex, LshParams};

use image::GrayImage;
use log::debug;
use target_core::{
    AlignError, AlignResult, Correspondence, DescriptorSet, FeatureConfig, Features, FilterType,
    KnnCorrespondence, MatcherType, PointPairs,
};
use target_features::extract_features;

/// Matcher output before filtering
#[derive(Debug, Clone, PartialEq)]
pub enum RawMatches {
    /// Two nearest neighbours per query
    Knn(Vec<KnnCorrespondence>),
    /// One nearest neighbour per query
    Nearest(Vec<Correspondence>),
}

impl RawMatches {
    pub fn len(&self) -> usize {
        match self {
            RawMatches::Knn(m) => m.len(),
            RawMatches::Nearest(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Features of both images and the correspondences that survived filtering
#[derive(Debug, Clone)]
pub struct FeatureMatches {
    pub object: Features,
    pub scene: Features,
    pub correspondences: Vec<Correspondence>,
}

impl FeatureMatches {
    pub fn point_pairs(&self) -> AlignResult<PointPairs> {
        PointPairs::from_correspondences(
            &self.object.keypoints,
            &self.scene.keypoints,
            &self.correspondences,
        )
    }
}

/// Match object descriptors against scene descriptors with the configured matcher
pub fn find_matches(
    object: &DescriptorSet,
    scene: &DescriptorSet,
    cfg: &FeatureConfig,
) -> AlignResult<RawMatches> {
    let raw = match (object, scene, cfg.matcher) {
        (DescriptorSet::Binary(q), DescriptorSet::Binary(t), MatcherType::BruteForce) => {
            RawMatches::Nearest(match_hamming(q, t))
        }
        (DescriptorSet::Binary(q), DescriptorSet::Binary(t), MatcherType::Flann) => {
            RawMatches::Nearest(match_lsh(q, t, LshParams::default()))
        }
        (DescriptorSet::Float(q), DescriptorSet::Float(t), MatcherType::Flann) => {
            RawMatches::Knn(match_knn(q, t, ForestParams::default()))
        }
        (DescriptorSet::Float(_), DescriptorSet::Float(_), MatcherType::BruteForce) => {
            return Err(AlignError::UnsupportedCombination(
                "brute-force Hamming matcher cannot compare floating-point descriptors".into(),
            ));
        }
        _ => {
            return Err(AlignError::InvalidInput(format!(
                "object descriptors are {:?}, scene descriptors are {:?}",
                object.kind(),
                scene.kind()
            )));
        }
    };
    debug!("{:?} matcher: {} raw matches", cfg.matcher, raw.len());
    Ok(raw)
}

/// Apply the configured filter to raw matches
pub fn apply_filter(raw: RawMatches, cfg: &FeatureConfig) -> AlignResult<Vec<Correspondence>> {
    let kept = match (raw, cfg.filter) {
        (RawMatches::Knn(m), FilterType::LoweRatio) => lowe_ratio(&m, cfg.ratio_threshold),
        (RawMatches::Nearest(m), FilterType::ScorePercent) => score_percent(m, cfg.keep_fraction),
        (RawMatches::Knn(_), FilterType::ScorePercent) => {
            return Err(AlignError::UnsupportedCombination(
                "score percent filter needs one-to-one matches, got 2-NN matches".into(),
            ));
        }
        (RawMatches::Nearest(_), FilterType::LoweRatio) => {
            return Err(AlignError::UnsupportedCombination(
                "Lowe ratio filter needs 2-NN matches, got one-to-one matches".into(),
            ));
        }
    };
    debug!("{:?} filter: {} matches kept", cfg.filter, kept.len());
    Ok(kept)
}

/// Match and filter in one step
pub fn match_descriptors(
    object: &DescriptorSet,
    scene: &DescriptorSet,
    cfg: &FeatureConfig,
) -> AlignResult<Vec<Correspondence>> {
    apply_filter(find_matches(object, scene, cfg)?, cfg)
}

/// Detect, describe and match two grayscale images
pub fn match_images(object: &GrayImage, scene: &GrayImage, cfg: &FeatureConfig) -> AlignResult<FeatureMatches> {
    cfg.validate()?;
    let (object_features, scene_features) =
        rayon::join(|| extract_features(object, cfg), || extract_features(scene, cfg));
    let (object_features, scene_features) = (object_features?, scene_features?);

    let correspondences = match_descriptors(&object_features.descriptors, &scene_features.descriptors, cfg)?;
    Ok(FeatureMatches {
        object: object_features,
        scene: scene_features,
        correspondences,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use target_core::{DetectorType, ExtractorType};

    fn create_blocks_image(width: u32, height: u32, shift: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let (x, y) = (x + shift, y + shift / 2);
            let cell = ((x / 13) * 7 + (y / 17) * 3 + (x / 29) * (y / 23)) % 6;
            Luma([30 + cell as u8 * 40])
        })
    }

    fn orb_config(matcher: MatcherType) -> FeatureConfig {
        FeatureConfig {
            detector: DetectorType::Orb,
            extractor: ExtractorType::Orb,
            matcher,
            filter: FilterType::ScorePercent,
            keep_fraction: 0.5,
            ..FeatureConfig::default()
        }
    }

    #[test]
    fn test_kind_mismatch_is_invalid_input() {
        let object = DescriptorSet::Binary(vec![[0u8; 32]]);
        let scene = DescriptorSet::Float(vec![[0.0f32; 128]]);
        let result = find_matches(&object, &scene, &orb_config(MatcherType::BruteForce));
        assert!(matches!(result, Err(AlignError::InvalidInput(_))));
    }

    #[test]
    fn test_float_brute_force_is_unsupported() {
        let set = DescriptorSet::Float(vec![[0.0f32; 128]]);
        let cfg = FeatureConfig { matcher: MatcherType::BruteForce, ..FeatureConfig::default() };
        let result = match_descriptors(&set, &set, &cfg);
        assert!(matches!(result, Err(AlignError::UnsupportedCombination(_))));
    }

    #[test]
    fn test_filter_must_fit_matches() {
        let raw = RawMatches::Nearest(Vec::new());
        let result = apply_filter(raw, &FeatureConfig::default());
        assert!(matches!(result, Err(AlignError::UnsupportedCombination(_))));
    }

    #[test]
    fn test_invalid_config_rejected_before_work() {
        let img = create_blocks_image(64, 64, 0);
        let cfg = FeatureConfig { filter: FilterType::ScorePercent, ..FeatureConfig::default() };
        assert!(matches!(match_images(&img, &img, &cfg), Err(AlignError::UnsupportedCombination(_))));
    }

    #[test]
    fn test_identical_images_match_themselves() {
        let img = create_blocks_image(200, 160, 0);
        for matcher in [MatcherType::BruteForce, MatcherType::Flann] {
            let result = match_images(&img, &img, &orb_config(matcher)).unwrap();
            assert!(!result.correspondences.is_empty(), "{:?}", matcher);
            assert!(result.correspondences.iter().all(|c| c.distance == 0.0));
            let same_place = result.correspondences.iter().any(|c| {
                let o = result.object.keypoints[c.query_idx];
                let s = result.scene.keypoints[c.train_idx];
                (o.x, o.y) == (s.x, s.y)
            });
            assert!(same_place);
        }
    }

    #[test]
    fn test_sift_pipeline_on_shifted_image() {
        let object = create_blocks_image(160, 160, 0);
        let scene = create_blocks_image(160, 160, 10);
        let result = match_images(&object, &scene, &FeatureConfig::default()).unwrap();
        let pairs = result.point_pairs().unwrap();
        assert_eq!(pairs.len(), result.correspondences.len());
        // Scene content is the object moved up-left by (10, 5)
        let consistent = pairs
            .object_points()
            .iter()
            .zip(pairs.scene_points())
            .filter(|(o, s)| ((o.x - s.x) - 10.0).abs() < 2.0 && ((o.y - s.y) - 5.0).abs() < 2.0)
            .count();
        assert!(consistent * 2 >= pairs.len(), "{} of {} consistent", consistent, pairs.len());
    }
}
