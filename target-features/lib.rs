//! Keypoint detection and descriptor extraction.
//!
//! Three detectors (FAST, ORB, SIFT) and three extractors (unsteered BRIEF,
//! steered BRIEF on an image pyramid, SIFT gradient histograms) that can be
//! combined freely; the descriptor kind follows the extractor.

pub mod brief;
pub mod fast;
pub mod orb;
pub mod pyramid;
pub mod sift;

pub use brief::{BriefExtractor, BriefPattern, SamplePoint};
pub use fast::FastDetector;
pub use orb::{OrbDetector, OrbExtractor};
pub use pyramid::ImagePyramid;
pub use sift::{ScaleSpace, SiftParams};

use image::GrayImage;
use log::debug;
use target_core::{
    AlignError, AlignResult, DescriptorSet, DetectorType, ExtractorType, FeatureConfig, Features,
    Keypoint,
};

fn check_image(img: &GrayImage) -> AlignResult<()> {
    if img.width() == 0 || img.height() == 0 {
        return Err(AlignError::InvalidInput(format!(
            "empty image {}x{}",
            img.width(),
            img.height()
        )));
    }
    Ok(())
}

/// Keep the `max` strongest keypoints, strongest first; `max == 0` keeps all in detection order
pub fn retain_strongest(mut keypoints: Vec<Keypoint>, max: usize) -> Vec<Keypoint> {
    if max == 0 || keypoints.len() <= max {
        return keypoints;
    }
    keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
    keypoints.truncate(max);
    keypoints
}

/// Run the configured detector, keeping at most `max_features` keypoints
pub fn detect(img: &GrayImage, cfg: &FeatureConfig) -> AlignResult<Vec<Keypoint>> {
    check_image(img)?;
    let keypoints = match cfg.detector {
        DetectorType::Fast => FastDetector::new(cfg.fast_threshold)?.detect(img),
        DetectorType::Orb => OrbDetector::new(cfg.fast_threshold, cfg.max_features)?.detect(img),
        DetectorType::Sift => ScaleSpace::build(img, SiftParams::default())?.detect(),
    };
    Ok(retain_strongest(keypoints, cfg.max_features))
}

/// Compute descriptors with the given extractor; keypoints it cannot describe are dropped
pub fn describe(
    img: &GrayImage,
    keypoints: &[Keypoint],
    extractor: ExtractorType,
) -> AlignResult<(Vec<Keypoint>, DescriptorSet)> {
    check_image(img)?;
    Ok(match extractor {
        ExtractorType::Fast => {
            let (kps, descs) = BriefExtractor::new().compute(img, keypoints);
            (kps, DescriptorSet::Binary(descs))
        }
        ExtractorType::Orb => {
            let (kps, descs) = OrbExtractor::new().compute(img, keypoints);
            (kps, DescriptorSet::Binary(descs))
        }
        ExtractorType::Sift => {
            let space = ScaleSpace::build(img, SiftParams::default())?;
            let descs = space.compute(keypoints);
            (keypoints.to_vec(), DescriptorSet::Float(descs))
        }
    })
}

/// Detect and describe one image
pub fn extract_features(img: &GrayImage, cfg: &FeatureConfig) -> AlignResult<Features> {
    check_image(img)?;

    let features = if cfg.detector == DetectorType::Sift && cfg.extractor == ExtractorType::Sift {
        // One scale space serves both stages
        let space = ScaleSpace::build(img, SiftParams::default())?;
        let keypoints = retain_strongest(space.detect(), cfg.max_features);
        let descriptors = DescriptorSet::Float(space.compute(&keypoints));
        Features { keypoints, descriptors }
    } else {
        let detected = detect(img, cfg)?;
        let (keypoints, descriptors) = describe(img, &detected, cfg.extractor)?;
        Features { keypoints, descriptors }
    };

    debug!(
        "{:?}/{:?}: {}x{} image, {} features",
        cfg.detector,
        cfg.extractor,
        img.width(),
        img.height(),
        features.len()
    );
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use target_core::{DescriptorKind, MatcherType, FilterType};

    fn create_checker_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let cell = (x / 20 * 3 + y / 20 * 5) % 4;
            Luma([40 + cell as u8 * 50])
        })
    }

    fn config(detector: DetectorType, extractor: ExtractorType) -> FeatureConfig {
        let binary = extractor.descriptor_kind() == DescriptorKind::Binary;
        FeatureConfig {
            detector,
            extractor,
            matcher: if binary { MatcherType::BruteForce } else { MatcherType::Flann },
            filter: if binary { FilterType::ScorePercent } else { FilterType::LoweRatio },
            ..FeatureConfig::default()
        }
    }

    #[test]
    fn test_empty_image_is_invalid() {
        let img = GrayImage::new(0, 10);
        let result = extract_features(&img, &FeatureConfig::default());
        assert!(matches!(result, Err(AlignError::InvalidInput(_))));
    }

    #[test]
    fn test_retain_strongest() {
        let kps: Vec<Keypoint> = (0..10)
            .map(|i| Keypoint { response: i as f32, ..Keypoint::new(i as f32, 0.0, 7.0) })
            .collect();
        let kept = retain_strongest(kps.clone(), 3);
        assert_eq!(kept.iter().map(|k| k.response).collect::<Vec<_>>(), vec![9.0, 8.0, 7.0]);
        assert_eq!(retain_strongest(kps.clone(), 0).len(), 10);
        assert_eq!(retain_strongest(kps, 20).len(), 10);
    }

    #[test]
    fn test_every_combination_is_index_aligned() {
        let img = create_checker_image(160, 160);
        for detector in [DetectorType::Fast, DetectorType::Orb, DetectorType::Sift] {
            for extractor in [ExtractorType::Fast, ExtractorType::Orb, ExtractorType::Sift] {
                let cfg = config(detector, extractor);
                let features = extract_features(&img, &cfg).unwrap();
                assert_eq!(features.keypoints.len(), features.descriptors.len());
                assert_eq!(features.descriptors.kind(), extractor.descriptor_kind());
                assert!(features.len() <= cfg.max_features);
            }
        }
    }

    #[test]
    fn test_sift_features_found() {
        let img = create_checker_image(160, 160);
        let features = extract_features(&img, &FeatureConfig::default()).unwrap();
        assert!(!features.is_empty());
        assert!(matches!(features.descriptors, DescriptorSet::Float(_)));
    }

    #[test]
    fn test_orb_features_found() {
        let img = create_checker_image(160, 160);
        let features = extract_features(&img, &config(DetectorType::Orb, ExtractorType::Orb)).unwrap();
        assert!(!features.is_empty());
        assert!(matches!(features.descriptors, DescriptorSet::Binary(_)));
    }

    #[test]
    fn test_max_features_caps_sift() {
        let img = create_checker_image(200, 200);
        let cfg = FeatureConfig { max_features: 5, ..FeatureConfig::default() };
        let features = extract_features(&img, &cfg).unwrap();
        assert!(features.len() <= 5);
    }
}
