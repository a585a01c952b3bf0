use crate::error::{AlignError, AlignResult};

#[cfg(feature = "serde")]
use crate::error::ConfigError;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Local keypoint detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DetectorType {
    Fast,
    Sift,
    Orb,
}

/// Descriptor computed at each detected keypoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExtractorType {
    /// Unsteered BRIEF at full resolution
    Fast,
    Sift,
    /// Steered BRIEF over the ORB pyramid
    Orb,
}

impl ExtractorType {
    pub fn descriptor_kind(self) -> DescriptorKind {
        match self {
            ExtractorType::Sift => DescriptorKind::Float,
            ExtractorType::Fast | ExtractorType::Orb => DescriptorKind::Binary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MatcherType {
    /// Exhaustive Hamming search
    BruteForce,
    /// Approximate nearest neighbour; kd-forest for float, LSH for binary descriptors
    Flann,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FilterType {
    /// 2-NN ratio test
    LoweRatio,
    /// Best fraction of one-to-one matches by distance
    ScorePercent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Binary,
    Float,
}

/// Whether the scene is resized to the reference dimensions before matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SceneRescale {
    None,
    #[default]
    MatchReference,
}

/// What brightness normalization does with a flat (zero deviation) scene channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ZeroVariancePolicy {
    /// Only shift the mean
    #[default]
    SkipScaling,
    Fail,
}

/// Detection, extraction, matching and filtering settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FeatureConfig {
    pub detector: DetectorType,
    pub extractor: ExtractorType,
    pub matcher: MatcherType,
    pub filter: FilterType,
    /// Lowe ratio: keep if best < ratio * second best
    pub ratio_threshold: f32,
    /// Score percent: fraction of sorted matches kept
    pub keep_fraction: f32,
    /// Strongest keypoints kept per image, 0 keeps all
    pub max_features: usize,
    pub fast_threshold: u8,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            detector: DetectorType::Sift,
            extractor: ExtractorType::Sift,
            matcher: MatcherType::Flann,
            filter: FilterType::LoweRatio,
            ratio_threshold: 0.55,
            keep_fraction: 0.15,
            max_features: 500,
            fast_threshold: 20,
        }
    }
}

impl FeatureConfig {
    pub fn descriptor_kind(&self) -> DescriptorKind {
        self.extractor.descriptor_kind()
    }

    /// Check the detector/extractor/matcher/filter combination and numeric ranges
    pub fn validate(&self) -> AlignResult<()> {
        let kind = self.descriptor_kind();

        if self.matcher == MatcherType::BruteForce && kind == DescriptorKind::Float {
            return Err(AlignError::UnsupportedCombination(format!(
                "brute-force Hamming matcher cannot compare floating-point {:?} descriptors",
                self.extractor
            )));
        }
        match (self.filter, kind) {
            (FilterType::LoweRatio, DescriptorKind::Binary) => {
                return Err(AlignError::UnsupportedCombination(format!(
                    "Lowe ratio filter requires floating-point descriptors, {:?} is binary",
                    self.extractor
                )));
            }
            (FilterType::ScorePercent, DescriptorKind::Float) => {
                return Err(AlignError::UnsupportedCombination(format!(
                    "score percent filter does not support floating-point {:?} descriptors",
                    self.extractor
                )));
            }
            _ => {}
        }

        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            return Err(AlignError::InvalidConfig(format!(
                "ratio threshold {} outside (0, 1]",
                self.ratio_threshold
            )));
        }
        if !(self.keep_fraction > 0.0 && self.keep_fraction <= 1.0) {
            return Err(AlignError::InvalidConfig(format!(
                "keep fraction {} outside (0, 1]",
                self.keep_fraction
            )));
        }
        if self.fast_threshold == 0 || self.fast_threshold > 127 {
            return Err(AlignError::InvalidConfig(format!(
                "FAST threshold {} outside 1-127",
                self.fast_threshold
            )));
        }
        Ok(())
    }
}

/// Relative margins of the reference template; see the geometry crate for the zones
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarginConfig {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            top: 0.14,
            bottom: 0.86,
            left: 0.25,
            right: 0.75,
        }
    }
}

impl MarginConfig {
    pub fn validate(&self) -> AlignResult<()> {
        let ordered = |lo: f64, hi: f64| 0.0 <= lo && lo <= hi && hi <= 1.0;
        if !ordered(self.top, self.bottom) || !ordered(self.left, self.right) {
            return Err(AlignError::InvalidConfig(format!(
                "margins must satisfy 0 <= top <= bottom <= 1 and 0 <= left <= right <= 1, got {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Robust homography fit settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RansacConfig {
    /// Maximum reprojection error (pixels) for an inlier
    pub reprojection_threshold: f64,
    pub max_iterations: usize,
    /// Target confidence for early termination
    pub confidence: f64,
    /// Random seed for reproducibility (None, or absent in a file, for random)
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub seed: Option<u64>,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            reprojection_threshold: 3.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: Some(0),
        }
    }
}

impl RansacConfig {
    pub fn validate(&self) -> AlignResult<()> {
        if !(self.reprojection_threshold > 0.0) {
            return Err(AlignError::InvalidConfig(format!(
                "reprojection threshold {} must be positive",
                self.reprojection_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(AlignError::InvalidConfig("max iterations must be positive".into()));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(AlignError::InvalidConfig(format!(
                "confidence {} outside (0, 1)",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Complete alignment configuration, fixed for a run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AlignConfig {
    pub features: FeatureConfig,
    /// `None` disables margin rejection; a file without `[margins]` disables it too
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub margins: Option<MarginConfig>,
    pub ransac: RansacConfig,
    pub scene_rescale: SceneRescale,
    pub zero_variance: ZeroVariancePolicy,
    pub threads: usize,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self::sift_flann_preset()
    }
}

impl AlignConfig {
    /// SIFT descriptors, kd-forest 2-NN, Lowe ratio test
    pub fn sift_flann_preset() -> Self {
        Self {
            features: FeatureConfig::default(),
            margins: Some(MarginConfig::default()),
            ransac: RansacConfig::default(),
            scene_rescale: SceneRescale::MatchReference,
            zero_variance: ZeroVariancePolicy::SkipScaling,
            threads: num_cpus::get().max(1),
        }
    }

    /// ORB descriptors, brute-force Hamming, best 15% of matches
    pub fn orb_hamming_preset() -> Self {
        Self {
            features: FeatureConfig {
                detector: DetectorType::Orb,
                extractor: ExtractorType::Orb,
                matcher: MatcherType::BruteForce,
                filter: FilterType::ScorePercent,
                ..FeatureConfig::default()
            },
            ..Self::sift_flann_preset()
        }
    }

    /// ORB descriptors, multi-probe LSH, best 15% of matches
    pub fn orb_lsh_preset() -> Self {
        Self {
            features: FeatureConfig {
                detector: DetectorType::Orb,
                extractor: ExtractorType::Orb,
                matcher: MatcherType::Flann,
                filter: FilterType::ScorePercent,
                ..FeatureConfig::default()
            },
            ..Self::sift_flann_preset()
        }
    }

    pub fn builder() -> AlignConfigBuilder {
        AlignConfigBuilder::new()
    }

    /// Convert to AlignConfigBuilder for further customization
    pub fn to_builder(self) -> AlignConfigBuilder {
        AlignConfigBuilder { config: self }
    }

    pub fn validate(&self) -> AlignResult<()> {
        self.features.validate()?;
        if let Some(margins) = &self.margins {
            margins.validate()?;
        }
        self.ransac.validate()?;
        if self.threads == 0 {
            return Err(AlignError::InvalidConfig("thread count must be positive".into()));
        }
        Ok(())
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        let f = &self.features;
        format!(
            "AlignConfig: detector={:?}, extractor={:?}, matcher={:?}, filter={:?} (ratio={:.2}, keep={:.2}), max_features={}, margins={}, ransac=[thr:{:.1}, iters:{}], rescale={:?}",
            f.detector,
            f.extractor,
            f.matcher,
            f.filter,
            f.ratio_threshold,
            f.keep_fraction,
            f.max_features,
            match &self.margins {
                Some(m) => format!("{:.2}/{:.2}/{:.2}/{:.2}", m.top, m.bottom, m.left, m.right),
                None => "off".to_string(),
            },
            self.ransac.reprojection_threshold,
            self.ransac.max_iterations,
            self.scene_rescale,
        )
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserialize from TOML string
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to JSON file
    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load configuration from JSON file
    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Save configuration to TOML file
    #[cfg(feature = "serde")]
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Load configuration from TOML file
    #[cfg(feature = "serde")]
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
}

/// Fluent API builder for alignment configuration
#[derive(Debug, Clone)]
pub struct AlignConfigBuilder {
    config: AlignConfig,
}

impl Default for AlignConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AlignConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AlignConfig::default(),
        }
    }

    pub fn detector(mut self, detector: DetectorType) -> Self {
        self.config.features.detector = detector;
        self
    }

    pub fn extractor(mut self, extractor: ExtractorType) -> Self {
        self.config.features.extractor = extractor;
        self
    }

    pub fn matcher(mut self, matcher: MatcherType) -> Self {
        self.config.features.matcher = matcher;
        self
    }

    pub fn filter(mut self, filter: FilterType) -> Self {
        self.config.features.filter = filter;
        self
    }

    pub fn ratio_threshold(mut self, ratio: f32) -> Self {
        self.config.features.ratio_threshold = ratio;
        self
    }

    pub fn keep_fraction(mut self, fraction: f32) -> Self {
        self.config.features.keep_fraction = fraction;
        self
    }

    pub fn max_features(mut self, max_features: usize) -> Self {
        self.config.features.max_features = max_features;
        self
    }

    pub fn fast_threshold(mut self, threshold: u8) -> Self {
        self.config.features.fast_threshold = threshold;
        self
    }

    pub fn margins(mut self, margins: Option<MarginConfig>) -> Self {
        self.config.margins = margins;
        self
    }

    pub fn ransac(mut self, ransac: RansacConfig) -> Self {
        self.config.ransac = ransac;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.config.ransac.seed = seed;
        self
    }

    pub fn scene_rescale(mut self, rescale: SceneRescale) -> Self {
        self.config.scene_rescale = rescale;
        self
    }

    pub fn zero_variance(mut self, policy: ZeroVariancePolicy) -> Self {
        self.config.zero_variance = policy;
        self
    }

    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.threads = n_threads;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> AlignResult<AlignConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
