pub mod config;
pub mod error;
pub mod plane;

pub use config::{
    AlignConfig, AlignConfigBuilder, DescriptorKind, DetectorType, ExtractorType, FeatureConfig,
    FilterType, MarginConfig, MatcherType, RansacConfig, SceneRescale, ZeroVariancePolicy,
};
pub use error::{AlignError, AlignResult};
pub use plane::FloatImage;

pub use image::{GrayImage, RgbImage};

/// 2-D point in pixel coordinates
pub type Point = nalgebra::Point2<f64>;

/// Key-point ≙ detector location + scale, orientation (radians) and response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the neighbourhood the keypoint describes
    pub size: f32,
    /// Orientation in radians, `[0, 2π)`; 0 when the detector assigns none
    pub angle: f32,
    pub response: f32,
    pub octave: i32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self {
            x,
            y,
            size,
            angle: 0.0,
            response: 0.0,
            octave: 0,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x as f64, self.y as f64)
    }
}

/// 256-bit binary descriptor = 32 bytes
pub type BinaryDescriptor = [u8; 32];

/// 4x4 spatial bins x 8 orientation bins
pub type FloatDescriptor = [f32; 128];

/// Descriptors of one image, all of the same kind
#[derive(Debug, Clone)]
pub enum DescriptorSet {
    Binary(Vec<BinaryDescriptor>),
    Float(Vec<FloatDescriptor>),
}

impl DescriptorSet {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            DescriptorSet::Binary(_) => DescriptorKind::Binary,
            DescriptorSet::Float(_) => DescriptorKind::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DescriptorSet::Binary(d) => d.len(),
            DescriptorSet::Float(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keypoints and their descriptors, index-aligned
#[derive(Debug, Clone)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: DescriptorSet,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Object keypoint `query_idx` claimed to be scene keypoint `train_idx`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Best correspondence of a query plus the distance to its runner-up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnnCorrespondence {
    pub best: Correspondence,
    pub second_distance: Option<f32>,
}

/// Object-space and scene-space points, aligned by position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointPairs {
    object: Vec<Point>,
    scene: Vec<Point>,
}

impl PointPairs {
    pub fn new(object: Vec<Point>, scene: Vec<Point>) -> AlignResult<Self> {
        if object.len() != scene.len() {
            return Err(AlignError::InvalidInput(format!(
                "point sequences differ in length: {} object vs {} scene",
                object.len(),
                scene.len()
            )));
        }
        Ok(Self { object, scene })
    }

    /// Look up the keypoint locations of each correspondence
    pub fn from_correspondences(
        object_keypoints: &[Keypoint],
        scene_keypoints: &[Keypoint],
        correspondences: &[Correspondence],
    ) -> AlignResult<Self> {
        let mut object = Vec::with_capacity(correspondences.len());
        let mut scene = Vec::with_capacity(correspondences.len());
        for c in correspondences {
            let (Some(o), Some(s)) = (
                object_keypoints.get(c.query_idx),
                scene_keypoints.get(c.train_idx),
            ) else {
                return Err(AlignError::InvalidInput(format!(
                    "correspondence ({}, {}) out of range",
                    c.query_idx, c.train_idx
                )));
            };
            object.push(o.point());
            scene.push(s.point());
        }
        Ok(Self { object, scene })
    }

    pub fn object_points(&self) -> &[Point] {
        &self.object
    }

    pub fn scene_points(&self) -> &[Point] {
        &self.scene
    }

    pub fn len(&self) -> usize {
        self.object.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object.is_empty()
    }

    /// Keep the pairs for which `keep(object, scene)` holds, in one pass
    pub fn retain<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&Point, &Point) -> bool,
    {
        let (object, scene) = self
            .object
            .into_iter()
            .zip(self.scene)
            .filter(|(o, s)| keep(o, s))
            .unzip();
        Self { object, scene }
    }
}

/// Integer corner of the located object in scene coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CornerPoint {
    pub x: i32,
    pub y: i32,
}

impl CornerPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Result of one alignment run
#[derive(Debug, Clone)]
pub struct TargetObjectImage {
    /// Scene resampled into the reference frame, reference-sized
    pub aligned: RgbImage,
    /// Clockwise from the reference's origin corner
    pub corners: [CornerPoint; 4],
    /// Structural similarity in percent
    pub similarity: f64,
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}
