//! Geometric resolution of matched point pairs.
//!
//! Untrusted template regions are rejected, two independent RANSAC homographies
//! are fitted (scene to object for dewarping, object to scene for the corners),
//! the template corners are projected into the scene and the scene is resampled
//! into the template frame.

pub mod homography;
pub mod margins;
pub mod ransac;

pub use homography::Homography;
pub use margins::{reject_margin_points, zone_of, ForbiddenZone};
pub use ransac::{adaptive_iterations, RansacEstimator, RansacFit, MIN_SAMPLES};

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation};
use log::debug;
use target_core::{
    AlignConfig, AlignError, AlignResult, CornerPoint, MarginConfig, Point, PointPairs, RansacConfig,
};

/// Outcome of geometric resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Full scene resampled into the object frame
    pub aligned: RgbImage,
    /// Object corners in reported scene coordinates, clockwise from the origin
    pub corners: [CornerPoint; 4],
    /// Full scene to object
    pub scene_to_object: Homography,
    /// Object to reported scene
    pub object_to_scene: Homography,
    /// Pairs left after margin rejection
    pub retained_pairs: usize,
    pub inliers: usize,
}

/// Margin rejection plus dual homography fitting
#[derive(Debug, Clone)]
pub struct GeometryResolver {
    margins: Option<MarginConfig>,
    ransac: RansacConfig,
}

impl GeometryResolver {
    pub fn new(margins: Option<MarginConfig>, ransac: RansacConfig) -> Self {
        Self { margins, ransac }
    }

    pub fn from_config(config: &AlignConfig) -> Self {
        Self::new(config.margins, config.ransac.clone())
    }

    /// Resolve object placement.
    ///
    /// `pairs` hold working-scene points; `scene_frame` maps them into the full
    /// `scene`, where corners are reported and pixels are resampled from. It is
    /// the identity when the scene was not resized.
    pub fn resolve(
        &self,
        pairs: PointPairs,
        object_size: (u32, u32),
        scene: &RgbImage,
        scene_frame: &Homography,
    ) -> AlignResult<Resolution> {
        let (width, height) = object_size;
        if width == 0 || height == 0 {
            return Err(AlignError::InvalidInput(format!("empty object {}x{}", width, height)));
        }

        let before = pairs.len();
        let pairs = match &self.margins {
            Some(m) => reject_margin_points(pairs, m, width, height),
            None => pairs,
        };
        debug!("margin rejection: {} of {} pairs kept", pairs.len(), before);

        if pairs.len() < MIN_SAMPLES {
            return Err(AlignError::InsufficientCorrespondences {
                found: pairs.len(),
                required: MIN_SAMPLES,
            });
        }

        let estimator = RansacEstimator::new(self.ransac.clone());
        let to_object = estimator.estimate(pairs.scene_points(), pairs.object_points())?;
        let to_scene = estimator.estimate(pairs.object_points(), pairs.scene_points())?;

        let object_to_scene = scene_frame.compose(&to_scene.homography);
        let corners = project_corners(&object_to_scene, width, height)?;
        let frame_inverse = scene_frame
            .inverse()
            .ok_or_else(|| AlignError::GeometryUnsolvable("scene frame is not invertible".into()))?;
        let scene_to_object = to_object.homography.compose(&frame_inverse);
        let aligned = dewarp(scene, &scene_to_object, width, height)?;

        Ok(Resolution {
            aligned,
            corners,
            scene_to_object,
            object_to_scene,
            retained_pairs: pairs.len(),
            inliers: to_scene.inliers.len(),
        })
    }
}

/// `(0,0)`, `(W,0)`, `(W,H)`, `(0,H)` through `h`, rounded to the nearest pixel
pub fn project_corners(h: &Homography, width: u32, height: u32) -> AlignResult<[CornerPoint; 4]> {
    let (w, ht) = (width as f64, height as f64);
    let corners = [
        Point::new(0.0, 0.0),
        Point::new(w, 0.0),
        Point::new(w, ht),
        Point::new(0.0, ht),
    ];

    let mut projected = [CornerPoint::default(); 4];
    for (out, corner) in projected.iter_mut().zip(&corners) {
        let p = h.project(corner).ok_or_else(|| {
            AlignError::GeometryUnsolvable(format!("corner ({}, {}) projects to infinity", corner.x, corner.y))
        })?;
        let (x, y) = (p.x.round(), p.y.round());
        if x.abs() > i32::MAX as f64 || y.abs() > i32::MAX as f64 {
            return Err(AlignError::GeometryUnsolvable(format!(
                "corner ({}, {}) projects outside the integer range",
                corner.x, corner.y
            )));
        }
        *out = CornerPoint::new(x as i32, y as i32);
    }
    Ok(projected)
}

/// Resample `scene` into a `width` x `height` image through `scene_to_object`; bilinear, black outside
pub fn dewarp(scene: &RgbImage, scene_to_object: &Homography, width: u32, height: u32) -> AlignResult<RgbImage> {
    let projection = scene_to_object
        .to_projection()
        .ok_or_else(|| AlignError::GeometryUnsolvable("scene to object homography is not invertible".into()))?;
    let mut out = RgbImage::new(width, height);
    warp_into(scene, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn object_to_scene() -> Homography {
        Homography::from_row_slice(&[0.5, -0.08, 60.0, 0.09, 0.48, 40.0, 1e-4, 5e-5, 1.0])
    }

    fn synthetic_pairs(n: usize, outliers: usize) -> PointPairs {
        let h = object_to_scene();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let object: Vec<Point> = (0..n)
            .map(|_| Point::new(rng.random_range(0.0..200.0), rng.random_range(0.0..150.0)))
            .collect();
        let mut scene: Vec<Point> = object.iter().map(|p| h.project(p).unwrap()).collect();
        for s in scene.iter_mut().take(outliers) {
            *s = Point::new(rng.random_range(0.0..300.0), rng.random_range(0.0..300.0));
        }
        PointPairs::new(object, scene).unwrap()
    }

    fn resolver() -> GeometryResolver {
        GeometryResolver::new(None, RansacConfig::default())
    }

    #[test]
    fn test_corners_of_known_homography() {
        let scene = RgbImage::new(300, 300);
        let result = resolver()
            .resolve(synthetic_pairs(80, 15), (200, 150), &scene, &Homography::identity())
            .unwrap();
        let expected = project_corners(&object_to_scene(), 200, 150).unwrap();
        for (got, want) in result.corners.iter().zip(&expected) {
            assert!((got.x - want.x).abs() <= 1 && (got.y - want.y).abs() <= 1, "{:?} vs {:?}", got, want);
        }
        assert_eq!(result.aligned.dimensions(), (200, 150));
        assert!(result.inliers >= 65);
        assert_eq!(result.retained_pairs, 80);
    }

    #[test]
    fn test_scene_frame_is_applied_to_corners() {
        let scene = RgbImage::new(300, 300);
        let frame = Homography::scaling(2.0, 3.0);
        let result = resolver()
            .resolve(synthetic_pairs(40, 0), (200, 150), &scene, &frame)
            .unwrap();
        let expected = project_corners(&frame.compose(&object_to_scene()), 200, 150).unwrap();
        for (got, want) in result.corners.iter().zip(&expected) {
            assert!((got.x - want.x).abs() <= 1 && (got.y - want.y).abs() <= 1);
        }
    }

    #[test]
    fn test_three_pairs_are_insufficient() {
        let scene = RgbImage::new(50, 50);
        let result = resolver().resolve(synthetic_pairs(3, 0), (200, 150), &scene, &Homography::identity());
        assert_eq!(
            result.unwrap_err(),
            AlignError::InsufficientCorrespondences { found: 3, required: 4 }
        );
    }

    #[test]
    fn test_margins_can_exhaust_pairs() {
        // Every object point in the central band
        let object: Vec<Point> = (0..10).map(|i| Point::new(i as f64 * 15.0, 75.0)).collect();
        let pairs = PointPairs::new(object.clone(), object).unwrap();
        let resolver = GeometryResolver::new(Some(MarginConfig::default()), RansacConfig::default());
        let result = resolver.resolve(pairs, (200, 150), &RgbImage::new(10, 10), &Homography::identity());
        assert_eq!(
            result.unwrap_err(),
            AlignError::InsufficientCorrespondences { found: 0, required: 4 }
        );
    }

    #[test]
    fn test_corner_at_infinity() {
        let h = Homography::from_row_slice(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.01, 0.0, -1.0]);
        // x = 100 sends w to zero
        let result = project_corners(&h, 100, 50);
        assert!(matches!(result, Err(AlignError::GeometryUnsolvable(_))));
    }

    #[test]
    fn test_dewarp_recovers_object() {
        let object = RgbImage::from_fn(80, 60, |x, y| Rgb([(x * 3) as u8, (y * 4) as u8, ((x + y) % 256) as u8]));
        let placement = Homography::from_row_slice(&[1.2, 0.1, 30.0, -0.1, 1.1, 20.0, 0.0, 0.0, 1.0]);

        // Render the object into a larger scene
        let mut scene = RgbImage::new(200, 160);
        warp_into(
            &object,
            &placement.to_projection().unwrap(),
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut scene,
        );

        let back = dewarp(&scene, &placement.inverse().unwrap(), 80, 60).unwrap();
        for (x, y) in [(20, 20), (40, 30), (60, 45)] {
            let a = object.get_pixel(x, y);
            let b = back.get_pixel(x, y);
            for c in 0..3 {
                assert!((a[c] as i32 - b[c] as i32).abs() <= 8, "({}, {}): {:?} vs {:?}", x, y, a, b);
            }
        }
    }

    #[test]
    fn test_singular_dewarp_is_unsolvable() {
        let singular = Homography::from_row_slice(&[1.0, 2.0, 0.0, 2.0, 4.0, 0.0, 0.0, 0.0, 1.0]);
        let result = dewarp(&RgbImage::new(10, 10), &singular, 5, 5);
        assert!(matches!(result, Err(AlignError::GeometryUnsolvable(_))));
    }

    #[test]
    fn test_dewarp_reads_full_scene_through_frame() {
        let object = RgbImage::from_fn(80, 60, |x, y| Rgb([(x * 3) as u8, (y * 4) as u8, ((x * y) % 256) as u8]));
        // Object at twice its size in the full scene; matching ran on a half-size copy
        let placement = Homography::from_row_slice(&[2.0, 0.0, 40.0, 0.0, 2.0, 30.0, 0.0, 0.0, 1.0]);
        let mut scene = RgbImage::new(260, 200);
        warp_into(
            &object,
            &placement.to_projection().unwrap(),
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut scene,
        );
        let frame = Homography::scaling(2.0, 2.0);
        let to_working = frame.inverse().unwrap().compose(&placement);

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let object_points: Vec<Point> = (0..30)
            .map(|_| Point::new(rng.random_range(0.0..80.0), rng.random_range(0.0..60.0)))
            .collect();
        let working_points: Vec<Point> = object_points.iter().map(|p| to_working.project(p).unwrap()).collect();
        let pairs = PointPairs::new(object_points, working_points).unwrap();

        let result = resolver().resolve(pairs, (80, 60), &scene, &frame).unwrap();
        let expected = project_corners(&placement, 80, 60).unwrap();
        for (got, want) in result.corners.iter().zip(&expected) {
            assert!((got.x - want.x).abs() <= 1 && (got.y - want.y).abs() <= 1);
        }
        for (x, y) in [(10, 10), (40, 30), (70, 50)] {
            let a = object.get_pixel(x, y);
            let b = result.aligned.get_pixel(x, y);
            for c in 0..3 {
                assert!((a[c] as i32 - b[c] as i32).abs() <= 6, "({}, {}): {:?} vs {:?}", x, y, a, b);
            }
        }
    }
}
