use target_core::{MarginConfig, Point, PointPairs};

/// Regions of the reference template whose features are not trusted for alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenZone {
    /// Full-width band between the top and bottom margins
    CentralBand,
    /// Below the bottom margin and right of the right margin
    LowerRight,
    /// Above the top margin and left of the left margin
    UpperLeft,
}

/// Zone containing an object-space point, if any; bounds are exclusive
pub fn zone_of(p: &Point, margins: &MarginConfig, width: f64, height: f64) -> Option<ForbiddenZone> {
    let top = margins.top * height;
    let bottom = margins.bottom * height;
    let left = margins.left * width;
    let right = margins.right * width;

    if p.y > top && p.y < bottom {
        Some(ForbiddenZone::CentralBand)
    } else if p.y > bottom && p.x > right {
        Some(ForbiddenZone::LowerRight)
    } else if p.y < top && p.x < left {
        Some(ForbiddenZone::UpperLeft)
    } else {
        None
    }
}

/// Drop pairs whose object point lies in a forbidden zone of a `width` x `height` reference
pub fn reject_margin_points(pairs: PointPairs, margins: &MarginConfig, width: u32, height: u32) -> PointPairs {
    let (w, h) = (width as f64, height as f64);
    pairs.retain(|object, _| zone_of(object, margins, w, h).is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const W: u32 = 200;
    const H: u32 = 100;

    #[test]
    fn test_zones() {
        let m = MarginConfig::default();
        let (w, h) = (W as f64, H as f64);
        // top = 14, bottom = 86, left = 50, right = 150
        assert_eq!(zone_of(&Point::new(100.0, 50.0), &m, w, h), Some(ForbiddenZone::CentralBand));
        assert_eq!(zone_of(&Point::new(160.0, 90.0), &m, w, h), Some(ForbiddenZone::LowerRight));
        assert_eq!(zone_of(&Point::new(10.0, 5.0), &m, w, h), Some(ForbiddenZone::UpperLeft));
        assert_eq!(zone_of(&Point::new(100.0, 5.0), &m, w, h), None);
        assert_eq!(zone_of(&Point::new(160.0, 5.0), &m, w, h), None);
        assert_eq!(zone_of(&Point::new(10.0, 90.0), &m, w, h), None);
        // Boundaries are allowed
        assert_eq!(zone_of(&Point::new(100.0, 14.0), &m, w, h), None);
        assert_eq!(zone_of(&Point::new(150.0, 90.0), &m, w, h), None);
    }

    #[test]
    fn test_rejection_keeps_alignment() {
        let object = vec![
            Point::new(100.0, 50.0),
            Point::new(100.0, 5.0),
            Point::new(10.0, 5.0),
            Point::new(10.0, 95.0),
            Point::new(190.0, 95.0),
        ];
        let scene = (0..5).map(|i| Point::new(i as f64, 0.0)).collect();
        let pairs = PointPairs::new(object, scene).unwrap();
        let kept = reject_margin_points(pairs, &MarginConfig::default(), W, H);
        assert_eq!(kept.object_points(), &[Point::new(100.0, 5.0), Point::new(10.0, 95.0)]);
        assert_eq!(kept.scene_points(), &[Point::new(1.0, 0.0), Point::new(3.0, 0.0)]);
    }

    proptest! {
        #[test]
        fn prop_forbidden_removed_allowed_retained(
            coords in prop::collection::vec((0.0f64..200.0, 0.0f64..100.0), 0..100),
        ) {
            let m = MarginConfig::default();
            let object: Vec<Point> = coords.iter().map(|&(x, y)| Point::new(x, y)).collect();
            // Scene points tag the original index
            let scene: Vec<Point> = (0..object.len()).map(|i| Point::new(i as f64, -1.0)).collect();
            let pairs = PointPairs::new(object.clone(), scene).unwrap();
            let kept = reject_margin_points(pairs, &m, W, H);

            let allowed: Vec<usize> = object
                .iter()
                .enumerate()
                .filter(|(_, p)| zone_of(p, &m, W as f64, H as f64).is_none())
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(kept.len(), allowed.len());
            for ((o, s), &i) in kept.object_points().iter().zip(kept.scene_points()).zip(&allowed) {
                prop_assert_eq!(s.x as usize, i);
                prop_assert_eq!(*o, object[i]);
                prop_assert!(zone_of(o, &m, W as f64, H as f64).is_none());
            }
        }
    }
}
