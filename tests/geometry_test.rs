use glam::DVec2;
use image::{Rgb, RgbImage};
use nalgebra as na;
use video_mosaic::MosaicError;
use video_mosaic::geometry::{CanvasPlanner, Homography, RansacEstimator, corners};
use video_mosaic::merge::{ImageMerger, Interpolation};

fn known_homography() -> Homography {
    Homography::from_matrix(na::Matrix3::new(
        1.02, 0.03, 12.0, //
        -0.02, 0.98, -7.0, //
        1e-5, 2e-5, 1.0,
    ))
    .unwrap()
}

#[test]
fn test_noise_free_homography_is_recovered() {
    let h = known_homography();
    let pairs: Vec<(DVec2, DVec2)> = (0..6)
        .flat_map(|i| (0..5).map(move |j| DVec2::new(10.0 + 37.0 * i as f64, 8.0 + 29.0 * j as f64)))
        .map(|p| (p, h.project(p).unwrap()))
        .collect();

    let estimate = RansacEstimator::default().estimate_pairs(&pairs).unwrap();
    assert_eq!(estimate.inlier_count(), pairs.len());
    for (p, expected) in &pairs {
        let got = estimate.homography.project(*p).unwrap();
        assert!(got.distance(*expected) < 1e-3, "{} vs {}", got, expected);
    }
}

#[test]
fn test_outliers_are_rejected() {
    let h = Homography::translation(25.0, -4.0);
    let mut pairs: Vec<(DVec2, DVec2)> = (0..40)
        .map(|i| DVec2::new((i * 13 % 97) as f64, (i * 7 % 61) as f64))
        .map(|p| (p, h.project(p).unwrap()))
        .collect();
    for (i, pair) in pairs.iter_mut().enumerate().take(8) {
        pair.1 += DVec2::new(40.0 + i as f64 * 3.0, -30.0);
    }
    let estimate = RansacEstimator::default().estimate_pairs(&pairs).unwrap();
    assert_eq!(estimate.inlier_count(), 32);
    assert!(estimate.inliers[..8].iter().all(|i| !i));
    let (tx, ty) = estimate.homography.translation_component();
    assert!((tx - 25.0).abs() < 1e-6 && (ty + 4.0).abs() < 1e-6);
}

#[test]
fn test_near_miss_match_does_not_bias_the_fit() {
    let h = Homography::translation(30.0, 0.0);
    let mut pairs: Vec<(DVec2, DVec2)> = (0..30)
        .map(|i| DVec2::new((i * 17 % 89) as f64 + 5.0, (i * 11 % 83) as f64 + 5.0))
        .map(|p| (p, h.project(p).unwrap()))
        .collect();
    // inside the reprojection threshold but one pixel off
    pairs[7].1.y += 1.0;

    let estimate = RansacEstimator::default().estimate_pairs(&pairs).unwrap();
    let (tx, ty) = estimate.homography.translation_component();
    assert!((tx - 30.0).abs() < 1e-6 && ty.abs() < 1e-6, "translation ({}, {})", tx, ty);
    for (i, (p, expected)) in pairs.iter().enumerate() {
        if i != 7 {
            assert!(estimate.homography.project(*p).unwrap().distance(*expected) < 1e-6);
        }
    }

    let planner = CanvasPlanner {
        max_canvas_area: 1 << 20,
    };
    let plan = planner.plan((100, 100), (100, 100), &estimate.homography).unwrap();
    assert_eq!((plan.width, plan.height), (130, 100));
}

#[test]
fn test_float_noise_does_not_grow_the_canvas() {
    let planner = CanvasPlanner {
        max_canvas_area: 1 << 20,
    };
    for shift in [DVec2::new(30.0 + 1e-9, -1e-9), DVec2::new(-20.0 - 1e-9, 1e-9)] {
        let plan = planner
            .plan((100, 100), (100, 100), &Homography::translation(shift.x, shift.y))
            .unwrap();
        assert_eq!(plan.height, 100, "shift {}", shift);
        assert_eq!(plan.width, 100 + shift.x.abs().round() as u32, "shift {}", shift);
    }
}

#[test]
fn test_too_few_correspondences() {
    let pairs = vec![(DVec2::ZERO, DVec2::ONE); 3];
    assert!(matches!(
        RansacEstimator::default().estimate_pairs(&pairs),
        Err(MosaicError::InsufficientCorrespondences { found: 3 })
    ));
}

#[test]
fn test_singular_matrix_is_rejected() {
    assert!(Homography::from_matrix(na::Matrix3::zeros()).is_none());
    let h = Homography::translation(3.0, 4.0);
    let round_trip = h.compose(&h.inverse());
    let p = round_trip.project(DVec2::new(5.0, 6.0)).unwrap();
    assert!(p.distance(DVec2::new(5.0, 6.0)) < 1e-9);
}

#[test]
fn test_canvas_contains_every_corner() {
    let planner = CanvasPlanner {
        max_canvas_area: 1 << 30,
    };
    let homographies = [
        Homography::identity(),
        Homography::translation(-37.5, 12.25),
        Homography::translation(80.0, -60.0),
        known_homography(),
        Homography::from_matrix(na::Matrix3::new(0.9, -0.2, -15.0, 0.25, 1.1, 30.0, 0.0, 0.0, 1.0))
            .unwrap(),
    ];
    let (frame, mosaic) = ((120, 90), (200, 140));
    for h in homographies {
        let plan = planner.plan(frame, mosaic, &h).unwrap();
        let offset = DVec2::new(plan.offset_x as f64, plan.offset_y as f64);
        let mut points: Vec<DVec2> = corners(mosaic.0, mosaic.1).to_vec();
        points.extend(corners(frame.0, frame.1).iter().map(|c| h.project(*c).unwrap()));
        for p in points {
            let q = p + offset;
            assert!(q.x >= -1e-6 && q.y >= -1e-6, "{} outside {:?}", q, plan);
            assert!(
                q.x <= plan.width as f64 - 1.0 + 1e-6 && q.y <= plan.height as f64 - 1.0 + 1e-6,
                "{} outside {:?}",
                q,
                plan
            );
        }
    }
}

#[test]
fn test_oversized_canvas_is_refused() {
    let planner = CanvasPlanner {
        max_canvas_area: 10_000,
    };
    let err = planner
        .plan((80, 80), (80, 80), &Homography::translation(500.0, 0.0))
        .unwrap_err();
    assert!(matches!(err, MosaicError::CanvasOverflow { .. }));
}

#[test]
fn test_identity_merge_reproduces_the_mosaic() {
    let mosaic = RgbImage::from_fn(40, 30, |x, y| Rgb([x as u8 * 5, y as u8 * 7, 99]));
    let planner = CanvasPlanner {
        max_canvas_area: 1 << 20,
    };
    let h = Homography::identity();
    let plan = planner.plan(mosaic.dimensions(), mosaic.dimensions(), &h).unwrap();
    for interpolation in [Interpolation::Nearest, Interpolation::Bilinear] {
        let merged = ImageMerger { interpolation }.merge(&mosaic, &mosaic, &h, &plan);
        assert_eq!(merged, mosaic);
    }
}

#[test]
fn test_translated_merge_fills_the_new_region() {
    let mosaic = RgbImage::from_pixel(40, 30, Rgb([200, 10, 10]));
    let frame = RgbImage::from_fn(40, 30, |x, _| Rgb([10, x as u8 * 6, 200]));
    let h = Homography::translation(20.0, 0.0);
    let plan = CanvasPlanner {
        max_canvas_area: 1 << 20,
    }
    .plan(frame.dimensions(), mosaic.dimensions(), &h)
    .unwrap();
    assert_eq!((plan.width, plan.height, plan.offset_x, plan.offset_y), (60, 30, 0, 0));

    let merged = ImageMerger {
        interpolation: Interpolation::Nearest,
    }
    .merge(&frame, &mosaic, &h, &plan);
    for y in 0..30 {
        for x in 0..60 {
            let expected = if x < 20 {
                *mosaic.get_pixel(x, y)
            } else {
                *frame.get_pixel(x - 20, y)
            };
            assert_eq!(*merged.get_pixel(x, y), expected, "pixel ({}, {})", x, y);
        }
    }
}
