use video_mosaic::io::{SessionReport, object_from_json, object_to_json, save_mosaic, write_session_report};
use video_mosaic::matching::MatcherKind;
use video_mosaic::merge::Interpolation;
use video_mosaic::source::MemorySource;
use video_mosaic::display::{CancelToken, HeadlessDisplay};
use video_mosaic::synthetic::{block_texture, pan_frames, uniform};
use video_mosaic::{MosaicConfig, MosaicController, MosaicError};

#[test]
fn test_config_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let config = MosaicConfig {
        min_feature_count: 42,
        matcher: MatcherKind::BruteForce,
        interpolation: Interpolation::Nearest,
        min_frame_displacement: Some(2.5),
        video_file_path: Some("frames/*.png".to_string()),
        ..Default::default()
    };
    object_to_json(&path, &config).unwrap();
    let loaded = MosaicConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_invalid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"rescale_factor": -1.0}"#).unwrap();
    assert!(matches!(
        MosaicConfig::from_json_file(&path),
        Err(MosaicError::InvalidConfig(_))
    ));

    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(MosaicConfig::from_json_file(&path), Err(MosaicError::Json(_))));

    assert!(matches!(
        MosaicConfig::from_json_file(dir.path().join("missing.json")),
        Err(MosaicError::Io(_))
    ));
}

#[test]
fn test_session_report() {
    let texture = block_texture(160, 100, 5, 11);
    let mut frames = pan_frames(&texture, 100, 100, 30, 0, 3);
    frames.insert(1, uniform(100, 100, 3));
    let config = MosaicConfig {
        min_feature_count: 20,
        frame_interval_ms: 0,
        ..Default::default()
    };
    let mut controller = MosaicController::new(config).unwrap();
    controller.run(&mut MemorySource::new(frames), &mut HeadlessDisplay::new(CancelToken::new()));

    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("report.json");
    let report = SessionReport::new(controller.stats(), controller.mosaic());
    write_session_report(&report_path, &report).unwrap();

    let value: serde_json::Value = object_from_json(&report_path).unwrap();
    assert!(!value["timestamp"].as_str().unwrap().is_empty());
    assert_eq!(value["frames_processed"], 4);
    assert_eq!(value["frames_seeded"], 1);
    assert_eq!(value["frames_merged"], 2);
    assert_eq!(value["frames_dropped"], 1);
    assert_eq!(value["dropped_by_reason"]["low_feature_count"], 1);
    assert_eq!(value["merges"].as_array().unwrap().len(), 2);
    assert_eq!(value["mosaic_width"], controller.mosaic().unwrap().width());
}

#[test]
fn test_save_mosaic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mosaic.png");
    let mosaic = block_texture(64, 48, 4, 2);
    save_mosaic(&path, &mosaic).unwrap();
    let loaded = image::open(&path).unwrap().into_rgb8();
    assert_eq!(loaded, mosaic);
}
