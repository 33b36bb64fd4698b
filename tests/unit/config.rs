use super::*;

#[test]
fn empty_object_uses_defaults() {
    let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg, RuntimeConfig::default());
    cfg.validate().unwrap();
    assert_eq!(cfg.display.canvas(), Canvas::new(64, 32));
    assert_eq!(cfg.renderer.timeout(), Duration::from_secs(30));
}

#[test]
fn partial_sections_merge_with_defaults() {
    let cfg: RuntimeConfig = serde_json::from_str(
        r#"{
            "display": { "width": 128, "height": 64, "mode": "stretch", "resample": "lanczos" },
            "schedule": { "workers": 1 }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.display.mode, ScaleMode::Stretch);
    assert_eq!(cfg.display.resample, Resample::Lanczos);
    assert_eq!(cfg.display.background, [0, 0, 0, 255]);
    assert_eq!(cfg.schedule.workers, 1);
    assert_eq!(cfg.schedule.display_secs, 15);
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(serde_json::from_str::<RuntimeConfig>(r#"{ "dispaly": {} }"#).is_err());
}

#[test]
fn validate_rejects_unusable_values() {
    let mut cfg = RuntimeConfig::default();
    cfg.display.width = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = RuntimeConfig::default();
    cfg.renderer.timeout_ms = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = RuntimeConfig::default();
    cfg.schedule.workers = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = RuntimeConfig::default();
    cfg.renderer.magnify = Some(0);
    assert!(cfg.validate().is_err());

    let mut cfg = RuntimeConfig::default();
    cfg.renderer.output_extension = "../x".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn load_reports_config_error_for_bad_json() {
    let path = std::env::temp_dir().join(format!(
        "frameloop_bad_config_{}.json",
        crate::foundation::fsutil::unique_suffix()
    ));
    std::fs::write(&path, b"{ not json").unwrap();
    let err = RuntimeConfig::load(&path).unwrap_err();
    assert!(matches!(err, FrameloopError::Config(_)));
    std::fs::remove_file(&path).ok();
}
