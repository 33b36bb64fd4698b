use super::*;

#[test]
fn app_id_accepts_catalog_style_names() {
    assert_eq!(AppId::new("clock").unwrap().as_str(), "clock");
    assert_eq!(AppId::new("nyc-subway_2").unwrap().to_string(), "nyc-subway_2");
}

#[test]
fn app_id_rejects_paths_and_empty() {
    assert!(AppId::new("").is_err());
    assert!(AppId::new("../etc").is_err());
    assert!(AppId::new("a/b").is_err());
    assert!(AppId::new("-leading").is_err());
    assert!(AppId::new("x".repeat(MAX_APP_ID_LEN + 1)).is_err());
}

#[test]
fn app_id_deserialize_validates() {
    let ok: AppId = serde_json::from_str("\"weather\"").unwrap();
    assert_eq!(ok.as_str(), "weather");
    assert!(serde_json::from_str::<AppId>("\"../weather\"").is_err());
}

#[test]
fn canvas_scaled_and_len() {
    let c = NATIVE_CANVAS.scaled(2);
    assert_eq!(c, Canvas::new(128, 64));
    assert_eq!(c.rgba8_len(), 128 * 64 * 4);
    assert!(Canvas::new(0, 4).is_empty());
}

#[test]
fn app_config_overlay_prefers_overrides() {
    let mut defaults = AppConfig::new();
    defaults.set("color", "#fff");
    defaults.set("units", "metric");

    let mut user = AppConfig::new();
    user.set("units", "imperial");

    let merged = defaults.overlaid(&user);
    assert_eq!(merged.get("color"), Some("#fff"));
    assert_eq!(merged.get("units"), Some("imperial"));
    assert_eq!(merged.len(), 2);
}
