#![cfg(unix)]

use std::path::{Path, PathBuf};

use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, RgbaImage};

use super::*;
use crate::foundation::core::Canvas;
use crate::foundation::fsutil::unique_suffix;
use crate::repo::catalog::DirCatalog;

const CLOCK_APP: &str = r#"
load("render.star", "render")
load("schema.star", "schema")

def main(config):
    return render.Root(child = render.Text("12:00"))

def get_schema():
    return schema.Schema(
        version = "1",
        fields = [
            schema.Toggle(id = "seconds", name = "Seconds", desc = "Show seconds.", icon = "clock", default = False),
            schema.Dropdown(
                id = "units",
                name = "Units",
                desc = "Units.",
                icon = "gear",
                default = "c",
                options = [
                    schema.Option(display = "Celsius", value = "c"),
                    schema.Option(display = "Fahrenheit", value = "f"),
                ],
            ),
        ],
    )
"#;

struct Fixture {
    root: PathBuf,
    cfg: RuntimeConfig,
}

impl Fixture {
    fn new(tag: &str) -> Self {
        let root = std::env::temp_dir().join(format!("frameloop_rt_{tag}_{}", unique_suffix()));
        let catalog = root.join("catalog").join("clock");
        std::fs::create_dir_all(&catalog).unwrap();
        std::fs::write(
            catalog.join("manifest.json"),
            serde_json::json!({"id": "clock", "name": "Clock", "source": "clock.star"}).to_string(),
        )
        .unwrap();
        std::fs::write(catalog.join("clock.star"), CLOCK_APP).unwrap();
        std::fs::write(root.join("frames.gif"), gif_bytes(2)).unwrap();

        let script = root.join("renderer.sh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nfor a; do out=\"$a\"; done\necho \"$@\" >> '{log}'\n\
                 if [ -f '{fail}' ]; then echo boom >&2; exit 3; fi\ncp '{gif}' \"$out\"\n",
                log = root.join("calls.log").display(),
                fail = root.join("fail").display(),
                gif = root.join("frames.gif").display(),
            ),
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt as _;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut cfg = RuntimeConfig {
            apps_dir: root.join("apps"),
            ..RuntimeConfig::default()
        };
        cfg.renderer.binary = script;
        cfg.renderer.timeout_ms = 10_000;
        cfg.schedule.workers = 1;
        Self { root, cfg }
    }

    fn runtime(&self) -> AppRuntime {
        let catalog: Arc<dyn Catalog> = Arc::new(DirCatalog::new(self.root.join("catalog")));
        let store = Arc::new(FsConfigStore::new(AppLayout::new(&self.cfg.apps_dir)));
        AppRuntime::with_parts(self.cfg.clone(), Some(catalog), store).unwrap()
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.root.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    fn set_failing(&self, failing: bool) {
        let flag = self.root.join("fail");
        if failing {
            std::fs::write(flag, b"1").unwrap();
        } else {
            let _ = std::fs::remove_file(flag);
        }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn gif_bytes(frames: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut enc = GifEncoder::new(&mut buf);
        let frames = (0..frames).map(|i| {
            let img = RgbaImage::from_pixel(64, 32, image::Rgba([(i * 80) as u8, 10, 20, 255]));
            Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(100, 1))
        });
        enc.encode_frames(frames).unwrap();
    }
    buf
}

fn clock() -> AppId {
    AppId::new("clock").unwrap()
}

fn settle(rt: &AppRuntime) {
    assert!(rt.wait_idle(Duration::from_secs(10)));
}

#[test]
fn install_renders_in_background_and_serves_frames() {
    let fx = Fixture::new("install");
    let rt = fx.runtime();
    let record = rt.install(&clock()).unwrap();
    assert_eq!(record.source_file, "clock.star");
    assert!(record.enabled);
    settle(&rt);

    let frames = rt.get_current_frames(&clock()).unwrap();
    assert_eq!(frames.size, Canvas::new(64, 32));
    assert_eq!(frames.frames.len(), 2);
    assert_eq!(frames.frames[0].delay_ms, 100);

    let calls = fx.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("seconds=false"), "{}", calls[0]);
    assert!(calls[0].contains("units=c"), "{}", calls[0]);

    let health = rt.health(&clock()).unwrap();
    assert!(health.has_frames);
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(rt.list_apps().len(), 1);
}

#[test]
fn unknown_apps_are_reported() {
    let fx = Fixture::new("unknown");
    let rt = fx.runtime();
    let ghost = AppId::new("ghost").unwrap();
    assert!(rt.get_current_frames(&ghost).is_none());
    assert!(matches!(rt.get_schema(&ghost), Err(FrameloopError::NotInstalled(_))));
    assert!(matches!(rt.uninstall(&ghost), Err(FrameloopError::NotInstalled(_))));
    assert!(matches!(
        rt.set_config(&ghost, AppConfig::new()),
        Err(FrameloopError::NotInstalled(_))
    ));
    assert!(!rt.request_render(&ghost));
    assert!(matches!(rt.install(&ghost), Err(FrameloopError::Download(_))));
}

#[test]
fn schema_comes_from_installed_source() {
    let fx = Fixture::new("schema");
    let rt = fx.runtime();
    rt.install(&clock()).unwrap();
    let schema = rt.get_schema(&clock()).unwrap();
    let keys = schema.fields.iter().map(|f| f.key.as_str()).collect::<Vec<_>>();
    assert_eq!(keys, vec!["seconds", "units"]);
    settle(&rt);
}

#[test]
fn set_config_validates_persists_and_rerenders() {
    let fx = Fixture::new("config");
    let rt = fx.runtime();
    rt.install(&clock()).unwrap();
    settle(&rt);

    let mut bad = AppConfig::new();
    bad.set("units", "kelvin");
    assert!(matches!(
        rt.set_config(&clock(), bad),
        Err(FrameloopError::Validation(_))
    ));

    let mut config = AppConfig::new();
    config.set("units", "f");
    config.set("seconds", "true");
    rt.set_config(&clock(), config.clone()).unwrap();
    settle(&rt);

    assert_eq!(rt.get_config(&clock()).unwrap(), config);
    let calls = fx.calls();
    let last = calls.last().unwrap();
    assert!(last.contains("units=f"), "{last}");
    assert!(last.contains("seconds=true"), "{last}");
}

#[test]
fn failed_render_keeps_previous_frames() {
    let fx = Fixture::new("failure");
    let rt = fx.runtime();
    rt.install(&clock()).unwrap();
    settle(&rt);
    let before = rt.get_current_frames(&clock()).unwrap();

    fx.set_failing(true);
    let result = rt.render_now(&clock()).unwrap();
    let err = result.unwrap_err();
    assert!(matches!(*err, FrameloopError::RenderProcess { .. }), "{err}");

    let after = rt.get_current_frames(&clock()).unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    let health = rt.health(&clock()).unwrap();
    assert_eq!(health.consecutive_failures, 1);
    assert!(health.last_error.unwrap().contains("boom"));

    fx.set_failing(false);
    assert!(rt.render_now(&clock()).unwrap().is_ok());
    assert_eq!(rt.health(&clock()).unwrap().consecutive_failures, 0);
}

#[test]
fn uninstall_drops_everything() {
    let fx = Fixture::new("uninstall");
    let rt = fx.runtime();
    rt.install(&clock()).unwrap();
    settle(&rt);
    let mut config = AppConfig::new();
    config.set("units", "f");
    rt.set_config(&clock(), config).unwrap();
    settle(&rt);

    rt.uninstall(&clock()).unwrap();
    assert!(rt.get_current_frames(&clock()).is_none());
    assert!(rt.health(&clock()).is_none());
    assert!(rt.list_apps().is_empty());
    assert!(!fx.cfg.apps_dir.join("clock").exists());
    assert!(rt.tick().is_none());

    // Reinstall starts from scratch.
    rt.install(&clock()).unwrap();
    settle(&rt);
    assert!(rt.get_config(&clock()).unwrap().is_empty());
}

#[test]
fn tick_shows_rendered_app_and_stays_idle_without_apps() {
    let fx = Fixture::new("tick");
    let rt = fx.runtime();
    assert!(rt.tick().is_none());

    rt.install(&clock()).unwrap();
    settle(&rt);
    let showing = rt.tick().unwrap();
    assert_eq!(showing.app, clock());
    assert!(!showing.stale);
    assert_eq!(showing.frames.frames.len(), 2);

    rt.set_enabled(&clock(), false).unwrap();
    assert!(rt.tick().is_none());
}

#[test]
fn timing_overrides_must_be_positive() {
    let fx = Fixture::new("timing");
    let rt = fx.runtime();
    rt.install(&clock()).unwrap();
    assert!(matches!(
        rt.set_timing(&clock(), Some(0), None),
        Err(FrameloopError::Validation(_))
    ));
    rt.set_timing(&clock(), Some(5), Some(60)).unwrap();
    let record = rt.list_apps().remove(0);
    assert_eq!(record.display_secs, Some(5));
    assert_eq!(record.render_interval_secs, Some(60));
    settle(&rt);
}

#[test]
fn restart_serves_persisted_render_without_rerendering() {
    let fx = Fixture::new("restart");
    {
        let rt = fx.runtime();
        rt.install(&clock()).unwrap();
        settle(&rt);
    }
    assert_eq!(fx.calls().len(), 1);

    let rt = fx.runtime();
    let frames = rt.get_current_frames(&clock()).unwrap();
    assert_eq!(frames.frames.len(), 2);
    assert!(rt.tick().is_some());
    settle(&rt);
    assert_eq!(fx.calls().len(), 1);
}

#[test]
fn shutdown_cancels_and_runtime_rejects_bad_config() {
    let fx = Fixture::new("shutdown");
    let mut cfg = fx.cfg.clone();
    cfg.schedule.workers = 0;
    let store = Arc::new(FsConfigStore::new(AppLayout::new(&cfg.apps_dir)));
    assert!(matches!(
        AppRuntime::with_parts(cfg, None, store),
        Err(FrameloopError::Config(_))
    ));

    let rt = fx.runtime();
    rt.shutdown();
    assert!(rt.wait_idle(Duration::from_secs(1)));
    assert_eq!(rt.magnify(), 1);
    assert!(Path::new(&rt.config().apps_dir).is_dir());
}

#[test]
fn stale_frames_revalidate_at_most_once_per_ttl() {
    let mut fx = Fixture::new("revalidate");
    fx.cfg.cache.ttl_secs = 1;
    fx.cfg.schedule.render_interval_secs = 3600;
    let rt = fx.runtime();
    rt.install(&clock()).unwrap();
    settle(&rt);
    assert_eq!(fx.calls().len(), 1);

    fx.set_failing(true);
    std::thread::sleep(Duration::from_millis(1100));
    for _ in 0..40 {
        assert!(rt.get_current_frames(&clock()).is_some());
        std::thread::sleep(Duration::from_millis(10));
    }
    settle(&rt);

    assert_eq!(fx.calls().len(), 2);
    let health = rt.health(&clock()).unwrap();
    assert!(health.has_frames);
    assert!(health.stale);
    assert_eq!(health.consecutive_failures, 1);
}

#[test]
fn config_changes_racing_a_finishing_job_are_rendered() {
    let fx = Fixture::new("rerun");
    let rt = fx.runtime();
    rt.install(&clock()).unwrap();

    let units = |i: u64| if i % 2 == 0 { "f" } else { "c" };
    for i in 0..31u64 {
        let mut config = AppConfig::new();
        config.set("units", units(i));
        rt.set_config(&clock(), config).unwrap();
        std::thread::sleep(Duration::from_millis(i % 5));
    }
    settle(&rt);

    let calls = fx.calls();
    let last = calls.last().unwrap();
    assert!(last.contains(&format!("units={}", units(30))), "{last}");
    assert!(rt.request_render(&clock()));
    settle(&rt);
}
