use super::*;

fn app() -> AppId {
    AppId::new("clock").unwrap()
}

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("frameloop_{tag}_{}", unique_suffix()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[cfg(unix)]
fn fake_renderer(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt as _;
    let path = dir.join("fake-renderer.sh");
    std::fs::write(&path, format!("#!/bin/sh\nfor a; do out=\"$a\"; done\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn renderer(binary: PathBuf, timeout_ms: u64) -> Renderer {
    Renderer::new(RendererConfig {
        binary,
        timeout_ms,
        ..RendererConfig::default()
    })
}

#[test]
fn command_args_follow_renderer_cli() {
    let id = app();
    let mut config = AppConfig::new();
    config.set("units", "c");
    config.set("bad key", "x");
    config.set("a=b", "x");
    config.set("", "x");
    config.set("location", "{\"lat\": 1}");
    let r = Renderer::new(RendererConfig {
        extra_args: vec!["--gif".to_owned()],
        ..RendererConfig::default()
    });
    let req = RenderRequest {
        app_id: &id,
        source: Path::new("/apps/clock/clock.star"),
        work_dir: Path::new("/apps/clock"),
        config: &config,
        magnify: 2,
    };
    let args = r.command_args(&req, Path::new("/tmp/out.webp"));
    let args = args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(
        args,
        vec![
            "render",
            "/apps/clock/clock.star",
            "--magnify",
            "2",
            "location={\"lat\": 1}",
            "units=c",
            "--gif",
            "-o",
            "/tmp/out.webp",
        ]
    );
}

#[test]
fn magnify_of_one_is_omitted() {
    let id = app();
    let config = AppConfig::new();
    let req = RenderRequest {
        app_id: &id,
        source: Path::new("a.star"),
        work_dir: Path::new("."),
        config: &config,
        magnify: 1,
    };
    let args = Renderer::new(RendererConfig::default()).command_args(&req, Path::new("o"));
    assert!(!args.iter().any(|a| a == "--magnify"));
}

#[test]
fn pre_cancelled_render_never_spawns() {
    let id = app();
    let config = AppConfig::new();
    let cancel = CancelToken::new();
    cancel.cancel();
    let req = RenderRequest {
        app_id: &id,
        source: Path::new("a.star"),
        work_dir: Path::new("."),
        config: &config,
        magnify: 1,
    };
    let err = renderer(PathBuf::from("/nonexistent/renderer"), 1000)
        .render(&req, &cancel)
        .unwrap_err();
    assert!(matches!(err, FrameloopError::Cancelled(ref id) if id == "clock"));
}

#[cfg(unix)]
#[test]
fn successful_render_returns_output_and_cleans_up() {
    let dir = temp_dir("render_ok");
    let bin = fake_renderer(
        &dir,
        "echo \"$@\" > args.txt\necho warming up >&2\nprintf frames > \"$out\"",
    );
    let id = app();
    let mut config = AppConfig::new();
    config.set("units", "f");
    let req = RenderRequest {
        app_id: &id,
        source: Path::new("clock.star"),
        work_dir: &dir,
        config: &config,
        magnify: 3,
    };
    let out = renderer(bin, 10_000).render(&req, &CancelToken::new()).unwrap();
    assert_eq!(out.bytes, b"frames");
    assert_eq!(out.stderr, "warming up");

    let args = std::fs::read_to_string(dir.join("args.txt")).unwrap();
    assert!(args.starts_with("render clock.star --magnify 3 units=f -o "));
    let leftovers = std::fs::read_dir(&dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(".render_"))
        .count();
    assert_eq!(leftovers, 0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn failing_render_carries_stderr() {
    let dir = temp_dir("render_fail");
    let bin = fake_renderer(&dir, "echo 'error: main() missing' >&2\nexit 2");
    let id = app();
    let config = AppConfig::new();
    let req = RenderRequest {
        app_id: &id,
        source: Path::new("clock.star"),
        work_dir: &dir,
        config: &config,
        magnify: 1,
    };
    let err = renderer(bin, 10_000)
        .render(&req, &CancelToken::new())
        .unwrap_err();
    match err {
        FrameloopError::RenderProcess { stderr, .. } => assert_eq!(stderr, "error: main() missing"),
        other => panic!("unexpected {other:?}"),
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn zero_exit_without_output_is_a_failure() {
    let dir = temp_dir("render_empty");
    let id = app();
    let config = AppConfig::new();
    let req = RenderRequest {
        app_id: &id,
        source: Path::new("clock.star"),
        work_dir: &dir,
        config: &config,
        magnify: 1,
    };
    let missing = renderer(fake_renderer(&dir, "exit 0"), 10_000)
        .render(&req, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(missing, FrameloopError::RenderProcess { .. }));

    let empty = renderer(fake_renderer(&dir, ": > \"$out\""), 10_000)
        .render(&req, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(empty, FrameloopError::RenderProcess { ref stderr, .. } if stderr.contains("empty")));
    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn slow_render_times_out() {
    let dir = temp_dir("render_slow");
    let bin = fake_renderer(&dir, "sleep 30");
    let id = app();
    let config = AppConfig::new();
    let req = RenderRequest {
        app_id: &id,
        source: Path::new("clock.star"),
        work_dir: &dir,
        config: &config,
        magnify: 1,
    };
    let err = renderer(bin, 200).render(&req, &CancelToken::new()).unwrap_err();
    assert!(matches!(
        err,
        FrameloopError::RenderTimeout { after } if after == Duration::from_millis(200)
    ));
    let _ = std::fs::remove_dir_all(&dir);
}
