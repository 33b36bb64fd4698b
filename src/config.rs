//! Runtime settings loaded from a JSON file.
//!
//! Every section has defaults, so an empty object (`{}`) is a valid configuration for a 64×32
//! panel with `pixlet` on `PATH`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::core::Canvas;
use crate::foundation::error::{FrameloopError, FrameloopResult};
use crate::scale::scaler::{Resample, ScaleMode, ScaleOpts};

/// Top-level runtime configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Root directory holding one sub-directory per installed app plus `manifest.json`.
    pub apps_dir: PathBuf,
    /// Base URL of the remote app catalog. `None` disables installs over HTTP.
    pub catalog_url: Option<String>,
    /// Physical display geometry and scaling.
    pub display: DisplayConfig,
    /// External renderer invocation.
    pub renderer: RendererConfig,
    /// Render cache policy.
    pub cache: CacheConfig,
    /// Rotation and worker pool.
    pub schedule: ScheduleConfig,
    /// Logging defaults (overridden by `RUST_LOG`).
    pub log: LogConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            apps_dir: PathBuf::from("apps"),
            catalog_url: None,
            display: DisplayConfig::default(),
            renderer: RendererConfig::default(),
            cache: CacheConfig::default(),
            schedule: ScheduleConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Physical display settings.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Display width in pixels.
    pub width: u32,
    /// Display height in pixels.
    pub height: u32,
    /// Stretch to fill or center at integer magnification.
    pub mode: ScaleMode,
    /// Resampling filter.
    pub resample: Resample,
    /// Fill color for unused border pixels in center mode (straight RGBA8).
    pub background: [u8; 4],
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 32,
            mode: ScaleMode::Center,
            resample: Resample::Nearest,
            background: [0, 0, 0, 255],
        }
    }
}

impl DisplayConfig {
    /// Display size as a [`Canvas`].
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    /// Scaler options derived from this display.
    pub fn scale_opts(&self) -> ScaleOpts {
        ScaleOpts {
            target: self.canvas(),
            mode: self.mode,
            resample: self.resample,
            background: self.background,
        }
    }
}

/// External renderer settings.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Renderer executable (looked up on `PATH` when relative without separators).
    pub binary: PathBuf,
    /// Hard wall-clock budget per render, in milliseconds.
    pub timeout_ms: u64,
    /// Fixed `--magnify` value. `None` derives it from the display size.
    pub magnify: Option<u32>,
    /// Extra arguments appended after the config values (e.g. `--gif`).
    pub extra_args: Vec<String>,
    /// Extension of the temporary output file.
    pub output_extension: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("pixlet"),
            timeout_ms: 30_000,
            magnify: None,
            extra_args: Vec::new(),
            output_extension: "webp".to_string(),
        }
    }
}

impl RendererConfig {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Render cache settings.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Age after which a cached render is stale (still served, re-render requested).
    pub ttl_secs: u64,
    /// Persist successful renders as `render.bin` and reload them on startup.
    pub persist_artifacts: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            persist_artifacts: true,
        }
    }
}

impl CacheConfig {
    /// TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Rotation and worker pool settings.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Render worker threads.
    pub workers: usize,
    /// Default time each app stays on screen.
    pub display_secs: u64,
    /// Default interval between re-renders of one app.
    pub render_interval_secs: u64,
    /// Display-loop tick period used by the `run` command.
    pub tick_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            display_secs: 15,
            render_interval_secs: 300,
            tick_ms: 250,
        }
    }
}

/// Logging defaults.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default level filter for frameloop targets.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RuntimeConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> FrameloopResult<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: RuntimeConfig = serde_json::from_slice(&bytes)
            .map_err(|e| FrameloopError::config(format!("parse '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> FrameloopResult<()> {
        if self.display.canvas().is_empty() {
            return Err(FrameloopError::config("display width/height must be non-zero"));
        }
        if self.renderer.binary.as_os_str().is_empty() {
            return Err(FrameloopError::config("renderer binary must be set"));
        }
        if self.renderer.timeout_ms == 0 {
            return Err(FrameloopError::config("renderer timeout_ms must be > 0"));
        }
        if self.renderer.magnify == Some(0) {
            return Err(FrameloopError::config("renderer magnify must be >= 1 when set"));
        }
        if self.renderer.output_extension.is_empty()
            || !self
                .renderer
                .output_extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(FrameloopError::config(
                "renderer output_extension must be alphanumeric",
            ));
        }
        if self.schedule.workers == 0 {
            return Err(FrameloopError::config("schedule workers must be >= 1"));
        }
        if self.schedule.display_secs == 0 {
            return Err(FrameloopError::config("schedule display_secs must be >= 1"));
        }
        if self.schedule.render_interval_secs == 0 {
            return Err(FrameloopError::config(
                "schedule render_interval_secs must be >= 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
