use std::path::{Path, PathBuf};

use crate::foundation::core::AppId;

/// Registry of installed apps, directly under the apps root.
pub const REGISTRY_FILE: &str = "manifest.json";
/// Scratch area for installs and removals in progress.
pub const STAGING_DIR: &str = ".staging";
/// Stored config values of one app.
pub const CONFIG_FILE: &str = "config.json";
/// Extracted schema of one app.
pub const SCHEMA_FILE: &str = "schema.json";
/// Asset subdirectory of one app.
pub const ASSETS_DIR: &str = "assets";

/// On-disk layout below the apps root.
///
/// ```text
/// apps/
///   manifest.json
///   .staging/
///   <id>/
///     <source>.star
///     config.json  schema.json  render.bin  render.json
///     assets/...
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppLayout {
    root: PathBuf,
}

impl AppLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Apps root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registry file.
    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    /// Staging area.
    pub fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Directory of `app`.
    pub fn app_dir(&self, app: &AppId) -> PathBuf {
        self.root.join(app.as_str())
    }

    /// Source file of `app`.
    pub fn source_path(&self, app: &AppId, source_file: &str) -> PathBuf {
        self.app_dir(app).join(source_file)
    }

    /// Stored config of `app`.
    pub fn config_path(&self, app: &AppId) -> PathBuf {
        self.app_dir(app).join(CONFIG_FILE)
    }

    /// Cached schema of `app`.
    pub fn schema_path(&self, app: &AppId) -> PathBuf {
        self.app_dir(app).join(SCHEMA_FILE)
    }

    /// Asset directory of `app`.
    pub fn assets_dir(&self, app: &AppId) -> PathBuf {
        self.app_dir(app).join(ASSETS_DIR)
    }
}
