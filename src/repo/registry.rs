use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::foundation::core::AppId;
use crate::foundation::error::{FrameloopError, FrameloopResult};
use crate::foundation::fsutil::{read_json_opt, write_json_atomic};

const REGISTRY_VERSION: u32 = 1;

fn default_enabled() -> bool {
    true
}

/// One installed app.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AppRecord {
    /// App id.
    pub id: AppId,
    /// Display name from the catalog.
    pub name: String,
    /// Source file name inside the app directory.
    pub source_file: String,
    /// Installed asset paths, relative to the asset directory.
    #[serde(default)]
    pub assets: Vec<String>,
    /// Unix seconds of the last install or update.
    pub installed_at: u64,
    /// Catalog revision that was installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Takes part in the rotation.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Display duration override, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_secs: Option<u64>,
    /// Render interval override, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_interval_secs: Option<u64>,
}

impl AppRecord {
    /// Display duration, falling back to `default`.
    pub fn display_duration(&self, default: Duration) -> Duration {
        self.display_secs.map_or(default, Duration::from_secs)
    }

    /// Render interval, falling back to `default`.
    pub fn render_interval(&self, default: Duration) -> Duration {
        self.render_interval_secs.map_or(default, Duration::from_secs)
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RegistryFile {
    version: u32,
    apps: Vec<AppRecord>,
}

/// Ordered list of installed apps, persisted as JSON. Order is install order and rotation order.
#[derive(Clone, Debug)]
pub struct AppRegistry {
    path: PathBuf,
    apps: Vec<AppRecord>,
}

impl AppRegistry {
    /// Load `path`; a missing file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> FrameloopResult<Self> {
        let path = path.into();
        let apps = match read_json_opt::<RegistryFile>(&path)? {
            Some(file) if file.version == REGISTRY_VERSION => file.apps,
            Some(file) => {
                return Err(FrameloopError::config(format!(
                    "registry '{}' has unsupported version {}",
                    path.display(),
                    file.version
                )));
            }
            None => Vec::new(),
        };
        let mut registry = Self { path, apps: Vec::new() };
        for app in apps {
            registry.upsert(app);
        }
        Ok(registry)
    }

    /// Write the registry atomically.
    pub fn save(&self) -> FrameloopResult<()> {
        write_json_atomic(
            &self.path,
            &RegistryFile {
                version: REGISTRY_VERSION,
                apps: self.apps.clone(),
            },
        )
    }

    /// Registry file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in order.
    pub fn records(&self) -> &[AppRecord] {
        &self.apps
    }

    /// Enabled records in order.
    pub fn enabled(&self) -> impl Iterator<Item = &AppRecord> {
        self.apps.iter().filter(|a| a.enabled)
    }

    /// Record of `app`.
    pub fn get(&self, app: &AppId) -> Option<&AppRecord> {
        self.apps.iter().find(|a| &a.id == app)
    }

    /// Mutable record of `app`.
    pub fn get_mut(&mut self, app: &AppId) -> Option<&mut AppRecord> {
        self.apps.iter_mut().find(|a| &a.id == app)
    }

    /// Insert or replace, keeping the position of an existing record. Returns `true` on replace.
    pub fn upsert(&mut self, record: AppRecord) -> bool {
        match self.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                self.apps.push(record);
                false
            }
        }
    }

    /// Remove the record of `app`.
    pub fn remove(&mut self, app: &AppId) -> Option<AppRecord> {
        let idx = self.apps.iter().position(|a| &a.id == app)?;
        Some(self.apps.remove(idx))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/repo/registry.rs"]
mod tests;
