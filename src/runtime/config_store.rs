use anyhow::Context as _;

use crate::foundation::core::{AppConfig, AppId};
use crate::foundation::error::FrameloopResult;
use crate::foundation::fsutil::{read_json_opt, write_json_atomic};
use crate::repo::layout::AppLayout;

/// Persistence of per-app config values.
pub trait ConfigStore: Send + Sync {
    /// Stored values of `app`; empty when nothing was saved.
    fn load_config(&self, app: &AppId) -> FrameloopResult<AppConfig>;

    /// Replace the stored values of `app`.
    fn save_config(&self, app: &AppId, config: &AppConfig) -> FrameloopResult<()>;

    /// Forget `app`. Removing an app that has nothing stored is not an error.
    fn remove_config(&self, app: &AppId) -> FrameloopResult<()>;
}

/// Stores values as `config.json` in each app directory.
#[derive(Clone, Debug)]
pub struct FsConfigStore {
    layout: AppLayout,
}

impl FsConfigStore {
    /// Store below `layout`.
    pub fn new(layout: AppLayout) -> Self {
        Self { layout }
    }
}

impl ConfigStore for FsConfigStore {
    fn load_config(&self, app: &AppId) -> FrameloopResult<AppConfig> {
        Ok(read_json_opt(&self.layout.config_path(app))?.unwrap_or_default())
    }

    fn save_config(&self, app: &AppId, config: &AppConfig) -> FrameloopResult<()> {
        write_json_atomic(&self.layout.config_path(app), config)
    }

    fn remove_config(&self, app: &AppId) -> FrameloopResult<()> {
        let path = self.layout.config_path(app);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("remove '{}'", path.display()))
                .map_err(Into::into),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/config_store.rs"]
mod tests;
