use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::foundation::core::{AppId, unix_now};
use crate::foundation::error::{FrameloopError, FrameloopResult};
use crate::foundation::fsutil::{TempDirGuard, ensure_parent_dir, unique_suffix};
use crate::repo::catalog::{Catalog, CatalogApp};
use crate::repo::layout::{ASSETS_DIR, AppLayout, CONFIG_FILE};
use crate::repo::registry::AppRecord;

/// Downloads apps from a [`Catalog`] into the apps root.
///
/// Installs are staged: everything is fetched and verified in `.staging/` and the finished
/// directory replaces the live one with renames, so other components only ever see a complete
/// app directory (or none).
pub struct RepositoryClient {
    layout: AppLayout,
    catalog: Option<Arc<dyn Catalog>>,
}

impl RepositoryClient {
    /// Client installing into `layout` from `catalog`.
    pub fn new(layout: AppLayout, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            layout,
            catalog: Some(catalog),
        }
    }

    /// Client without a catalog: existing apps can be removed, nothing can be installed.
    pub fn offline(layout: AppLayout) -> Self {
        Self {
            layout,
            catalog: None,
        }
    }

    /// Directory layout in use.
    pub fn layout(&self) -> &AppLayout {
        &self.layout
    }

    /// Fetch `app` and move it into place.
    ///
    /// `previous` is the existing record on update: its enabled flag and timing overrides carry
    /// over, as does the app's stored `config.json`. The registry itself is not touched.
    #[tracing::instrument(skip(self, previous), fields(app = %app))]
    pub fn install(&self, app: &AppId, previous: Option<&AppRecord>) -> FrameloopResult<AppRecord> {
        let catalog = self.catalog()?;
        let listing = catalog.describe(app)?.validated(app)?;
        tracing::info!(
            name = %listing.name,
            assets = listing.assets.len(),
            revision = listing.revision.as_deref().unwrap_or("-"),
            "installing app"
        );

        let staging_root = self.layout.staging_root();
        std::fs::create_dir_all(&staging_root)
            .with_context(|| format!("create '{}'", staging_root.display()))?;
        let staged = staging_root.join(format!("{app}_{}", unique_suffix()));
        std::fs::create_dir(&staged).with_context(|| format!("create '{}'", staged.display()))?;
        let staged_guard = TempDirGuard(Some(staged.clone()));

        fetch_into(catalog, app, &listing, &staged)?;

        let live = self.layout.app_dir(app);
        let live_config = live.join(CONFIG_FILE);
        if live_config.is_file() {
            std::fs::copy(&live_config, staged.join(CONFIG_FILE))
                .with_context(|| format!("preserve '{}'", live_config.display()))?;
        }

        self.swap_in(app, &staged)?;
        staged_guard.disarm();

        let record = AppRecord {
            id: app.clone(),
            name: listing.name,
            source_file: listing.source,
            assets: listing.assets,
            installed_at: unix_now(),
            revision: listing.revision,
            enabled: previous.is_none_or(|p| p.enabled),
            display_secs: previous.and_then(|p| p.display_secs),
            render_interval_secs: previous.and_then(|p| p.render_interval_secs),
        };
        tracing::info!("app installed");
        Ok(record)
    }

    /// Remove the directory of `app`. Returns `false` when it did not exist.
    ///
    /// The directory is first renamed into the staging area, so a half-deleted app is never
    /// visible under its own name.
    pub fn remove_files(&self, app: &AppId) -> FrameloopResult<bool> {
        let live = self.layout.app_dir(app);
        if !live.exists() {
            return Ok(false);
        }
        let trash = self.trash_path(app)?;
        std::fs::rename(&live, &trash)
            .with_context(|| format!("move '{}' aside", live.display()))?;
        std::fs::remove_dir_all(&trash).with_context(|| format!("remove '{}'", trash.display()))?;
        tracing::info!(app = %app, "app files removed");
        Ok(true)
    }

    /// Delete leftovers of interrupted installs.
    pub fn clean_staging(&self) -> FrameloopResult<()> {
        let staging = self.layout.staging_root();
        match std::fs::remove_dir_all(&staging) {
            Ok(()) => {
                tracing::debug!(path = %staging.display(), "cleared staging area");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("clear '{}'", staging.display()))
                .into()),
        }
    }

    fn catalog(&self) -> FrameloopResult<&dyn Catalog> {
        self.catalog
            .as_deref()
            .ok_or_else(|| FrameloopError::config("no catalog configured; set catalog_url"))
    }

    fn swap_in(&self, app: &AppId, staged: &Path) -> FrameloopResult<()> {
        let live = self.layout.app_dir(app);
        if !live.exists() {
            std::fs::rename(staged, &live)
                .with_context(|| format!("move '{}' into place", staged.display()))?;
            return Ok(());
        }

        let old = self.trash_path(app)?;
        std::fs::rename(&live, &old).with_context(|| format!("move '{}' aside", live.display()))?;
        let old_guard = TempDirGuard(Some(old.clone()));
        if let Err(e) = std::fs::rename(staged, &live) {
            // Put the previous version back; the staged copy is cleaned up by its guard.
            old_guard.disarm();
            std::fs::rename(&old, &live)
                .with_context(|| format!("restore '{}' after failed update", live.display()))?;
            return Err(anyhow::Error::new(e)
                .context(format!("move '{}' into place", staged.display()))
                .into());
        }
        Ok(())
    }

    fn trash_path(&self, app: &AppId) -> FrameloopResult<std::path::PathBuf> {
        let staging = self.layout.staging_root();
        std::fs::create_dir_all(&staging).with_context(|| format!("create '{}'", staging.display()))?;
        Ok(staging.join(format!("{app}_old_{}", unique_suffix())))
    }
}

fn fetch_into(
    catalog: &dyn Catalog,
    app: &AppId,
    listing: &CatalogApp,
    staged: &Path,
) -> FrameloopResult<()> {
    let source = fetch_non_empty(catalog, app, &listing.source)?;
    if std::str::from_utf8(&source).is_err() {
        return Err(FrameloopError::download(format!(
            "source '{}' of '{app}' is not valid UTF-8",
            listing.source
        )));
    }
    write_new(&staged.join(&listing.source), &source)?;

    let assets = staged.join(ASSETS_DIR);
    std::fs::create_dir_all(&assets).with_context(|| format!("create '{}'", assets.display()))?;
    for rel in &listing.assets {
        let bytes = fetch_non_empty(catalog, app, rel)?;
        write_new(&assets.join(rel), &bytes)?;
    }
    Ok(())
}

fn fetch_non_empty(catalog: &dyn Catalog, app: &AppId, path: &str) -> FrameloopResult<Vec<u8>> {
    let bytes = catalog.fetch(app, path)?;
    if bytes.is_empty() {
        return Err(FrameloopError::download(format!("'{path}' of '{app}' is empty")));
    }
    tracing::debug!(path, bytes = bytes.len(), "fetched");
    Ok(bytes)
}

fn write_new(path: &Path, bytes: &[u8]) -> FrameloopResult<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, bytes).with_context(|| format!("write '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/repo/client.rs"]
mod tests;
