use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::Context as _;
use parking_lot::Mutex;

use crate::cache::artifact::{ArtifactMeta, load_artifact, save_artifact};
use crate::cache::store::{AppHealth, PutOutcome, RenderCache, RenderResult, RenderSuccess};
use crate::config::RuntimeConfig;
use crate::decode::animation::decode_animation;
use crate::foundation::core::{AppConfig, AppId, NATIVE_CANVAS};
use crate::foundation::error::{FrameloopError, FrameloopResult};
use crate::render::fingerprint::{JobFingerprint, fingerprint_job};
use crate::render::process::CancelToken;
use crate::render::renderer::{RenderRequest, Renderer};
use crate::render::single_flight::SingleFlight;
use crate::repo::catalog::{Catalog, HttpCatalog};
use crate::repo::client::RepositoryClient;
use crate::repo::layout::AppLayout;
use crate::repo::registry::{AppRecord, AppRegistry};
use crate::runtime::config_store::{ConfigStore, FsConfigStore};
use crate::scale::scaler::{DisplayAnimation, ScaleOpts, magnification, scale_animation};
use crate::schedule::pool::WorkerPool;
use crate::schedule::rotation::{AppTiming, RotationState};
use crate::schema::extract::load_or_extract;
use crate::schema::model::Schema;

/// What the display loop should show right now.
#[derive(Clone, Debug)]
pub struct NowShowing {
    /// App on screen.
    pub app: AppId,
    /// Its frames, scaled to the display.
    pub frames: Arc<DisplayAnimation>,
    /// The frames are older than the cache ttl (a re-render has been requested).
    pub stale: bool,
}

/// The app runtime: install, configure, render, cache and rotate apps.
///
/// Cheap to clone; clones share state. Reads ([`AppRuntime::get_current_frames`],
/// [`AppRuntime::tick`]) never wait for a render: renders run on the worker pool and publish
/// into the cache when they finish.
#[derive(Clone)]
pub struct AppRuntime {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: RuntimeConfig,
    layout: AppLayout,
    repo: RepositoryClient,
    configs: Arc<dyn ConfigStore>,
    registry: Mutex<AppRegistry>,
    renderer: Renderer,
    cache: RenderCache,
    flights: SingleFlight<AppId, RenderResult>,
    pool: WorkerPool,
    rotation: Mutex<RotationState>,
    /// Apps with a queued job, flagged when another pass was requested meanwhile.
    pending: Mutex<HashMap<AppId, bool>>,
    /// Earliest time stale frames of an app may queue another render.
    revalidate_after: Mutex<HashMap<AppId, Instant>>,
    cancels: Mutex<HashMap<AppId, CancelToken>>,
    scale: ScaleOpts,
    magnify: u32,
}

impl AppRuntime {
    /// Runtime with the filesystem config store and, when `catalog_url` is set, the HTTP catalog.
    pub fn new(cfg: RuntimeConfig) -> FrameloopResult<Self> {
        let catalog = match &cfg.catalog_url {
            Some(url) => Some(Arc::new(HttpCatalog::new(url.clone())?) as Arc<dyn Catalog>),
            None => None,
        };
        let store = Arc::new(FsConfigStore::new(AppLayout::new(&cfg.apps_dir)));
        Self::with_parts(cfg, catalog, store)
    }

    /// Runtime with explicit collaborators.
    pub fn with_parts(
        cfg: RuntimeConfig,
        catalog: Option<Arc<dyn Catalog>>,
        configs: Arc<dyn ConfigStore>,
    ) -> FrameloopResult<Self> {
        cfg.validate()?;
        let layout = AppLayout::new(&cfg.apps_dir);
        std::fs::create_dir_all(layout.root())
            .with_context(|| format!("create apps dir '{}'", layout.root().display()))?;

        let repo = match catalog {
            Some(catalog) => RepositoryClient::new(layout.clone(), catalog),
            None => RepositoryClient::offline(layout.clone()),
        };
        repo.clean_staging()?;

        let registry = AppRegistry::load(layout.registry_path())?;
        let scale = cfg.display.scale_opts();
        let magnify = cfg
            .renderer
            .magnify
            .unwrap_or_else(|| magnification(cfg.display.canvas()));

        let inner = Inner {
            renderer: Renderer::new(cfg.renderer.clone()),
            cache: RenderCache::new(cfg.cache.ttl()),
            flights: SingleFlight::new(),
            pool: WorkerPool::new(cfg.schedule.workers)?,
            rotation: Mutex::new(RotationState::new()),
            pending: Mutex::new(HashMap::new()),
            revalidate_after: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
            registry: Mutex::new(registry),
            cfg,
            layout,
            repo,
            configs,
            scale,
            magnify,
        };
        let runtime = Self {
            inner: Arc::new(inner),
        };
        runtime.inner.startup();
        Ok(runtime)
    }

    /// Runtime settings in use.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.cfg
    }

    /// Magnification passed to the renderer.
    pub fn magnify(&self) -> u32 {
        self.inner.magnify
    }

    /// Latest frames of `app`, never blocking. Stale frames are still returned and trigger a
    /// background re-render, at most once per cache ttl.
    pub fn get_current_frames(&self, app: &AppId) -> Option<Arc<DisplayAnimation>> {
        let cached = self.inner.cache.get(app)?;
        if cached.stale {
            Inner::revalidate(&self.inner, app, Instant::now());
        }
        Some(Arc::clone(cached.animation()))
    }

    /// Install or update `app` from the catalog and schedule its first render.
    pub fn install(&self, app: &AppId) -> FrameloopResult<AppRecord> {
        let inner = &self.inner;
        let previous = inner.registry.lock().get(app).cloned();
        let record = inner.repo.install(app, previous.as_ref())?;

        // A render of the replaced source must not outlive the update.
        inner.cancel_inflight(app);
        {
            let mut registry = inner.registry.lock();
            registry.upsert(record.clone());
            registry.save()?;
        }
        inner.cache.register(app);
        if let Err(err) = inner.schema_of(&record) {
            tracing::warn!(app = %app, error = %err, "schema extraction after install failed");
        }
        inner.rebuild_rotation();
        inner.rotation.lock().set_next_render(app, Instant::now());
        Inner::queue_render(inner, app, true);
        Ok(record)
    }

    /// Remove `app`: cancel its renders, drop its cache entry, config and files.
    ///
    /// A render that is still running when this returns can no longer publish frames.
    pub fn uninstall(&self, app: &AppId) -> FrameloopResult<()> {
        let inner = &self.inner;
        if inner.registry.lock().get(app).is_none() {
            return Err(FrameloopError::NotInstalled(app.to_string()));
        }
        inner.cache.remove(app);
        inner.revalidate_after.lock().remove(app);
        {
            let mut registry = inner.registry.lock();
            registry.remove(app);
            registry.save()?;
        }
        inner.cancel_inflight(app);
        inner.rebuild_rotation();
        inner.configs.remove_config(app)?;
        inner.repo.remove_files(app)?;
        tracing::info!(app = %app, "app uninstalled");
        Ok(())
    }

    /// Configuration schema of `app`, regenerated if its source changed.
    pub fn get_schema(&self, app: &AppId) -> FrameloopResult<Schema> {
        let record = self.inner.record(app)?;
        self.inner.schema_of(&record)
    }

    /// Store new config values for `app` and schedule a re-render with them.
    pub fn set_config(&self, app: &AppId, config: AppConfig) -> FrameloopResult<()> {
        let inner = &self.inner;
        let record = inner.record(app)?;
        inner.schema_of(&record)?.check_config(&config)?;
        inner.configs.save_config(app, &config)?;
        tracing::info!(app = %app, keys = config.len(), "config updated");
        inner.rotation.lock().set_next_render(app, Instant::now());
        Inner::queue_render(inner, app, true);
        Ok(())
    }

    /// Stored config values of `app` (without schema defaults).
    pub fn get_config(&self, app: &AppId) -> FrameloopResult<AppConfig> {
        self.inner.record(app)?;
        self.inner.configs.load_config(app)
    }

    /// Render `app` now on the calling thread, joining a render already in flight.
    pub fn render_now(&self, app: &AppId) -> FrameloopResult<RenderResult> {
        self.inner.record(app)?;
        Ok(self.inner.render_app(app))
    }

    /// Queue a background render of `app` unless one is already queued. Returns `true` when a
    /// job was queued.
    pub fn request_render(&self, app: &AppId) -> bool {
        Inner::queue_render(&self.inner, app, false)
    }

    /// Include or exclude `app` from the rotation.
    pub fn set_enabled(&self, app: &AppId, enabled: bool) -> FrameloopResult<()> {
        self.inner.update_record(app, |r| r.enabled = enabled)
    }

    /// Override display duration and render interval of `app` (`None` = runtime default).
    pub fn set_timing(
        &self,
        app: &AppId,
        display_secs: Option<u64>,
        render_interval_secs: Option<u64>,
    ) -> FrameloopResult<()> {
        if display_secs == Some(0) || render_interval_secs == Some(0) {
            return Err(FrameloopError::validation("durations must be non-zero"));
        }
        self.inner.update_record(app, |r| {
            r.display_secs = display_secs;
            r.render_interval_secs = render_interval_secs;
        })
    }

    /// Installed apps in rotation order.
    pub fn list_apps(&self) -> Vec<AppRecord> {
        self.inner.registry.lock().records().to_vec()
    }

    /// Render health of `app`.
    pub fn health(&self, app: &AppId) -> Option<AppHealth> {
        self.inner.cache.health(app)
    }

    /// One display-loop step: queue due renders, advance the rotation, return what to show.
    pub fn tick(&self) -> Option<NowShowing> {
        Inner::tick(&self.inner, Instant::now())
    }

    /// Wait for queued and running renders, up to `timeout`. `true` when all finished.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.inner.pool.wait_idle(timeout)
    }

    /// Cancel every running render.
    pub fn shutdown(&self) {
        let tokens = std::mem::take(&mut *self.inner.cancels.lock());
        for token in tokens.values() {
            token.cancel();
        }
        tracing::debug!(cancelled = tokens.len(), "runtime shut down");
    }
}

/// Clears the pending mark of an app if its queued job unwinds.
struct PendingGuard {
    inner: Arc<Inner>,
    app: AppId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner.pending.lock().remove(&self.app);
    }
}

impl Inner {
    /// Register installed apps, warm the cache from persisted artifacts and build the rotation.
    fn startup(&self) {
        let records = self.registry.lock().records().to_vec();
        for record in &records {
            self.cache.register(&record.id);
        }
        self.rebuild_rotation();
        if self.cfg.cache.persist_artifacts {
            for record in &records {
                if let Err(err) = self.warm_from_artifact(record) {
                    tracing::warn!(app = %record.id, error = %err, "could not load render artifact");
                }
            }
        }
        tracing::info!(
            apps = records.len(),
            magnify = self.magnify,
            display = %self.scale.target,
            "runtime started"
        );
    }

    fn warm_from_artifact(&self, record: &AppRecord) -> FrameloopResult<()> {
        let app = &record.id;
        let Some((raw, meta)) = load_artifact(&self.layout.app_dir(app))? else {
            return Ok(());
        };
        let epoch = self.cache.register(app);
        let fingerprint = JobFingerprint::from_hex(&meta.fingerprint).ok_or_else(|| {
            FrameloopError::serde(format!("bad fingerprint '{}'", meta.fingerprint))
        })?;
        let success = self.build_success(raw, meta.generated_time(), fingerprint)?;
        self.cache.put(app, epoch, &Ok(success));

        // Reuse the artifact until its interval runs out, unless the job it came from changed.
        let current = self.job_inputs(record).map(|j| j.fingerprint).ok();
        if current == Some(fingerprint) {
            let default = Duration::from_secs(self.cfg.schedule.render_interval_secs);
            let interval = record.render_interval(default);
            let age = SystemTime::now()
                .duration_since(meta.generated_time())
                .unwrap_or(Duration::ZERO);
            let due = Instant::now() + interval.saturating_sub(age);
            self.rotation.lock().set_next_render(app, due);
        }
        tracing::debug!(app = %app, "cache warmed from artifact");
        Ok(())
    }

    fn record(&self, app: &AppId) -> FrameloopResult<AppRecord> {
        self.registry
            .lock()
            .get(app)
            .cloned()
            .ok_or_else(|| FrameloopError::NotInstalled(app.to_string()))
    }

    fn update_record(&self, app: &AppId, f: impl FnOnce(&mut AppRecord)) -> FrameloopResult<()> {
        {
            let mut registry = self.registry.lock();
            let record = registry
                .get_mut(app)
                .ok_or_else(|| FrameloopError::NotInstalled(app.to_string()))?;
            f(record);
            registry.save()?;
        }
        self.rebuild_rotation();
        Ok(())
    }

    fn schema_of(&self, record: &AppRecord) -> FrameloopResult<Schema> {
        load_or_extract(
            &self.layout.source_path(&record.id, &record.source_file),
            &self.layout.schema_path(&record.id),
        )
    }

    fn rebuild_rotation(&self) {
        let display = Duration::from_secs(self.cfg.schedule.display_secs);
        let interval = Duration::from_secs(self.cfg.schedule.render_interval_secs);
        let apps = self
            .registry
            .lock()
            .enabled()
            .map(|r| {
                (
                    r.id.clone(),
                    AppTiming {
                        display: r.display_duration(display),
                        render_interval: r.render_interval(interval),
                    },
                )
            })
            .collect::<Vec<_>>();
        self.rotation.lock().rebuild(apps, Instant::now());
    }

    fn tick(this: &Arc<Self>, now: Instant) -> Option<NowShowing> {
        let (due, current) = {
            let mut rotation = this.rotation.lock();
            let due = rotation.due_renders(now);
            for app in &due {
                rotation.mark_scheduled(app, now);
            }
            let current = rotation.tick(now, |a| this.cache.has_frames(a));
            (due, current)
        };
        for app in &due {
            Self::queue_render(this, app, false);
        }

        let app = current?;
        let cached = this.cache.get(&app)?;
        if cached.stale {
            Self::revalidate(this, &app, now);
        }
        Some(NowShowing {
            frames: Arc::clone(cached.animation()),
            stale: cached.stale,
            app,
        })
    }

    /// Queue a job for `app`. With `rerun`, a job that is already queued renders once more after
    /// its current pass, so inputs changed mid-render are picked up.
    fn queue_render(this: &Arc<Self>, app: &AppId, rerun: bool) -> bool {
        if this.registry.lock().get(app).is_none() {
            return false;
        }
        {
            let mut pending = this.pending.lock();
            if let Some(again) = pending.get_mut(app) {
                *again |= rerun;
                return false;
            }
            pending.insert(app.clone(), false);
        }
        let guard = PendingGuard {
            inner: Arc::clone(this),
            app: app.clone(),
        };
        this.pool.spawn(move || {
            loop {
                let _ = guard.inner.render_app(&guard.app);
                let mut pending = guard.inner.pending.lock();
                if let Some(again) = pending.get_mut(&guard.app)
                    && *again
                {
                    *again = false;
                    continue;
                }
                // Cleared under the same lock that saw no rerun, so a request arriving from
                // here on queues a fresh job.
                pending.remove(&guard.app);
                break;
            }
        });
        true
    }

    /// Queue a render for stale frames unless one was queued for them within the last ttl.
    fn revalidate(this: &Arc<Self>, app: &AppId, now: Instant) -> bool {
        {
            let mut after = this.revalidate_after.lock();
            if after.get(app).is_some_and(|t| now < *t) {
                return false;
            }
            after.insert(app.clone(), now + this.cache.ttl());
        }
        Self::queue_render(this, app, false)
    }

    fn cancel_token(&self, app: &AppId) -> CancelToken {
        self.cancels.lock().entry(app.clone()).or_default().clone()
    }

    fn cancel_inflight(&self, app: &AppId) {
        if let Some(token) = self.cancels.lock().remove(app) {
            token.cancel();
        }
    }

    /// Render through the single-flight group. Only the leader publishes into the cache.
    fn render_app(&self, app: &AppId) -> RenderResult {
        let (result, _led) = self.flights.run(app, || {
            let Some(epoch) = self.cache.epoch(app) else {
                return Err(Arc::new(FrameloopError::NotInstalled(app.to_string())));
            };
            let result = self.execute(app, epoch).map_err(Arc::new);
            self.publish(app, epoch, &result);
            self.rotation.lock().mark_scheduled(app, Instant::now());
            result
        });
        result
    }

    fn publish(&self, app: &AppId, epoch: u64, result: &RenderResult) {
        if let Err(err) = result
            && matches!(**err, FrameloopError::Cancelled(_) | FrameloopError::NotInstalled(_))
        {
            tracing::debug!(app = %app, error = %err, "render abandoned");
            return;
        }
        match self.cache.put(app, epoch, result) {
            PutOutcome::Stored => tracing::info!(app = %app, "render published"),
            PutOutcome::FailureRecorded => match result {
                Err(err) if err.is_render_failure() => {
                    tracing::warn!(app = %app, error = %err, "render failed; keeping previous frames");
                }
                // Spawn errors, unreadable sources and the like: the job never produced output.
                Err(err) => {
                    tracing::error!(app = %app, error = %err, "render job could not run; keeping previous frames");
                }
                Ok(_) => {}
            },
            PutOutcome::Discarded => tracing::debug!(app = %app, "render result discarded"),
        }
    }

    fn execute(&self, app: &AppId, epoch: u64) -> FrameloopResult<Arc<RenderSuccess>> {
        let record = self.record(app)?;
        let cancel = self.cancel_token(app);
        let job = self.job_inputs(&record)?;

        let output = self.renderer.render(
            &RenderRequest {
                app_id: app,
                source: &job.source_path,
                work_dir: &self.layout.app_dir(app),
                config: &job.config,
                magnify: self.magnify,
            },
            &cancel,
        )?;
        if !output.stderr.is_empty() {
            tracing::debug!(app = %app, stderr = %output.stderr, "renderer diagnostics");
        }

        let success = self.build_success(output.bytes, SystemTime::now(), job.fingerprint)?;
        if self.cfg.cache.persist_artifacts {
            self.persist(app, epoch, &cancel, &success);
        }
        Ok(success)
    }

    /// Write the artifact unless the app went away while rendering.
    fn persist(&self, app: &AppId, epoch: u64, cancel: &CancelToken, success: &RenderSuccess) {
        let app_dir = self.layout.app_dir(app);
        if cancel.is_cancelled() || self.cache.epoch(app) != Some(epoch) || !app_dir.is_dir() {
            return;
        }
        let meta = ArtifactMeta::new(&success.raw, success.generated_at, success.fingerprint);
        if let Err(err) = save_artifact(&app_dir, &success.raw, &meta) {
            tracing::warn!(app = %app, error = %err, "could not persist render artifact");
        }
    }

    fn job_inputs(&self, record: &AppRecord) -> FrameloopResult<JobInputs> {
        let source_path = self.layout.source_path(&record.id, &record.source_file);
        let source = std::fs::read(&source_path)
            .with_context(|| format!("read app source '{}'", source_path.display()))?;
        let defaults = match self.schema_of(record) {
            Ok(schema) => schema.defaults(),
            Err(err) => {
                tracing::warn!(app = %record.id, error = %err, "schema unavailable; rendering without defaults");
                AppConfig::new()
            }
        };
        let config = defaults.overlaid(&self.configs.load_config(&record.id)?);
        let fingerprint = fingerprint_job(&source, &config, self.magnify, &self.scale);
        Ok(JobInputs {
            source_path,
            config,
            fingerprint,
        })
    }

    fn build_success(
        &self,
        raw: Vec<u8>,
        generated_at: SystemTime,
        fingerprint: JobFingerprint,
    ) -> FrameloopResult<Arc<RenderSuccess>> {
        let decoded = decode_animation(&raw)?;
        let animation = scale_animation(&decoded, NATIVE_CANVAS, &self.scale)?;
        Ok(Arc::new(RenderSuccess {
            raw: Arc::from(raw),
            decoded_frames: decoded.frames.len(),
            animation,
            generated_at,
            fingerprint,
        }))
    }
}

struct JobInputs {
    source_path: std::path::PathBuf,
    config: AppConfig,
    fingerprint: JobFingerprint,
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/app_runtime.rs"]
mod tests;
