use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};

use crate::foundation::core::{AppId, unix_secs};
use crate::foundation::error::FrameloopError;
use crate::render::fingerprint::JobFingerprint;
use crate::scale::scaler::DisplayAnimation;

/// A successful render, immutable once produced.
#[derive(Debug)]
pub struct RenderSuccess {
    /// Encoded renderer output, kept for artifact persistence.
    pub raw: Arc<[u8]>,
    /// Frames scaled to the display.
    pub animation: Arc<DisplayAnimation>,
    /// Frame count reported by the decoder.
    pub decoded_frames: usize,
    /// When the renderer produced `raw`.
    pub generated_at: SystemTime,
    /// Identity of the job that produced it.
    pub fingerprint: JobFingerprint,
}

/// Outcome of one render job. Errors are shared so every single-flight caller sees the same one.
pub type RenderResult = Result<Arc<RenderSuccess>, Arc<FrameloopError>>;

/// Frames served to the display loop.
#[derive(Clone, Debug)]
pub struct CachedFrames {
    /// The cached render.
    pub render: Arc<RenderSuccess>,
    /// Time since `render.generated_at`.
    pub age: Duration,
    /// `age > ttl`; still served, a re-render should be requested.
    pub stale: bool,
}

impl CachedFrames {
    /// The display animation.
    pub fn animation(&self) -> &Arc<DisplayAnimation> {
        &self.render.animation
    }
}

/// Operator-facing render health of one app.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AppHealth {
    /// Unix seconds of the last successful render.
    pub last_success: Option<u64>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Failures since the app was registered.
    pub total_failures: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// A successful render is cached.
    pub has_frames: bool,
    /// The cached render is older than the ttl.
    pub stale: bool,
}

/// What [`RenderCache::put`] did with a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The success replaced the entry.
    Stored,
    /// The failure was counted; the previous entry (if any) stays.
    FailureRecorded,
    /// The app was uninstalled or reinstalled since the job started.
    Discarded,
}

struct Slot {
    epoch: u64,
    entry: RwLock<Option<Arc<RenderSuccess>>>,
    health: Mutex<AppHealth>,
}

/// Latest good render per app, with a ttl and stale-while-revalidate reads.
///
/// Each app has its own slot, so writers for one app never contend with readers of another.
/// Slots carry an epoch: a job captures it before rendering and its result is discarded if the
/// slot was removed or replaced in the meantime.
pub struct RenderCache {
    ttl: Duration,
    slots: RwLock<HashMap<AppId, Arc<Slot>>>,
    next_epoch: AtomicU64,
}

impl RenderCache {
    /// Empty cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Configured ttl.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create the slot for `app` if missing and return its epoch.
    pub fn register(&self, app: &AppId) -> u64 {
        if let Some(epoch) = self.epoch(app) {
            return epoch;
        }
        let mut slots = self.slots.write();
        let slot = slots.entry(app.clone()).or_insert_with(|| {
            Arc::new(Slot {
                epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
                entry: RwLock::new(None),
                health: Mutex::new(AppHealth::default()),
            })
        });
        slot.epoch
    }

    /// Current epoch of `app`, `None` when it has no slot.
    pub fn epoch(&self, app: &AppId) -> Option<u64> {
        self.slot(app).map(|s| s.epoch)
    }

    /// Latest successful render of `app`. Never waits for a render in progress.
    pub fn get(&self, app: &AppId) -> Option<CachedFrames> {
        let render = self.slot(app)?.entry.read().clone()?;
        let age = age_of(&render);
        Some(CachedFrames {
            stale: age > self.ttl,
            render,
            age,
        })
    }

    /// `true` when `app` has a cached success.
    pub fn has_frames(&self, app: &AppId) -> bool {
        self.slot(app).is_some_and(|s| s.entry.read().is_some())
    }

    /// Publish a job result for `app` if the slot still has `epoch`.
    pub fn put(&self, app: &AppId, epoch: u64, result: &RenderResult) -> PutOutcome {
        let Some(slot) = self.slot(app).filter(|s| s.epoch == epoch) else {
            tracing::debug!(app = %app, epoch, "discarding render result for a removed app");
            return PutOutcome::Discarded;
        };
        match result {
            Ok(success) => {
                *slot.entry.write() = Some(Arc::clone(success));
                let mut health = slot.health.lock();
                health.last_success = Some(unix_secs(success.generated_at));
                health.consecutive_failures = 0;
                health.last_error = None;
                PutOutcome::Stored
            }
            Err(err) => {
                let mut health = slot.health.lock();
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                health.total_failures = health.total_failures.saturating_add(1);
                health.last_error = Some(err.to_string());
                PutOutcome::FailureRecorded
            }
        }
    }

    /// Drop the slot of `app`; in-flight results for it will be discarded.
    pub fn remove(&self, app: &AppId) -> bool {
        self.slots.write().remove(app).is_some()
    }

    /// Health snapshot of `app`.
    pub fn health(&self, app: &AppId) -> Option<AppHealth> {
        let slot = self.slot(app)?;
        let mut health = slot.health.lock().clone();
        if let Some(render) = slot.entry.read().as_ref() {
            health.has_frames = true;
            health.stale = age_of(render) > self.ttl;
        }
        Some(health)
    }

    fn slot(&self, app: &AppId) -> Option<Arc<Slot>> {
        self.slots.read().get(app).cloned()
    }
}

fn age_of(render: &RenderSuccess) -> Duration {
    SystemTime::now()
        .duration_since(render.generated_at)
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
