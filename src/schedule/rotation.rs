use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::foundation::core::AppId;

/// Per-app rotation timings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppTiming {
    /// How long the app stays on screen once selected.
    pub display: Duration,
    /// Time between scheduled re-renders.
    pub render_interval: Duration,
}

/// Rotation state machine phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No enabled apps.
    Idle,
    /// `app` has been on screen since `since`.
    Displaying {
        /// App on screen.
        app: AppId,
        /// When it was selected.
        since: Instant,
    },
    /// Looking for the next app with frames.
    Advancing,
}

/// Round-robin playback order and per-app render due times.
///
/// Pure state: callers pass the current instant and a frame-availability probe, which keeps the
/// transitions deterministic under test.
#[derive(Clone, Debug)]
pub struct RotationState {
    order: Vec<AppId>,
    timings: HashMap<AppId, AppTiming>,
    next_render: HashMap<AppId, Instant>,
    /// Index where the next advance starts searching.
    next: usize,
    phase: Phase,
}

impl Default for RotationState {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationState {
    /// Empty rotation in the idle phase.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            timings: HashMap::new(),
            next_render: HashMap::new(),
            next: 0,
            phase: Phase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// App currently displayed.
    pub fn current(&self) -> Option<&AppId> {
        match &self.phase {
            Phase::Displaying { app, .. } => Some(app),
            _ => None,
        }
    }

    /// Enabled apps in rotation order.
    pub fn apps(&self) -> &[AppId] {
        &self.order
    }

    /// Timings of `app`.
    pub fn timing(&self, app: &AppId) -> Option<AppTiming> {
        self.timings.get(app).copied()
    }

    /// Replace the enabled set.
    ///
    /// New apps are due for rendering immediately; apps that stay keep their due time (pulled in
    /// if their interval shrank). A displayed app that stays keeps the screen; otherwise the
    /// search position is clamped and the rotation advances.
    pub fn rebuild(&mut self, apps: Vec<(AppId, AppTiming)>, now: Instant) {
        let old_current_pos = self
            .current()
            .and_then(|cur| self.order.iter().position(|a| a == cur));

        let mut next_render = HashMap::with_capacity(apps.len());
        let mut timings = HashMap::with_capacity(apps.len());
        let mut order = Vec::with_capacity(apps.len());
        for (app, timing) in apps {
            if timings.contains_key(&app) {
                continue;
            }
            let due = match self.next_render.get(&app) {
                Some(&due) => due.min(now + timing.render_interval),
                None => now,
            };
            next_render.insert(app.clone(), due);
            timings.insert(app.clone(), timing);
            order.push(app);
        }
        self.order = order;
        self.timings = timings;
        self.next_render = next_render;

        if self.order.is_empty() {
            self.phase = Phase::Idle;
            self.next = 0;
            return;
        }

        let kept = match &self.phase {
            Phase::Displaying { app, .. } => self.order.iter().position(|a| a == app),
            _ => None,
        };
        match kept {
            Some(idx) => self.next = (idx + 1) % self.order.len(),
            None => {
                // The removed app's successor slid into its position.
                let start = old_current_pos.unwrap_or(self.next);
                self.next = if start >= self.order.len() { 0 } else { start };
                self.phase = Phase::Advancing;
            }
        }
    }

    /// Advance the state machine to `now` and return the app whose frames should be shown.
    ///
    /// `has_frames` reports whether an app has a cached render; apps without one are skipped.
    /// When no app has frames the phase stays [`Phase::Advancing`] and `None` is returned.
    pub fn tick(&mut self, now: Instant, has_frames: impl Fn(&AppId) -> bool) -> Option<AppId> {
        if self.order.is_empty() {
            self.phase = Phase::Idle;
            return None;
        }
        if let Phase::Displaying { app, since } = &self.phase {
            let display = self
                .timings
                .get(app)
                .map_or(Duration::ZERO, |t| t.display);
            if now.saturating_duration_since(*since) < display && has_frames(app) {
                return Some(app.clone());
            }
            self.phase = Phase::Advancing;
        }
        if self.phase == Phase::Idle {
            self.phase = Phase::Advancing;
        }

        let len = self.order.len();
        for step in 0..len {
            let idx = (self.next + step) % len;
            let app = &self.order[idx];
            if has_frames(app) {
                let app = app.clone();
                self.next = (idx + 1) % len;
                tracing::debug!(app = %app, "rotation advanced");
                self.phase = Phase::Displaying {
                    app: app.clone(),
                    since: now,
                };
                return Some(app);
            }
        }
        None
    }

    /// Apps whose render due time has passed, in rotation order.
    pub fn due_renders(&self, now: Instant) -> Vec<AppId> {
        self.order
            .iter()
            .filter(|a| self.next_render.get(*a).is_some_and(|due| *due <= now))
            .cloned()
            .collect()
    }

    /// Record that a render of `app` was scheduled at `now`; the next one is due one interval
    /// later.
    pub fn mark_scheduled(&mut self, app: &AppId, now: Instant) {
        if let Some(t) = self.timings.get(app) {
            self.next_render.insert(app.clone(), now + t.render_interval);
        }
    }

    /// Set the next render due time of `app` explicitly.
    pub fn set_next_render(&mut self, app: &AppId, at: Instant) {
        if self.timings.contains_key(app) {
            self.next_render.insert(app.clone(), at);
        }
    }

    /// Next render due time of `app`.
    pub fn next_render(&self, app: &AppId) -> Option<Instant> {
        self.next_render.get(app).copied()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/rotation.rs"]
mod tests;
