use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::foundation::error::{FrameloopError, FrameloopResult};

/// Fixed-size pool that runs render jobs off the display path.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    jobs: Arc<JobCounter>,
}

#[derive(Default)]
struct JobCounter {
    active: Mutex<usize>,
    idle: Condvar,
}

/// Decrements the counter even if the job unwinds.
struct JobGuard(Arc<JobCounter>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        let mut active = self.0.active.lock();
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.0.idle.notify_all();
        }
    }
}

impl WorkerPool {
    /// Pool with `threads` workers.
    pub fn new(threads: usize) -> FrameloopResult<Self> {
        if threads == 0 {
            return Err(FrameloopError::validation("worker pool needs at least one thread"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("frameloop-render-{i}"))
            .panic_handler(|_| tracing::error!("render job panicked"))
            .build()
            .map_err(|e| FrameloopError::config(format!("failed to build rayon thread pool: {e}")))?;
        Ok(Self {
            pool,
            jobs: Arc::new(JobCounter::default()),
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue `job`; returns immediately.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.jobs.active.lock() += 1;
        let guard = JobGuard(Arc::clone(&self.jobs));
        self.pool.spawn(move || {
            let _guard = guard;
            job();
        });
    }

    /// Jobs queued or running.
    pub fn active(&self) -> usize {
        *self.jobs.active.lock()
    }

    /// Block until no job is queued or running, or `timeout` passes. Returns `true` when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut active = self.jobs.active.lock();
        while *active > 0 {
            if self.jobs.idle.wait_until(&mut active, deadline).timed_out() {
                return *active == 0;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/pool.rs"]
mod tests;
