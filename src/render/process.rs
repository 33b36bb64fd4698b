use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::Context as _;

use crate::foundation::error::FrameloopResult;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long pipes may stay open after the process group was killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

type Drain = Receiver<std::io::Result<Vec<u8>>>;

/// Shared flag that asks a running render to stop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`CancelToken::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Captured output of a process that exited on its own.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub(crate) status: ExitStatus,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
    pub(crate) elapsed: Duration,
}

/// How a supervised process ended.
#[derive(Debug)]
pub(crate) enum ProcessOutcome {
    Exited(ProcessOutput),
    /// Killed after the deadline passed.
    TimedOut { pid: u32 },
    /// Killed because the cancel token fired.
    Cancelled { pid: u32 },
}

/// Spawn `cmd` in its own process group and wait for it, killing the whole group on timeout or
/// cancellation. stdin is closed; stdout and stderr are drained on helper threads so a chatty
/// child can never block on a full pipe.
///
/// The deadline also bounds output collection: when the child exits but something it left in
/// its group keeps the pipes open, the group is killed at the deadline and whatever was read
/// by then is returned.
pub(crate) fn run_supervised(
    cmd: &mut Command,
    timeout: Duration,
    cancel: &CancelToken,
) -> FrameloopResult<ProcessOutcome> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        cmd.process_group(0);
    }

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn renderer {:?}", cmd.get_program()))?;
    let pid = child.id();

    let stdout_drain = child.stdout.take().map(drain);
    let stderr_drain = child.stderr.take().map(drain);

    let deadline = started + timeout;
    loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("failed to poll renderer pid {pid}"))?
        {
            let mut stdout = wait_drain(stdout_drain.as_ref(), deadline);
            let mut stderr = wait_drain(stderr_drain.as_ref(), deadline);
            if stdout.is_none() || stderr.is_none() {
                tracing::warn!(
                    pid,
                    "renderer exited but its pipes are still held open; killing its group"
                );
                signal_group(pid);
                let grace = Instant::now() + DRAIN_GRACE;
                stdout = stdout.or_else(|| wait_drain(stdout_drain.as_ref(), grace));
                stderr = stderr.or_else(|| wait_drain(stderr_drain.as_ref(), grace));
            }
            return Ok(ProcessOutcome::Exited(ProcessOutput {
                status,
                stdout: stdout.unwrap_or_default(),
                stderr: stderr.unwrap_or_default(),
                elapsed: started.elapsed(),
            }));
        }
        if cancel.is_cancelled() {
            kill_group(&mut child);
            tracing::debug!(pid, "renderer cancelled and killed");
            return Ok(ProcessOutcome::Cancelled { pid });
        }
        let now = Instant::now();
        if now >= deadline {
            kill_group(&mut child);
            tracing::debug!(pid, timeout_ms = timeout.as_millis() as u64, "renderer killed after timeout");
            return Ok(ProcessOutcome::TimedOut { pid });
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Drain {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        let result = pipe.read_to_end(&mut bytes).map(|_| bytes);
        let _ = tx.send(result);
    });
    rx
}

/// Output of a drain thread, or `None` if the pipe is still open at `until`.
fn wait_drain(drain: Option<&Drain>, until: Instant) -> Option<Vec<u8>> {
    let Some(rx) = drain else {
        return Some(Vec::new());
    };
    match rx.recv_timeout(until.saturating_duration_since(Instant::now())) {
        Ok(Ok(bytes)) => Some(bytes),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "renderer pipe read failed");
            Some(Vec::new())
        }
        Err(RecvTimeoutError::Disconnected) => {
            tracing::debug!("renderer pipe drain thread panicked");
            Some(Vec::new())
        }
        Err(RecvTimeoutError::Timeout) => None,
    }
}

/// Kill the child's process group (the child leads it) and reap the child.
///
/// Drain threads are left detached: a grandchild that escaped the group could keep a pipe open.
fn kill_group(child: &mut Child) {
    signal_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

/// SIGKILL the process group led by `pid`. The group stays addressable after its leader was
/// reaped, as long as any member is alive.
fn signal_group(pid: u32) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(pid) {
            // SAFETY: plain syscall on a process group id we created; no memory is shared.
            #[allow(unsafe_code)]
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc != 0 {
                tracing::debug!(
                    pgid,
                    error = %std::io::Error::last_os_error(),
                    "killpg failed"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

#[cfg(test)]
#[path = "../../tests/unit/render/process.rs"]
mod tests;
