use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::config::RendererConfig;
use crate::foundation::core::{AppConfig, AppId};
use crate::foundation::error::{FrameloopError, FrameloopResult};
use crate::foundation::fsutil::{TempFileGuard, unique_suffix};
use crate::render::process::{CancelToken, ProcessOutcome, run_supervised};

/// Inputs of one renderer invocation.
#[derive(Clone, Copy, Debug)]
pub struct RenderRequest<'a> {
    /// App being rendered (used for logs and errors).
    pub app_id: &'a AppId,
    /// App source file.
    pub source: &'a Path,
    /// Working directory of the renderer; the temp output file is created here too.
    pub work_dir: &'a Path,
    /// Effective config, one `key=value` argument each.
    pub config: &'a AppConfig,
    /// Output magnification (1 = native 64×32).
    pub magnify: u32,
}

/// Raw renderer output.
#[derive(Clone, Debug)]
pub struct RenderOutput {
    /// Encoded animation bytes (WebP or GIF).
    pub bytes: Vec<u8>,
    /// Trimmed stderr, kept for diagnostics even on success.
    pub stderr: String,
    /// Wall-clock time the process ran.
    pub elapsed: Duration,
}

/// Runs the external renderer binary, one process per call.
#[derive(Clone, Debug)]
pub struct Renderer {
    cfg: RendererConfig,
}

impl Renderer {
    /// Renderer with the given settings.
    pub fn new(cfg: RendererConfig) -> Self {
        Self { cfg }
    }

    /// Settings in use.
    pub fn config(&self) -> &RendererConfig {
        &self.cfg
    }

    /// Argument vector for `req` writing to `out`, without the binary itself.
    ///
    /// Config keys that would be ambiguous on the command line (empty, containing `=` or
    /// whitespace) are dropped.
    pub fn command_args(&self, req: &RenderRequest<'_>, out: &Path) -> Vec<OsString> {
        let mut args = vec![OsString::from("render"), req.source.as_os_str().to_owned()];
        if req.magnify > 1 {
            args.push("--magnify".into());
            args.push(req.magnify.to_string().into());
        }
        for (key, value) in req.config.iter() {
            if !is_valid_arg_key(key) {
                tracing::warn!(app = %req.app_id, key, "dropping config key that cannot be passed to the renderer");
                continue;
            }
            args.push(format!("{key}={value}").into());
        }
        args.extend(self.cfg.extra_args.iter().map(OsString::from));
        args.push("-o".into());
        args.push(out.as_os_str().to_owned());
        args
    }

    /// Render once, blocking until the process exits, times out or is cancelled.
    #[tracing::instrument(skip(self, req, cancel), fields(app = %req.app_id, magnify = req.magnify))]
    pub fn render(
        &self,
        req: &RenderRequest<'_>,
        cancel: &CancelToken,
    ) -> FrameloopResult<RenderOutput> {
        if cancel.is_cancelled() {
            return Err(FrameloopError::Cancelled(req.app_id.to_string()));
        }
        let out_path = self.output_path(req);
        let _guard = TempFileGuard(Some(out_path.clone()));

        let mut cmd = Command::new(&self.cfg.binary);
        cmd.args(self.command_args(req, &out_path))
            .current_dir(req.work_dir);

        let timeout = self.cfg.timeout();
        let output = match run_supervised(&mut cmd, timeout, cancel)? {
            ProcessOutcome::Exited(output) => output,
            ProcessOutcome::TimedOut { pid } => {
                tracing::warn!(pid, timeout_ms = timeout.as_millis() as u64, "render timed out");
                return Err(FrameloopError::RenderTimeout { after: timeout });
            }
            ProcessOutcome::Cancelled { pid } => {
                tracing::info!(pid, "render cancelled");
                return Err(FrameloopError::Cancelled(req.app_id.to_string()));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if !output.stdout.is_empty() {
            tracing::trace!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "renderer stdout");
        }
        if !output.status.success() {
            return Err(FrameloopError::render_process(
                output.status.to_string(),
                stderr,
            ));
        }

        let bytes = match std::fs::read(&out_path) {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => {
                return Err(FrameloopError::render_process(
                    output.status.to_string(),
                    "renderer produced an empty output file",
                ));
            }
            Err(e) => {
                return Err(FrameloopError::render_process(
                    output.status.to_string(),
                    format!("renderer produced no output file: {e}"),
                ));
            }
        };

        tracing::debug!(
            bytes = bytes.len(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "render finished"
        );
        Ok(RenderOutput {
            bytes,
            stderr,
            elapsed: output.elapsed,
        })
    }

    fn output_path(&self, req: &RenderRequest<'_>) -> PathBuf {
        req.work_dir.join(format!(
            ".render_{}_{}.{}",
            req.app_id,
            unique_suffix(),
            self.cfg.output_extension
        ))
    }
}

fn is_valid_arg_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('=') && !key.chars().any(char::is_whitespace)
}

#[cfg(test)]
#[path = "../../tests/unit/render/renderer.rs"]
mod tests;
