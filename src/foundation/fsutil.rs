use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;

use crate::foundation::error::{FrameloopError, FrameloopResult};

static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique suffix for temporary names: `<pid>_<nanos>_<counter>`.
pub(crate) fn unique_suffix() -> String {
    format!(
        "{}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
        UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Ensure the parent directory of `path` exists.
pub(crate) fn ensure_parent_dir(path: &Path) -> FrameloopResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so readers see either the
/// old contents or the new ones.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> FrameloopResult<()> {
    ensure_parent_dir(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FrameloopError::validation(format!("bad file path '{}'", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", unique_suffix()));
    let guard = TempFileGuard(Some(tmp.clone()));

    std::fs::write(&tmp, bytes).with_context(|| format!("write '{}'", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename '{}' -> '{}'", tmp.display(), path.display()))?;
    guard.disarm();
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub(crate) fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> FrameloopResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub(crate) fn read_json_opt<T: serde::de::DeserializeOwned>(path: &Path) -> FrameloopResult<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("read '{}'", path.display()))
                .into());
        }
    };
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| FrameloopError::serde(format!("parse '{}': {e}", path.display())))?;
    Ok(Some(value))
}

/// Normalize and validate app-relative file paths coming from a catalog listing.
///
/// The normalized result uses `/` separators, removes `.` segments, and rejects absolute paths or
/// parent traversals (`..`).
pub(crate) fn normalize_rel_path(source: &str) -> FrameloopResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(FrameloopError::validation("app file paths must be relative"));
    }
    if s.is_empty() {
        return Err(FrameloopError::validation("app file path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(FrameloopError::validation(
                "app file paths must not contain '..'",
            ));
        }
        if part.contains(':') {
            return Err(FrameloopError::validation(
                "app file paths must not contain drive prefixes",
            ));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(FrameloopError::validation(
            "app file path must contain a file name",
        ));
    }

    Ok(out.join("/"))
}

/// Removes the wrapped file on drop unless disarmed.
pub(crate) struct TempFileGuard(pub(crate) Option<PathBuf>);

impl TempFileGuard {
    pub(crate) fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Removes the wrapped directory tree on drop unless disarmed.
pub(crate) struct TempDirGuard(pub(crate) Option<PathBuf>);

impl TempDirGuard {
    pub(crate) fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_dir_all(path);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/fsutil.rs"]
mod tests;
