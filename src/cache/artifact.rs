use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context as _;

use crate::foundation::core::unix_secs;
use crate::foundation::error::FrameloopResult;
use crate::foundation::fsutil::{read_json_opt, write_atomic, write_json_atomic};
use crate::render::fingerprint::JobFingerprint;

/// Raw renderer output of the last success.
pub const ARTIFACT_FILE: &str = "render.bin";
/// Metadata of [`ARTIFACT_FILE`].
pub const ARTIFACT_META_FILE: &str = "render.json";

/// Persisted description of a cached render.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArtifactMeta {
    /// Unix seconds when the render was produced.
    pub generated_at: u64,
    /// Hex job fingerprint.
    pub fingerprint: String,
    /// Size of the artifact in bytes.
    pub bytes: u64,
}

impl ArtifactMeta {
    /// Meta for `raw` produced at `generated_at` by the job `fingerprint`.
    pub fn new(raw: &[u8], generated_at: SystemTime, fingerprint: JobFingerprint) -> Self {
        Self {
            generated_at: unix_secs(generated_at),
            fingerprint: fingerprint.to_string(),
            bytes: raw.len() as u64,
        }
    }

    /// `generated_at` as a [`SystemTime`].
    pub fn generated_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.generated_at)
    }
}

/// Persist `raw` and its metadata in `app_dir`. The data file is written before the metadata, so
/// a metadata file always describes a complete artifact.
pub fn save_artifact(app_dir: &Path, raw: &[u8], meta: &ArtifactMeta) -> FrameloopResult<()> {
    write_atomic(&app_dir.join(ARTIFACT_FILE), raw)?;
    write_json_atomic(&app_dir.join(ARTIFACT_META_FILE), meta)
}

/// Load the artifact of `app_dir`. `Ok(None)` when there is none or it does not match its
/// metadata.
pub fn load_artifact(app_dir: &Path) -> FrameloopResult<Option<(Vec<u8>, ArtifactMeta)>> {
    let Some(meta) = read_json_opt::<ArtifactMeta>(&app_dir.join(ARTIFACT_META_FILE))? else {
        return Ok(None);
    };
    let path = app_dir.join(ARTIFACT_FILE);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("read '{}'", path.display()))
                .into());
        }
    };
    if raw.is_empty() || raw.len() as u64 != meta.bytes {
        tracing::warn!(artifact = %path.display(), "ignoring truncated render artifact");
        return Ok(None);
    }
    Ok(Some((raw, meta)))
}

/// Delete the artifact files of `app_dir`, if any.
pub fn remove_artifact(app_dir: &Path) -> FrameloopResult<()> {
    for name in [ARTIFACT_META_FILE, ARTIFACT_FILE] {
        let path = app_dir.join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("remove '{}'", path.display()))
                    .map_err(Into::into);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/cache/artifact.rs"]
mod tests;
