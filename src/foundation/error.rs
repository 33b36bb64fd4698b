/// Convenience result type used across frameloop.
pub type FrameloopResult<T> = Result<T, FrameloopError>;

/// Top-level error taxonomy.
///
/// Install-time failures (`Download`) are fatal to the install attempt. Render-path failures
/// (`RenderTimeout`, `RenderProcess`, `Decode`, `Scaling`, `Cancelled`) are isolated to the app that
/// produced them: the cache keeps serving the last good animation.
#[derive(thiserror::Error, Debug)]
pub enum FrameloopError {
    /// Invalid caller-provided data (ids, sizes, paths).
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid or unreadable runtime configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Fetching an app from the catalog failed.
    #[error("download error: {0}")]
    Download(String),

    /// App source could not be scanned for configuration fields.
    #[error("schema parse error: {0}")]
    SchemaParse(String),

    /// The renderer process exceeded its wall-clock budget and was killed.
    #[error("render timed out after {}ms", .after.as_millis())]
    RenderTimeout {
        /// Configured budget that was exceeded.
        after: std::time::Duration,
    },

    /// The renderer process failed or produced no output.
    #[error("render process failed ({status}): {stderr}")]
    RenderProcess {
        /// Exit status description.
        status: String,
        /// Captured (trimmed) stderr.
        stderr: String,
    },

    /// Rendered bytes were not a decodable animation.
    #[error("decode error: {0}")]
    Decode(String),

    /// A decoded frame could not be mapped onto the display.
    #[error("scaling error: {0}")]
    Scaling(String),

    /// The job was cancelled (app uninstalled or runtime shutting down).
    #[error("render cancelled for app '{0}'")]
    Cancelled(String),

    /// The referenced app is not installed.
    #[error("app '{0}' is not installed")]
    NotInstalled(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FrameloopError {
    /// Build a [`FrameloopError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`FrameloopError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`FrameloopError::Download`] value.
    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    /// Build a [`FrameloopError::SchemaParse`] value.
    pub fn schema_parse(msg: impl Into<String>) -> Self {
        Self::SchemaParse(msg.into())
    }

    /// Build a [`FrameloopError::RenderProcess`] value.
    pub fn render_process(status: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::RenderProcess {
            status: status.into(),
            stderr: stderr.into(),
        }
    }

    /// Build a [`FrameloopError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`FrameloopError::Scaling`] value.
    pub fn scaling(msg: impl Into<String>) -> Self {
        Self::Scaling(msg.into())
    }

    /// Build a [`FrameloopError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// `true` for failures produced by a render job. These never take down the runtime; the cache
    /// falls back to the previous good result.
    pub fn is_render_failure(&self) -> bool {
        matches!(
            self,
            Self::RenderTimeout { .. }
                | Self::RenderProcess { .. }
                | Self::Decode(_)
                | Self::Scaling(_)
                | Self::Cancelled(_)
        )
    }
}

impl From<serde_json::Error> for FrameloopError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
