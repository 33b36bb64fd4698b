use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::foundation::error::{FrameloopError, FrameloopResult};

/// Maximum accepted length of an [`AppId`] in bytes.
pub const MAX_APP_ID_LEN: usize = 64;

/// Stable, filesystem-safe identifier of an installed app.
///
/// Ids name directories under the apps root, so only `[A-Za-z0-9_-]` is accepted and the first
/// character must be alphanumeric.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    /// Validate and wrap `raw`.
    pub fn new(raw: impl Into<String>) -> FrameloopResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(FrameloopError::validation("app id must be non-empty"));
        }
        if raw.len() > MAX_APP_ID_LEN {
            return Err(FrameloopError::validation(format!(
                "app id '{raw}' is longer than {MAX_APP_ID_LEN} bytes"
            )));
        }
        let mut chars = raw.chars();
        let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
        if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(FrameloopError::validation(format!(
                "app id '{raw}' must match [A-Za-z0-9][A-Za-z0-9_-]*"
            )));
        }
        Ok(Self(raw))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for AppId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        AppId::new(raw).map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for AppId {
    type Err = FrameloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppId::new(s)
    }
}

/// Pixel dimensions of a raster surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Create a canvas of `width × height`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `true` when either side is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Multiply both sides by `factor`, saturating.
    pub fn scaled(self, factor: u32) -> Self {
        Self {
            width: self.width.saturating_mul(factor),
            height: self.height.saturating_mul(factor),
        }
    }

    /// RGBA8 byte length of a buffer with these dimensions.
    pub fn rgba8_len(self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Logical canvas every app renders into before magnification.
pub const NATIVE_CANVAS: Canvas = Canvas::new(64, 32);

/// User-chosen configuration values for one app, keyed by schema field key.
///
/// Values are passed verbatim to the renderer as `key=value` arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AppConfig(pub BTreeMap<String, String>);

impl AppConfig {
    /// Empty config (renderer falls back to app defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a copy of `self` with every key of `overrides` replaced.
    pub fn overlaid(&self, overrides: &AppConfig) -> AppConfig {
        let mut out = self.clone();
        for (k, v) in overrides.iter() {
            out.set(k, v);
        }
        out
    }
}

/// Seconds since the unix epoch, saturating at zero for clocks set before 1970.
pub fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current wall clock as unix seconds.
pub fn unix_now() -> u64 {
    unix_secs(SystemTime::now())
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
