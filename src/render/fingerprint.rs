use std::fmt;

use xxhash_rust::xxh3::Xxh3;

use crate::foundation::core::AppConfig;
use crate::scale::scaler::{Resample, ScaleMode, ScaleOpts};

const XXH3_SEED: u64 = 0x3c6e_f372_fe94_f82b;

/// Stable identity of a render job: source, effective config, magnification and display options.
///
/// Two jobs with equal fingerprints produce identical display frames, so a persisted artifact
/// with a matching fingerprint can be served without re-rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobFingerprint {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl JobFingerprint {
    /// Parse the 32-digit hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 {
            return None;
        }
        let v = u128::from_str_radix(s, 16).ok()?;
        Some(Self {
            hi: (v >> 64) as u64,
            lo: v as u64,
        })
    }
}

impl fmt::Display for JobFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

pub(crate) fn fingerprint_job(
    source: &[u8],
    config: &AppConfig,
    magnify: u32,
    scale: &ScaleOpts,
) -> JobFingerprint {
    let mut h = StableHasher::new();
    h.write_len_prefixed(source);

    h.write_u64(config.len() as u64);
    for (k, v) in config.iter() {
        h.write_len_prefixed(k.as_bytes());
        h.write_len_prefixed(v.as_bytes());
    }

    h.write_u32(magnify);
    h.write_u32(scale.target.width);
    h.write_u32(scale.target.height);
    h.write_u8(match scale.mode {
        ScaleMode::Stretch => 0,
        ScaleMode::Center => 1,
    });
    h.write_u8(match scale.resample {
        Resample::Nearest => 0,
        Resample::Bilinear => 1,
        Resample::Bicubic => 2,
        Resample::Lanczos => 3,
    });
    h.write_bytes(&scale.background);
    h.finish()
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_len_prefixed(&mut self, b: &[u8]) {
        self.write_u64(b.len() as u64);
        self.write_bytes(b);
    }

    fn finish(self) -> JobFingerprint {
        let v = self.inner.digest128();
        JobFingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/fingerprint.rs"]
mod tests;
