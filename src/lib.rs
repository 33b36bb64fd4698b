//! Frameloop runs community display apps on a small LED panel.
//!
//! Apps are scripts fetched from a catalog. They never run in-process: an external renderer turns
//! each app into an animated image, which is decoded, scaled to the panel and cached. A rotation
//! scheduler decides which app is on screen and when each one is re-rendered.
//!
//! - Install apps with [`AppRuntime::install`]
//! - Inspect and set their options via [`AppRuntime::get_schema`] and [`AppRuntime::set_config`]
//! - Drive the display with [`AppRuntime::tick`]
#![deny(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Frame-cache storage and render artifacts.
pub mod cache;
/// Runtime configuration file.
pub mod config;
/// Decoding of renderer output.
pub mod decode;
/// Logging setup.
pub mod logging;
/// Rendering apps out of process.
pub mod render;
/// App catalog, installs and the local registry.
pub mod repo;
/// The runtime facade tying everything together.
pub mod runtime;
/// Scaling frames to the display.
pub mod scale;
/// Rotation and the render worker pool.
pub mod schedule;
/// Configuration schemas extracted from app sources.
pub mod schema;

pub use crate::foundation::core::{AppConfig, AppId, Canvas, NATIVE_CANVAS, unix_now, unix_secs};
pub use crate::foundation::error::{FrameloopError, FrameloopResult};

pub use crate::cache::store::{AppHealth, CachedFrames, RenderCache, RenderResult, RenderSuccess};
pub use crate::config::RuntimeConfig;
pub use crate::decode::animation::{DecodedAnimation, DecodedFrame, decode_animation};
pub use crate::logging::init_logging;
pub use crate::render::fingerprint::JobFingerprint;
pub use crate::render::process::CancelToken;
pub use crate::render::renderer::{RenderOutput, RenderRequest, Renderer};
pub use crate::repo::catalog::{Catalog, CatalogApp, DirCatalog, HttpCatalog};
pub use crate::repo::registry::AppRecord;
pub use crate::runtime::app_runtime::{AppRuntime, NowShowing};
pub use crate::runtime::config_store::{ConfigStore, FsConfigStore};
pub use crate::scale::scaler::{DisplayAnimation, DisplayFrame, Resample, ScaleMode, ScaleOpts};
pub use crate::schema::extract::{extract_schema, try_extract_schema};
pub use crate::schema::model::{FieldDescriptor, FieldKind, Schema, SelectOption};
