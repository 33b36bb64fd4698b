/// `render.bin`/`render.json` persistence of the last good render.
pub mod artifact;
/// In-memory frame cache with ttl and per-app health.
pub mod store;
