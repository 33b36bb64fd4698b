/// Fingerprints identifying a render job's inputs.
pub mod fingerprint;
pub(crate) mod process;
/// Invoking the external renderer.
pub mod renderer;
/// Sharing one in-flight call between concurrent callers.
pub mod single_flight;
