/// Display-geometry scaling and compositing.
pub mod scaler;
