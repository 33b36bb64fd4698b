/// Fixed worker pool for background renders.
pub mod pool;
/// Which app is on screen and when each one renders next.
pub mod rotation;
