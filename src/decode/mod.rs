/// Animated-image decoding of renderer output.
pub mod animation;
