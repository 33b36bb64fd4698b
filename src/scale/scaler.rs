use std::sync::Arc;

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::decode::animation::DecodedAnimation;
use crate::foundation::core::{Canvas, NATIVE_CANVAS};
use crate::foundation::error::{FrameloopError, FrameloopResult};

/// How the magnified app canvas is mapped onto the display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    /// Resize to exactly the display size; aspect ratio may change.
    Stretch,
    /// Scale by the integer magnification only and center on the display.
    #[default]
    Center,
}

/// Resampling filter used when resizing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resample {
    /// Nearest neighbor; keeps the pixel-art look.
    #[default]
    Nearest,
    /// Bilinear (triangle) filter.
    Bilinear,
    /// Bicubic (Catmull-Rom) filter.
    Bicubic,
    /// Lanczos with window 3.
    Lanczos,
}

impl Resample {
    fn filter(self) -> FilterType {
        match self {
            Resample::Nearest => FilterType::Nearest,
            Resample::Bilinear => FilterType::Triangle,
            Resample::Bicubic => FilterType::CatmullRom,
            Resample::Lanczos => FilterType::Lanczos3,
        }
    }
}

impl std::str::FromStr for ScaleMode {
    type Err = FrameloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stretch" => Ok(Self::Stretch),
            "center" => Ok(Self::Center),
            other => Err(FrameloopError::validation(format!(
                "unknown scale mode '{other}' (expected stretch|center)"
            ))),
        }
    }
}

impl std::str::FromStr for Resample {
    type Err = FrameloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "bilinear" => Ok(Self::Bilinear),
            "bicubic" => Ok(Self::Bicubic),
            "lanczos" => Ok(Self::Lanczos),
            other => Err(FrameloopError::validation(format!(
                "unknown resample method '{other}' (expected nearest|bilinear|bicubic|lanczos)"
            ))),
        }
    }
}

/// Scaler inputs that do not depend on the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScaleOpts {
    /// Physical display size.
    pub target: Canvas,
    /// Stretch or center.
    pub mode: ScaleMode,
    /// Resampling filter.
    pub resample: Resample,
    /// Border fill for center mode (straight RGBA8).
    pub background: [u8; 4],
}

impl ScaleOpts {
    /// Center mode, nearest-neighbor, black background.
    pub fn new(target: Canvas) -> Self {
        Self {
            target,
            mode: ScaleMode::Center,
            resample: Resample::Nearest,
            background: [0, 0, 0, 255],
        }
    }
}

/// One frame ready for the display: exactly display-sized RGBA8 pixels plus its delay.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayFrame {
    /// Straight-alpha RGBA8 pixels, `target.width × target.height`.
    pub image: RgbaImage,
    /// How long to show this frame.
    pub delay_ms: u32,
}

/// Ordered display frames forming one playable animation.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayAnimation {
    /// Size shared by all frames.
    pub size: Canvas,
    /// Non-empty frame list.
    pub frames: Vec<DisplayFrame>,
}

impl DisplayAnimation {
    /// Sum of all frame delays in milliseconds.
    pub fn total_duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| u64::from(f.delay_ms)).sum()
    }
}

/// Integer magnification of the `native` canvas that fits inside `target`, never below 1.
pub fn magnification_for(target: Canvas, native: Canvas) -> u32 {
    if native.is_empty() {
        return 1;
    }
    let by_w = target.width / native.width;
    let by_h = target.height / native.height;
    by_w.min(by_h).max(1)
}

/// Magnification of the 64×32 native canvas for a display of size `target`.
pub fn magnification(target: Canvas) -> u32 {
    magnification_for(target, NATIVE_CANVAS)
}

/// Map one frame onto the display. Pure: identical inputs give byte-identical output.
///
/// `native` is the app's logical canvas. The frame itself may already be magnified by the
/// renderer; it is resized to whatever the mode requires.
pub fn scale_frame(frame: &RgbaImage, native: Canvas, opts: &ScaleOpts) -> FrameloopResult<RgbaImage> {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return Err(FrameloopError::scaling("frame has zero width or height"));
    }
    if frame.as_raw().len() != Canvas::new(w, h).rgba8_len() {
        return Err(FrameloopError::scaling(format!(
            "frame buffer holds {} bytes, expected {} for {w}x{h}",
            frame.as_raw().len(),
            Canvas::new(w, h).rgba8_len()
        )));
    }
    if opts.target.is_empty() {
        return Err(FrameloopError::scaling("target display has zero width or height"));
    }
    if native.is_empty() {
        return Err(FrameloopError::scaling("native canvas has zero width or height"));
    }

    let filter = opts.resample.filter();
    match opts.mode {
        ScaleMode::Stretch => Ok(resize_exact(frame, opts.target, filter)),
        ScaleMode::Center => {
            let m = magnification_for(opts.target, native);
            let content = native.scaled(m);
            let scaled = resize_exact(frame, content, filter);

            let mut out = RgbaImage::from_pixel(
                opts.target.width,
                opts.target.height,
                image::Rgba(opts.background),
            );
            // Content larger than the display (display smaller than native) is cropped evenly.
            let x = (i64::from(opts.target.width) - i64::from(content.width)) / 2;
            let y = (i64::from(opts.target.height) - i64::from(content.height)) / 2;
            imageops::replace(&mut out, &scaled, x, y);
            Ok(out)
        }
    }
}

fn resize_exact(frame: &RgbaImage, size: Canvas, filter: FilterType) -> RgbaImage {
    if frame.dimensions() == (size.width, size.height) {
        return frame.clone();
    }
    imageops::resize(frame, size.width, size.height, filter)
}

/// Scale every decoded frame, keeping delays.
pub fn scale_animation(
    decoded: &DecodedAnimation,
    native: Canvas,
    opts: &ScaleOpts,
) -> FrameloopResult<Arc<DisplayAnimation>> {
    if decoded.frames.is_empty() {
        return Err(FrameloopError::scaling("animation has no frames"));
    }
    let mut frames = Vec::with_capacity(decoded.frames.len());
    for f in &decoded.frames {
        frames.push(DisplayFrame {
            image: scale_frame(&f.image, native, opts)?,
            delay_ms: f.delay_ms,
        });
    }
    Ok(Arc::new(DisplayAnimation {
        size: opts.target,
        frames,
    }))
}

#[cfg(test)]
#[path = "../../tests/unit/scale/scaler.rs"]
mod tests;
