use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat, RgbaImage};

use crate::foundation::core::Canvas;
use crate::foundation::error::{FrameloopError, FrameloopResult};

/// Delay given to still images and to frames that declare a zero delay.
pub const DEFAULT_FRAME_DELAY_MS: u32 = 50;

/// One decoded frame: full-canvas straight-alpha RGBA8 plus its display delay.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFrame {
    /// Frame pixels, already composited over previous frames by the codec.
    pub image: RgbaImage,
    /// Display delay in milliseconds (never zero).
    pub delay_ms: u32,
}

/// Decoded renderer output. Non-empty; every frame has `size` dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAnimation {
    /// Dimensions shared by all frames.
    pub size: Canvas,
    /// Frames in playback order.
    pub frames: Vec<DecodedFrame>,
}

impl DecodedAnimation {
    /// `true` when the animation has a single frame.
    pub fn is_static(&self) -> bool {
        self.frames.len() == 1
    }
}

/// Decode animated WebP, GIF or any still image format into ordered frames.
///
/// The container is sniffed from magic bytes, not trusted from a file extension.
pub fn decode_animation(bytes: &[u8]) -> FrameloopResult<DecodedAnimation> {
    if bytes.is_empty() {
        return Err(FrameloopError::decode("render output is empty"));
    }
    let format = image::guess_format(bytes)
        .map_err(|e| FrameloopError::decode(format!("unrecognized image container: {e}")))?;

    let frames = match format {
        ImageFormat::Gif => {
            let decoder = GifDecoder::new(Cursor::new(bytes))
                .map_err(|e| FrameloopError::decode(format!("gif header: {e}")))?;
            collect_animation(decoder)?
        }
        ImageFormat::WebP => {
            let decoder = WebPDecoder::new(Cursor::new(bytes))
                .map_err(|e| FrameloopError::decode(format!("webp header: {e}")))?;
            if decoder.has_animation() {
                collect_animation(decoder)?
            } else {
                let img = DynamicImage::from_decoder(decoder)
                    .map_err(|e| FrameloopError::decode(format!("webp still: {e}")))?;
                vec![still_frame(img)]
            }
        }
        _ => {
            let img = image::load_from_memory_with_format(bytes, format)
                .map_err(|e| FrameloopError::decode(format!("{format:?} still: {e}")))?;
            vec![still_frame(img)]
        }
    };

    validate_frames(frames)
}

fn collect_animation<'a>(decoder: impl AnimationDecoder<'a>) -> FrameloopResult<Vec<DecodedFrame>> {
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| FrameloopError::decode(format!("animation frames: {e}")))?;

    Ok(frames
        .into_iter()
        .map(|frame| {
            let (num, den) = frame.delay().numer_denom_ms();
            DecodedFrame {
                delay_ms: delay_ms_from_ratio(num, den),
                image: frame.into_buffer(),
            }
        })
        .collect())
}

fn still_frame(img: DynamicImage) -> DecodedFrame {
    DecodedFrame {
        image: img.to_rgba8(),
        delay_ms: DEFAULT_FRAME_DELAY_MS,
    }
}

/// Convert a `num/den` millisecond ratio, rounding to nearest and mapping zero to the default.
pub(crate) fn delay_ms_from_ratio(num: u32, den: u32) -> u32 {
    if den == 0 {
        return DEFAULT_FRAME_DELAY_MS;
    }
    let ms = (u64::from(num) + u64::from(den) / 2) / u64::from(den);
    match u32::try_from(ms) {
        Ok(0) => DEFAULT_FRAME_DELAY_MS,
        Ok(v) => v,
        Err(_) => u32::MAX,
    }
}

fn validate_frames(frames: Vec<DecodedFrame>) -> FrameloopResult<DecodedAnimation> {
    let Some(first) = frames.first() else {
        return Err(FrameloopError::decode("animation contains no frames"));
    };
    let (w, h) = first.image.dimensions();
    if w == 0 || h == 0 {
        return Err(FrameloopError::decode("animation has zero-sized frames"));
    }
    if let Some((idx, bad)) = frames
        .iter()
        .enumerate()
        .find(|(_, f)| f.image.dimensions() != (w, h))
    {
        let (bw, bh) = bad.image.dimensions();
        return Err(FrameloopError::decode(format!(
            "frame {idx} is {bw}x{bh}, expected {w}x{h}"
        )));
    }
    Ok(DecodedAnimation {
        size: Canvas::new(w, h),
        frames,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/decode/animation.rs"]
mod tests;
