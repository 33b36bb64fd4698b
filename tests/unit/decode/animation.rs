use std::io::Cursor;

use image::codecs::gif::GifEncoder;
use image::{Delay, Frame};

use super::*;

fn gif_bytes(size: (u32, u32), delays_ms: &[u32]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut enc = GifEncoder::new(&mut buf);
        let frames = delays_ms.iter().enumerate().map(|(i, &ms)| {
            let shade = (i as u8).wrapping_mul(60);
            let img = RgbaImage::from_pixel(size.0, size.1, image::Rgba([shade, 0, 255 - shade, 255]));
            Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(ms, 1))
        });
        enc.encode_frames(frames).unwrap();
    }
    buf
}

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn static_png_yields_one_frame_with_default_delay() {
    let anim = decode_animation(&png_bytes(64, 32)).unwrap();
    assert!(anim.is_static());
    assert_eq!(anim.size, Canvas::new(64, 32));
    assert_eq!(anim.frames[0].delay_ms, DEFAULT_FRAME_DELAY_MS);
    assert_eq!(anim.frames[0].image.get_pixel(0, 0).0, [10, 20, 30, 255]);
}

#[test]
fn animated_gif_yields_every_frame_and_delay() {
    let delays = [100, 250, 40];
    let anim = decode_animation(&gif_bytes((64, 32), &delays)).unwrap();
    assert_eq!(anim.frames.len(), 3);
    assert_eq!(
        anim.frames.iter().map(|f| f.delay_ms).collect::<Vec<_>>(),
        delays.to_vec()
    );
    assert!(anim.frames.iter().all(|f| f.image.dimensions() == (64, 32)));
}

#[test]
fn single_frame_gif_keeps_its_declared_delay() {
    let anim = decode_animation(&gif_bytes((64, 32), &[500])).unwrap();
    assert!(anim.is_static());
    assert_eq!(anim.frames[0].delay_ms, 500);
}

#[test]
fn zero_delay_frames_get_default() {
    let anim = decode_animation(&gif_bytes((8, 4), &[0, 0])).unwrap();
    assert!(anim.frames.iter().all(|f| f.delay_ms == DEFAULT_FRAME_DELAY_MS));
}

#[test]
fn empty_and_garbage_inputs_are_decode_errors() {
    assert!(matches!(
        decode_animation(&[]).unwrap_err(),
        FrameloopError::Decode(_)
    ));
    assert!(matches!(
        decode_animation(b"definitely not an image").unwrap_err(),
        FrameloopError::Decode(_)
    ));

    let mut truncated = gif_bytes((64, 32), &[100, 100]);
    truncated.truncate(20);
    assert!(matches!(
        decode_animation(&truncated).unwrap_err(),
        FrameloopError::Decode(_)
    ));
}

#[test]
fn delay_ratio_rounds_and_guards_zero() {
    assert_eq!(delay_ms_from_ratio(100, 1), 100);
    assert_eq!(delay_ms_from_ratio(1001, 10), 100);
    assert_eq!(delay_ms_from_ratio(5, 0), DEFAULT_FRAME_DELAY_MS);
    assert_eq!(delay_ms_from_ratio(0, 1), DEFAULT_FRAME_DELAY_MS);
}
