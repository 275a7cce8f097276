use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageReader, Rgb, RgbImage};
use ndarray::{Array, Array4};
use std::io::Cursor;
use thiserror::Error;

pub const INPUT_SIZE: usize = 224;
pub const INPUT_CHANNELS: usize = 3;
pub const INPUT_LEN: usize = INPUT_SIZE * INPUT_SIZE * INPUT_CHANNELS;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("cannot reshape {got} values into 224x224x3 (expected 150528)")]
    WrongLength { got: usize },
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid image: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid image: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid request body: {0}")]
    Body(String),
}

/// Reshapes a flat HWC array into a `(1, 224, 224, 3)` batch. Values are
/// passed through unscaled.
pub fn flat_to_tensor(values: Vec<f32>) -> Result<Array4<f32>, InputError> {
    let got = values.len();
    if got != INPUT_LEN {
        return Err(InputError::WrongLength { got });
    }

    Array::from_shape_vec((1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS), values)
        .map_err(|_| InputError::WrongLength { got })
}

/// Decodes a base64 image, resizes it to 224x224 (bilinear) and scales it
/// to `[0, 1]` in RGB order. ASCII whitespace anywhere in the payload is
/// skipped, so MIME line-wrapped base64 is accepted.
pub fn base64_to_tensor(encoded: &str) -> Result<Array4<f32>, InputError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact)?;

    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?
        .to_rgb8();

    let resized = resize_linear(&img, INPUT_SIZE as u32, INPUT_SIZE as u32);

    Ok(image_to_tensor(&resized))
}

/// Bilinear resize over the 2x2 nearest source pixels with half-pixel
/// centers. Unlike `imageops::resize`, the kernel does not widen when
/// downscaling, so large crops are point-sampled rather than area-averaged.
fn resize_linear(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = img.dimensions();
    if (src_w, src_h) == (width, height) {
        return img.clone();
    }

    let xs: Vec<(u32, u32, f32)> = (0..width)
        .map(|x| source_taps(x, src_w as f32 / width as f32, src_w))
        .collect();
    let ys: Vec<(u32, u32, f32)> = (0..height)
        .map(|y| source_taps(y, src_h as f32 / height as f32, src_h))
        .collect();

    RgbImage::from_fn(width, height, |x, y| {
        let (x0, x1, fx) = xs[x as usize];
        let (y0, y1, fy) = ys[y as usize];
        let p00 = img.get_pixel(x0, y0).0;
        let p10 = img.get_pixel(x1, y0).0;
        let p01 = img.get_pixel(x0, y1).0;
        let p11 = img.get_pixel(x1, y1).0;

        let mut out = [0u8; 3];
        for c in 0..3 {
            let top = p00[c] as f32 * (1. - fx) + p10[c] as f32 * fx;
            let bottom = p01[c] as f32 * (1. - fx) + p11[c] as f32 * fx;
            out[c] = (top * (1. - fy) + bottom * fy).round().clamp(0., 255.) as u8;
        }
        Rgb(out)
    })
}

/// Left/right source indices and the weight of the right one.
fn source_taps(dst: u32, scale: f32, src_len: u32) -> (u32, u32, f32) {
    let last = src_len.saturating_sub(1);
    let pos = ((dst as f32 + 0.5) * scale - 0.5).max(0.);
    let lo = pos.floor() as u32;
    if lo >= last {
        return (last, last, 0.);
    }
    (lo, lo + 1, pos - lo as f32)
}

fn image_to_tensor(img: &RgbImage) -> Array4<f32> {
    let mut input = Array::zeros((1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, y, x, 0]] = (r as f32) / 255.;
        input[[0, y, x, 1]] = (g as f32) / 255.;
        input[[0, y, x, 2]] = (b as f32) / 255.;
    }
    input
}
