use image::{imageops::FilterType, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("invalid image")]
    InvalidImage,
}

/// Decodes an uploaded image into 8-bit RGB. Alpha is dropped and grayscale
/// is expanded to three channels.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| {
            tracing::debug!("Could not guess image format: {}", e);
            ImageError::InvalidImage
        })?;

    let img = reader.decode().map_err(|e| {
        tracing::debug!("Error decoding image: {}", e);
        ImageError::InvalidImage
    })?;

    Ok(img.to_rgb8())
}

/// Scales `img` to fit a `size`x`size` square keeping its aspect ratio and
/// pads the remainder with black, centered.
pub fn letterbox(img: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width == size && height == size {
        return img.clone();
    }

    let scale = size as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);
    let resized = image::imageops::resize(img, new_width, new_height, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([0, 0, 0]));
    let x = (size - new_width) / 2;
    let y = (size - new_height) / 2;
    image::imageops::replace(&mut canvas, &resized, x as i64, y as i64);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    #[test]
    fn test_decode_image_rejects_garbage() {
        let result = decode_image(b"this is not an image");
        assert!(matches!(result, Err(ImageError::InvalidImage)));
        assert_eq!(result.unwrap_err().to_string(), "invalid image");
    }

    #[test]
    fn test_decode_image_drops_alpha() {
        let img = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_pixel(4, 3, Rgba([10, 20, 30, 128]));
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_image(&image_data).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_letterbox_pads_wide_images() {
        let img = RgbImage::from_pixel(200, 100, Rgb([255, 255, 255]));
        let boxed = letterbox(&img, 192);

        assert_eq!(boxed.dimensions(), (192, 192));
        // 96 rows of content centered vertically, 48 rows of padding above
        assert_eq!(boxed.get_pixel(96, 10).0, [0, 0, 0]);
        assert_eq!(boxed.get_pixel(96, 96).0, [255, 255, 255]);
        assert_eq!(boxed.get_pixel(96, 180).0, [0, 0, 0]);
    }

    #[test]
    fn test_letterbox_keeps_matching_size() {
        let img = RgbImage::from_pixel(192, 192, Rgb([1, 2, 3]));
        assert_eq!(letterbox(&img, 192), img);
    }
}
