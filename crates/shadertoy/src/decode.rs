use image::{DynamicImage, ImageFormat};
use rendergraph::PixelData;

use crate::error::LoadError;

/// Pick the decoder from the media path's extension. Only PNG and JPEG are
/// accepted.
pub fn media_format(src: &str) -> Result<ImageFormat, LoadError> {
    let name = src.split(['?', '#']).next().unwrap_or(src);
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        _ => Err(LoadError::UnsupportedMedia {
            src: src.to_string(),
        }),
    }
}

/// Decode `bytes` into 3- or 4-channel pixels.
///
/// Decoded rows run top to bottom; `PixelData` stores the bottom row first,
/// so `vflip` reverses the rows and an unflipped image shows upside down.
pub fn decode_image(bytes: &[u8], src: &str, vflip: bool) -> Result<PixelData, LoadError> {
    let format = media_format(src)?;
    let image = image::load_from_memory_with_format(bytes, format).map_err(|source| {
        LoadError::Decode {
            src: src.to_string(),
            source,
        }
    })?;
    let image = if vflip { image.flipv() } else { image };
    let (width, height, channels, bytes) = into_raw(image);
    tracing::debug!(src, width, height, channels, vflip, "decoded image");
    Ok(PixelData::new(width, height, channels, bytes)?)
}

fn into_raw(image: DynamicImage) -> (u32, u32, u8, Vec<u8>) {
    if image.color().has_alpha() {
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        (width, height, 4, rgba.into_raw())
    } else {
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        (width, height, 3, rgb.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;

    fn encode(image: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn two_rows() -> Vec<u8> {
        // top row red, bottom row blue
        let mut image = RgbImage::new(2, 2);
        for x in 0..2 {
            image.put_pixel(x, 0, Rgb([255, 0, 0]));
            image.put_pixel(x, 1, Rgb([0, 0, 255]));
        }
        encode(DynamicImage::ImageRgb8(image))
    }

    #[test]
    fn flipped_images_store_the_bottom_row_first() {
        let pixels = decode_image(&two_rows(), "/media/a/rows.png", true).unwrap();
        assert_eq!(pixels.channels, 3);
        assert_eq!(&pixels.bytes[..3], &[0, 0, 255]);
        assert_eq!(&pixels.bytes[6..9], &[255, 0, 0]);
    }

    #[test]
    fn unflipped_images_keep_decoder_order() {
        let pixels = decode_image(&two_rows(), "rows.png", false).unwrap();
        assert_eq!(&pixels.bytes[..3], &[255, 0, 0]);
    }

    #[test]
    fn alpha_is_kept_as_a_fourth_channel() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 4]));
        let pixels = decode_image(&encode(DynamicImage::ImageRgba8(image)), "a.PNG", true).unwrap();
        assert_eq!(pixels.channels, 4);
        assert_eq!(pixels.bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn extension_selects_the_decoder() {
        assert_eq!(media_format("x.jpeg").unwrap(), ImageFormat::Jpeg);
        assert_eq!(media_format("/media/a/x.JPG?v=2").unwrap(), ImageFormat::Jpeg);
        assert!(matches!(
            media_format("clip.webm"),
            Err(LoadError::UnsupportedMedia { .. })
        ));
        assert!(media_format("noextension").is_err());
    }
}
