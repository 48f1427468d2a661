//! Image decoding and data-URL conversion
//!
//! Layer pixels are held decoded; data URLs are the stable textual form used
//! for version history, chat images and generation requests.

use crate::error::{EditorError, Result};
use crate::layer::ImageSource;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};
use std::borrow::Cow;
use std::io::Cursor;

/// Longest side of images embedded in data URLs
pub const MAX_DATA_URL_DIMENSION: u32 = 4096;

/// Decode uploaded or returned bytes into a layer source
pub fn decode_image(bytes: &[u8]) -> Result<ImageSource> {
    let decoded = image::load_from_memory(bytes).map_err(EditorError::ImageDecode)?;
    Ok(ImageSource::new(decoded.to_rgba8()))
}

/// Encode pixels as PNG bytes
pub fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    pixels
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(EditorError::Encode)?;
    Ok(bytes)
}

/// Encode a layer source as a PNG data URL
///
/// Images whose longest side exceeds `max_dim` are downscaled proportionally
/// first, which bounds the size of request payloads and stored versions.
pub fn encode_data_url(source: &ImageSource, max_dim: u32) -> Result<String> {
    let pixels = source.pixels();
    let (w, h) = pixels.dimensions();
    let pixels: Cow<'_, RgbaImage> = if w > max_dim || h > max_dim {
        let scale = max_dim as f64 / w.max(h) as f64;
        let nw = ((w as f64 * scale).round() as u32).max(1);
        let nh = ((h as f64 * scale).round() as u32).max(1);
        log::debug!("Downscaling {}x{} to {}x{} for data URL", w, h, nw, nh);
        Cow::Owned(image::imageops::resize(pixels, nw, nh, FilterType::Triangle))
    } else {
        Cow::Borrowed(pixels)
    };
    let png = encode_png(&pixels)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

/// Wrap encoded image bytes as a data URL, sniffing the MIME type
pub fn bytes_to_data_url(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Split `data:<mime>;base64,<payload>` into its MIME type and payload
pub fn split_data_url(url: &str) -> Result<(&str, &str)> {
    let rest = url.strip_prefix("data:").ok_or(EditorError::InvalidDataUrl)?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or(EditorError::InvalidDataUrl)?;
    if mime.is_empty() || payload.is_empty() {
        return Err(EditorError::InvalidDataUrl);
    }
    Ok((mime, payload))
}

/// Decode a base64 image data URL into a layer source
pub fn decode_data_url(url: &str) -> Result<ImageSource> {
    let (_, payload) = split_data_url(url)?;
    let bytes = STANDARD.decode(payload)?;
    decode_image(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 128])
            }
        })
    }

    #[test]
    fn test_data_url_roundtrip_preserves_pixels() {
        let source = ImageSource::new(checker(7, 5));
        let url = encode_data_url(&source, MAX_DATA_URL_DIMENSION).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        let decoded = decode_data_url(&url).unwrap();
        assert_eq!(decoded.pixels(), source.pixels());
        assert_ne!(decoded.id(), source.id());
    }

    #[test]
    fn test_large_images_are_downscaled() {
        let source = ImageSource::new(RgbaImage::new(400, 100));
        let url = encode_data_url(&source, 100).unwrap();
        let decoded = decode_data_url(&url).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 25));
    }

    #[test]
    fn test_malformed_data_urls() {
        assert!(matches!(split_data_url("hello"), Err(EditorError::InvalidDataUrl)));
        assert!(matches!(
            split_data_url("data:image/png,abc"),
            Err(EditorError::InvalidDataUrl)
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,@@@"),
            Err(EditorError::Base64(_))
        ));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(EditorError::ImageDecode(_))
        ));
    }

    #[test]
    fn test_bytes_to_data_url_sniffs_png() {
        let png = encode_png(&checker(2, 2)).unwrap();
        let url = bytes_to_data_url(&png);
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(split_data_url(&url).unwrap().0, "image/png");
    }
}
