//! Inbound image validation (size cap + format sniffing).

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
}

/// Sniff the image format from magic bytes.
pub fn sniff_format(data: &[u8]) -> Option<ImageFormat> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageFormat::Jpeg);
    }
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(ImageFormat::Png);
    }
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some(ImageFormat::Webp);
    }
    if data.starts_with(b"GIF8") {
        return Some(ImageFormat::Gif);
    }
    if data.starts_with(b"BM") {
        return Some(ImageFormat::Bmp);
    }
    None
}

/// Validate raw photo bytes before handing them to the vision model.
pub fn validate_image(data: &[u8], max_bytes: usize) -> Result<ImageFormat> {
    if data.len() > max_bytes {
        return Err(Error::Validation(format!(
            "image too large: {} bytes (max {max_bytes})",
            data.len()
        )));
    }

    sniff_format(data).ok_or_else(|| Error::Validation("unsupported image format".to_string()))
}
