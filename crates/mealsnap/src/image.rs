//! Image normalizer: validate raw bytes and canonicalize them for analysis
//! and storage. Pure functions; every ingress path (upload, base64, Telegram)
//! goes through [`normalize`] before the image reaches the model.

use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Formats accepted for analysis, with their MIME types.
const SUPPORTED: &[(ImageFormat, &str, &str)] = &[
    (ImageFormat::Jpeg, "JPEG", "image/jpeg"),
    (ImageFormat::Png, "PNG", "image/png"),
    (ImageFormat::WebP, "WEBP", "image/webp"),
    (ImageFormat::Gif, "GIF", "image/gif"),
];

/// Validation failures for inbound images. Messages are user-facing.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image too large: {size_mb:.2}MB (max {max_mb}MB)")]
    TooLarge { size_mb: f64, max_mb: f64 },

    #[error("invalid image file")]
    Invalid,

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid base64 image data")]
    InvalidBase64,
}

/// A validated, canonicalized image ready for analysis and upload.
/// Produced once per raw payload; the struct itself is never persisted.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    /// MIME type paired with `format` (e.g. "image/jpeg").
    pub content_type: &'static str,
    /// Canonical format label (e.g. "JPEG"). A detected "JPG" is already
    /// normalized to "JPEG".
    pub format: &'static str,
    /// `data:<mime>;base64,...` for contexts needing inline embedding.
    pub data_uri: String,
}

/// Normalize a detected format label: "JPG" and "JPEG" are the same format.
pub fn canonical_label(label: &str) -> String {
    let upper = label.to_ascii_uppercase();
    if upper == "JPG" {
        "JPEG".to_string()
    } else {
        upper
    }
}

/// Decode a base64 image string, stripping any data URL prefix.
pub fn decode_base64_image(encoded: &str) -> Result<Vec<u8>, ImageError> {
    let payload = match encoded.split_once(',') {
        Some((_, rest)) => rest,
        None => encoded,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| ImageError::InvalidBase64)
}

/// Validate and normalize raw image bytes.
///
/// - Rejects payloads over `max_size_bytes` before any decoding.
/// - Rejects bytes that are not a decodable raster image.
/// - Rejects formats outside the allow-list (JPEG, PNG, WEBP, GIF).
/// - Flattens an alpha channel onto an opaque white background; the output is
///   re-encoded in the original format only in that case, otherwise the input
///   bytes pass through unchanged.
pub fn normalize(raw: &[u8], max_size_bytes: usize) -> Result<PreparedImage, ImageError> {
    if raw.len() > max_size_bytes {
        return Err(ImageError::TooLarge {
            size_mb: raw.len() as f64 / (1024.0 * 1024.0),
            max_mb: max_size_bytes as f64 / (1024.0 * 1024.0),
        });
    }

    let format = image::guess_format(raw).map_err(|_| ImageError::Invalid)?;
    let (label, content_type) = match SUPPORTED.iter().find(|entry| entry.0 == format) {
        Some(&(_, label, mime)) => (label, mime),
        None => {
            let name = format.extensions_str().first().copied().unwrap_or("unknown");
            return Err(ImageError::UnsupportedFormat(canonical_label(name)));
        }
    };

    let decoded =
        image::load_from_memory_with_format(raw, format).map_err(|_| ImageError::Invalid)?;

    let bytes = if decoded.color().has_alpha() {
        let flat = flatten_onto_white(&decoded);
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(flat)
            .write_to(&mut buf, format)
            .map_err(|_| ImageError::Invalid)?;
        buf.into_inner()
    } else {
        raw.to_vec()
    };

    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    let data_uri = format!("data:{};base64,{}", content_type, encoded);

    Ok(PreparedImage {
        bytes,
        content_type,
        format: label,
        data_uri,
    })
}

/// Composite an image with alpha onto an opaque white background.
/// The downstream storage format does not support transparency, so alpha is
/// discarded rather than carried through.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + 255 * (255 - alpha)) / 255) as u8 };
        out.put_pixel(
            x,
            y,
            image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]),
        );
    }
    out
}
