//! Image decoding into [`PixelBuffer`]s.
//!
//! Accepts raw encoded bytes (PNG, JPEG, BMP, WebP, GIF) or a base64
//! `data:` URL, the form in which the document store usually keeps
//! embedded images. Everything comes out as 8-bit RGBA.
//!
//! This is the first step of both the preview and the trace paths:
//! encoded bytes in, `PixelBuffer` out.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, PixelBuffer};

/// Where a source image's encoded bytes come from.
///
/// Cloning is cheap: byte payloads are reference counted so a snapshot
/// of the selected document can be handed to a deferred job without
/// copying the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSource {
    /// Encoded image bytes.
    Bytes(Arc<[u8]>),
    /// A `data:<mime>;base64,<payload>` URL.
    DataUrl(String),
}

impl ImageSource {
    /// Decode the source into a pixel buffer.
    ///
    /// # Errors
    ///
    /// See [`decode`] and [`decode_data_url`].
    pub fn load(&self) -> Result<PixelBuffer, PipelineError> {
        match self {
            Self::Bytes(bytes) => decode(bytes),
            Self::DataUrl(url) => decode_data_url(url),
        }
    }

    /// Size of the encoded payload in bytes (base64 text for data URLs).
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::DataUrl(url) => url.len(),
        }
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

/// Decode raw image bytes into an RGBA buffer.
///
/// Supports whatever the enabled `image` codecs can decode.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(PixelBuffer::new(img.to_rgba8()))
}

/// Extract the binary payload of a base64 `data:` URL.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedSource`] if `url` does not use
/// the `data:` scheme, and [`PipelineError::InvalidDataUrl`] if it has
/// no payload separator, is not base64-encoded, or fails to decode.
pub fn data_url_payload(url: &str) -> Result<Vec<u8>, PipelineError> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Err(PipelineError::UnsupportedSource(truncate_for_message(url)));
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(PipelineError::InvalidDataUrl(
            "missing ',' between header and payload".into(),
        ));
    };
    if !header.split(';').any(|param| param == "base64") {
        return Err(PipelineError::InvalidDataUrl(
            "only base64 payloads are supported".into(),
        ));
    }
    // Line breaks are legal inside long embedded payloads.
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| PipelineError::InvalidDataUrl(e.to_string()))
}

/// Decode a base64 `data:` URL into an RGBA buffer.
///
/// # Errors
///
/// Any error from [`data_url_payload`] or [`decode`].
pub fn decode_data_url(url: &str) -> Result<PixelBuffer, PipelineError> {
    let bytes = data_url_payload(url)?;
    decode(&bytes)
}

/// Encode bytes as a `data:` URL with the given media type.
#[must_use]
pub fn to_data_url(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{media_type};base64,{}", STANDARD.encode(bytes))
}

fn truncate_for_message(url: &str) -> String {
    const MAX: usize = 64;
    match url.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &url[..idx]),
        None => url.to_owned(),
    }
}
