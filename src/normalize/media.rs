use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use super::types::ImageFormat;

/// Media decoding failures; the caller attaches the field path.
#[derive(Debug, Error, PartialEq)]
pub enum MediaError {
    #[error("image url must be a data URI of the form data:image/<jpeg|png|gif|webp>;base64,<data>")]
    NotDataUri,

    #[error("unsupported image format '{0}', expected jpeg, png, gif or webp")]
    UnsupportedFormat(String),

    #[error("invalid base64 data: {0}")]
    InvalidBase64(String),

    #[error("decoded data is empty")]
    Empty,
}

/// Parse `data:image/<format>;base64,<payload>` into its format and bytes.
pub fn parse_image_data_uri(uri: &str) -> Result<(ImageFormat, Vec<u8>), MediaError> {
    let rest = uri.strip_prefix("data:image/").ok_or(MediaError::NotDataUri)?;
    let (format, payload) = rest.split_once(";base64,").ok_or(MediaError::NotDataUri)?;
    let format =
        ImageFormat::parse(format).ok_or_else(|| MediaError::UnsupportedFormat(format.into()))?;
    Ok((format, decode_base64(payload)?))
}

/// Decode standard base64, tolerating surrounding whitespace.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, MediaError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| MediaError::InvalidBase64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }
    Ok(bytes)
}

/// Standard base64 for vendor payloads.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}
