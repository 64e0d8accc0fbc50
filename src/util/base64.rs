//! Base64 encoding and decoding utilities

use crate::error::{AppError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode base64 string to binary data
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    // Handle data URL format (e.g., "data:image/png;base64,...")
    let data = if encoded.contains(',') {
        encoded.split(',').last().unwrap_or(encoded)
    } else {
        encoded
    };

    STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::InvalidRequest(format!("Invalid base64 data: {}", e)))
}

/// Check if a string is a data URL
pub fn is_data_url(value: &str) -> bool {
    value.starts_with("data:")
}

/// Get the media format from a base64 data URL prefix
pub fn format_from_data_url(data_url: &str) -> Option<&str> {
    let rest = data_url
        .strip_prefix("data:image/")
        .or_else(|| data_url.strip_prefix("data:video/"))?;
    let end = rest.find(';')?;
    Some(&rest[..end])
}
