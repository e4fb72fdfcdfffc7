//! Cheap structural check for presented API keys.

/// Length of every issued API key, in characters.
pub const API_KEY_LENGTH: usize = 32;

/// Check that `api_key` could have been issued by this crate.
///
/// Exactly 32 characters from the URL-safe base64 alphabet. Depends on no
/// stored secret, so callers may reject early on `false`.
pub fn is_valid_api_key_format(api_key: &str) -> bool {
    api_key.len() == API_KEY_LENGTH && api_key.bytes().all(is_url_safe_byte)
}

fn is_url_safe_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}
