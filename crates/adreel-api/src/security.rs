//! Input validation and sanitization.

/// Maximum prompt length.
pub const MAX_PROMPT_LENGTH: usize = 2000;

/// Maximum chat message length.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Maximum product description length.
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;

/// Sanitize a user-provided string for safe logging and storage.
///
/// Control characters other than newline and tab are dropped and the result
/// is trimmed and truncated to `max_chars`.
pub fn sanitize_string(input: &str, max_chars: usize) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(max_chars)
        .collect()
}

fn is_safe_id(id: &str, min: usize, max: usize) -> bool {
    if id.len() < min || id.len() > max {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validate job ID format.
///
/// Job IDs are operation ids: alphanumeric, hyphens and underscores, 8-128 chars.
pub fn is_valid_job_id(id: &str) -> bool {
    is_safe_id(id, 8, 128)
}

pub fn is_valid_session_id(id: &str) -> bool {
    is_safe_id(id, 8, 64)
}

/// Detect the image type from magic bytes, ignoring the declared content type.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}
