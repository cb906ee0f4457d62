//! Utility functions for filename derivation and sanitization

use std::path::Path;

/// Characters replaced when sanitizing a filename
const INVALID_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Sanitize a suggested filename for use inside the scratch directory
///
/// Strips any path components (only the final component survives), replaces
/// characters that are invalid on common filesystems with `_`, and falls
/// back to `"staged.bin"` when nothing usable remains. Staged inputs come
/// from consumers, so a name like `"../../etc/passwd"` must never escape
/// the scratch directory.
///
/// # Examples
///
/// ```
/// use debforge::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("app.ipa"), "app.ipa");
/// assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
/// assert_eq!(sanitize_file_name(""), "staged.bin");
/// ```
pub fn sanitize_file_name(suggested: &str) -> String {
    let base = Path::new(suggested)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Reject names that are empty or only dots after cleaning
    let trimmed = cleaned.trim_matches('.').trim();
    if trimmed.is_empty() {
        "staged.bin".to_string()
    } else {
        cleaned
    }
}

/// Derive a filename from the last path segment of a URL
///
/// Returns `None` when the URL has no usable final segment (e.g. a bare
/// host or a trailing slash). Used to name downloads and staged inputs
/// after the asset they came from.
///
/// # Examples
///
/// ```
/// use debforge::utils::filename_from_url;
///
/// assert_eq!(
///     filename_from_url("https://host/releases/app.deb").as_deref(),
///     Some("app.deb")
/// );
/// assert_eq!(filename_from_url("https://host/"), None);
/// ```
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    Some(segment.to_string())
}
