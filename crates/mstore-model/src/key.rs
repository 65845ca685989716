//! Slash-separated storage keys.
//!
//! Paths handed to a [`crate::BlobIo`] are plain strings so the same keys work
//! for local directories and object stores alike.

/// Join key segments with `/`.
///
/// Empty segments are skipped, redundant separators at segment edges are
/// collapsed, and a leading `/` on the first segment is preserved.
pub fn join_key<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for part in parts {
        if out.is_empty() && part.starts_with('/') {
            out.push('/');
        }
        let trimmed = part.trim_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(trimmed);
    }
    out
}

/// Everything before the last `/`, or `""` for a bare name.
pub fn parent_key(key: &str) -> &str {
    key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}
