//! Request path helpers shared by the matchers and the static index.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// Strip one trailing slash; the root and the empty path become `/`.
pub fn normalize_path(path: &str) -> &str {
    if path.is_empty() || path == "/" {
        return "/";
    }
    path.strip_suffix('/').unwrap_or(path)
}

/// Percent-decode one segment.
///
/// Fails on a `%` not followed by two hex digits and on invalid UTF-8.
pub fn decode_segment(segment: &str) -> Option<String> {
    if has_malformed_escape(segment) {
        return None;
    }
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(Cow::into_owned)
}

/// Percent-decode a whole path, segment by segment.
pub fn decode_path(path: &str) -> Option<String> {
    let decoded = path
        .split('/')
        .map(decode_segment)
        .collect::<Option<Vec<_>>>()?;
    Some(decoded.join("/"))
}

/// True when any `/`-separated segment is exactly `..`.
pub fn has_dot_dot_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

fn has_malformed_escape(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'%')
        .any(|(i, _)| {
            !matches!(
                (bytes.get(i + 1), bytes.get(i + 2)),
                (Some(hi), Some(lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit()
            )
        })
}
