//! `Range: bytes=` evaluation for single-span responses.

/// What to send for a file of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range header; send the whole file.
    Full,
    /// Inclusive span, already clamped to the file.
    Partial { start: u64, end: u64 },
    /// 416 with `Content-Range: bytes */size`.
    Unsatisfiable,
}

impl ByteRange {
    /// Evaluate a `Range` header against a file size.
    ///
    /// Only the first span of a multi-range header is honoured. Missing or
    /// non-numeric bounds default to `0` and `size - 1`; the end is clamped
    /// to the last byte.
    pub fn evaluate(header: Option<&str>, size: u64) -> Self {
        let Some(ranges) = header.and_then(|h| h.strip_prefix("bytes=")) else {
            return Self::Full;
        };
        let first = ranges.split(',').next().unwrap_or_default();
        let (start, end) = first.split_once('-').unwrap_or((first, ""));

        let last = size.saturating_sub(1);
        let start = leading_number(start).unwrap_or(0);
        let end = leading_number(end).map_or(last, |end| end.min(last));

        if size == 0 || start > end || start >= size {
            return Self::Unsatisfiable;
        }
        Self::Partial { start, end }
    }
}

/// Digits at the start of `s` after optional whitespace, saturating at
/// `u64::MAX`.
fn leading_number(s: &str) -> Option<u64> {
    let s = s.trim_start();
    let digits = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if digits == 0 {
        return None;
    }
    Some(s[..digits].parse().unwrap_or(u64::MAX))
}
