use std::fmt;

use crate::{BlobError, BlobResult};

/// Inclusive byte window a chunk claims to occupy, `start <= end < u64::MAX`.
///
/// An absent header is modelled as `Option<ByteRange>::None` ("append at the
/// current offset"), not as a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> BlobResult<Self> {
        Self::checked(&format!("{start}-{end}"), start, end)
    }

    fn checked(raw: &str, start: u64, end: u64) -> BlobResult<Self> {
        if start > end {
            return Err(BlobError::malformed_range(raw, "start is after end"));
        }
        // Keeps `len` representable.
        if end == u64::MAX {
            return Err(BlobError::malformed_range(raw, "end offset too large"));
        }
        Ok(Self { start, end })
    }

    /// Parse a `Content-Range` value.
    ///
    /// Accepts `start-end`, `bytes start-end`, `bytes start-end/total`,
    /// `bytes start-end/*` and `bytes=start-end`.
    pub fn parse(raw: &str) -> BlobResult<Self> {
        let value = raw.trim();
        let value = value
            .strip_prefix("bytes=")
            .or_else(|| value.strip_prefix("bytes "))
            .unwrap_or(value)
            .trim();

        let window = match value.split_once('/') {
            Some((window, total)) => {
                let total = total.trim();
                if total != "*" && total.parse::<u64>().is_err() {
                    return Err(BlobError::malformed_range(raw, "invalid total length"));
                }
                window
            }
            None => value,
        };

        let (start, end) = window
            .split_once('-')
            .ok_or_else(|| BlobError::malformed_range(raw, "expected start-end"))?;

        let start = parse_offset(raw, start)?;
        let end = parse_offset(raw, end)?;
        Self::checked(raw, start, end)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered, `end - start + 1`.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Never true: a valid range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

fn parse_offset(raw: &str, part: &str) -> BlobResult<u64> {
    let part = part.trim();
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BlobError::malformed_range(raw, "offsets must be decimal integers"));
    }
    part.parse::<u64>()
        .map_err(|_| BlobError::malformed_range(raw, "offset out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_forms() {
        for raw in ["0-99", "bytes 0-99", "bytes 0-99/300", "bytes 0-99/*", "bytes=0-99", " 0-99 "] {
            let r = ByteRange::parse(raw).unwrap();
            assert_eq!((r.start(), r.end(), r.len()), (0, 99, 100), "{raw:?}");
        }
        assert_eq!(ByteRange::parse("7-7").unwrap().len(), 1);
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", "0", "-5", "5-", "a-b", "10-2", "bytes 0-9/x", "0-9-10", "+1-2"] {
            assert!(
                matches!(ByteRange::parse(raw), Err(BlobError::MalformedRange { .. })),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn largest_end_offset_is_rejected() {
        let max = format!("0-{}", u64::MAX);
        assert!(matches!(ByteRange::parse(&max), Err(BlobError::MalformedRange { .. })));
        assert!(ByteRange::new(0, u64::MAX).is_err());

        let r = ByteRange::parse(&format!("0-{}", u64::MAX - 1)).unwrap();
        assert_eq!(r.len(), u64::MAX);
    }

    #[test]
    fn displays_as_start_dash_end() {
        assert_eq!(ByteRange::new(100, 199).unwrap().to_string(), "100-199");
        assert!(ByteRange::new(2, 1).is_err());
    }
}
