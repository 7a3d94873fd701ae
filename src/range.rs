/// A single inclusive byte range `start..=end` within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a new byte range with inclusive start and end.
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the `Content-Range` header for this range of a resource of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

const BYTES_UNIT: &str = "bytes";

/// Parses a `Range` header value against a resource of `size` bytes.
///
/// Each comma separated spec is parsed on its own and kept only if it is
/// well formed and `start <= end`; the rest are dropped. Ranges come back
/// in header order, neither sorted nor merged. An empty result means the
/// header named no satisfiable range.
///
/// ```
/// use axum_range_static::{parse_range_header, ByteRange};
///
/// assert_eq!(parse_range_header("bytes=-10", 1024), vec![ByteRange::new(1014, 1023)]);
/// assert!(parse_range_header("bytes=100-99", 1024).is_empty());
/// ```
pub fn parse_range_header(header: &str, size: u64) -> Vec<ByteRange> {
    let mut tokens = header.split('=');
    let (unit, specs) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(unit), Some(specs), None) => (unit, specs),
        _ => return Vec::new(),
    };
    if unit != BYTES_UNIT {
        return Vec::new();
    }

    specs
        .split(',')
        .filter_map(|spec| parse_range_spec(spec, size))
        .filter(|range| range.start <= range.end)
        .collect()
}

fn parse_range_spec(spec: &str, size: u64) -> Option<ByteRange> {
    let mut bounds = spec.split('-');
    let (start, end) = match (bounds.next(), bounds.next(), bounds.next()) {
        (Some(start), Some(end), None) => (start.trim(), end.trim()),
        _ => return None,
    };

    // an empty resource has no last byte, so nothing is satisfiable
    let last = size.checked_sub(1)?;

    match (start.is_empty(), end.is_empty()) {
        (true, true) => None,
        // suffix: the final N bytes, or the whole resource when N > size
        (true, false) => {
            let suffix = end.parse::<u64>().ok()?;
            Some(ByteRange::new(size.saturating_sub(suffix), last))
        }
        (false, true) => {
            let start = start.parse::<u64>().ok()?;
            Some(ByteRange::new(start, last))
        }
        (false, false) => {
            let start = start.parse::<u64>().ok()?;
            let end = end.parse::<u64>().ok()?;
            Some(ByteRange::new(start, end.min(last)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: u64 = 1024;

    #[test]
    fn test_parse_range_header() {
        let tests = [
            ("bytes=0-99", vec![ByteRange::new(0, 99)]),
            ("bytes=0-", vec![ByteRange::new(0, 1023)]),
            ("bytes=-10", vec![ByteRange::new(1014, 1023)]),
            ("bytes=1000-", vec![ByteRange::new(1000, 1023)]),
            ("bytes=0-0", vec![ByteRange::new(0, 0)]),
            ("bytes=0-0,-1", vec![ByteRange::new(0, 0), ByteRange::new(1023, 1023)]),
            ("bytes=0-99,100-299", vec![ByteRange::new(0, 99), ByteRange::new(100, 299)]),
            ("bytes=0-24646", vec![ByteRange::new(0, 1023)]),
            ("bytes= 5 - 9 ", vec![ByteRange::new(5, 9)]),
            ("bytes=-4096", vec![ByteRange::new(0, 1023)]),
        ];

        for (i, (header, expected)) in tests.iter().enumerate() {
            let result = parse_range_header(header, SIZE);
            assert_eq!(&result, expected, "Failed to parse range header #{i}: {header}");
        }
    }

    #[test]
    fn test_invalid_headers_are_empty() {
        let tests = [
            "bytes",
            "none",
            "notbytes=0-1",
            "bleets=100-324",
            "bytes=99-0",
            "bytes=100-99",
            "bytes=-",
            "bytes=",
            "bytes=a-b",
            "bytes=1-2-3",
            "bytes=0-1=2",
            "bytes=2000-",
            "bytes=-0",
        ];

        for header in tests {
            assert!(parse_range_header(header, SIZE).is_empty(), "{header} should not parse");
        }
    }

    #[test]
    fn test_bad_specs_are_dropped_individually() {
        let ranges = parse_range_header("bytes=0-9,x-y,99-0,,-,20-29", SIZE);
        assert_eq!(ranges, vec![ByteRange::new(0, 9), ByteRange::new(20, 29)]);
    }

    #[test]
    fn test_ranges_keep_header_order() {
        let ranges = parse_range_header("bytes=500-599,0-9,5-14", SIZE);
        assert_eq!(
            ranges,
            vec![ByteRange::new(500, 599), ByteRange::new(0, 9), ByteRange::new(5, 14)]
        );
    }

    #[test]
    fn test_whole_resource_for_every_size() {
        for size in [1u64, 2, 7, 1024, u64::MAX] {
            let header = format!("bytes=0-{}", size - 1);
            assert_eq!(parse_range_header(&header, size), vec![ByteRange::new(0, size - 1)]);
        }
    }

    #[test]
    fn test_suffix_for_every_length() {
        for n in [1u64, 10, 1023, 1024, 1025, u64::MAX] {
            let header = format!("bytes=-{n}");
            let start = SIZE.saturating_sub(n);
            assert_eq!(parse_range_header(&header, SIZE), vec![ByteRange::new(start, SIZE - 1)]);
        }
    }

    #[test]
    fn test_empty_resource_has_no_ranges() {
        assert!(parse_range_header("bytes=0-", 0).is_empty());
        assert!(parse_range_header("bytes=-5", 0).is_empty());
        assert!(parse_range_header("bytes=0-0", 0).is_empty());
    }

    #[test]
    fn test_content_range() {
        let range = ByteRange::new(1014, 1023);
        assert_eq!(10, range.len());
        assert_eq!("bytes 1014-1023/1024", range.content_range(SIZE));
    }
}
