//! Byte-range planning for chunked fetches.

/// A byte range `[start, end]` with an inclusive end, as in the HTTP Range header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Next chunk starting at `start`, `chunk` bytes long, clipped to `total` when known.
    ///
    /// Returns `None` when `start` is already at or past the known total.
    pub fn next(start: u64, chunk: u64, total: Option<u64>) -> Option<ByteRange> {
        let chunk = chunk.max(1);
        let mut end = start.saturating_add(chunk - 1);
        if let Some(total) = total {
            if start >= total {
                return None;
            }
            end = end.min(total - 1);
        }
        Some(ByteRange { start, end })
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    /// Value for the `Range` header: `bytes=start-end`.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Value for curl's `CURLOPT_RANGE`: `start-end`.
    pub fn curl_value(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(total: u64, chunk: u64) -> Vec<ByteRange> {
        let mut out = Vec::new();
        let mut offset = 0;
        while let Some(r) = ByteRange::next(offset, chunk, Some(total)) {
            offset = r.end + 1;
            out.push(r);
        }
        out
    }

    #[test]
    fn ranges_partition_total() {
        for total in [1u64, 7, 100, 1000, 4097] {
            for chunk in [1u64, 3, 64, 100, 4096, 10_000] {
                let ranges = plan(total, chunk);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges.last().unwrap().end, total - 1);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end + 1, pair[1].start);
                }
                assert_eq!(ranges.iter().map(ByteRange::len).sum::<u64>(), total);
            }
        }
    }

    #[test]
    fn clipped_to_total() {
        let r = ByteRange::next(90, 50, Some(100)).unwrap();
        assert_eq!(r, ByteRange { start: 90, end: 99 });
        assert_eq!(r.len(), 10);
    }

    #[test]
    fn past_total_is_none() {
        assert!(ByteRange::next(100, 50, Some(100)).is_none());
        assert!(ByteRange::next(0, 50, Some(0)).is_none());
    }

    #[test]
    fn unknown_total_uses_full_chunk() {
        let r = ByteRange::next(1000, 512, None).unwrap();
        assert_eq!(r.end, 1511);
        assert_eq!(r.header_value(), "bytes=1000-1511");
        assert_eq!(r.curl_value(), "1000-1511");
    }

    #[test]
    fn single_byte_range() {
        let r = ByteRange { start: 42, end: 42 };
        assert_eq!(r.len(), 1);
        assert_eq!(r.header_value(), "bytes=42-42");
    }
}
