// Chunk planning and ranged file reads shared by the upload paths.

use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// TikTok ingest wants 10 MiB parts.
pub const TIKTOK_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// YouTube resumable uploads take 1 MiB parts (must be a multiple of 256 KiB).
pub const YOUTUBE_CHUNK_SIZE: u64 = 1024 * 1024;

/// Inclusive byte ranges covering `total` in `chunk_size` steps. The last
/// range is short when `total` is not a multiple.
pub fn plan_chunks(total: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    if total == 0 || chunk_size == 0 {
        return Vec::new();
    }
    let mut ranges = Vec::with_capacity(total.div_ceil(chunk_size) as usize);
    let mut first = 0;
    while first < total {
        let last = (first + chunk_size - 1).min(total - 1);
        ranges.push((first, last));
        first = last + 1;
    }
    ranges
}

/// `Content-Range` header value for an inclusive range.
pub fn content_range(first: u64, last: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", first, last, total)
}

pub async fn file_size(path: &Path) -> std::io::Result<u64> {
    Ok(tokio::fs::metadata(path).await?.len())
}

/// Read one inclusive byte range from a file.
pub async fn read_range(path: &Path, first: u64, last: u64) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(first)).await?;
    let mut buf = vec![0u8; (last - first + 1) as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Read a whole file (single-shot upload paths).
pub async fn read_all(path: &Path) -> std::io::Result<Vec<u8>> {
    tokio::fs::read(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn chunk_plan_covers_every_byte_once() {
        let ranges = plan_chunks(25, 10);
        assert_eq!(ranges, vec![(0, 9), (10, 19), (20, 24)]);

        let total: u64 = ranges.iter().map(|(a, b)| b - a + 1).sum();
        assert_eq!(total, 25);
    }

    #[test]
    fn exact_multiple_has_no_tail() {
        assert_eq!(plan_chunks(20, 10), vec![(0, 9), (10, 19)]);
    }

    #[test]
    fn small_file_is_one_chunk() {
        assert_eq!(plan_chunks(3, 10), vec![(0, 2)]);
    }

    #[test]
    fn empty_file_plans_nothing() {
        assert!(plan_chunks(0, 10).is_empty());
    }

    #[test]
    fn content_range_matches_wire_format() {
        assert_eq!(content_range(0, 9, 25), "bytes 0-9/25");
        assert_eq!(content_range(20, 24, 25), "bytes 20-24/25");
    }

    #[tokio::test]
    async fn read_range_returns_the_exact_slice() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789abcdef").unwrap();

        let slice = read_range(tmp.path(), 4, 9).await.unwrap();
        assert_eq!(slice, b"456789");
        assert_eq!(file_size(tmp.path()).await.unwrap(), 16);
    }
}
