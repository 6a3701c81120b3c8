//! Resumable-offset file helpers used by the stream transfer and the
//! application protocol.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Size of a regular file, or `None` when it does not exist (or is not a
/// regular file).  Both the client and the server use this to compute the
/// resume offset of a partially transferred file.
pub fn file_size(path: &Path) -> Option<u64> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Open `path` for reading, positioned at `offset`.
pub async fn open_read_at(path: &Path, offset: u64) -> std::io::Result<File> {
    let mut file = File::open(path).await?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }
    Ok(file)
}

/// Open `path` for appending, creating it when absent.
pub async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

/// Fill `buf` from `file`, looping over short reads.  Returns the number of
/// bytes actually read; less than `buf.len()` only at end of file.
pub async fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "rudp-fsutil-{name}-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ))
    }

    #[test]
    fn file_size_of_missing_path_is_none() {
        assert_eq!(file_size(&scratch("missing")), None);
    }

    #[tokio::test]
    async fn read_chunk_handles_eof() {
        let path = scratch("eof");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let mut file = open_read_at(&path, 0).await.unwrap();
        let mut buf = [0u8; 16];
        let n = read_chunk(&mut file, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn open_read_at_skips_offset() {
        let path = scratch("offset");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let mut file = open_read_at(&path, 4).await.unwrap();
        let mut buf = [0u8; 16];
        let n = read_chunk(&mut file, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"456789");

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
