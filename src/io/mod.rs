//! Local byte-range I/O
//!
//! Chunk operations never hold file handles across suspension points;
//! readers and writers here open, seek, and release per call so any number
//! of worker threads can act on the same file concurrently.

use crate::error::{CloudMoveError, IoResultExt, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Capability-scoped byte-range reader over a local file.
///
/// Decouples chunk generation from file-handle management: the endpoint
/// asks for a range and never sees the underlying file.
pub trait RangeReader: Send + Sync {
    /// Read exactly `length` bytes starting at `offset`
    fn read_range(&self, offset: u64, length: usize) -> Result<Vec<u8>>;
}

/// Range reader that opens the file fresh for every read.
///
/// Opening per call keeps the reader trivially safe under a worker pool;
/// the OS page cache makes the repeated opens cheap.
pub struct FileRangeReader {
    path: PathBuf,
}

impl FileRangeReader {
    /// Create a reader over the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RangeReader for FileRangeReader {
    fn read_range(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path).with_path(&self.path)?;

        if length == 0 {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(offset)).with_path(&self.path)?;
        let mut buffer = vec![0u8; length];
        file.read_exact(&mut buffer).with_path(&self.path)?;
        Ok(buffer)
    }
}

/// Preallocating positioned writer used by download endpoints.
///
/// The destination file is created and sized once, on the first write;
/// subsequent writes seek and fill their range, in any order.
pub struct FileRangeWriter {
    path: PathBuf,
    total_size: u64,
    created: Mutex<bool>,
}

impl FileRangeWriter {
    /// Create a writer that will materialize `total_size` bytes at `path`
    pub fn new(path: impl Into<PathBuf>, total_size: u64) -> Self {
        Self {
            path: path.into(),
            total_size,
            created: Mutex::new(false),
        }
    }

    /// Destination path this writer fills
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_created(&self) -> Result<()> {
        let mut created = self.created.lock().unwrap();
        if !*created {
            let file = File::create(&self.path).with_path(&self.path)?;
            file.set_len(self.total_size).with_path(&self.path)?;
            *created = true;
        }
        Ok(())
    }

    /// Write `data` at `offset`, creating and preallocating the file first
    /// if no range has been written yet
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_created()?;

        if data.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .with_path(&self.path)?;
        file.seek(SeekFrom::Start(offset)).with_path(&self.path)?;
        file.write_all(data).with_path(&self.path)?;
        Ok(())
    }

    /// Remove the (possibly partial) destination file. Used by the cleanup
    /// path of a failed download; missing files are not an error.
    pub fn discard(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CloudMoveError::io(&self.path, e)),
        }
    }
}

/// Read up to `n` leading bytes of the file for content-type sniffing.
/// Short files yield fewer bytes; an empty file yields an empty buffer.
pub fn read_leading_bytes(path: &Path, n: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path).with_path(path)?;
    let mut buffer = vec![0u8; n];
    let mut filled = 0;

    while filled < n {
        let read = file.read(&mut buffer[filled..]).with_path(path)?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    buffer.truncate(filled);
    Ok(buffer)
}

/// Sniff a MIME type from the leading bytes of the file content
pub fn sniff_content_type(leading: &[u8]) -> &'static str {
    const OCTET_STREAM: &str = "application/octet-stream";

    if leading.is_empty() {
        return OCTET_STREAM;
    }

    match leading {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'%', b'P', b'D', b'F', ..] => "application/pdf",
        [b'P', b'K', 0x03, 0x04, ..] => "application/zip",
        [0x1F, 0x8B, ..] => "application/gzip",
        _ => {
            if !leading.contains(&0) && std::str::from_utf8(leading).is_ok() {
                "text/plain"
            } else {
                OCTET_STREAM
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_range_reader_reads_exact_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let reader = FileRangeReader::new(&path);
        assert_eq!(reader.read_range(0, 4).unwrap(), b"0123");
        assert_eq!(reader.read_range(4, 4).unwrap(), b"4567");
        assert_eq!(reader.read_range(8, 2).unwrap(), b"89");
        assert_eq!(reader.read_range(0, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_range_reader_missing_file() {
        let reader = FileRangeReader::new("/nonexistent/never/data.bin");
        assert!(reader.read_range(0, 1).is_err());
    }

    #[test]
    fn test_range_writer_out_of_order_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");

        let writer = FileRangeWriter::new(&path, 10);
        writer.write_at(8, b"89").unwrap();
        writer.write_at(0, b"0123").unwrap();
        writer.write_at(4, b"4567").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
    }

    #[test]
    fn test_range_writer_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");

        let writer = FileRangeWriter::new(&path, 0);
        writer.write_at(0, &[]).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_range_writer_discard_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.bin");

        let writer = FileRangeWriter::new(&path, 4);
        writer.write_at(0, b"ab").unwrap();
        writer.discard().unwrap();
        assert!(!path.exists());
        writer.discard().unwrap();
    }

    #[test]
    fn test_read_leading_bytes_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.txt");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(read_leading_bytes(&path, 512).unwrap(), b"abc");
    }

    #[test]
    fn test_sniff_content_type() {
        assert_eq!(sniff_content_type(&[0x89, b'P', b'N', b'G', 0, 0]), "image/png");
        assert_eq!(sniff_content_type(b"%PDF-1.7"), "application/pdf");
        assert_eq!(sniff_content_type(b"PK\x03\x04rest"), "application/zip");
        assert_eq!(sniff_content_type(b"hello world"), "text/plain");
        assert_eq!(sniff_content_type(&[0x00, 0x01, 0x02]), "application/octet-stream");
        assert_eq!(sniff_content_type(&[]), "application/octet-stream");
    }
}
