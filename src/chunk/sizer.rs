//! Chunk count and byte-range computation
//!
//! Pure functions: given a file size and a configured chunk size, compute
//! how many chunks a transfer needs and which byte range each one covers.
//! A zero-length file still yields exactly one (empty) chunk so the
//! completion coordinator always has an operation to wait on.

/// One contiguous byte range of a file, the unit of transfer scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// Zero-based position of this chunk within the file
    pub index: u32,
    /// Byte offset where the range starts
    pub offset: u64,
    /// Range length in bytes (zero only for the single chunk of an empty file)
    pub length: u64,
}

impl ChunkRange {
    /// Exclusive end offset of the range
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Number of chunks required to move `file_size` bytes in `chunk_size` pieces.
///
/// `chunk_size` must be positive; passing zero is a caller contract
/// violation, not a recoverable error.
pub fn num_chunks(file_size: u64, chunk_size: u64) -> u32 {
    assert!(chunk_size > 0, "chunk size must be positive");

    // Zero-size files map to ONE empty chunk so overwrite handling and
    // content-type sniffing still get a single operation to run.
    let mut count = 1u64;
    if file_size > 0 {
        count = if file_size % chunk_size == 0 {
            file_size / chunk_size
        } else {
            file_size / chunk_size + 1
        };
    }
    count as u32
}

/// Byte ranges for every chunk of the file, in offset order.
///
/// The ranges partition `[0, file_size)` with no gaps or overlaps; chunk `i`
/// covers `[i*chunk_size, min((i+1)*chunk_size, file_size))`.
pub fn chunk_ranges(file_size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    let count = num_chunks(file_size, chunk_size);

    (0..count)
        .map(|index| {
            let offset = u64::from(index) * chunk_size;
            let length = chunk_size.min(file_size - offset.min(file_size));
            ChunkRange {
                index,
                offset,
                length,
            }
        })
        .collect()
}
