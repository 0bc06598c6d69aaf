//! Deterministic chunk layout and by-index file reads.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// A contiguous byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// Zero-based ordinal; chunks are uploaded in index order.
    pub index: u32,
    /// Byte offset within the file: `index * chunk_size`.
    pub offset: u64,
    /// Length in bytes; only the last chunk may be shorter than the chunk size.
    pub length: u64,
}

/// Fixed chunk layout for a file of known size.
///
/// A pure function of `(file_size, chunk_size)`: the same inputs always
/// produce the same boundaries, which resume correctness depends on. Chunks
/// cover `[0, file_size)` with no gaps and no overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// Creates a plan. If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            file_size,
            chunk_size,
        }
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Chunk size in bytes.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks: `ceil(file_size / chunk_size)`. Zero for an empty
    /// file (rejected upstream before a session is created).
    ///
    /// Saturates at `u32::MAX` rather than truncating for degenerate
    /// layouts (tiny chunk size over a huge file); any real session stays
    /// far below that thanks to the file-size limit and the 1 MiB default.
    pub fn total_chunks(&self) -> u32 {
        u32::try_from(self.file_size.div_ceil(self.chunk_size)).unwrap_or(u32::MAX)
    }

    /// Returns the descriptor for chunk `index`, or `None` past the end.
    pub fn chunk(&self, index: u32) -> Option<ChunkSpec> {
        let offset = u64::from(index) * self.chunk_size;
        if offset >= self.file_size {
            return None;
        }
        Some(ChunkSpec {
            index,
            offset,
            length: self.chunk_size.min(self.file_size - offset),
        })
    }

    /// Iterates over all chunk descriptors in index order.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkSpec> + '_ {
        (0..self.total_chunks()).map(|i| {
            self.chunk(i)
                .expect("index below total_chunks is always in range")
        })
    }
}

/// Reads file chunks by index.
///
/// Each read seeks to the chunk's offset, so re-reading index `i` — on first
/// send or after a resume — yields byte-identical content.
pub struct ChunkReader {
    file: File,
    plan: ChunkPlan,
}

impl ChunkReader {
    /// Opens `path` and derives its chunk plan.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn open(path: &Path, chunk_size: u64) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            plan: ChunkPlan::new(file_size, chunk_size),
        })
    }

    /// The layout this reader derives chunks from.
    pub fn plan(&self) -> ChunkPlan {
        self.plan
    }

    /// Reads the full content of chunk `index`.
    pub fn read_chunk(&mut self, index: u32) -> Result<Vec<u8>, TransferError> {
        let spec = self
            .plan
            .chunk(index)
            .ok_or(TransferError::ChunkOutOfRange(index))?;
        self.file.seek(SeekFrom::Start(spec.offset))?;
        let mut buf = vec![0u8; spec.length as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}
