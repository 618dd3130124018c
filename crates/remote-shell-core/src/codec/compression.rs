//! Chunked block compression for stream payloads.
//!
//! A compressed buffer is a sequence of chunks. Each chunk is a 4 byte header
//! (`original_size`, `compressed_size`, both little-endian `u16`) followed by
//! `compressed_size` payload bytes. Both header fields are written as the true
//! size minus one; readers add one back. A chunk whose two sizes are equal is
//! stored raw and is copied verbatim instead of being decompressed.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::CodecError;

/// Largest uncompressed block carried by a single chunk.
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Size of the per-chunk header on the wire.
pub const CHUNK_HEADER_SIZE: usize = 4;

/// True (unbiased) sizes of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub original_size: usize,
    pub compressed_size: usize,
}

impl ChunkHeader {
    /// Whether the payload is the original block stored verbatim.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        self.original_size == self.compressed_size
    }

    /// Header bytes with the size-minus-one bias applied.
    ///
    /// # Errors
    /// `Compress` if either size is zero or larger than a block.
    pub fn to_bytes(self) -> Result<[u8; CHUNK_HEADER_SIZE], CodecError> {
        let biased = |size: usize| {
            size.checked_sub(1)
                .and_then(|s| u16::try_from(s).ok())
                .ok_or_else(|| CodecError::Compress(format!("chunk size {size} not encodable")))
        };
        let original = biased(self.original_size)?.to_le_bytes();
        let compressed = biased(self.compressed_size)?.to_le_bytes();
        Ok([original[0], original[1], compressed[0], compressed[1]])
    }

    /// Parse header bytes, removing the size-minus-one bias.
    #[must_use]
    pub fn from_bytes(bytes: [u8; CHUNK_HEADER_SIZE]) -> Self {
        Self {
            original_size: usize::from(u16::from_le_bytes([bytes[0], bytes[1]])) + 1,
            compressed_size: usize::from(u16::from_le_bytes([bytes[2], bytes[3]])) + 1,
        }
    }
}

/// One chunk borrowed from a compressed buffer.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub header: ChunkHeader,
    pub payload: &'a [u8],
    /// Offset of the chunk header within the buffer.
    pub offset: usize,
}

/// Iterator over the chunks of a compressed buffer.
///
/// Yields an error and stops if a header or payload runs past the end.
pub struct ChunkReader<'a> {
    buf: &'a [u8],
    cursor: usize,
    failed: bool,
}

impl<'a> ChunkReader<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            cursor: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<Chunk<'a>, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.buf.len() {
            return None;
        }

        let offset = self.cursor;
        let truncated = CodecError::ChunkTruncated { offset };
        let Some(header_bytes) = self
            .buf
            .get(offset..offset + CHUNK_HEADER_SIZE)
            .and_then(|b| <[u8; CHUNK_HEADER_SIZE]>::try_from(b).ok())
        else {
            self.failed = true;
            return Some(Err(truncated));
        };

        let header = ChunkHeader::from_bytes(header_bytes);
        let start = offset + CHUNK_HEADER_SIZE;
        let end = start + header.compressed_size;
        let Some(payload) = self.buf.get(start..end) else {
            self.failed = true;
            return Some(Err(truncated));
        };

        self.cursor = end;
        Some(Ok(Chunk {
            header,
            payload,
            offset,
        }))
    }
}

/// Total uncompressed size declared by the chunk headers of `buf`.
///
/// # Errors
/// `ChunkTruncated` if the chunk framing runs past the buffer.
pub fn uncompressed_len(buf: &[u8]) -> Result<usize, CodecError> {
    ChunkReader::new(buf).try_fold(0usize, |total, chunk| {
        Ok(total + chunk?.header.original_size)
    })
}

/// Per-block compression algorithm plugged into [`BlockCodec`].
pub trait BlockCompressor: Send + Sync {
    /// Compress `block` into at most `limit` bytes.
    ///
    /// Returns `Ok(None)` when the result would not fit.
    fn compress_block(&self, block: &[u8], limit: usize) -> Result<Option<Vec<u8>>, CodecError>;

    /// Decompress `payload` so that it fills `out` exactly.
    fn decompress_block(&self, payload: &[u8], out: &mut [u8]) -> Result<(), CodecError>;
}

/// Raw deflate block compressor.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    /// Create a compressor at `level` (clamped to 0..=9).
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl BlockCompressor for DeflateCompressor {
    fn compress_block(&self, block: &[u8], limit: usize) -> Result<Option<Vec<u8>>, CodecError> {
        let mut compress = Compress::new(self.level, false);
        let mut out = vec![0u8; limit];
        match compress.compress(block, &mut out, FlushCompress::Finish) {
            Ok(Status::StreamEnd) => {
                let written = usize::try_from(compress.total_out())
                    .map_err(|e| CodecError::Compress(e.to_string()))?;
                out.truncate(written);
                Ok(Some(out))
            }
            Ok(Status::Ok | Status::BufError) => Ok(None),
            Err(e) => Err(CodecError::Compress(e.to_string())),
        }
    }

    fn decompress_block(&self, payload: &[u8], out: &mut [u8]) -> Result<(), CodecError> {
        let mut decompress = Decompress::new(false);
        let status = decompress
            .decompress(payload, out, FlushDecompress::Finish)
            .map_err(|e| CodecError::Decompress(e.to_string()))?;

        let produced = decompress.total_out();
        let consumed = decompress.total_in();
        if status != Status::StreamEnd
            || produced != out.len() as u64
            || consumed != payload.len() as u64
        {
            return Err(CodecError::Decompress(format!(
                "block ended with {status:?} after {produced} of {} bytes",
                out.len()
            )));
        }
        Ok(())
    }
}

/// Chunked compression codec.
pub struct BlockCodec {
    compressor: Box<dyn BlockCompressor>,
}

impl Default for BlockCodec {
    fn default() -> Self {
        Self::new(DeflateCompressor::default())
    }
}

impl std::fmt::Debug for BlockCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCodec").finish_non_exhaustive()
    }
}

impl BlockCodec {
    /// Create a codec around a block compressor.
    #[must_use]
    pub fn new(compressor: impl BlockCompressor + 'static) -> Self {
        Self {
            compressor: Box::new(compressor),
        }
    }

    /// Split `input` into blocks and compress each one independently.
    ///
    /// The returned buffer has capacity for `extra_trailing_space` more bytes
    /// past the chunk data.
    ///
    /// # Errors
    /// `Allocation` if the destination cannot be reserved, `Compress` if the
    /// compressor reports a failure other than running out of room.
    pub fn compress(&self, input: &[u8], extra_trailing_space: usize) -> Result<Vec<u8>, CodecError> {
        let chunk_count = input.len().div_ceil(MAX_BLOCK_SIZE);
        let capacity = chunk_count * CHUNK_HEADER_SIZE + input.len() + extra_trailing_space;

        let mut out = Vec::new();
        out.try_reserve_exact(capacity)
            .map_err(|_| CodecError::Allocation(capacity))?;

        for block in input.chunks(MAX_BLOCK_SIZE) {
            let offset = out.len();
            if offset + CHUNK_HEADER_SIZE + block.len() > capacity {
                return Err(CodecError::ChunkOverrun { offset, capacity });
            }

            // Compressed output must be strictly smaller than the block so
            // that equal sizes keep meaning "raw".
            let limit = block.len() - 1;
            let compressed = if limit == 0 {
                None
            } else {
                self.compressor.compress_block(block, limit)?
            };
            let payload = compressed
                .as_deref()
                .filter(|c| !c.is_empty() && c.len() < block.len())
                .unwrap_or(block);
            if payload.len() == block.len() {
                tracing::trace!(offset, len = block.len(), "storing block raw");
            }

            let header = ChunkHeader {
                original_size: block.len(),
                compressed_size: payload.len(),
            };
            out.extend_from_slice(&header.to_bytes()?);
            out.extend_from_slice(payload);
        }

        Ok(out)
    }

    /// Reassemble the original bytes from a chunked buffer.
    ///
    /// # Errors
    /// `ChunkTruncated` on broken framing, `ChunkOverrun` if a chunk would
    /// write past the pre-sized destination, `Decompress` if a block fails.
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let capacity = uncompressed_len(input)?;
        let mut out = Vec::new();
        out.try_reserve_exact(capacity)
            .map_err(|_| CodecError::Allocation(capacity))?;
        out.resize(capacity, 0);

        let mut used = 0;
        for chunk in ChunkReader::new(input) {
            let Chunk {
                header,
                payload,
                offset,
            } = chunk?;
            let end = used + header.original_size;
            let Some(dst) = out.get_mut(used..end) else {
                return Err(CodecError::ChunkOverrun { offset, capacity });
            };

            if header.is_raw() {
                dst.copy_from_slice(payload);
            } else {
                self.compressor.decompress_block(payload, dst)?;
            }
            used = end;
        }

        Ok(out)
    }
}
