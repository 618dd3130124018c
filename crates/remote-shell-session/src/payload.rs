//! Stream payload pipeline between wire text and backend bytes.

use remote_shell_core::{
    ShellResult,
    codec::{BlockCodec, DeflateCompressor, encoding},
};

/// Applies the codecs in wire order for one provider.
#[derive(Debug, Default)]
pub struct PayloadPipeline {
    codec: BlockCodec,
}

impl PayloadPipeline {
    /// Pipeline using deflate at `level` for compressed shells.
    #[must_use]
    pub fn deflate(level: u32) -> Self {
        Self::with_codec(BlockCodec::new(DeflateCompressor::new(level)))
    }

    #[must_use]
    pub const fn with_codec(codec: BlockCodec) -> Self {
        Self { codec }
    }

    /// Base64-decode inbound text, then decompress it if `compressed`.
    ///
    /// # Errors
    /// `Failed` on malformed base64 or chunk data.
    pub fn inbound(&self, text: &str, compressed: bool) -> ShellResult<Vec<u8>> {
        let decoded = encoding::decode(text)?;
        if !compressed {
            return Ok(decoded);
        }
        Ok(self.codec.decompress(&decoded)?)
    }

    /// Compress outbound bytes if `compressed`, then base64-encode them.
    ///
    /// # Errors
    /// `Failed` if a codec overflows its bound, `ResourceExhausted` if a
    /// buffer cannot be reserved.
    pub fn outbound(&self, data: &[u8], compressed: bool) -> ShellResult<String> {
        if !compressed {
            return Ok(encoding::encode(data)?);
        }
        let chunked = self.codec.compress(data, encoding::TERMINATOR_SLACK)?;
        Ok(encoding::encode(&chunked)?)
    }
}
