//! A minimal adapter (§4.C3) around `flate2`'s raw-DEFLATE decompressor,
//! shaped as the source's `init`/`feed`/`drain` interface rather than
//! `flate2`'s own `Read`-based wrappers — the read stream (§4.C8) needs
//! to interleave decompression with its own decrypt layer and seek
//! support, which a `Read`-adapter-over-a-`Read`-adapter can't express.

use flate2::{Decompress, FlushDecompress, Status};

use crate::result::{ZipError, ZipResult};

/// Incremental DEFLATE decompressor. `window bits = raw`: no zlib
/// wrapper, matching ZIP's on-disk compressed stream.
pub struct DeflateAdapter {
    inner: Decompress,
}

impl DeflateAdapter {
    pub fn new() -> Self {
        DeflateAdapter {
            inner: Decompress::new(false),
        }
    }

    /// Resets the decoder to its just-`new()`'d state, for a backward
    /// seek (§4.C8).
    pub fn reset(&mut self) {
        self.inner.reset(false);
    }

    /// Feeds `input` and drains as much output as fits in `output` in a
    /// single call. Returns `(bytes consumed from input, bytes written
    /// to output, true if the DEFLATE stream has ended)`.
    pub fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> ZipResult<(usize, usize, bool)> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let status = self
            .inner
            .decompress(input, output, FlushDecompress::None)
            .map_err(|e| ZipError::Corrupt(format!("DEFLATE stream corrupt: {e}")))?;
        let consumed = (self.inner.total_in() - before_in) as usize;
        let produced = (self.inner.total_out() - before_out) as usize;
        let done = matches!(status, Status::StreamEnd);
        Ok((consumed, produced, done))
    }
}

impl Default for DeflateAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compress;

    fn raw_deflate(data: &[u8]) -> Vec<u8> {
        let mut compressor = Compress::new(flate2::Compression::default(), false);
        let mut out = vec![0u8; data.len() * 2 + 64];
        let status = compressor
            .compress(data, &mut out, flate2::FlushCompress::Finish)
            .unwrap();
        assert!(matches!(status, flate2::Status::StreamEnd));
        out.truncate(compressor.total_out() as usize);
        out
    }

    #[test]
    fn decompresses_a_single_chunk() {
        let plaintext = b"the quick brown fox jumps over the lazy dog, repeatedly, repeatedly";
        let compressed = raw_deflate(plaintext);

        let mut adapter = DeflateAdapter::new();
        let mut out = vec![0u8; plaintext.len()];
        let (consumed, produced, done) = adapter.decompress(&compressed, &mut out).unwrap();
        assert_eq!(consumed, compressed.len());
        assert_eq!(produced, plaintext.len());
        assert!(done);
        assert_eq!(&out[..], &plaintext[..]);
    }

    #[test]
    fn reset_allows_decoding_again_from_the_start() {
        let plaintext = b"some bytes to compress";
        let compressed = raw_deflate(plaintext);

        let mut adapter = DeflateAdapter::new();
        let mut out = vec![0u8; plaintext.len()];
        adapter.decompress(&compressed, &mut out).unwrap();

        adapter.reset();
        let mut out2 = vec![0u8; plaintext.len()];
        let (_, produced, done) = adapter.decompress(&compressed, &mut out2).unwrap();
        assert_eq!(produced, plaintext.len());
        assert!(done);
        assert_eq!(out, out2);
    }
}
