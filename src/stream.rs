//! The seekable read stream (§4.C8): decrypt (none/classic/AES) feeding
//! decompress (stored/deflate) feeding the caller's buffer, plus CRC-32
//! verification of a fully-consumed sequential read.
//!
//! Holds its own duplicated byte source rather than borrowing the
//! archive's, so a caller can have any number of these open (and reading
//! at independent positions) over one `Archive`.

use std::io;
use std::io::SeekFrom;

use crc32fast::Hasher;

use crate::archive::{read_fully, Archive};
use crate::crypto::{AesDecryptor, ClassicCipher};
use crate::deflate::DeflateAdapter;
use crate::entry::{AesParams, CompressionMethod, EntryIndex};
use crate::result::{ZipError, ZipResult};

const INPUT_BUF_SIZE: usize = 16 * 1024;
const DISCARD_CHUNK: usize = 512;

/// Everything needed to rebuild a stream from scratch, kept around so
/// `duplicate()` doesn't need to go back through the archive.
#[derive(Clone)]
struct StreamSnapshot {
    header_start: u64,
    compression_method: CompressionMethod,
    uncompressed_size: u64,
    compressed_size: u64,
    crc32: u32,
    general_bits: u16,
    dos_mod_time: u16,
    aes: Option<AesParams>,
    classic_password: Option<Vec<u8>>,
    aes_password: Vec<u8>,
}

enum Crypto {
    None,
    Classic(ClassicCipher),
    Aes(AesDecryptor),
}

impl Crypto {
    fn decrypt(&mut self, buf: &mut [u8]) {
        match self {
            Crypto::None => {}
            Crypto::Classic(cipher) => cipher.decrypt(buf),
            Crypto::Aes(aes) => aes.decrypt(buf),
        }
    }
}

/// A live read over one (already-resolved) archive entry.
pub struct ReadStream {
    source: Box<dyn crate::io::ByteSource>,
    /// First byte of the entry's body in the archive, i.e. past the
    /// classic 12-byte header if present (the AES salt/verifier are
    /// already excluded from `snapshot.header_start` by the resolver).
    data_offset: u64,
    /// Length of the body at `data_offset`: ciphertext/compressed bytes,
    /// excluding the classic header and the AES salt/verifier/MAC.
    body_len: u64,
    compression_method: CompressionMethod,
    uncompressed_size: u64,
    uncompressed_pos: u64,
    compressed_pos: u64,
    crypto: Crypto,
    /// Saved post-header cipher state, to rewind to on a backward seek.
    initial_classic_cipher: Option<ClassicCipher>,
    deflate: Option<DeflateAdapter>,
    in_buf: Vec<u8>,
    in_buf_pos: usize,
    in_buf_len: usize,
    crc_hasher: Hasher,
    expected_crc: u32,
    /// Cleared by any seek that doesn't land on 0, since a CRC can only
    /// be checked over a contiguous read starting at the beginning.
    hash_valid: bool,
    snapshot: StreamSnapshot,
}

impl ReadStream {
    /// Opens a stream over `idx`, which must already be resolved (the
    /// caller, `Archive::open_read`, always resolves first).
    pub(crate) fn open(archive: &mut Archive, idx: EntryIndex, password: Option<&str>) -> ZipResult<Self> {
        let entry = archive.entry(idx);
        let snapshot = StreamSnapshot {
            header_start: entry.offset,
            compression_method: entry.compression_method,
            uncompressed_size: entry.uncompressed_size,
            compressed_size: entry.compressed_size,
            crc32: entry.crc32,
            general_bits: entry.general_bits,
            dos_mod_time: entry.dos_mod_time,
            aes: entry.aes.clone(),
            classic_password: password.map(|p| p.as_bytes().to_vec()),
            aes_password: archive.aes_password().to_vec(),
        };
        let source = archive.duplicate_source()?;
        Self::from_snapshot(snapshot, source)
    }

    fn from_snapshot(snapshot: StreamSnapshot, mut source: Box<dyn crate::io::ByteSource>) -> ZipResult<Self> {
        let is_classic = snapshot.general_bits & 1 != 0 && snapshot.aes.is_none();

        source.seek(SeekFrom::Start(snapshot.header_start))?;

        let (crypto, initial_classic_cipher, header_len) = if is_classic {
            let password = snapshot.classic_password.clone().unwrap_or_default();
            let mut header = [0u8; 12];
            read_fully(source.as_mut(), &mut header)?;
            let check_byte = if snapshot.general_bits & 0x8 != 0 {
                (snapshot.dos_mod_time >> 8) as u8
            } else {
                (snapshot.crc32 >> 24) as u8
            };
            let cipher = ClassicCipher::read_header(&password, &mut header, check_byte)?;
            (Crypto::Classic(cipher), Some(cipher), 12u64)
        } else if let Some(aes) = &snapshot.aes {
            let decryptor = AesDecryptor::new(
                &snapshot.aes_password,
                &aes.salt,
                aes.key_strength,
                aes.pass_verification,
            )?;
            (Crypto::Aes(decryptor), None, 0u64)
        } else {
            (Crypto::None, None, 0u64)
        };

        let data_offset = snapshot.header_start + header_len;
        let body_len = match &snapshot.aes {
            Some(aes) => {
                let framing = aes.key_strength.salt_len() as u64 + 2 + 10;
                snapshot.compressed_size.saturating_sub(framing)
            }
            None if is_classic => snapshot.compressed_size.saturating_sub(12),
            None => snapshot.compressed_size,
        };

        let deflate = match snapshot.compression_method {
            CompressionMethod::Deflate => Some(DeflateAdapter::new()),
            _ => None,
        };

        Ok(ReadStream {
            source,
            data_offset,
            body_len,
            compression_method: snapshot.compression_method,
            uncompressed_size: snapshot.uncompressed_size,
            uncompressed_pos: 0,
            compressed_pos: 0,
            crypto,
            initial_classic_cipher,
            deflate,
            in_buf: vec![0u8; INPUT_BUF_SIZE],
            in_buf_pos: 0,
            in_buf_len: 0,
            crc_hasher: Hasher::new(),
            expected_crc: snapshot.crc32,
            hash_valid: true,
            snapshot,
        })
    }

    pub fn len(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn is_empty(&self) -> bool {
        self.uncompressed_size == 0
    }

    pub fn position(&self) -> u64 {
        self.uncompressed_pos
    }

    /// Independent copy, starting over at position 0 with fresh
    /// decrypt/decompress state — matches `duplicate()` on the source.
    pub fn duplicate(&self) -> ZipResult<ReadStream> {
        let source = self.source.duplicate()?;
        Self::from_snapshot(self.snapshot.clone(), source)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> ZipResult<usize> {
        let avail = self.uncompressed_size.saturating_sub(self.uncompressed_pos);
        let want = (buf.len() as u64).min(avail) as usize;
        if want == 0 {
            return Ok(0);
        }

        let produced = match self.compression_method {
            CompressionMethod::None => self.read_stored(&mut buf[..want])?,
            CompressionMethod::Deflate => self.read_deflate(&mut buf[..want])?,
            CompressionMethod::Unsupported(code) => {
                return Err(ZipError::Unsupported(format!(
                    "compression method {code} has no reader"
                )));
            }
        };

        if self.hash_valid {
            self.crc_hasher.update(&buf[..produced]);
        }
        self.uncompressed_pos += produced as u64;
        if self.hash_valid && self.uncompressed_pos == self.uncompressed_size {
            self.check_crc()?;
        }
        Ok(produced)
    }

    fn check_crc(&self) -> ZipResult<()> {
        if self.expected_crc == 0 {
            return Ok(());
        }
        let actual = self.crc_hasher.clone().finalize();
        if actual != self.expected_crc {
            return Err(ZipError::Corrupt(format!(
                "CRC-32 mismatch: expected {:08x}, got {:08x}",
                self.expected_crc, actual
            )));
        }
        Ok(())
    }

    fn read_stored(&mut self, buf: &mut [u8]) -> ZipResult<usize> {
        read_fully(self.source.as_mut(), buf)?;
        self.crypto.decrypt(buf);
        self.compressed_pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn read_deflate(&mut self, buf: &mut [u8]) -> ZipResult<usize> {
        let mut produced_total = 0;
        while produced_total < buf.len() {
            if self.in_buf_pos == self.in_buf_len {
                let remaining = self.body_len - self.compressed_pos;
                if remaining == 0 {
                    break;
                }
                let chunk = remaining.min(INPUT_BUF_SIZE as u64) as usize;
                read_fully(self.source.as_mut(), &mut self.in_buf[..chunk])?;
                self.crypto.decrypt(&mut self.in_buf[..chunk]);
                self.compressed_pos += chunk as u64;
                self.in_buf_pos = 0;
                self.in_buf_len = chunk;
            }

            let decoder = self
                .deflate
                .as_mut()
                .expect("Deflate compression method always carries a decoder");
            let (consumed, produced, done) =
                decoder.decompress(&self.in_buf[self.in_buf_pos..self.in_buf_len], &mut buf[produced_total..])?;
            self.in_buf_pos += consumed;
            produced_total += produced;

            if done {
                break;
            }
            if consumed == 0 && produced == 0 {
                if self.in_buf_pos == self.in_buf_len && self.compressed_pos >= self.body_len {
                    return Err(ZipError::Corrupt("DEFLATE stream ended before producing all expected bytes".into()));
                }
            }
        }
        Ok(produced_total)
    }

    /// Seeks to `target`, a position in the uncompressed stream. Named
    /// distinctly from `io::Seek::seek` (which takes a `SeekFrom` and
    /// delegates here) — an inherent method sharing a trait method's name
    /// would shadow it for callers using dot-call syntax.
    pub fn seek_to(&mut self, target: u64) -> ZipResult<()> {
        if target > self.uncompressed_size {
            return Err(ZipError::PastEof);
        }
        if target == 0 {
            self.hash_valid = true;
            self.crc_hasher = Hasher::new();
        } else if target != self.uncompressed_pos {
            self.hash_valid = false;
        }
        if target == self.uncompressed_pos {
            return Ok(());
        }

        match (self.compression_method, &mut self.crypto) {
            (CompressionMethod::None, Crypto::None) => {
                self.source.seek(SeekFrom::Start(self.data_offset + target))?;
                self.uncompressed_pos = target;
                self.compressed_pos = target;
            }
            (CompressionMethod::None, Crypto::Aes(aes)) => {
                self.source.seek(SeekFrom::Start(self.data_offset + target))?;
                aes.seek_to(target);
                self.uncompressed_pos = target;
                self.compressed_pos = target;
            }
            _ => {
                if target < self.uncompressed_pos {
                    self.reset_to_start()?;
                }
                let mut discard = [0u8; DISCARD_CHUNK];
                while self.uncompressed_pos < target {
                    let want = ((target - self.uncompressed_pos) as usize).min(DISCARD_CHUNK);
                    let n = self.read(&mut discard[..want])?;
                    if n == 0 {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn reset_to_start(&mut self) -> ZipResult<()> {
        if let Some(d) = &mut self.deflate {
            d.reset();
        }
        match &mut self.crypto {
            Crypto::Classic(cipher) => {
                *cipher = self
                    .initial_classic_cipher
                    .expect("classic-encrypted streams always save their post-header key state");
            }
            Crypto::Aes(aes) => aes.seek_to(0),
            Crypto::None => {}
        }
        self.source.seek(SeekFrom::Start(self.data_offset))?;
        self.compressed_pos = 0;
        self.uncompressed_pos = 0;
        self.in_buf_pos = 0;
        self.in_buf_len = 0;
        Ok(())
    }
}

impl io::Read for ReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ReadStream::read(self, buf).map_err(to_io_error)
    }
}

impl io::Seek for ReadStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(delta) => self.uncompressed_pos as i64 + delta,
            SeekFrom::End(delta) => self.uncompressed_size as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position"));
        }
        let target = target as u64;
        self.seek_to(target).map_err(to_io_error)?;
        Ok(target)
    }
}

fn to_io_error(e: ZipError) -> io::Error {
    match e {
        ZipError::Io(io_err) => io_err,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}
