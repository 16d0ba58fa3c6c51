use std::io::{Read, Seek, SeekFrom};

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use flate2::Compress;
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use zipvault::{Archive, EntryKind, FileSource, OpenOptions, SliceSource, ZipError};

/// A from-scratch implementation of the PKWARE "traditional" stream
/// cipher, used only to encrypt fixture bytes for these tests. Mirrors
/// the well-known APPNOTE 6.1 algorithm; the crate under test has its
/// own (decrypt-only) implementation it's being tested against.
struct FixtureCipher {
    k0: u32,
    k1: u32,
    k2: u32,
}

impl FixtureCipher {
    fn new(password: &[u8]) -> Self {
        let mut c = FixtureCipher {
            k0: 0x1234_5678,
            k1: 0x2345_6789,
            k2: 0x3456_7890,
        };
        for &b in password {
            c.update_keys(b);
        }
        c
    }

    fn crc32_step(crc: u32, byte: u8) -> u32 {
        const POLY: u32 = 0xedb8_8320;
        let mut c = crc ^ byte as u32;
        for _ in 0..8 {
            c = if c & 1 != 0 { (c >> 1) ^ POLY } else { c >> 1 };
        }
        c
    }

    fn update_keys(&mut self, plain_byte: u8) {
        self.k0 = Self::crc32_step(self.k0, plain_byte);
        self.k1 = self.k1.wrapping_add(self.k0 & 0xff).wrapping_mul(134_775_813).wrapping_add(1);
        self.k2 = Self::crc32_step(self.k2, (self.k1 >> 24) as u8);
    }

    fn keystream_byte(&self) -> u8 {
        let t = (self.k2 & 0xffff) as u32 | 2;
        (((t.wrapping_mul(t ^ 1)) >> 8) & 0xff) as u8
    }

    fn encrypt(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            let ks = self.keystream_byte();
            let plain = *b;
            self.update_keys(plain);
            *b = plain ^ ks;
        }
    }
}

/// Encrypts (or decrypts — it's XOR) `buf` with the same AES-ECB-per-block
/// counter-keystream scheme `crypto::AesDecryptor` implements: an 8-byte
/// little-endian counter starting at 1 in the low half of each block, the
/// high half always zero.
fn aes_ctr_xor(cipher: &Aes128, buf: &mut [u8]) {
    let mut counter = 1u64;
    for chunk in buf.chunks_mut(16) {
        let mut block = [0u8; 16];
        block[..8].copy_from_slice(&counter.to_le_bytes());
        let mut ga = GenericArray::clone_from_slice(&block);
        cipher.encrypt_block(&mut ga);
        for (b, k) in chunk.iter_mut().zip(ga.iter()) {
            *b ^= k;
        }
        counter += 1;
    }
}

fn crc32(data: &[u8]) -> u32 {
    let mut h = crc32fast::Hasher::new();
    h.update(data);
    h.finalize()
}

fn raw_deflate(data: &[u8]) -> Vec<u8> {
    let mut compressor = Compress::new(flate2::Compression::default(), false);
    let mut out = vec![0u8; data.len() * 2 + 64];
    compressor.compress(data, &mut out, flate2::FlushCompress::Finish).unwrap();
    out.truncate(compressor.total_out() as usize);
    out
}

const UNIX_REGULAR: u32 = 0o100644;
const UNIX_SYMLINK: u32 = 0o120777;
const UNIX_DIRECTORY: u32 = 0o040755;
const VERSION_MADE_BY_UNIX: u16 = (3u16 << 8) | 20;

struct LocalEntry {
    #[allow(dead_code)]
    header_offset: u32,
}

/// A hand-rolled Zip builder: enough of APPNOTE 4.3 to produce archives
/// this crate's reader can open, without depending on an external zip
/// binary or any other zip-writing crate.
#[derive(Default)]
struct ZipBuilder {
    buf: Vec<u8>,
    central: Vec<u8>,
    entry_count: u16,
}

impl ZipBuilder {
    fn add_stored(&mut self, name: &str, data: &[u8], encrypt_password: Option<&[u8]>) -> LocalEntry {
        let crc = crc32(data);
        let (flags, body): (u16, Vec<u8>) = match encrypt_password {
            None => (0, data.to_vec()),
            Some(password) => {
                let check_byte = (crc >> 24) as u8;
                let mut header = [0u8; 12];
                header[11] = check_byte;
                let mut cipher = FixtureCipher::new(password);
                cipher.encrypt(&mut header);
                let mut body = data.to_vec();
                cipher.encrypt(&mut body);
                let mut out = header.to_vec();
                out.extend_from_slice(&body);
                (1, out)
            }
        };
        self.write_entry(name, 0, flags, data.len() as u32, body.len() as u32, crc, &body, UNIX_REGULAR, &[])
    }

    fn add_deflated(&mut self, name: &str, data: &[u8]) -> LocalEntry {
        let compressed = raw_deflate(data);
        let crc = crc32(data);
        self.write_entry(name, 8, 0, data.len() as u32, compressed.len() as u32, crc, &compressed, UNIX_REGULAR, &[])
    }

    fn add_symlink(&mut self, name: &str, target: &str) -> LocalEntry {
        let data = target.as_bytes();
        let crc = crc32(data);
        self.write_entry(name, 0, 0, data.len() as u32, data.len() as u32, crc, data, UNIX_SYMLINK, &[])
    }

    fn add_directory(&mut self, name: &str) {
        let name_with_slash = format!("{name}/");
        self.write_entry(&name_with_slash, 0, 0, 0, 0, 0, &[], UNIX_DIRECTORY, &[]);
    }

    /// A WinZip AES-128-encrypted, Stored-underlying entry, encrypted
    /// against whatever password `Archive`'s `OpenOptions::default()`
    /// compiles in, so the test doesn't need to know that password
    /// itself — just the same derive/keystream math `crypto.rs` uses.
    fn add_aes_stored(&mut self, name: &str, data: &[u8], password: &[u8]) -> LocalEntry {
        let salt = [0x42u8; 8];
        let key_len = 16;
        let mut derived = vec![0u8; key_len * 2 + 2];
        pbkdf2_hmac::<Sha1>(password, &salt, 1000, &mut derived);
        let encryption_key = &derived[..key_len];
        let verifier = [derived[key_len * 2], derived[key_len * 2 + 1]];

        let cipher = Aes128::new_from_slice(encryption_key).unwrap();
        let mut ciphertext = data.to_vec();
        aes_ctr_xor(&cipher, &mut ciphertext);

        let mut body = salt.to_vec();
        body.extend_from_slice(&verifier);
        body.extend_from_slice(&ciphertext);
        body.extend_from_slice(&[0u8; 10]); // unverified authentication tag

        // Extra field 0x9901: vendor version, "AE", key strength (1 = 128
        // bits), underlying compression method (0 = Stored).
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x9901u16.to_le_bytes());
        extra.extend_from_slice(&7u16.to_le_bytes());
        extra.extend_from_slice(&2u16.to_le_bytes());
        extra.extend_from_slice(b"AE");
        extra.push(1);
        extra.extend_from_slice(&0u16.to_le_bytes());

        let crc = crc32(data);
        const AES_COMPRESSION_SENTINEL: u16 = 99;
        self.write_entry(
            name,
            AES_COMPRESSION_SENTINEL,
            1,
            data.len() as u32,
            body.len() as u32,
            crc,
            &body,
            UNIX_REGULAR,
            &extra,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn write_entry(
        &mut self,
        name: &str,
        compression_method: u16,
        flags: u16,
        uncompressed_size: u32,
        compressed_size: u32,
        crc: u32,
        body: &[u8],
        unix_mode: u32,
        extra: &[u8],
    ) -> LocalEntry {
        let header_offset = self.buf.len() as u32;
        let name = name.as_bytes();

        self.buf.extend_from_slice(b"PK\x03\x04");
        self.buf.extend_from_slice(&20u16.to_le_bytes());
        self.buf.extend_from_slice(&flags.to_le_bytes());
        self.buf.extend_from_slice(&compression_method.to_le_bytes());
        self.buf.extend_from_slice(&0u16.to_le_bytes());
        self.buf.extend_from_slice(&0u16.to_le_bytes());
        self.buf.extend_from_slice(&crc.to_le_bytes());
        self.buf.extend_from_slice(&compressed_size.to_le_bytes());
        self.buf.extend_from_slice(&uncompressed_size.to_le_bytes());
        self.buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(name);
        self.buf.extend_from_slice(extra);
        self.buf.extend_from_slice(body);

        self.central.extend_from_slice(b"PK\x01\x02");
        self.central.extend_from_slice(&VERSION_MADE_BY_UNIX.to_le_bytes());
        self.central.extend_from_slice(&20u16.to_le_bytes());
        self.central.extend_from_slice(&flags.to_le_bytes());
        self.central.extend_from_slice(&compression_method.to_le_bytes());
        self.central.extend_from_slice(&0u16.to_le_bytes());
        self.central.extend_from_slice(&0u16.to_le_bytes());
        self.central.extend_from_slice(&crc.to_le_bytes());
        self.central.extend_from_slice(&compressed_size.to_le_bytes());
        self.central.extend_from_slice(&uncompressed_size.to_le_bytes());
        self.central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        self.central.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        self.central.extend_from_slice(&0u16.to_le_bytes());
        self.central.extend_from_slice(&0u16.to_le_bytes());
        self.central.extend_from_slice(&0u16.to_le_bytes());
        self.central.extend_from_slice(&(unix_mode << 16).to_le_bytes());
        self.central.extend_from_slice(&header_offset.to_le_bytes());
        self.central.extend_from_slice(name);
        self.central.extend_from_slice(extra);

        self.entry_count += 1;
        LocalEntry { header_offset }
    }

    fn finish(mut self) -> Vec<u8> {
        let central_dir_offset = self.buf.len() as u32;
        self.buf.extend_from_slice(&self.central);
        let central_dir_size = self.buf.len() as u32 - central_dir_offset;

        self.buf.extend_from_slice(b"PK\x05\x06");
        self.buf.extend_from_slice(&0u16.to_le_bytes());
        self.buf.extend_from_slice(&0u16.to_le_bytes());
        self.buf.extend_from_slice(&self.entry_count.to_le_bytes());
        self.buf.extend_from_slice(&self.entry_count.to_le_bytes());
        self.buf.extend_from_slice(&central_dir_size.to_le_bytes());
        self.buf.extend_from_slice(&central_dir_offset.to_le_bytes());
        self.buf.extend_from_slice(&0u16.to_le_bytes());
        self.buf
    }
}

fn build_test_archive() -> Vec<u8> {
    let mut zip = ZipBuilder::default();
    zip.add_directory("docs");
    zip.add_stored("docs/readme.txt", b"hello world\n", None);
    let long_text = b"the quick brown fox jumps over the lazy dog. ".repeat(20);
    zip.add_deflated("docs/data.bin", &long_text);
    zip.add_symlink("link-to-readme", "docs/readme.txt");
    zip.add_stored("secret.txt", b"top secret data", Some(b"swordfish"));
    zip.finish()
}

fn open_test_archive() -> Archive {
    let bytes = build_test_archive();
    Archive::open(Box::new(SliceSource::new(bytes)), OpenOptions::default()).expect("archive should open")
}

#[test]
fn stats_a_stored_file() {
    let mut archive = open_test_archive();
    let stat = archive.stat("docs/readme.txt").unwrap();
    assert_eq!(stat.kind, EntryKind::Regular);
    assert_eq!(stat.uncompressed_size, 12);
}

#[test]
fn stats_a_directory() {
    let mut archive = open_test_archive();
    let stat = archive.stat("docs").unwrap();
    assert_eq!(stat.kind, EntryKind::Directory);
}

#[test]
fn enumerate_lists_the_directorys_children() {
    let mut archive = open_test_archive();
    let children = archive.enumerate("docs").unwrap();
    let mut names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["data.bin", "readme.txt"]);
}

#[test]
fn reads_a_stored_file_to_completion() {
    let mut archive = open_test_archive();
    let mut reader = archive.open_read("docs/readme.txt").unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"hello world\n");
}

#[test]
fn reads_a_deflated_file_and_verifies_its_crc() {
    let mut archive = open_test_archive();
    let mut reader = archive.open_read("docs/data.bin").unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"the quick brown fox jumps over the lazy dog. ".repeat(20));
}

#[test]
fn seeking_backward_on_a_deflated_stream_reconstructs_correctly() {
    let mut archive = open_test_archive();
    let mut reader = archive.open_read("docs/data.bin").unwrap();
    let expected = b"the quick brown fox jumps over the lazy dog. ".repeat(20);

    let mut first_half = vec![0u8; 100];
    reader.read_exact(&mut first_half).unwrap();
    assert_eq!(&first_half[..], &expected[..100]);

    reader.seek(SeekFrom::Start(10)).unwrap();
    let mut from_ten = vec![0u8; 50];
    reader.read_exact(&mut from_ten).unwrap();
    assert_eq!(&from_ten[..], &expected[10..60]);
}

#[test]
fn symlinks_resolve_to_their_targets_contents() {
    let mut archive = open_test_archive();
    let stat = archive.stat("link-to-readme").unwrap();
    assert_eq!(stat.kind, EntryKind::Symlink);

    let mut reader = archive.open_read("link-to-readme").unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"hello world\n");
}

#[test]
fn classic_encrypted_entries_need_the_dollar_password_suffix() {
    let mut archive = open_test_archive();

    let mut reader = archive.open_read("secret.txt$swordfish").unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"top secret data");

    let err = archive.open_read("secret.txt$wrongpassword").unwrap_err();
    assert!(matches!(err, ZipError::BadPassword));
}

#[test]
fn missing_paths_report_no_such_file() {
    let mut archive = open_test_archive();
    let err = archive.stat("does/not/exist").unwrap_err();
    assert!(matches!(err, ZipError::NoSuchFile(_)));
}

#[test]
fn file_source_opens_from_disk() {
    let bytes = build_test_archive();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.zip");
    std::fs::write(&path, &bytes).unwrap();

    let file = std::fs::File::open(&path).unwrap();
    let mut archive = Archive::open(Box::new(FileSource::new(file)), OpenOptions::default()).unwrap();
    let stat = archive.stat("docs/readme.txt").unwrap();
    assert_eq!(stat.uncompressed_size, 12);
}

fn cyclic_symlink_archive() -> Vec<u8> {
    let mut zip = ZipBuilder::default();
    zip.add_symlink("a", "b");
    zip.add_symlink("b", "a");
    zip.finish()
}

#[test]
fn a_symlink_cycle_fails_with_symlink_loop() {
    let mut archive = Archive::open(Box::new(SliceSource::new(cyclic_symlink_archive())), OpenOptions::default()).unwrap();
    let err = archive.open_read("a").unwrap_err();
    assert!(matches!(err, ZipError::SymlinkLoop));
}

#[test]
fn entering_a_symlink_cycle_from_either_side_fails() {
    // A fresh archive per side: once one end of a cycle fails to
    // resolve, it's marked Broken and subsequent attempts on *that*
    // entry fail fast with Corrupt rather than loop-detect again — so
    // this exercises the other entry point into the same cycle, not a
    // second attempt at the same one.
    let mut archive = Archive::open(Box::new(SliceSource::new(cyclic_symlink_archive())), OpenOptions::default()).unwrap();
    let err = archive.open_read("b").unwrap_err();
    assert!(matches!(err, ZipError::SymlinkLoop));
}

#[test]
fn seeking_past_the_end_of_a_stream_fails() {
    let mut archive = open_test_archive();
    let mut reader = archive.open_read("docs/readme.txt").unwrap();
    let size = reader.len();

    reader.seek_to(size).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(reader.read(&mut buf).unwrap(), 0);

    let err = reader.seek_to(size + 1).unwrap_err();
    assert!(matches!(err, ZipError::PastEof));
}

#[test]
fn a_self_extracting_prefix_is_skipped_over() {
    let bytes = build_test_archive();
    let mut prefixed = vec![0u8; 1024];
    prefixed.extend_from_slice(&bytes);

    let mut archive = Archive::open(Box::new(SliceSource::new(prefixed)), OpenOptions::default())
        .expect("archive behind a self-extracting prefix should still open");
    let mut reader = archive.open_read("docs/readme.txt").unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"hello world\n");
}

#[test]
fn winzip_aes_entries_decrypt_with_the_default_password() {
    let password = OpenOptions::default().aes_password;

    let mut zip = ZipBuilder::default();
    zip.add_aes_stored("secret/vault.bin", b"the launch codes are 00000000", &password);
    let bytes = zip.finish();

    let mut archive = Archive::open(Box::new(SliceSource::new(bytes)), OpenOptions::default()).unwrap();
    let stat = archive.stat("secret/vault.bin").unwrap();
    assert_eq!(stat.kind, EntryKind::Regular);
    assert_eq!(stat.uncompressed_size, 30);

    let mut reader = archive.open_read("secret/vault.bin").unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"the launch codes are 00000000");
}

#[test]
fn winzip_aes_entries_reject_the_wrong_password() {
    let mut zip = ZipBuilder::default();
    zip.add_aes_stored("secret/vault.bin", b"the launch codes are 00000000", b"correct password");
    let bytes = zip.finish();

    let mut archive = Archive::open(Box::new(SliceSource::new(bytes)), OpenOptions::default()).unwrap();
    let err = archive.open_read("secret/vault.bin").unwrap_err();
    assert!(matches!(err, ZipError::BadPassword));
}
