//! Archive lifecycle: locating the central directory (possibly through a
//! self-extracting prefix and/or Zip64 extensions), loading it into the
//! Entry arena, and the host-facing open/enumerate/stat/open-for-read API.

use std::io::SeekFrom;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, trace, warn};
use memchr::memmem;

use crate::config::OpenOptions;
use crate::crypto::AesStrength;
use crate::entry::{
    external_attrs_is_symlink, AesParams, CompressionMethod, Entry, EntryIndex, ResolutionState,
};
use crate::io::ByteSource;
use crate::resolve::resolve;
use crate::result::{ZipError, ZipResult};
use crate::spec;
use crate::stream::ReadStream;

/// What kind of thing an Entry names, as seen by the host-facing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
}

/// Metadata returned by [`Archive::stat`].
#[derive(Debug, Clone)]
pub struct Stat {
    pub kind: EntryKind,
    pub uncompressed_size: u64,
    pub mod_time: i64,
    pub readonly: bool,
}

/// One child yielded by [`Archive::enumerate`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// A loaded ZIP archive: an Entry arena plus the byte source it was
/// parsed from.
pub struct Archive {
    source: Box<dyn ByteSource>,
    entries: Vec<Entry>,
    buckets: Vec<Option<EntryIndex>>,
    root: EntryIndex,
    zip64: bool,
    has_crypto: bool,
    data_start: u64,
    options: OpenOptions,
}

const ROOT: EntryIndex = 0;

impl Archive {
    /// Runs C4 (locate) then C5 (load) against `source`.
    pub fn open(mut source: Box<dyn ByteSource>, options: OpenOptions) -> ZipResult<Self> {
        let location = locate_central_directory(source.as_mut(), &options)?;

        let bucket_count = std::cmp::max(1, location.entry_count as usize / 5);
        let mut archive = Archive {
            source,
            entries: vec![Entry::root()],
            buckets: vec![None; bucket_count],
            root: ROOT,
            zip64: location.zip64,
            has_crypto: false,
            data_start: location.data_start,
            options,
        };

        archive.load_central_directory(&location)?;
        debug!(
            "opened archive: {} entries, zip64={}, data_start={}",
            archive.entries.len() - 1,
            archive.zip64,
            archive.data_start,
        );
        Ok(archive)
    }

    pub fn has_crypto(&self) -> bool {
        self.has_crypto
    }

    pub fn aes_password(&self) -> &[u8] {
        &self.options.aes_password
    }

    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    pub fn entry(&self, idx: EntryIndex) -> &Entry {
        &self.entries[idx]
    }

    pub fn entry_mut(&mut self, idx: EntryIndex) -> &mut Entry {
        &mut self.entries[idx]
    }

    pub fn duplicate_source(&self) -> ZipResult<Box<dyn ByteSource>> {
        Ok(self.source.duplicate()?)
    }

    /// Direct access to the archive's own byte source, used only by the
    /// lazy resolver (§4.C7) during open/resolve — see §5 on why this
    /// must not be touched concurrently with resolution.
    pub(crate) fn source_mut(&mut self) -> &mut dyn ByteSource {
        self.source.as_mut()
    }

    /// Name lookup without the `$password` convention, for the
    /// resolver's symlink-target lookups (which aren't user-facing
    /// paths and never carry a crypto suffix).
    pub(crate) fn find_by_name_for_resolve(&mut self, path: &str) -> Option<EntryIndex> {
        self.find_by_name(path)
    }

    /// Looks up a path, applying the `$password` classic-crypto
    /// convention when the plain path misses and the archive has any
    /// classic-encrypted entries.
    pub fn lookup(&mut self, path: &str) -> ZipResult<(EntryIndex, Option<&str>)> {
        if let Some(idx) = self.find_by_name(path) {
            return Ok((idx, None));
        }
        if self.has_crypto {
            if let Some(dollar) = path.rfind('$') {
                let (real_path, password) = path.split_at(dollar);
                let password = &password[1..];
                if let Some(idx) = self.find_by_name(real_path) {
                    return Ok((idx, Some(password)));
                }
            }
        }
        Err(ZipError::NoSuchFile(Utf8PathBuf::from(path)))
    }

    fn find_by_name(&mut self, path: &str) -> Option<EntryIndex> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Some(self.root);
        }
        self.find_in_bucket(path)
    }

    pub fn stat(&mut self, path: &str) -> ZipResult<Stat> {
        let (idx, _password) = self.lookup(path)?;
        resolve(self, idx)?;
        let entry = &self.entries[idx];
        let kind = if entry.is_directory() {
            EntryKind::Directory
        } else if entry.symlink_target.is_some() {
            EntryKind::Symlink
        } else {
            EntryKind::Regular
        };
        let size = match kind {
            EntryKind::Regular => entry.uncompressed_size,
            _ => 0,
        };
        Ok(Stat {
            kind,
            uncompressed_size: size,
            mod_time: entry.last_mod_time,
            readonly: true,
        })
    }

    pub fn enumerate(&mut self, path: &str) -> ZipResult<Vec<DirEntry>> {
        let (idx, _) = self.lookup(path)?;
        resolve(self, idx)?;
        if !self.entries[idx].is_directory() {
            return Err(ZipError::InvalidPath(format!("{} is not a directory", path)));
        }
        let mut out = Vec::new();
        let mut child = self.entries[idx].children;
        while let Some(c) = child {
            let e = &self.entries[c];
            let kind = if e.is_directory() {
                EntryKind::Directory
            } else if e.is_symlink() {
                EntryKind::Symlink
            } else {
                EntryKind::Regular
            };
            let file_name = e
                .name
                .file_name()
                .map(|s| s.to_owned())
                .unwrap_or_else(|| e.name.to_string());
            out.push(DirEntry {
                name: file_name,
                kind,
            });
            child = e.sibling;
        }
        Ok(out)
    }

    /// Opens a read stream for `path`, resolving it (and any symlink
    /// chain) on first access.
    pub fn open_read(&mut self, path: &str) -> ZipResult<ReadStream> {
        let (idx, password) = self.lookup(path)?;
        resolve(self, idx)?;
        let target = self.entries[idx].symlink_target.unwrap_or(idx);
        if self.entries[target].is_directory() {
            return Err(ZipError::InvalidPath(format!("{} is a directory", path)));
        }
        trace!("opening read stream for {}", path);
        ReadStream::open(self, target, password)
    }

    // Write operations always fail ReadOnly, matching the host-facing
    // archiver contract.
    pub fn open_write(&mut self, _path: &str) -> ZipResult<()> {
        Err(ZipError::ReadOnly)
    }
    pub fn open_append(&mut self, _path: &str) -> ZipResult<()> {
        Err(ZipError::ReadOnly)
    }
    pub fn remove(&mut self, _path: &str) -> ZipResult<()> {
        Err(ZipError::ReadOnly)
    }
    pub fn mkdir(&mut self, _path: &str) -> ZipResult<()> {
        Err(ZipError::ReadOnly)
    }

    // --- C6: directory tree + hash index -----------------------------

    fn bucket_for(&self, name: &str) -> usize {
        (hash_name(name) % self.buckets.len() as u64) as usize
    }

    /// Finds `name` (case-insensitively) in its hash bucket, promoting
    /// it to the bucket head on a hit that wasn't already there (MRU).
    fn find_in_bucket(&mut self, name: &str) -> Option<EntryIndex> {
        let bucket = self.bucket_for(name);
        let mut prev: Option<EntryIndex> = None;
        let mut cur = self.buckets[bucket];
        while let Some(idx) = cur {
            if self.entries[idx].name.as_str().eq_ignore_ascii_case(name) {
                if let Some(p) = prev {
                    let next = self.entries[idx].hash_next;
                    self.entries[p].hash_next = next;
                    self.entries[idx].hash_next = self.buckets[bucket];
                    self.buckets[bucket] = Some(idx);
                }
                return Some(idx);
            }
            prev = Some(idx);
            cur = self.entries[idx].hash_next;
        }
        None
    }

    fn hash_insert(&mut self, idx: EntryIndex) {
        let bucket = self.bucket_for(self.entries[idx].name.as_str());
        self.entries[idx].hash_next = self.buckets[bucket];
        self.buckets[bucket] = Some(idx);
    }

    fn push_entry(&mut self, entry: Entry) -> EntryIndex {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    fn link_child(&mut self, parent: EntryIndex, child: EntryIndex) {
        let first_child = self.entries[parent].children;
        self.entries[child].sibling = first_child;
        self.entries[parent].children = Some(child);
    }

    /// Synthesizes any ancestor directories of `path` that aren't
    /// already present, reusing existing Directory entries.
    fn ensure_directory(&mut self, path: &Utf8Path) -> ZipResult<EntryIndex> {
        if path.as_str().is_empty() {
            return Ok(self.root);
        }
        if let Some(idx) = self.find_in_bucket(path.as_str()) {
            return if self.entries[idx].is_directory() {
                Ok(idx)
            } else {
                Err(ZipError::Corrupt(format!(
                    "{} exists as both a file and a directory",
                    path
                )))
            };
        }
        let parent_path = path.parent().unwrap_or_else(|| Utf8Path::new(""));
        let parent_idx = self.ensure_directory(parent_path)?;
        let idx = self.push_entry(Entry::synthesized_directory(
            path.to_path_buf(),
            Some(parent_idx),
        ));
        self.link_child(parent_idx, idx);
        self.hash_insert(idx);
        Ok(idx)
    }

    /// Inserts (or promotes a placeholder into) the leaf Entry for
    /// `built`, per §4.C5 step 7 / §4.C6's duplicate-vs-promotion rule.
    fn insert_leaf(&mut self, built: Entry) -> ZipResult<EntryIndex> {
        if let Some(existing) = self.find_in_bucket(built.name.as_str()) {
            if self.entries[existing].last_mod_time != 0 {
                return Err(ZipError::Corrupt(format!(
                    "duplicate entry name: {}",
                    built.name
                )));
            }
            self.entries[existing].overwrite_from(built);
            return Ok(existing);
        }
        let parent_path = built.name.parent().unwrap_or_else(|| Utf8Path::new(""));
        let parent_idx = self.ensure_directory(parent_path)?;
        let mut built = built;
        built.parent = Some(parent_idx);
        let idx = self.push_entry(built);
        self.link_child(parent_idx, idx);
        self.hash_insert(idx);
        Ok(idx)
    }

    // --- C5: central directory loader ---------------------------------

    fn load_central_directory(&mut self, location: &CdLocation) -> ZipResult<()> {
        let cd_bytes = read_at(
            self.source.as_mut(),
            location.central_dir_offset + self.data_start,
            usize_checked(location.central_dir_size)?,
        )?;
        let mut remaining: &[u8] = &cd_bytes;

        for _ in 0..location.entry_count {
            let cde = spec::CentralDirectoryEntry::parse_and_consume(&mut remaining)?;
            if cde.disk_number != 0 {
                return Err(ZipError::UnsupportedArchive(format!(
                    "multi-disk archives aren't supported (disk {})",
                    cde.disk_number
                )));
            }

            let fat_host = spec::host_is_fat(cde.version_made_by);
            let (name, is_directory) =
                spec::decode_path(cde.path, spec::is_utf8(cde.flags), fat_host)?;

            let uncompressed_max = cde.uncompressed_size == u32::MAX;
            let compressed_max = cde.compressed_size == u32::MAX;
            let offset_max = cde.header_offset == u32::MAX;
            let extra = spec::parse_extra_field(
                cde.extra_field,
                uncompressed_max,
                compressed_max,
                offset_max,
            )?;

            let uncompressed_size = extra
                .uncompressed_size
                .unwrap_or(cde.uncompressed_size as u64);
            let compressed_size = extra.compressed_size.unwrap_or(cde.compressed_size as u64);
            let header_offset = extra.header_offset.unwrap_or(cde.header_offset as u64);

            let (compression_method, aes) = match &extra.aes {
                Some(aes_extra) => {
                    if aes_extra.compression_method != 0 && aes_extra.compression_method != 8 {
                        return Err(ZipError::Corrupt(format!(
                            "unsupported compression method {} underlying AES entry {}",
                            aes_extra.compression_method, name
                        )));
                    }
                    let strength = AesStrength::from_u8(aes_extra.key_strength_code).ok_or_else(
                        || {
                            ZipError::Corrupt(format!(
                                "unrecognized AES key strength for entry {}",
                                name
                            ))
                        },
                    )?;
                    (
                        CompressionMethod::from_u16(aes_extra.compression_method),
                        Some(AesParams {
                            key_strength: strength,
                            vendor_version: aes_extra.vendor_version,
                            compression: aes_extra.compression_method,
                            salt: Vec::new(),
                            pass_verification: [0, 0],
                        }),
                    )
                }
                None => (CompressionMethod::from_u16(cde.compression_method), None),
            };

            let offset = header_offset + self.data_start;

            let resolution_state = if is_directory {
                ResolutionState::Directory
            } else if external_attrs_is_symlink(cde.external_file_attributes)
                && spec::host_supports_symlinks(cde.version_made_by)
            {
                ResolutionState::UnresolvedSymlink
            } else {
                ResolutionState::UnresolvedFile
            };

            let last_mod_time =
                spec::parse_msdos(cde.last_modified_time, cde.last_modified_date);

            let built = Entry {
                name,
                resolution_state,
                offset,
                version_made_by: cde.version_made_by,
                version_needed: cde.minimum_extract_version,
                general_bits: cde.flags,
                compression_method,
                crc32: cde.crc32,
                compressed_size,
                uncompressed_size,
                dos_mod_time: cde.last_modified_time,
                dos_mod_date: cde.last_modified_date,
                last_mod_time,
                aes,
                symlink_target: None,
                parent: None,
                children: None,
                sibling: None,
                hash_next: None,
            };

            if spec::is_encrypted(cde.flags) && built.aes.is_none() {
                self.has_crypto = true;
            }

            if is_directory {
                // An explicit directory record: synthesize/promote it
                // the same way ensure_directory would, so later files
                // under it attach to the same Entry.
                let parent_path = built.name.parent().unwrap_or_else(|| Utf8Path::new(""));
                if let Some(existing) = self.find_in_bucket(built.name.as_str()) {
                    if self.entries[existing].last_mod_time != 0 {
                        return Err(ZipError::Corrupt(format!(
                            "duplicate directory entry: {}",
                            built.name
                        )));
                    }
                    self.entries[existing].overwrite_from(built);
                } else {
                    let parent_idx = self.ensure_directory(parent_path)?;
                    let mut built = built;
                    built.parent = Some(parent_idx);
                    let idx = self.push_entry(built);
                    self.link_child(parent_idx, idx);
                    self.hash_insert(idx);
                }
            } else {
                self.insert_leaf(built)?;
            }
        }

        if !remaining.is_empty() {
            warn!(
                "{} trailing bytes after the declared central directory entries",
                remaining.len()
            );
        }

        Ok(())
    }
}

fn hash_name(name: &str) -> u64 {
    // FNV-1a over an ASCII-folded byte stream. Full Unicode case folding
    // is out of scope; archive paths are overwhelmingly ASCII in
    // practice, and ZIP itself only distinguishes UTF-8 vs CP437 names.
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in name.bytes() {
        h ^= b.to_ascii_lowercase() as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

fn usize_checked(v: u64) -> ZipResult<usize> {
    crate::arch::usize(v)
}

pub(crate) fn read_fully(source: &mut dyn ByteSource, buf: &mut [u8]) -> ZipResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read_at(&mut buf[filled..])?;
        if n == 0 {
            return Err(ZipError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "unexpected end of archive",
            )));
        }
        filled += n;
    }
    Ok(())
}

pub(crate) fn read_at(source: &mut dyn ByteSource, pos: u64, len: usize) -> ZipResult<Vec<u8>> {
    source.seek(SeekFrom::Start(pos))?;
    let mut buf = vec![0u8; len];
    read_fully(source, &mut buf)?;
    Ok(buf)
}

struct CdLocation {
    central_dir_offset: u64,
    central_dir_size: u64,
    entry_count: u64,
    data_start: u64,
    zip64: bool,
}

struct Zip64Info {
    entries: u64,
    central_directory_size: u64,
    central_directory_offset: u64,
}

fn try_parse_zip64_eocd(
    source: &mut dyn ByteSource,
    pos: u64,
    file_len: u64,
) -> ZipResult<Zip64Info> {
    if pos >= file_len {
        return Err(ZipError::InvalidArchive("Zip64 EOCD candidate past EOF"));
    }
    let window = 256usize.min((file_len - pos) as usize);
    if window < 4 {
        return Err(ZipError::InvalidArchive("Zip64 EOCD candidate too short"));
    }
    let buf = read_at(source, pos, window)?;
    if buf[..4] != [b'P', b'K', 6, 6] {
        return Err(ZipError::InvalidArchive(
            "Zip64 EOCD candidate has the wrong signature",
        ));
    }
    let z64 = spec::Zip64EndOfCentralDirectory::parse(&buf)?;
    Ok(Zip64Info {
        entries: z64.entries,
        central_directory_size: z64.central_directory_size,
        central_directory_offset: z64.central_directory_offset,
    })
}

/// §4.C4: find the EOCD (classic + Zip64), and compute `data_start`, the
/// number of bytes prepended ahead of the nominal archive (e.g. a
/// self-extracting stub).
fn locate_central_directory(
    source: &mut dyn ByteSource,
    options: &OpenOptions,
) -> ZipResult<CdLocation> {
    let file_len = source.length()?;
    let scan_len = options.max_comment_scan.min(file_len) as usize;
    let tail_start = file_len - scan_len as u64;
    let tail = read_at(source, tail_start, scan_len)?;
    let eocd_idx = spec::find_eocdr(&tail)?;
    let eocd_pos = tail_start + eocd_idx as u64;
    let eocd = spec::EndOfCentralDirectory::parse(&tail[eocd_idx..])?;

    let mut cd_offset = eocd.central_directory_offset as u64;
    let mut cd_size = eocd.central_directory_size as u64;
    let mut entry_count = eocd.entries as u64;
    let mut zip64 = false;
    let mut data_start = eocd_pos.saturating_sub(cd_offset + cd_size);

    if eocd_pos >= spec::Zip64EndOfCentralDirectoryLocator::size_in_file() as u64 {
        let locator_pos = eocd_pos - spec::Zip64EndOfCentralDirectoryLocator::size_in_file() as u64;
        let locator_bytes =
            read_at(source, locator_pos, spec::Zip64EndOfCentralDirectoryLocator::size_in_file())?;
        if let Some(locator) = spec::Zip64EndOfCentralDirectoryLocator::parse(&locator_bytes) {
            zip64 = true;

            let mut candidates = vec![locator.zip64_eocdr_offset];
            if eocd_pos >= 56 {
                candidates.push(eocd_pos - 56);
            }
            if eocd_pos >= 84 {
                candidates.push(eocd_pos - 84);
            }

            let mut found = None;
            for cand in candidates {
                if let Ok(z64) = try_parse_zip64_eocd(source, cand, file_len) {
                    found = Some((cand, z64));
                    break;
                }
            }

            if found.is_none() {
                let scan_window = options.max_prefix_scan.min(eocd_pos);
                let scan_start = eocd_pos - scan_window;
                let window_len = (eocd_pos - scan_start) as usize;
                let buf = read_at(source, scan_start, window_len)?;
                if let Some(idx) = memmem::rfind(&buf, b"PK\x06\x06") {
                    let cand = scan_start + idx as u64;
                    if let Ok(z64) = try_parse_zip64_eocd(source, cand, file_len) {
                        found = Some((cand, z64));
                    }
                }
            }

            let (actual_pos, z64) = found.ok_or(ZipError::InvalidArchive(
                "Couldn't locate Zip64 End Of Central Directory Record",
            ))?;
            data_start = actual_pos.saturating_sub(locator.zip64_eocdr_offset);
            cd_offset = z64.central_directory_offset;
            cd_size = z64.central_directory_size;
            entry_count = z64.entries;
        }
    }

    Ok(CdLocation {
        central_dir_offset: cd_offset,
        central_dir_size: cd_size,
        entry_count,
        data_start,
        zip64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceSource;

    #[test]
    fn hash_name_is_case_insensitive() {
        assert_eq!(hash_name("Hello/World.txt"), hash_name("hello/world.TXT"));
        assert_ne!(hash_name("a"), hash_name("b"));
    }

    #[test]
    fn empty_path_looks_up_the_root() {
        let archive = Archive::open(Box::new(SliceSource::new(minimal_zip())), OpenOptions::default())
            .expect("minimal archive should open");
        assert_eq!(archive.entries.len(), 2); // root + the one file
    }

    #[test]
    fn stat_and_open_read_round_trip_a_stored_entry() {
        let mut archive = Archive::open(Box::new(SliceSource::new(minimal_zip())), OpenOptions::default()).unwrap();
        let stat = archive.stat("hi.txt").unwrap();
        assert_eq!(stat.kind, EntryKind::Regular);
        assert_eq!(stat.uncompressed_size, 5);

        let mut reader = archive.open_read("hi.txt").unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn lookup_reports_no_such_file() {
        let mut archive = Archive::open(Box::new(SliceSource::new(minimal_zip())), OpenOptions::default()).unwrap();
        let err = archive.stat("nope.txt").unwrap_err();
        assert!(matches!(err, ZipError::NoSuchFile(_)));
    }

    /// Builds a tiny unencrypted, uncompressed single-entry Zip archive
    /// ("hi.txt" containing "hello") entirely in memory, for tests that
    /// need a real archive without shelling out to a zip tool.
    fn minimal_zip() -> Vec<u8> {
        let name = b"hi.txt";
        let data = b"hello";
        let crc = { let mut h = crc32fast::Hasher::new(); h.update(data); h.finalize() };

        let mut out = Vec::new();
        let local_header_offset = out.len() as u32;
        out.extend_from_slice(&[b'P', b'K', 3, 4]);
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&0u16.to_le_bytes()); // compression: stored
        out.extend_from_slice(&0u16.to_le_bytes()); // mod time
        out.extend_from_slice(&0u16.to_le_bytes()); // mod date
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        out.extend_from_slice(name);
        out.extend_from_slice(data);

        let central_dir_offset = out.len() as u32;
        out.extend_from_slice(&[b'P', b'K', 1, 2]);
        out.extend_from_slice(&(3u16 << 8 | 20).to_le_bytes()); // version made by: unix
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number
        out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        out.extend_from_slice(&((0o100644u32) << 16).to_le_bytes()); // external attrs
        out.extend_from_slice(&local_header_offset.to_le_bytes());
        out.extend_from_slice(name);
        let central_dir_size = (out.len() as u32) - central_dir_offset;

        out.extend_from_slice(&[b'P', b'K', 5, 6]);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&central_dir_size.to_le_bytes());
        out.extend_from_slice(&central_dir_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length

        out
    }
}
