//! The Entry arena: one slot per archive member (file, directory, or
//! synthesized ancestor directory), linked by index rather than pointer.
//!
//! Rust has no implicit shared ownership for the tree/hash/symlink
//! cross-links the original format wants, so the `Archive` is the single
//! owner of a `Vec<Entry>` and every cross-link is an `Option<usize>`
//! index into it.

use camino::Utf8PathBuf;

use crate::crypto::AesStrength;

pub type EntryIndex = usize;

/// The compression method used to store a file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed.
    None,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::None,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }
}

/// Where an Entry stands in the one-way lazy-resolution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    UnresolvedFile,
    UnresolvedSymlink,
    /// Transient sentinel: set while resolving, cleared to `Resolved` or
    /// a `Broken*` state. Re-entering this state mid-resolution is how
    /// symlink cycles are detected.
    Resolving,
    Resolved,
    /// Set at load time; directories never go through resolution.
    Directory,
    BrokenFile,
    BrokenSymlink,
}

/// Parsed WinZip AES parameters for an entry, prior to key derivation.
#[derive(Debug, Clone)]
pub struct AesParams {
    pub key_strength: AesStrength,
    pub vendor_version: u16,
    /// The compression method the AES wrapper claims underlies it; must
    /// match between central and local headers (see the design notes on
    /// the source's comparison bug).
    pub compression: u16,
    /// Filled in during resolution, once the salt + verifier are read
    /// from just after the local header.
    pub salt: Vec<u8>,
    pub pass_verification: [u8; 2],
}

/// One member of the archive: a real file, a directory (explicit or
/// synthesized), or a symlink.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: Utf8PathBuf,
    pub resolution_state: ResolutionState,
    /// Before resolution: the local file header's offset. After
    /// resolution: the first byte of member data.
    pub offset: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub general_bits: u16,
    pub compression_method: CompressionMethod,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub dos_mod_time: u16,
    pub dos_mod_date: u16,
    pub last_mod_time: i64,
    pub aes: Option<AesParams>,

    pub symlink_target: Option<EntryIndex>,
    pub parent: Option<EntryIndex>,
    pub children: Option<EntryIndex>,
    pub sibling: Option<EntryIndex>,
    pub hash_next: Option<EntryIndex>,
}

impl Entry {
    /// The synthesized root directory, index 0 in every archive's arena.
    pub fn root() -> Self {
        Entry {
            name: Utf8PathBuf::new(),
            resolution_state: ResolutionState::Directory,
            offset: 0,
            version_made_by: 0,
            version_needed: 0,
            general_bits: 0,
            compression_method: CompressionMethod::None,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            dos_mod_time: 0,
            dos_mod_date: 0,
            last_mod_time: 0,
            aes: None,
            symlink_target: None,
            parent: None,
            children: None,
            sibling: None,
            hash_next: None,
        }
    }

    /// A directory with no central directory record of its own, implied
    /// by a file or directory entry nested beneath it.
    pub fn synthesized_directory(name: Utf8PathBuf, parent: Option<EntryIndex>) -> Self {
        Entry {
            name,
            resolution_state: ResolutionState::Directory,
            offset: 0,
            version_made_by: 0,
            version_needed: 0,
            general_bits: 0,
            compression_method: CompressionMethod::None,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            dos_mod_time: 0,
            dos_mod_date: 0,
            last_mod_time: 0,
            aes: None,
            symlink_target: None,
            parent,
            children: None,
            sibling: None,
            hash_next: None,
        }
    }

    /// Copies real archive data into a placeholder entry (one created by
    /// `ensure_directory` before its own central directory record was
    /// seen), preserving the tree position already established.
    pub fn overwrite_from(&mut self, other: Entry) {
        self.resolution_state = other.resolution_state;
        self.offset = other.offset;
        self.version_made_by = other.version_made_by;
        self.version_needed = other.version_needed;
        self.general_bits = other.general_bits;
        self.compression_method = other.compression_method;
        self.crc32 = other.crc32;
        self.compressed_size = other.compressed_size;
        self.uncompressed_size = other.uncompressed_size;
        self.dos_mod_time = other.dos_mod_time;
        self.dos_mod_date = other.dos_mod_date;
        self.last_mod_time = other.last_mod_time;
        self.aes = other.aes;
        self.symlink_target = other.symlink_target;
    }

    pub fn is_directory(&self) -> bool {
        self.resolution_state == ResolutionState::Directory
    }

    pub fn is_symlink(&self) -> bool {
        matches!(
            self.resolution_state,
            ResolutionState::UnresolvedSymlink | ResolutionState::BrokenSymlink
        ) || self.symlink_target.is_some()
    }

    pub fn is_encrypted(&self) -> bool {
        self.general_bits & 1 != 0
    }

    pub fn is_classic_encrypted(&self) -> bool {
        self.is_encrypted() && self.aes.is_none()
    }
}

/// Host system recorded in `version_made_by`'s upper byte. Drives both
/// the FAT backslash-to-slash translation and whether a UNIX-mode
/// external attribute should be trusted as a symlink indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSystem {
    Fat,
    Amiga,
    Vms,
    VmCms,
    Hpfs,
    Ntfs,
    Vfat,
    Acorn,
    Mvs,
    Theos,
    Unix,
    Other,
}

impl HostSystem {
    pub fn from_version_made_by(version_made_by: u16) -> Self {
        match version_made_by >> 8 {
            0 => HostSystem::Fat,
            1 => HostSystem::Amiga,
            2 => HostSystem::Vms,
            3 => HostSystem::Unix,
            4 => HostSystem::VmCms,
            6 => HostSystem::Hpfs,
            10 => HostSystem::Ntfs,
            11 => HostSystem::Mvs,
            13 => HostSystem::Acorn,
            14 => HostSystem::Vfat,
            19 => HostSystem::Theos,
            _ => HostSystem::Other,
        }
    }

    pub fn is_fat(self) -> bool {
        self == HostSystem::Fat
    }

    /// Hosts for which a UNIX-mode external attribute (file type bits)
    /// is meaningless and must not be trusted to mean "this is a
    /// symlink" — mirrors `zip_version_does_symlinks`.
    pub fn supports_symlinks(self) -> bool {
        !matches!(
            self,
            HostSystem::Fat
                | HostSystem::Amiga
                | HostSystem::Vms
                | HostSystem::VmCms
                | HostSystem::Hpfs
                | HostSystem::Ntfs
                | HostSystem::Vfat
                | HostSystem::Acorn
                | HostSystem::Mvs
                | HostSystem::Theos
        )
    }
}

/// The UNIX file-type bits (`S_IFMT`) for a symlink, as packed into the
/// high 16 bits of `external_file_attributes`.
pub const UNIX_SYMLINK_MODE: u32 = 0o120000;

pub fn external_attrs_is_symlink(external_file_attributes: u32) -> bool {
    let mode = external_file_attributes >> 16;
    (mode & 0o170000) == UNIX_SYMLINK_MODE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_system_decodes_the_upper_byte_of_version_made_by() {
        assert_eq!(HostSystem::from_version_made_by(0x0014), HostSystem::Fat);
        assert_eq!(HostSystem::from_version_made_by(0x0314), HostSystem::Unix);
        assert_eq!(HostSystem::from_version_made_by(0x0a14), HostSystem::Ntfs);
    }

    #[test]
    fn fat_and_related_hosts_dont_support_symlinks() {
        assert!(!HostSystem::Fat.supports_symlinks());
        assert!(!HostSystem::Vfat.supports_symlinks());
        assert!(HostSystem::Unix.supports_symlinks());
    }

    #[test]
    fn external_attrs_symlink_bit_is_s_iflnk() {
        let symlink_mode: u32 = 0o120777;
        let regular_mode: u32 = 0o100644;
        assert!(external_attrs_is_symlink(symlink_mode << 16));
        assert!(!external_attrs_is_symlink(regular_mode << 16));
    }

    #[test]
    fn is_symlink_recognizes_unresolved_and_broken_states() {
        let mut e = Entry::root();
        e.resolution_state = ResolutionState::UnresolvedSymlink;
        assert!(e.is_symlink());
        e.resolution_state = ResolutionState::BrokenSymlink;
        assert!(e.is_symlink());
        e.resolution_state = ResolutionState::UnresolvedFile;
        assert!(!e.is_symlink());
    }

    #[test]
    fn is_classic_encrypted_requires_encryption_without_aes() {
        let mut e = Entry::root();
        e.general_bits = 1;
        assert!(e.is_classic_encrypted());
        e.aes = Some(AesParams {
            key_strength: AesStrength::Aes128,
            vendor_version: 2,
            compression: 8,
            salt: Vec::new(),
            pass_verification: [0, 0],
        });
        assert!(!e.is_classic_encrypted());
        assert!(e.is_encrypted());
    }
}
