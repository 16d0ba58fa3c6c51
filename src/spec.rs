//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`archive`] and [`resolve`] modules.
//! (This pattern, like several others, was inspired by the Zip crate.)
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [_Zip Files: History, Explanation and Implementation_]
//! is also a fantastic resource and a great read.
//!
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT
//! [_Zip Files: History, Explanation and Implementation_]: https://www.hanshq.net/zip.html

use std::borrow::Cow;
use std::convert::TryInto;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use codepage_437::*;
use memchr::memmem;

use crate::arch::usize;
use crate::entry::{CompressionMethod, HostSystem};
use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// End of central directory magic number
const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Zip64 end of central directory magic number
const ZIP64_EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 6, 6];
/// Zip64 end of central directory locator magic number
const ZIP64_EOCDR_LOCATOR_MAGIC: [u8; 4] = [b'P', b'K', 6, 7];
/// Central directory magic number
const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Local file header magic number
const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];

/// Extra-field header ID for Zip64 extended information.
const ZIP64_EXTRA_ID: u16 = 0x0001;
/// Extra-field header ID for the WinZip AES extra data record.
const AES_EXTRA_ID: u16 = 0x9901;
/// Compression method sentinel that means "see the AES extra field".
pub const AES_COMPRESSION_SENTINEL: u16 = 99;

// Straight from the Rust docs:

/// Reads a little-endian u64 from the front of the provided slice, shrinking it.
pub fn read_u64(input: &mut &[u8]) -> u64 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u64>());
    *input = rest;
    u64::from_le_bytes(int_bytes.try_into().expect("less than eight bytes for u64"))
}

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
pub fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("less than four bytes for u32"))
}

/// Reads a little-endian u16 from the front of the provided slice, shrinking it.
pub fn read_u16(input: &mut &[u8]) -> u16 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u16>());
    *input = rest;
    u16::from_le_bytes(int_bytes.try_into().expect("less than two bytes for u16"))
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with lots of stuff that stopped being relevant
/// when we stopped breaking ZIP archives onto multiple floppies.
#[derive(Debug)]
pub struct EndOfCentralDirectory<'a> {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: &'a [u8],
}

impl<'a> EndOfCentralDirectory<'a> {
    pub fn parse(mut eocdr: &'a [u8]) -> ZipResult<Self> {
        // 4.3.16  End of central directory record: see APPNOTE.
        assert_eq!(eocdr[..4], EOCDR_MAGIC);
        eocdr = &eocdr[4..];
        let disk_number = read_u16(&mut eocdr);
        let disk_with_central_directory = read_u16(&mut eocdr);
        let entries_on_this_disk = read_u16(&mut eocdr);
        let entries = read_u16(&mut eocdr);
        let central_directory_size = read_u32(&mut eocdr);
        let central_directory_offset = read_u32(&mut eocdr);
        let comment_length = read_u16(&mut eocdr);
        let file_comment = &eocdr[..usize(comment_length)?];

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment,
        })
    }
}

/// Searches backward through `buf` to find the End of central directory
/// record.
pub fn find_eocdr(buf: &[u8]) -> ZipResult<usize> {
    memmem::rfind(buf, &EOCDR_MAGIC).ok_or(ZipError::InvalidArchive(
        "Couldn't find End Of Central Directory Record",
    ))
}

/// Data from the Zip64 end of central directory locator
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_central_directory: u32,
    pub zip64_eocdr_offset: u64,
    pub disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub fn parse(mut buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::size_in_file() || buf[..4] != ZIP64_EOCDR_LOCATOR_MAGIC {
            return None;
        }
        buf = &buf[4..];
        let disk_with_central_directory = read_u32(&mut buf);
        let zip64_eocdr_offset = read_u64(&mut buf);
        let disks = read_u32(&mut buf);

        Some(Self {
            disk_with_central_directory,
            zip64_eocdr_offset,
            disks,
        })
    }

    pub fn size_in_file() -> usize {
        20
    }
}

/// Data from the Zip64 end of central directory record
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectory<'a> {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub entries_on_this_disk: u64,
    pub entries: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
    pub extensible_data: &'a [u8],
}

impl<'a> Zip64EndOfCentralDirectory<'a> {
    pub fn parse(mut eocdr: &'a [u8]) -> ZipResult<Self> {
        assert_eq!(eocdr[..4], ZIP64_EOCDR_MAGIC);
        eocdr = &eocdr[4..];
        let eocdr_size = read_u64(&mut eocdr);
        let source_version = read_u16(&mut eocdr);
        let minimum_extract_version = read_u16(&mut eocdr);
        let disk_number = read_u32(&mut eocdr);
        let disk_with_central_directory = read_u32(&mut eocdr);
        let entries_on_this_disk = read_u64(&mut eocdr);
        let entries = read_u64(&mut eocdr);
        let central_directory_size = read_u64(&mut eocdr);
        let central_directory_offset = read_u64(&mut eocdr);

        // 4.3.14.1 The value stored into the "size of zip64 end of central
        // directory record" SHOULD NOT include the leading 12 bytes.
        let eocdr_size = usize(eocdr_size)?;
        if (eocdr_size + 12) < Self::fixed_size_in_file() {
            return Err(ZipError::InvalidArchive(
                "Invalid extensible data length in Zip64 End Of Central Directory Record",
            ));
        }
        // Callers may hand us a generously-sized window rather than the
        // exact record, so only require *at least* the declared amount of
        // trailing data rather than an exact match.
        let extensible_data_length = eocdr_size + 12 - Self::fixed_size_in_file();
        if eocdr.len() < extensible_data_length {
            return Err(ZipError::InvalidArchive(
                "Invalid extensible data length in Zip64 End Of Central Directory Record",
            ));
        }
        let extensible_data = &eocdr[..extensible_data_length];

        Ok(Self {
            source_version,
            minimum_extract_version,
            disk_number,
            disk_with_central_directory,
            entries,
            entries_on_this_disk,
            central_directory_size,
            central_directory_offset,
            extensible_data,
        })
    }

    pub fn fixed_size_in_file() -> usize {
        56
    }
}

/// Finds the Zip64 end of central directory record in the given slice.
pub fn find_zip64_eocdr(buf: &[u8]) -> ZipResult<usize> {
    memmem::find(buf, &ZIP64_EOCDR_MAGIC).ok_or(ZipError::InvalidArchive(
        "Couldn't find zip64 End Of Central Directory Record",
    ))
}

/// Data from a central directory entry
#[derive(Debug)]
pub struct CentralDirectoryEntry<'a> {
    pub version_made_by: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
    pub file_comment: &'a [u8],
}

impl<'a> CentralDirectoryEntry<'a> {
    pub fn parse_and_consume(entry: &mut &'a [u8]) -> ZipResult<Self> {
        // 4.3.12 Central directory structure / file header: see APPNOTE.
        if entry.len() < 4 || entry[..4] != CENTRAL_DIRECTORY_MAGIC {
            return Err(ZipError::InvalidArchive("Invalid central directory entry"));
        }
        *entry = &entry[4..];
        let version_made_by = read_u16(entry);
        let minimum_extract_version = read_u16(entry);
        let flags = read_u16(entry);
        let compression_method = read_u16(entry);
        let last_modified_time = read_u16(entry);
        let last_modified_date = read_u16(entry);
        let crc32 = read_u32(entry);
        let compressed_size = read_u32(entry);
        let uncompressed_size = read_u32(entry);
        let path_length = usize(read_u16(entry))?;
        let extra_field_length = usize(read_u16(entry))?;
        let file_comment_length = usize(read_u16(entry))?;
        let disk_number = read_u16(entry);
        let internal_file_attributes = read_u16(entry);
        let external_file_attributes = read_u32(entry);
        let header_offset = read_u32(entry);
        let (path, remaining) = entry.split_at(path_length);
        let (extra_field, remaining) = remaining.split_at(extra_field_length);
        let (file_comment, remaining) = remaining.split_at(file_comment_length);
        *entry = remaining;

        Ok(Self {
            version_made_by,
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            path,
            extra_field,
            file_comment,
        })
    }
}

/// Extracts the "is this text UTF-8?" bit from the 16-bit flags field.
///
/// If false, text is assumed to be CP437.
pub fn is_utf8(flags: u16) -> bool {
    // Bit 11: Language encoding flag (EFS).
    flags & (1 << 11) != 0
}

/// Extracts the "is this file encrypted?" bit from the 16-bit flags field.
pub fn is_encrypted(flags: u16) -> bool {
    flags & 1 != 0
}

/// Decodes a raw path per the UTF-8 flag, returning an owned path so
/// callers aren't tied to the input buffer's lifetime, plus whether the
/// on-disk name had a trailing slash (the Directory marker, stripped
/// from the returned path).
pub fn decode_path(raw: &[u8], utf8: bool, fat_host: bool) -> ZipResult<(Utf8PathBuf, bool)> {
    let decoded: Cow<str> = if utf8 {
        Cow::Borrowed(std::str::from_utf8(raw).map_err(ZipError::Encoding)?)
    } else {
        Cow::borrow_from_cp437(raw, &CP437_CONTROL)
    };
    let normalized = if fat_host && decoded.contains('\\') {
        Cow::Owned(decoded.replace('\\', "/"))
    } else {
        decoded
    };
    let is_directory = normalized.ends_with('/');
    let trimmed = normalized.trim_end_matches('/');
    Ok((Utf8Path::new(trimmed).to_path_buf(), is_directory))
}

pub fn parse_msdos(time: u16, date: u16) -> i64 {
    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // MSDOS uses 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    // MSDOS uses years since 1980; always interpreted as a positive value.
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)
        .and_then(|d| d.and_hms_opt(hours, minutes, seconds))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// The parts of the extra field we understand, applied on top of
/// whatever the fixed-size record already parsed.
#[derive(Debug, Default)]
pub struct ExtraFieldInfo {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub header_offset: Option<u64>,
    pub aes: Option<AesExtra>,
}

#[derive(Debug, Clone)]
pub struct AesExtra {
    pub vendor_version: u16,
    pub key_strength_code: u8,
    pub compression_method: u16,
}

/// Parses the "extra fields" found in central directory entries and
/// local file headers: Zip64 extended info (`0x0001`) and the WinZip
/// AES header (`0x9901`). Unknown records are skipped.
pub fn parse_extra_field(
    mut extra_field: &[u8],
    uncompressed_size_is_max: bool,
    compressed_size_is_max: bool,
    header_offset_is_max: bool,
) -> ZipResult<ExtraFieldInfo> {
    let mut info = ExtraFieldInfo::default();

    while extra_field.len() >= 4 {
        let kind = read_u16(&mut extra_field);
        let field_len = usize(read_u16(&mut extra_field))?;
        if extra_field.len() < field_len {
            return Err(ZipError::InvalidArchive("Truncated extra field"));
        }
        let (mut field, rest) = extra_field.split_at(field_len);
        extra_field = rest;

        match kind {
            ZIP64_EXTRA_ID => {
                if uncompressed_size_is_max && field.len() >= 8 {
                    info.uncompressed_size = Some(read_u64(&mut field));
                }
                if compressed_size_is_max && field.len() >= 8 {
                    info.compressed_size = Some(read_u64(&mut field));
                }
                if header_offset_is_max && field.len() >= 8 {
                    info.header_offset = Some(read_u64(&mut field));
                }
                // Starting-disk field (4 bytes) may follow; we've already
                // rejected multi-disk archives elsewhere, so it's ignored
                // here rather than re-validated.
            }
            AES_EXTRA_ID => {
                if field.len() < 7 {
                    return Err(ZipError::InvalidArchive("Truncated AES extra field"));
                }
                let vendor_version = read_u16(&mut field);
                let vendor_id = read_u16(&mut field);
                if vendor_id != u16::from_le_bytes(*b"AE") {
                    return Err(ZipError::Corrupt(
                        "AES extra field with unrecognized vendor id".into(),
                    ));
                }
                let key_strength_code = field[0];
                field = &field[1..];
                let compression_method = read_u16(&mut field);
                info.aes = Some(AesExtra {
                    vendor_version,
                    key_strength_code,
                    compression_method,
                });
            }
            _ => {}
        }
    }
    Ok(info)
}

/// Data from a local file header
#[derive(Debug)]
pub struct LocalFileHeader<'a> {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
}

impl<'a> LocalFileHeader<'a> {
    pub fn parse_and_consume(header: &mut &'a [u8]) -> ZipResult<Self> {
        if header.len() < 4 || header[..4] != LOCAL_FILE_HEADER_MAGIC {
            return Err(ZipError::Corrupt(
                "Local file header has the wrong signature".into(),
            ));
        }
        *header = &header[4..];
        let minimum_extract_version = read_u16(header);
        let flags = read_u16(header);
        let compression_method = read_u16(header);
        let last_modified_time = read_u16(header);
        let last_modified_date = read_u16(header);
        let crc32 = read_u32(header);
        let compressed_size = read_u32(header);
        let uncompressed_size = read_u32(header);
        let path_length = usize(read_u16(header))?;
        let extra_field_length = usize(read_u16(header))?;
        let (path, remaining) = header.split_at(path_length);
        let (extra_field, remaining) = remaining.split_at(extra_field_length);
        *header = remaining;

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            path,
            extra_field,
        })
    }

    /// Fixed-size portion of the header, before the name/extra field.
    pub const FIXED_SIZE: u64 = 30;
}

pub fn host_supports_symlinks(version_made_by: u16) -> bool {
    HostSystem::from_version_made_by(version_made_by).supports_symlinks()
}

pub fn host_is_fat(version_made_by: u16) -> bool {
    HostSystem::from_version_made_by(version_made_by).is_fat()
}
