//! The lazy resolver (§4.C7): parses a member's local file header on
//! first access, validates it against the central directory record that
//! was already trusted, advances the Entry's offset past whatever
//! header/crypto framing precedes the real data, and — for symlinks —
//! follows the link to its eventual non-symlink target.
//!
//! This is the one place besides `archive::load_central_directory` that
//! touches the archive's own byte source; per the concurrency model,
//! callers are expected to serialize resolution the same way they'd
//! serialize any other mutation of shared state.

use camino::{Utf8Path, Utf8PathBuf};
use log::{trace, warn};

use crate::arch::usize as checked_usize;
use crate::archive::{read_at, Archive};
use crate::entry::{AesParams, CompressionMethod, EntryIndex, ResolutionState};
use crate::result::{ZipError, ZipResult};
use crate::spec;

/// Entry point used by `Archive::{stat,enumerate,open_read}`: resolves
/// `idx` in place, a no-op if already resolved.
pub fn resolve(archive: &mut Archive, idx: EntryIndex) -> ZipResult<()> {
    match archive.entry(idx).resolution_state {
        ResolutionState::Directory | ResolutionState::Resolved => return Ok(()),
        ResolutionState::BrokenFile | ResolutionState::BrokenSymlink => {
            return Err(ZipError::Corrupt(format!(
                "{} failed to resolve previously",
                archive.entry(idx).name
            )));
        }
        ResolutionState::Resolving => return Err(ZipError::SymlinkLoop),
        ResolutionState::UnresolvedFile | ResolutionState::UnresolvedSymlink => {}
    }

    let was_symlink = archive.entry(idx).resolution_state == ResolutionState::UnresolvedSymlink;
    archive.entry_mut(idx).resolution_state = ResolutionState::Resolving;

    match resolve_header_and_target(archive, idx, was_symlink) {
        Ok(()) => {
            archive.entry_mut(idx).resolution_state = ResolutionState::Resolved;
            trace!("resolved {}", archive.entry(idx).name);
            Ok(())
        }
        Err(e) => {
            archive.entry_mut(idx).resolution_state = if was_symlink {
                ResolutionState::BrokenSymlink
            } else {
                ResolutionState::BrokenFile
            };
            Err(e)
        }
    }
}

fn resolve_header_and_target(
    archive: &mut Archive,
    idx: EntryIndex,
    was_symlink: bool,
) -> ZipResult<()> {
    let local_header_offset = archive.entry(idx).offset;
    let (mut data_offset, local_extra_compression) =
        parse_local_header(archive, idx, local_header_offset)?;

    if let Some(aes) = archive.entry(idx).aes.clone() {
        if let Some(local_compression) = local_extra_compression {
            if local_compression != aes.compression {
                return Err(ZipError::Corrupt(format!(
                    "{}: local header AES extra field disagrees with central directory on the underlying compression method",
                    archive.entry(idx).name
                )));
            }
        }
        let salt_len = aes.key_strength.salt_len();
        let mut salt = vec![0u8; salt_len];
        read_exact_at(archive, data_offset, &mut salt)?;
        data_offset += salt_len as u64;
        let mut verifier = [0u8; 2];
        read_exact_at(archive, data_offset, &mut verifier)?;
        data_offset += 2;

        archive.entry_mut(idx).aes = Some(AesParams {
            salt,
            pass_verification: verifier,
            ..aes
        });
    }

    archive.entry_mut(idx).offset = data_offset;

    if was_symlink {
        let target = follow_symlink(archive, idx)?;
        archive.entry_mut(idx).symlink_target = Some(target);
    }

    Ok(())
}



/// Parses the local file header at `offset`, validates it against the
/// entry's already-trusted central-directory fields, and returns the
/// offset of the first byte after the header (and name/extra field),
/// plus the compression method the *local* AES extra field claims (if
/// any), for the caller to cross-check against the central one.
fn parse_local_header(
    archive: &mut Archive,
    idx: EntryIndex,
    offset: u64,
) -> ZipResult<(u64, Option<u16>)> {
    const FIXED_SIZE: usize = 30;
    let mut fixed = [0u8; FIXED_SIZE];
    read_exact_at(archive, offset, &mut fixed)?;

    let path_length = u16::from_le_bytes([fixed[26], fixed[27]]) as usize;
    let extra_field_length = u16::from_le_bytes([fixed[28], fixed[29]]) as usize;

    let mut rest = vec![0u8; path_length + extra_field_length];
    read_exact_at(archive, offset + FIXED_SIZE as u64, &mut rest)?;

    let mut whole = Vec::with_capacity(FIXED_SIZE + rest.len());
    whole.extend_from_slice(&fixed);
    whole.extend_from_slice(&rest);
    let mut slice: &[u8] = &whole;
    let header = spec::LocalFileHeader::parse_and_consume(&mut slice)?;

    let entry = archive.entry(idx);

    // Matches the teacher crate's opt-out: some encoders write local
    // headers too sloppily to trust byte-for-byte against the central
    // directory, so the cross-check can be disabled at compile time.
    if cfg!(feature = "check-local-metadata") {
        if header.minimum_extract_version != entry.version_needed {
            return Err(ZipError::Corrupt(format!(
                "{}: local header's extraction version disagrees with the central directory",
                entry.name
            )));
        }
        check_tolerant(header.crc32 as u64, entry.crc32 as u64, &entry.name, "CRC-32")?;
        check_tolerant(
            header.compressed_size as u64,
            entry.compressed_size,
            &entry.name,
            "compressed size",
        )?;
        check_tolerant(
            header.uncompressed_size as u64,
            entry.uncompressed_size,
            &entry.name,
            "uncompressed size",
        )?;
    }

    let local_aes_compression = if entry.aes.is_some() {
        let extra = spec::parse_extra_field(header.extra_field, false, false, false)?;
        extra.aes.map(|a| a.compression_method)
    } else {
        None
    };

    let data_offset = offset + FIXED_SIZE as u64 + path_length as u64 + extra_field_length as u64;
    Ok((data_offset, local_aes_compression))
}

/// Local vs. central fields are allowed to disagree when the local one
/// is the documented "filled in later via a data descriptor" sentinel:
/// zero (JAR convention for CRC) or all-ones (the classic ZIP64
/// placeholder).
fn check_tolerant(local: u64, central: u64, name: &Utf8Path, what: &str) -> ZipResult<()> {
    if local == central {
        Ok(())
    } else if local == 0 || local == u32::MAX as u64 {
        warn!(
            "{name}: local header {what} ({local}) disagrees with the central directory \
             ({central}), tolerating it as a deferred-to-data-descriptor placeholder"
        );
        Ok(())
    } else {
        Err(ZipError::Corrupt(format!(
            "{name}: local header {what} ({local}) disagrees with the central directory ({central})"
        )))
    }
}

fn read_exact_at(archive: &mut Archive, offset: u64, buf: &mut [u8]) -> ZipResult<()> {
    let bytes = read_at(archive.source_mut(), offset, buf.len())?;
    buf.copy_from_slice(&bytes);
    Ok(())
}

/// Reads and follows a symlink's target, recursively resolving it, and
/// returns the index of its eventual non-symlink target. Failure here is
/// turned into `BrokenSymlink` by the caller (`resolve`), which already
/// distinguishes symlinks from plain files via `was_symlink`.
fn follow_symlink(archive: &mut Archive, idx: EntryIndex) -> ZipResult<EntryIndex> {
    let entry = archive.entry(idx);
    let offset = entry.offset;
    let compression = entry.compression_method;
    let uncompressed_size = checked_usize(entry.uncompressed_size)?;
    let compressed_size = checked_usize(entry.compressed_size)?;
    let fat_host = spec::host_is_fat(entry.version_made_by);
    let parent_dir = entry
        .name
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(Utf8PathBuf::new);

    let raw_target = match compression {
        CompressionMethod::None => {
            let mut buf = vec![0u8; uncompressed_size];
            read_exact_at(archive, offset, &mut buf)?;
            buf
        }
        CompressionMethod::Deflate => {
            let mut compressed = vec![0u8; compressed_size];
            read_exact_at(archive, offset, &mut compressed)?;
            inflate_all(&compressed, uncompressed_size)?
        }
        CompressionMethod::Unsupported(code) => {
            return Err(ZipError::Unsupported(format!(
                "symlink target compressed with unsupported method {code}"
            )));
        }
    };

    let raw_target = std::str::from_utf8(&raw_target)
        .map_err(ZipError::Encoding)?
        .to_string();

    let normalized = normalize_symlink_target(&parent_dir, &raw_target, fat_host);
    if normalized.as_str().is_empty() {
        return Err(ZipError::NoSuchFile(Utf8PathBuf::from(raw_target)));
    }

    let target_idx = archive
        .find_by_name_for_resolve(normalized.as_str())
        .ok_or_else(|| ZipError::NoSuchFile(normalized.clone()))?;

    resolve(archive, target_idx)?;
    let final_idx = archive
        .entry(target_idx)
        .symlink_target
        .unwrap_or(target_idx);
    Ok(final_idx)
}

fn inflate_all(compressed: &[u8], uncompressed_size: usize) -> ZipResult<Vec<u8>> {
    use crate::deflate::DeflateAdapter;
    let mut out = vec![0u8; uncompressed_size];
    let mut decoder = DeflateAdapter::new();
    let (_, produced, _) = decoder.decompress(compressed, &mut out)?;
    out.truncate(produced);
    Ok(out)
}

/// Resolves `raw_target` relative to `entry_dir`: backslash-to-slash
/// translation for FAT-made archives, then component-wise `.`/`..`
/// collapsing. An absolute target (leading `/`) starts from the archive
/// root instead of `entry_dir`. A `..` that would ascend past the root
/// empties the whole result, which the caller turns into `NotFound`.
fn normalize_symlink_target(entry_dir: &Utf8Path, raw_target: &str, fat_host: bool) -> Utf8PathBuf {
    let translated;
    let target = if fat_host && raw_target.contains('\\') {
        translated = raw_target.replace('\\', "/");
        translated.as_str()
    } else {
        raw_target
    };

    let mut stack: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        entry_dir
            .as_str()
            .split('/')
            .filter(|c| !c.is_empty())
            .collect()
    };

    let mut ascend_failed = false;
    for component in target.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                if stack.pop().is_none() {
                    ascend_failed = true;
                    break;
                }
            }
            other => stack.push(other),
        }
    }

    if ascend_failed {
        return Utf8PathBuf::new();
    }
    Utf8PathBuf::from(stack.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_target_resolves_against_parent_dir() {
        let dir = Utf8Path::new("a/b");
        assert_eq!(normalize_symlink_target(dir, "c.txt", false), Utf8PathBuf::from("a/b/c.txt"));
    }

    #[test]
    fn dotdot_ascends_out_of_parent_dir() {
        let dir = Utf8Path::new("a/b");
        assert_eq!(normalize_symlink_target(dir, "../c.txt", false), Utf8PathBuf::from("a/c.txt"));
    }

    #[test]
    fn absolute_target_ignores_parent_dir() {
        let dir = Utf8Path::new("a/b");
        assert_eq!(normalize_symlink_target(dir, "/x/y", false), Utf8PathBuf::from("x/y"));
    }

    #[test]
    fn ascending_past_root_is_empty() {
        let dir = Utf8Path::new("a");
        assert_eq!(normalize_symlink_target(dir, "../../nope", false), Utf8PathBuf::new());
    }

    #[test]
    fn fat_hosts_translate_backslashes() {
        let dir = Utf8Path::new("");
        assert_eq!(
            normalize_symlink_target(dir, "sub\\file.txt", true),
            Utf8PathBuf::from("sub/file.txt")
        );
    }

    #[test]
    fn non_fat_hosts_leave_backslashes_alone() {
        let dir = Utf8Path::new("");
        assert_eq!(
            normalize_symlink_target(dir, "odd\\name", false),
            Utf8PathBuf::from("odd\\name")
        );
    }

    #[test]
    fn dot_components_collapse() {
        let dir = Utf8Path::new("a/b");
        assert_eq!(normalize_symlink_target(dir, "./c/./d", false), Utf8PathBuf::from("a/b/c/d"));
    }
}
