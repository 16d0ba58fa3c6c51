//! Error types and the related `Result<T>`

use camino::Utf8PathBuf;
use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The ZIP archive contained invalid data per the spec.
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// The ZIP archive contained invalid data, with a dynamic message
    /// (duplicate names, bad signatures, disk mismatches, and the like).
    #[error("Corrupt Zip archive: {0}")]
    Corrupt(String),

    /// Decoding a UTF-8 name or comment failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The ZIP archive uses an unsupported feature
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// The ZIP archive is prepended some unknown bytes.
    /// (Use [`ZipArchive::with_prepended_data()`] if this is okay.)
    ///
    /// [`ZipArchive::with_prepended_data()`]: ../read/struct.ZipArchive.html#method.with_prepended_data
    #[error("Archive prepended with {0} unknown bytes")]
    PrependedWithUnknownBytes(usize),

    /// The ZIP archive contained a nonsensical file hierarchy
    /// (duplicate entries, bad paths, etc.)
    #[error("Archive contained strange a strange file hierarchy: {0}")]
    Hierarchy(String),

    /// A file wasn't found at the provided path
    #[error("No file in the archive with the path {0}")]
    NoSuchFile(Utf8PathBuf),

    /// A user-provided path (not one from a ZIP archive) was invalid.
    #[error("Invalid path")]
    InvalidPath(String),

    /// A cast from a 64-bit int to a usize failed while mapping the file,
    /// probably on a 32-bit system.
    ///
    /// Future work could include a version of the reader that uses multiple
    /// file streams instead of a memory map to work with large files in 32 bits.
    #[error("Zip archive too large for address space")]
    InsufficientAddressSpace,

    /// A declared size could not be allocated for without risking an abort
    /// on this target (see the `OutOfMemory` kind in the design notes).
    #[error("Declared size too large to allocate")]
    OutOfMemory,

    /// A seek or read went past the end of the uncompressed stream.
    #[error("Sought past end of file")]
    PastEof,

    /// Every write-shaped operation on this read-only engine.
    #[error("Archive is read-only")]
    ReadOnly,

    /// Classic or AES password verification failed.
    #[error("Incorrect password")]
    BadPassword,

    /// Following a symlink re-entered an entry still being resolved.
    #[error("Symlink loop detected")]
    SymlinkLoop,

    /// A recognized but deliberately unimplemented feature (e.g. a
    /// compression method other than Stored/Deflate, or a multi-disk
    /// archive).
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
