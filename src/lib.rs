//! zipvault is a read-only Zip archive engine built around lazy entry
//! resolution: opening an archive only parses its central directory, and
//! individual members (their local headers, symlink targets, and crypto
//! framing) are resolved the first time something asks to stat, list, or
//! read them.
//!
//! ```no_run
//! # use std::fs::File;
//! # use zipvault::{Archive, FileSource, OpenOptions};
//! let file = File::open("foo.zip")?;
//! let mut archive = Archive::open(Box::new(FileSource::new(file)), OpenOptions::default())?;
//!
//! let stat = archive.stat("some/specific/file")?;
//! let mut reader = archive.open_read("some/specific/file")?;
//! let mut buf = vec![0u8; stat.uncompressed_size as usize];
//! std::io::Read::read_exact(&mut reader, &mut buf)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Zip is an interesting archive format: unlike compressed tarballs often
//! seen in Linux land (`*.tar.gz`, `*.tar.zst`, ...), each file in a Zip
//! archive is compressed independently, with a central directory telling
//! us where to find each one. This lets us resolve and decompress members
//! on demand instead of paying for the whole archive up front.
//!
//! Archives may be password-protected with either the classic PKWARE
//! stream cipher (append `$password` to a path passed to [`Archive::lookup`],
//! [`Archive::stat`], or [`Archive::open_read`]) or WinZip AES (set the
//! password archive-wide via [`OpenOptions::aes_password`]).

pub mod config;
pub mod entry;
pub mod io;
pub mod result;

pub use archive::{Archive, DirEntry, EntryKind, Stat};
pub use config::OpenOptions;
pub use entry::{CompressionMethod, EntryIndex};
pub use io::{ByteSource, FileSource, SliceSource};
pub use result::{ZipError, ZipResult};
pub use stream::ReadStream;

mod arch;
mod archive;
mod crypto;
mod deflate;
mod resolve;
mod spec;
mod stream;
