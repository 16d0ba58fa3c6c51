//! The byte-source contract: a read-only, seekable, duplicable stream
//! supplied by the host. This is the one capability set the engine is
//! allowed to call through to reach archive bytes.
//!
//! Modeled as a trait rather than a fixed mmap-lifetime slice (the
//! teacher crate's original approach) so the engine can sit on top of a
//! plain `File`, a memory map, or an in-memory buffer without caring
//! which. `destroy()` from the source material is just `Drop` here.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;

/// A seekable, duplicable, read-only byte stream.
///
/// Implementors must make `duplicate()` produce an independent cursor:
/// seeking one copy must never affect another.
pub trait ByteSource: Send {
    fn read_at(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    fn tell(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::Current(0))
    }
    fn length(&mut self) -> io::Result<u64>;
    fn duplicate(&self) -> io::Result<Box<dyn ByteSource>>;
}

impl Read for dyn ByteSource + '_ {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_at(buf)
    }
}

impl Seek for dyn ByteSource + '_ {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        ByteSource::seek(self, pos)
    }
}

/// A `File`-backed byte source.
///
/// `try_clone`d file handles share the OS-level cursor with their
/// original, so reads here are always done positionally (`pread`/
/// `seek_read`) against an explicitly tracked `pos`, never through the
/// shared cursor. That's what makes `duplicate()` produce an
/// independent cursor as the trait requires: the clone gets its own
/// `pos`, and neither copy's reads ever move the other's.
pub struct FileSource {
    file: File,
    pos: u64,
}

impl FileSource {
    pub fn new(file: File) -> Self {
        Self { file, pos: 0 }
    }

    #[cfg(unix)]
    fn pread(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read_at(buf, self.pos)
    }

    #[cfg(windows)]
    fn pread(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek_read(buf, self.pos)
    }
}

impl ByteSource for FileSource {
    fn read_at(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.pread(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.file.metadata()?.len() as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    fn length(&mut self) -> io::Result<u64> {
        self.file.metadata().map(|m| m.len())
    }

    fn duplicate(&self) -> io::Result<Box<dyn ByteSource>> {
        Ok(Box::new(FileSource {
            file: self.file.try_clone()?,
            pos: self.pos,
        }))
    }
}

/// An in-memory byte source, for embedded archives or tests that would
/// rather not touch the filesystem.
#[derive(Clone)]
pub struct SliceSource {
    cursor: Cursor<Vec<u8>>,
}

impl SliceSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }
}

impl ByteSource for SliceSource {
    fn read_at(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(&mut self.cursor, pos)
    }

    fn length(&mut self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn duplicate(&self) -> io::Result<Box<dyn ByteSource>> {
        Ok(Box::new(self.clone()))
    }
}
