use crate::utils::error::{ProvisionError, Result};
use std::io::{self, Read};
use std::path::PathBuf;
use tar::EntryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    RegularFile,
    /// 符號連結、硬連結、裝置檔等，保留原始 typeflag 供日誌使用
    Other(u8),
}

impl From<EntryType> for EntryKind {
    fn from(entry_type: EntryType) -> Self {
        match entry_type {
            EntryType::Directory => EntryKind::Directory,
            EntryType::Regular | EntryType::Continuous => EntryKind::RegularFile,
            other => EntryKind::Other(other.as_byte()),
        }
    }
}

/// One archive entry, valid only until the reader advances.
///
/// `data` must be consumed (or dropped) before the next entry is requested;
/// the tar reader skips whatever is left.
pub struct ArchiveEntry<'a, R: 'a + Read> {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
    data: tar::Entry<'a, R>,
}

impl<'a, R: Read> ArchiveEntry<'a, R> {
    fn from_tar(entry: tar::Entry<'a, R>) -> Result<Self> {
        let header = entry.header();
        let kind = EntryKind::from(header.entry_type());
        let mode = header.mode().map_err(header_error)? & 0o7777;
        let size = entry.size();
        let path = entry.path().map_err(header_error)?.into_owned();

        Ok(Self {
            path,
            kind,
            mode,
            size,
            data: entry,
        })
    }
}

impl<'a, R: Read> Read for ArchiveEntry<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

fn header_error(err: io::Error) -> ProvisionError {
    ProvisionError::ArchiveFormatError {
        message: format!("invalid entry header: {}", err),
    }
}

/// 從解壓後的串流逐一讀出封存項目，不會把整個封存檔留在記憶體
pub struct ArchiveReader<R: Read> {
    archive: tar::Archive<R>,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            archive: tar::Archive::new(stream),
        }
    }

    /// Lazy, non-restartable sequence of entries.
    ///
    /// Errors are raw I/O errors so the caller can attribute them to the
    /// stage that produced them; a failure ends the sequence.
    pub fn entries(&mut self) -> io::Result<Entries<'_, R>> {
        Ok(Entries {
            inner: self.archive.entries()?,
            done: false,
        })
    }
}

pub struct Entries<'a, R: 'a + Read> {
    inner: tar::Entries<'a, R>,
    done: bool,
}

pub enum EntryError {
    Read(io::Error),
    Header(ProvisionError),
}

impl<'a, R: Read> Iterator for Entries<'a, R> {
    type Item = std::result::Result<ArchiveEntry<'a, R>, EntryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = match self.inner.next()? {
            Ok(entry) => ArchiveEntry::from_tar(entry).map_err(EntryError::Header),
            Err(e) => Err(EntryError::Read(e)),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}
