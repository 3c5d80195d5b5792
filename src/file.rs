// SPDX-License-Identifier: MPL-2.0

use log::debug;

use crate::fs::Ext2;
use crate::inode::FileType;
use crate::prelude::*;

/// An open regular file: an inode number plus the current byte offset.
///
/// The handle is held by the caller between calls and is not persisted;
/// dropping it is all it takes to "close" the file.
#[derive(Clone, Debug)]
pub struct File {
    ino: u32,
    offset: u32,
}

impl File {
    pub fn ino(&self) -> u32 {
        self.ino
    }
}

/// An open directory: an inode number plus the current stream offset.
#[derive(Clone, Debug)]
pub struct Dir {
    ino: u32,
    offset: u32,
}

impl Dir {
    pub fn ino(&self) -> u32 {
        self.ino
    }
}

/// One record produced by [`Ext2::dir_read`]. Once the stream is
/// exhausted, every further read yields the end marker (inode 0, empty
/// name).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirRecord {
    pub ino: u32,
    pub name: String,
}

impl DirRecord {
    fn end_of_stream() -> Self {
        Self {
            ino: 0,
            name: String::new(),
        }
    }
}

impl Ext2 {
    /// Opens the regular file at `path`, creating and linking a fresh one
    /// when the final segment does not exist yet.
    pub fn file_open(&mut self, path: &str) -> Result<File> {
        let ino = match self.locate_inode(path) {
            Ok(ino) => {
                if self.read_inode(ino)?.is_dir() {
                    return Err(Error::NotFile);
                }
                ino
            }
            Err(Error::NotFound) => self.create_and_link_inode(path, FileType::File)?,
            Err(err) => return Err(err),
        };
        Ok(File { ino, offset: 0 })
    }

    /// Reads `buf.len()` bytes at the file's current offset, advancing it
    /// by the same amount.
    pub fn file_read(&self, file: &mut File, buf: &mut [u8]) -> Result<()> {
        self.read_data(file.ino, file.offset, buf)?;
        file.offset += buf.len() as u32;
        Ok(())
    }

    /// Writes `buf` at the file's current offset, advancing it by the same
    /// amount. The file grows as needed; it never shrinks.
    pub fn file_write(&mut self, file: &mut File, buf: &[u8]) -> Result<()> {
        self.write_data(file.ino, file.offset, buf)?;
        file.offset += buf.len() as u32;
        Ok(())
    }

    /// Moves the file offset. Seeking past the current end of the file is
    /// rejected.
    pub fn file_seek(&self, file: &mut File, offset: u32) -> Result<()> {
        if offset > self.read_inode(file.ino)?.size {
            return Err(Error::SeekOutOfBounds);
        }
        file.offset = offset;
        Ok(())
    }

    /// Returns the file's current offset.
    pub fn file_tell(&self, file: &File) -> u32 {
        file.offset
    }

    /// Opens the directory at `path`.
    pub fn dir_open(&self, path: &str) -> Result<Dir> {
        let ino = self.locate_inode(path)?;
        if !self.read_inode(ino)?.is_dir() {
            return Err(Error::NotDir);
        }
        Ok(Dir { ino, offset: 0 })
    }

    /// Reads the next directory entry, advancing the stream past it. At
    /// the end of the stream this returns the end marker, again and again,
    /// without error.
    pub fn dir_read(&self, dir: &mut Dir) -> Result<DirRecord> {
        let dir_inode = self.read_inode(dir.ino)?;
        if !dir_inode.is_dir() {
            return Err(Error::NotDir);
        }
        if dir.offset >= dir_inode.size {
            return Ok(DirRecord::end_of_stream());
        }

        let (entry, record_len) = self.read_dir_entry(&dir_inode, dir.offset)?;
        dir.offset += record_len;
        Ok(DirRecord {
            ino: entry.ino(),
            name: String::from(entry.name()),
        })
    }

    /// Moves the directory stream offset.
    ///
    /// Only offsets previously returned by [`Self::dir_tell`] land on an
    /// entry boundary; anything else makes later reads decode garbage.
    pub fn dir_seek(&self, dir: &mut Dir, offset: u32) -> Result<()> {
        if offset > self.read_inode(dir.ino)?.size {
            return Err(Error::SeekOutOfBounds);
        }
        dir.offset = offset;
        Ok(())
    }

    /// Returns the directory stream's current offset.
    pub fn dir_tell(&self, dir: &Dir) -> u32 {
        dir.offset
    }

    /// Creates the directory at `path` and populates its `.` and `..`
    /// entries with its own and its parent's inode.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let (parent_ino, _) = self.locate_parent_inode(path)?;
        let ino = self.create_and_link_inode(path, FileType::Dir)?;
        self.link(ino, ino, ".")?;
        self.link(ino, parent_ino, "..")?;
        debug!("ext2: mkdir {:?} -> inode {}", path, ino);
        Ok(())
    }
}
