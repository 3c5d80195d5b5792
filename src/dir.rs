// SPDX-License-Identifier: MPL-2.0

use static_assertions::const_assert;

use crate::fs::Ext2;
use crate::inode::{RawInode, MAX_FNAME_LEN};
use crate::prelude::*;

const_assert!(size_of::<DirEntryHeader>() == 8);

/// A directory entry header on device, followed by `name_len` name bytes.
///
/// `record_len` is the span the entry owns, padding included; the last
/// entry of a block owns the slack up to the block boundary, so the
/// record lengths of a directory always sum to its byte size.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub(crate) struct DirEntryHeader {
    /// Inode number of the entry; 0 marks an unused record.
    pub ino: u32,
    /// Span of the entry on disk, in bytes.
    pub record_len: u16,
    /// Length of the name in bytes.
    pub name_len: u8,
    /// File type tag. This engine leaves it 0 (unknown).
    pub file_type: u8,
}

/// A directory entry about to be linked, or read back from a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    ino: u32,
    name: String,
}

impl DirEntry {
    /// Builds an entry pointing `name` at the inode `ino`.
    pub fn new(ino: u32, name: &str) -> Result<Self> {
        if name.len() > MAX_FNAME_LEN {
            return Err(Error::NameTooLong);
        }
        Ok(Self {
            ino,
            name: String::from(name),
        })
    }

    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes the entry actually uses: the header plus the raw name.
    fn used_len(&self) -> u32 {
        (size_of::<DirEntryHeader>() + self.name.len()) as u32
    }
}

/// Directory entries are 4-byte aligned.
fn align_entry(offset: u32) -> u32 {
    (offset + 3) & !3
}

impl Ext2 {
    /// Reads the directory entry at `offset` within the directory's byte
    /// stream, returning it along with its on-disk record length.
    pub(crate) fn read_dir_entry(
        &self,
        dir_inode: &RawInode,
        offset: u32,
    ) -> Result<(DirEntry, u32)> {
        if !dir_inode.is_dir() {
            return Err(Error::NotDir);
        }

        let header = self.read_dir_entry_header(dir_inode, offset)?;
        let mut name_bytes = vec![0u8; header.name_len as usize];
        self.read_inode_data(
            dir_inode,
            offset + size_of::<DirEntryHeader>() as u32,
            &mut name_bytes,
        )?;

        let entry = DirEntry {
            ino: header.ino,
            name: String::from_utf8_lossy(&name_bytes).into_owned(),
        };
        Ok((entry, header.record_len as u32))
    }

    fn read_dir_entry_header(&self, dir_inode: &RawInode, offset: u32) -> Result<DirEntryHeader> {
        let mut header = DirEntryHeader::new_zeroed();
        self.read_inode_data(dir_inode, offset, header.as_mut_bytes())?;
        Ok(header)
    }

    /// Scans the directory for `name`, returning the inode it points at.
    pub(crate) fn locate_inode_in_dir(&self, dir_inode: &RawInode, name: &str) -> Result<u32> {
        let mut offset = 0;
        while offset < dir_inode.size {
            let (entry, record_len) = self.read_dir_entry(dir_inode, offset)?;
            if entry.ino != 0 && entry.name == name {
                return Ok(entry.ino);
            }
            if record_len == 0 {
                // A zero record length would loop forever; treat the rest
                // of the stream as unreadable.
                break;
            }
            offset += record_len;
        }
        Err(Error::NotFound)
    }

    /// Offset and header of the final entry, or `None` for a directory
    /// with no entries yet.
    fn last_dir_entry(&self, dir_inode: &RawInode) -> Result<Option<(u32, DirEntryHeader)>> {
        if dir_inode.size == 0 {
            return Ok(None);
        }
        let mut offset = 0;
        loop {
            let header = self.read_dir_entry_header(dir_inode, offset)?;
            if header.record_len == 0 {
                return Err(Error::NotFound);
            }
            let next = offset + header.record_len as u32;
            if next >= dir_inode.size {
                return Ok(Some((offset, header)));
            }
            offset = next;
        }
    }

    /// Appends `entry` to the directory.
    ///
    /// The new entry starts at the 4-byte-aligned end of the last entry's
    /// used bytes, or at the start of the next block if it would straddle a
    /// block boundary. Its record length runs to the end of its block (the
    /// slack is written out zeroed, which keeps the directory size
    /// block-aligned and the record-length sum exact), and the previous
    /// last entry's record length is cut back to end where the new entry
    /// begins.
    pub(crate) fn add_dir_entry(&mut self, dir_ino: u32, entry: &DirEntry) -> Result<()> {
        let dir_inode = self.read_inode(dir_ino)?;
        if !dir_inode.is_dir() {
            return Err(Error::NotDir);
        }

        let block_size = self.block_size();
        let Some((last_offset, last_header)) = self.last_dir_entry(&dir_inode)? else {
            self.write_entry_span(dir_ino, entry, 0, block_size)?;
            return Ok(());
        };

        let last_used_end =
            last_offset + (size_of::<DirEntryHeader>() + last_header.name_len as usize) as u32;
        let mut offset = align_entry(last_used_end);
        if offset / block_size != (offset + entry.used_len() - 1) / block_size {
            // No entry may span two blocks; push it to the next one.
            offset = (offset / block_size + 1) * block_size;
        }

        // The gap the previous entry used to own is dead bytes now.
        if offset > last_used_end {
            let pad = vec![0u8; (offset - last_used_end) as usize];
            self.write_data(dir_ino, last_used_end, &pad)?;
        }

        let block_end = (offset / block_size + 1) * block_size;
        self.write_entry_span(dir_ino, entry, offset, block_end - offset)?;

        let rewritten = DirEntryHeader {
            record_len: (offset - last_offset) as u16,
            ..last_header
        };
        self.write_data(dir_ino, last_offset, rewritten.as_bytes())?;
        Ok(())
    }

    /// Writes `entry` at `offset` owning `record_len` bytes, the unused
    /// tail zeroed.
    fn write_entry_span(
        &mut self,
        dir_ino: u32,
        entry: &DirEntry,
        offset: u32,
        record_len: u32,
    ) -> Result<()> {
        let header = DirEntryHeader {
            ino: entry.ino,
            record_len: record_len as u16,
            name_len: entry.name.len() as u8,
            file_type: 0,
        };
        let mut span = vec![0u8; record_len as usize];
        span[..size_of::<DirEntryHeader>()].copy_from_slice(header.as_bytes());
        span[size_of::<DirEntryHeader>()..entry.used_len() as usize]
            .copy_from_slice(entry.name.as_bytes());
        self.write_data(dir_ino, offset, &span)
    }

    /// Links the inode `ino` under `name` in the directory.
    ///
    /// The target's hard-link count is left alone.
    pub(crate) fn link(&mut self, dir_ino: u32, ino: u32, name: &str) -> Result<()> {
        let entry = DirEntry::new(ino, name)?;
        self.add_dir_entry(dir_ino, &entry)
    }
}
