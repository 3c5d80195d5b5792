// SPDX-License-Identifier: MPL-2.0

use bitflags::bitflags;
use log::trace;
use static_assertions::const_assert;

use crate::block_ptr::{BidPath, BID_SIZE, BLOCK_PTR_CNT};
use crate::fs::Ext2;
use crate::prelude::*;

/// Max length of a file name.
pub const MAX_FNAME_LEN: usize = 255;

const_assert!(size_of::<RawInode>() == 128);

/// The inode on device.
///
/// It describes one file, directory or other object: all of its metadata
/// except the name, plus the pointers to the blocks holding its data.
/// Each block group stores an array of these records (its inode table).
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawInode {
    /// File mode (type and permissions).
    pub mode: u16,
    /// User id.
    pub uid: u16,
    /// Size in bytes.
    pub size: u32,
    /// Access time.
    pub atime: u32,
    /// Creation time.
    pub ctime: u32,
    /// Modification time.
    pub mtime: u32,
    /// Deletion time.
    pub dtime: u32,
    /// Group id.
    pub gid: u16,
    /// Hard links count.
    pub hard_links: u16,
    /// Count of 512-byte sectors in use.
    pub blocks_count: u32,
    /// File flags.
    pub flags: u32,
    reserved1: u32,
    /// Pointers to blocks: slots 0-11 are direct, 12 single indirect,
    /// 13 double indirect, 14 triple indirect. 0 marks a hole.
    pub block: [u32; BLOCK_PTR_CNT],
    /// File version (for NFS).
    pub generation: u32,
    /// File ACL block.
    pub file_acl: u32,
    /// Directory ACL block.
    pub dir_acl: u32,
    /// Fragment address.
    pub frag_addr: u32,
    os_dependent_2: [u32; 3],
}

impl RawInode {
    pub fn new(file_type: FileType, perm: FilePerm) -> Self {
        let mut inode = Self::new_zeroed();
        inode.mode = file_type as u16 | perm.bits();
        inode.hard_links = 1;
        inode
    }

    pub fn is_dir(&self) -> bool {
        (self.mode & FILE_TYPE_MASK) == FileType::Dir as u16
    }

    pub fn is_file(&self) -> bool {
        (self.mode & FILE_TYPE_MASK) == FileType::File as u16
    }

    /// Number of blocks the file's byte size spans, the last partial block
    /// included.
    pub(crate) fn allocated_blocks(&self, block_size: u32) -> u32 {
        self.size.div_ceil(block_size)
    }
}

const FILE_TYPE_MASK: u16 = 0o170000;

/// Type of an inode, as encoded in the high bits of its mode.
#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FileType {
    /// FIFO special file
    Fifo = 0o010000,
    /// Character device
    Char = 0o020000,
    /// Directory
    Dir = 0o040000,
    /// Block device
    Block = 0o060000,
    /// Regular file
    File = 0o100000,
    /// Symbolic link
    Symlink = 0o120000,
    /// Socket
    Socket = 0o140000,
}

bitflags! {
    /// Permission bits of an inode's mode.
    pub struct FilePerm: u16 {
        /// set-user-ID
        const S_ISUID = 0o4000;
        /// set-group-ID
        const S_ISGID = 0o2000;
        /// sticky bit
        const S_ISVTX = 0o1000;
        /// read by owner
        const S_IRUSR = 0o0400;
        /// write by owner
        const S_IWUSR = 0o0200;
        /// execute/search by owner
        const S_IXUSR = 0o0100;
        /// read by group
        const S_IRGRP = 0o0040;
        /// write by group
        const S_IWGRP = 0o0020;
        /// execute/search by group
        const S_IXGRP = 0o0010;
        /// read by others
        const S_IROTH = 0o0004;
        /// write by others
        const S_IWOTH = 0o0002;
        /// execute/search by others
        const S_IXOTH = 0o0001;
    }
}

impl Ext2 {
    /// Maps a byte offset within the file to the physical block holding it.
    ///
    /// Walks the indirection chain derived from the offset; a zero pointer
    /// anywhere along the chain means the whole subtree is a hole, so the
    /// walk stops early and reports block 0.
    pub(crate) fn block_map(&self, inode: &RawInode, offset: u32) -> Result<u32> {
        let block_size = self.block_size();
        let file_bid = offset / block_size;

        let path = BidPath::new(file_bid, block_size / BID_SIZE);
        match path {
            BidPath::Direct(idx) => Ok(inode.block[idx as usize]),
            BidPath::Indirect(idx) => {
                let ind = inode.block[path.root_slot()];
                self.read_block_ptr(ind, idx)
            }
            BidPath::DbIndirect(l1, l2) => {
                let ind = inode.block[path.root_slot()];
                let ind = self.read_block_ptr(ind, l1)?;
                self.read_block_ptr(ind, l2)
            }
            BidPath::TbIndirect(l1, l2, l3) => {
                let ind = inode.block[path.root_slot()];
                let ind = self.read_block_ptr(ind, l1)?;
                let ind = self.read_block_ptr(ind, l2)?;
                self.read_block_ptr(ind, l3)
            }
        }
    }

    /// Reads the 4-byte pointer at `idx` inside the indirect block `block`.
    /// Block 0 is the hole marker, so its "pointers" are all zero as well.
    fn read_block_ptr(&self, block: u32, idx: u32) -> Result<u32> {
        if block == 0 {
            return Ok(0);
        }
        let mut bytes = [0u8; BID_SIZE as usize];
        self.read_bytes(block * self.block_size() + idx * BID_SIZE, &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn write_block_ptr(&self, block: u32, idx: u32, value: u32) -> Result<()> {
        self.write_bytes(
            block * self.block_size() + idx * BID_SIZE,
            &value.to_le_bytes(),
        )
    }

    fn zero_block(&self, block: u32) -> Result<()> {
        let zeroes = vec![0u8; self.block_size() as usize];
        self.write_bytes(block * self.block_size(), &zeroes)
    }

    /// Appends one data block to the file, allocating and linking whatever
    /// indirect blocks the new position still misses. Indirect blocks that
    /// already exist are reused. Returns the new physical block.
    ///
    /// The inode is persisted whenever its pointer array changes, so the
    /// caller's other copies of the record go stale.
    pub(crate) fn add_block(&mut self, ino: u32, inode: &mut RawInode) -> Result<u32> {
        let block_size = self.block_size();
        let group = self.group_of_ino(ino);
        let file_bid = inode.allocated_blocks(block_size);
        let path = BidPath::new(file_bid, block_size / BID_SIZE);
        trace!("ext2: add_block ino={} file_bid={} path={:?}", ino, file_bid, path);

        match path {
            BidPath::Direct(idx) => {
                let data_block = self.alloc_block(group)?;
                inode.block[idx as usize] = data_block;
                self.write_inode(ino, inode)?;
                Ok(data_block)
            }
            BidPath::Indirect(idx) => {
                let ind = self.ensure_root_ptr(ino, inode, path.root_slot(), group)?;
                let data_block = self.alloc_block(group)?;
                self.write_block_ptr(ind, idx, data_block)?;
                Ok(data_block)
            }
            BidPath::DbIndirect(l1, l2) => {
                let ind = self.ensure_root_ptr(ino, inode, path.root_slot(), group)?;
                let ind = self.ensure_chain_ptr(ind, l1, group)?;
                let data_block = self.alloc_block(group)?;
                self.write_block_ptr(ind, l2, data_block)?;
                Ok(data_block)
            }
            BidPath::TbIndirect(l1, l2, l3) => {
                let ind = self.ensure_root_ptr(ino, inode, path.root_slot(), group)?;
                let ind = self.ensure_chain_ptr(ind, l1, group)?;
                let ind = self.ensure_chain_ptr(ind, l2, group)?;
                let data_block = self.alloc_block(group)?;
                self.write_block_ptr(ind, l3, data_block)?;
                Ok(data_block)
            }
        }
    }

    /// Returns the indirect block rooted at the inode's `slot`, allocating,
    /// zero-filling and linking a fresh one if the slot is still a hole.
    fn ensure_root_ptr(
        &mut self,
        ino: u32,
        inode: &mut RawInode,
        slot: usize,
        group: u32,
    ) -> Result<u32> {
        let existing = inode.block[slot];
        if existing != 0 {
            return Ok(existing);
        }
        let fresh = self.alloc_block(group)?;
        self.zero_block(fresh)?;
        inode.block[slot] = fresh;
        self.write_inode(ino, inode)?;
        Ok(fresh)
    }

    /// Like [`Self::ensure_root_ptr`], but for a slot inside an indirect
    /// block already on the medium.
    fn ensure_chain_ptr(&mut self, parent: u32, idx: u32, group: u32) -> Result<u32> {
        let existing = self.read_block_ptr(parent, idx)?;
        if existing != 0 {
            return Ok(existing);
        }
        let fresh = self.alloc_block(group)?;
        self.zero_block(fresh)?;
        self.write_block_ptr(parent, idx, fresh)?;
        Ok(fresh)
    }

    /// Reads `buf.len()` bytes of the file's byte stream starting at
    /// `offset`. Hole blocks read back as zeroes.
    pub(crate) fn read_data(&self, ino: u32, offset: u32, buf: &mut [u8]) -> Result<()> {
        let inode = self.read_inode(ino)?;
        self.read_inode_data(&inode, offset, buf)
    }

    /// [`Self::read_data`] against an already-fetched inode record.
    pub(crate) fn read_inode_data(
        &self,
        inode: &RawInode,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<()> {
        if offset as u64 + buf.len() as u64 > inode.size as u64 {
            return Err(Error::OutOfBounds);
        }

        let block_size = self.block_size();
        let mut pos = offset;
        let mut done = 0;
        while done < buf.len() {
            let in_block = pos % block_size;
            let chunk_len = ((block_size - in_block) as usize).min(buf.len() - done);
            let chunk = &mut buf[done..done + chunk_len];

            let block = self.block_map(inode, pos)?;
            if block == 0 {
                chunk.fill(0);
            } else {
                self.read_bytes(block * block_size + in_block, chunk)?;
            }

            pos += chunk_len as u32;
            done += chunk_len;
        }
        Ok(())
    }

    /// Writes `buf` into the file's byte stream starting at `offset`,
    /// appending blocks as needed. The write may extend the file but not
    /// begin past its current end, and never shrinks it.
    pub(crate) fn write_data(&mut self, ino: u32, offset: u32, buf: &[u8]) -> Result<()> {
        let mut inode = self.read_inode(ino)?;
        if offset > inode.size {
            return Err(Error::OutOfBounds);
        }

        let block_size = self.block_size();
        let mut pos = offset;
        let mut done = 0;
        while done < buf.len() {
            let in_block = pos % block_size;
            let chunk_len = ((block_size - in_block) as usize).min(buf.len() - done);
            let chunk = &buf[done..done + chunk_len];

            let allocated = inode.allocated_blocks(block_size) as u64 * block_size as u64;
            let block = if (pos as u64) < allocated {
                let block = self.block_map(&inode, pos)?;
                if block == 0 {
                    // A hole inside the allocated extent can only come from
                    // a foreign tool; there is no block to write into.
                    return Err(Error::OutOfBounds);
                }
                block
            } else {
                self.add_block(ino, &mut inode)?
            };
            self.write_bytes(block * block_size + in_block, chunk)?;

            pos += chunk_len as u32;
            done += chunk_len;
            if pos > inode.size {
                inode.size = pos;
            }
        }

        // The record on the medium may have been rewritten while indirect
        // blocks were linked in, so refresh it before settling the size.
        let mut inode = self.read_inode(ino)?;
        let end = offset as u64 + buf.len() as u64;
        if end > inode.size as u64 {
            inode.size = end as u32;
        }
        self.write_inode(ino, &inode)?;
        Ok(())
    }
}
