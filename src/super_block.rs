// SPDX-License-Identifier: MPL-2.0

use static_assertions::const_assert;

use crate::prelude::*;

/// Byte offset of the superblock on the medium.
pub(crate) const SUPER_BLOCK_OFFSET: u32 = 1024;

/// The magic signature of an ext2 superblock.
pub(crate) const EXT2_MAGIC: u16 = 0xef53;

const_assert!(size_of::<RawSuperBlock>() == 84);

/// The superblock on device.
///
/// This is the revision-0 field set; the record is read and written as one
/// unit at [`SUPER_BLOCK_OFFSET`]. A mounted filesystem keeps one logical
/// copy of it and writes it back whenever the free counts change.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawSuperBlock {
    /// Total number of inodes.
    pub inodes_count: u32,
    /// Total number of blocks, the boot block included.
    pub blocks_count: u32,
    /// Number of blocks reserved for the superuser.
    pub reserved_blocks_count: u32,
    /// Number of free blocks.
    pub free_blocks_count: u32,
    /// Number of free inodes.
    pub free_inodes_count: u32,
    /// First block carrying data; 1 when the block size is 1024, else 0.
    pub first_data_block: u32,
    /// Block size is `1024 << log_block_size`.
    pub log_block_size: u32,
    /// Fragment size exponent.
    pub log_frag_size: u32,
    /// Number of blocks in each block group.
    pub blocks_per_group: u32,
    /// Number of fragments in each block group.
    pub frags_per_group: u32,
    /// Number of inodes in each block group.
    pub inodes_per_group: u32,
    /// Mount time.
    pub mtime: u32,
    /// Write time.
    pub wtime: u32,
    /// Mount count.
    pub mnt_count: u16,
    /// Maximal mount count.
    pub max_mnt_count: u16,
    /// Magic signature.
    pub magic: u16,
    /// Filesystem state.
    pub state: u16,
    /// Behaviour when detecting errors.
    pub errors: u16,
    /// Minor revision level.
    pub minor_rev_level: u16,
    /// Time of last check.
    pub last_check: u32,
    /// Maximal time between checks.
    pub check_interval: u32,
    /// OS that created the filesystem.
    pub creator_os: u32,
    /// Revision level.
    pub rev_level: u32,
    /// Default uid for reserved blocks.
    pub def_resuid: u16,
    /// Default gid for reserved blocks.
    pub def_resgid: u16,
}

impl RawSuperBlock {
    /// Returns the block size in bytes.
    ///
    /// A corrupt `log_block_size` of 22 or more would overflow the 32-bit
    /// size to zero, so it is rejected instead.
    pub fn block_size(&self) -> Result<u32> {
        if self.log_block_size >= 22 {
            return Err(Error::BlockSizeOverflow);
        }
        Ok(1024 << self.log_block_size)
    }
}
