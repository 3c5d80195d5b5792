// SPDX-License-Identifier: MPL-2.0

use static_assertions::const_assert;

use crate::prelude::*;

const_assert!(size_of::<RawGroupDescriptor>() == 32);

/// The Block Group Descriptor contains information regarding where important
/// data structures for its group are located.
///
/// The descriptor table contains one record per block group and starts on
/// the first block following the superblock.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawGroupDescriptor {
    /// Blocks usage bitmap block.
    pub block_bitmap: u32,
    /// Inodes usage bitmap block.
    pub inode_bitmap: u32,
    /// Starting block of inode table.
    pub inode_table: u32,
    /// Number of free blocks in group.
    pub free_blocks_count: u16,
    /// Number of free inodes in group.
    pub free_inodes_count: u16,
    /// Number of directories in group.
    pub dirs_count: u16,
    pad: u16,
    reserved: [u32; 3],
}

/// Returns the index of the first zero bit among the first `bit_count`
/// bits of `bitmap`, scanning bytes in order and bits low-to-high.
pub(crate) fn find_free_bit(bitmap: &[u8], bit_count: u32) -> Option<u32> {
    for (byte_idx, byte) in bitmap.iter().enumerate() {
        if *byte == 0xff {
            continue;
        }
        for bit in 0..8 {
            let idx = byte_idx as u32 * 8 + bit;
            if idx >= bit_count {
                return None;
            }
            if (byte & (1 << bit)) == 0 {
                return Some(idx);
            }
        }
    }
    None
}
