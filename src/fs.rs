// SPDX-License-Identifier: MPL-2.0

use log::{debug, trace};

use crate::block_group::{find_free_bit, RawGroupDescriptor};
use crate::inode::RawInode;
use crate::prelude::*;
use crate::super_block::{RawSuperBlock, EXT2_MAGIC, SUPER_BLOCK_OFFSET};

/// The root inode number.
pub(crate) const ROOT_INO: u32 = 2;

/// The Ext2 filesystem.
///
/// The handle owns the injected device, a cached copy of the superblock
/// and the geometry derived from it. It is a plain value with no interior
/// locking: callers that want to share one must serialize all access
/// themselves, since interleaved allocations or directory insertions
/// would corrupt the on-disk invariants.
pub struct Ext2 {
    device: Arc<dyn BlockAccess>,
    super_block: RawSuperBlock,
    block_size: u32,
    block_groups_count: u32,
}

impl Ext2 {
    /// Loads the filesystem from the `device`.
    pub fn mount(device: Arc<dyn BlockAccess>) -> Result<Self> {
        let mut super_block = RawSuperBlock::new_zeroed();
        device.read_at(SUPER_BLOCK_OFFSET, super_block.as_mut_bytes())?;

        if super_block.magic != EXT2_MAGIC {
            return Err(Error::BadMagic);
        }
        let block_size = super_block.block_size()?;
        let block_groups_count = super_block
            .inodes_count
            .checked_div(super_block.inodes_per_group)
            .unwrap_or(0);

        debug!(
            "ext2: mounted, block_size={} blocks={} inodes={} groups={}",
            block_size, super_block.blocks_count, super_block.inodes_count, block_groups_count,
        );
        Ok(Self {
            device,
            super_block,
            block_size,
            block_groups_count,
        })
    }

    /// Returns the size of block.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Returns the number of block groups.
    pub fn block_groups_count(&self) -> u32 {
        self.block_groups_count
    }

    /// Returns the cached superblock.
    pub fn super_block(&self) -> &RawSuperBlock {
        &self.super_block
    }

    pub(crate) fn read_bytes(&self, offset: u32, buf: &mut [u8]) -> Result<()> {
        Ok(self.device.read_at(offset, buf)?)
    }

    pub(crate) fn write_bytes(&self, offset: u32, buf: &[u8]) -> Result<()> {
        Ok(self.device.write_at(offset, buf)?)
    }

    fn read_val<T: FromBytes + IntoBytes + Immutable>(&self, offset: u32) -> Result<T> {
        let mut value = T::new_zeroed();
        self.read_bytes(offset, value.as_mut_bytes())?;
        Ok(value)
    }

    fn write_val<T: IntoBytes + Immutable>(&self, offset: u32, value: &T) -> Result<()> {
        self.write_bytes(offset, value.as_bytes())
    }

    /// Writes the cached superblock back to its fixed offset.
    fn sync_super_block(&self) -> Result<()> {
        self.write_val(SUPER_BLOCK_OFFSET, &self.super_block)
    }

    /// Byte offset of the group's slot in the descriptor table, which
    /// starts on the first block after the superblock.
    fn group_descriptor_offset(&self, group: u32) -> Result<u32> {
        if group >= self.block_groups_count {
            return Err(Error::GroupNotFound);
        }
        let first_block = if self.block_size > 1024 { 1 } else { 2 };
        Ok(first_block * self.block_size + group * size_of::<RawGroupDescriptor>() as u32)
    }

    pub(crate) fn group_descriptor(&self, group: u32) -> Result<RawGroupDescriptor> {
        self.read_val(self.group_descriptor_offset(group)?)
    }

    fn write_group_descriptor(&self, group: u32, descriptor: &RawGroupDescriptor) -> Result<()> {
        self.write_val(self.group_descriptor_offset(group)?, descriptor)
    }

    pub(crate) fn group_of_ino(&self, ino: u32) -> u32 {
        (ino - 1) / self.super_block.inodes_per_group
    }

    /// Byte offset of the inode's record in its group's inode table.
    fn inode_offset(&self, ino: u32) -> Result<u32> {
        if ino == 0 {
            return Err(Error::InodeNotFound);
        }
        let group = self.group_of_ino(ino);
        if group >= self.block_groups_count {
            return Err(Error::InodeNotFound);
        }
        let index = (ino - 1) % self.super_block.inodes_per_group;
        let descriptor = self.group_descriptor(group)?;
        Ok(descriptor.inode_table * self.block_size + index * size_of::<RawInode>() as u32)
    }

    pub(crate) fn read_inode(&self, ino: u32) -> Result<RawInode> {
        self.read_val(self.inode_offset(ino)?)
    }

    pub(crate) fn write_inode(&self, ino: u32, inode: &RawInode) -> Result<()> {
        self.write_val(self.inode_offset(ino)?, inode)
    }

    /// Claims the first free bit of the bitmap at `bitmap_block`, writing
    /// the one affected byte back. `None` when all `bit_count` bits are set.
    fn reserve_bit(&self, bitmap_block: u32, bit_count: u32) -> Result<Option<u32>> {
        let bitmap_offset = bitmap_block * self.block_size;
        let mut bitmap = vec![0u8; bit_count.div_ceil(8) as usize];
        self.read_bytes(bitmap_offset, &mut bitmap)?;

        let Some(bit) = find_free_bit(&bitmap, bit_count) else {
            return Ok(None);
        };
        let byte_idx = bit / 8;
        let byte = bitmap[byte_idx as usize] | 1 << (bit % 8);
        self.write_bytes(bitmap_offset + byte_idx, &[byte])?;
        Ok(Some(bit))
    }

    /// Reserves one block in the group, keeping the descriptor's and the
    /// superblock's free counters in step. `None` when the group is full;
    /// the caller is expected to move on to another group.
    pub(crate) fn reserve_block_in_group(&mut self, group: u32) -> Result<Option<u32>> {
        let mut descriptor = self.group_descriptor(group)?;
        if descriptor.free_blocks_count == 0 {
            return Ok(None);
        }

        let blocks_per_group = self.super_block.blocks_per_group;
        let Some(bit) = self.reserve_bit(descriptor.block_bitmap, blocks_per_group)? else {
            return Ok(None);
        };
        descriptor.free_blocks_count -= 1;
        self.write_group_descriptor(group, &descriptor)?;
        self.super_block.free_blocks_count -= 1;
        self.sync_super_block()?;

        Ok(Some(
            group * blocks_per_group + bit + self.super_block.first_data_block,
        ))
    }

    /// Reserves one inode in the group; the inode counterpart of
    /// [`Self::reserve_block_in_group`].
    pub(crate) fn reserve_inode_in_group(&mut self, group: u32) -> Result<Option<u32>> {
        let mut descriptor = self.group_descriptor(group)?;
        if descriptor.free_inodes_count == 0 {
            return Ok(None);
        }

        let inodes_per_group = self.super_block.inodes_per_group;
        let Some(bit) = self.reserve_bit(descriptor.inode_bitmap, inodes_per_group)? else {
            return Ok(None);
        };
        descriptor.free_inodes_count -= 1;
        self.write_group_descriptor(group, &descriptor)?;
        self.super_block.free_inodes_count -= 1;
        self.sync_super_block()?;

        Ok(Some(group * inodes_per_group + bit + 1))
    }

    /// Allocates a new block.
    ///
    /// Attempts the `preferred_group` first, then wraps around through the
    /// remaining groups. Preferring the caller's group keeps a file's
    /// blocks near its inode.
    pub(crate) fn alloc_block(&mut self, preferred_group: u32) -> Result<u32> {
        for idx in 0..self.block_groups_count {
            let group = (preferred_group + idx) % self.block_groups_count;
            if let Some(block) = self.reserve_block_in_group(group)? {
                trace!("ext2: allocated block {} in group {}", block, group);
                return Ok(block);
            }
        }
        Err(Error::NoSpace)
    }

    /// Allocates a new inode, preferring `preferred_group`; the inode
    /// counterpart of [`Self::alloc_block`].
    pub(crate) fn alloc_inode(&mut self, preferred_group: u32) -> Result<u32> {
        for idx in 0..self.block_groups_count {
            let group = (preferred_group + idx) % self.block_groups_count;
            if let Some(ino) = self.reserve_inode_in_group(group)? {
                trace!("ext2: allocated inode {} in group {}", ino, group);
                return Ok(ino);
            }
        }
        Err(Error::NoInodes)
    }
}

impl core::fmt::Debug for Ext2 {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Ext2")
            .field("super_block", &self.super_block)
            .field("block_size", &self.block_size)
            .field("block_groups_count", &self.block_groups_count)
            .finish()
    }
}
