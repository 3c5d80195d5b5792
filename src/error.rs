// SPDX-License-Identifier: MPL-2.0

use crate::device::DeviceError;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// The superblock magic is not `0xEF53`.
    BadMagic,
    /// `log_block_size` is so large that the derived block size does not
    /// fit the 32-bit size field.
    BlockSizeOverflow,
    /// An inode number does not fall inside any block group.
    InodeNotFound,
    /// A block group index is past the last group.
    GroupNotFound,
    /// A path does not start with `/`.
    BadPath,
    /// A path component is longer than [`crate::MAX_FNAME_LEN`].
    NameTooLong,
    /// A directory scan ran out of entries without a match.
    NotFound,
    /// The operation needs a regular file but resolved a directory.
    NotFile,
    /// The operation needs a directory but resolved something else.
    NotDir,
    /// A data access falls outside the file's byte range.
    OutOfBounds,
    /// A seek target is past the current end of the file.
    SeekOutOfBounds,
    /// Every block group is out of free blocks.
    NoSpace,
    /// Every block group is out of free inodes.
    NoInodes,
    /// Failure reported by the injected device, forwarded untouched.
    Io(DeviceError),
}

impl From<DeviceError> for Error {
    fn from(err: DeviceError) -> Self {
        Error::Io(err)
    }
}
