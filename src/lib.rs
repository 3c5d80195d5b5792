// SPDX-License-Identifier: MPL-2.0

//! A safe Rust Ext2 filesystem engine.
//!
//! The engine interprets and mutates the ext2 on-disk layout through a
//! caller-supplied block-storage capability (the [`BlockAccess`] trait);
//! it performs no I/O of its own beyond what that capability provides.
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

pub use device::{BlockAccess, DeviceError, DeviceResult};
pub use dir::DirEntry;
pub use error::{Error, Result};
pub use file::{Dir, DirRecord, File};
pub use fs::Ext2;
pub use inode::{FilePerm, FileType, MAX_FNAME_LEN};
pub use super_block::RawSuperBlock;

mod block_group;
mod block_ptr;
mod device;
mod dir;
mod error;
mod file;
mod fs;
mod inode;
mod path;
mod prelude;
mod super_block;

#[cfg(test)]
mod test;
