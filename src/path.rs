// SPDX-License-Identifier: MPL-2.0

use log::debug;

use crate::fs::{Ext2, ROOT_INO};
use crate::inode::{FilePerm, FileType, RawInode, MAX_FNAME_LEN};
use crate::prelude::*;

/// Extracts the path segment running up to the next `/` or the end of the
/// path.
pub(crate) fn parse_filename(path: &str) -> Result<&str> {
    let name = match path.find('/') {
        Some(idx) => &path[..idx],
        None => path,
    };
    if name.len() > MAX_FNAME_LEN {
        return Err(Error::NameTooLong);
    }
    Ok(name)
}

impl Ext2 {
    /// Resolves an absolute path to its inode, walking one directory
    /// lookup per segment from the root.
    pub(crate) fn locate_inode(&self, path: &str) -> Result<u32> {
        let mut rest = path.strip_prefix('/').ok_or(Error::BadPath)?;
        let mut ino = ROOT_INO;
        while !rest.is_empty() {
            let name = parse_filename(rest)?;
            if !name.is_empty() {
                let dir_inode = self.read_inode(ino)?;
                ino = self.locate_inode_in_dir(&dir_inode, name)?;
            }
            rest = rest[name.len()..].strip_prefix('/').unwrap_or("");
        }
        Ok(ino)
    }

    /// Resolves an absolute path up to one segment before its end,
    /// returning the parent inode and the final segment. The final segment
    /// does not have to exist; missing intermediate segments still fail.
    pub(crate) fn locate_parent_inode<'a>(&self, path: &'a str) -> Result<(u32, &'a str)> {
        let rest = path.strip_prefix('/').ok_or(Error::BadPath)?;
        let (dir_path, name) = match rest.rfind('/') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => ("", rest),
        };
        if name.len() > MAX_FNAME_LEN {
            return Err(Error::NameTooLong);
        }

        let mut rest = dir_path;
        let mut ino = ROOT_INO;
        while !rest.is_empty() {
            let segment = parse_filename(rest)?;
            if !segment.is_empty() {
                let dir_inode = self.read_inode(ino)?;
                ino = self.locate_inode_in_dir(&dir_inode, segment)?;
            }
            rest = rest[segment.len()..].strip_prefix('/').unwrap_or("");
        }
        Ok((ino, name))
    }

    /// Allocates a fresh inode of the given type, writes its record and
    /// links it under the path's final segment. The inode is taken from
    /// the parent directory's block group to keep related records close.
    pub(crate) fn create_and_link_inode(&mut self, path: &str, file_type: FileType) -> Result<u32> {
        let (parent_ino, name) = self.locate_parent_inode(path)?;
        if name.is_empty() {
            return Err(Error::BadPath);
        }

        let ino = self.alloc_inode(self.group_of_ino(parent_ino))?;
        let perm = match file_type {
            FileType::Dir => FilePerm::from_bits_truncate(0o755),
            _ => FilePerm::from_bits_truncate(0o644),
        };
        self.write_inode(ino, &RawInode::new(file_type, perm))?;
        self.link(parent_ino, ino, name)?;

        debug!("ext2: created inode {} at {:?}", ino, path);
        Ok(ino)
    }
}
