// SPDX-License-Identifier: MPL-2.0

use crate::block_ptr::BidPath;
use crate::path::parse_filename;
use crate::prelude::*;
use crate::super_block::RawSuperBlock;
use crate::{Error, Ext2};

use self::image::{Image, ImageParams, MemDisk, BLOCK_SIZE};


fn small_params() -> ImageParams {
    ImageParams {
        blocks_count: 2048,
        blocks_per_group: 256,
        inodes_per_group: 16,
    }
}

fn tiny_params() -> ImageParams {
    ImageParams {
        blocks_count: 32,
        blocks_per_group: 32,
        inodes_per_group: 16,
    }
}

fn huge_params() -> ImageParams {
    ImageParams {
        blocks_count: 1 + 9 * 8192,
        blocks_per_group: 8192,
        inodes_per_group: 16,
    }
}

fn small_fs() -> Ext2 {
    Ext2::mount(Image::format(small_params()).into_disk()).unwrap()
}

/// Position-dependent test data; 251 is prime, so the pattern never
/// aligns with the block size and a misdirected block read shows up.
fn pattern(offset: u64) -> u8 {
    (offset % 251) as u8
}

fn pattern_buf(start: u64, len: usize) -> Vec<u8> {
    (0..len).map(|idx| pattern(start + idx as u64)).collect()
}

#[test]
fn mount_formatted_image() {
    let fs = small_fs();
    assert_eq!(fs.block_size(), 1024);
    assert_eq!(fs.block_groups_count(), 8);
    assert_eq!(fs.super_block().magic, 0xef53);
}

#[test]
fn mount_reads_block_size_4096() {
    let mut sb = RawSuperBlock::new_zeroed();
    sb.magic = 0xef53;
    sb.log_block_size = 2;
    sb.inodes_count = 16;
    sb.inodes_per_group = 16;
    let mut raw = vec![0u8; 4096];
    raw[1024..1024 + 84].copy_from_slice(sb.as_bytes());

    let fs = Ext2::mount(MemDisk::new(raw)).unwrap();
    assert_eq!(fs.block_size(), 4096);
}

#[test]
fn mount_rejects_bad_magic() {
    let raw = vec![0u8; 4096];
    assert!(matches!(Ext2::mount(MemDisk::new(raw)), Err(Error::BadMagic)));
}

#[test]
fn mount_rejects_block_size_overflow() {
    let mut sb = RawSuperBlock::new_zeroed();
    sb.magic = 0xef53;
    sb.log_block_size = 22;
    let mut raw = vec![0u8; 4096];
    raw[1024..1024 + 84].copy_from_slice(sb.as_bytes());
    assert!(matches!(
        Ext2::mount(MemDisk::new(raw)),
        Err(Error::BlockSizeOverflow)
    ));

    // 21 is the largest exponent the 32-bit size field can take.
    let mut sb = RawSuperBlock::new_zeroed();
    sb.magic = 0xef53;
    sb.log_block_size = 21;
    sb.inodes_count = 16;
    sb.inodes_per_group = 16;
    let mut raw = vec![0u8; 4096];
    raw[1024..1024 + 84].copy_from_slice(sb.as_bytes());
    let fs = Ext2::mount(MemDisk::new(raw)).unwrap();
    assert_eq!(fs.block_size(), 1024 << 21);
}

#[test]
fn parse_filename_segments() {
    assert_eq!(parse_filename("foo/bar/hello").unwrap(), "foo");
    assert_eq!(parse_filename("hello").unwrap(), "hello");

    let max = "j".repeat(255);
    let path = format!("{max}/foo");
    assert_eq!(parse_filename(&path).unwrap(), max);

    let over = "j".repeat(256);
    assert_eq!(parse_filename(&over), Err(Error::NameTooLong));
}

#[test]
fn bid_path_ranges() {
    let bpb = 256;
    assert_eq!(BidPath::new(0, bpb), BidPath::Direct(0));
    assert_eq!(BidPath::new(11, bpb), BidPath::Direct(11));
    assert_eq!(BidPath::new(12, bpb), BidPath::Indirect(0));
    assert_eq!(BidPath::new(267, bpb), BidPath::Indirect(255));
    assert_eq!(BidPath::new(268, bpb), BidPath::DbIndirect(0, 0));
    assert_eq!(BidPath::new(268 + 255, bpb), BidPath::DbIndirect(0, 255));
    assert_eq!(BidPath::new(268 + 256, bpb), BidPath::DbIndirect(1, 0));
    assert_eq!(BidPath::new(65803, bpb), BidPath::DbIndirect(255, 255));
    assert_eq!(BidPath::new(65804, bpb), BidPath::TbIndirect(0, 0, 0));
    assert_eq!(BidPath::new(65804 + 256, bpb), BidPath::TbIndirect(0, 1, 0));
    assert_eq!(
        BidPath::new(65804 + 65536, bpb),
        BidPath::TbIndirect(1, 0, 0)
    );
}

#[test]
fn create_write_read_roundtrip() {
    let mut fs = small_fs();
    fs.mkdir("/foo").unwrap();
    fs.mkdir("/foo/bar").unwrap();

    let mut file = fs.file_open("/foo/bar/hello").unwrap();
    fs.file_write(&mut file, b"hello world!").unwrap();

    let mut file = fs.file_open("/foo/bar/hello").unwrap();
    let mut buf = [0u8; 12];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(&buf, b"hello world!");

    let mut file = fs.file_open("/foo/bar/goodbye").unwrap();
    fs.file_write(&mut file, b"hi there").unwrap();
    let mut file = fs.file_open("/foo/bar/goodbye").unwrap();
    let mut buf = [0u8; 8];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(&buf, b"hi there");
}

#[test]
fn overwrite_keeps_file_size() {
    let mut fs = small_fs();
    let mut file = fs.file_open("/hello").unwrap();
    fs.file_write(&mut file, b"hello world!\n").unwrap();

    let mut file = fs.file_open("/hello").unwrap();
    fs.file_write(&mut file, b"bye  ").unwrap();

    let mut file = fs.file_open("/hello").unwrap();
    let mut buf = [0u8; 13];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(&buf, b"bye   world!\n");
    assert_eq!(fs.read_inode(file.ino()).unwrap().size, 13);
}

#[test]
fn seek_and_tell_through_indirect_blocks() {
    let mut fs = small_fs();
    let mut file = fs.file_open("/big").unwrap();
    let chunk = vec![b'a'; 60000];
    for _ in 0..10 {
        fs.file_write(&mut file, &chunk).unwrap();
    }
    fs.file_write(&mut file, b"Hello World!").unwrap();

    let mut file = fs.file_open("/big").unwrap();
    fs.file_seek(&mut file, 600000).unwrap();
    assert_eq!(fs.file_tell(&file), 600000);

    let mut buf = [0u8; 12];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(&buf, b"Hello World!");
    assert_eq!(fs.file_tell(&file), 600012);
}

#[test]
fn write_at_double_indirect_boundary() {
    let mut fs = small_fs();
    // The next block after this size needs the double-indirect chain.
    let pad = (12 + 256) * BLOCK_SIZE;
    let mut file = fs.file_open("/big").unwrap();
    fs.file_write(&mut file, &vec![b'a'; pad as usize]).unwrap();

    fs.file_seek(&mut file, pad).unwrap();
    assert_eq!(fs.file_tell(&file), pad);
    fs.file_write(&mut file, b"Hello world!").unwrap();

    fs.file_seek(&mut file, pad).unwrap();
    let mut buf = [0u8; 12];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(&buf, b"Hello world!");

    fs.file_seek(&mut file, pad - 1).unwrap();
    let mut buf = [0u8; 1];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(buf[0], b'a');
}

#[test]
fn reads_file_laid_out_by_formatter() {
    let mut image = Image::format(small_params());
    let content = pattern_buf(0, 600012);
    image.add_file_in_root("big.dat", &content, &[]);

    let mut fs = Ext2::mount(image.into_disk()).unwrap();
    let mut file = fs.file_open("/big.dat").unwrap();

    fs.file_seek(&mut file, 600000).unwrap();
    let mut buf = [0u8; 12];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(buf[..], pattern_buf(600000, 12)[..]);

    // Spanning the direct/single-indirect boundary.
    fs.file_seek(&mut file, 12 * BLOCK_SIZE - 6).unwrap();
    let mut buf = [0u8; 12];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(buf[..], pattern_buf(12 * BLOCK_SIZE as u64 - 6, 12)[..]);

    // Spanning the single/double-indirect boundary.
    fs.file_seek(&mut file, 268 * BLOCK_SIZE - 6).unwrap();
    let mut buf = [0u8; 12];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(buf[..], pattern_buf(268 * BLOCK_SIZE as u64 - 6, 12)[..]);
}

#[test]
fn hole_reads_back_zeroed() {
    let mut image = Image::format(small_params());
    let content = pattern_buf(0, 3 * BLOCK_SIZE as usize);
    image.add_file_in_root("sparse.dat", &content, &[1]);

    let mut fs = Ext2::mount(image.into_disk()).unwrap();
    let mut file = fs.file_open("/sparse.dat").unwrap();
    let mut buf = vec![0xffu8; 3 * BLOCK_SIZE as usize];
    fs.file_read(&mut file, &mut buf).unwrap();

    let block = BLOCK_SIZE as usize;
    assert_eq!(buf[..block], content[..block]);
    assert!(buf[block..2 * block].iter().all(|byte| *byte == 0));
    assert_eq!(buf[2 * block..], content[2 * block..]);
}

#[test]
fn root_dir_iterates_dot_entries() {
    let fs = small_fs();
    let mut dir = fs.dir_open("/").unwrap();

    let record = fs.dir_read(&mut dir).unwrap();
    assert_eq!(record.name, ".");
    assert_eq!(record.ino, 2);

    let record = fs.dir_read(&mut dir).unwrap();
    assert_eq!(record.name, "..");
    assert_eq!(record.ino, 2);

    // The end marker repeats once the stream is exhausted.
    let record = fs.dir_read(&mut dir).unwrap();
    assert_eq!(record.name, "");
    assert_eq!(record.ino, 0);
    let record = fs.dir_read(&mut dir).unwrap();
    assert_eq!(record.name, "");
    assert_eq!(record.ino, 0);
}

#[test]
fn dir_iteration_with_seek_replay() {
    let mut fs = small_fs();
    fs.mkdir("/foo").unwrap();
    fs.mkdir("/foo/bar").unwrap();
    let mut file = fs.file_open("/foo/hello").unwrap();
    fs.file_write(&mut file, b"hello world!").unwrap();

    let mut dir = fs.dir_open("/foo").unwrap();
    assert_eq!(fs.dir_read(&mut dir).unwrap().name, ".");
    assert_eq!(fs.dir_read(&mut dir).unwrap().name, "..");

    let mark = fs.dir_tell(&dir);
    assert_eq!(fs.dir_read(&mut dir).unwrap().name, "bar");
    assert_eq!(fs.dir_read(&mut dir).unwrap().name, "hello");
    assert_eq!(fs.dir_read(&mut dir).unwrap().name, "");
    assert_eq!(fs.dir_read(&mut dir).unwrap().name, "");

    fs.dir_seek(&mut dir, mark).unwrap();
    assert_eq!(fs.dir_read(&mut dir).unwrap().name, "bar");
}

#[test]
fn mkdir_populates_dot_entries() {
    let mut fs = small_fs();
    fs.mkdir("/foo").unwrap();
    fs.mkdir("/foo/bar").unwrap();

    let mut dir = fs.dir_open("/foo/bar").unwrap();
    let first = fs.dir_read(&mut dir).unwrap();
    assert_eq!(first.name, ".");
    assert_eq!(first.ino, dir.ino());

    let parent = fs.dir_open("/foo").unwrap();
    let second = fs.dir_read(&mut dir).unwrap();
    assert_eq!(second.name, "..");
    assert_eq!(second.ino, parent.ino());

    // The tree stays usable afterwards.
    let mut file = fs.file_open("/foo/hello.txt").unwrap();
    fs.file_write(&mut file, b"hi there").unwrap();
    fs.mkdir("/bar").unwrap();
    fs.dir_open("/bar").unwrap();
}

/// Walks a directory's raw records, checking the record-length chain
/// covers the byte size exactly.
fn assert_record_lens_cover(fs: &Ext2, path: &str) {
    let ino = fs.locate_inode(path).unwrap();
    let inode = fs.read_inode(ino).unwrap();
    let mut offset = 0;
    while offset < inode.size {
        let (_, record_len) = fs.read_dir_entry(&inode, offset).unwrap();
        assert_ne!(record_len, 0);
        offset += record_len;
    }
    assert_eq!(offset, inode.size);
}

#[test]
fn record_lens_sum_to_dir_size() {
    let mut fs = small_fs();
    fs.mkdir("/foo").unwrap();

    // Long names force alignment padding and push the directory into a
    // second block.
    for idx in 0..30 {
        let path = format!("/foo/entry-padded-out-to-32-ch-{idx:02}");
        fs.file_open(&path).unwrap();
    }

    assert_record_lens_cover(&fs, "/");
    assert_record_lens_cover(&fs, "/foo");

    let ino = fs.locate_inode("/foo").unwrap();
    assert_eq!(fs.read_inode(ino).unwrap().size, 2 * BLOCK_SIZE);

    // Entries stay reachable across the block boundary.
    fs.file_open("/foo/entry-padded-out-to-32-ch-29").unwrap();
    let dir_inode = fs.read_inode(ino).unwrap();
    assert!(fs
        .locate_inode_in_dir(&dir_inode, "entry-padded-out-to-32-ch-00")
        .is_ok());
}

#[test]
fn bounds_and_type_errors() {
    let mut fs = small_fs();

    assert!(matches!(fs.file_open("foo"), Err(Error::BadPath)));
    assert!(matches!(fs.dir_open("relative"), Err(Error::BadPath)));
    assert!(matches!(fs.mkdir("nope"), Err(Error::BadPath)));

    assert!(matches!(fs.file_open("/"), Err(Error::NotFile)));
    fs.mkdir("/d").unwrap();
    assert!(matches!(fs.file_open("/d"), Err(Error::NotFile)));

    let mut file = fs.file_open("/f").unwrap();
    fs.file_write(&mut file, b"abc").unwrap();
    assert!(matches!(fs.dir_open("/f"), Err(Error::NotDir)));

    assert!(matches!(fs.dir_open("/missing"), Err(Error::NotFound)));
    assert!(matches!(
        fs.file_open("/missing/x"),
        Err(Error::NotFound)
    ));

    assert!(matches!(
        fs.file_seek(&mut file, 4),
        Err(Error::SeekOutOfBounds)
    ));
    fs.file_seek(&mut file, 3).unwrap();
    let mut buf = [0u8; 1];
    assert!(matches!(
        fs.file_read(&mut file, &mut buf),
        Err(Error::OutOfBounds)
    ));

    let long = "x".repeat(256);
    let path = format!("/{long}");
    assert!(matches!(fs.file_open(&path), Err(Error::NameTooLong)));
}

#[test]
fn tiny_image_runs_out_of_blocks() {
    let mut fs = Ext2::mount(Image::format(tiny_params()).into_disk()).unwrap();
    let mut file = fs.file_open("/fat").unwrap();
    assert!(matches!(
        fs.file_write(&mut file, &vec![0u8; 32 * 1024]),
        Err(Error::NoSpace)
    ));
}

#[test]
fn tiny_image_runs_out_of_inodes() {
    let mut fs = Ext2::mount(Image::format(tiny_params()).into_disk()).unwrap();
    // Ten of the sixteen inodes are reserved, the rest go here.
    for idx in 0..6 {
        let path = format!("/f{idx}");
        fs.file_open(&path).unwrap();
    }
    assert!(matches!(fs.file_open("/f6"), Err(Error::NoInodes)));
}

#[test]
fn allocation_spills_into_next_groups() {
    let mut fs = small_fs();
    let mut file = fs.file_open("/big").unwrap();
    // 600 data blocks, more than two groups' worth.
    fs.file_write(&mut file, &vec![b'x'; 600 * 1024]).unwrap();

    assert_eq!(fs.group_descriptor(0).unwrap().free_blocks_count, 0);
    assert!(fs.group_descriptor(1).unwrap().free_blocks_count < 252);

    // The superblock and the descriptors agree on what is free.
    let sum: u32 = (0..fs.block_groups_count())
        .map(|group| fs.group_descriptor(group).unwrap().free_blocks_count as u32)
        .sum();
    assert_eq!(fs.super_block().free_blocks_count, sum);

    assert!(matches!(fs.group_descriptor(8), Err(Error::GroupNotFound)));
}

#[test]
fn remount_sees_persisted_state() {
    let disk = Image::format(small_params()).into_disk();
    let free_after_write = {
        let mut fs = Ext2::mount(disk.clone()).unwrap();
        fs.mkdir("/foo").unwrap();
        let mut file = fs.file_open("/foo/note").unwrap();
        fs.file_write(&mut file, b"persisted").unwrap();
        fs.super_block().free_blocks_count
    };

    let mut fs = Ext2::mount(disk).unwrap();
    assert_eq!(fs.super_block().free_blocks_count, free_after_write);
    let mut file = fs.file_open("/foo/note").unwrap();
    let mut buf = [0u8; 9];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(&buf, b"persisted");
}

#[test]
fn triple_indirect_roundtrip() {
    let mut fs = Ext2::mount(Image::format(huge_params()).into_disk()).unwrap();
    let mut file = fs.file_open("/huge").unwrap();

    // A few blocks past the start of the triple-indirect range.
    let boundary = (12 + 256 + 65536) * BLOCK_SIZE as u64;
    let total = boundary + 3 * BLOCK_SIZE as u64;
    let mut written = 0u64;
    while written < total {
        let len = (1usize << 20).min((total - written) as usize);
        fs.file_write(&mut file, &pattern_buf(written, len)).unwrap();
        written += len as u64;
    }
    assert_eq!(fs.read_inode(file.ino()).unwrap().size as u64, total);

    let mut file = fs.file_open("/huge").unwrap();
    fs.file_seek(&mut file, boundary as u32 - 7).unwrap();
    let mut buf = [0u8; 20];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(buf[..], pattern_buf(boundary - 7, 20)[..]);

    fs.file_seek(&mut file, boundary as u32 + 2 * BLOCK_SIZE + 11)
        .unwrap();
    let mut buf = [0u8; 32];
    fs.file_read(&mut file, &mut buf).unwrap();
    assert_eq!(
        buf[..],
        pattern_buf(boundary + 2 * BLOCK_SIZE as u64 + 11, 32)[..]
    );
}
