//! Synthetic XFS version 5 image shared by the integration tests.
//!
//! Geometry: one allocation group of 16 blocks of 4096 bytes, 512-byte
//! inodes, 8 inodes per block. The root directory is inode 64 and holds
//! `hello.txt` (inode 65) and the empty directory `sub` (inode 66). The
//! extended image adds a symbolic link `link -> hello.txt` (inode 67) and a
//! `user.comment` attribute on `hello.txt`. The large-directory image turns
//! `sub` into a directory of two data blocks holding `alpha` (inode 65) and
//! `beta` (inode 67).

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use xfs_forensics::Volume;
use xfs_forensics::device::MemoryDevice;

pub const BLOCK_SIZE: usize = 4096;
pub const INODE_SIZE: usize = 512;
pub const ROOT_INODE: u64 = 64;
pub const HELLO_INODE: u64 = 65;
pub const SUB_INODE: u64 = 66;
pub const LINK_INODE: u64 = 67;
/// 2023-11-14T22:13:20Z plus 5 ns
pub const HELLO_MTIME_SECONDS: u32 = 1_700_000_000;
pub const HELLO_MTIME_NANOS: u32 = 5;

const AG_BLOCKS: u32 = 16;
const INOBT_BLOCK: u32 = 3;
/// First inode chunk starts at block 8
const CHUNK_BLOCK: usize = 8;
const CORE_SIZE: usize = 176;

const S_IFDIR: u16 = 0o040000;
const S_IFREG: u16 = 0o100000;
const S_IFLNK: u16 = 0o120000;
const FORMAT_LOCAL: u8 = 1;
const FORMAT_EXTENTS: u8 = 2;
const FTYPE_REG: u8 = 1;
const FTYPE_DIR: u8 = 2;
const FTYPE_SYMLINK: u8 = 7;

fn put(image: &mut [u8], offset: usize, bytes: &[u8]) {
    image[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn superblock(image: &mut [u8]) {
    put(image, 0x00, b"XFSB");
    put(image, 0x04, &(BLOCK_SIZE as u32).to_be_bytes());
    put(image, 0x08, &u64::from(AG_BLOCKS).to_be_bytes());
    put(image, 0x38, &ROOT_INODE.to_be_bytes());
    put(image, 0x54, &AG_BLOCKS.to_be_bytes());
    put(image, 0x58, &1u32.to_be_bytes());
    put(image, 0x64, &0xB4A5u16.to_be_bytes());
    put(image, 0x66, &512u16.to_be_bytes());
    put(image, 0x68, &(INODE_SIZE as u16).to_be_bytes());
    put(image, 0x6A, &8u16.to_be_bytes());
    put(image, 0x6C, b"evidence");
    // block, sector, inode, inodes per block and AG block log2 values
    put(image, 0x78, &[12, 9, 9, 3, 4]);
    // incompatible features: directory entry file types
    put(image, 0xD8, &1u32.to_be_bytes());
}

fn inode_btree(image: &mut [u8], allocated: u32) {
    let agi = 2 * 512;
    put(image, agi, b"XAGI");
    put(image, agi + 4, &1u32.to_be_bytes());
    put(image, agi + 8, &0u32.to_be_bytes());
    put(image, agi + 12, &AG_BLOCKS.to_be_bytes());
    put(image, agi + 16, &64u32.to_be_bytes());
    put(image, agi + 20, &INOBT_BLOCK.to_be_bytes());
    put(image, agi + 24, &1u32.to_be_bytes());

    let leaf = INOBT_BLOCK as usize * BLOCK_SIZE;
    put(image, leaf, b"IAB3");
    put(image, leaf + 4, &0u16.to_be_bytes());
    put(image, leaf + 6, &1u16.to_be_bytes());
    put(image, leaf + 8, &u32::MAX.to_be_bytes());
    put(image, leaf + 12, &u32::MAX.to_be_bytes());
    // one record after the 56-byte version 5 header
    let record = leaf + 56;
    put(image, record, &(ROOT_INODE as u32).to_be_bytes());
    let free = !((1u64 << allocated) - 1);
    image[record + 7] = (64 - allocated) as u8;
    put(image, record + 8, &free.to_be_bytes());
}

/// Writes an inode core and returns the offset of its literal area.
fn inode(image: &mut [u8], number: u64, mode: u16, format: u8, size: u64, links: u32) -> usize {
    let offset = CHUNK_BLOCK * BLOCK_SIZE + (number - ROOT_INODE) as usize * INODE_SIZE;
    put(image, offset, b"IN");
    put(image, offset + 2, &mode.to_be_bytes());
    image[offset + 4] = 3;
    image[offset + 5] = format;
    put(image, offset + 8, &1000u32.to_be_bytes());
    put(image, offset + 12, &100u32.to_be_bytes());
    put(image, offset + 16, &links.to_be_bytes());
    put(image, offset + 56, &size.to_be_bytes());
    put(image, offset + 152, &number.to_be_bytes());
    offset + CORE_SIZE
}

fn set_mtime(image: &mut [u8], number: u64, seconds: u32, nanoseconds: u32) {
    let offset = CHUNK_BLOCK * BLOCK_SIZE + (number - ROOT_INODE) as usize * INODE_SIZE;
    put(image, offset + 40, &seconds.to_be_bytes());
    put(image, offset + 44, &nanoseconds.to_be_bytes());
}

/// Short-form directory with 4-byte inode numbers.
fn short_form_directory(parent: u32, entries: &[(&[u8], u8, u32)]) -> Vec<u8> {
    let mut data = vec![entries.len() as u8, 0];
    data.extend_from_slice(&parent.to_be_bytes());
    let mut tag = 0x60u16;
    for (name, file_type, inode) in entries {
        data.push(name.len() as u8);
        data.extend_from_slice(&tag.to_be_bytes());
        data.extend_from_slice(name);
        data.push(*file_type);
        data.extend_from_slice(&inode.to_be_bytes());
        tag += 0x18;
    }
    data
}

/// Builds the base image, or the extended one when `extended` is set.
pub fn image(extended: bool) -> Vec<u8> {
    let mut image = vec![0u8; AG_BLOCKS as usize * BLOCK_SIZE];
    superblock(&mut image);
    inode_btree(&mut image, if extended { 4 } else { 3 });

    let mut root_entries: Vec<(&[u8], u8, u32)> = vec![
        (&b"hello.txt"[..], FTYPE_REG, HELLO_INODE as u32),
        (&b"sub"[..], FTYPE_DIR, SUB_INODE as u32),
    ];
    if extended {
        root_entries.push((&b"link"[..], FTYPE_SYMLINK, LINK_INODE as u32));
    }
    let root = short_form_directory(ROOT_INODE as u32, &root_entries);
    let literal = inode(&mut image, ROOT_INODE, S_IFDIR | 0o755, FORMAT_LOCAL, root.len() as u64, 3);
    put(&mut image, literal, &root);

    let hello = CHUNK_BLOCK * BLOCK_SIZE + INODE_SIZE;
    inode(&mut image, HELLO_INODE, S_IFREG | 0o644, FORMAT_EXTENTS, 5, 1);
    set_mtime(&mut image, HELLO_INODE, HELLO_MTIME_SECONDS, HELLO_MTIME_NANOS);
    if extended {
        // attribute fork 120 bytes into the literal area, short form
        image[hello + 82] = 15;
        image[hello + 83] = FORMAT_LOCAL;
        let mut attributes = vec![0u8, 0, 1, 0];
        attributes.extend_from_slice(&[7, 2, 0]);
        attributes.extend_from_slice(b"commenthi");
        let total = attributes.len() as u16;
        attributes[0..2].copy_from_slice(&total.to_be_bytes());
        put(&mut image, hello + CORE_SIZE + 120, &attributes);
    }

    let sub = short_form_directory(ROOT_INODE as u32, &[]);
    let literal = inode(&mut image, SUB_INODE, S_IFDIR | 0o755, FORMAT_LOCAL, sub.len() as u64, 2);
    put(&mut image, literal, &sub);

    if extended {
        let target = b"hello.txt";
        let literal = inode(
            &mut image,
            LINK_INODE,
            S_IFLNK | 0o777,
            FORMAT_LOCAL,
            target.len() as u64,
            1,
        );
        put(&mut image, literal, target);
    }
    image
}

/// Directory data block (XDD3): entries, then one free region.
fn directory_data_block(entries: &[(&[u8], u8, u64)]) -> Vec<u8> {
    let mut block = vec![0u8; BLOCK_SIZE];
    put(&mut block, 0, b"XDD3");
    let mut offset = 64;
    for (name, file_type, inode) in entries {
        put(&mut block, offset, &inode.to_be_bytes());
        block[offset + 8] = name.len() as u8;
        put(&mut block, offset + 9, name);
        block[offset + 9 + name.len()] = *file_type;
        offset += (12 + name.len()).next_multiple_of(8);
    }
    put(&mut block, offset, &0xFFFFu16.to_be_bytes());
    put(&mut block, offset + 2, &((BLOCK_SIZE - offset) as u16).to_be_bytes());
    block
}

fn packed_extent(logical: u64, start: u64, count: u64) -> [u8; 16] {
    let mut record = [0u8; 16];
    record[..8].copy_from_slice(&((logical << 9) | (start >> 43)).to_be_bytes());
    record[8..].copy_from_slice(&((start << 21) | count).to_be_bytes());
    record
}

/// The extended image with `sub` stored in extents format.
pub fn large_directory_image() -> Vec<u8> {
    let mut image = image(true);
    let blocks = [
        directory_data_block(&[
            (&b"."[..], FTYPE_DIR, SUB_INODE),
            (&b".."[..], FTYPE_DIR, ROOT_INODE),
            (&b"alpha"[..], FTYPE_REG, HELLO_INODE),
        ]),
        directory_data_block(&[(&b"beta"[..], FTYPE_SYMLINK, LINK_INODE)]),
    ];
    for (index, block) in blocks.iter().enumerate() {
        put(&mut image, (10 + index) * BLOCK_SIZE, block);
    }

    let size = (blocks.len() * BLOCK_SIZE) as u64;
    let literal = inode(&mut image, SUB_INODE, S_IFDIR | 0o755, FORMAT_EXTENTS, size, 2);
    image[literal..literal + INODE_SIZE - CORE_SIZE].fill(0);
    // number of data fork extents
    put(&mut image, literal - CORE_SIZE + 76, &2u32.to_be_bytes());
    put(&mut image, literal, &packed_extent(0, 10, 2));
    // leaf block at the 32 GiB leaf offset, left zeroed
    put(&mut image, literal + 16, &packed_extent((32 << 30) / BLOCK_SIZE as u64, 12, 1));
    image
}

pub fn open_volume(extended: bool) -> Volume<MemoryDevice> {
    Volume::open(MemoryDevice::new(image(extended)), true).unwrap()
}

/// Writes the image to `dir`, preceded by `padding` zero bytes.
pub fn write_image(dir: &Path, extended: bool, padding: usize) -> PathBuf {
    let path = dir.join("volume.img");
    let mut data = vec![0u8; padding];
    data.extend_from_slice(&image(extended));
    std::fs::write(&path, data).unwrap();
    path
}
