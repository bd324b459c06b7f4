//! Extent records and the block map B+ tree.
//!
//! A fork in extents format holds packed 16-byte records inline; a fork in
//! B+ tree format holds the tree root instead, and the records live in the
//! leaves of a [`BTreeKind::BlockMap`] tree.

use log::debug;

use super::btree_block::{BTreeBlock, BTreeKind};
use super::io_handle::IoHandle;
use super::superblock::Superblock;
use crate::constants::EXTENT_RECORD_SIZE;
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};
use crate::utils;

/// Size of the in-inode block map root header: level and record count.
const BMDR_HEADER_SIZE: usize = 4;
/// Deepest block map tree a 64-bit file can need.
const BMAP_MAX_LEVELS: u16 = 9;

/// One mapping of file blocks to filesystem blocks.
///
/// Packed on disk as a 128-bit big-endian value:
/// ```text
/// | 1 bit | 54 bits      | 52 bits     | 21 bits     |
/// | flag  | file offset  | start block | block count |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// First file block covered by the extent
    pub logical_block: u64,
    /// First filesystem block, AG number in the high bits
    pub start_block: u64,
    pub block_count: u64,
    /// Preallocated but never written
    pub unwritten: bool,
}

impl Extent {
    /// Decodes one packed extent record.
    pub fn decode(record: &[u8]) -> Result<Self> {
        let high = utils::be_u64_at(record, 0)?;
        let low = utils::be_u64_at(record, 8)?;
        Ok(Extent {
            unwritten: high >> 63 != 0,
            logical_block: (high & 0x7FFF_FFFF_FFFF_FFFF) >> 9,
            start_block: ((high & 0x1FF) << 43) | (low >> 21),
            block_count: low & 0x1F_FFFF,
        })
    }

    /// Whether `logical` falls inside the extent.
    pub fn contains(&self, logical: u64) -> bool {
        logical >= self.logical_block && logical - self.logical_block < self.block_count
    }
}

/// Filesystem block holding file block `logical`, if it is mapped.
pub fn map_block(extents: &[Extent], logical: u64) -> Option<u64> {
    extents
        .iter()
        .find(|extent| extent.contains(logical))
        .map(|extent| extent.start_block + (logical - extent.logical_block))
}

/// Decodes `count` inline extent records from a fork.
///
/// # Errors
/// `Argument` if the records do not fit in the fork.
pub fn read_extent_list(fork: &[u8], count: u64) -> Result<Vec<Extent>> {
    let needed = usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(EXTENT_RECORD_SIZE))
        .filter(|needed| *needed <= fork.len())
        .ok_or_else(|| {
            XfsError::Argument(format!(
                "{count} extents exceed fork size {}",
                fork.len()
            ))
        })?;
    fork[..needed]
        .chunks_exact(EXTENT_RECORD_SIZE)
        .map(Extent::decode)
        .collect()
}

/// Collects the extents of a fork in B+ tree format.
///
/// `fork` holds the root: level, record count, keys, then child pointers
/// placed after the full key capacity of the fork.
///
/// # Errors
/// - `Argument` if the root or a node record count is out of bounds
/// - `Argument` if a child's level does not descend from its parent's
/// - `Io` if a node cannot be read
pub fn read_extent_tree<D: BlockDevice + ?Sized>(
    device: &mut D,
    sb: &Superblock,
    io_handle: &IoHandle,
    fork: &[u8],
) -> Result<Vec<Extent>> {
    let level = utils::be_u16_at(fork, 0)?;
    let records = usize::from(utils::be_u16_at(fork, 2)?);
    if level == 0 || level > BMAP_MAX_LEVELS {
        return Err(XfsError::Argument(format!("invalid block map root level {level}")));
    }
    let max_records = fork.len().saturating_sub(BMDR_HEADER_SIZE) / 16;
    if records > max_records {
        return Err(XfsError::Argument(format!(
            "block map root records {records} exceed capacity {max_records}"
        )));
    }

    let mut extents = Vec::new();
    for index in 0..records {
        let pointer = utils::be_u64_at(fork, BMDR_HEADER_SIZE + max_records * 8 + index * 8)?;
        walk_node(device, sb, io_handle, pointer, level - 1, &mut extents)?;
    }
    debug!("Block map tree of level {level} yields {} extents", extents.len());
    Ok(extents)
}

fn walk_node<D: BlockDevice + ?Sized>(
    device: &mut D,
    sb: &Superblock,
    io_handle: &IoHandle,
    fs_block: u64,
    expected_level: u16,
    extents: &mut Vec<Extent>,
) -> Result<()> {
    let offset = sb.fs_block_offset(fs_block)?;
    let block = BTreeBlock::read_block(device, io_handle, BTreeKind::BlockMap, offset)?;
    let level = block.header().level();
    if level != expected_level {
        return Err(XfsError::Argument(format!(
            "block map node at block {fs_block} has level {level}, expected {expected_level}"
        )));
    }

    if block.is_leaf() {
        for index in 0..block.number_of_records() {
            extents.push(Extent::decode(block.record(index)?)?);
        }
        return Ok(());
    }
    for index in 0..block.number_of_records() {
        let child = block.pointer(index)?;
        walk_node(device, sb, io_handle, child, level - 1, extents)?;
    }
    Ok(())
}

/// Reads `count` consecutive file blocks starting at `logical`.
///
/// # Errors
/// `Argument` if one of the blocks is not mapped.
pub fn read_logical_blocks<D: BlockDevice + ?Sized>(
    device: &mut D,
    sb: &Superblock,
    extents: &[Extent],
    logical: u64,
    count: u64,
) -> Result<Vec<u8>> {
    let block_size = sb.block_size() as usize;
    let mut data = Vec::new();
    for block in logical..logical.saturating_add(count) {
        let fs_block = map_block(extents, block).ok_or_else(|| {
            XfsError::Argument(format!("file block {block} is not mapped"))
        })?;
        let offset = sb.fs_block_offset(fs_block)?;
        data.extend_from_slice(&utils::read_at(device, offset, block_size)?);
    }
    Ok(data)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::constants::BMAP_CRC_MAGIC;
    use crate::device::{AccessMode, MemoryDevice};
    use crate::error::ErrorDomain;
    use crate::filesystem::superblock::tests::sample_sector;

    /// 4096-byte blocks, four AGs of 16 blocks.
    pub(crate) fn sample_superblock() -> Superblock {
        Superblock::from_bytes(&sample_sector(), true).unwrap()
    }

    pub(crate) fn open_device(image: Vec<u8>) -> MemoryDevice {
        let mut device = MemoryDevice::new(image);
        device.open(AccessMode::Read).unwrap();
        device
    }

    /// Writes a version 5 block map node header; returns where its records start.
    fn bmap_node(image: &mut [u8], block: usize, level: u16, records: u16) -> usize {
        let start = block * 4096;
        image[start..start + 4].copy_from_slice(&BMAP_CRC_MAGIC.to_be_bytes());
        image[start + 4..start + 6].copy_from_slice(&level.to_be_bytes());
        image[start + 6..start + 8].copy_from_slice(&records.to_be_bytes());
        start + 72
    }

    /// In-inode root of `level` with one child at `child`.
    fn bmap_root(level: u16, child: u64) -> Vec<u8> {
        // (64 - 4) / 16 = 3 keys of capacity, pointers start at 4 + 3 * 8
        let mut fork = vec![0u8; 64];
        fork[0..2].copy_from_slice(&level.to_be_bytes());
        fork[2..4].copy_from_slice(&1u16.to_be_bytes());
        fork[28..36].copy_from_slice(&child.to_be_bytes());
        fork
    }

    pub(crate) fn pack(logical: u64, start: u64, count: u64, unwritten: bool) -> [u8; 16] {
        let high = (u64::from(unwritten) << 63) | (logical << 9) | (start >> 43);
        let low = (start << 21) | count;
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&high.to_be_bytes());
        out[8..].copy_from_slice(&low.to_be_bytes());
        out
    }

    #[test]
    fn decodes_packed_fields() {
        let extent = Extent::decode(&pack(7, (1 << 44) + 3, 21, true)).unwrap();
        assert_eq!(extent.logical_block, 7);
        assert_eq!(extent.start_block, (1 << 44) + 3);
        assert_eq!(extent.block_count, 21);
        assert!(extent.unwritten);
    }

    #[test]
    fn maps_file_blocks() {
        let extents = [
            Extent::decode(&pack(0, 100, 2, false)).unwrap(),
            Extent::decode(&pack(10, 200, 1, false)).unwrap(),
        ];
        assert_eq!(map_block(&extents, 1), Some(101));
        assert_eq!(map_block(&extents, 10), Some(200));
        assert_eq!(map_block(&extents, 2), None);
    }

    #[test]
    fn extent_count_is_bounded_by_fork() {
        let mut fork = vec![0u8; 40];
        fork[..16].copy_from_slice(&pack(0, 12, 1, false));
        assert_eq!(read_extent_list(&fork, 2).unwrap().len(), 2);
        assert!(read_extent_list(&fork, 3).is_err());
        assert!(read_extent_list(&fork, u64::MAX).is_err());
    }

    #[test]
    fn level_one_root_over_a_single_leaf() {
        let sb = sample_superblock();
        let io_handle = IoHandle::from_superblock(&sb);
        let mut image = vec![0u8; 16 * 4096];
        let records = bmap_node(&mut image, 5, 0, 2);
        image[records..records + 16].copy_from_slice(&pack(0, 10, 2, false));
        image[records + 16..records + 32].copy_from_slice(&pack(2, 12, 1, true));
        image[12 * 4096..12 * 4096 + 4].copy_from_slice(b"tail");
        let mut device = open_device(image);

        let extents = read_extent_tree(&mut device, &sb, &io_handle, &bmap_root(1, 5)).unwrap();
        assert_eq!(extents.len(), 2);
        assert_eq!(map_block(&extents, 1), Some(11));
        assert!(extents[1].unwritten);
        let data = read_logical_blocks(&mut device, &sb, &extents, 2, 1).unwrap();
        assert_eq!(&data[..4], b"tail");
        let err = read_logical_blocks(&mut device, &sb, &extents, 3, 1).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
    }

    #[test]
    fn child_level_must_descend() {
        let sb = sample_superblock();
        let io_handle = IoHandle::from_superblock(&sb);
        let mut image = vec![0u8; 16 * 4096];
        // a level 2 root expects a level 1 child, block 5 claims to be a leaf
        bmap_node(&mut image, 5, 0, 0);
        // block 6 points back at itself
        let keys = bmap_node(&mut image, 6, 1, 1);
        let pointers = keys + (4096 - 72) / 16 * 8;
        image[pointers..pointers + 8].copy_from_slice(&6u64.to_be_bytes());
        let mut device = open_device(image);

        let err = read_extent_tree(&mut device, &sb, &io_handle, &bmap_root(2, 5)).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
        let err = read_extent_tree(&mut device, &sb, &io_handle, &bmap_root(2, 6)).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
        assert!(read_extent_tree(&mut device, &sb, &io_handle, &bmap_root(0, 5)).is_err());
    }
}
