//! Allocated inode enumeration through the inode allocation B+ tree.
//!
//! Every allocation group has an AGI header, two sectors into the AG, that
//! points at the root of its inode B+ tree. Leaf records describe chunks of
//! 64 inodes with a free bitmap and, on sparse inode volumes, a hole mask.

use binread::{BinRead, BinReaderExt};
use getset::CopyGetters;
use log::debug;
use std::io;

use super::btree_block::{BTreeBlock, BTreeKind};
use super::io_handle::IoHandle;
use super::superblock::Superblock;
use crate::constants::AGI_MAGIC;
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};
use crate::utils;

/// Inodes described by one inode B+ tree record.
const INODES_PER_CHUNK: u32 = 64;
/// Inodes covered by one bit of the sparse hole mask.
const INODES_PER_HOLE_BIT: u32 = 4;
/// Deepest inode B+ tree the walk descends.
const INOBT_MAX_LEVELS: u32 = 8;

/// Allocation group inode header.
#[derive(BinRead, Debug, Clone, CopyGetters)]
#[br(big)]
#[getset(get_copy = "pub")]
pub struct Agi {
    magic: u32,
    version: u32,
    sequence_number: u32,
    /// Size of the AG in blocks
    length: u32,
    /// Number of allocated inodes
    count: u32,
    /// AG block of the inode B+ tree root
    root: u32,
    /// Number of levels of the inode B+ tree
    level: u32,
}

impl Agi {
    /// Reads the AGI of allocation group `ag`.
    ///
    /// # Errors
    /// - `Io` if the header cannot be read
    /// - `Argument` if the signature or sequence number is wrong
    pub fn read<D: BlockDevice + ?Sized>(device: &mut D, sb: &Superblock, ag: u32) -> Result<Agi> {
        let offset = sb.ag_offset(ag)? + 2 * u64::from(sb.sector_size());
        let data = utils::read_at(device, offset, 28)?;
        let agi: Agi = io::Cursor::new(data).read_be()?;
        if agi.magic != AGI_MAGIC {
            return Err(XfsError::Argument(format!(
                "unsupported AGI signature 0x{:08x} in AG {ag}",
                agi.magic
            )));
        }
        if agi.sequence_number != ag {
            return Err(XfsError::Argument(format!(
                "AGI sequence number {} does not match AG {ag}",
                agi.sequence_number
            )));
        }
        Ok(agi)
    }
}

/// Inode numbers marked allocated in one leaf record.
fn record_inodes(sb: &Superblock, ag: u32, record: &[u8]) -> Result<Vec<u64>> {
    let start = utils::be_u32_at(record, 0)?;
    // zero unless the volume uses sparse inode chunks
    let hole_mask = utils::be_u16_at(record, 4)?;
    let free_mask = utils::be_u64_at(record, 8)?;

    let inodes = (0..INODES_PER_CHUNK)
        .filter(|i| hole_mask & (1 << (i / INODES_PER_HOLE_BIT)) == 0)
        .filter(|i| free_mask & (1u64 << i) == 0)
        .filter_map(|i| start.checked_add(i))
        .map(|agino| sb.inode_number(ag, agino))
        .collect();
    Ok(inodes)
}

/// Lists the allocated inodes of one allocation group, in ascending order.
///
/// # Errors
/// - `Io` if a header or node cannot be read
/// - `Argument` if a node is malformed or the tree levels are inconsistent
pub fn allocated_inodes<D: BlockDevice + ?Sized>(
    device: &mut D,
    sb: &Superblock,
    io_handle: &IoHandle,
    ag: u32,
) -> Result<Vec<u64>> {
    let agi = Agi::read(device, sb, ag)?;
    if agi.level == 0 || agi.level > INOBT_MAX_LEVELS {
        return Err(XfsError::Argument(format!(
            "invalid inode B+ tree level {} in AG {ag}",
            agi.level
        )));
    }
    debug!(
        "AG {ag}: {} inodes, inode B+ tree root {} at level {}",
        agi.count, agi.root, agi.level
    );

    let mut inodes = Vec::new();
    walk(device, sb, io_handle, ag, agi.root, agi.level - 1, &mut inodes)?;
    Ok(inodes)
}

fn walk<D: BlockDevice + ?Sized>(
    device: &mut D,
    sb: &Superblock,
    io_handle: &IoHandle,
    ag: u32,
    agbno: u32,
    expected_level: u32,
    inodes: &mut Vec<u64>,
) -> Result<()> {
    let offset = sb.ag_block_offset(ag, agbno)?;
    let block = BTreeBlock::read_block(device, io_handle, BTreeKind::InodeAllocation, offset)?;
    let level = u32::from(block.header().level());
    if level != expected_level {
        return Err(XfsError::Argument(format!(
            "inode B+ tree node {agbno} in AG {ag} has level {level}, expected {expected_level}"
        )));
    }

    if block.is_leaf() {
        for index in 0..block.number_of_records() {
            inodes.extend(record_inodes(sb, ag, block.record(index)?)?);
        }
        return Ok(());
    }
    for index in 0..block.number_of_records() {
        let child = u32::try_from(block.pointer(index)?)
            .map_err(|_| XfsError::Argument("inode B+ tree pointer out of range".into()))?;
        walk(device, sb, io_handle, ag, child, level - 1, inodes)?;
    }
    Ok(())
}
