//! B+ tree node reader.
//!
//! XFS keeps two header formats for its on-disk B+ trees:
//! - short form (AG-local trees such as the inode allocation tree): 32-bit siblings
//! - long form (the block map of a file fork): 64-bit siblings
//!
//! Version 5 file systems extend both headers with a self-describing area
//! (block number, LSN, UUID, owner, CRC). A node is only handed to the caller
//! once its declared record count has been checked against the block size.

use binread::{BinRead, BinReaderExt};
use getset::CopyGetters;
use log::debug;
use std::io;

use super::io_handle::IoHandle;
use crate::constants::*;
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};
use crate::utils;

/// Size of a leaf record in both tree kinds.
const LEAF_RECORD_SIZE: usize = 16;

/// The on-disk tree a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BTreeKind {
    /// Extent map of an inode fork (long-form header).
    BlockMap,
    /// Inode allocation tree of an allocation group (short-form header).
    InodeAllocation,
}

impl BTreeKind {
    /// Header size, including the version 5 extension when present.
    pub fn header_size(&self, io_handle: &IoHandle) -> usize {
        match (self, io_handle.has_crc()) {
            (BTreeKind::BlockMap, false) => BTREE_LONG_HEADER_SIZE,
            (BTreeKind::BlockMap, true) => BTREE_LONG_HEADER_SIZE + BTREE_LONG_CRC_PADDING,
            (BTreeKind::InodeAllocation, false) => BTREE_SHORT_HEADER_SIZE,
            (BTreeKind::InodeAllocation, true) => {
                BTREE_SHORT_HEADER_SIZE + BTREE_SHORT_CRC_PADDING
            }
        }
    }

    /// Size of one key and of one child pointer in an interior node.
    pub fn key_pointer_size(&self) -> (usize, usize) {
        match self {
            BTreeKind::BlockMap => (8, 8),
            BTreeKind::InodeAllocation => (4, 4),
        }
    }

    fn magic(&self, io_handle: &IoHandle) -> u32 {
        match (self, io_handle.has_crc()) {
            (BTreeKind::BlockMap, false) => BMAP_MAGIC,
            (BTreeKind::BlockMap, true) => BMAP_CRC_MAGIC,
            (BTreeKind::InodeAllocation, false) => IBT_MAGIC,
            (BTreeKind::InodeAllocation, true) => IBT_CRC_MAGIC,
        }
    }
}

#[derive(BinRead)]
#[br(big)]
struct ShortHeader {
    magic: u32,
    level: u16,
    number_of_records: u16,
    left_sibling: u32,
    right_sibling: u32,
}

#[derive(BinRead)]
#[br(big)]
struct LongHeader {
    magic: u32,
    level: u16,
    number_of_records: u16,
    left_sibling: u64,
    right_sibling: u64,
}

/// Common fields of a B+ tree node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct BTreeHeader {
    magic: u32,
    /// 0 for a leaf
    level: u16,
    number_of_records: u16,
    left_sibling: u64,
    right_sibling: u64,
}

impl From<ShortHeader> for BTreeHeader {
    fn from(h: ShortHeader) -> Self {
        BTreeHeader {
            magic: h.magic,
            level: h.level,
            number_of_records: h.number_of_records,
            left_sibling: h.left_sibling.into(),
            right_sibling: h.right_sibling.into(),
        }
    }
}

impl From<LongHeader> for BTreeHeader {
    fn from(h: LongHeader) -> Self {
        BTreeHeader {
            magic: h.magic,
            level: h.level,
            number_of_records: h.number_of_records,
            left_sibling: h.left_sibling,
            right_sibling: h.right_sibling,
        }
    }
}

/// One validated B+ tree node.
///
/// Records are kept as raw bytes; the tree-specific modules decode them.
#[derive(Debug, Clone)]
pub struct BTreeBlock {
    kind: BTreeKind,
    header: BTreeHeader,
    header_size: usize,
    data: Vec<u8>,
}

impl BTreeBlock {
    /// Reads one node of `io_handle.block_size()` bytes at `file_offset`.
    ///
    /// # Errors
    /// - `Io` if the block cannot be read in full
    /// - `Argument` if the node fails validation, see [`BTreeBlock::read_data`]
    pub fn read_block<D: BlockDevice + ?Sized>(
        device: &mut D,
        io_handle: &IoHandle,
        kind: BTreeKind,
        file_offset: u64,
    ) -> Result<Self> {
        debug!("Reading {kind:?} B+ tree block at offset {file_offset} (0x{file_offset:08x})");
        let data = utils::read_at(device, file_offset, io_handle.block_size() as usize)
            .map_err(|err| err.context("unable to read B+ tree block"))?;
        Self::read_data(data, kind, io_handle)
            .map_err(|err| err.context(format!("invalid B+ tree block at offset {file_offset}")))
    }

    /// Decodes and validates a node from a raw buffer.
    ///
    /// # Errors
    /// - `Argument` if the buffer is shorter than the header
    /// - `Argument` if the magic does not match the tree kind
    /// - `Argument` if the record count implies more data than the buffer holds
    pub fn read_data(data: Vec<u8>, kind: BTreeKind, io_handle: &IoHandle) -> Result<Self> {
        let header_size = kind.header_size(io_handle);
        if data.len() < header_size {
            return Err(XfsError::Argument(format!(
                "data size {} smaller than B+ tree header size {header_size}",
                data.len()
            )));
        }

        let mut reader = io::Cursor::new(&data[..header_size]);
        let header: BTreeHeader = match kind {
            BTreeKind::BlockMap => reader.read_be::<LongHeader>()?.into(),
            BTreeKind::InodeAllocation => reader.read_be::<ShortHeader>()?.into(),
        };

        let expected = kind.magic(io_handle);
        if header.magic != expected {
            return Err(XfsError::Argument(format!(
                "unsupported B+ tree signature 0x{:08x}, expected 0x{expected:08x}",
                header.magic
            )));
        }

        let stride = Self::stride(kind, header.level);
        let capacity = (data.len() - header_size) / stride;
        if usize::from(header.number_of_records) > capacity {
            return Err(XfsError::Argument(format!(
                "number of records {} exceeds block capacity {capacity}",
                header.number_of_records
            )));
        }

        Ok(BTreeBlock {
            kind,
            header,
            header_size,
            data,
        })
    }

    /// Bytes taken per record: a leaf record, or a key plus its pointer.
    fn stride(kind: BTreeKind, level: u16) -> usize {
        if level == 0 {
            LEAF_RECORD_SIZE
        } else {
            let (key, pointer) = kind.key_pointer_size();
            key + pointer
        }
    }

    pub fn kind(&self) -> BTreeKind {
        self.kind
    }

    pub fn header(&self) -> &BTreeHeader {
        &self.header
    }

    pub fn is_leaf(&self) -> bool {
        self.header.level == 0
    }

    pub fn number_of_records(&self) -> usize {
        self.header.number_of_records.into()
    }

    /// Raw bytes of leaf record `index`.
    pub fn record(&self, index: usize) -> Result<&[u8]> {
        if !self.is_leaf() {
            return Err(XfsError::Runtime("B+ tree node is not a leaf".into()));
        }
        self.check_index(index)?;
        utils::slice_at(
            &self.data,
            self.header_size + index * LEAF_RECORD_SIZE,
            LEAF_RECORD_SIZE,
        )
    }

    /// Raw bytes of the key of interior entry `index`.
    pub fn key(&self, index: usize) -> Result<&[u8]> {
        let (key_size, _) = self.kind.key_pointer_size();
        self.check_interior(index)?;
        utils::slice_at(&self.data, self.header_size + index * key_size, key_size)
    }

    /// Child pointer of interior entry `index`.
    ///
    /// Pointers follow the key area, which spans the node's full key capacity.
    pub fn pointer(&self, index: usize) -> Result<u64> {
        let (key_size, pointer_size) = self.kind.key_pointer_size();
        self.check_interior(index)?;
        let max_records = (self.data.len() - self.header_size) / (key_size + pointer_size);
        let offset = self.header_size + max_records * key_size + index * pointer_size;
        utils::be_uint_at(&self.data, offset, pointer_size)
    }

    fn check_interior(&self, index: usize) -> Result<()> {
        if self.is_leaf() {
            return Err(XfsError::Runtime("B+ tree node is a leaf".into()));
        }
        self.check_index(index)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.number_of_records() {
            return Err(XfsError::Argument(format!(
                "record index {index} out of bounds ({} records)",
                self.number_of_records()
            )));
        }
        Ok(())
    }
}
