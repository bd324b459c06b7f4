//! Geometry shared by the block readers.

use getset::CopyGetters;

use super::superblock::Superblock;

/// Block size and format version, copied out of the superblock so block
/// readers do not need the whole superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct IoHandle {
    block_size: u32,
    format_version: u8,
}

impl IoHandle {
    pub fn new(block_size: u32, format_version: u8) -> Self {
        IoHandle {
            block_size,
            format_version,
        }
    }

    pub fn from_superblock(sb: &Superblock) -> Self {
        Self::new(sb.block_size(), sb.format_version())
    }

    /// Whether metadata blocks carry the version 5 self-describing header.
    pub fn has_crc(&self) -> bool {
        self.format_version >= 5
    }
}
