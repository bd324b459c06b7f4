//! On-disk inodes.
//!
//! An inode is a fixed core followed by the literal area, which is split
//! between the data fork and, when `fork_offset` is non-zero, the attribute
//! fork. Version 3 inodes carry a larger core with a creation time.

use binread::{BinRead, BinReaderExt};
use getset::{CopyGetters, Getters};
use log::debug;
use std::io;

use super::superblock::Superblock;
use crate::constants::*;
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};
use crate::utils;

/// Storage format of an inode fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkFormat {
    /// Character or block device number
    Device,
    /// Data inline in the literal area
    Local,
    /// Inline list of extents
    Extents,
    /// Root of a block map B+ tree
    BTree,
    Unknown(u8),
}

impl From<u8> for ForkFormat {
    fn from(value: u8) -> Self {
        match value {
            0 => ForkFormat::Device,
            1 => ForkFormat::Local,
            2 => ForkFormat::Extents,
            3 => ForkFormat::BTree,
            other => ForkFormat::Unknown(other),
        }
    }
}

/// Core fields present in every inode version.
#[derive(BinRead, Debug, Clone, Getters, CopyGetters)]
#[br(big)]
pub struct InodeCore {
    #[getset(get_copy = "pub")]
    magic: u16,
    /// File type and permission bits
    #[getset(get_copy = "pub")]
    mode: u16,
    #[getset(get_copy = "pub")]
    version: u8,
    data_format: u8,
    /// Link count of version 1 inodes
    old_link_count: u16,
    #[getset(get_copy = "pub")]
    owner: u32,
    #[getset(get_copy = "pub")]
    group: u32,
    link_count: u32,
    project_id_low: u16,
    project_id_high: u16,
    padding: [u8; 6],
    flush_counter: u16,
    access_time: [u8; 8],
    modification_time: [u8; 8],
    inode_change_time: [u8; 8],
    #[getset(get_copy = "pub")]
    size: u64,
    #[getset(get_copy = "pub")]
    number_of_blocks: u64,
    extent_size_hint: u32,
    #[getset(get_copy = "pub")]
    number_of_extents: u32,
    #[getset(get_copy = "pub")]
    number_of_attribute_extents: u16,
    /// Attribute fork offset in 8-byte units from the start of the literal area
    #[getset(get_copy = "pub")]
    fork_offset: u8,
    attribute_format: u8,
    dmapi_event_mask: u32,
    dmapi_state: u16,
    #[getset(get_copy = "pub")]
    flags: u16,
    generation: u32,
    next_unlinked: u32,
    #[br(if(version >= 3))]
    v3: Option<InodeCoreV3>,
}

/// Version 3 extension of the inode core.
#[derive(BinRead, Debug, Clone)]
#[br(big)]
struct InodeCoreV3 {
    checksum: u32,
    change_count: u64,
    log_sequence_number: u64,
    flags2: u64,
    cow_extent_size_hint: u32,
    padding: [u8; 12],
    creation_time: [u8; 8],
    inode_number: u64,
    uuid: [u8; 16],
}

/// A decoded inode with its literal area.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Inode {
    #[getset(get_copy = "pub")]
    inode_number: u64,
    #[get = "pub"]
    core: InodeCore,
    core_size: usize,
    data: Vec<u8>,
}

impl Inode {
    /// Reads inode `inode_number` from the volume.
    ///
    /// # Errors
    /// - `Argument` if the inode number is out of bounds or the inode is malformed
    /// - `Io` if the inode cannot be read
    pub fn read<D: BlockDevice + ?Sized>(
        device: &mut D,
        sb: &Superblock,
        inode_number: u64,
    ) -> Result<Inode> {
        let offset = sb.inode_offset(inode_number)?;
        debug!("Reading inode {inode_number} at offset {offset} (0x{offset:08x})");
        let data = utils::read_at(device, offset, sb.inode_size().into())?;
        Self::from_bytes(inode_number, data)
    }

    /// Decodes an inode from its raw on-disk bytes.
    pub fn from_bytes(inode_number: u64, data: Vec<u8>) -> Result<Inode> {
        if data.len() < INODE_CORE_SIZE_V2 {
            return Err(XfsError::Argument(format!(
                "inode data size {} too small",
                data.len()
            )));
        }
        let version = data[4];
        let core_size = match version {
            1 | 2 => INODE_CORE_SIZE_V2,
            3 => INODE_CORE_SIZE_V3,
            other => {
                return Err(XfsError::Argument(format!(
                    "unsupported inode version {other}"
                )));
            }
        };
        if data.len() < core_size {
            return Err(XfsError::Argument(format!(
                "inode data size {} smaller than core size {core_size}",
                data.len()
            )));
        }

        let mut reader = io::Cursor::new(&data[..core_size]);
        let core: InodeCore = reader.read_be()?;
        if core.magic != INODE_MAGIC {
            return Err(XfsError::Argument(format!(
                "unsupported inode signature 0x{:04x}",
                core.magic
            )));
        }
        let literal_size = data.len() - core_size;
        if usize::from(core.fork_offset) * 8 > literal_size {
            return Err(XfsError::Argument(format!(
                "attribute fork offset {} out of bounds",
                core.fork_offset
            )));
        }

        Ok(Inode {
            inode_number,
            core,
            core_size,
            data,
        })
    }

    /// Bytes of the data fork.
    pub fn data_fork(&self) -> &[u8] {
        let start = self.core_size;
        let end = if self.core.fork_offset == 0 {
            self.data.len()
        } else {
            start + usize::from(self.core.fork_offset) * 8
        };
        &self.data[start..end]
    }

    /// Bytes of the attribute fork, if the inode has one.
    pub fn attribute_fork(&self) -> Option<&[u8]> {
        if self.core.fork_offset == 0 {
            return None;
        }
        Some(&self.data[self.core_size + usize::from(self.core.fork_offset) * 8..])
    }

    pub fn data_format(&self) -> ForkFormat {
        self.core.data_format.into()
    }

    pub fn attribute_format(&self) -> ForkFormat {
        self.core.attribute_format.into()
    }

    pub fn mode(&self) -> u16 {
        self.core.mode
    }

    pub fn size(&self) -> u64 {
        self.core.size
    }

    pub fn file_type(&self) -> u16 {
        self.core.mode & S_IFMT
    }

    pub fn is_directory(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.file_type() == S_IFLNK
    }

    pub fn is_device(&self) -> bool {
        matches!(self.file_type(), S_IFCHR | S_IFBLK)
    }

    /// Link count; version 1 inodes keep it in a 16-bit field.
    pub fn number_of_links(&self) -> u32 {
        if self.core.version == 1 {
            self.core.old_link_count.into()
        } else {
            self.core.link_count
        }
    }

    fn has_big_time(&self) -> bool {
        self.core
            .v3
            .as_ref()
            .is_some_and(|v3| v3.flags2 & DIFLAG2_BIGTIME != 0)
    }

    fn timestamp(&self, raw: &[u8; 8]) -> i64 {
        if self.has_big_time() {
            let counter = u64::from_be_bytes(*raw);
            (counter as i64).wrapping_sub(BIGTIME_EPOCH_OFFSET * 1_000_000_000)
        } else {
            let seconds = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
            let nanoseconds = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
            i64::from(seconds) * 1_000_000_000 + i64::from(nanoseconds)
        }
    }

    /// Access time in nanoseconds since the Unix epoch.
    pub fn access_time(&self) -> i64 {
        self.timestamp(&self.core.access_time)
    }

    pub fn modification_time(&self) -> i64 {
        self.timestamp(&self.core.modification_time)
    }

    pub fn inode_change_time(&self) -> i64 {
        self.timestamp(&self.core.inode_change_time)
    }

    /// Creation time; only version 3 inodes record one.
    pub fn creation_time(&self) -> Option<i64> {
        self.core
            .v3
            .as_ref()
            .map(|v3| self.timestamp(&v3.creation_time))
    }

    /// Major and minor numbers of a character or block device.
    ///
    /// # Errors
    /// `Argument` if the data fork is too small to hold the number.
    pub fn device_number(&self) -> Result<Option<(u32, u32)>> {
        if !self.is_device() || self.data_format() != ForkFormat::Device {
            return Ok(None);
        }
        let device = utils::be_u32_at(self.data_fork(), 0)?;
        Ok(Some((device >> 18, device & 0x3FFFF)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Raw version 3 inode of 512 bytes.
    pub(crate) fn raw_inode(mode: u16, format: u8, size: u64) -> Vec<u8> {
        let mut data = vec![0u8; 512];
        data[0..2].copy_from_slice(&INODE_MAGIC.to_be_bytes());
        data[2..4].copy_from_slice(&mode.to_be_bytes());
        data[4] = 3;
        data[5] = format;
        data[0x10..0x14].copy_from_slice(&1u32.to_be_bytes());
        data[0x38..0x40].copy_from_slice(&size.to_be_bytes());
        data
    }

    #[test]
    fn decodes_core_fields() {
        let mut data = raw_inode(0o100644, 2, 5);
        data[0x08..0x0C].copy_from_slice(&1000u32.to_be_bytes());
        data[0x0C..0x10].copy_from_slice(&100u32.to_be_bytes());
        data[0x28..0x2C].copy_from_slice(&1_700_000_000u32.to_be_bytes());
        data[0x2C..0x30].copy_from_slice(&5u32.to_be_bytes());
        let inode = Inode::from_bytes(65, data).unwrap();
        assert_eq!(inode.mode(), 0o100644);
        assert_eq!(inode.size(), 5);
        assert_eq!(inode.core().owner(), 1000);
        assert_eq!(inode.core().group(), 100);
        assert_eq!(inode.number_of_links(), 1);
        assert_eq!(inode.modification_time(), 1_700_000_000_000_000_005);
        assert_eq!(inode.creation_time(), Some(0));
        assert_eq!(inode.data_format(), ForkFormat::Extents);
        assert_eq!(inode.data_fork().len(), 512 - INODE_CORE_SIZE_V3);
    }

    #[test]
    fn legacy_time_is_signed() {
        let mut data = raw_inode(0o100644, 2, 0);
        data[0x20..0x24].copy_from_slice(&(-1i32).to_be_bytes());
        let inode = Inode::from_bytes(65, data).unwrap();
        assert_eq!(inode.access_time(), -1_000_000_000);
    }

    #[test]
    fn big_time_counts_from_1901() {
        let mut data = raw_inode(0o100644, 2, 0);
        data[0x78..0x80].copy_from_slice(&DIFLAG2_BIGTIME.to_be_bytes());
        let counter = (BIGTIME_EPOCH_OFFSET as u64 + 10) * 1_000_000_000;
        data[0x30..0x38].copy_from_slice(&counter.to_be_bytes());
        let inode = Inode::from_bytes(65, data).unwrap();
        assert_eq!(inode.inode_change_time(), 10_000_000_000);
    }

    #[test]
    fn version_2_has_no_creation_time() {
        let mut data = raw_inode(0o100644, 2, 0);
        data[4] = 2;
        let inode = Inode::from_bytes(65, data).unwrap();
        assert_eq!(inode.creation_time(), None);
        assert_eq!(inode.data_fork().len(), 512 - INODE_CORE_SIZE_V2);
    }

    #[test]
    fn forks_split_at_fork_offset() {
        let mut data = raw_inode(0o100644, 2, 0);
        data[0x52] = 15;
        let inode = Inode::from_bytes(65, data).unwrap();
        assert_eq!(inode.data_fork().len(), 120);
        assert_eq!(inode.attribute_fork().unwrap().len(), 512 - INODE_CORE_SIZE_V3 - 120);
    }

    #[test]
    fn device_numbers_split_major_minor() {
        let mut data = raw_inode(0o020620, 0, 0);
        let dev: u32 = (136 << 18) | 3;
        data[INODE_CORE_SIZE_V3..INODE_CORE_SIZE_V3 + 4].copy_from_slice(&dev.to_be_bytes());
        let inode = Inode::from_bytes(70, data).unwrap();
        assert_eq!(inode.device_number().unwrap(), Some((136, 3)));
    }

    #[test]
    fn malformed_inodes_are_rejected() {
        let mut data = raw_inode(0o100644, 2, 0);
        data[0] = 0;
        assert!(Inode::from_bytes(65, data).is_err());

        let mut data = raw_inode(0o100644, 2, 0);
        data[0x52] = 255;
        assert!(Inode::from_bytes(65, data).is_err());

        assert!(Inode::from_bytes(65, vec![0u8; 64]).is_err());
    }
}
