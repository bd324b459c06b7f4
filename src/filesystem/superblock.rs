//! XFS superblock.
//!
//! This module implements:
//! - Superblock parsing from the first sector of the volume
//! - Geometry checks the address arithmetic depends on
//! - Optional validation of the size fields against their log2 counterparts
//! - Inode number and filesystem block address translation

use binread::{BinRead, BinReaderExt};
use getset::{CopyGetters, Getters};
use log::debug;
use std::io;

use crate::constants::*;
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};
use crate::utils;

/// Primary superblock, as found at offset 0 of allocation group 0.
///
/// Only the fields up to the v5 feature words are decoded; the remainder of
/// the sector (CRC, quota and metadata UUID fields) is not used for reading.
#[derive(BinRead, Debug, Clone, Getters, CopyGetters)]
#[br(big)]
pub struct Superblock {
    /// Magic number, "XFSB"
    #[getset(get_copy = "pub")]
    magic: u32,
    /// Filesystem block size in bytes
    #[getset(get_copy = "pub")]
    block_size: u32,
    /// Number of blocks in the data subvolume
    #[getset(get_copy = "pub")]
    data_blocks: u64,
    realtime_blocks: u64,
    realtime_extents: u64,
    /// Filesystem UUID
    #[get = "pub"]
    uuid: [u8; 16],
    log_start: u64,
    /// Inode number of the root directory
    #[getset(get_copy = "pub")]
    root_inode: u64,
    realtime_bitmap_inode: u64,
    realtime_summary_inode: u64,
    realtime_extent_size: u32,
    /// Size of an allocation group in blocks
    #[getset(get_copy = "pub")]
    ag_blocks: u32,
    /// Number of allocation groups
    #[getset(get_copy = "pub")]
    ag_count: u32,
    realtime_bitmap_blocks: u32,
    log_blocks: u32,
    /// Version number and version feature bits; the low nibble is the format version
    #[getset(get_copy = "pub")]
    version_number: u16,
    /// Sector size in bytes
    #[getset(get_copy = "pub")]
    sector_size: u16,
    /// Inode size in bytes
    #[getset(get_copy = "pub")]
    inode_size: u16,
    /// Number of inodes per block
    #[getset(get_copy = "pub")]
    inodes_per_block: u16,
    /// Volume label, NUL padded
    name: [u8; 12],
    #[getset(get_copy = "pub")]
    block_log: u8,
    sector_log: u8,
    inode_log: u8,
    #[getset(get_copy = "pub")]
    inodes_per_block_log: u8,
    #[getset(get_copy = "pub")]
    ag_block_log: u8,
    realtime_extent_log: u8,
    in_progress: u8,
    inode_max_percent: u8,
    /// Number of allocated inodes
    #[getset(get_copy = "pub")]
    inode_count: u64,
    /// Number of free inodes
    #[getset(get_copy = "pub")]
    free_inodes: u64,
    /// Number of free data blocks
    #[getset(get_copy = "pub")]
    free_blocks: u64,
    free_realtime_extents: u64,
    user_quota_inode: u64,
    group_quota_inode: u64,
    quota_flags: u16,
    flags: u8,
    shared_version: u8,
    inode_alignment: u32,
    stripe_unit: u32,
    stripe_width: u32,
    /// log2 of the directory block size in filesystem blocks
    #[getset(get_copy = "pub")]
    directory_block_log: u8,
    log_sector_log: u8,
    log_sector_size: u16,
    log_stripe_unit: u32,
    /// Additional version 4 feature flags
    #[getset(get_copy = "pub")]
    features2: u32,
    bad_features2: u32,
    #[getset(get_copy = "pub")]
    features_compat: u32,
    #[getset(get_copy = "pub")]
    features_ro_compat: u32,
    /// Version 5 incompatible feature flags
    #[getset(get_copy = "pub")]
    features_incompat: u32,
    features_log_incompat: u32,
}

impl Superblock {
    /// Reads and optionally validates the superblock at the start of a device.
    ///
    /// # Parameters
    /// - `device`: The device holding the volume, already open
    /// - `validate`: Whether to check the size fields against each other
    ///
    /// # Returns
    /// - `Ok(Superblock)`: The parsed superblock
    /// - `Err(XfsError)`: If reading fails or the superblock is not recognized
    ///
    /// # Errors
    /// - `Io` if the sector cannot be read, the magic is wrong, the format
    ///   version is not 4 or 5, or the geometry is unusable
    /// - `Io` if `validate` is true and a size field is inconsistent
    pub fn from<D: BlockDevice + ?Sized>(device: &mut D, validate: bool) -> Result<Superblock> {
        let buf = utils::read_at(device, 0, SB_READ_SIZE)
            .map_err(|err| err.context("unable to read superblock"))?;
        Self::from_bytes(&buf, validate)
    }

    /// Decodes a superblock from the first bytes of a volume.
    pub fn from_bytes(buf: &[u8], validate: bool) -> Result<Superblock> {
        if buf.len() < SB_READ_SIZE {
            return Err(XfsError::io(format!(
                "superblock data too small: {} bytes",
                buf.len()
            )));
        }
        let mut reader = io::Cursor::new(buf);
        let sb: Superblock = reader.read_be()?;

        if sb.magic != SB_MAGIC {
            return Err(XfsError::io(format!(
                "unsupported superblock signature: 0x{:08X}",
                sb.magic
            )));
        }
        let sb = sb.check_geometry()?;
        debug!(
            "Superblock: format version {}, block size {}, {} AGs of {} blocks, root inode {}",
            sb.format_version(),
            sb.block_size,
            sb.ag_count,
            sb.ag_blocks,
            sb.root_inode
        );

        if validate { sb.validate() } else { Ok(sb) }
    }

    /// Checks the fields every address computation depends on.
    ///
    /// Always applied, whether or not validation is requested.
    fn check_geometry(self) -> Result<Self> {
        let version = self.format_version();
        if version != 4 && version != 5 {
            return Err(XfsError::io(format!("unsupported format version: {version}")));
        }
        if self.block_size == 0 || self.inode_size == 0 || self.inodes_per_block == 0 {
            return Err(XfsError::io("invalid superblock: zero block or inode size"));
        }
        if self.ag_count == 0 || self.ag_blocks == 0 {
            return Err(XfsError::io("invalid superblock: empty allocation group layout"));
        }
        if u32::from(self.ag_block_log) + u32::from(self.inodes_per_block_log) >= 64
            || u32::from(self.ag_block_log) >= 32
            || u32::from(self.block_log) + u32::from(self.directory_block_log) >= 32
        {
            return Err(XfsError::io("invalid superblock: log2 values out of range"));
        }
        if u64::from(self.ag_blocks) > 1u64 << self.ag_block_log {
            return Err(XfsError::io(format!(
                "invalid superblock: AG size {} exceeds 2^{}",
                self.ag_blocks, self.ag_block_log
            )));
        }
        Ok(self)
    }

    /// Validates the superblock size fields.
    ///
    /// # Errors
    /// - `Io` if the block size is not a power of two in 512..=65536 or does not match its log2
    /// - `Io` if the sector size is not a power of two in 512..=32768 or does not match its log2
    /// - `Io` if the inode size is not a power of two in 256..=2048 or does not match its log2
    /// - `Io` if the inodes per block do not match the block and inode sizes
    fn validate(self) -> Result<Self> {
        let pow2_in = |value: u32, min: u32, max: u32, log: u8| {
            value.is_power_of_two() && (min..=max).contains(&value) && value == 1u32 << log.min(31)
        };

        if !pow2_in(self.block_size, 512, 65536, self.block_log) {
            return Err(XfsError::io(format!(
                "invalid block size: {} (log2 {})",
                self.block_size, self.block_log
            )));
        }
        if !pow2_in(self.sector_size.into(), 512, 32768, self.sector_log) {
            return Err(XfsError::io(format!(
                "invalid sector size: {} (log2 {})",
                self.sector_size, self.sector_log
            )));
        }
        if !pow2_in(self.inode_size.into(), 256, 2048, self.inode_log) {
            return Err(XfsError::io(format!(
                "invalid inode size: {} (log2 {})",
                self.inode_size, self.inode_log
            )));
        }
        if u32::from(self.inodes_per_block) != self.block_size / u32::from(self.inode_size)
            || u32::from(self.inodes_per_block) != 1u32 << self.inodes_per_block_log.min(31)
        {
            return Err(XfsError::io(format!(
                "invalid inodes per block: {} (log2 {})",
                self.inodes_per_block, self.inodes_per_block_log
            )));
        }
        Ok(self)
    }

    /// Format version, 4 or 5.
    pub fn format_version(&self) -> u8 {
        (self.version_number & 0x000F) as u8
    }

    /// Whether metadata blocks carry the version 5 self-describing header.
    pub fn has_crc(&self) -> bool {
        self.format_version() == 5
    }

    /// Whether directory entries carry a file type byte.
    pub fn has_file_type(&self) -> bool {
        if self.has_crc() {
            self.features_incompat & SB_FEAT_INCOMPAT_FTYPE != 0
        } else {
            self.features2 & SB_VERSION2_FTYPE != 0
        }
    }

    /// Volume label with the NUL padding removed.
    pub fn label(&self) -> &[u8] {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(self.name.len());
        &self.name[..end]
    }

    /// Size of a directory block in bytes.
    pub fn directory_block_size(&self) -> u32 {
        self.block_size << self.directory_block_log
    }

    /// Byte offset of the start of an allocation group.
    pub fn ag_offset(&self, ag: u32) -> Result<u64> {
        self.block_byte_offset(u64::from(ag), 0)
            .ok_or_else(|| XfsError::Argument(format!("AG {ag} offset overflows")))
    }

    /// `(ag * ag_blocks + agbno) * block_size`, `None` on overflow.
    fn block_byte_offset(&self, ag: u64, agbno: u64) -> Option<u64> {
        ag.checked_mul(u64::from(self.ag_blocks))?
            .checked_add(agbno)?
            .checked_mul(u64::from(self.block_size))
    }

    /// Byte offset of an inode.
    ///
    /// # Errors
    /// `Argument` if the inode number points outside the allocation groups.
    pub fn inode_offset(&self, inode_number: u64) -> Result<u64> {
        let agino_bits = u32::from(self.ag_block_log) + u32::from(self.inodes_per_block_log);
        let ag = inode_number >> agino_bits;
        let agino = inode_number & ((1u64 << agino_bits) - 1);
        let agbno = agino >> self.inodes_per_block_log;
        let index = agino & ((1u64 << self.inodes_per_block_log) - 1);

        if ag >= u64::from(self.ag_count) || agbno >= u64::from(self.ag_blocks) {
            return Err(XfsError::Argument(format!(
                "inode number {inode_number} out of bounds"
            )));
        }
        self.block_byte_offset(ag, agbno)
            .and_then(|block| block.checked_add(index * u64::from(self.inode_size)))
            .ok_or_else(|| {
                XfsError::Argument(format!("inode number {inode_number} offset overflows"))
            })
    }

    /// Builds an absolute inode number from an AG number and AG-relative inode.
    pub fn inode_number(&self, ag: u32, agino: u32) -> u64 {
        let agino_bits = u32::from(self.ag_block_log) + u32::from(self.inodes_per_block_log);
        (u64::from(ag) << agino_bits) | u64::from(agino)
    }

    /// Byte offset of a filesystem block number (AG number in the high bits).
    ///
    /// # Errors
    /// `Argument` if the block lies outside the allocation groups.
    pub fn fs_block_offset(&self, fs_block: u64) -> Result<u64> {
        let ag = fs_block >> self.ag_block_log;
        let agbno = fs_block & ((1u64 << self.ag_block_log) - 1);
        if ag >= u64::from(self.ag_count) || agbno >= u64::from(self.ag_blocks) {
            return Err(XfsError::Argument(format!(
                "filesystem block {fs_block} out of bounds"
            )));
        }
        self.block_byte_offset(ag, agbno).ok_or_else(|| {
            XfsError::Argument(format!("filesystem block {fs_block} offset overflows"))
        })
    }

    /// Byte offset of an AG-relative block.
    pub fn ag_block_offset(&self, ag: u32, agbno: u32) -> Result<u64> {
        if agbno >= self.ag_blocks {
            return Err(XfsError::Argument(format!(
                "AG block {agbno} out of bounds in AG {ag}"
            )));
        }
        self.block_byte_offset(u64::from(ag), u64::from(agbno))
            .ok_or_else(|| XfsError::Argument(format!("AG {ag} block {agbno} offset overflows")))
    }
}
