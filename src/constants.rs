//! On-disk constants of the XFS format.

/// Superblock magic, "XFSB".
pub const SB_MAGIC: u32 = 0x5846_5342;
/// Bytes read to decode the primary superblock.
pub const SB_READ_SIZE: usize = 512;

/// Inode magic, "IN".
pub const INODE_MAGIC: u16 = 0x494E;
/// Size of the inode core for version 1 and 2 inodes.
pub const INODE_CORE_SIZE_V2: usize = 100;
/// Size of the inode core for version 3 inodes.
pub const INODE_CORE_SIZE_V3: usize = 176;

/// Inode flags2 bit: timestamps are 64-bit nanosecond counters.
pub const DIFLAG2_BIGTIME: u64 = 1 << 3;
/// Seconds between the big-time epoch and the Unix epoch.
pub const BIGTIME_EPOCH_OFFSET: i64 = 1 << 31;

/// Incompatible feature: directory entries carry a file type byte.
pub const SB_FEAT_INCOMPAT_FTYPE: u32 = 1 << 0;
/// Version-4 features2 bit for the directory file type byte.
pub const SB_VERSION2_FTYPE: u32 = 0x0200;

/// AG inode header magic, "XAGI".
pub const AGI_MAGIC: u32 = 0x5841_4749;

/// Inode allocation B+ tree magics.
pub const IBT_MAGIC: u32 = 0x4941_4254;
pub const IBT_CRC_MAGIC: u32 = 0x4941_4233;
/// Block map B+ tree magics.
pub const BMAP_MAGIC: u32 = 0x424D_4150;
pub const BMAP_CRC_MAGIC: u32 = 0x424D_4133;

/// Short-format B+ tree header, without and with the CRC extension.
pub const BTREE_SHORT_HEADER_SIZE: usize = 16;
pub const BTREE_SHORT_CRC_PADDING: usize = 40;
/// Long-format B+ tree header, without and with the CRC extension.
pub const BTREE_LONG_HEADER_SIZE: usize = 24;
pub const BTREE_LONG_CRC_PADDING: usize = 48;

/// Directory data block magics.
pub const DIR2_BLOCK_MAGIC: u32 = 0x5844_3242;
pub const DIR3_BLOCK_MAGIC: u32 = 0x5844_4233;
pub const DIR2_DATA_MAGIC: u32 = 0x5844_3244;
pub const DIR3_DATA_MAGIC: u32 = 0x5844_4433;
/// Directory data block header sizes.
pub const DIR2_DATA_HEADER_SIZE: usize = 16;
pub const DIR3_DATA_HEADER_SIZE: usize = 64;
/// Tag marking an unused region inside a directory data block.
pub const DIR2_DATA_FREE_TAG: u16 = 0xFFFF;
/// Directory data blocks live below this logical offset.
pub const DIR2_LEAF_OFFSET: u64 = 32 * 1024 * 1024 * 1024;

/// Attribute leaf block magics.
pub const ATTR_LEAF_MAGIC: u16 = 0xFBEE;
pub const ATTR3_LEAF_MAGIC: u16 = 0x3BEE;
pub const ATTR_LEAF_HEADER_SIZE: usize = 32;
pub const ATTR3_LEAF_HEADER_SIZE: usize = 80;

/// Attribute entry flags.
pub const ATTR_LOCAL: u8 = 0x01;
pub const ATTR_ROOT: u8 = 0x02;
pub const ATTR_SECURE: u8 = 0x04;
pub const ATTR_INCOMPLETE: u8 = 0x80;

/// Remote symbolic link block magic, "XSLM".
pub const SYMLINK_MAGIC: u32 = 0x5853_4C4D;
pub const SYMLINK_CRC_HEADER_SIZE: usize = 56;

/// Size of a packed extent record.
pub const EXTENT_RECORD_SIZE: usize = 16;

/// POSIX file type bits.
pub const S_IFMT: u16 = 0o170000;
pub const S_IFSOCK: u16 = 0o140000;
pub const S_IFLNK: u16 = 0o120000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFBLK: u16 = 0o060000;
pub const S_IFDIR: u16 = 0o040000;
pub const S_IFCHR: u16 = 0o020000;
pub const S_IFIFO: u16 = 0o010000;

/// Nesting limit of the hierarchy walk.
pub const DEFAULT_MAX_DEPTH: usize = 1024;
