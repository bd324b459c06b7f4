//! Directory entries and directory data blocks.
//!
//! Directories too large for the inode literal area keep their entries in
//! data blocks in the first 32 GiB of the directory's file space. Each data
//! block starts with a header and is followed by a mix of used entries and
//! free regions; a single-block directory also ends with a leaf tail.

use getset::{CopyGetters, Getters};
use log::debug;

use super::extent::{self, Extent};
use super::superblock::Superblock;
use crate::constants::*;
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};
use crate::utils;

/// One named child of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct DirectoryEntry {
    #[getset(get_copy = "pub")]
    inode_number: u64,
    name: Vec<u8>,
    /// Directory file type byte, when the volume records one
    #[getset(get_copy = "pub")]
    file_type: Option<u8>,
}

impl DirectoryEntry {
    pub fn new(inode_number: u64, name: Vec<u8>, file_type: Option<u8>) -> Self {
        DirectoryEntry {
            inode_number,
            name,
            file_type,
        }
    }

    /// Raw name bytes as stored on disk.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    fn is_dot_or_dot_dot(&self) -> bool {
        self.name == b"." || self.name == b".."
    }
}

/// Decodes the used entries of one directory data block, skipping `.` and `..`.
///
/// # Errors
/// - `Argument` if the block magic is not a directory data block magic
/// - `Argument` if an entry or free region runs past the end of the data area
pub fn read_data_block(
    block: &[u8],
    has_file_type: bool,
    entries: &mut Vec<DirectoryEntry>,
) -> Result<()> {
    let magic = utils::be_u32_at(block, 0)?;
    let (header_size, has_tail) = match magic {
        DIR2_BLOCK_MAGIC => (DIR2_DATA_HEADER_SIZE, true),
        DIR3_BLOCK_MAGIC => (DIR3_DATA_HEADER_SIZE, true),
        DIR2_DATA_MAGIC => (DIR2_DATA_HEADER_SIZE, false),
        DIR3_DATA_MAGIC => (DIR3_DATA_HEADER_SIZE, false),
        other => {
            return Err(XfsError::Argument(format!(
                "unsupported directory block signature: 0x{other:08x}"
            )));
        }
    };

    let end = if has_tail {
        // Tail: leaf entry count and stale count, preceded by the leaf entries
        let tail = block
            .len()
            .checked_sub(8)
            .ok_or_else(|| XfsError::Argument("directory block too small".into()))?;
        let leaf_count = utils::be_u32_at(block, tail)? as usize;
        leaf_count
            .checked_mul(8)
            .and_then(|size| tail.checked_sub(size))
            .filter(|end| *end >= header_size)
            .ok_or_else(|| {
                XfsError::Argument(format!(
                    "directory block leaf count {leaf_count} out of bounds"
                ))
            })?
    } else {
        block.len()
    };

    let mut offset = header_size;
    while offset < end {
        if utils::be_u16_at(block, offset)? == DIR2_DATA_FREE_TAG {
            let length = usize::from(utils::be_u16_at(block, offset + 2)?);
            if length == 0 || length % 8 != 0 || offset + length > end {
                return Err(XfsError::Argument(format!(
                    "invalid free region length {length} at offset {offset}"
                )));
            }
            offset += length;
            continue;
        }

        let inode_number = utils::be_u64_at(block, offset)?;
        let name_size = usize::from(utils::u8_at(block, offset + 8)?);
        if name_size == 0 {
            return Err(XfsError::Argument(format!(
                "empty directory entry name at offset {offset}"
            )));
        }
        let name = utils::slice_at(block, offset + 9, name_size)?.to_vec();
        let file_type = if has_file_type {
            Some(utils::u8_at(block, offset + 9 + name_size)?)
        } else {
            None
        };
        // inode number, name length, name, file type, then a 2-byte tag
        let size = (8 + 1 + name_size + usize::from(has_file_type) + 2).next_multiple_of(8);
        if offset + size > end {
            return Err(XfsError::Argument(format!(
                "directory entry at offset {offset} exceeds data area"
            )));
        }
        offset += size;

        let entry = DirectoryEntry::new(inode_number, name, file_type);
        if !entry.is_dot_or_dot_dot() {
            entries.push(entry);
        }
    }
    Ok(())
}

/// Reads every entry from the data blocks mapped by `extents`.
///
/// Blocks past the data section (leaf and free index blocks) are ignored.
pub fn read_block_entries<D: BlockDevice + ?Sized>(
    device: &mut D,
    sb: &Superblock,
    extents: &[Extent],
    has_file_type: bool,
) -> Result<Vec<DirectoryEntry>> {
    let blocks_per_dir_block = 1u64 << sb.directory_block_log();
    let leaf_block = DIR2_LEAF_OFFSET / u64::from(sb.block_size());

    let mut starts: Vec<u64> = extents
        .iter()
        .filter(|extent| extent.logical_block < leaf_block)
        .flat_map(|extent| {
            let end = extent
                .logical_block
                .saturating_add(extent.block_count)
                .min(leaf_block);
            (extent.logical_block..end).filter(move |block| block % blocks_per_dir_block == 0)
        })
        .collect();
    starts.sort_unstable();
    starts.dedup();

    let mut entries = Vec::new();
    for start in starts {
        debug!("Reading directory data block at file block {start}");
        let block =
            extent::read_logical_blocks(device, sb, extents, start, blocks_per_dir_block)?;
        read_data_block(&block, has_file_type, &mut entries)
            .map_err(|err| err.context(format!("unable to read directory block {start}")))?;
    }
    Ok(entries)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorDomain;
    use crate::filesystem::extent::tests::{open_device, pack, sample_superblock};

    /// Builds a data block (XDD3) of a multi-block directory; the rest of the
    /// block is one free region.
    pub(crate) fn data_block(size: usize, children: &[(&[u8], u64)]) -> Vec<u8> {
        let mut block = vec![0u8; size];
        block[0..4].copy_from_slice(&DIR3_DATA_MAGIC.to_be_bytes());
        let mut offset = DIR3_DATA_HEADER_SIZE;
        for (name, ino) in children {
            block[offset..offset + 8].copy_from_slice(&ino.to_be_bytes());
            block[offset + 8] = name.len() as u8;
            block[offset + 9..offset + 9 + name.len()].copy_from_slice(name);
            block[offset + 9 + name.len()] = 1;
            offset += (12 + name.len()).next_multiple_of(8);
        }
        block[offset..offset + 2].copy_from_slice(&DIR2_DATA_FREE_TAG.to_be_bytes());
        block[offset + 2..offset + 4].copy_from_slice(&((size - offset) as u16).to_be_bytes());
        block
    }

    /// Builds a single-block directory (XDB3) holding `children` plus `.` and `..`.
    pub(crate) fn block_directory(size: usize, children: &[(&[u8], u64)]) -> Vec<u8> {
        let mut block = vec![0u8; size];
        block[0..4].copy_from_slice(&DIR3_BLOCK_MAGIC.to_be_bytes());
        let mut offset = DIR3_DATA_HEADER_SIZE;
        let all: Vec<(&[u8], u64)> = [(&b"."[..], 1u64), (&b".."[..], 1u64)]
            .into_iter()
            .chain(children.iter().copied())
            .collect();
        for (name, ino) in &all {
            block[offset..offset + 8].copy_from_slice(&ino.to_be_bytes());
            block[offset + 8] = name.len() as u8;
            block[offset + 9..offset + 9 + name.len()].copy_from_slice(name);
            block[offset + 9 + name.len()] = 1;
            offset += (12 + name.len()).next_multiple_of(8);
        }
        let leaf_count = all.len();
        let end = size - 8 - leaf_count * 8;
        block[offset..offset + 2].copy_from_slice(&DIR2_DATA_FREE_TAG.to_be_bytes());
        block[offset + 2..offset + 4].copy_from_slice(&((end - offset) as u16).to_be_bytes());
        block[size - 8..size - 4].copy_from_slice(&(leaf_count as u32).to_be_bytes());
        block
    }

    #[test]
    fn block_directory_skips_dot_entries() {
        let block = block_directory(4096, &[(&b"a.txt"[..], 200), (&b"nested"[..], 201)]);
        let mut entries = Vec::new();
        read_data_block(&block, true, &mut entries).unwrap();
        let names: Vec<&[u8]> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec![&b"a.txt"[..], &b"nested"[..]]);
        assert_eq!(entries[1].inode_number(), 201);
    }

    #[test]
    fn bad_leaf_count_is_rejected() {
        let mut block = block_directory(4096, &[]);
        block[4088..4092].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = read_data_block(&block, true, &mut Vec::new()).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
    }

    #[test]
    fn oversized_name_is_rejected() {
        let mut block = block_directory(320, &[]);
        // first free region becomes an entry with a name past the data area
        let free = DIR3_DATA_HEADER_SIZE + 16 + 16;
        block[free..free + 8].copy_from_slice(&9u64.to_be_bytes());
        block[free + 8] = 255;
        let err = read_data_block(&block, true, &mut Vec::new()).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let block = vec![0u8; 512];
        assert!(read_data_block(&block, false, &mut Vec::new()).is_err());
    }

    #[test]
    fn entries_span_every_data_block() {
        let sb = sample_superblock();
        let mut image = vec![0u8; 16 * 4096];
        let first = data_block(4096, &[(&b"."[..], 64), (&b".."[..], 64), (&b"one"[..], 70)]);
        let second = data_block(4096, &[(&b"two"[..], 71), (&b"three"[..], 72)]);
        image[5 * 4096..6 * 4096].copy_from_slice(&first);
        image[6 * 4096..7 * 4096].copy_from_slice(&second);
        let mut device = open_device(image);

        let leaf = DIR2_LEAF_OFFSET / 4096;
        let extents = [
            Extent::decode(&pack(1, 6, 1, false)).unwrap(),
            Extent::decode(&pack(0, 5, 1, false)).unwrap(),
            // leaf block: zeroed, so decoding it would fail
            Extent::decode(&pack(leaf, 9, 1, false)).unwrap(),
        ];
        let entries = read_block_entries(&mut device, &sb, &extents, true).unwrap();
        let names: Vec<&[u8]> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
        assert_eq!(entries[2].inode_number(), 72);
        assert_eq!(entries[0].file_type(), Some(1));

        // a zeroed block inside the data section is not skipped
        let zeroed = [extents[1], Extent::decode(&pack(2, 9, 1, false)).unwrap()];
        let err = read_block_entries(&mut device, &sb, &zeroed, true).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
    }
}
