//! File entries: an inode seen through the volume that owns it.
//!
//! Directory children, extended attributes and symbolic link targets are
//! decoded the first time they are asked for and cached on the entry.

use std::cell::OnceCell;

use log::debug;

use super::attributes::{self, ExtendedAttribute};
use super::directory::{self, DirectoryEntry};
use super::directory_table;
use super::extent::{self, Extent};
use super::inode::{ForkFormat, Inode};
use super::volume::Volume;
use crate::constants::{SYMLINK_CRC_HEADER_SIZE, SYMLINK_MAGIC};
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};
use crate::utils;

/// Longest symbolic link target XFS stores.
const SYMLINK_MAX_SIZE: u64 = 1024;

/// Which fork of an inode a mapping is read from.
#[derive(Debug, Clone, Copy)]
enum Fork {
    Data,
    Attribute,
}

/// A file, directory or other object of an XFS volume.
///
/// Entries borrow their [`Volume`]; sub-entries are resolved from the
/// directory entries on demand and are independent of their parent.
#[derive(Debug)]
pub struct FileEntry<'v, D: BlockDevice> {
    volume: &'v Volume<D>,
    inode: Inode,
    /// Name in the parent directory; the root and entries opened by inode
    /// number have none
    name: Option<Vec<u8>>,
    entries: OnceCell<Vec<DirectoryEntry>>,
    attributes: OnceCell<Vec<ExtendedAttribute>>,
    symbolic_link_target: OnceCell<Option<Vec<u8>>>,
}

impl<'v, D: BlockDevice> FileEntry<'v, D> {
    pub(crate) fn new(volume: &'v Volume<D>, inode: Inode, name: Option<Vec<u8>>) -> Self {
        FileEntry {
            volume,
            inode,
            name,
            entries: OnceCell::new(),
            attributes: OnceCell::new(),
            symbolic_link_target: OnceCell::new(),
        }
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    pub fn inode_number(&self) -> u64 {
        self.inode.inode_number()
    }

    /// Raw name bytes, if the entry was reached through a directory.
    pub fn name(&self) -> Option<&[u8]> {
        self.name.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.inode.size()
    }

    pub fn mode(&self) -> u16 {
        self.inode.mode()
    }

    pub fn owner(&self) -> u32 {
        self.inode.core().owner()
    }

    pub fn group(&self) -> u32 {
        self.inode.core().group()
    }

    pub fn number_of_links(&self) -> u32 {
        self.inode.number_of_links()
    }

    pub fn is_directory(&self) -> bool {
        self.inode.is_directory()
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.inode.is_symbolic_link()
    }

    /// Major and minor numbers, for character and block devices.
    pub fn device_number(&self) -> Result<Option<(u32, u32)>> {
        self.inode.device_number()
    }

    /// Access time in nanoseconds since the Unix epoch.
    pub fn access_time(&self) -> i64 {
        self.inode.access_time()
    }

    pub fn modification_time(&self) -> i64 {
        self.inode.modification_time()
    }

    pub fn inode_change_time(&self) -> i64 {
        self.inode.inode_change_time()
    }

    /// Creation time, `Ok(None)` when the inode version does not record it.
    pub fn creation_time(&self) -> Result<Option<i64>> {
        Ok(self.inode.creation_time())
    }

    /// Extent map of one fork.
    fn extents(&self, fork: Fork) -> Result<Vec<Extent>> {
        let (format, data, count) = match fork {
            Fork::Data => (
                self.inode.data_format(),
                self.inode.data_fork(),
                u64::from(self.inode.core().number_of_extents()),
            ),
            Fork::Attribute => (
                self.inode.attribute_format(),
                self.inode.attribute_fork().unwrap_or_default(),
                u64::from(self.inode.core().number_of_attribute_extents()),
            ),
        };
        match format {
            ForkFormat::Extents => extent::read_extent_list(data, count),
            ForkFormat::BTree => {
                let mut device = self.volume.device()?;
                extent::read_extent_tree(
                    &mut *device,
                    self.volume.superblock(),
                    self.volume.io_handle(),
                    data,
                )
            }
            other => Err(XfsError::Argument(format!(
                "fork format {other:?} has no extent map"
            ))),
        }
    }

    fn directory_entries(&self) -> Result<&[DirectoryEntry]> {
        if let Some(entries) = self.entries.get() {
            return Ok(entries);
        }
        let entries = self.read_directory_entries().map_err(|err| {
            err.context(format!(
                "unable to read directory entries of inode {}",
                self.inode_number()
            ))
        })?;
        Ok(self.entries.get_or_init(|| entries))
    }

    fn read_directory_entries(&self) -> Result<Vec<DirectoryEntry>> {
        if !self.is_directory() {
            return Ok(Vec::new());
        }
        let sb = self.volume.superblock();
        match self.inode.data_format() {
            ForkFormat::Local => {
                let fork = self.inode.data_fork();
                // the literal area is larger than the directory it holds
                let used = usize::try_from(self.size()).unwrap_or(usize::MAX).min(fork.len());
                let (_, entries) = directory_table::read_entries(&fork[..used], sb.has_file_type())?;
                Ok(entries)
            }
            ForkFormat::Extents | ForkFormat::BTree => {
                let extents = self.extents(Fork::Data)?;
                let mut device = self.volume.device()?;
                directory::read_block_entries(&mut *device, sb, &extents, sb.has_file_type())
            }
            other => Err(XfsError::Argument(format!(
                "unsupported directory data fork format {other:?}"
            ))),
        }
    }

    /// Number of children, `.` and `..` excluded. Zero for non-directories.
    pub fn number_of_sub_file_entries(&self) -> Result<usize> {
        Ok(self.directory_entries()?.len())
    }

    /// Child at `index` in on-disk order.
    ///
    /// # Errors
    /// - `Argument` if `index` is out of bounds
    /// - `Argument` or `Io` if the child's inode cannot be read
    pub fn sub_file_entry_by_index(&self, index: usize) -> Result<FileEntry<'v, D>> {
        let entries = self.directory_entries()?;
        let entry = entries.get(index).ok_or_else(|| {
            XfsError::Argument(format!(
                "sub file entry index {index} out of bounds ({} entries)",
                entries.len()
            ))
        })?;
        self.volume
            .file_entry_with_name(entry.inode_number(), Some(entry.name().to_vec()))
    }

    /// Child named exactly `name`, or `Ok(None)`.
    pub fn sub_file_entry_by_name(&self, name: &[u8]) -> Result<Option<FileEntry<'v, D>>> {
        let entry = self
            .directory_entries()?
            .iter()
            .find(|entry| entry.name() == name);
        match entry {
            Some(entry) => self
                .volume
                .file_entry_with_name(entry.inode_number(), Some(entry.name().to_vec()))
                .map(Some),
            None => Ok(None),
        }
    }

    fn extended_attributes(&self) -> Result<&[ExtendedAttribute]> {
        if let Some(attributes) = self.attributes.get() {
            return Ok(attributes);
        }
        let attributes = self.read_extended_attributes().map_err(|err| {
            err.context(format!(
                "unable to read extended attributes of inode {}",
                self.inode_number()
            ))
        })?;
        Ok(self.attributes.get_or_init(|| attributes))
    }

    fn read_extended_attributes(&self) -> Result<Vec<ExtendedAttribute>> {
        let Some(fork) = self.inode.attribute_fork() else {
            return Ok(Vec::new());
        };
        match self.inode.attribute_format() {
            ForkFormat::Local => attributes::read_short_form(fork),
            ForkFormat::Extents | ForkFormat::BTree => {
                let extents = self.extents(Fork::Attribute)?;
                if extents.is_empty() {
                    return Ok(Vec::new());
                }
                let mut device = self.volume.device()?;
                attributes::read_attribute_blocks(&mut *device, self.volume.superblock(), &extents)
            }
            other => Err(XfsError::Argument(format!(
                "unsupported attribute fork format {other:?}"
            ))),
        }
    }

    pub fn number_of_extended_attributes(&self) -> Result<usize> {
        Ok(self.extended_attributes()?.len())
    }

    /// Extended attribute at `index`.
    ///
    /// # Errors
    /// `Argument` if `index` is out of bounds.
    pub fn extended_attribute_by_index(&self, index: usize) -> Result<&ExtendedAttribute> {
        let attributes = self.extended_attributes()?;
        attributes.get(index).ok_or_else(|| {
            XfsError::Argument(format!(
                "extended attribute index {index} out of bounds ({} attributes)",
                attributes.len()
            ))
        })
    }

    /// Target of a symbolic link, `Ok(None)` for other file types.
    pub fn symbolic_link_target(&self) -> Result<Option<&[u8]>> {
        if let Some(target) = self.symbolic_link_target.get() {
            return Ok(target.as_deref());
        }
        let target = self.read_symbolic_link_target().map_err(|err| {
            err.context(format!(
                "unable to read symbolic link target of inode {}",
                self.inode_number()
            ))
        })?;
        Ok(self.symbolic_link_target.get_or_init(|| target).as_deref())
    }

    fn read_symbolic_link_target(&self) -> Result<Option<Vec<u8>>> {
        if !self.is_symbolic_link() {
            return Ok(None);
        }
        let size = self.size();
        if size > SYMLINK_MAX_SIZE {
            return Err(XfsError::Argument(format!(
                "symbolic link target size {size} exceeds {SYMLINK_MAX_SIZE}"
            )));
        }
        let size = size as usize;
        let target = match self.inode.data_format() {
            ForkFormat::Local => local_target(self.inode.data_fork(), size)?,
            ForkFormat::Extents | ForkFormat::BTree => {
                let sb = self.volume.superblock();
                let per_block = target_bytes_per_block(sb.block_size() as usize, sb.has_crc())?;
                let blocks = size.div_ceil(per_block) as u64;
                let extents = self.extents(Fork::Data)?;
                let data = {
                    let mut device = self.volume.device()?;
                    extent::read_logical_blocks(&mut *device, sb, &extents, 0, blocks)?
                };
                remote_target(&data, sb.block_size() as usize, sb.has_crc(), size)?
            }
            other => {
                return Err(XfsError::Argument(format!(
                    "unsupported symbolic link data fork format {other:?}"
                )));
            }
        };
        debug!(
            "Inode {} links to {}",
            self.inode_number(),
            utils::escape_name(&target)
        );
        Ok(Some(target))
    }

    /// Size of the symbolic link target, `Ok(None)` for other file types.
    pub fn symbolic_link_target_size(&self) -> Result<Option<usize>> {
        Ok(self.symbolic_link_target()?.map(<[u8]>::len))
    }

    /// Copies the symbolic link target into `buffer`.
    ///
    /// # Returns
    /// The number of bytes written.
    ///
    /// # Errors
    /// - `Argument` if the entry is not a symbolic link
    /// - `Argument` if `buffer` is too small
    pub fn symbolic_link_target_into(&self, buffer: &mut [u8]) -> Result<usize> {
        let target = self.symbolic_link_target()?.ok_or_else(|| {
            XfsError::Argument(format!(
                "inode {} is not a symbolic link",
                self.inode_number()
            ))
        })?;
        let buffer_len = buffer.len();
        let destination = buffer.get_mut(..target.len()).ok_or_else(|| {
            XfsError::Argument(format!(
                "buffer of {buffer_len} bytes too small for target of {} bytes",
                target.len()
            ))
        })?;
        destination.copy_from_slice(target);
        Ok(target.len())
    }
}

/// Target stored in the inode literal area.
fn local_target(fork: &[u8], size: usize) -> Result<Vec<u8>> {
    Ok(utils::slice_at(fork, 0, size)?.to_vec())
}

fn target_bytes_per_block(block_size: usize, has_crc: bool) -> Result<usize> {
    let header = if has_crc { SYMLINK_CRC_HEADER_SIZE } else { 0 };
    block_size
        .checked_sub(header)
        .filter(|per_block| *per_block > 0)
        .ok_or_else(|| XfsError::Argument(format!("block size {block_size} too small")))
}

/// Target stored in remote blocks; v5 blocks each start with a header.
fn remote_target(data: &[u8], block_size: usize, has_crc: bool, size: usize) -> Result<Vec<u8>> {
    let mut target = Vec::with_capacity(size);
    for block in data.chunks(block_size) {
        let payload = if has_crc {
            let magic = utils::be_u32_at(block, 0)?;
            if magic != SYMLINK_MAGIC {
                return Err(XfsError::Argument(format!(
                    "unsupported symbolic link block signature 0x{magic:08x}"
                )));
            }
            block.get(SYMLINK_CRC_HEADER_SIZE..).ok_or_else(|| {
                XfsError::Argument("symbolic link block shorter than its header".into())
            })?
        } else {
            block
        };
        let take = payload.len().min(size - target.len());
        target.extend_from_slice(&payload[..take]);
        if target.len() == size {
            break;
        }
    }
    if target.len() < size {
        return Err(XfsError::Argument(format!(
            "symbolic link target truncated at {} of {size} bytes",
            target.len()
        )));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDomain;

    #[test]
    fn local_target_is_bounded_by_size() {
        let fork = b"/etc/hosts\0\0\0\0";
        assert_eq!(local_target(fork, 10).unwrap(), b"/etc/hosts".to_vec());
        assert!(local_target(fork, 64).is_err());
    }

    #[test]
    fn remote_target_skips_block_headers() {
        let block_size = 64;
        let mut data = vec![0u8; 2 * block_size];
        for block in data.chunks_mut(block_size) {
            block[0..4].copy_from_slice(&SYMLINK_MAGIC.to_be_bytes());
        }
        data[56..64].copy_from_slice(b"abcdefgh");
        data[64 + 56..64 + 60].copy_from_slice(b"ijkl");
        let target = remote_target(&data, block_size, true, 12).unwrap();
        assert_eq!(target, b"abcdefghijkl".to_vec());
    }

    #[test]
    fn remote_target_without_crc_is_raw() {
        let data = b"/very/long/target".to_vec();
        assert_eq!(remote_target(&data, 8, false, 10).unwrap(), b"/very/long".to_vec());
    }

    #[test]
    fn remote_target_checks_signature() {
        let data = vec![0u8; 64];
        let err = remote_target(&data, 64, true, 4).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
    }

    #[test]
    fn short_remote_target_is_rejected() {
        assert!(remote_target(b"abc", 8, false, 10).is_err());
        assert!(target_bytes_per_block(56, true).is_err());
        assert_eq!(target_bytes_per_block(4096, true).unwrap(), 4040);
    }
}
