//! An opened XFS volume.

use std::cell::{RefCell, RefMut};
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use super::file_entry::FileEntry;
use super::inode::Inode;
use super::inode_btree;
use super::io_handle::IoHandle;
use super::superblock::Superblock;
use crate::device::{AccessMode, BlockDevice};
use crate::error::{ErrorDomain, Result, XfsError};
use crate::traits::LayoutDisplay;

/// Path component separator.
pub const SEPARATOR: char = '/';

/// An XFS volume read from a [`BlockDevice`].
///
/// The volume owns its device. File entries borrow the volume and read
/// through it on demand, so a volume serves one thread at a time; parallel
/// readers open their own device and volume over the same image.
#[derive(Debug)]
pub struct Volume<D: BlockDevice> {
    device: RefCell<Option<D>>,
    superblock: Superblock,
    io_handle: IoHandle,
    abort: Arc<AtomicBool>,
}

impl<D: BlockDevice> Volume<D> {
    /// Opens the volume on `device`, opening the device read-only if needed.
    ///
    /// # Parameters
    /// - `device`: The device holding the volume
    /// - `validate`: Whether to validate the superblock size fields
    ///
    /// # Errors
    /// `Io` if the device cannot be opened or the superblock cannot be read
    /// or is not recognized.
    pub fn open(mut device: D, validate: bool) -> Result<Self> {
        if !device.is_open() {
            device.open(AccessMode::Read)?;
        }
        let superblock = Superblock::from(&mut device, validate).map_err(|err| match err {
            XfsError::Io { .. } => err,
            other => XfsError::io(format!("unable to read superblock: {other}")),
        })?;
        let io_handle = IoHandle::from_superblock(&superblock);
        info!(
            "Opened XFS volume on {} (format version {})",
            device.name(),
            superblock.format_version()
        );

        Ok(Volume {
            device: RefCell::new(Some(device)),
            superblock,
            io_handle,
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Closes the device. Closing a closed volume is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.device.get_mut().take() {
            Some(mut device) => {
                debug!("Closing volume on {}", device.name());
                device.close()
            }
            None => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.borrow().is_some()
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn io_handle(&self) -> &IoHandle {
        &self.io_handle
    }

    pub fn format_version(&self) -> u8 {
        self.superblock.format_version()
    }

    /// Volume label, without padding.
    pub fn label(&self) -> &[u8] {
        self.superblock.label()
    }

    /// Requests that long-running walks stop at their next step.
    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Flag shared with other threads, e.g. a Ctrl-C handler.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Borrows the device.
    ///
    /// # Errors
    /// `Runtime` if the volume is closed.
    pub(crate) fn device(&self) -> Result<RefMut<'_, D>> {
        let device = self
            .device
            .try_borrow_mut()
            .map_err(|_| XfsError::Runtime("volume device is already in use".into()))?;
        RefMut::filter_map(device, Option::as_mut)
            .map_err(|_| XfsError::Runtime("volume is not open".into()))
    }

    /// Root directory of the volume.
    ///
    /// # Errors
    /// `Runtime` if the volume is closed.
    pub fn root_directory(&self) -> Result<FileEntry<'_, D>> {
        self.file_entry_by_inode(self.superblock.root_inode())
            .map_err(|err| err.context("unable to retrieve root directory"))
    }

    /// File entry for inode `inode_number`.
    ///
    /// # Errors
    /// `Runtime` if the volume is closed; otherwise `Argument` or `Io` if the
    /// inode cannot be read. Callers enumerating many inodes may skip such
    /// entries, see [`FileEntry`].
    pub fn file_entry_by_inode(&self, inode_number: u64) -> Result<FileEntry<'_, D>> {
        self.file_entry_with_name(inode_number, None)
    }

    pub(crate) fn file_entry_with_name(
        &self,
        inode_number: u64,
        name: Option<Vec<u8>>,
    ) -> Result<FileEntry<'_, D>> {
        let inode = {
            let mut device = self.device()?;
            Inode::read(&mut *device, &self.superblock, inode_number)
                .map_err(|err| err.context(format!("unable to read inode {inode_number}")))?
        };
        Ok(FileEntry::new(self, inode, name))
    }

    /// Resolves an absolute path such as `/etc/hosts`.
    ///
    /// Returns `Ok(None)` if a component does not exist.
    pub fn file_entry_by_path(&self, path: &str) -> Result<Option<FileEntry<'_, D>>> {
        let mut entry = self.root_directory()?;
        for component in path.split(SEPARATOR).filter(|c| !c.is_empty()) {
            match entry.sub_file_entry_by_name(component.as_bytes())? {
                Some(child) => entry = child,
                None => return Ok(None),
            }
        }
        Ok(Some(entry))
    }

    /// Allocated inode numbers of allocation group `ag`.
    pub fn allocated_inodes(&self, ag: u32) -> Result<Vec<u64>> {
        if ag >= self.superblock.ag_count() {
            return Err(XfsError::Argument(format!("AG {ag} out of bounds")));
        }
        let mut device = self.device()?;
        inode_btree::allocated_inodes(&mut *device, &self.superblock, &self.io_handle, ag)
            .map_err(|err| err.context(format!("unable to enumerate inodes of AG {ag}")))
    }
}

impl<D: BlockDevice> Drop for Volume<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            if err.domain() == ErrorDomain::Io {
                log::warn!("Error closing volume: {err}");
            }
        }
    }
}

/// Implements the LayoutDisplay trait for the allocation groups of the volume
impl<D: BlockDevice> LayoutDisplay for Volume<D> {
    fn display_layout(&self, indent: u8) -> std::result::Result<String, std::fmt::Error> {
        let mut out = String::new();
        let indent = " ".repeat(indent.into());
        let sb = &self.superblock;
        let block_size = u64::from(sb.block_size());

        writeln!(out, "{}┌{:─^55}┐", indent, " XFS Volume Layout ")?;
        writeln!(
            out,
            "{}├{:^12}┬{:^12}┬{:^12}┬{:^16}┤",
            indent, "Region", "Start", "End", "Description"
        )?;
        writeln!(
            out,
            "{}├{:─<12}┼{:─<12}┼{:─<12}┼{:─<16}┤",
            indent, "", "", "", ""
        )?;
        let total_blocks = sb.data_blocks();
        for ag in 0..sb.ag_count() {
            let start = u64::from(ag) * u64::from(sb.ag_blocks());
            let end = (start + u64::from(sb.ag_blocks())).min(total_blocks);
            writeln!(
                out,
                "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
                indent,
                format!("AG #{ag}"),
                start * block_size,
                end * block_size,
                if ag == 0 { "Primary SB" } else { "Backup SB" }
            )?;
        }
        writeln!(out, "{}└{:─^55}┘", indent, "")?;
        writeln!(
            out,
            "{}Block size: {} bytes, inode size: {} bytes, root inode: {}",
            indent,
            sb.block_size(),
            sb.inode_size(),
            sb.root_inode()
        )?;

        Ok(out)
    }
}
