//! Random-access byte sources the volume is read from.
//!
//! Every backend implements [`BlockDevice`]:
//! - [`FileDevice`]: a regular file, block device or raw disk image
//! - [`MemoryDevice`]: an in-memory image
//! - [`RangedDevice`]: a `[offset, offset + size)` window over another device
//! - [`SegmentedDevice`]: several devices read back to back, for split images
//!
//! [`DeviceRegistry`] keeps labelled ranges so several images can be mounted
//! side by side by one session.

pub mod file;
pub mod memory;
pub mod ranged;
pub mod registry;
pub mod segmented;

use std::io::SeekFrom;

use crate::error::Result;

pub use file::FileDevice;
pub use memory::MemoryDevice;
pub use ranged::RangedDevice;
pub use registry::{DeviceRegistry, ImageDevice, RangeConfig};
pub use segmented::SegmentedDevice;

/// Access mode requested when opening a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    ReadWrite,
}

impl AccessMode {
    pub fn can_write(&self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

/// Capability interface of a byte source.
///
/// Offsets returned by `seek` are relative to the start of what the device
/// exposes, so a ranged device reports volume-relative positions.
pub trait BlockDevice {
    /// Opens the device.
    fn open(&mut self, mode: AccessMode) -> Result<()>;

    /// Closes the device. Closing a closed device is a no-op.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Reads up to `buffer.len()` bytes at the current position.
    ///
    /// Returns the number of bytes transferred; 0 means end of device.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Writes up to `buffer.len()` bytes at the current position.
    fn write(&mut self, buffer: &[u8]) -> Result<usize>;

    /// Moves the current position and returns it.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Returns the number of bytes the device exposes.
    fn size(&mut self) -> Result<u64>;

    /// Human-readable name of the device, used in log and error messages.
    fn name(&self) -> &str;
}
