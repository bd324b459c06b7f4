//! A window over another device.
//!
//! The XFS volume rarely starts at byte 0 of the image: a raw disk dump holds
//! a partition table first. [`RangedDevice`] restricts every read, write, seek
//! and size query to `[range_offset, range_offset + range_size)` so the rest
//! of the crate can address the volume as if it were the whole device.

use std::io::SeekFrom;

use log::debug;

use super::{AccessMode, BlockDevice};
use crate::error::{Result, XfsError};

/// A [`BlockDevice`] limited to a sub-range of an underlying device.
///
/// A `range_size` of 0 means the range runs to the end of the device.
#[derive(Debug)]
pub struct RangedDevice<D> {
    device: D,
    name: String,
    range_offset: u64,
    range_size: u64,
    device_size: u64,
    open: bool,
}

impl<D: BlockDevice> RangedDevice<D> {
    /// Wraps `device` with an open-ended range starting at 0.
    pub fn new(device: D) -> Self {
        let name = device.name().to_string();
        RangedDevice {
            device,
            name,
            range_offset: 0,
            range_size: 0,
            device_size: 0,
            open: false,
        }
    }

    /// Sets the display name used in messages.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Sets the range the device is limited to.
    ///
    /// # Parameters
    /// - `offset`: start of the range in the underlying device.
    /// - `size`: length of the range, 0 for "up to the end of the device".
    ///
    /// # Errors
    /// `Argument` if `offset` is negative or `size` exceeds `i64::MAX`.
    /// `Runtime` if the device is already open.
    pub fn configure(&mut self, offset: i64, size: u64) -> Result<()> {
        if self.open {
            return Err(XfsError::Runtime(format!(
                "range of {} cannot change while it is open",
                self.name
            )));
        }
        if offset < 0 {
            return Err(XfsError::Argument(format!(
                "invalid range offset {offset}: value less than zero"
            )));
        }
        if size > i64::MAX as u64 {
            return Err(XfsError::Argument(format!(
                "invalid range size {size}: value exceeds maximum"
            )));
        }
        self.range_offset = offset as u64;
        self.range_size = size;
        Ok(())
    }

    pub fn range_offset(&self) -> u64 {
        self.range_offset
    }

    pub fn range_size(&self) -> u64 {
        self.range_size
    }

    /// Gives the wrapped device back.
    pub fn into_inner(self) -> D {
        self.device
    }

    /// Absolute end of the range in the underlying device.
    fn range_end(&self) -> u64 {
        if self.range_size == 0 {
            self.device_size
        } else {
            self.range_offset + self.range_size
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(XfsError::Runtime(format!("device {} is not open", self.name)))
        }
    }

    /// Number of bytes a transfer of `requested` bytes may move at the current position.
    fn clamp_transfer(&mut self, requested: usize) -> Result<usize> {
        let position = self.device.seek(SeekFrom::Current(0))?;
        if position < self.range_offset {
            return Err(XfsError::Runtime(format!(
                "invalid position {position} in {}: before range offset {}",
                self.name, self.range_offset
            )));
        }
        if self.range_size == 0 {
            return Ok(requested);
        }
        let end = self.range_end();
        if position >= end {
            return Ok(0);
        }
        let remaining = end - position;
        Ok(requested.min(usize::try_from(remaining).unwrap_or(usize::MAX)))
    }
}

impl<D: BlockDevice> BlockDevice for RangedDevice<D> {
    /// Opens the underlying device and checks the range fits inside it.
    ///
    /// # Errors
    /// `Argument` if the range starts at or past the end of the device, or ends past it.
    fn open(&mut self, mode: AccessMode) -> Result<()> {
        if self.open {
            return Err(XfsError::Runtime(format!(
                "device {} is already open",
                self.name
            )));
        }
        if !self.device.is_open() {
            self.device.open(mode)?;
        }
        let device_size = self.device.size()?;
        let invalid = if self.range_offset >= device_size {
            Some(format!(
                "range offset {} exceeds device size {device_size}",
                self.range_offset
            ))
        } else if self.range_size != 0
            && self
                .range_offset
                .checked_add(self.range_size)
                .is_none_or(|end| end > device_size)
        {
            Some(format!(
                "range {}+{} exceeds device size {device_size}",
                self.range_offset, self.range_size
            ))
        } else {
            None
        };
        if let Some(message) = invalid {
            self.device.close()?;
            return Err(XfsError::Argument(format!("{}: {message}", self.name)));
        }
        self.device.seek(SeekFrom::Start(self.range_offset))?;
        self.device_size = device_size;
        self.open = true;
        debug!(
            "Opened {} with range offset {} and size {}",
            self.name, self.range_offset, self.range_size
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.device.close()
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let count = self.clamp_transfer(buffer.len())?;
        if count == 0 {
            return Ok(0);
        }
        self.device
            .read(&mut buffer[..count])
            .map_err(|err| err.context(format!("unable to read from {}", self.name)))
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        self.check_open()?;
        let count = self.clamp_transfer(buffer.len())?;
        if count == 0 {
            return Ok(0);
        }
        self.device
            .write(&buffer[..count])
            .map_err(|err| err.context(format!("unable to write to {}", self.name)))
    }

    /// Seeks relative to the start of the range and returns the range-relative position.
    ///
    /// # Errors
    /// `Argument` if the target would fall before the start of the range.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_open()?;
        let base = match pos {
            SeekFrom::Start(offset) => self.range_offset.checked_add(offset),
            SeekFrom::Current(delta) => self
                .device
                .seek(SeekFrom::Current(0))?
                .checked_add_signed(delta),
            SeekFrom::End(delta) => self.range_end().checked_add_signed(delta),
        };
        let absolute = match base {
            Some(absolute) if absolute >= self.range_offset => absolute,
            _ => {
                return Err(XfsError::Argument(format!(
                    "invalid seek {pos:?} in {}: offset before range start",
                    self.name
                )));
            }
        };
        self.device.seek(SeekFrom::Start(absolute))?;
        Ok(absolute - self.range_offset)
    }

    fn size(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.range_end() - self.range_offset)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
