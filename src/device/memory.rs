//! Device over an in-memory image.

use std::io::SeekFrom;

use super::{AccessMode, BlockDevice};
use crate::error::{Result, XfsError};

/// A [`BlockDevice`] over a byte vector.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    data: Vec<u8>,
    position: u64,
    open: bool,
    writable: bool,
}

impl MemoryDevice {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryDevice {
            data,
            position: 0,
            open: false,
            writable: false,
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(XfsError::Runtime("memory device is not open".into()))
        }
    }
}

impl BlockDevice for MemoryDevice {
    fn open(&mut self, mode: AccessMode) -> Result<()> {
        if self.open {
            return Err(XfsError::Runtime("memory device is already open".into()));
        }
        self.open = true;
        self.writable = mode.can_write();
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let len = self.data.len() as u64;
        if self.position >= len {
            return Ok(0);
        }
        let start = self.position as usize;
        let count = buffer.len().min(self.data.len() - start);
        buffer[..count].copy_from_slice(&self.data[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        self.check_open()?;
        if !self.writable {
            return Err(XfsError::io("memory device was opened read-only"));
        }
        let len = self.data.len() as u64;
        if self.position >= len {
            return Ok(0);
        }
        let start = self.position as usize;
        let count = buffer.len().min(self.data.len() - start);
        self.data[start..start + count].copy_from_slice(&buffer[..count]);
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_open()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.position = offset;
                Ok(offset)
            }
            None => Err(XfsError::Argument(format!(
                "invalid seek {pos:?}: offset out of bounds"
            ))),
        }
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
