//! Device made of several segments read back to back, such as a split
//! `disk.001`, `disk.002`, ... image.

use std::io::SeekFrom;
use std::path::PathBuf;

use log::debug;

use super::{AccessMode, BlockDevice, FileDevice};
use crate::error::{Result, XfsError};

/// A [`BlockDevice`] concatenating the devices in `segments`.
///
/// A read never crosses a segment boundary; callers loop until they have
/// what they asked for, as with any short read.
#[derive(Debug)]
pub struct SegmentedDevice<D> {
    segments: Vec<D>,
    /// Absolute start of each segment, plus the total size at the end
    starts: Vec<u64>,
    position: u64,
    name: String,
    open: bool,
}

impl SegmentedDevice<FileDevice> {
    /// Segments backed by the files at `paths`, in order.
    ///
    /// # Errors
    /// `Argument` if `paths` is empty.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let segments = paths.iter().map(|path| FileDevice::new(path)).collect();
        SegmentedDevice::new(segments)
    }
}

impl<D: BlockDevice> SegmentedDevice<D> {
    /// # Errors
    /// `Argument` if `segments` is empty.
    pub fn new(segments: Vec<D>) -> Result<Self> {
        let name = match segments.as_slice() {
            [] => return Err(XfsError::Argument("no segments given".into())),
            [single] => single.name().to_string(),
            [first, ..] => format!("{} (+{} segments)", first.name(), segments.len() - 1),
        };
        Ok(SegmentedDevice {
            segments,
            starts: Vec::new(),
            position: 0,
            name,
            open: false,
        })
    }

    pub fn number_of_segments(&self) -> usize {
        self.segments.len()
    }

    fn total_size(&self) -> u64 {
        self.starts.last().copied().unwrap_or(0)
    }

    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(XfsError::Runtime(format!("device {} is not open", self.name)))
        }
    }

    /// Segment holding the current position and the offset inside it.
    fn locate(&self) -> Option<(usize, u64)> {
        if self.position >= self.total_size() {
            return None;
        }
        // starts[0] is 0, so the partition point is at least 1
        let index = self.starts.partition_point(|start| *start <= self.position) - 1;
        Some((index, self.position - self.starts[index]))
    }

    fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for segment in &mut self.segments {
            if let Err(err) = segment.close() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<D: BlockDevice> BlockDevice for SegmentedDevice<D> {
    /// Opens every segment and records where each one starts.
    fn open(&mut self, mode: AccessMode) -> Result<()> {
        if self.open {
            return Err(XfsError::Runtime(format!(
                "device {} is already open",
                self.name
            )));
        }
        let mut starts = Vec::with_capacity(self.segments.len() + 1);
        let mut total = 0u64;
        for index in 0..self.segments.len() {
            let segment = &mut self.segments[index];
            let size = segment.open(mode).and_then(|()| segment.size());
            let size = match size {
                Ok(size) => size,
                Err(err) => {
                    self.close_all()?;
                    return Err(err.context(format!("unable to open segment {index}")));
                }
            };
            starts.push(total);
            total = total.checked_add(size).ok_or_else(|| {
                XfsError::Argument(format!("total size of {} overflows", self.name))
            })?;
        }
        starts.push(total);
        debug!(
            "Opened {} with {} segments, {total} bytes",
            self.name,
            self.segments.len()
        );
        self.starts = starts;
        self.position = 0;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.close_all()
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let Some((index, offset)) = self.locate() else {
            return Ok(0);
        };
        let remaining = self.starts[index + 1] - self.position;
        let count = buffer
            .len()
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let segment = &mut self.segments[index];
        segment.seek(SeekFrom::Start(offset))?;
        let read = segment.read(&mut buffer[..count])?;
        self.position += read as u64;
        Ok(read)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        self.check_open()?;
        let Some((index, offset)) = self.locate() else {
            return Ok(0);
        };
        let remaining = self.starts[index + 1] - self.position;
        let count = buffer
            .len()
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let segment = &mut self.segments[index];
        segment.seek(SeekFrom::Start(offset))?;
        let written = segment.write(&buffer[..count])?;
        self.position += written as u64;
        Ok(written)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_open()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.total_size().checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            XfsError::Argument(format!(
                "invalid seek {pos:?} in {}: offset out of bounds",
                self.name
            ))
        })?;
        self.position = target;
        Ok(target)
    }

    fn size(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.total_size())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;
    use crate::utils;

    fn split(parts: &[&[u8]]) -> SegmentedDevice<MemoryDevice> {
        let segments = parts.iter().map(|part| MemoryDevice::new(part.to_vec())).collect();
        let mut dev = SegmentedDevice::new(segments).unwrap();
        dev.open(AccessMode::Read).unwrap();
        dev
    }

    #[test]
    fn reads_span_segments() {
        let mut dev = split(&[b"XF", b"SB", b"", b"tail"]);
        assert_eq!(dev.size().unwrap(), 8);
        assert_eq!(utils::read_at(&mut dev, 0, 4).unwrap(), b"XFSB".to_vec());
        assert_eq!(utils::read_at(&mut dev, 3, 5).unwrap(), b"Btail".to_vec());
    }

    #[test]
    fn read_past_end_is_eof() {
        let mut dev = split(&[b"ab", b"cd"]);
        dev.seek(SeekFrom::End(0)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(dev.read(&mut buf).unwrap(), 0);
        assert!(dev.seek(SeekFrom::Current(-5)).is_err());
    }

    #[test]
    fn no_segments_is_an_argument_error() {
        let err = SegmentedDevice::<MemoryDevice>::new(Vec::new()).unwrap_err();
        assert_eq!(err.domain(), crate::error::ErrorDomain::Argument);
    }

    #[test]
    fn close_twice_is_a_no_op() {
        let mut dev = split(&[b"ab"]);
        dev.close().unwrap();
        dev.close().unwrap();
        assert!(!dev.is_open());
    }
}
