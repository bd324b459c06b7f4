//! Device backed by a file on the host: an image file or a block device node.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{AccessMode, BlockDevice};
use crate::error::{Result, XfsError};

/// A [`BlockDevice`] reading from a path on the host.
#[derive(Debug)]
pub struct FileDevice {
    path: PathBuf,
    name: String,
    file: Option<File>,
}

impl FileDevice {
    /// Creates a closed device for `path`.
    pub fn new(path: &Path) -> Self {
        FileDevice {
            path: path.to_path_buf(),
            name: path.to_string_lossy().into_owned(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File> {
        let name = &self.name;
        self.file
            .as_mut()
            .ok_or_else(|| XfsError::Runtime(format!("device {name} is not open")))
    }
}

impl BlockDevice for FileDevice {
    fn open(&mut self, mode: AccessMode) -> Result<()> {
        if self.file.is_some() {
            return Err(XfsError::Runtime(format!(
                "device {} is already open",
                self.name
            )));
        }
        let file = File::options()
            .read(true)
            .write(mode.can_write())
            .open(&self.path)
            .map_err(|err| XfsError::from(err).context(format!("unable to open {}", self.name)))?;
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        Ok(self.file()?.read(buffer)?)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        Ok(self.file()?.write(buffer)?)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.file()?.seek(pos)?)
    }

    fn size(&mut self) -> Result<u64> {
        let file = self.file()?;
        // Block device nodes report a zero length in their metadata.
        let len = file.metadata()?.len();
        if len > 0 {
            return Ok(len);
        }
        let current = file.stream_position()?;
        let end = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(current))?;
        Ok(end)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
