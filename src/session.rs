//! Interactive session state: registered images, the open volume and the
//! settings the next commands run with.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::constants::DEFAULT_MAX_DEPTH;
use crate::device::{DeviceRegistry, ImageDevice, RangeConfig};
use crate::error::{ErrorDomain, Result, XfsError};
use crate::filesystem::Volume;
use crate::hierarchy::HierarchyWalker;
use crate::output::{EntryPrinter, OutputMode};
use crate::traits::LayoutDisplay;

/// Volume type the session opens.
pub type ImageVolume = Volume<ImageDevice>;

/// Settings applied to the next open and print commands.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub output_mode: OutputMode,
    /// Where bodyfile output goes; standard output when unset
    pub bodyfile: Option<PathBuf>,
    /// Byte offset of the volume inside the image
    pub offset: i64,
    /// Size of the volume in bytes, 0 for the rest of the image
    pub size: u64,
    /// Enable the validation of the superblock
    pub validate: bool,
    pub max_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            output_mode: OutputMode::Text,
            bodyfile: None,
            offset: 0,
            size: 0,
            validate: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    registry: DeviceRegistry,
    volume: Option<ImageVolume>,
    bodyfile: Option<BufWriter<File>>,
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Session {
            config,
            ..Session::default()
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn volume(&self) -> Option<&ImageVolume> {
        self.volume.as_ref()
    }

    /// Sends subsequent output to a bodyfile at `path`, truncating it.
    pub fn set_bodyfile(&mut self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|err| {
            XfsError::from(err).context(format!("unable to create bodyfile {}", path.display()))
        })?;
        self.bodyfile = Some(BufWriter::new(file));
        self.config.bodyfile = Some(path.to_path_buf());
        self.config.output_mode = OutputMode::Bodyfile;
        info!("Writing bodyfile to {}", path.display());
        Ok(())
    }

    /// Opens the image at `path`, using the configured offset and size.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        self.open_segments(&[path.to_path_buf()])
    }

    /// Opens an image split over `paths`, read back to back.
    pub fn open_segments(&mut self, paths: &[PathBuf]) -> Result<()> {
        let name = paths
            .first()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        let config = RangeConfig::segmented(paths.to_vec(), self.config.offset, self.config.size);
        let device = config.device(&name)?;
        self.open_device(device)
    }

    /// Registers `label` for an image range without opening it.
    pub fn mount(&mut self, label: &str, path: &Path, offset: i64, size: u64) -> Result<()> {
        self.registry.register(label, RangeConfig::new(path, offset, size))
    }

    /// Opens the volume registered under `label`.
    pub fn use_label(&mut self, label: &str) -> Result<()> {
        let device = self.registry.device(label)?;
        self.open_device(device)
    }

    fn open_device(&mut self, device: ImageDevice) -> Result<()> {
        self.close()?;
        let volume = Volume::open(device, self.config.validate)?;
        self.volume = Some(volume);
        Ok(())
    }

    /// Closes the open volume, if any.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut volume) = self.volume.take() {
            volume.close()?;
        }
        Ok(())
    }

    fn open_volume(&self) -> Result<&ImageVolume> {
        self.volume
            .as_ref()
            .ok_or_else(|| XfsError::Runtime("no volume open".into()))
    }

    /// Printer for the configured mode, writing to the bodyfile when one
    /// is set and to `out` otherwise.
    fn printer<'a>(
        bodyfile: &'a mut Option<BufWriter<File>>,
        mode: OutputMode,
        out: &'a mut dyn Write,
    ) -> EntryPrinter<&'a mut dyn Write> {
        match (mode, bodyfile) {
            (OutputMode::Bodyfile, Some(file)) => EntryPrinter::new(file as &mut dyn Write, mode),
            (mode, _) => EntryPrinter::new(out, mode),
        }
    }

    pub fn print_volume_info(&self, out: &mut dyn Write) -> Result<()> {
        let volume = self.open_volume()?;
        let mut printer = EntryPrinter::new(out, OutputMode::Text);
        printer.print_volume_information(volume)?;
        printer.flush()
    }

    pub fn print_layout(&self, out: &mut dyn Write) -> Result<()> {
        let volume = self.open_volume()?;
        let layout = volume
            .display_layout(3)
            .map_err(|err| XfsError::Runtime(format!("unable to format layout: {err}")))?;
        write!(out, "{layout}")?;
        Ok(())
    }

    /// Walks the whole directory tree.
    pub fn print_hierarchy(&mut self, out: &mut dyn Write) -> Result<()> {
        let volume = self
            .volume
            .as_ref()
            .ok_or_else(|| XfsError::Runtime("no volume open".into()))?;
        let mut printer = Self::printer(&mut self.bodyfile, self.config.output_mode, out);
        printer.print_hierarchy_header()?;
        HierarchyWalker::new(self.config.max_depth).walk(volume, &mut printer)?;
        printer.print_hierarchy_footer()?;
        printer.flush()
    }

    /// Prints the entry of one inode.
    ///
    /// # Returns
    /// `false` if the inode could not be read; this is reported in the output
    /// rather than as an error.
    pub fn print_file_entry_by_identifier(
        &mut self,
        inode_number: u64,
        out: &mut dyn Write,
    ) -> Result<bool> {
        let volume = self
            .volume
            .as_ref()
            .ok_or_else(|| XfsError::Runtime("no volume open".into()))?;
        let mut printer = Self::printer(&mut self.bodyfile, self.config.output_mode, out);
        let found = print_identified(volume, inode_number, &mut printer)?;
        printer.flush()?;
        Ok(found)
    }

    /// Prints every allocated inode of every allocation group.
    ///
    /// Unreadable inodes and allocation groups are logged and skipped.
    ///
    /// # Returns
    /// The number of entries printed.
    pub fn print_file_entries(&mut self, out: &mut dyn Write) -> Result<usize> {
        let volume = self
            .volume
            .as_ref()
            .ok_or_else(|| XfsError::Runtime("no volume open".into()))?;
        let mut printer = Self::printer(&mut self.bodyfile, self.config.output_mode, out);
        printer.print_entries_header()?;

        let mut printed = 0;
        for ag in 0..volume.superblock().ag_count() {
            let inodes = match volume.allocated_inodes(ag) {
                Ok(inodes) => inodes,
                Err(err) if err.domain() == ErrorDomain::Runtime => return Err(err),
                Err(err) => {
                    warn!("Skipping AG {ag}: {err}");
                    continue;
                }
            };
            debug!("AG {ag}: {} allocated inodes", inodes.len());
            for inode_number in inodes {
                if volume.is_aborted() {
                    return Err(XfsError::Runtime("file entry enumeration aborted".into()));
                }
                if print_identified(volume, inode_number, &mut printer)? {
                    printed += 1;
                }
            }
        }
        printer.flush()?;
        Ok(printed)
    }

    /// Prints the entry at an absolute path.
    ///
    /// # Returns
    /// `false` if no entry exists at `path`.
    pub fn print_file_entry_by_path(&mut self, path: &str, out: &mut dyn Write) -> Result<bool> {
        let volume = self
            .volume
            .as_ref()
            .ok_or_else(|| XfsError::Runtime("no volume open".into()))?;
        let mut printer = Self::printer(&mut self.bodyfile, self.config.output_mode, out);
        let entry = volume.file_entry_by_path(path)?;
        printer.print_path_entry(path, entry.as_ref())?;
        printer.flush()?;
        Ok(entry.is_some())
    }
}

/// Looks up and prints one inode, reporting unreadable inodes in the output.
fn print_identified<W: Write>(
    volume: &ImageVolume,
    inode_number: u64,
    printer: &mut EntryPrinter<W>,
) -> Result<bool> {
    match volume.file_entry_by_inode(inode_number) {
        Ok(entry) => {
            printer
                .print_identified_entry(inode_number, Some(&entry))
                .map_err(|err| {
                    err.context(format!("unable to print file entry: {inode_number} information"))
                })?;
            Ok(true)
        }
        Err(err) if err.domain() == ErrorDomain::Runtime => Err(err),
        Err(err) => {
            warn!("Skipping inode {inode_number}: {err}");
            printer.print_identified_entry::<ImageDevice>(inode_number, None)?;
            Ok(false)
        }
    }
}
