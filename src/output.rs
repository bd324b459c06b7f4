//! Rendering of volume and file entry information.
//!
//! Two formats are supported: a human-readable text listing and the
//! pipe-delimited bodyfile format consumed by timeline tools:
//!
//! ```text
//! MD5|name|inode|mode_as_string|UID|GID|size|atime|mtime|ctime|crtime
//! ```
//!
//! The hash column is always `0`.

use std::io::Write;

use crate::device::BlockDevice;
use crate::error::Result;
use crate::filesystem::{FileEntry, Volume};
use crate::traits::EntrySink;
use crate::utils;

/// Output format of an [`EntryPrinter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Text,
    Bodyfile,
}

/// Writes volume and file entry information to `W`.
#[derive(Debug)]
pub struct EntryPrinter<W: Write> {
    writer: W,
    mode: OutputMode,
}

impl<W: Write> EntryPrinter<W> {
    pub fn new(writer: W, mode: OutputMode) -> Self {
        EntryPrinter { writer, mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Prints the volume banner, format version and label.
    pub fn print_volume_information<D: BlockDevice>(&mut self, volume: &Volume<D>) -> Result<()> {
        write!(self.writer, "X File System information:\n\n")?;
        writeln!(self.writer, "Volume information:")?;
        writeln!(self.writer, "\tFormat version\t\t\t: {}", volume.format_version())?;
        writeln!(
            self.writer,
            "\tLabel\t\t\t\t: {}",
            utils::escape_name(volume.label())
        )?;
        writeln!(self.writer)?;
        Ok(())
    }

    /// Banner printed before a hierarchy walk in text mode.
    pub fn print_hierarchy_header(&mut self) -> Result<()> {
        if self.mode == OutputMode::Text {
            write!(self.writer, "X File System information:\n\n")?;
            writeln!(self.writer, "File system hierarchy:")?;
        }
        Ok(())
    }

    pub fn print_hierarchy_footer(&mut self) -> Result<()> {
        if self.mode == OutputMode::Text {
            writeln!(self.writer)?;
        }
        Ok(())
    }

    /// Banner printed before a flat enumeration in text mode.
    pub fn print_entries_header(&mut self) -> Result<()> {
        if self.mode == OutputMode::Text {
            write!(self.writer, "X File System information:\n\n")?;
            writeln!(self.writer, "File entries:")?;
        }
        Ok(())
    }

    /// Prints the result of looking up inode `inode_number`.
    ///
    /// A failed lookup only shows up in text mode.
    pub fn print_identified_entry<D: BlockDevice>(
        &mut self,
        inode_number: u64,
        entry: Option<&FileEntry<'_, D>>,
    ) -> Result<()> {
        match (self.mode, entry) {
            (OutputMode::Text, None) => {
                write!(self.writer, "Error reading file entry: {inode_number}\n\n")?
            }
            (OutputMode::Text, Some(entry)) => {
                writeln!(self.writer, "File entry: {inode_number} information:")?;
                self.print_entry(entry, None)?;
                writeln!(self.writer)?;
            }
            (OutputMode::Bodyfile, Some(entry)) => self.print_entry(entry, None)?,
            (OutputMode::Bodyfile, None) => {}
        }
        Ok(())
    }

    /// Prints the result of looking up `path`.
    pub fn print_path_entry<D: BlockDevice>(
        &mut self,
        path: &str,
        entry: Option<&FileEntry<'_, D>>,
    ) -> Result<()> {
        // the entry's name is already the last component
        let parent = path.rfind('/').map(|end| &path[..=end]);
        match (self.mode, entry) {
            (OutputMode::Text, None) => write!(self.writer, "Error reading file entry: {path}\n\n")?,
            (OutputMode::Text, Some(entry)) => {
                writeln!(self.writer, "File entry: {path} information:")?;
                self.print_entry(entry, parent)?;
                writeln!(self.writer)?;
            }
            (OutputMode::Bodyfile, Some(entry)) => self.print_entry(entry, parent)?,
            (OutputMode::Bodyfile, None) => {}
        }
        Ok(())
    }

    /// Prints one entry in the current mode.
    ///
    /// # Parameters
    /// - `entry`: The entry to print
    /// - `path`: Path of the directory holding the entry, if known
    pub fn print_entry<D: BlockDevice>(
        &mut self,
        entry: &FileEntry<'_, D>,
        path: Option<&str>,
    ) -> Result<()> {
        match self.mode {
            OutputMode::Text => self.print_text(entry, path),
            OutputMode::Bodyfile => self.print_bodyfile(entry, path),
        }
    }

    fn print_time(&mut self, label: &str, ns: i64) -> Result<()> {
        writeln!(self.writer, "{label}: {}", utils::format_iso8601_ns(ns))?;
        Ok(())
    }

    fn print_text<D: BlockDevice>(&mut self, entry: &FileEntry<'_, D>, path: Option<&str>) -> Result<()> {
        let w = &mut self.writer;
        writeln!(w, "\tInode number\t\t: {}", entry.inode_number())?;
        if let Some(name) = entry.name() {
            writeln!(
                w,
                "\tName\t\t\t: {}{}",
                path.unwrap_or_default(),
                utils::escape_name(name)
            )?;
        }
        writeln!(w, "\tSize\t\t\t: {}", entry.size())?;

        self.print_time("\tModification time\t", entry.modification_time())?;
        self.print_time("\tInode change time\t", entry.inode_change_time())?;
        self.print_time("\tAccess time\t\t", entry.access_time())?;
        if let Some(creation_time) = entry.creation_time()? {
            self.print_time("\tCreation time\t\t", creation_time)?;
        }

        let w = &mut self.writer;
        writeln!(w, "\tNumber of links\t\t: {}", entry.number_of_links())?;
        writeln!(w, "\tOwner identifier\t: {}", entry.owner())?;
        writeln!(w, "\tGroup identifier\t: {}", entry.group())?;
        writeln!(
            w,
            "\tFile mode\t\t: {} ({:07o})",
            utils::file_mode_string(entry.mode()),
            entry.mode()
        )?;
        if let Some((major, minor)) = entry.device_number()? {
            writeln!(w, "\tDevice number\t\t: {major},{minor}")?;
        }
        if let Some(target) = entry.symbolic_link_target()? {
            writeln!(w, "\tSymbolic link target\t: {}", utils::escape_name(target))?;
        }

        let count = entry.number_of_extended_attributes()?;
        if count > 0 {
            writeln!(w, "\tExtended attributes:")?;
            for index in 0..count {
                let attribute = entry.extended_attribute_by_index(index)?;
                writeln!(
                    w,
                    "\t\tAttribute: {}\t: {}",
                    index + 1,
                    utils::escape_name(&attribute.name())
                )?;
            }
        }
        writeln!(w)?;
        Ok(())
    }

    fn print_bodyfile<D: BlockDevice>(
        &mut self,
        entry: &FileEntry<'_, D>,
        path: Option<&str>,
    ) -> Result<()> {
        let mut name = path.unwrap_or_default().to_string();
        if let Some(raw) = entry.name() {
            name.push_str(&utils::escape_name(raw));
        }
        if let Some(target) = entry.symbolic_link_target()? {
            name.push_str(" -> ");
            name.push_str(&utils::escape_name(target));
        }
        let creation_time = entry.creation_time()?.unwrap_or(0);

        writeln!(
            self.writer,
            "0|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            name,
            entry.inode_number(),
            utils::file_mode_string(entry.mode()),
            entry.owner(),
            entry.group(),
            entry.size(),
            utils::format_posix_time_ns(entry.access_time()),
            utils::format_posix_time_ns(entry.modification_time()),
            utils::format_posix_time_ns(entry.inode_change_time()),
            utils::format_posix_time_ns(creation_time)
        )?;
        Ok(())
    }
}

impl<W: Write> EntrySink for EntryPrinter<W> {
    fn visit<D: BlockDevice>(&mut self, entry: &FileEntry<'_, D>, path: &str) -> Result<()> {
        self.print_entry(entry, Some(path))
    }
}
