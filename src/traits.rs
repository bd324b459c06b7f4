//! Declaration of traits reused across the code.

use crate::device::BlockDevice;
use crate::error::Result;
use crate::filesystem::FileEntry;

/// Implementation of the LayoutDisplay trait.
/// It is used to display the layout of a given structure such as a volume.
pub trait LayoutDisplay {
    fn display_layout(&self, indent: u8) -> std::result::Result<String, std::fmt::Error>;
}

/// Receives the file entries visited by a hierarchy walk.
pub trait EntrySink {
    /// Called once per visited entry.
    ///
    /// # Parameters
    /// - `entry`: The visited entry
    /// - `path`: Path of the directory holding the entry, ending in `/`;
    ///   the root itself is visited with `/`
    fn visit<D: BlockDevice>(&mut self, entry: &FileEntry<'_, D>, path: &str) -> Result<()>;
}
