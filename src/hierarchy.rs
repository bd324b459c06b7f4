//! Depth-first traversal of a volume's directory tree.
//!
//! The walker keeps its own stack instead of recursing, so the depth of a
//! crafted image is bounded by `max_depth` rather than by the thread stack.
//! Entries are visited in pre-order with their children in on-disk order.

use log::debug;

use crate::constants::DEFAULT_MAX_DEPTH;
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};
use crate::filesystem::{FileEntry, Volume};
use crate::traits::EntrySink;
use crate::utils;

/// Path under which the root directory is visited.
pub const ROOT_PATH: &str = "/";

/// A directory being expanded.
struct Frame<'v, D: BlockDevice> {
    entry: FileEntry<'v, D>,
    /// Path handed to the children
    sub_path: String,
    next: usize,
    count: usize,
}

impl<'v, D: BlockDevice> Frame<'v, D> {
    fn new(entry: FileEntry<'v, D>, path: &str) -> Result<Self> {
        let count = entry.number_of_sub_file_entries()?;
        Ok(Frame {
            sub_path: sub_path(path, entry.name()),
            entry,
            next: 0,
            count,
        })
    }
}

/// Path of the children of an entry found at `path`.
///
/// The root has no name, so its children share its path.
pub fn sub_path(path: &str, name: Option<&[u8]>) -> String {
    match name {
        Some(name) => {
            let name = utils::escape_name(name);
            let mut sub_path = String::with_capacity(path.len() + name.len() + 1);
            sub_path.push_str(path);
            sub_path.push_str(&name);
            sub_path.push('/');
            sub_path
        }
        None => path.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HierarchyWalker {
    max_depth: usize,
}

impl Default for HierarchyWalker {
    fn default() -> Self {
        HierarchyWalker::new(DEFAULT_MAX_DEPTH)
    }
}

impl HierarchyWalker {
    pub fn new(max_depth: usize) -> Self {
        HierarchyWalker { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Visits every entry reachable from the root directory.
    ///
    /// # Errors
    /// - `Runtime` if the volume is closed or the walk was aborted
    /// - any error of the sink or of a sub-entry, wrapped with the index of
    ///   each child on the way down
    pub fn walk<D: BlockDevice, S: EntrySink>(&self, volume: &Volume<D>, sink: &mut S) -> Result<()> {
        let root = volume.root_directory()?;
        self.walk_from(volume, root, ROOT_PATH, sink)
            .map_err(|err| err.context("unable to print root directory file entry information"))
    }

    /// Visits `entry`, found at `path`, and everything below it.
    pub fn walk_from<'v, D: BlockDevice, S: EntrySink>(
        &self,
        volume: &'v Volume<D>,
        entry: FileEntry<'v, D>,
        path: &str,
        sink: &mut S,
    ) -> Result<()> {
        sink.visit(&entry, path)?;
        let mut stack = vec![Frame::new(entry, path)?];

        loop {
            let depth = stack.len();
            let Some(frame) = stack.last_mut() else {
                break;
            };
            if frame.next >= frame.count {
                stack.pop();
                continue;
            }
            if volume.is_aborted() {
                return Err(XfsError::Runtime("hierarchy walk aborted".into()));
            }
            let index = frame.next;
            frame.next += 1;
            let path = frame.sub_path.clone();

            let result = frame
                .entry
                .sub_file_entry_by_index(index)
                .and_then(|child| {
                    sink.visit(&child, &path)?;
                    Frame::new(child, &path)
                })
                .and_then(|child| {
                    if child.count > 0 && depth >= self.max_depth {
                        return Err(XfsError::Runtime(format!(
                            "maximum directory depth {} exceeded at {}",
                            self.max_depth, child.sub_path
                        )));
                    }
                    Ok(child)
                });
            match result {
                Ok(child) if child.count > 0 => {
                    debug!("Entering {} ({} entries)", child.sub_path, child.count);
                    stack.push(child);
                }
                Ok(_) => {}
                Err(err) => {
                    // same wrapping a recursive walk would produce, innermost first
                    return Err(stack.iter().rev().fold(err, |err, frame| {
                        err.context(format!(
                            "unable to print file entry: {} information",
                            frame.next - 1
                        ))
                    }));
                }
            }
        }
        Ok(())
    }
}
