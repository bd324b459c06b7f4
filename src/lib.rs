//!
//! xfs_forensics: A library and CLI for read-only analysis of XFS file system images.
//!
//! This crate provides tools for:
//! - Addressing a volume inside a larger image through a range-limited device
//! - Decoding the XFS superblock, inodes, directories, extent maps and B+ trees
//! - Walking the directory hierarchy and enumerating allocated inodes
//! - Printing entries as a text listing or as a bodyfile
//!
//! Nothing is ever written to the image.
//!
//! # Re-exports
//! - [`Volume`]: An opened XFS volume
//! - [`FileEntry`]: A file, directory or other object of a volume
//! - [`RangedDevice`]: Device restricted to a byte range of another device
//! - [`XfsError`]: The crate error type

pub mod commands;
pub mod constants;
pub mod device;
pub mod error;
pub mod filesystem;
pub mod hierarchy;
pub mod output;
pub mod session;
pub mod traits;
pub mod utils;

/// Device restricted to a byte range (see [`device::ranged::RangedDevice`]).
pub use crate::device::RangedDevice;
/// Crate error type (see [`error::XfsError`]).
pub use crate::error::{Result, XfsError};
/// File entry of a volume (see [`filesystem::file_entry::FileEntry`]).
pub use crate::filesystem::FileEntry;
/// Opened XFS volume (see [`filesystem::volume::Volume`]).
pub use crate::filesystem::Volume;
