//! XFS on-disk structures and the read-only volume built from them.
//!
//! The decoders in the submodules each handle one structure (superblock,
//! inode, directory table, extent map, B+ tree node, attribute list);
//! [`volume::Volume`] and [`file_entry::FileEntry`] tie them together.
pub mod attributes;
pub mod btree_block;
pub mod directory;
pub mod directory_table;
pub mod extent;
pub mod file_entry;
pub mod inode;
pub mod inode_btree;
pub mod io_handle;
pub mod superblock;
pub mod volume;

pub use file_entry::FileEntry;
pub use volume::Volume;
