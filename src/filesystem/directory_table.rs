//! Short-form directories stored in the inode literal area.
//!
//! Layout: a header (entry count, 8-byte inode count, parent inode number)
//! followed by packed entries of name length, offset tag, name, optional file
//! type byte and inode number. Inode numbers are 4 bytes wide unless the
//! header declares 8-byte ones.

use binread::{BinRead, BinReaderExt};
use getset::CopyGetters;
use std::io;

use super::directory::DirectoryEntry;
use crate::error::{Result, XfsError};
use crate::utils;

/// Smallest header: counts plus a 4-byte parent inode number.
pub const DIRECTORY_TABLE_HEADER_MIN_SIZE: usize = 6;

#[derive(BinRead)]
#[br(big)]
struct RawHeader {
    count: u8,
    i8count: u8,
    #[br(if(i8count == 0))]
    parent4: Option<u32>,
    #[br(if(i8count != 0))]
    parent8: Option<u64>,
}

/// Header of a short-form directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct DirectoryTableHeader {
    number_of_entries: u8,
    /// Width in bytes of the inode numbers, 4 or 8
    inode_number_data_size: u8,
    parent_inode_number: u64,
}

impl DirectoryTableHeader {
    /// Builds a header from its fields.
    ///
    /// # Errors
    /// `Argument` if `inode_number_data_size` is neither 4 nor 8, or a parent
    /// inode number does not fit in 4 bytes.
    pub fn new(
        number_of_entries: u8,
        inode_number_data_size: u8,
        parent_inode_number: u64,
    ) -> Result<Self> {
        match inode_number_data_size {
            4 if parent_inode_number > u64::from(u32::MAX) => Err(XfsError::Argument(format!(
                "parent inode number {parent_inode_number} does not fit in 4 bytes"
            ))),
            4 | 8 => Ok(DirectoryTableHeader {
                number_of_entries,
                inode_number_data_size,
                parent_inode_number,
            }),
            other => Err(XfsError::Argument(format!(
                "unsupported inode number data size {other}"
            ))),
        }
    }

    /// Decodes the header from the start of the literal data.
    ///
    /// The entry count is not checked against the data that follows.
    ///
    /// # Errors
    /// `Argument` if `data` is shorter than the header.
    pub fn read_header(data: &[u8]) -> Result<Self> {
        if data.len() < DIRECTORY_TABLE_HEADER_MIN_SIZE {
            return Err(XfsError::Argument(format!(
                "directory table data size {} too small",
                data.len()
            )));
        }
        if data[1] != 0 && data.len() < DIRECTORY_TABLE_HEADER_MIN_SIZE + 4 {
            return Err(XfsError::Argument(format!(
                "directory table data size {} too small for 8-byte inode numbers",
                data.len()
            )));
        }
        let mut reader = io::Cursor::new(data);
        let raw: RawHeader = reader.read_be().map_err(|err| {
            XfsError::from(err).context("unable to read directory table header")
        })?;

        let (width, parent) = match (raw.parent4, raw.parent8) {
            (Some(parent), _) => (4, u64::from(parent)),
            (None, Some(parent)) => (8, parent),
            (None, None) => {
                return Err(XfsError::Argument(
                    "directory table header missing parent inode number".into(),
                ));
            }
        };
        Ok(DirectoryTableHeader {
            number_of_entries: raw.count,
            inode_number_data_size: width,
            parent_inode_number: parent,
        })
    }

    /// Encodes the header the way it appears on disk.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.number_of_entries];
        if self.inode_number_data_size == 8 {
            // counts 8-byte inode numbers, the parent included, so never 0
            out.push(self.number_of_entries.max(1));
            out.extend_from_slice(&self.parent_inode_number.to_be_bytes());
        } else {
            out.push(0);
            out.extend_from_slice(&(self.parent_inode_number as u32).to_be_bytes());
        }
        out
    }

    /// Encoded size of the header.
    pub fn size(&self) -> usize {
        2 + usize::from(self.inode_number_data_size)
    }
}

/// Decodes every entry of a short-form directory.
///
/// `data` must already be bounded to the literal area actually in use.
///
/// # Errors
/// `Argument` if an entry runs past the end of `data`.
pub fn read_entries(
    data: &[u8],
    has_file_type: bool,
) -> Result<(DirectoryTableHeader, Vec<DirectoryEntry>)> {
    let header = DirectoryTableHeader::read_header(data)?;
    let width = usize::from(header.inode_number_data_size);
    let mut entries = Vec::with_capacity(header.number_of_entries.into());
    let mut offset = header.size();

    for index in 0..header.number_of_entries {
        let entry = read_entry(data, offset, width, has_file_type)
            .map_err(|err| err.context(format!("unable to read directory table entry {index}")))?;
        offset = entry.1;
        entries.push(entry.0);
    }

    Ok((header, entries))
}

fn read_entry(
    data: &[u8],
    offset: usize,
    width: usize,
    has_file_type: bool,
) -> Result<(DirectoryEntry, usize)> {
    let name_size = usize::from(utils::u8_at(data, offset)?);
    // 1-byte name length then the 2-byte offset tag
    let name_offset = offset + 3;
    let name = utils::slice_at(data, name_offset, name_size)?.to_vec();
    let mut cursor = name_offset + name_size;

    let file_type = if has_file_type {
        let value = utils::u8_at(data, cursor)?;
        cursor += 1;
        Some(value)
    } else {
        None
    };
    let inode_number = utils::be_uint_at(data, cursor, width)?;
    cursor += width;

    Ok((DirectoryEntry::new(inode_number, name, file_type), cursor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDomain;

    #[test]
    fn header_round_trip() {
        let header = DirectoryTableHeader::new(3, 8, 128).unwrap();
        let decoded = DirectoryTableHeader::read_header(&header.encode()).unwrap();
        assert_eq!(decoded.number_of_entries(), 3);
        assert_eq!(decoded.inode_number_data_size(), 8);
        assert_eq!(decoded.parent_inode_number(), 128);

        // an empty directory whose parent only fits in 8 bytes
        let header = DirectoryTableHeader::new(0, 8, 1 << 40).unwrap();
        let encoded = header.encode();
        assert_eq!(encoded.len(), header.size());
        assert_eq!(DirectoryTableHeader::read_header(&encoded).unwrap(), header);
    }

    #[test]
    fn four_byte_parent() {
        let data = [2, 0, 0, 0, 0, 64];
        let header = DirectoryTableHeader::read_header(&data).unwrap();
        assert_eq!(header.number_of_entries(), 2);
        assert_eq!(header.inode_number_data_size(), 4);
        assert_eq!(header.parent_inode_number(), 64);
    }

    #[test]
    fn short_data_is_rejected() {
        let err = DirectoryTableHeader::read_header(&[1, 0, 0]).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
        // declares 8-byte inode numbers but only holds 4 bytes of parent
        assert!(DirectoryTableHeader::read_header(&[1, 1, 0, 0, 0, 64]).is_err());
        assert!(DirectoryTableHeader::new(1, 5, 0).is_err());
    }

    #[test]
    fn entries_are_decoded_in_order() {
        let mut data = DirectoryTableHeader::new(2, 4, 64).unwrap().encode();
        for (name, ino) in [(&b"hello.txt"[..], 65u32), (&b"sub"[..], 66u32)] {
            data.push(name.len() as u8);
            data.extend_from_slice(&[0, 0x60]);
            data.extend_from_slice(name);
            data.push(1);
            data.extend_from_slice(&ino.to_be_bytes());
        }
        let (header, entries) = read_entries(&data, true).unwrap();
        assert_eq!(header.number_of_entries(), 2);
        assert_eq!(entries[0].name(), b"hello.txt");
        assert_eq!(entries[0].inode_number(), 65);
        assert_eq!(entries[1].name(), b"sub");
        assert_eq!(entries[1].file_type(), Some(1));
    }

    #[test]
    fn entry_count_is_bounded_by_data() {
        let mut data = DirectoryTableHeader::new(5, 4, 64).unwrap().encode();
        data.extend_from_slice(&[1, 0, 0x60, b'a', 0, 0, 0, 70]);
        let err = read_entries(&data, false).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
    }
}
