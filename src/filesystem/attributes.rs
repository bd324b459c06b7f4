//! Extended attribute names.
//!
//! Small attribute sets live in a short-form list inside the inode's
//! attribute fork; larger ones in leaf blocks of a directory-style tree
//! mapped by the attribute fork's extents. Only names are decoded.

use std::collections::HashSet;

use log::{debug, warn};

use super::extent::{self, Extent};
use super::superblock::Superblock;
use crate::constants::*;
use crate::device::BlockDevice;
use crate::error::{Result, XfsError};
use crate::utils;

/// Short-form header: total size, count, padding.
const SHORT_FORM_HEADER_SIZE: usize = 4;
/// Interior node magics of the attribute tree.
const DA_NODE_MAGIC: u16 = 0xFEBE;
const DA3_NODE_MAGIC: u16 = 0x3EBE;
const DA_NODE_HEADER_SIZE: usize = 16;
const DA3_NODE_HEADER_SIZE: usize = 64;
/// Offset of the magic inside the block info header.
const BLOCK_INFO_MAGIC_OFFSET: usize = 8;
/// Deepest attribute tree the walk descends.
const DA_MAX_DEPTH: usize = 5;

/// Attribute namespace, derived from the entry flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    User,
    Trusted,
    Security,
}

impl Namespace {
    fn from_flags(flags: u8) -> Self {
        if flags & ATTR_ROOT != 0 {
            Namespace::Trusted
        } else if flags & ATTR_SECURE != 0 {
            Namespace::Security
        } else {
            Namespace::User
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::User => "user.",
            Namespace::Trusted => "trusted.",
            Namespace::Security => "security.",
        }
    }
}

/// One extended attribute. The value is not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedAttribute {
    namespace: Namespace,
    name: Vec<u8>,
    value_size: u32,
}

impl ExtendedAttribute {
    pub fn new(namespace: Namespace, name: Vec<u8>, value_size: u32) -> Self {
        ExtendedAttribute {
            namespace,
            name,
            value_size,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Name without the namespace prefix.
    pub fn raw_name(&self) -> &[u8] {
        &self.name
    }

    /// Name with its namespace prefix, e.g. `user.comment`.
    pub fn name(&self) -> Vec<u8> {
        let mut full = self.namespace.prefix().as_bytes().to_vec();
        full.extend_from_slice(&self.name);
        full
    }

    pub fn value_size(&self) -> u32 {
        self.value_size
    }
}

/// Decodes a short-form attribute fork.
///
/// # Errors
/// `Argument` if an entry runs past the end of the fork.
pub fn read_short_form(fork: &[u8]) -> Result<Vec<ExtendedAttribute>> {
    utils::slice_at(fork, 0, SHORT_FORM_HEADER_SIZE)?;
    let total_size = usize::from(utils::be_u16_at(fork, 0)?);
    let count = utils::u8_at(fork, 2)?;
    let data = &fork[..total_size.clamp(SHORT_FORM_HEADER_SIZE, fork.len())];

    let mut attributes = Vec::with_capacity(count.into());
    let mut offset = SHORT_FORM_HEADER_SIZE;
    for index in 0..count {
        let name_size = usize::from(utils::u8_at(data, offset)?);
        let value_size = utils::u8_at(data, offset + 1)?;
        let flags = utils::u8_at(data, offset + 2)?;
        let name = utils::slice_at(data, offset + 3, name_size)
            .map_err(|err| err.context(format!("unable to read attribute {index}")))?;
        // value follows the name
        utils::slice_at(data, offset + 3 + name_size, value_size.into())
            .map_err(|err| err.context(format!("unable to read attribute {index}")))?;
        offset += 3 + name_size + usize::from(value_size);

        attributes.push(ExtendedAttribute::new(
            Namespace::from_flags(flags),
            name.to_vec(),
            value_size.into(),
        ));
    }
    Ok(attributes)
}

/// Decodes the entries of one attribute leaf block.
///
/// # Errors
/// - `Argument` if the block is not a leaf
/// - `Argument` if the entry table or a name lies outside the block
pub fn read_leaf_block(block: &[u8], attributes: &mut Vec<ExtendedAttribute>) -> Result<()> {
    let magic = utils::be_u16_at(block, BLOCK_INFO_MAGIC_OFFSET)?;
    let header_size = match magic {
        ATTR_LEAF_MAGIC => ATTR_LEAF_HEADER_SIZE,
        ATTR3_LEAF_MAGIC => ATTR3_LEAF_HEADER_SIZE,
        other => {
            return Err(XfsError::Argument(format!(
                "unsupported attribute leaf signature 0x{other:04x}"
            )));
        }
    };
    // entry count sits right after the block info header
    let count_offset = if magic == ATTR3_LEAF_MAGIC { 56 } else { 12 };
    let count = usize::from(utils::be_u16_at(block, count_offset)?);
    if header_size + count * 8 > block.len() {
        return Err(XfsError::Argument(format!(
            "attribute leaf entry count {count} out of bounds"
        )));
    }

    for index in 0..count {
        let entry = header_size + index * 8;
        let name_index = usize::from(utils::be_u16_at(block, entry + 4)?);
        let flags = utils::u8_at(block, entry + 6)?;
        if flags & ATTR_INCOMPLETE != 0 {
            debug!("Skipping incomplete attribute entry {index}");
            continue;
        }

        let (name_size_offset, value_size) = if flags & ATTR_LOCAL != 0 {
            (name_index + 2, u32::from(utils::be_u16_at(block, name_index)?))
        } else {
            (name_index + 8, utils::be_u32_at(block, name_index + 4)?)
        };
        let name_size = usize::from(utils::u8_at(block, name_size_offset)?);
        let name = utils::slice_at(block, name_size_offset + 1, name_size)
            .map_err(|err| err.context(format!("unable to read attribute entry {index}")))?;

        attributes.push(ExtendedAttribute::new(
            Namespace::from_flags(flags),
            name.to_vec(),
            value_size,
        ));
    }
    Ok(())
}

/// Reads attribute names from the blocks mapped by an attribute fork.
///
/// Descends from block 0 to the leftmost leaf, then follows the leaf
/// sibling chain.
pub fn read_attribute_blocks<D: BlockDevice + ?Sized>(
    device: &mut D,
    sb: &Superblock,
    extents: &[Extent],
) -> Result<Vec<ExtendedAttribute>> {
    let mut block_number = 0u64;
    let mut block = extent::read_logical_blocks(device, sb, extents, block_number, 1)?;

    let mut depth = 0;
    loop {
        let magic = utils::be_u16_at(&block, BLOCK_INFO_MAGIC_OFFSET)?;
        let header_size = match magic {
            DA_NODE_MAGIC => DA_NODE_HEADER_SIZE,
            DA3_NODE_MAGIC => DA3_NODE_HEADER_SIZE,
            _ => break,
        };
        depth += 1;
        if depth > DA_MAX_DEPTH {
            return Err(XfsError::Argument("attribute tree too deep".into()));
        }
        // first entry: hash value then the child's file block
        block_number = utils::be_u32_at(&block, header_size + 4)?.into();
        block = extent::read_logical_blocks(device, sb, extents, block_number, 1)?;
    }

    let mut attributes = Vec::new();
    let mut visited = HashSet::new();
    loop {
        if !visited.insert(block_number) {
            warn!("Attribute leaf chain loops back to block {block_number}");
            break;
        }
        read_leaf_block(&block, &mut attributes)
            .map_err(|err| err.context(format!("unable to read attribute block {block_number}")))?;
        let forward = utils::be_u32_at(&block, 0)?;
        if forward == 0 {
            break;
        }
        block_number = forward.into();
        block = extent::read_logical_blocks(device, sb, extents, block_number, 1)?;
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDomain;
    use crate::filesystem::extent::tests::{open_device, pack, sample_superblock};

    /// Version 5 leaf block holding one local user attribute.
    fn leaf3(forward: u32, name: &[u8]) -> Vec<u8> {
        let mut block = vec![0u8; 4096];
        block[0..4].copy_from_slice(&forward.to_be_bytes());
        block[8..10].copy_from_slice(&ATTR3_LEAF_MAGIC.to_be_bytes());
        block[56..58].copy_from_slice(&1u16.to_be_bytes());
        let entry = ATTR3_LEAF_HEADER_SIZE;
        block[entry + 4..entry + 6].copy_from_slice(&4000u16.to_be_bytes());
        block[entry + 6] = ATTR_LOCAL;
        block[4000..4002].copy_from_slice(&1u16.to_be_bytes());
        block[4002] = name.len() as u8;
        block[4003..4003 + name.len()].copy_from_slice(name);
        block
    }

    /// Version 5 interior node whose first entry points at file block `child`.
    fn node3(child: u32) -> Vec<u8> {
        let mut block = vec![0u8; 4096];
        block[8..10].copy_from_slice(&DA3_NODE_MAGIC.to_be_bytes());
        block[DA3_NODE_HEADER_SIZE + 4..DA3_NODE_HEADER_SIZE + 8]
            .copy_from_slice(&child.to_be_bytes());
        block
    }

    /// File blocks 0..3 of the attribute fork at filesystem blocks 5..8.
    fn fork_device(blocks: [Vec<u8>; 3]) -> (crate::device::MemoryDevice, [Extent; 1]) {
        let mut image = vec![0u8; 16 * 4096];
        for (index, block) in blocks.iter().enumerate() {
            let start = (5 + index) * 4096;
            image[start..start + 4096].copy_from_slice(block);
        }
        let extents = [Extent::decode(&pack(0, 5, 3, false)).unwrap()];
        (open_device(image), extents)
    }

    fn short_form(entries: &[(u8, &[u8], &[u8])]) -> Vec<u8> {
        let mut fork = vec![0u8; SHORT_FORM_HEADER_SIZE];
        for (flags, name, value) in entries {
            fork.push(name.len() as u8);
            fork.push(value.len() as u8);
            fork.push(*flags);
            fork.extend_from_slice(name);
            fork.extend_from_slice(value);
        }
        let total = fork.len() as u16;
        fork[0..2].copy_from_slice(&total.to_be_bytes());
        fork[2] = entries.len() as u8;
        fork
    }

    #[test]
    fn short_form_names_carry_namespace() {
        let fork = short_form(&[
            (0, &b"comment"[..], &b"hi"[..]),
            (ATTR_ROOT, &b"hidden"[..], &b""[..]),
            (ATTR_SECURE, &b"selinux"[..], &b"ctx"[..]),
        ]);
        let attributes = read_short_form(&fork).unwrap();
        let names: Vec<Vec<u8>> = attributes.iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            vec![
                b"user.comment".to_vec(),
                b"trusted.hidden".to_vec(),
                b"security.selinux".to_vec()
            ]
        );
        assert_eq!(attributes[2].value_size(), 3);
    }

    #[test]
    fn short_form_count_is_bounded() {
        let mut fork = short_form(&[(0, &b"a"[..], &b"b"[..])]);
        fork[2] = 4;
        let err = read_short_form(&fork).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
    }

    #[test]
    fn leaf_block_local_and_remote_entries() {
        let mut block = vec![0u8; 512];
        block[8..10].copy_from_slice(&ATTR_LEAF_MAGIC.to_be_bytes());
        block[12..14].copy_from_slice(&2u16.to_be_bytes());
        // entry 0: local at 400
        block[32 + 4..32 + 6].copy_from_slice(&400u16.to_be_bytes());
        block[32 + 6] = ATTR_LOCAL;
        block[400..402].copy_from_slice(&4u16.to_be_bytes());
        block[402] = 3;
        block[403..406].copy_from_slice(b"foo");
        // entry 1: remote, trusted, at 440
        block[40 + 4..40 + 6].copy_from_slice(&440u16.to_be_bytes());
        block[40 + 6] = ATTR_ROOT;
        block[444..448].copy_from_slice(&70000u32.to_be_bytes());
        block[448] = 3;
        block[449..452].copy_from_slice(b"big");

        let mut attributes = Vec::new();
        read_leaf_block(&block, &mut attributes).unwrap();
        assert_eq!(attributes[0].name(), b"user.foo".to_vec());
        assert_eq!(attributes[0].value_size(), 4);
        assert_eq!(attributes[1].name(), b"trusted.big".to_vec());
        assert_eq!(attributes[1].value_size(), 70000);
    }

    #[test]
    fn leaf_name_out_of_block_is_rejected() {
        let mut block = vec![0u8; 64];
        block[8..10].copy_from_slice(&ATTR_LEAF_MAGIC.to_be_bytes());
        block[12..14].copy_from_slice(&1u16.to_be_bytes());
        block[36..38].copy_from_slice(&60u16.to_be_bytes());
        block[38] = ATTR_LOCAL;
        block[62] = 200;
        assert!(read_leaf_block(&block, &mut Vec::new()).is_err());
    }

    #[test]
    fn node_descends_to_the_leaf_chain() {
        let sb = sample_superblock();
        let (mut device, extents) = fork_device([node3(1), leaf3(2, b"first"), leaf3(0, b"second")]);
        let attributes = read_attribute_blocks(&mut device, &sb, &extents).unwrap();
        let names: Vec<Vec<u8>> = attributes.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec![b"user.first".to_vec(), b"user.second".to_vec()]);
    }

    #[test]
    fn node_cycle_is_bounded() {
        let sb = sample_superblock();
        let (mut device, extents) = fork_device([node3(0), leaf3(0, b"x"), leaf3(0, b"y")]);
        let err = read_attribute_blocks(&mut device, &sb, &extents).unwrap_err();
        assert_eq!(err.domain(), ErrorDomain::Argument);
    }

    #[test]
    fn leaf_chain_loop_stops() {
        let sb = sample_superblock();
        let (mut device, extents) = fork_device([leaf3(1, b"a"), leaf3(2, b"b"), leaf3(1, b"c")]);
        let attributes = read_attribute_blocks(&mut device, &sb, &extents).unwrap();
        assert_eq!(attributes.len(), 3);
    }
}
