//! Binary search tree walk
//!
//! Every node stores a left record (next bit 0) and a right record (next
//! bit 1). Values below `node_count` name another node, `node_count` itself
//! is the empty marker, and larger values point past the separator into
//! the data section.

use super::format::MmdbHeader;
use super::types::{FormatError, RecordSize, DATA_SECTION_SEPARATOR};
use std::cmp::Ordering;
use std::net::Ipv4Addr;

/// Where a walk ended up when it reached data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHit {
    /// Offset relative to the start of the data section
    pub data_offset: u32,
    /// Number of address bits consumed before reaching data
    pub depth: u8,
}

/// Read-only view over the tree part of an index
pub struct SearchTree<'a> {
    bytes: &'a [u8],
    header: &'a MmdbHeader,
}

impl<'a> SearchTree<'a> {
    pub fn new(bytes: &'a [u8], header: &'a MmdbHeader) -> Self {
        Self { bytes, header }
    }

    /// Follow the address bits from the root, at most 32 steps
    pub fn lookup_v4(&self, addr: Ipv4Addr) -> Result<Option<TreeHit>, FormatError> {
        let node_count = self.header.node_count;
        let mut node = 0u32;

        for (depth, bit) in address_bits(addr).enumerate() {
            let next = self.child(node, bit)?;
            match next.cmp(&node_count) {
                Ordering::Less => node = next,
                Ordering::Equal => return Ok(None),
                Ordering::Greater => {
                    return Ok(Some(TreeHit {
                        data_offset: self.resolve_pointer(next)?,
                        depth: depth as u8 + 1,
                    }))
                }
            }
        }
        Ok(None)
    }

    /// Record of `node` on the `right` (bit 1) or left side
    fn child(&self, node: u32, right: bool) -> Result<u32, FormatError> {
        let width = self.header.record_size.node_bytes();
        let start = node as usize * width;
        let slot = match self.bytes.get(start..start + width) {
            Some(slot) if node < self.header.node_count && start + width <= self.header.tree_size => slot,
            _ => {
                return Err(FormatError::InvalidFormat(format!(
                    "tree node {} out of range ({} nodes)",
                    node, self.header.node_count
                )))
            }
        };

        Ok(match (self.header.record_size, right) {
            (RecordSize::Bits24, false) => be24(&slot[0..3]),
            (RecordSize::Bits24, true) => be24(&slot[3..6]),
            // The middle byte carries the high nibble of both records
            (RecordSize::Bits28, false) => u32::from(slot[3] >> 4) << 24 | be24(&slot[0..3]),
            (RecordSize::Bits28, true) => u32::from(slot[3] & 0x0F) << 24 | be24(&slot[4..7]),
            (RecordSize::Bits32, false) => u32::from_be_bytes([slot[0], slot[1], slot[2], slot[3]]),
            (RecordSize::Bits32, true) => u32::from_be_bytes([slot[4], slot[5], slot[6], slot[7]]),
        })
    }

    /// Data-section offset for a pointer record
    fn resolve_pointer(&self, record: u32) -> Result<u32, FormatError> {
        record
            .checked_sub(self.header.node_count)
            .and_then(|v| v.checked_sub(DATA_SECTION_SEPARATOR.len() as u32))
            .ok_or_else(|| {
                FormatError::InvalidFormat(format!(
                    "record {} points into the separator ({} nodes)",
                    record, self.header.node_count
                ))
            })
    }
}

/// Address bits, most significant first
fn address_bits(addr: Ipv4Addr) -> impl Iterator<Item = bool> {
    let bits = u32::from(addr);
    (0..32).rev().map(move |shift| (bits >> shift) & 1 == 1)
}

fn be24(b: &[u8]) -> u32 {
    u32::from(b[0]) << 16 | u32::from(b[1]) << 8 | u32::from(b[2])
}
