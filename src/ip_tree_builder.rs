//! IP Tree Builder for MMDB Format
//!
//! Builds the binary search tree for IPv4 lookups. Nodes live in an arena
//! and edges carry either a child node, a data offset, or nothing.
//!
//! Longest-prefix-match is resolved while building: every edge ends up
//! holding the data of the most specific inserted network covering it, no
//! matter which order networks were inserted in. Re-inserting the same
//! network replaces the earlier data.

use crate::error::{GeoError, Result};
use crate::mmdb::RecordSize;
use std::net::Ipv4Addr;

/// IPv4 tree builder using arena allocation
pub struct IpTreeBuilder {
    /// All nodes in the tree (arena); node 0 is the root
    nodes: Vec<Node>,
}

/// A node in the IP tree
#[derive(Debug, Clone)]
struct Node {
    /// Left child (bit 0)
    left: NodePointer,
    /// Right child (bit 1)
    right: NodePointer,
}

/// Node pointer - can point to another node, data, or be empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodePointer {
    /// Points to another node (value is node ID)
    Node(u32),
    /// Points to data section (data offset, prefix length of the owning network)
    Data(u32, u8),
    /// Empty (not found marker)
    Empty,
}

/// Serialized tree plus the parameters readers need
#[derive(Debug)]
pub struct BuiltTree {
    /// Encoded nodes
    pub bytes: Vec<u8>,
    /// Number of nodes
    pub node_count: u32,
    /// Record width chosen for this tree
    pub record_size: RecordSize,
}

impl IpTreeBuilder {
    /// Create a new IPv4 tree builder
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new_empty()],
        }
    }

    /// Number of nodes allocated so far
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Insert a network with its data offset
    pub fn insert(&mut self, addr: Ipv4Addr, prefix_len: u8, data_offset: u32) -> Result<()> {
        if prefix_len > 32 {
            return Err(GeoError::InvalidNetwork(format!(
                "{}/{}: prefix length exceeds 32",
                addr, prefix_len
            )));
        }

        if prefix_len == 0 {
            // 0.0.0.0/0 has no edge of its own; it fills the whole tree
            self.backfill(0, data_offset, 0);
            return Ok(());
        }

        let bits = u32::from(addr);
        let mut node_id = 0u32;

        for depth in 0..prefix_len {
            let bit = ((bits >> (31 - depth)) & 1) as u8;
            let child = self.child(node_id, bit);

            if depth + 1 == prefix_len {
                match child {
                    NodePointer::Empty => {
                        self.set_child(node_id, bit, NodePointer::Data(data_offset, prefix_len));
                    }
                    NodePointer::Data(_, existing_prefix_len) => {
                        // Equal means the same network again: last write wins
                        if prefix_len >= existing_prefix_len {
                            self.set_child(node_id, bit, NodePointer::Data(data_offset, prefix_len));
                        }
                    }
                    NodePointer::Node(child_id) => {
                        // More specific networks already live below this edge
                        self.backfill(child_id, data_offset, prefix_len);
                    }
                }
                return Ok(());
            }

            node_id = match child {
                NodePointer::Empty => {
                    let new_id = self.allocate_node();
                    self.set_child(node_id, bit, NodePointer::Node(new_id));
                    new_id
                }
                NodePointer::Node(child_id) => child_id,
                NodePointer::Data(existing_offset, existing_prefix_len) => {
                    // A less specific network covers this edge: split it so both
                    // halves keep the existing data, then continue down
                    let new_id = self.allocate_node();
                    let inherited = NodePointer::Data(existing_offset, existing_prefix_len);
                    self.nodes[new_id as usize].left = inherited;
                    self.nodes[new_id as usize].right = inherited;
                    self.set_child(node_id, bit, NodePointer::Node(new_id));
                    new_id
                }
            };
        }

        Ok(())
    }

    fn child(&self, node_id: u32, bit: u8) -> NodePointer {
        let node = &self.nodes[node_id as usize];
        if bit == 0 {
            node.left
        } else {
            node.right
        }
    }

    fn set_child(&mut self, node_id: u32, bit: u8, pointer: NodePointer) {
        let node = &mut self.nodes[node_id as usize];
        if bit == 0 {
            node.left = pointer;
        } else {
            node.right = pointer;
        }
    }

    /// Allocate a new node and return its ID
    fn allocate_node(&mut self) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::new_empty());
        id
    }

    /// Fill a subtree with a network's data wherever nothing at least as
    /// specific is already present
    ///
    /// Iterative so that deep subtrees cannot exhaust the stack.
    fn backfill(&mut self, root: u32, data_offset: u32, prefix_len: u8) {
        let mut stack = vec![root];
        while let Some(node_id) = stack.pop() {
            for bit in [0u8, 1u8] {
                match self.child(node_id, bit) {
                    NodePointer::Empty => {
                        self.set_child(node_id, bit, NodePointer::Data(data_offset, prefix_len));
                    }
                    NodePointer::Data(_, existing_prefix_len) => {
                        if prefix_len >= existing_prefix_len {
                            self.set_child(node_id, bit, NodePointer::Data(data_offset, prefix_len));
                        }
                    }
                    NodePointer::Node(child_id) => stack.push(child_id),
                }
            }
        }
    }

    /// Serialize the tree, picking the narrowest record size that can
    /// address a data section of `data_len` bytes
    pub fn build(&self, data_len: usize) -> Result<BuiltTree> {
        let node_count = self.nodes.len() as u32;
        let record_size = RecordSize::smallest_for(node_count, data_len).ok_or_else(|| {
            GeoError::IndexTooLarge(format!(
                "{} nodes with {} bytes of data exceed 32-bit records",
                node_count, data_len
            ))
        })?;
        let node_bytes = record_size.node_bytes();

        let mut bytes = vec![0u8; node_count as usize * node_bytes];
        for (node_id, node) in self.nodes.iter().enumerate() {
            let left = pointer_to_value(node.left, node_count);
            let right = pointer_to_value(node.right, node_count);
            let slot = &mut bytes[node_id * node_bytes..(node_id + 1) * node_bytes];
            write_node(slot, record_size, left, right);
        }

        Ok(BuiltTree {
            bytes,
            node_count,
            record_size,
        })
    }
}

impl Default for IpTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    fn new_empty() -> Self {
        Self {
            left: NodePointer::Empty,
            right: NodePointer::Empty,
        }
    }
}

/// Convert node pointer to its record value; the prefix length is build-time only.
/// `build` has already checked that `node_count + 16 + offset` fits the record size.
fn pointer_to_value(pointer: NodePointer, node_count: u32) -> u32 {
    match pointer {
        NodePointer::Empty => node_count,
        NodePointer::Node(id) => id,
        NodePointer::Data(offset, _) => node_count + 16 + offset,
    }
}

fn write_node(slot: &mut [u8], record_size: RecordSize, left: u32, right: u32) {
    let l = left.to_be_bytes();
    let r = right.to_be_bytes();
    match record_size {
        RecordSize::Bits24 => {
            slot[0..3].copy_from_slice(&l[1..]);
            slot[3..6].copy_from_slice(&r[1..]);
        }
        RecordSize::Bits28 => {
            // [Left low 24][left high nibble | right high nibble][Right low 24]
            slot[0..3].copy_from_slice(&l[1..]);
            slot[3] = ((l[0] & 0x0F) << 4) | (r[0] & 0x0F);
            slot[4..7].copy_from_slice(&r[1..]);
        }
        RecordSize::Bits32 => {
            slot[0..4].copy_from_slice(&l);
            slot[4..8].copy_from_slice(&r);
        }
    }
}
