//! Data section encoding and decoding
//!
//! Records are stored with the MaxMind DB data type encoding: a control
//! byte carrying the type (3 bits) and size (5 bits), followed by payload.
//! Only the types a geo record or the metadata map needs are supported.
//!
//! The encoder deduplicates at two levels. Whole values that encode to the
//! same bytes share one offset, and strings (keys included) that were
//! already written are replaced with pointers. Place names repeat across
//! almost every record, so the second level is what keeps the section small.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Strings shorter than this are always written inline; a pointer would not be smaller
const MIN_POINTER_STRING: usize = 4;

/// Pointer chains deeper than this are rejected as corrupt
const MAX_POINTER_DEPTH: u8 = 8;

/// Maps and arrays nested deeper than this are rejected as corrupt
const MAX_NESTING_DEPTH: u8 = 32;

/// Pointer hops and container levels on the current decode path
#[derive(Clone, Copy, Default)]
struct Depth {
    pointers: u8,
    nesting: u8,
}

impl Depth {
    fn follow_pointer(self) -> Result<Self, &'static str> {
        if self.pointers >= MAX_POINTER_DEPTH {
            return Err("Pointer chain too deep");
        }
        Ok(Self { pointers: self.pointers + 1, ..self })
    }

    fn enter_container(self) -> Result<Self, &'static str> {
        if self.nesting >= MAX_NESTING_DEPTH {
            return Err("Nesting too deep");
        }
        Ok(Self { nesting: self.nesting + 1, ..self })
    }
}

/// Data value that can be stored in the data section
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Pointer to another data item (offset); resolved away on decode
    Pointer(u32),
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only)
    Map(BTreeMap<String, DataValue>),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
}

impl DataValue {
    /// Borrow as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a map
    pub fn as_map(&self) -> Option<&BTreeMap<String, DataValue>> {
        match self {
            DataValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Widen any unsigned integer variant
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(n) => Some(*n as u64),
            DataValue::Uint32(n) => Some(*n as u64),
            DataValue::Uint64(n) => Some(*n),
            _ => None,
        }
    }

    /// Read a double
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Follow a path of map keys
    pub fn get_path(&self, path: &[&str]) -> Option<&DataValue> {
        path.iter()
            .try_fold(self, |value, key| value.as_map()?.get(*key))
    }
}

/// Data section encoder
///
/// Builds a data section by encoding values and tracking offsets.
pub struct DataEncoder {
    /// Encoded data buffer
    buffer: Vec<u8>,
    /// Map from serialized value to offset (whole-value deduplication)
    dedup_map: FxHashMap<Vec<u8>, u32>,
    /// Offsets of strings already committed to the buffer
    strings: FxHashMap<String, u32>,
}

impl DataEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            dedup_map: FxHashMap::default(),
            strings: FxHashMap::default(),
        }
    }

    /// Encode a value and return its offset
    ///
    /// If an identical encoding was produced before, returns the existing offset.
    pub fn encode(&mut self, value: &DataValue) -> u32 {
        let mut pass = EncodePass {
            out: Vec::new(),
            base: self.buffer.len() as u32,
            committed: &self.strings,
            pending: FxHashMap::default(),
            inline_only: false,
        };
        pass.write(value);
        let EncodePass { out, pending, .. } = pass;

        if let Some(&offset) = self.dedup_map.get(&out) {
            return offset;
        }

        let offset = self.buffer.len() as u32;
        self.strings.extend(pending);
        self.buffer.extend_from_slice(&out);
        self.dedup_map.insert(out, offset);
        offset
    }

    /// Encode a value without pointers, for sections read on their own (metadata)
    pub fn encode_standalone(value: &DataValue) -> Vec<u8> {
        let empty = FxHashMap::default();
        let mut pass = EncodePass {
            out: Vec::new(),
            base: 0,
            committed: &empty,
            pending: FxHashMap::default(),
            inline_only: true,
        };
        pass.write(value);
        pass.out
    }

    /// Get the final encoded data section
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Bytes encoded so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Get current buffer size
    pub fn size(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// One `encode` call: writes into a scratch buffer that starts at `base`
struct EncodePass<'a> {
    out: Vec<u8>,
    base: u32,
    committed: &'a FxHashMap<String, u32>,
    pending: FxHashMap<String, u32>,
    inline_only: bool,
}

impl EncodePass<'_> {
    fn write(&mut self, value: &DataValue) {
        match value {
            DataValue::Pointer(offset) => encode_pointer(*offset, &mut self.out),
            DataValue::String(s) => self.write_string(s),
            DataValue::Double(d) => {
                self.out.push(0x68); // Type 3 << 5, size 8
                self.out.extend_from_slice(&d.to_be_bytes());
            }
            DataValue::Uint16(n) => {
                encode_with_size(5, 2, &mut self.out);
                self.out.extend_from_slice(&n.to_be_bytes());
            }
            DataValue::Uint32(n) => {
                encode_with_size(6, 4, &mut self.out);
                self.out.extend_from_slice(&n.to_be_bytes());
            }
            DataValue::Map(m) => {
                encode_with_size(7, m.len(), &mut self.out);
                // BTreeMap iterates in key order, so output is deterministic
                for (key, value) in m {
                    self.write_string(key);
                    self.write(value);
                }
            }
            DataValue::Uint64(n) => {
                self.out.push(0x00); // Extended type marker
                self.out.push(0x48); // (9-7)=2, 2<<5=0x40, size=8
                self.out.extend_from_slice(&n.to_be_bytes());
            }
            DataValue::Array(a) => {
                self.out.push(0x00);
                encode_with_size(11 - 7, a.len(), &mut self.out);
                for value in a {
                    self.write(value);
                }
            }
            DataValue::Bool(b) => {
                self.out.push(0x00);
                self.out.push(if *b { 0xE1 } else { 0xE0 }); // (14-7)=7, size = value
            }
        }
    }

    fn write_string(&mut self, s: &str) {
        if !self.inline_only && s.len() >= MIN_POINTER_STRING {
            let known = self
                .committed
                .get(s)
                .or_else(|| self.pending.get(s))
                .copied();
            if let Some(offset) = known {
                encode_pointer(offset, &mut self.out);
                return;
            }
            let offset = self.base + self.out.len() as u32;
            self.pending.insert(s.to_string(), offset);
        }
        encode_with_size(2, s.len(), &mut self.out);
        self.out.extend_from_slice(s.as_bytes());
    }
}

// Type 1: Pointer
fn encode_pointer(offset: u32, buffer: &mut Vec<u8>) {
    if offset < 0x800 {
        // 11 bits
        buffer.push(0x20 | ((offset >> 8) & 0x7) as u8);
        buffer.push((offset & 0xFF) as u8);
    } else if offset < 0x80800 {
        // 19 bits, biased by 2048
        let adjusted = offset - 0x800;
        buffer.push(0x20 | (1 << 3) | ((adjusted >> 16) & 0x7) as u8);
        buffer.push(((adjusted >> 8) & 0xFF) as u8);
        buffer.push((adjusted & 0xFF) as u8);
    } else if offset < 0x8080800 {
        // 27 bits, biased by 526336
        let adjusted = offset - 0x80800;
        buffer.push(0x20 | (2 << 3) | ((adjusted >> 24) & 0x7) as u8);
        buffer.push(((adjusted >> 16) & 0xFF) as u8);
        buffer.push(((adjusted >> 8) & 0xFF) as u8);
        buffer.push((adjusted & 0xFF) as u8);
    } else {
        buffer.push(0x20 | (3 << 3));
        buffer.extend_from_slice(&offset.to_be_bytes());
    }
}

/// Encode control byte with size. Types above 7 must be given as `type - 7`
/// after the caller pushed the extended marker.
fn encode_with_size(type_id: u8, size: usize, buffer: &mut Vec<u8>) {
    let type_bits = type_id << 5;

    if size < 29 {
        buffer.push(type_bits | (size as u8));
    } else if size < 29 + 256 {
        buffer.push(type_bits | 29);
        buffer.push((size - 29) as u8);
    } else if size < 29 + 256 + 65536 {
        buffer.push(type_bits | 30);
        let adjusted = size - 29 - 256;
        buffer.extend_from_slice(&(adjusted as u16).to_be_bytes());
    } else {
        buffer.push(type_bits | 31);
        let adjusted = size - 29 - 256 - 65536;
        buffer.extend_from_slice(&(adjusted as u32).to_be_bytes()[1..]); // 3 bytes
    }
}

/// Data section decoder
///
/// Decodes values from an encoded data section buffer, following pointers.
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder over a data section; offsets are relative to its start
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Decode a value at the given offset
    pub fn decode(&self, offset: u32) -> Result<DataValue, &'static str> {
        let mut cursor = offset as usize;
        self.decode_at(&mut cursor, Depth::default())
    }

    fn decode_at(&self, cursor: &mut usize, depth: Depth) -> Result<DataValue, &'static str> {
        let ctrl = self.take_byte(cursor)?;
        let type_id = ctrl >> 5;
        let payload = ctrl & 0x1F;

        match type_id {
            0 => self.decode_extended(cursor, depth),
            1 => {
                let depth = depth.follow_pointer()?;
                let mut target = self.decode_pointer(cursor, payload)? as usize;
                self.decode_at(&mut target, depth)
            }
            2 => {
                let len = self.decode_size(cursor, payload)?;
                let bytes = self.take(cursor, len)?;
                let s = std::str::from_utf8(bytes).map_err(|_| "Invalid UTF-8")?;
                Ok(DataValue::String(s.to_string()))
            }
            3 => {
                let bytes = self.take(cursor, 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Ok(DataValue::Double(f64::from_be_bytes(raw)))
            }
            5 => {
                let len = self.decode_size(cursor, payload)?;
                Ok(DataValue::Uint16(self.decode_uint(cursor, len, 2)? as u16))
            }
            6 => {
                let len = self.decode_size(cursor, payload)?;
                Ok(DataValue::Uint32(self.decode_uint(cursor, len, 4)? as u32))
            }
            7 => {
                let count = self.decode_size(cursor, payload)?;
                let depth = depth.enter_container()?;
                let mut map = BTreeMap::new();
                for _ in 0..count {
                    let key = match self.decode_at(cursor, depth)? {
                        DataValue::String(s) => s,
                        _ => return Err("Map key must be string"),
                    };
                    let value = self.decode_at(cursor, depth)?;
                    map.insert(key, value);
                }
                Ok(DataValue::Map(map))
            }
            _ => Err("Unsupported type"),
        }
    }

    fn decode_extended(&self, cursor: &mut usize, depth: Depth) -> Result<DataValue, &'static str> {
        let ext_byte = self.take_byte(cursor)?;
        let ext_type = (ext_byte >> 5) + 7;
        let size_bits = ext_byte & 0x1F;

        match ext_type {
            9 => {
                let len = self.decode_size(cursor, size_bits)?;
                Ok(DataValue::Uint64(self.decode_uint(cursor, len, 8)?))
            }
            11 => {
                let count = self.decode_size(cursor, size_bits)?;
                let depth = depth.enter_container()?;
                let mut array = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    array.push(self.decode_at(cursor, depth)?);
                }
                Ok(DataValue::Array(array))
            }
            14 => Ok(DataValue::Bool(size_bits != 0)),
            _ => Err("Unsupported extended type"),
        }
    }

    fn decode_pointer(&self, cursor: &mut usize, payload: u8) -> Result<u32, &'static str> {
        let size_bits = (payload >> 3) & 0x3;
        let high = (payload & 0x7) as u32;
        let offset = match size_bits {
            0 => {
                let b = self.take(cursor, 1)?;
                (high << 8) | b[0] as u32
            }
            1 => {
                let b = self.take(cursor, 2)?;
                0x800 + ((high << 16) | ((b[0] as u32) << 8) | b[1] as u32)
            }
            2 => {
                let b = self.take(cursor, 3)?;
                0x80800 + ((high << 24) | ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32)
            }
            _ => {
                let b = self.take(cursor, 4)?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]])
            }
        };
        Ok(offset)
    }

    /// Unsigned integers may be stored with fewer bytes than their width
    fn decode_uint(&self, cursor: &mut usize, len: usize, max: usize) -> Result<u64, &'static str> {
        if len > max {
            return Err("Integer too wide");
        }
        let bytes = self.take(cursor, len)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    fn decode_size(&self, cursor: &mut usize, size_bits: u8) -> Result<usize, &'static str> {
        match size_bits {
            0..=28 => Ok(size_bits as usize),
            29 => Ok(29 + self.take_byte(cursor)? as usize),
            30 => {
                let b = self.take(cursor, 2)?;
                Ok(29 + 256 + u16::from_be_bytes([b[0], b[1]]) as usize)
            }
            _ => {
                let b = self.take(cursor, 3)?;
                Ok(29 + 256 + 65536 + (((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize))
            }
        }
    }

    fn take_byte(&self, cursor: &mut usize) -> Result<u8, &'static str> {
        let byte = *self.buffer.get(*cursor).ok_or("Cursor out of bounds")?;
        *cursor += 1;
        Ok(byte)
    }

    fn take(&self, cursor: &mut usize, len: usize) -> Result<&'a [u8], &'static str> {
        let end = cursor.checked_add(len).ok_or("Length overflow")?;
        let bytes = self.buffer.get(*cursor..end).ok_or("Data out of bounds")?;
        *cursor = end;
        Ok(bytes)
    }
}
