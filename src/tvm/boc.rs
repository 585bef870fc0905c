//! Bag of Cells (BoC) serialization and deserialization
//!
//! BoC encodes a DAG of cells into a byte array. Cells are deduplicated by
//! representation hash and written parents first, so every reference index
//! points forward. The reader rejects anything that breaks that rule, which
//! also makes cyclic inputs impossible to decode.

use crate::crc::crc32c_le;
use crate::tvm::cell::{Cell, MAX_CELL_DEPTH, MAX_CELL_REFS};
use crate::tvm::error::{CellError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// BoC magic number for standard format
const BOC_GENERIC_MAGIC: u32 = 0xb5ee9c72;

/// Legacy magic: indexed, single root, no checksum
const BOC_INDEXED_MAGIC: u32 = 0x68ff65f3;

/// Legacy magic: indexed, single root, CRC32-C
const BOC_INDEXED_CRC32C_MAGIC: u32 = 0xacc3a728;

/// Optional parts of the serialized container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BocOptions {
    /// Append a CRC32-C of everything before it
    pub crc32c: bool,
    /// Write the cell offset index
    pub index: bool,
}

/// Serializes a cell and its references into a Bag of Cells (BoC) format
pub fn serialize_boc(root: &Arc<Cell>, has_crc32: bool) -> Result<Vec<u8>> {
    serialize_boc_ex(
        std::slice::from_ref(root),
        &BocOptions {
            crc32c: has_crc32,
            index: false,
        },
    )
}

/// Serializes several roots into one bag; the first root always gets index 0
pub fn serialize_boc_ex(roots: &[Arc<Cell>], options: &BocOptions) -> Result<Vec<u8>> {
    if roots.is_empty() {
        return Err(CellError::boc("nothing to serialize"));
    }

    let cells = topological_order(roots);
    let indices: HashMap<[u8; 32], usize> = cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| (cell.hash(), idx))
        .collect();

    let size_bytes = bytes_needed(cells.len());

    let mut records = Vec::with_capacity(cells.len());
    for cell in &cells {
        records.push(serialize_cell(cell, &indices, size_bytes)?);
    }
    let cells_size: usize = records.iter().map(Vec::len).sum();
    let offset_bytes = bytes_needed(cells_size);

    let mut result = Vec::with_capacity(cells_size + 32);
    result.extend_from_slice(&BOC_GENERIC_MAGIC.to_be_bytes());

    // has_idx:(## 1) has_crc32c:(## 1) has_cache_bits:(## 1) flags:(## 2) size:(## 3)
    let flags = (u8::from(options.index) << 7) | (u8::from(options.crc32c) << 6);
    result.push(flags | size_bytes as u8);
    result.push(offset_bytes as u8);

    write_uint(&mut result, cells.len(), size_bytes);
    write_uint(&mut result, roots.len(), size_bytes);
    // absent
    write_uint(&mut result, 0, size_bytes);
    write_uint(&mut result, cells_size, offset_bytes);

    for root in roots {
        let idx = indices
            .get(&root.hash())
            .ok_or_else(|| CellError::boc("root cell not found in collected cells"))?;
        write_uint(&mut result, *idx, size_bytes);
    }

    if options.index {
        let mut end = 0;
        for record in &records {
            end += record.len();
            write_uint(&mut result, end, offset_bytes);
        }
    }

    for record in records {
        result.extend_from_slice(&record);
    }

    if options.crc32c {
        let crc = crc32c_le(&result);
        result.extend_from_slice(&crc);
    }

    Ok(result)
}

/// Deserializes a Bag of Cells (BoC) and returns its first root
pub fn deserialize_boc(data: &[u8]) -> Result<Arc<Cell>> {
    deserialize_boc_roots(data)?
        .into_iter()
        .next()
        .ok_or_else(|| CellError::boc("bag has no roots"))
}

/// Deserializes a Bag of Cells (BoC) into all of its roots
pub fn deserialize_boc_roots(data: &[u8]) -> Result<Vec<Arc<Cell>>> {
    let header = Header::parse(data)?;
    let mut reader = Reader::new(&data[..data.len() - header.crc_len()]);
    reader.skip(header.header_len)?;

    let mut root_indices = Vec::with_capacity(header.roots);
    if header.has_root_list {
        for _ in 0..header.roots {
            let idx = reader.read_uint(header.size_bytes)?;
            if idx >= header.cells {
                return Err(CellError::boc(format!("root index {idx} out of range")));
            }
            root_indices.push(idx);
        }
    } else {
        // legacy bags store no root list; their only root is cell 0
        root_indices.push(0);
    }

    if header.has_idx {
        reader.skip(header.cells * header.offset_bytes)?;
    }

    let area = reader.take(header.cells_size)?;
    if !reader.is_empty() {
        return Err(CellError::boc(format!(
            "{} trailing bytes after cell data",
            reader.remaining()
        )));
    }

    let mut area = Reader::new(area);
    let mut raw_cells = Vec::with_capacity(header.cells);
    for idx in 0..header.cells {
        raw_cells.push(RawCell::parse(&mut area, idx, &header)?);
    }
    if !area.is_empty() {
        return Err(CellError::boc(format!(
            "cell area declares {} bytes, cells use {}",
            header.cells_size,
            header.cells_size - area.remaining()
        )));
    }

    // Every reference points forward, so building from the end sees children first
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; header.cells];
    for (idx, raw) in raw_cells.into_iter().enumerate().rev() {
        let mut references = Vec::with_capacity(raw.references.len());
        for child in &raw.references {
            let cell = built[*child]
                .clone()
                .ok_or_else(|| CellError::boc(format!("cell {idx} references unbuilt cell {child}")))?;
            references.push(cell);
        }

        let cell = Cell::from_parts(raw.data, raw.bit_len, references, raw.exotic)
            .map_err(|e| CellError::boc(format!("cell {idx}: {e}")))?;
        if cell.level_mask() != raw.level_mask {
            return Err(CellError::boc(format!(
                "cell {idx} declares level mask {}, computed {}",
                raw.level_mask,
                cell.level_mask()
            )));
        }
        // children already carry a cached depth, so this never recurses
        if cell.depth() > MAX_CELL_DEPTH {
            return Err(CellError::boc(format!(
                "cell {idx} is deeper than {MAX_CELL_DEPTH}"
            )));
        }
        built[idx] = Some(Arc::new(cell));
    }

    root_indices
        .into_iter()
        .map(|idx| {
            built[idx]
                .clone()
                .ok_or_else(|| CellError::boc(format!("root {idx} was not built")))
        })
        .collect()
}

struct Header {
    has_root_list: bool,
    has_idx: bool,
    has_crc32c: bool,
    size_bytes: usize,
    offset_bytes: usize,
    cells: usize,
    roots: usize,
    cells_size: usize,
    header_len: usize,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let magic = reader.read_uint(4)? as u32;

        let (has_idx, has_crc32c, size_bytes) = match magic {
            BOC_GENERIC_MAGIC => {
                let byte = reader.read_uint(1)? as u8;
                let has_cache_bits = byte & 0x20 != 0;
                let flags = (byte >> 3) & 0b11;
                if flags != 0 {
                    return Err(CellError::boc(format!("unknown flags {flags:#b}")));
                }
                if has_cache_bits && byte & 0x80 == 0 {
                    return Err(CellError::boc("cache bits without an index"));
                }
                (byte & 0x80 != 0, byte & 0x40 != 0, (byte & 0x07) as usize)
            }
            BOC_INDEXED_MAGIC => (true, false, reader.read_uint(1)?),
            BOC_INDEXED_CRC32C_MAGIC => (true, true, reader.read_uint(1)?),
            _ => {
                return Err(CellError::boc(format!(
                    "invalid magic number {magic:#010x}"
                )));
            }
        };
        if size_bytes == 0 || size_bytes > 4 {
            return Err(CellError::boc(format!("invalid ref size {size_bytes}")));
        }

        if has_crc32c {
            if data.len() < 4 {
                return Err(CellError::boc("too short for a checksum"));
            }
            let (body, crc) = data.split_at(data.len() - 4);
            if crc32c_le(body) != crc {
                return Err(CellError::boc("CRC32-C mismatch"));
            }
        }

        let offset_bytes = reader.read_uint(1)?;
        if offset_bytes == 0 || offset_bytes > 8 {
            return Err(CellError::boc(format!("invalid offset size {offset_bytes}")));
        }

        let cells = reader.read_uint(size_bytes)?;
        let roots = reader.read_uint(size_bytes)?;
        let absent = reader.read_uint(size_bytes)?;
        let cells_size = reader.read_uint(offset_bytes)?;

        if cells == 0 {
            return Err(CellError::boc("bag has no cells"));
        }
        // a cell record is at least two descriptor bytes
        if cells.saturating_mul(2) > cells_size || cells_size > data.len() {
            return Err(CellError::boc(format!(
                "{cells} cells cannot fit {cells_size} bytes of a {} byte bag",
                data.len()
            )));
        }
        if roots == 0 || roots > cells {
            return Err(CellError::boc(format!("{roots} roots for {cells} cells")));
        }
        if magic != BOC_GENERIC_MAGIC && roots != 1 {
            return Err(CellError::boc("legacy bag must have exactly one root"));
        }
        if absent != 0 {
            return Err(CellError::boc(format!("{absent} absent cells are not supported")));
        }

        Ok(Self {
            has_root_list: magic == BOC_GENERIC_MAGIC,
            has_idx,
            has_crc32c,
            size_bytes,
            offset_bytes,
            cells,
            roots,
            cells_size,
            header_len: reader.pos,
        })
    }

    fn crc_len(&self) -> usize {
        if self.has_crc32c { 4 } else { 0 }
    }
}

/// A cell record before its references are resolved
struct RawCell {
    data: Vec<u8>,
    bit_len: usize,
    exotic: bool,
    level_mask: u8,
    references: Vec<usize>,
}

impl RawCell {
    fn parse(reader: &mut Reader<'_>, idx: usize, header: &Header) -> Result<Self> {
        let d1 = reader.read_uint(1)? as u8;
        let d2 = reader.read_uint(1)? as u8;

        let ref_count = (d1 & 0x07) as usize;
        let exotic = d1 & 0x08 != 0;
        let with_hashes = d1 & 0x10 != 0;
        let level_mask = d1 >> 5;

        if ref_count > MAX_CELL_REFS {
            return Err(CellError::boc(format!(
                "cell {idx} has {ref_count} references"
            )));
        }

        if with_hashes {
            let hashes = level_mask.count_ones() as usize + 1;
            reader.skip(hashes * (32 + 2))?;
        }

        let data_len = (d2 as usize).div_ceil(2);
        let mut data = reader.take(data_len)?.to_vec();
        let bit_len = if d2 % 2 == 0 {
            data_len * 8
        } else {
            let last = data[data_len - 1];
            if last == 0 {
                return Err(CellError::boc(format!(
                    "cell {idx} has no completion tag"
                )));
            }
            let tag = last.trailing_zeros() as usize;
            data[data_len - 1] &= !(1 << tag);
            data_len * 8 - tag - 1
        };

        let mut references = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let child = reader.read_uint(header.size_bytes)?;
            if child <= idx || child >= header.cells {
                return Err(CellError::boc(format!(
                    "cell {idx} references cell {child}"
                )));
            }
            references.push(child);
        }

        Ok(Self {
            data,
            bit_len,
            exotic,
            level_mask,
            references,
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(CellError::boc(format!(
                "unexpected end of data: need {n} bytes at offset {}",
                self.pos
            )));
        }
        let chunk = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(chunk)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn read_uint(&mut self, size: usize) -> Result<usize> {
        let bytes = self.take(size)?;
        Ok(bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize))
    }
}

/// Reverse post-order over the DAG: parents before children, first root first
fn topological_order(roots: &[Arc<Cell>]) -> Vec<Arc<Cell>> {
    let mut visited = HashSet::new();
    let mut post_order = Vec::new();

    for root in roots.iter().rev() {
        if !visited.insert(root.hash()) {
            continue;
        }
        let mut stack = vec![(root.clone(), 0usize)];
        loop {
            let Some((cell, next)) = stack.last_mut() else {
                break;
            };
            let child = cell.reference(*next).cloned();
            *next += 1;

            match child {
                Some(child) => {
                    if visited.insert(child.hash()) {
                        stack.push((child, 0));
                    }
                }
                None => {
                    if let Some((cell, _)) = stack.pop() {
                        post_order.push(cell);
                    }
                }
            }
        }
    }

    post_order.reverse();
    post_order
}

fn serialize_cell(
    cell: &Arc<Cell>,
    indices: &HashMap<[u8; 32], usize>,
    size_bytes: usize,
) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(2 + 128 + MAX_CELL_REFS * size_bytes);
    result.extend_from_slice(&cell.descriptors());
    result.extend_from_slice(&cell.serialize_data());

    for reference in cell.references() {
        let idx = indices
            .get(&reference.hash())
            .ok_or_else(|| CellError::boc("reference not found in cell map"))?;
        write_uint(&mut result, *idx, size_bytes);
    }

    Ok(result)
}

/// Minimal number of bytes able to hold `value`, at least one
fn bytes_needed(value: usize) -> usize {
    let bits = usize::BITS - value.leading_zeros();
    (bits as usize).div_ceil(8).max(1)
}

fn write_uint(buf: &mut Vec<u8>, value: usize, size: usize) {
    let bytes = (value as u64).to_be_bytes();
    buf.extend_from_slice(&bytes[8 - size..]);
}

/// Converts hex string to BoC
pub fn hex_to_boc(hex: &str) -> Result<Arc<Cell>> {
    let bytes = hex::decode(hex.trim()).map_err(|e| CellError::boc(format!("invalid hex: {e}")))?;
    deserialize_boc(&bytes)
}

/// Converts BoC to hex string
pub fn boc_to_hex(cell: &Arc<Cell>, has_crc32: bool) -> Result<String> {
    serialize_boc(cell, has_crc32).map(hex::encode)
}

/// Converts BoC to base64 string
pub fn boc_to_base64(cell: &Arc<Cell>, has_crc32: bool) -> Result<String> {
    serialize_boc(cell, has_crc32).map(|bytes| STANDARD.encode(bytes))
}

/// Converts base64 string to BoC
pub fn base64_to_boc(b64: &str) -> Result<Arc<Cell>> {
    let bytes = STANDARD
        .decode(b64.trim())
        .map_err(|e| CellError::boc(format!("invalid base64: {e}")))?;
    deserialize_boc(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::Builder;

    #[test]
    fn test_serialize_deserialize_simple() {
        let mut builder = Builder::new();
        builder.store_u32(0x12345678).unwrap();
        let cell = builder.build();

        let boc = serialize_boc(&cell, false).unwrap();
        let restored = deserialize_boc(&boc).unwrap();

        assert_eq!(restored.hash(), cell.hash());
        assert_eq!(restored.data(), cell.data());
    }

    #[test]
    fn test_empty_cell_vector() {
        let boc = boc_to_base64(&Arc::new(Cell::new()), true).unwrap();
        assert_eq!(boc, "te6cckEBAQEAAgAAAEysuc0=");
        assert_eq!(base64_to_boc(&boc).unwrap().bit_len(), 0);
    }

    #[test]
    fn test_hex_conversion() {
        let mut builder = Builder::new();
        builder.store_u8(0xAB).unwrap();
        let cell = builder.build();

        let hex_str = boc_to_hex(&cell, true).unwrap();
        let restored = hex_to_boc(&hex_str).unwrap();
        assert_eq!(restored, cell);
    }

    #[test]
    fn test_bytes_needed() {
        assert_eq!(bytes_needed(0), 1);
        assert_eq!(bytes_needed(255), 1);
        assert_eq!(bytes_needed(256), 2);
        assert_eq!(bytes_needed(70_000), 3);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let err = deserialize_boc(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01]).unwrap_err();
        assert!(matches!(err, CellError::MalformedBoc(_)));
    }
}
