//! Cell implementation for TON blockchain
//!
//! A cell is a fundamental data structure in TON that can store up to 1023 bits
//! of data and maintain up to 4 references to other cells. Cells are immutable
//! once created and shared through `Arc`, so a tree of cells is really a DAG.

use crate::tvm::error::{CellError, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Maximum number of bits a cell can store
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of references a cell can have
pub const MAX_CELL_REFS: usize = 4;

/// Cell level range (0-3)
pub const MAX_CELL_LEVEL: u8 = 3;

/// Deepest reference chain accepted from a serialized bag
pub const MAX_CELL_DEPTH: u16 = 1024;

/// Cell flavour, taken from the exotic descriptor bit and the first data byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Ordinary,
    PrunedBranch,
    Library,
    MerkleProof,
    MerkleUpdate,
}

impl CellKind {
    /// Maps the type byte of an exotic cell
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::PrunedBranch),
            2 => Some(Self::Library),
            3 => Some(Self::MerkleProof),
            4 => Some(Self::MerkleUpdate),
            _ => None,
        }
    }

    pub fn tag(self) -> Option<u8> {
        match self {
            Self::Ordinary => None,
            Self::PrunedBranch => Some(1),
            Self::Library => Some(2),
            Self::MerkleProof => Some(3),
            Self::MerkleUpdate => Some(4),
        }
    }

    pub fn is_exotic(self) -> bool {
        self != Self::Ordinary
    }
}

/// Represents a cell in the TON blockchain
#[derive(Clone)]
pub struct Cell {
    /// Cell data, left aligned; bits past `bit_len` are always zero
    data: Vec<u8>,
    /// Number of bits in the cell (not necessarily a multiple of 8)
    bit_len: usize,
    /// References to other cells
    references: Vec<Arc<Cell>>,
    kind: CellKind,
    level_mask: u8,
    /// Representation hash, filled on first access
    hash: OnceLock<[u8; 32]>,
    /// Representation depth, filled on first access
    depth: OnceLock<u16>,
}

impl Cell {
    /// Creates a new empty cell
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            bit_len: 0,
            references: Vec::new(),
            kind: CellKind::Ordinary,
            level_mask: 0,
            hash: OnceLock::new(),
            depth: OnceLock::new(),
        }
    }

    /// Creates an ordinary cell without references
    pub(crate) fn with_data(data: Vec<u8>, bit_len: usize) -> Result<Self> {
        Self::from_parts(data, bit_len, Vec::new(), false)
    }

    /// Assembles an ordinary cell from parts the builder already keeps within
    /// limits: at most 1023 bits, zeroed trailing bits, at most 4 references.
    pub(crate) fn ordinary(data: Vec<u8>, bit_len: usize, references: Vec<Arc<Cell>>) -> Self {
        let level_mask = references.iter().fold(0, |mask, r| mask | r.level_mask);
        Self {
            data,
            bit_len,
            references,
            kind: CellKind::Ordinary,
            level_mask,
            hash: OnceLock::new(),
            depth: OnceLock::new(),
        }
    }

    /// Validates raw parts and assembles a cell. Used by exotic builds and by
    /// BOC deserialization.
    pub(crate) fn from_parts(
        mut data: Vec<u8>,
        bit_len: usize,
        references: Vec<Arc<Cell>>,
        exotic: bool,
    ) -> Result<Self> {
        if bit_len > MAX_CELL_BITS {
            return Err(CellError::InvalidCell(format!(
                "bit length {bit_len} exceeds maximum {MAX_CELL_BITS}"
            )));
        }
        if references.len() > MAX_CELL_REFS {
            return Err(CellError::InvalidCell(format!(
                "{} references exceed maximum {MAX_CELL_REFS}",
                references.len()
            )));
        }

        let required_bytes = bit_len.div_ceil(8);
        if data.len() < required_bytes {
            return Err(CellError::InvalidCell(format!(
                "data length {} is insufficient for {bit_len} bits",
                data.len()
            )));
        }
        data.truncate(required_bytes);
        if bit_len % 8 != 0 {
            data[bit_len / 8] &= 0xFF << (8 - bit_len % 8);
        }

        let kind = if exotic {
            if bit_len < 8 {
                return Err(CellError::InvalidCell(
                    "exotic cell must carry a type byte".into(),
                ));
            }
            CellKind::from_tag(data[0]).ok_or_else(|| {
                CellError::InvalidCell(format!("unknown exotic cell type {}", data[0]))
            })?
        } else {
            CellKind::Ordinary
        };

        let level_mask = Self::compute_level_mask(kind, &data, bit_len, &references)?;

        Ok(Self {
            data,
            bit_len,
            references,
            kind,
            level_mask,
            hash: OnceLock::new(),
            depth: OnceLock::new(),
        })
    }

    fn compute_level_mask(
        kind: CellKind,
        data: &[u8],
        bit_len: usize,
        references: &[Arc<Cell>],
    ) -> Result<u8> {
        let children = references.iter().fold(0, |mask, r| mask | r.level_mask);
        let expect_refs = |count: usize| {
            if references.len() == count {
                Ok(())
            } else {
                Err(CellError::InvalidCell(format!(
                    "{kind:?} cell must have {count} references, got {}",
                    references.len()
                )))
            }
        };

        match kind {
            CellKind::Ordinary => Ok(children),
            CellKind::PrunedBranch => {
                expect_refs(0)?;
                if bit_len < 16 || data[1] == 0 || data[1] > 7 {
                    return Err(CellError::InvalidCell(
                        "pruned branch has an invalid level mask".into(),
                    ));
                }
                Ok(data[1])
            }
            CellKind::Library => {
                expect_refs(0)?;
                Ok(0)
            }
            CellKind::MerkleProof => {
                expect_refs(1)?;
                Ok(children >> 1)
            }
            CellKind::MerkleUpdate => {
                expect_refs(2)?;
                Ok(children >> 1)
            }
        }
    }

    /// Returns the cell's data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of bits in the cell
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Returns the cell's references
    pub fn references(&self) -> &[Arc<Cell>] {
        &self.references
    }

    /// Returns the number of references
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Gets a reference by index
    pub fn reference(&self, index: usize) -> Option<&Arc<Cell>> {
        self.references.get(index)
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    /// Returns whether this is an exotic cell
    pub fn is_exotic(&self) -> bool {
        self.kind.is_exotic()
    }

    pub fn level_mask(&self) -> u8 {
        self.level_mask
    }

    /// Returns the cell's level, the index of the highest bit of the level mask
    pub fn level(&self) -> u8 {
        (8 - self.level_mask.leading_zeros()) as u8
    }

    /// Computes the cell's descriptors (2 bytes)
    pub fn descriptors(&self) -> [u8; 2] {
        // First byte: r + 8*s + 32*l
        // r = number of references (0-4)
        // s = exotic flag (0 or 1)
        // l = level mask (0-7)
        let refs_descriptor = self.references.len() as u8
            + if self.is_exotic() { 8 } else { 0 }
            + self.level_mask * 32;

        // Second byte: floor(b/8) + ceil(b/8)
        let bits_descriptor = (self.bit_len / 8 + self.bit_len.div_ceil(8)) as u8;

        [refs_descriptor, bits_descriptor]
    }

    /// Serializes the cell data, appending the completion tag to an incomplete byte
    pub fn serialize_data(&self) -> Vec<u8> {
        let mut result = self.data.clone();

        if self.bit_len % 8 != 0 {
            let last_byte_idx = self.bit_len / 8;
            let bits_in_last_byte = self.bit_len % 8;
            result[last_byte_idx] |= 1 << (7 - bits_in_last_byte);
        }

        result
    }

    /// Computes the depth of the cell
    pub fn depth(&self) -> u16 {
        *self.depth.get_or_init(|| {
            self.references
                .iter()
                .map(|r| r.depth().saturating_add(1))
                .max()
                .unwrap_or(0)
        })
    }

    /// Computes the representation hash of the cell.
    ///
    /// Children are hashed first and their hashes are cached, so shared
    /// sub-cells of a DAG are hashed exactly once.
    pub fn hash(&self) -> [u8; 32] {
        *self.hash.get_or_init(|| {
            let mut hasher = Sha256::new();

            hasher.update(self.descriptors());
            hasher.update(self.serialize_data());

            for reference in &self.references {
                hasher.update(reference.depth().to_be_bytes());
            }
            for reference in &self.references {
                hasher.update(reference.hash());
            }

            hasher.finalize().into()
        })
    }

    /// Hex form of the representation hash
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    /// Data bits as upper-case hex in the Fift notation: a trailing `_` marks
    /// that the last nibble carries a completion tag.
    pub fn data_hex(&self) -> String {
        if self.bit_len % 4 == 0 {
            let mut out = hex::encode_upper(&self.data);
            out.truncate(self.bit_len / 4);
            out
        } else {
            let mut padded = self.data.clone();
            if self.bit_len % 8 == 0 {
                padded.push(0x80);
            } else {
                padded[self.bit_len / 8] |= 1 << (7 - self.bit_len % 8);
            }
            let mut out = hex::encode_upper(&padded);
            out.truncate(self.bit_len.div_ceil(4));
            out.push('_');
            out
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{:indent$}", "")?;
        if let Some(tag) = self.kind.tag() {
            write!(f, "{tag}:")?;
        }
        write!(f, "x{{{}}}", self.data_hex())?;
        for reference in &self.references {
            writeln!(f)?;
            reference.fmt_tree(f, indent + 1)?;
        }
        Ok(())
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write(&Cell::hash(self));
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("kind", &self.kind)
            .field("bits", &self.bit_len)
            .field("data", &self.data_hex())
            .field("refs", &self.references.len())
            .field("hash", &self.hash_hex())
            .finish()
    }
}

/// Fift-style dump: one `x{...}` line per cell, children indented by one space
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}
