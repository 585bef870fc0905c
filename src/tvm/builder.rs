//! Builder for constructing cells
//!
//! Every `store_*` call is atomic: it either appends the whole value or returns
//! a [`CellError`] and leaves the builder exactly as it was. Calls chain through
//! `&mut Self`, and [`Must`](crate::tvm::Must) turns a chain over known-good
//! inputs into plain code.
//!
//! # Examples
//!
//! ```rust
//! use tonlink_rs::tvm::{Address, Builder};
//!
//! let mut builder = Builder::new();
//!
//! let addr = Address::new(0, [0u8; 32]);
//! builder.store_address(Some(&addr)).unwrap();
//!
//! // 1 TON
//! builder.store_coins(1_000_000_000).unwrap();
//! builder.store_string("Hello, TON!").unwrap();
//!
//! let cell = builder.build();
//! assert_eq!(cell.bit_len(), 267 + 4 + 32 + 88);
//! ```

use crate::tvm::address::{Address, ExternalAddress};
use crate::tvm::cell::{Cell, MAX_CELL_BITS, MAX_CELL_REFS};
use crate::tvm::error::{CellError, Result};
use crate::tvm::slice::Slice;
use num_bigint::{BigInt, BigUint, Sign};
use std::sync::Arc;

/// Widest integer the big-int operations accept
pub const MAX_INT_BITS: usize = 256;

/// Coins are `VarUInteger 16`: a 4-bit byte count followed by the bytes
const COINS_LEN_BITS: usize = 4;

/// Mutable cell under construction
#[derive(Debug, Clone, Default)]
pub struct Builder {
    data: Vec<u8>,
    bit_len: usize,
    references: Vec<Arc<Cell>>,
}

impl Builder {
    /// Creates a new builder
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(MAX_CELL_BITS.div_ceil(8)),
            bit_len: 0,
            references: Vec::new(),
        }
    }

    /// Returns the number of bits used
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Returns the number of available bits
    pub fn available_bits(&self) -> usize {
        MAX_CELL_BITS - self.bit_len
    }

    /// Returns the number of available bytes
    pub fn available_bytes(&self) -> usize {
        self.available_bits() / 8
    }

    /// Returns the number of references
    pub fn ref_count(&self) -> usize {
        self.references.len()
    }

    /// Returns the number of available references
    pub fn available_refs(&self) -> usize {
        MAX_CELL_REFS - self.references.len()
    }

    fn ensure_bits(&self, requested: usize) -> Result<()> {
        if requested > self.available_bits() {
            return Err(CellError::Size {
                requested,
                available: self.available_bits(),
            });
        }
        Ok(())
    }

    fn ensure_room(&self, bits: usize, refs: usize) -> Result<()> {
        if bits > self.available_bits() || refs > self.available_refs() {
            return Err(CellError::Overflow { bits, refs });
        }
        Ok(())
    }

    fn push_bit(&mut self, bit: bool) {
        let byte = self.bit_len / 8;
        if byte == self.data.len() {
            self.data.push(0);
        }
        if bit {
            self.data[byte] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    fn push_bits(&mut self, src: &[u8], bits: usize) {
        if self.bit_len % 8 == 0 && bits % 8 == 0 {
            self.data.extend_from_slice(&src[..bits / 8]);
            self.bit_len += bits;
            return;
        }
        for i in 0..bits {
            self.push_bit(src[i / 8] & (0x80 >> (i % 8)) != 0);
        }
    }

    fn push_uint(&mut self, value: u64, bits: usize) {
        for i in (0..bits).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
    }

    /// Writes the low `bits` bits of `value`, which must already fit
    fn push_big_uint(&mut self, value: &BigUint, bits: usize) {
        if bits == 0 {
            return;
        }
        let width = bits.div_ceil(8);
        let aligned = value << (width * 8 - bits);
        let bytes = aligned.to_bytes_be();
        let mut padded = vec![0u8; width.saturating_sub(bytes.len())];
        padded.extend_from_slice(&bytes);
        self.push_bits(&padded, bits);
    }

    /// Stores a single bit
    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self> {
        self.ensure_bits(1)?;
        self.push_bit(bit);
        Ok(self)
    }

    /// Stores a boolean value as a single bit
    pub fn store_bool(&mut self, value: bool) -> Result<&mut Self> {
        self.store_bit(value)
    }

    /// Stores the first `bit_len` bits of `bits`
    pub fn store_bits(&mut self, bits: &[u8], bit_len: usize) -> Result<&mut Self> {
        if bits.len() * 8 < bit_len {
            return Err(CellError::ShortSlice {
                len: bits.len(),
                bits: bit_len,
            });
        }
        self.ensure_room(bit_len, 0)?;
        self.push_bits(bits, bit_len);
        Ok(self)
    }

    /// Stores multiple bytes
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.store_bits(bytes, bytes.len() * 8)
    }

    pub fn store_u8(&mut self, value: u8) -> Result<&mut Self> {
        self.store_uint(value as u64, 8)
    }

    pub fn store_u16(&mut self, value: u16) -> Result<&mut Self> {
        self.store_uint(value as u64, 16)
    }

    /// Stores a u32 value
    pub fn store_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.store_uint(value as u64, 32)
    }

    /// Stores a u64 value
    pub fn store_u64(&mut self, value: u64) -> Result<&mut Self> {
        self.store_uint(value, 64)
    }

    /// Stores an unsigned integer in `bits` bits, big-endian.
    ///
    /// Widths above 64 go through [`Builder::store_big_uint`].
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self> {
        if bits > 64 {
            return self.store_big_uint(&BigUint::from(value), bits);
        }
        self.ensure_bits(bits)?;

        let required = (u64::BITS - value.leading_zeros()) as usize;
        if required > bits {
            return Err(CellError::ValueTooLarge {
                required,
                width: bits,
            });
        }

        self.push_uint(value, bits);
        Ok(self)
    }

    /// Stores a signed integer in `bits` bits, two's complement
    pub fn store_int(&mut self, value: i64, bits: usize) -> Result<&mut Self> {
        if bits > 64 {
            return self.store_big_int(&BigInt::from(value), bits);
        }
        self.ensure_bits(bits)?;

        let required = if value == 0 {
            0
        } else if value > 0 {
            (65 - value.leading_zeros()) as usize
        } else {
            (65 - (!value).leading_zeros()) as usize
        };
        if required > bits {
            return Err(CellError::ValueTooLarge {
                required,
                width: bits,
            });
        }

        self.push_uint(value as u64, bits);
        Ok(self)
    }

    /// Stores an unsigned big integer of up to 256 bits
    pub fn store_big_uint(&mut self, value: &BigUint, bits: usize) -> Result<&mut Self> {
        if bits > MAX_INT_BITS {
            return Err(CellError::Size {
                requested: bits,
                available: MAX_INT_BITS,
            });
        }
        let required = value.bits() as usize;
        if required > bits {
            return Err(CellError::ValueTooLarge {
                required,
                width: bits,
            });
        }
        self.ensure_bits(bits)?;

        self.push_big_uint(value, bits);
        Ok(self)
    }

    /// Stores a signed big integer of up to 256 bits, two's complement
    pub fn store_big_int(&mut self, value: &BigInt, bits: usize) -> Result<&mut Self> {
        if bits > MAX_INT_BITS {
            return Err(CellError::Size {
                requested: bits,
                available: MAX_INT_BITS,
            });
        }
        let required = match value.sign() {
            Sign::NoSign => 0,
            Sign::Plus => value.bits() as usize + 1,
            Sign::Minus => (-(value + 1u32)).bits() as usize + 1,
        };
        if required > bits {
            return Err(CellError::ValueTooLarge {
                required,
                width: bits,
            });
        }
        self.ensure_bits(bits)?;

        let unsigned = if value.sign() == Sign::Minus {
            (BigInt::from(1u32) << bits) + value
        } else {
            value.clone()
        };
        self.push_big_uint(unsigned.magnitude(), bits);
        Ok(self)
    }

    /// Stores a variable-length unsigned integer: `length_bits` of byte count,
    /// then the value in that many bytes
    pub fn store_var_uint(&mut self, value: u64, length_bits: usize) -> Result<&mut Self> {
        let byte_len = (u64::BITS - value.leading_zeros()).div_ceil(8) as usize;
        if length_bits < usize::BITS as usize && byte_len >> length_bits != 0 {
            return Err(CellError::ValueTooLarge {
                required: byte_len * 8,
                width: ((1usize << length_bits) - 1) * 8,
            });
        }
        self.ensure_bits(length_bits + byte_len * 8)?;

        self.store_uint(byte_len as u64, length_bits)?;
        self.push_uint(value, byte_len * 8);
        Ok(self)
    }

    /// Stores coins (VarUInteger 16)
    pub fn store_coins(&mut self, amount: u128) -> Result<&mut Self> {
        let byte_len = (u128::BITS - amount.leading_zeros()).div_ceil(8) as usize;
        self.store_coins_bytes(&amount.to_be_bytes()[16 - byte_len..], amount_bits(amount))
    }

    /// Stores an arbitrary precision coin amount (VarUInteger 16)
    pub fn store_big_coins(&mut self, amount: &BigUint) -> Result<&mut Self> {
        let bytes = if amount.bits() == 0 {
            Vec::new()
        } else {
            amount.to_bytes_be()
        };
        self.store_coins_bytes(&bytes, amount.bits() as usize)
    }

    fn store_coins_bytes(&mut self, bytes: &[u8], value_bits: usize) -> Result<&mut Self> {
        if bytes.len() >= 1 << COINS_LEN_BITS {
            return Err(CellError::ValueTooLarge {
                required: value_bits,
                width: ((1 << COINS_LEN_BITS) - 1) * 8,
            });
        }
        self.ensure_bits(COINS_LEN_BITS + bytes.len() * 8)?;

        self.push_uint(bytes.len() as u64, COINS_LEN_BITS);
        self.push_bits(bytes, bytes.len() * 8);
        Ok(self)
    }

    /// Stores a standard address, or `addr_none$00` for `None`
    pub fn store_address(&mut self, address: Option<&Address>) -> Result<&mut Self> {
        match address {
            None => {
                self.ensure_bits(2)?;
                self.push_uint(0b00, 2);
            }
            Some(addr) => {
                self.ensure_bits(Address::BITS)?;
                // addr_std$10 anycast:(Maybe Anycast) workchain_id:int8 address:bits256
                self.push_uint(0b10, 2);
                self.push_bit(false);
                self.push_uint(addr.workchain as u8 as u64, 8);
                self.push_bits(&addr.hash_part, 256);
            }
        }
        Ok(self)
    }

    /// Stores an external address
    pub fn store_external_address(&mut self, address: &ExternalAddress) -> Result<&mut Self> {
        self.ensure_bits(2 + 9 + address.bit_len())?;

        self.push_uint(0b01, 2);
        self.push_uint(address.bit_len() as u64, 9);
        self.push_bits(address.data(), address.bit_len());
        Ok(self)
    }

    /// Stores a reference to another cell
    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self> {
        if self.available_refs() == 0 {
            return Err(CellError::TooManyRefs);
        }
        self.references.push(cell);
        Ok(self)
    }

    /// Stores an optional reference (Maybe ^Cell). Both the flag bit and the
    /// reference slot are checked before anything is written.
    pub fn store_maybe_ref(&mut self, cell: Option<Arc<Cell>>) -> Result<&mut Self> {
        let refs = usize::from(cell.is_some());
        if self.available_bits() == 0 {
            return Err(CellError::Overflow { bits: 1, refs });
        }
        if refs > self.available_refs() {
            return Err(CellError::TooManyRefs);
        }

        self.push_bit(cell.is_some());
        if let Some(cell) = cell {
            self.references.push(cell);
        }
        Ok(self)
    }

    /// Appends the data and references of a cell
    pub fn store_cell(&mut self, cell: &Cell) -> Result<&mut Self> {
        self.ensure_room(cell.bit_len(), cell.reference_count())?;

        self.push_bits(cell.data(), cell.bit_len());
        self.references.extend(cell.references().iter().cloned());
        Ok(self)
    }

    /// Appends the contents of another builder
    pub fn store_builder(&mut self, other: &Builder) -> Result<&mut Self> {
        self.ensure_room(other.bit_len, other.references.len())?;

        self.push_bits(&other.data, other.bit_len);
        self.references.extend(other.references.iter().cloned());
        Ok(self)
    }

    /// Appends the unread part of a slice
    pub fn store_slice(&mut self, slice: &Slice) -> Result<&mut Self> {
        let bits = slice.remaining_bits();
        let refs = slice.remaining_references();
        self.ensure_room(bits, refs.len())?;

        let data = slice.preload_bits(bits)?;
        self.push_bits(&data, bits);
        self.references.extend(refs.iter().cloned());
        Ok(self)
    }

    /// Stores a string's bytes in this cell only
    pub fn store_string(&mut self, s: &str) -> Result<&mut Self> {
        self.store_bytes(s.as_bytes())
    }

    /// Stores a string using snake encoding, optionally with the `0x00` text prefix
    pub fn store_snake_string(&mut self, s: &str, with_prefix: bool) -> Result<&mut Self> {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        if with_prefix {
            bytes.push(0x00);
        }
        bytes.extend_from_slice(s.as_bytes());
        self.store_snake_bytes(&bytes)
    }

    /// Stores bytes using snake encoding: whatever fits goes here, the rest
    /// continues in a chain of cells hanging off the first free reference
    pub fn store_snake_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        let available = self.available_bytes();
        if bytes.len() <= available {
            return self.store_bytes(bytes);
        }
        if self.available_refs() == 0 {
            return Err(CellError::Overflow {
                bits: bytes.len() * 8,
                refs: 1,
            });
        }

        let tail = snake_chain(&bytes[available..]);
        self.push_bits(&bytes[..available], available * 8);
        self.references.push(tail);
        Ok(self)
    }

    /// Builds an ordinary cell. The builder stays usable.
    pub fn build(&self) -> Arc<Cell> {
        Arc::new(Cell::ordinary(
            self.data.clone(),
            self.bit_len,
            self.references.clone(),
        ))
    }

    /// Builds an exotic cell; the first data byte selects its kind
    pub fn build_exotic(&self) -> Result<Arc<Cell>> {
        Cell::from_parts(self.data.clone(), self.bit_len, self.references.clone(), true)
            .map(Arc::new)
    }

    /// Builds the cell and opens a slice over it
    pub fn to_slice(&self) -> Slice {
        Slice::new(self.build())
    }
}

fn amount_bits(amount: u128) -> usize {
    (u128::BITS - amount.leading_zeros()) as usize
}

/// Builds the continuation cells of a snake string from the last one back
fn snake_chain(bytes: &[u8]) -> Arc<Cell> {
    let mut next: Option<Arc<Cell>> = None;
    for chunk in bytes.chunks(MAX_CELL_BITS / 8).rev() {
        let refs = next.take().into_iter().collect();
        next = Some(Arc::new(Cell::ordinary(chunk.to_vec(), chunk.len() * 8, refs)));
    }
    next.unwrap_or_default()
}
