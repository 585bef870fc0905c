//! Slice implementation for reading data from cells
//!
//! A Slice reads a Cell sequentially, tracking the current position in both
//! bits and references. A failed load leaves both cursors where they were.

use crate::tvm::address::{Address, ExternalAddress};
use crate::tvm::builder::MAX_INT_BITS;
use crate::tvm::cell::Cell;
use crate::tvm::error::{CellError, Result};
use num_bigint::{BigInt, BigUint};
use std::sync::Arc;

/// A slice for reading data from a cell
#[derive(Debug, Clone)]
pub struct Slice {
    /// The cell being read
    cell: Arc<Cell>,
    /// Current bit position in the cell
    bit_pos: usize,
    /// Current reference position
    ref_pos: usize,
}

impl Slice {
    /// Creates a new slice from a cell
    pub fn new(cell: Arc<Cell>) -> Self {
        Self {
            cell,
            bit_pos: 0,
            ref_pos: 0,
        }
    }

    /// Returns the number of remaining bits
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bit_pos
    }

    /// Returns the number of remaining references
    pub fn remaining_refs(&self) -> usize {
        self.cell.reference_count() - self.ref_pos
    }

    /// References not yet loaded
    pub fn remaining_references(&self) -> &[Arc<Cell>] {
        &self.cell.references()[self.ref_pos..]
    }

    /// Checks if there is nothing left to read
    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0 && self.remaining_refs() == 0
    }

    /// Checks if a specific number of bits can be read
    pub fn can_read_bits(&self, n: usize) -> bool {
        n <= self.remaining_bits()
    }

    /// Checks if a specific number of references can be read
    pub fn can_read_refs(&self, n: usize) -> bool {
        n <= self.remaining_refs()
    }

    /// Gets the underlying cell
    pub fn cell(&self) -> &Arc<Cell> {
        &self.cell
    }

    /// Gets the current bit position
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Gets the current reference position
    pub fn ref_position(&self) -> usize {
        self.ref_pos
    }

    fn ensure_bits(&self, n: usize) -> Result<()> {
        if n > self.remaining_bits() {
            return Err(CellError::bits(n, self.remaining_bits()));
        }
        Ok(())
    }

    /// Runs a composite load on a copy of the cursor and commits it only on success
    fn atomically<T>(&mut self, load: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mut probe = self.clone();
        let value = load(&mut probe)?;
        *self = probe;
        Ok(value)
    }

    fn bit_at(&self, pos: usize) -> bool {
        self.cell.data()[pos / 8] & (0x80 >> (pos % 8)) != 0
    }

    fn uint_at(&self, pos: usize, bits: usize) -> u64 {
        (pos..pos + bits).fold(0, |acc, p| (acc << 1) | self.bit_at(p) as u64)
    }

    /// Reads `n` bits without advancing
    pub fn preload_bits(&self, n: usize) -> Result<Vec<u8>> {
        self.ensure_bits(n)?;

        let mut result = vec![0u8; n.div_ceil(8)];
        if self.bit_pos % 8 == 0 {
            let start = self.bit_pos / 8;
            result.copy_from_slice(&self.cell.data()[start..start + n.div_ceil(8)]);
            if n % 8 != 0 {
                result[n / 8] &= 0xFF << (8 - n % 8);
            }
        } else {
            for i in 0..n {
                if self.bit_at(self.bit_pos + i) {
                    result[i / 8] |= 0x80 >> (i % 8);
                }
            }
        }
        Ok(result)
    }

    /// Loads `n` bits into a left-aligned byte vector
    pub fn load_bits(&mut self, n: usize) -> Result<Vec<u8>> {
        let bits = self.preload_bits(n)?;
        self.bit_pos += n;
        Ok(bits)
    }

    pub fn preload_bit(&self) -> Result<bool> {
        self.ensure_bits(1)?;
        Ok(self.bit_at(self.bit_pos))
    }

    /// Loads a single bit
    pub fn load_bit(&mut self) -> Result<bool> {
        let bit = self.preload_bit()?;
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Loads a boolean stored as one bit
    pub fn load_bool(&mut self) -> Result<bool> {
        self.load_bit()
    }

    /// Loads multiple bytes
    pub fn load_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.load_bits(n * 8)
    }

    /// Reads an unsigned integer of up to 64 bits without advancing
    pub fn preload_uint(&self, bits: usize) -> Result<u64> {
        if bits > 64 {
            return Err(CellError::ValueTooLarge {
                required: bits,
                width: 64,
            });
        }
        self.ensure_bits(bits)?;
        Ok(self.uint_at(self.bit_pos, bits))
    }

    /// Loads an unsigned integer of up to 64 bits
    pub fn load_uint(&mut self, bits: usize) -> Result<u64> {
        let value = self.preload_uint(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    pub fn preload_int(&self, bits: usize) -> Result<i64> {
        let unsigned = self.preload_uint(bits)?;
        if bits == 0 || bits == 64 {
            return Ok(unsigned as i64);
        }
        let shift = 64 - bits;
        Ok(((unsigned << shift) as i64) >> shift)
    }

    /// Loads a signed integer of up to 64 bits
    pub fn load_int(&mut self, bits: usize) -> Result<i64> {
        let value = self.preload_int(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Loads a byte (8 bits)
    pub fn load_u8(&mut self) -> Result<u8> {
        Ok(self.load_uint(8)? as u8)
    }

    /// Loads a u16 value (16 bits, big-endian)
    pub fn load_u16(&mut self) -> Result<u16> {
        Ok(self.load_uint(16)? as u16)
    }

    /// Loads a u32 value (32 bits, big-endian)
    pub fn load_u32(&mut self) -> Result<u32> {
        Ok(self.load_uint(32)? as u32)
    }

    /// Loads a u64 value (64 bits, big-endian)
    pub fn load_u64(&mut self) -> Result<u64> {
        self.load_uint(64)
    }

    pub fn preload_u32(&self) -> Result<u32> {
        Ok(self.preload_uint(32)? as u32)
    }

    /// Loads an unsigned big integer of up to 256 bits
    pub fn load_big_uint(&mut self, bits: usize) -> Result<BigUint> {
        if bits > MAX_INT_BITS {
            return Err(CellError::ValueTooLarge {
                required: bits,
                width: MAX_INT_BITS,
            });
        }
        let bytes = self.load_bits(bits)?;
        let value = BigUint::from_bytes_be(&bytes);
        Ok(value >> (bytes.len() * 8 - bits))
    }

    /// Loads a two's complement big integer of up to 256 bits
    pub fn load_big_int(&mut self, bits: usize) -> Result<BigInt> {
        let unsigned = BigInt::from(self.load_big_uint(bits)?);
        if bits > 0 && unsigned.bit(bits as u64 - 1) {
            Ok(unsigned - (BigInt::from(1u32) << bits))
        } else {
            Ok(unsigned)
        }
    }

    /// Loads a variable-length unsigned integer: `length_bits` of byte count
    /// followed by that many bytes
    pub fn load_var_uint(&mut self, length_bits: usize) -> Result<u64> {
        self.atomically(|s| {
            let byte_len = s.load_uint(length_bits)? as usize;
            if byte_len > 8 {
                return Err(CellError::ValueTooLarge {
                    required: byte_len * 8,
                    width: 64,
                });
            }
            s.load_uint(byte_len * 8)
        })
    }

    /// Loads coins (VarUInteger 16)
    pub fn load_coins(&mut self) -> Result<u128> {
        self.atomically(|s| {
            let len = s.load_uint(4)? as usize;
            let bytes = s.load_bytes(len)?;
            Ok(bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128))
        })
    }

    /// Loads coins into an arbitrary precision integer
    pub fn load_big_coins(&mut self) -> Result<BigUint> {
        self.atomically(|s| {
            let len = s.load_uint(4)? as usize;
            Ok(BigUint::from_bytes_be(&s.load_bytes(len)?))
        })
    }

    /// Loads an internal address; `addr_none$00` yields `None`
    pub fn load_address(&mut self) -> Result<Option<Address>> {
        self.atomically(|s| {
            let tag = s.load_uint(2)? as u8;
            match tag {
                0b00 => Ok(None),
                0b10 => {
                    if s.load_bit()? {
                        // anycast
                        return Err(CellError::UnsupportedAddress(tag));
                    }
                    let workchain = s.load_int(8)? as i8;
                    let mut hash_part = [0u8; 32];
                    hash_part.copy_from_slice(&s.load_bits(256)?);
                    Ok(Some(Address::new(workchain, hash_part)))
                }
                _ => Err(CellError::UnsupportedAddress(tag)),
            }
        })
    }

    /// Loads an `addr_extern$01` address
    pub fn load_external_address(&mut self) -> Result<ExternalAddress> {
        self.atomically(|s| {
            let tag = s.load_uint(2)? as u8;
            if tag != 0b01 {
                return Err(CellError::UnsupportedAddress(tag));
            }
            let len = s.load_uint(9)? as usize;
            ExternalAddress::new(s.load_bits(len)?, len)
        })
    }

    /// Preloads a reference without advancing the position
    pub fn preload_ref(&self, index: usize) -> Result<Arc<Cell>> {
        self.remaining_references()
            .get(index)
            .cloned()
            .ok_or_else(|| CellError::refs(index + 1, self.remaining_refs()))
    }

    /// Loads a reference to another cell
    pub fn load_ref(&mut self) -> Result<Arc<Cell>> {
        let reference = self.preload_ref(0)?;
        self.ref_pos += 1;
        Ok(reference)
    }

    /// Loads an optional reference (Maybe ^Cell)
    pub fn load_maybe_ref(&mut self) -> Result<Option<Arc<Cell>>> {
        self.atomically(|s| {
            if s.load_bit()? {
                s.load_ref().map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Loads a snake-encoded string: the rest of this cell's bytes, then the
    /// chain of first references
    pub fn load_string(&mut self) -> Result<String> {
        self.atomically(|s| {
            let mut bytes = s.load_bytes(s.remaining_bits() / 8)?;
            let mut next = if s.remaining_refs() > 0 {
                Some(s.load_ref()?)
            } else {
                None
            };
            while let Some(cell) = next {
                let mut part = Slice::new(cell);
                bytes.extend(part.load_bytes(part.remaining_bits() / 8)?);
                next = part.remaining_references().first().cloned();
            }
            String::from_utf8(bytes).map_err(|e| CellError::InvalidCell(e.to_string()))
        })
    }

    /// Skips a number of bits
    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        self.ensure_bits(n)?;
        self.bit_pos += n;
        Ok(())
    }

    /// Skips a number of references
    pub fn skip_refs(&mut self, n: usize) -> Result<()> {
        if n > self.remaining_refs() {
            return Err(CellError::refs(n, self.remaining_refs()));
        }
        self.ref_pos += n;
        Ok(())
    }
}

impl From<Arc<Cell>> for Slice {
    fn from(cell: Arc<Cell>) -> Self {
        Self::new(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::Builder;

    #[test]
    fn test_slice_load_bits() {
        let mut builder = Builder::new();
        builder.store_u8(0xFF).unwrap().store_u8(0x00).unwrap();

        let mut slice = builder.to_slice();
        assert_eq!(slice.remaining_bits(), 16);

        assert_eq!(slice.load_u8().unwrap(), 0xFF);
        assert_eq!(slice.remaining_bits(), 8);

        assert_eq!(slice.load_u8().unwrap(), 0x00);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_slice_load_uint() {
        let mut builder = Builder::new();
        builder.store_u32(0x12345678).unwrap();

        let mut slice = builder.to_slice();
        assert_eq!(slice.preload_u32().unwrap(), 0x12345678);
        assert_eq!(slice.load_u32().unwrap(), 0x12345678);
    }

    #[test]
    fn test_slice_signed_values() {
        let mut builder = Builder::new();
        builder.store_int(-3, 5).unwrap().store_int(i64::MIN, 64).unwrap();

        let mut slice = builder.to_slice();
        assert_eq!(slice.load_int(5).unwrap(), -3);
        assert_eq!(slice.load_int(64).unwrap(), i64::MIN);
    }

    #[test]
    fn test_slice_load_reference() {
        let ref_cell = Builder::new().build();

        let mut builder = Builder::new();
        builder.store_ref(ref_cell.clone()).unwrap();

        let mut slice = builder.to_slice();
        assert_eq!(slice.remaining_refs(), 1);

        let loaded = slice.load_ref().unwrap();
        assert!(Arc::ptr_eq(&loaded, &ref_cell));
        assert_eq!(slice.remaining_refs(), 0);
        assert!(slice.load_ref().is_err());
    }

    #[test]
    fn test_slice_skip() {
        let mut builder = Builder::new();
        builder.store_u32(0x12345678).unwrap();

        let mut slice = builder.to_slice();
        slice.skip_bits(16).unwrap();
        assert_eq!(slice.remaining_bits(), 16);
        assert_eq!(slice.load_u16().unwrap(), 0x5678);
        assert!(slice.skip_bits(1).is_err());
    }

    #[test]
    fn test_slice_failed_load_keeps_cursor() {
        let mut builder = Builder::new();
        builder.store_uint(0xF, 4).unwrap().store_bit(true).unwrap();

        let mut slice = builder.to_slice();
        slice.load_bit().unwrap();
        assert_eq!(
            slice.load_u8().unwrap_err(),
            CellError::bits(8, 4)
        );
        assert_eq!(slice.bit_position(), 1);

        // coins header says 15 bytes follow, only one bit does
        assert!(slice.load_coins().is_err());
        assert_eq!(slice.bit_position(), 1);
        assert!(slice.load_maybe_ref().is_err());
        assert_eq!(slice.bit_position(), 1);
    }

    #[test]
    fn test_slice_unaligned_bits() {
        let mut builder = Builder::new();
        builder.store_bit(true).unwrap().store_bytes(&[0xAB, 0xCD]).unwrap();

        let mut slice = builder.to_slice();
        slice.skip_bits(1).unwrap();
        assert_eq!(slice.preload_bits(12).unwrap(), vec![0xAB, 0xC0]);
        assert_eq!(slice.load_bytes(2).unwrap(), vec![0xAB, 0xCD]);
    }

    #[test]
    fn test_slice_big_values() {
        let big = (BigUint::from(1u8) << 200) + 12345u32;
        let coins = BigUint::from(1_000_000_007u64) * 1_000_000_000u64;
        let mut builder = Builder::new();
        builder
            .store_big_uint(&big, 256)
            .unwrap()
            .store_big_int(&BigInt::from(-77), 100)
            .unwrap()
            .store_big_coins(&coins)
            .unwrap();

        let mut slice = builder.to_slice();
        assert_eq!(slice.load_big_uint(256).unwrap(), big);
        assert_eq!(slice.load_big_int(100).unwrap(), BigInt::from(-77));
        assert_eq!(slice.load_big_coins().unwrap(), coins);
    }

    #[test]
    fn test_slice_var_uint() {
        let mut builder = Builder::new();
        builder.store_var_uint(0xABCDEF, 5).unwrap();
        let mut slice = builder.to_slice();
        assert_eq!(slice.load_var_uint(5).unwrap(), 0xABCDEF);
    }

    #[test]
    fn test_slice_addresses() {
        let addr = Address::new(-1, [0x42; 32]);
        let ext = ExternalAddress::new(vec![0xA5, 0x80], 9).unwrap();

        let mut builder = Builder::new();
        builder
            .store_address(Some(&addr))
            .unwrap()
            .store_address(None)
            .unwrap()
            .store_external_address(&ext)
            .unwrap();

        let mut slice = builder.to_slice();
        assert_eq!(slice.load_address().unwrap(), Some(addr));
        assert_eq!(slice.load_address().unwrap(), None);
        assert!(matches!(
            slice.clone().load_address(),
            Err(CellError::UnsupportedAddress(0b01))
        ));
        assert_eq!(slice.load_external_address().unwrap(), ext);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_slice_snake_string() {
        let text = "snake ".repeat(60);
        let mut builder = Builder::new();
        builder.store_u8(7).unwrap().store_snake_string(&text, false).unwrap();

        let mut slice = builder.to_slice();
        assert_eq!(slice.load_u8().unwrap(), 7);
        assert_eq!(slice.load_string().unwrap(), text);
        assert!(slice.is_empty());
    }
}
