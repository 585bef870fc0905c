//! TON Address implementation
//!
//! Internal addresses are `addr_std$10` values (workchain + 256-bit account id),
//! external ones are `addr_extern$01` bit strings of up to 511 bits.

use crate::tvm::error::{CellError, Result};
use std::fmt;
use std::str::FromStr;

/// Represents a TON blockchain address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    /// Workchain ID (-1 for masterchain, 0 for basechain)
    pub workchain: i8,
    /// 32-byte hash part of the address
    pub hash_part: [u8; 32],
}

impl Address {
    /// Number of bits `addr_std$10` occupies without anycast
    pub const BITS: usize = 2 + 1 + 8 + 256;

    /// Creates a new address from workchain and hash part
    pub fn new(workchain: i8, hash_part: [u8; 32]) -> Self {
        Self {
            workchain,
            hash_part,
        }
    }

    /// Raw form, `workchain:hex`
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash_part))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw())
    }
}

impl FromStr for Address {
    type Err = CellError;

    /// Parses the raw `workchain:hex` form
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CellError::InvalidCell(format!("invalid raw address {s:?}"));

        let (workchain, hash) = s.split_once(':').ok_or_else(invalid)?;
        let workchain = workchain.parse::<i8>().map_err(|_| invalid())?;

        let mut hash_part = [0u8; 32];
        hex::decode_to_slice(hash, &mut hash_part).map_err(|_| invalid())?;

        Ok(Self::new(workchain, hash_part))
    }
}

/// External address (`addr_extern$01 len:(## 9) external_address:(bits len)`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalAddress {
    /// Address bits, left aligned
    data: Vec<u8>,
    bit_len: usize,
}

impl ExternalAddress {
    /// Longest bit string a 9-bit length prefix can describe
    pub const MAX_BITS: usize = 511;

    pub fn new(data: Vec<u8>, bit_len: usize) -> Result<Self> {
        if bit_len > Self::MAX_BITS {
            return Err(CellError::ValueTooLarge {
                required: bit_len,
                width: Self::MAX_BITS,
            });
        }
        if data.len() * 8 < bit_len {
            return Err(CellError::ShortSlice {
                len: data.len(),
                bits: bit_len,
            });
        }

        let mut data = data;
        data.truncate(bit_len.div_ceil(8));
        if bit_len % 8 != 0 {
            data[bit_len / 8] &= 0xFF << (8 - bit_len % 8);
        }
        Ok(Self { data, bit_len })
    }

    /// Whole-byte external address
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes.to_vec(), bytes.len() * 8)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }
}

impl fmt::Display for ExternalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EXT:{}:{}", self.bit_len, hex::encode(&self.data))
    }
}
