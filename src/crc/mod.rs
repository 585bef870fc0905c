use crc::{CRC_32_ISCSI, Crc};

/// CRC32-C (Castagnoli), the checksum trailing a bag of cells
pub const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Little-endian CRC32-C of `data`, as it is appended on the wire
pub fn crc32c_le(data: &[u8]) -> [u8; 4] {
    CRC32C.checksum(data).to_le_bytes()
}

#[cfg(test)]
mod tests;
