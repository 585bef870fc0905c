//! Tests for CRC module

use super::*;

#[test]
fn test_crc32c_check_value() {
    // Standard check input for CRC catalogue entries
    assert_eq!(CRC32C.checksum(b"123456789"), 0xE306_9283);
}

#[test]
fn test_crc32c_empty_data() {
    assert_eq!(CRC32C.checksum(b""), 0);
}

#[test]
fn test_crc32c_deterministic() {
    let data = b"test data";
    assert_eq!(CRC32C.checksum(data), CRC32C.checksum(data));
}

#[test]
fn test_crc32c_different_data() {
    assert_ne!(CRC32C.checksum(b"data1"), CRC32C.checksum(b"data2"));
}

#[test]
fn test_crc32c_incremental_matches_oneshot() {
    let data = b"incremental checksum over a bag of cells";
    let mut digest = CRC32C.digest();
    digest.update(&data[..10]);
    digest.update(&data[10..]);
    assert_eq!(digest.finalize(), CRC32C.checksum(data));
}

#[test]
fn test_crc32c_le_layout() {
    let crc = CRC32C.checksum(b"123456789");
    assert_eq!(crc32c_le(b"123456789"), [0x83, 0x92, 0x06, 0xE3]);
    assert_eq!(u32::from_le_bytes(crc32c_le(b"123456789")), crc);
}

#[test]
fn test_crc32c_single_bit_flip() {
    let mut data = vec![0x5Au8; 64];
    let before = CRC32C.checksum(&data);
    data[17] ^= 0x01;
    assert_ne!(before, CRC32C.checksum(&data));
}
