//! # Bridge Frame Checksum
//!
//! CRC-8/DVB-S2 protecting every frame exchanged with the radio bridge.
//!
//! **Polynomial**: 0xD5, **Init**: 0x00, no reflection, no final XOR.

const POLY: u8 = 0xD5;

/// Byte-wise lookup table, built at compile time
const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = index as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

/// CRC over `data`
///
/// # Examples
///
/// ```
/// use rc_link::serial::crc::crc8;
///
/// assert_eq!(crc8(b"123456789"), 0xBC);
/// ```
#[must_use]
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &byte| TABLE[usize::from(crc ^ byte)])
}
