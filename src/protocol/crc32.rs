//! CRC32 (IEEE 802.3 polynomial 0xEDB88320), as used by the packet trailer.

/// Checksum of `bytes`, equal to zlib's `crc32(bytes) & 0xffffffff`
pub fn crc32_ieee(bytes: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &b in bytes {
        crc ^= u32::from(b);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}
