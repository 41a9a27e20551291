//! Additive checksums used by the packet header and payload.

pub(crate) fn checksum_update(sum: u16, data: &u8) -> u16 {
    sum.wrapping_add(*data as u16)
}

pub(crate) fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0, checksum_update)
}

pub(crate) fn hi8(x: u16) -> u8 {
    (x >> 8) as u8
}

pub(crate) fn lo8(x: u16) -> u8 {
    (x & 0xff) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1, 2, 3]), 6);
        let big = [0xffu8; 300];
        assert_eq!(checksum(&big), (300u32 * 0xff % 0x1_0000) as u16);
    }

    #[test]
    fn test_split_bytes() {
        assert_eq!(hi8(0x1234), 0x12);
        assert_eq!(lo8(0x1234), 0x34);
    }
}
