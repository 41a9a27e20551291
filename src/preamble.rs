//! Synchronization marker configuration.

use crate::consts::DEFAULT_PREAMBLE;

/// Width of the preamble shift register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PreambleWidth {
    /// One byte marker, the low byte of the pattern.
    Bits8,
    /// Two byte marker, sent high byte first.
    #[default]
    Bits16,
}

impl PreambleWidth {
    /// Register width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            PreambleWidth::Bits8 => 8,
            PreambleWidth::Bits16 => 16,
        }
    }

    /// Marker length in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            PreambleWidth::Bits8 => 1,
            PreambleWidth::Bits16 => 2,
        }
    }

    /// Mask selecting the register bits that take part in a comparison.
    pub const fn mask(self) -> u16 {
        match self {
            PreambleWidth::Bits8 => 0x00ff,
            PreambleWidth::Bits16 => 0xffff,
        }
    }
}

/// A 1 or 2 byte marker prefixed to every transmission.
///
/// The same marker is used twice on the wire: once in front of the COBS frame
/// for bit and byte synchronization, and once inside the frame in front of the
/// packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Preamble {
    pattern: u16,
    width: PreambleWidth,
}

impl Default for Preamble {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE, PreambleWidth::Bits16)
    }
}

impl Preamble {
    /// Creates a marker. Bits above `width` are ignored.
    pub const fn new(pattern: u16, width: PreambleWidth) -> Self {
        Self {
            pattern: pattern & width.mask(),
            width,
        }
    }

    /// The marker value, masked to its width.
    pub const fn pattern(&self) -> u16 {
        self.pattern
    }

    /// Register width.
    pub const fn width(&self) -> PreambleWidth {
        self.width
    }

    /// Marker length in bytes.
    pub const fn len(&self) -> usize {
        self.width.bytes()
    }

    /// Always `false`; a marker has at least one byte.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The marker bytes in transmission order.
    pub fn bytes(&self) -> impl Iterator<Item = u8> {
        let skip = 2 - self.width.bytes();
        self.pattern.to_be_bytes().into_iter().skip(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_marker() {
        let preamble = Preamble::default();
        assert_eq!(preamble.len(), 2);
        assert_eq!(preamble.bytes().collect::<Vec<_>>(), vec![0xAB, 0xBA]);
    }

    #[test]
    fn test_single_byte_marker_is_masked() {
        let preamble = Preamble::new(0x127E, PreambleWidth::Bits8);
        assert_eq!(preamble.pattern(), 0x7E);
        assert_eq!(preamble.bytes().collect::<Vec<_>>(), vec![0x7E]);
        assert_eq!(preamble.width().bits(), 8);
    }
}
