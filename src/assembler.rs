//! Bit-level preamble search and byte assembly.
//!
//! [`ByteAssembler`] is the second receive stage. Every incoming bit is shifted
//! into a register as wide as the configured [`Preamble`]; a match locks the
//! byte boundary to the end of the marker, no matter how many bits had been
//! collected before. The marker bytes are forwarded downstream so the frame
//! layer sees the same byte stream the transmitter queued.
//!
//! Before the first lock the assembler is in
//! [`AssemblerState::SearchingPreamble`] and forwards nothing; line noise never
//! reaches the frame layer.
//!
//! [`BitPacker`] is the transmit mirror: it splits bytes into bits in the same
//! [`BitOrder`].

use crate::consts::{BIT_BUFFER_SIZE, BYTE_BUFFER_SIZE};
use crate::preamble::{Preamble, PreambleWidth};
use crate::ring::RingBuffer;
use crate::stage::{ByteSource, Stage};

/// Order in which the bits of a byte are transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum BitOrder {
    /// Most significant bit first.
    #[default]
    MsbFirst,
    /// Least significant bit first.
    LsbFirst,
}

/// Synchronization state of the [`ByteAssembler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum AssemblerState {
    /// No preamble seen yet; bits are only shifted through the register.
    #[default]
    SearchingPreamble,
    /// Byte boundary locked; every eighth bit completes a byte.
    Assembling,
}

/// Bit-to-byte stage of the receive pipeline.
///
/// # Example
///
/// ```rust
/// use peregrine::assembler::{BitOrder, ByteAssembler};
/// use peregrine::preamble::Preamble;
///
/// let mut assembler = ByteAssembler::new(Preamble::default(), BitOrder::MsbFirst);
/// for byte in [0x00u8, 0xAB, 0xBA, 0x42] {
///     for i in (0..8).rev() {
///         assembler.process_bit(byte >> i & 1 == 1);
///     }
/// }
/// assert_eq!(assembler.pop_byte(), Some(0xAB));
/// assert_eq!(assembler.pop_byte(), Some(0xBA));
/// assert_eq!(assembler.pop_byte(), Some(0x42));
/// ```
#[derive(Debug, Clone)]
pub struct ByteAssembler {
    order: BitOrder,
    preamble: Preamble,
    state: AssemblerState,
    shift_register: u16,
    current: u8,
    bits_collected: u8,
    locks: u32,
    bits: RingBuffer<bool, BIT_BUFFER_SIZE>,
    bytes: RingBuffer<u8, BYTE_BUFFER_SIZE>,
}

impl ByteAssembler {
    /// Creates an assembler searching for `preamble`, bits arriving in `order`.
    pub fn new(preamble: Preamble, order: BitOrder) -> Self {
        Self {
            order,
            preamble,
            state: AssemblerState::SearchingPreamble,
            shift_register: 0,
            current: 0,
            bits_collected: 0,
            locks: 0,
            bits: RingBuffer::new(),
            bytes: RingBuffer::new(),
        }
    }

    /// Current synchronization state.
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Configured bit order.
    pub fn bit_order(&self) -> BitOrder {
        self.order
    }

    /// Number of preamble locks since construction or the last reset.
    pub fn locks(&self) -> u32 {
        self.locks
    }

    /// Takes the oldest assembled byte.
    pub fn pop_byte(&mut self) -> Option<u8> {
        self.bytes.pop().ok()
    }

    /// Feeds one bit straight into the assembler, bypassing the input queue.
    ///
    /// Assembled bytes land in the output queue, which drops its oldest byte
    /// when full.
    pub fn process_bit(&mut self, bit: bool) {
        let width = self.preamble.width();
        let incoming = u16::from(bit);
        self.shift_register = match self.order {
            BitOrder::MsbFirst => (self.shift_register << 1) | incoming,
            BitOrder::LsbFirst => (self.shift_register >> 1) | (incoming << (width.bits() - 1)),
        } & width.mask();

        if self.register_matches() {
            let on_boundary = self.state == AssemblerState::Assembling && self.bits_collected == 7;
            if !on_boundary {
                self.lock();
                return;
            }
        }

        if self.state == AssemblerState::SearchingPreamble {
            return;
        }

        let incoming = u8::from(bit);
        match self.order {
            BitOrder::MsbFirst => self.current |= incoming << (7 - self.bits_collected),
            BitOrder::LsbFirst => self.current |= incoming << self.bits_collected,
        }
        self.bits_collected += 1;
        if self.bits_collected == 8 {
            trace!("assembled byte {}", self.current);
            self.bytes.push(self.current);
            self.current = 0;
            self.bits_collected = 0;
        }
    }

    fn register_matches(&self) -> bool {
        let expected = match (self.order, self.preamble.width()) {
            (BitOrder::LsbFirst, PreambleWidth::Bits16) => self.preamble.pattern().swap_bytes(),
            _ => self.preamble.pattern(),
        };
        self.shift_register == expected
    }

    fn lock(&mut self) {
        if self.state == AssemblerState::Assembling && self.bits_collected != 0 {
            debug!("preamble resync dropped {} bits", self.bits_collected);
        }
        self.state = AssemblerState::Assembling;
        self.locks = self.locks.wrapping_add(1);
        info!("preamble lock {}", self.preamble.pattern());
        for byte in self.preamble.bytes() {
            self.bytes.push(byte);
        }
        self.current = 0;
        self.bits_collected = 0;
    }
}

impl Stage for ByteAssembler {
    type Input = bool;
    type Output = u8;

    fn accept(&mut self, item: bool) {
        self.bits.push(item);
    }

    fn is_ready(&self) -> bool {
        !self.bits.is_full()
    }

    /// Drains queued bits while the output queue can take a whole preamble.
    fn task(&mut self) {
        while self.bytes.free() >= 2 {
            match self.bits.pop() {
                Ok(bit) => self.process_bit(bit),
                Err(_) => break,
            }
        }
    }

    fn take(&mut self) -> Option<u8> {
        self.pop_byte()
    }

    fn is_idle(&self) -> bool {
        self.bits.is_empty() && self.bytes.is_empty()
    }

    fn reset(&mut self) {
        self.state = AssemblerState::SearchingPreamble;
        self.shift_register = 0;
        self.current = 0;
        self.bits_collected = 0;
        self.locks = 0;
        self.bits.reset();
        self.bytes.reset();
    }
}

impl ByteSource for ByteAssembler {}

/// Splits bytes into bits for transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct BitPacker {
    order: BitOrder,
    current: u8,
    remaining: u8,
}

impl BitPacker {
    /// Creates an empty packer emitting bits in `order`.
    pub const fn new(order: BitOrder) -> Self {
        Self {
            order,
            current: 0,
            remaining: 0,
        }
    }

    /// Loads the next byte, replacing any bits left of the previous one.
    pub fn load(&mut self, byte: u8) {
        self.current = byte;
        self.remaining = 8;
    }

    /// Returns the next bit of the loaded byte, or `None` once it is exhausted.
    pub fn next_bit(&mut self) -> Option<bool> {
        if self.remaining == 0 {
            return None;
        }
        let index = 8 - self.remaining;
        let bit = match self.order {
            BitOrder::MsbFirst => self.current & (0x80 >> index) != 0,
            BitOrder::LsbFirst => self.current & (0x01 << index) != 0,
        };
        self.remaining -= 1;
        Some(bit)
    }

    /// `true` when every bit of the loaded byte has been emitted.
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Discards the loaded byte.
    pub fn clear(&mut self) {
        self.remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_of(bytes: &[u8], order: BitOrder) -> Vec<bool> {
        let mut packer = BitPacker::new(order);
        let mut out = Vec::new();
        for &byte in bytes {
            packer.load(byte);
            while let Some(bit) = packer.next_bit() {
                out.push(bit);
            }
        }
        out
    }

    fn run(assembler: &mut ByteAssembler, bits: &[bool]) -> Vec<u8> {
        let mut out = Vec::new();
        for &bit in bits {
            assert!(assembler.is_ready());
            assembler.accept(bit);
            assembler.task();
            while let Some(byte) = assembler.take() {
                out.push(byte);
            }
        }
        out
    }

    const DATA: [u8; 6] = [0x01, 0x02, 0x03, 0x00, 0xFF, 0x5A];

    #[test]
    fn test_bit_packer_orders() {
        assert_eq!(
            bits_of(&[0b1000_0010], BitOrder::MsbFirst),
            vec![true, false, false, false, false, false, true, false]
        );
        assert_eq!(
            bits_of(&[0b1000_0010], BitOrder::LsbFirst),
            vec![false, true, false, false, false, false, false, true]
        );
        let mut packer = BitPacker::new(BitOrder::MsbFirst);
        assert!(packer.is_empty());
        packer.load(0xFF);
        let _ = packer.next_bit();
        packer.clear();
        assert_eq!(packer.next_bit(), None);
    }

    #[test]
    fn test_noise_before_lock_is_suppressed() {
        let mut assembler = ByteAssembler::new(Preamble::default(), BitOrder::MsbFirst);
        let out = run(&mut assembler, &bits_of(&[0x13, 0x37, 0x42], BitOrder::MsbFirst));
        assert!(out.is_empty());
        assert_eq!(assembler.state(), AssemblerState::SearchingPreamble);
    }

    #[test]
    fn test_resync_for_every_bit_offset() {
        for order in [BitOrder::MsbFirst, BitOrder::LsbFirst] {
            for offset in 0..8 {
                let mut assembler = ByteAssembler::new(Preamble::default(), order);
                let mut bits = vec![false; offset];
                bits.extend(bits_of(&[0xAB, 0xBA], order));
                bits.extend(bits_of(&DATA, order));

                let out = run(&mut assembler, &bits);
                assert_eq!(&out[..2], &[0xAB, 0xBA], "offset {offset}, {order:?}");
                assert_eq!(&out[2..], &DATA, "offset {offset}, {order:?}");
                assert_eq!(assembler.locks(), 1);
            }
        }
    }

    #[test]
    fn test_relock_mid_stream_resets_boundary() {
        let mut assembler = ByteAssembler::new(Preamble::default(), BitOrder::MsbFirst);
        let mut bits = bits_of(&[0xAB, 0xBA, 0x11], BitOrder::MsbFirst);
        // Three stray bits shift the phase of the second transmission.
        bits.extend([true, false, true]);
        bits.extend(bits_of(&[0xAB, 0xBA, 0x22], BitOrder::MsbFirst));

        let out = run(&mut assembler, &bits);
        assert_eq!(out.first(), Some(&0xAB));
        assert_eq!(&out[out.len() - 3..], &[0xAB, 0xBA, 0x22]);
        assert_eq!(assembler.locks(), 2);
    }

    #[test]
    fn test_aligned_marker_in_data_is_not_duplicated() {
        let mut assembler = ByteAssembler::new(Preamble::default(), BitOrder::MsbFirst);
        let bits = bits_of(&[0xAB, 0xBA, 0x10, 0xAB, 0xBA, 0x20], BitOrder::MsbFirst);
        let out = run(&mut assembler, &bits);
        assert_eq!(out, vec![0xAB, 0xBA, 0x10, 0xAB, 0xBA, 0x20]);
        assert_eq!(assembler.locks(), 1);
    }

    #[test]
    fn test_single_byte_preamble() {
        let preamble = Preamble::new(0x7E, PreambleWidth::Bits8);
        for order in [BitOrder::MsbFirst, BitOrder::LsbFirst] {
            let mut assembler = ByteAssembler::new(preamble, order);
            let mut bits = vec![false; 3];
            bits.extend(bits_of(&[0x7E, 0x01, 0x80], order));
            assert_eq!(run(&mut assembler, &bits), vec![0x7E, 0x01, 0x80]);
        }
    }

    #[test]
    fn test_task_respects_output_room() {
        let mut assembler = ByteAssembler::new(Preamble::default(), BitOrder::MsbFirst);
        let mut bits = bits_of(&[0xAB, 0xBA], BitOrder::MsbFirst);
        bits.extend(bits_of(&[0x01; 80], BitOrder::MsbFirst));
        let mut fed = 0;
        while fed < bits.len() && assembler.is_ready() {
            assembler.accept(bits[fed]);
            fed += 1;
            assembler.task();
        }
        assert!(!assembler.is_ready());
        assert_eq!(fed, BYTE_BUFFER_SIZE * 8 - 8 + BIT_BUFFER_SIZE);

        let mut out = Vec::new();
        while !assembler.is_idle() {
            while let Some(byte) = assembler.take() {
                out.push(byte);
            }
            while fed < bits.len() && assembler.is_ready() {
                assembler.accept(bits[fed]);
                fed += 1;
            }
            assembler.task();
        }
        assert_eq!(out.len(), 82);
        assert!(out[2..].iter().all(|&b| b == 0x01));
    }

    #[test]
    fn test_reset_returns_to_search() {
        let mut assembler = ByteAssembler::new(Preamble::default(), BitOrder::MsbFirst);
        let _ = run(&mut assembler, &bits_of(&[0xAB, 0xBA, 0x01], BitOrder::MsbFirst));
        assembler.reset();
        assert_eq!(assembler.state(), AssemblerState::SearchingPreamble);
        assert!(assembler.is_idle());
        assert!(run(&mut assembler, &bits_of(&[0x01, 0x02], BitOrder::MsbFirst)).is_empty());
    }
}
