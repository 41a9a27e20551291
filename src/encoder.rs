//! Transmit path: packet to bit stream.
//!
//! [`Encoder::write_packet`] serializes a [`Packet`], stuffs it with COBS and
//! queues the bytes that go on the air:
//!
//! ```text
//! marker | 0x00 | cobs(marker | header | payload | payload_crc) | 0x00
//! ```
//!
//! The leading marker gives the receiver's byte assembler its bit lock. The
//! zero after it terminates the marker bytes the assembler forwards, so the
//! frame decoder starts the real frame on a block boundary.
//!
//! Bits are pulled one at a time with [`Encoder::read_bit`], typically from a
//! timer tick that keys the modulator.

use crate::assembler::{BitOrder, BitPacker};
use crate::cobs::{encode, max_encoded_len};
use crate::consts::{MAX_PACKET_SIZE, TX_BUFFER_SIZE};
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::preamble::Preamble;
use crate::ring::RingBuffer;

/// Queues framed packets and hands them out bit by bit.
#[derive(Debug, Clone)]
pub struct Encoder {
    preamble: Preamble,
    packer: BitPacker,
    tx: RingBuffer<u8, TX_BUFFER_SIZE>,
    initialized: bool,
    frames: u32,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(Preamble::default(), BitOrder::default())
    }
}

impl Encoder {
    /// Creates an initialized encoder.
    pub fn new(preamble: Preamble, order: BitOrder) -> Self {
        Self {
            preamble,
            packer: BitPacker::new(order),
            tx: RingBuffer::new(),
            initialized: true,
            frames: 0,
        }
    }

    /// Clears the transmit queue and enables the encoder.
    pub fn init(&mut self) {
        self.reset();
        self.initialized = true;
    }

    /// Clears the transmit queue and disables the encoder.
    pub fn deinit(&mut self) {
        self.reset();
        self.initialized = false;
    }

    /// Drops every queued bit.
    pub fn reset(&mut self) {
        self.tx.reset();
        self.packer.clear();
    }

    /// Number of frames queued since construction.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Number of bytes waiting in the transmit queue.
    pub fn pending_bytes(&self) -> usize {
        self.tx.count()
    }

    /// `true` while bits remain to be sent.
    pub fn is_busy(&self) -> bool {
        !self.tx.is_empty() || !self.packer.is_empty()
    }

    /// Frames `packet` and appends it to the transmit queue.
    ///
    /// # Errors
    /// - [`Error::Uninitialized`] after [`deinit`](Self::deinit)
    /// - [`Error::InvalidParameters`] if the packet declares more than
    ///   [`MAX_PAYLOAD_SIZE`](crate::consts::MAX_PAYLOAD_SIZE) payload bytes
    /// - [`Error::BufferOverflow`] if the queue cannot take the whole frame;
    ///   nothing is queued in that case
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        if !self.initialized {
            return Err(Error::Uninitialized);
        }
        let mut raw = [0u8; MAX_PACKET_SIZE];
        let n = packet.write_to(&self.preamble, &mut raw)?;
        let mut frame = [0u8; max_encoded_len(MAX_PACKET_SIZE)];
        let m = encode(&raw[..n], &mut frame)?;

        let total = self.preamble.len() + 1 + m;
        if self.tx.free() < total {
            warn!("tx queue full: need {}, have {}", total, self.tx.free());
            return Err(Error::BufferOverflow);
        }
        for byte in self.preamble.bytes() {
            self.tx.push(byte);
        }
        self.tx.push(0x00);
        for &byte in &frame[..m] {
            self.tx.push(byte);
        }
        self.frames = self.frames.wrapping_add(1);
        debug!("queued frame of {} bytes for {}", total, packet.dest_addr);
        Ok(())
    }

    /// Returns the next bit to transmit.
    ///
    /// # Errors
    /// - `nb::Error::WouldBlock` when the queue is empty
    /// - [`Error::Uninitialized`] after [`deinit`](Self::deinit)
    pub fn read_bit(&mut self) -> nb::Result<bool, Error> {
        if !self.initialized {
            return Err(nb::Error::Other(Error::Uninitialized));
        }
        if let Some(bit) = self.packer.next_bit() {
            return Ok(bit);
        }
        let byte = self.tx.pop().map_err(|_| nb::Error::WouldBlock)?;
        self.packer.load(byte);
        self.packer.next_bit().ok_or(nb::Error::WouldBlock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cobs::decode;

    fn drain_bytes(encoder: &mut Encoder) -> Vec<u8> {
        let mut bits = Vec::new();
        while let Ok(bit) = encoder.read_bit() {
            bits.push(bit);
        }
        bits.chunks(8)
            .map(|c| c.iter().fold(0u8, |acc, &b| (acc << 1) | u8::from(b)))
            .collect()
    }

    #[test]
    fn test_frame_layout() {
        let mut encoder = Encoder::default();
        let packet = Packet::new(0, 0x1234, 0x1234, 1, 10, b"Hello");
        encoder.write_packet(&packet).unwrap();
        assert!(encoder.is_busy());

        let bytes = drain_bytes(&mut encoder);
        assert!(!encoder.is_busy());
        assert_eq!(&bytes[..3], &[0xAB, 0xBA, 0x00]);
        assert_eq!(bytes.last(), Some(&0x00));

        let mut decoded = [0u8; MAX_PACKET_SIZE];
        let n = decode(&bytes[3..], &mut decoded).unwrap();
        assert_eq!(
            &decoded[..n],
            &packet.to_bytes(&Preamble::default()).unwrap()[..]
        );
    }

    #[test]
    fn test_empty_queue_would_block() {
        let mut encoder = Encoder::default();
        assert_eq!(encoder.read_bit(), Err(nb::Error::WouldBlock));
    }

    #[test]
    fn test_overflow_queues_nothing() {
        let mut encoder = Encoder::default();
        let packet = Packet::new(0, 1, 2, 3, 4, &[0x11; 15]);
        let mut queued = 0;
        while encoder.write_packet(&packet).is_ok() {
            queued += 1;
        }
        let before = encoder.pending_bytes();
        assert_eq!(encoder.write_packet(&packet), Err(Error::BufferOverflow));
        assert_eq!(encoder.pending_bytes(), before);
        assert_eq!(encoder.frames(), queued);
    }

    #[test]
    fn test_lsb_first_order() {
        let mut encoder = Encoder::new(Preamble::default(), BitOrder::LsbFirst);
        encoder.write_packet(&Packet::new(0, 1, 2, 3, 4, &[])).unwrap();
        let first: Vec<bool> = (0..8).map(|_| encoder.read_bit().unwrap()).collect();
        // 0xAB = 1010_1011, least significant bit first.
        assert_eq!(first, vec![true, true, false, true, false, true, false, true]);
    }

    #[test]
    fn test_deinit_blocks_use() {
        let mut encoder = Encoder::default();
        encoder.write_packet(&Packet::default()).unwrap();
        encoder.deinit();
        assert!(!encoder.is_busy());
        assert_eq!(
            encoder.write_packet(&Packet::default()),
            Err(Error::Uninitialized)
        );
        assert_eq!(encoder.read_bit(), Err(nb::Error::Other(Error::Uninitialized)));
        encoder.init();
        assert!(encoder.write_packet(&Packet::default()).is_ok());
    }
}
