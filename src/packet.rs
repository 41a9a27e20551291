//! Packet model, checksums, serialization and the receive-side packet parser.
//!
//! A serialized packet is laid out as:
//!
//! ```text
//! marker(1-2) | type(1) | src(2) | dest(2) | seq(2) | payload_len(2)
//!             | hop_count(1) | max_hops(1) | header_crc(2) | payload(n) | payload_crc(2)
//! ```
//!
//! All multi-byte fields are big-endian. `header_crc` is the additive sum of
//! the eleven header bytes in front of it; `payload_crc` is the additive sum of
//! the payload bytes. The marker is the configured [`Preamble`].
//!
//! [`PacketDecoder`] is the last receive stage: it searches its byte stream for
//! the marker, validates the header checksum and collects the payload.

use core::fmt;

use crate::consts::{
    BYTE_BUFFER_SIZE, HEADER_SIZE, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, PACKET_QUEUE_SIZE,
    PAYLOAD_CRC_SIZE,
};
use crate::crc::{checksum, hi8, lo8};
use crate::error::{Error, Result};
use crate::preamble::Preamble;
use crate::ring::RingBuffer;
use crate::stage::Stage;

/// Number of header bytes covered by the header checksum.
const CHECKED_HEADER_SIZE: usize = HEADER_SIZE - 2;

/// One protocol packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Packet {
    /// Application defined packet type.
    pub packet_type: u8,
    /// Sender address.
    pub src_addr: u16,
    /// Receiver address, [`BROADCAST_ADDRESS`](crate::consts::BROADCAST_ADDRESS) for everyone.
    pub dest_addr: u16,
    /// Sequence number chosen by the sender.
    pub seq_num: u16,
    /// Number of valid bytes in `payload`.
    pub payload_length: u16,
    /// Hops travelled so far.
    pub hop_count: u8,
    /// Hop limit.
    pub max_hops: u8,
    /// Additive checksum of the header fields.
    pub header_crc: u16,
    /// Payload storage; only the first `payload_length` bytes are meaningful.
    pub payload: [u8; MAX_PAYLOAD_SIZE],
    /// Additive checksum of the payload.
    pub payload_crc: u16,
}

impl Packet {
    /// Size of a packet with an empty payload, marker excluded.
    pub const MIN_SIZE: usize = HEADER_SIZE + PAYLOAD_CRC_SIZE;

    /// Builds a packet ready for transmission.
    ///
    /// `hop_count` starts at zero, the payload is truncated to
    /// [`MAX_PAYLOAD_SIZE`] bytes and both checksums are filled in.
    pub fn new(
        packet_type: u8,
        src_addr: u16,
        dest_addr: u16,
        seq_num: u16,
        max_hops: u8,
        payload: &[u8],
    ) -> Self {
        let len = payload.len().min(MAX_PAYLOAD_SIZE);
        let mut packet = Self {
            packet_type,
            src_addr,
            dest_addr,
            seq_num,
            payload_length: len as u16,
            hop_count: 0,
            max_hops,
            ..Self::default()
        };
        packet.payload[..len].copy_from_slice(&payload[..len]);
        packet.header_crc = packet.header_checksum();
        packet.payload_crc = packet.payload_checksum();
        packet
    }

    /// The valid part of the payload.
    pub fn payload(&self) -> &[u8] {
        let len = usize::from(self.payload_length).min(MAX_PAYLOAD_SIZE);
        &self.payload[..len]
    }

    /// Additive checksum of the header fields, excluding both checksum fields.
    pub fn header_checksum(&self) -> u16 {
        checksum(&self.header_bytes()[..CHECKED_HEADER_SIZE])
    }

    /// Additive checksum of [`payload`](Self::payload).
    pub fn payload_checksum(&self) -> u16 {
        checksum(self.payload())
    }

    /// `true` when both stored checksums match the contents.
    pub fn is_valid(&self) -> bool {
        self.header_crc == self.header_checksum() && self.payload_crc == self.payload_checksum()
    }

    /// Serialized size behind a marker of `preamble`.
    pub fn wire_size(&self, preamble: &Preamble) -> usize {
        preamble.len() + Self::MIN_SIZE + self.payload().len()
    }

    /// The 13 header bytes, with `header_crc` as stored.
    pub fn header_bytes(&self) -> [u8; HEADER_SIZE] {
        [
            self.packet_type,
            hi8(self.src_addr),
            lo8(self.src_addr),
            hi8(self.dest_addr),
            lo8(self.dest_addr),
            hi8(self.seq_num),
            lo8(self.seq_num),
            hi8(self.payload_length),
            lo8(self.payload_length),
            self.hop_count,
            self.max_hops,
            hi8(self.header_crc),
            lo8(self.header_crc),
        ]
    }

    /// Serializes the packet behind `preamble` into `out`.
    ///
    /// # Returns
    /// The number of bytes written, [`wire_size`](Self::wire_size).
    ///
    /// # Errors
    /// - [`Error::InvalidParameters`] if `payload_length` exceeds [`MAX_PAYLOAD_SIZE`]
    /// - [`Error::BufferTooSmall`] if `out` cannot hold the packet
    pub fn write_to(&self, preamble: &Preamble, out: &mut [u8]) -> Result<usize> {
        if usize::from(self.payload_length) > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidParameters);
        }
        let size = self.wire_size(preamble);
        let out = out.get_mut(..size).ok_or(Error::BufferTooSmall)?;
        let payload = self.payload();

        let (marker, rest) = out.split_at_mut(preamble.len());
        for (slot, byte) in marker.iter_mut().zip(preamble.bytes()) {
            *slot = byte;
        }
        let (header, rest) = rest.split_at_mut(HEADER_SIZE);
        header.copy_from_slice(&self.header_bytes());
        let (body, crc) = rest.split_at_mut(payload.len());
        body.copy_from_slice(payload);
        crc.copy_from_slice(&self.payload_crc.to_be_bytes());
        Ok(size)
    }

    /// Serializes the packet behind `preamble` into a bounded vector.
    ///
    /// # Errors
    /// See [`write_to`](Self::write_to).
    pub fn to_bytes(&self, preamble: &Preamble) -> Result<heapless::Vec<u8, MAX_PACKET_SIZE>> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let n = self.write_to(preamble, &mut buf)?;
        heapless::Vec::from_slice(&buf[..n]).map_err(|_| Error::BufferOverflow)
    }

    /// Parses and checks a header.
    ///
    /// The returned packet has an empty payload storage and `payload_crc` of zero.
    ///
    /// # Errors
    /// - [`Error::ChecksumMismatch`] if `header_crc` does not match
    /// - [`Error::BufferOverflow`] if the declared payload exceeds [`MAX_PAYLOAD_SIZE`]
    pub fn parse_header(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let be = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
        let packet = Self {
            packet_type: bytes[0],
            src_addr: be(1),
            dest_addr: be(3),
            seq_num: be(5),
            payload_length: be(7),
            hop_count: bytes[9],
            max_hops: bytes[10],
            header_crc: be(11),
            ..Self::default()
        };
        if checksum(&bytes[..CHECKED_HEADER_SIZE]) != packet.header_crc {
            return Err(Error::ChecksumMismatch);
        }
        if usize::from(packet.payload_length) > MAX_PAYLOAD_SIZE {
            return Err(Error::BufferOverflow);
        }
        Ok(packet)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={} src={:#06x} dest={:#06x} seq={} len={} hops={}/{} hcrc={:#06x} pcrc={:#06x} payload=[",
            self.packet_type,
            self.src_addr,
            self.dest_addr,
            self.seq_num,
            self.payload_length,
            self.hop_count,
            self.max_hops,
            self.header_crc,
            self.payload_crc
        )?;
        for (i, byte) in self.payload().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        f.write_str("]")
    }
}

/// Builds a packet for transmission; see [`Packet::new`].
pub fn build_packet(
    packet_type: u8,
    src_addr: u16,
    dest_addr: u16,
    seq_num: u16,
    max_hops: u8,
    payload: &[u8],
) -> Packet {
    Packet::new(packet_type, src_addr, dest_addr, seq_num, max_hops, payload)
}

/// Parsing state of the [`PacketDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PacketState {
    /// Looking for the marker.
    #[default]
    SearchingPreamble,
    /// Collecting the fixed header.
    ReadingHeader,
    /// Collecting payload and payload checksum.
    ReadingPayload,
}

/// Byte-to-packet stage of the receive pipeline.
///
/// Packets whose header checksum fails are dropped. Packets whose payload
/// checksum fails are still emitted; the consumer decides what to trust
/// ([`Packet::is_valid`]).
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    preamble: Preamble,
    state: PacketState,
    matched: usize,
    header: [u8; HEADER_SIZE],
    index: usize,
    packet: Packet,
    crc: [u8; PAYLOAD_CRC_SIZE],
    input: RingBuffer<u8, BYTE_BUFFER_SIZE>,
    output: RingBuffer<Packet, PACKET_QUEUE_SIZE>,
    packets: u32,
    header_errors: u32,
    payload_errors: u32,
}

impl PacketDecoder {
    /// Creates a parser searching for `preamble`.
    pub fn new(preamble: Preamble) -> Self {
        Self {
            preamble,
            state: PacketState::SearchingPreamble,
            matched: 0,
            header: [0; HEADER_SIZE],
            index: 0,
            packet: Packet::default(),
            crc: [0; PAYLOAD_CRC_SIZE],
            input: RingBuffer::new(),
            output: RingBuffer::new(),
            packets: 0,
            header_errors: 0,
            payload_errors: 0,
        }
    }

    /// Current parsing state.
    pub fn state(&self) -> PacketState {
        self.state
    }

    /// Number of packets emitted.
    pub fn packets(&self) -> u32 {
        self.packets
    }

    /// Number of headers rejected.
    pub fn header_errors(&self) -> u32 {
        self.header_errors
    }

    /// Number of emitted packets whose payload checksum did not match.
    pub fn payload_errors(&self) -> u32 {
        self.payload_errors
    }

    /// `true` when at least one packet waits in the output queue.
    pub fn has_packet(&self) -> bool {
        !self.output.is_empty()
    }

    /// Appends `packet` to the output queue as if it had been received.
    pub fn inject(&mut self, packet: Packet) {
        self.emit(packet);
    }

    /// Feeds one byte straight into the parser, bypassing the input queue.
    ///
    /// # Returns
    /// The completed packet, which is also queued for [`take`](Stage::take).
    ///
    /// # Errors
    /// [`Error::ChecksumMismatch`] or [`Error::BufferOverflow`] when a header
    /// is rejected; the parser is back to searching for the marker.
    pub fn process_byte(&mut self, byte: u8) -> Result<Option<Packet>> {
        match self.state {
            PacketState::SearchingPreamble => {
                self.search(byte);
                Ok(None)
            }
            PacketState::ReadingHeader => {
                self.header[self.index] = byte;
                self.index += 1;
                if self.index < HEADER_SIZE {
                    return Ok(None);
                }
                match Packet::parse_header(&self.header) {
                    Ok(packet) => {
                        debug!("packet header ok, {} payload bytes", packet.payload_length);
                        self.packet = packet;
                        self.index = 0;
                        self.state = PacketState::ReadingPayload;
                        Ok(None)
                    }
                    Err(e) => {
                        self.header_errors = self.header_errors.wrapping_add(1);
                        warn!("packet header rejected: {}", e);
                        self.clear();
                        Err(e)
                    }
                }
            }
            PacketState::ReadingPayload => {
                let len = usize::from(self.packet.payload_length);
                if self.index < len {
                    self.packet.payload[self.index] = byte;
                } else {
                    self.crc[self.index - len] = byte;
                }
                self.index += 1;
                if self.index < len + PAYLOAD_CRC_SIZE {
                    return Ok(None);
                }
                let mut packet = self.packet;
                packet.payload_crc = u16::from_be_bytes(self.crc);
                if packet.payload_crc != packet.payload_checksum() {
                    self.payload_errors = self.payload_errors.wrapping_add(1);
                    warn!(
                        "payload checksum mismatch from {}: {} != {}",
                        packet.src_addr,
                        packet.payload_crc,
                        packet.payload_checksum()
                    );
                }
                self.clear();
                self.emit(packet);
                Ok(Some(packet))
            }
        }
    }

    fn search(&mut self, byte: u8) {
        let marker = self.preamble.pattern().to_be_bytes();
        let marker = &marker[2 - self.preamble.len()..];
        if byte == marker[self.matched] {
            self.matched += 1;
        } else {
            self.matched = usize::from(byte == marker[0]);
        }
        if self.matched == marker.len() {
            self.header = [0; HEADER_SIZE];
            self.index = 0;
            self.matched = 0;
            self.state = PacketState::ReadingHeader;
        }
    }

    fn emit(&mut self, packet: Packet) {
        if self.output.is_full() {
            warn!("packet queue full, dropping oldest packet");
        }
        self.packets = self.packets.wrapping_add(1);
        info!("packet {}", packet);
        self.output.push(packet);
    }

    fn clear(&mut self) {
        self.state = PacketState::SearchingPreamble;
        self.matched = 0;
        self.index = 0;
        self.header = [0; HEADER_SIZE];
        self.packet = Packet::default();
        self.crc = [0; PAYLOAD_CRC_SIZE];
    }
}

impl Stage for PacketDecoder {
    type Input = u8;
    type Output = Packet;

    fn accept(&mut self, item: u8) {
        self.input.push(item);
    }

    fn is_ready(&self) -> bool {
        !self.input.is_full()
    }

    fn task(&mut self) {
        while let Ok(byte) = self.input.pop() {
            let _ = self.process_byte(byte);
        }
    }

    fn take(&mut self) -> Option<Packet> {
        self.output.pop().ok()
    }

    /// Completed packets are the pipeline's result, so only pending input counts.
    fn is_idle(&self) -> bool {
        self.input.is_empty()
    }

    fn reset(&mut self) {
        self.clear();
        self.input.reset();
        self.output.reset();
        self.packets = 0;
        self.header_errors = 0;
        self.payload_errors = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello() -> Packet {
        Packet::new(0, 0x1234, 0x1234, 1, 10, b"Hello")
    }

    fn feed(decoder: &mut PacketDecoder, bytes: &[u8]) -> Vec<Packet> {
        bytes
            .iter()
            .filter_map(|&b| decoder.process_byte(b).ok().flatten())
            .collect()
    }

    #[test]
    fn test_build_fills_checksums() {
        let packet = hello();
        assert_eq!(packet.hop_count, 0);
        assert_eq!(packet.payload(), b"Hello");
        assert_eq!(packet.payload_crc, b"Hello".iter().map(|&b| u16::from(b)).sum::<u16>());
        let header_sum = 0x12 + 0x34 + 0x12 + 0x34 + 0x01 + 0x05 + 10;
        assert_eq!(packet.header_crc, header_sum);
        assert!(packet.is_valid());
    }

    #[test]
    fn test_build_clamps_payload() {
        let packet = build_packet(1, 2, 3, 4, 5, &[0x55; 40]);
        assert_eq!(usize::from(packet.payload_length), MAX_PAYLOAD_SIZE);
        assert_eq!(packet.payload(), &[0x55; MAX_PAYLOAD_SIZE]);
        assert!(packet.is_valid());
    }

    #[test]
    fn test_serialize_layout() {
        let preamble = Preamble::default();
        let bytes = hello().to_bytes(&preamble).unwrap();
        assert_eq!(bytes.len(), hello().wire_size(&preamble));
        assert_eq!(bytes.len(), 2 + Packet::MIN_SIZE + 5);
        assert_eq!(&bytes[..2], &[0xAB, 0xBA]);
        assert_eq!(&bytes[2..11], &[0x00, 0x12, 0x34, 0x12, 0x34, 0x00, 0x01, 0x00, 0x05]);
        assert_eq!(&bytes[15..20], b"Hello");

        let full = Packet::new(0, 1, 2, 3, 4, &[0xEE; MAX_PAYLOAD_SIZE]);
        assert_eq!(full.to_bytes(&preamble).unwrap().len(), MAX_PACKET_SIZE);

        let mut small = [0u8; 10];
        assert_eq!(hello().write_to(&preamble, &mut small), Err(Error::BufferTooSmall));

        let mut bogus = hello();
        bogus.payload_length = 99;
        assert_eq!(bogus.to_bytes(&preamble), Err(Error::InvalidParameters));
    }

    #[test]
    fn test_parse_header_checks() {
        let packet = hello();
        let header = packet.header_bytes();
        let parsed = Packet::parse_header(&header).unwrap();
        assert_eq!(parsed.dest_addr, 0x1234);
        assert_eq!(parsed.payload_length, 5);

        let mut oversized = Packet::new(0, 1, 2, 3, 4, &[]);
        oversized.payload_length = 16;
        oversized.header_crc = oversized.header_checksum();
        assert_eq!(
            Packet::parse_header(&oversized.header_bytes()),
            Err(Error::BufferOverflow)
        );
    }

    #[test]
    fn test_decoder_round_trip() {
        let mut decoder = PacketDecoder::new(Preamble::default());
        let mut stream = vec![0x00, 0x13, 0xAB];
        stream.extend(hello().to_bytes(&Preamble::default()).unwrap());
        let packets = feed(&mut decoder, &stream);
        assert_eq!(packets, vec![hello()]);
        assert_eq!(decoder.state(), PacketState::SearchingPreamble);
        assert!(decoder.has_packet());
        assert_eq!(decoder.take(), Some(hello()));
    }

    #[test]
    fn test_header_crc_gate() {
        let clean = hello().to_bytes(&Preamble::default()).unwrap();
        for i in 2..2 + HEADER_SIZE {
            let mut corrupted = clean.clone();
            corrupted[i] ^= 0x01;
            let mut decoder = PacketDecoder::new(Preamble::default());
            let mut rejected = false;
            for &b in &corrupted[..2 + HEADER_SIZE] {
                match decoder.process_byte(b) {
                    Err(Error::ChecksumMismatch) => rejected = true,
                    Err(e) => panic!("unexpected error {e:?} at byte {i}"),
                    Ok(p) => assert!(p.is_none()),
                }
            }
            assert!(rejected, "corrupted byte {i} passed the header check");
            assert_eq!(decoder.state(), PacketState::SearchingPreamble);
            assert_eq!(decoder.header_errors(), 1);
            assert!(!decoder.has_packet());
        }
    }

    #[test]
    fn test_payload_mismatch_still_emitted() {
        let mut bytes = hello().to_bytes(&Preamble::default()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut decoder = PacketDecoder::new(Preamble::default());
        let packets = feed(&mut decoder, &bytes);
        assert_eq!(packets.len(), 1);
        assert!(!packets[0].is_valid());
        assert_eq!(decoder.payload_errors(), 1);
    }

    #[test]
    fn test_queue_drops_oldest() {
        let mut decoder = PacketDecoder::new(Preamble::default());
        for seq in 0..(PACKET_QUEUE_SIZE as u16 + 1) {
            decoder.inject(Packet::new(0, 1, 2, seq, 4, &[]));
        }
        assert_eq!(decoder.take().map(|p| p.seq_num), Some(1));
    }

    #[test]
    fn test_display() {
        let text = format!("{}", hello());
        assert!(text.contains("src=0x1234"));
        assert!(text.ends_with("payload=[48 65 6c 6c 6f]"));
    }
}
