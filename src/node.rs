//! Application boundary of a mesh node.
//!
//! A [`Node`] owns the receive [`Decoder`], the transmit [`Encoder`] and the
//! [`TransmitSink`] that keys the modulator. The application only deals with
//! payloads:
//!
//! - [`Node::send_message`] builds and queues a packet
//! - [`Node::task`] pumps queued bits into the sink, advances the decoder and
//!   delivers accepted payloads
//! - payloads go to the registered [`MessageCallback`], or to an inbox read
//!   with [`Node::receive`] when no callback is set
//!
//! A received packet is accepted when it is addressed to this node (or to
//! [`BROADCAST_ADDRESS`], or the node is promiscuous) and its payload checksum
//! matches.
//!
//! ## Example
//!
//! ```rust
//! use peregrine::error::Error;
//! use peregrine::node::{Node, TransmitSink};
//!
//! #[derive(Debug, Default)]
//! struct Wire(Vec<bool>);
//!
//! impl TransmitSink for Wire {
//!     fn line_busy(&mut self) -> bool {
//!         false
//!     }
//!     fn write_bit(&mut self, bit: bool) -> nb::Result<(), Error> {
//!         self.0.push(bit);
//!         Ok(())
//!     }
//! }
//!
//! let mut node = Node::with_defaults(0x0001, Wire::default()).unwrap();
//! node.send_message(0x0002, b"ping").unwrap();
//! node.task();
//! assert!(!node.sink().0.is_empty());
//! ```

use crate::consts::{BROADCAST_ADDRESS, DEFAULT_MAX_HOPS, MAX_PAYLOAD_SIZE, PACKET_QUEUE_SIZE};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::goertzel::Sample;
use crate::packet::Packet;
use crate::ring::RingBuffer;

/// Packet type stamped on application messages.
pub const MESSAGE_PACKET_TYPE: u8 = 0;

/// Consumer of the transmit bit stream.
pub trait TransmitSink {
    /// `true` while the channel is in use and no transmission may start.
    fn line_busy(&mut self) -> bool;

    /// Sends one bit.
    ///
    /// Return `nb::Error::WouldBlock` when the modulator cannot take the bit
    /// yet; the node offers the same bit again on its next task.
    fn write_bit(&mut self, bit: bool) -> nb::Result<(), Error>;
}

/// Receives the payload of every accepted packet.
pub type MessageCallback = fn(&[u8]);

/// A mesh node: one decoder, one encoder and the sink they transmit through.
#[derive(Debug)]
pub struct Node<S: TransmitSink> {
    address: u16,
    promiscuous: bool,
    seq_num: u16,
    sink: S,
    decoder: Decoder,
    encoder: Encoder,
    on_message: Option<MessageCallback>,
    inbox: RingBuffer<Packet, PACKET_QUEUE_SIZE>,
    pending_bit: Option<bool>,
    tx_good: u32,
    rx_good: u32,
    rx_bad: u32,
}

impl<S: TransmitSink> Node<S> {
    /// Creates a node from its parts and initializes the decoder.
    ///
    /// # Arguments
    /// - `address`: this node's address
    /// - `sink`: transmit bit consumer
    /// - `decoder`: receive pipeline
    /// - `encoder`: transmit framer, configured with the same marker and bit
    ///   order as `decoder`
    pub fn new(address: u16, sink: S, mut decoder: Decoder, encoder: Encoder) -> Self {
        decoder.init();
        Self {
            address,
            promiscuous: false,
            seq_num: 0,
            sink,
            decoder,
            encoder,
            on_message: None,
            inbox: RingBuffer::new(),
            pending_bit: None,
            tx_good: 0,
            rx_good: 0,
            rx_bad: 0,
        }
    }

    /// Creates a node with the default modem parameters.
    ///
    /// # Errors
    /// [`Error::InvalidParameters`] if the default configuration is rejected.
    pub fn with_defaults(address: u16, sink: S) -> Result<Self> {
        Ok(Self::new(address, sink, Decoder::with_defaults()?, Encoder::default()))
    }

    /// This node's address.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Accepts packets for any destination when `promiscuous` is set.
    pub fn set_promiscuous(&mut self, promiscuous: bool) {
        self.promiscuous = promiscuous;
    }

    /// Registers the message callback; `None` routes payloads to the inbox.
    pub fn set_on_message_received(&mut self, callback: Option<MessageCallback>) {
        self.on_message = callback;
    }

    /// Number of packets queued for transmission.
    pub fn tx_good(&self) -> u32 {
        self.tx_good
    }

    /// Number of packets accepted and delivered.
    pub fn rx_good(&self) -> u32 {
        self.rx_good
    }

    /// Number of addressed packets dropped for a bad payload checksum.
    pub fn rx_bad(&self) -> u32 {
        self.rx_bad
    }

    /// The transmit sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The transmit sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The receive pipeline, for feeding bits or bytes directly.
    pub fn decoder_mut(&mut self) -> &mut Decoder {
        &mut self.decoder
    }

    /// `true` while the encoder or the decoder has pending work.
    pub fn is_busy(&self) -> bool {
        self.pending_bit.is_some() || self.encoder.is_busy() || self.decoder.is_busy()
    }

    /// Queues received samples.
    ///
    /// # Errors
    /// [`Error::Uninitialized`] if the decoder was deinitialized.
    pub fn process_samples(&mut self, samples: &[Sample]) -> Result<()> {
        self.decoder.process_samples(samples)
    }

    /// Sends `payload` to `dest_addr`.
    ///
    /// # Errors
    /// - [`Error::InvalidParameters`] if `payload` exceeds [`MAX_PAYLOAD_SIZE`]
    /// - [`Error::LineBusy`] if the sink reports the channel in use
    /// - [`Error::BufferOverflow`] if the transmit queue is full
    pub fn send_message(&mut self, dest_addr: u16, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidParameters);
        }
        if self.sink.line_busy() {
            debug!("line busy, not sending to {}", dest_addr);
            return Err(Error::LineBusy);
        }
        let packet = Packet::new(
            MESSAGE_PACKET_TYPE,
            self.address,
            dest_addr,
            self.seq_num,
            DEFAULT_MAX_HOPS,
            payload,
        );
        self.encoder.write_packet(&packet)?;
        self.seq_num = self.seq_num.wrapping_add(1);
        self.tx_good = self.tx_good.wrapping_add(1);
        Ok(())
    }

    /// Takes the oldest accepted packet from the inbox.
    pub fn receive(&mut self) -> Option<Packet> {
        self.inbox.pop().ok()
    }

    /// Advances transmission and reception by one step.
    pub fn task(&mut self) {
        self.pump_tx();
        self.decoder.task();
        while let Ok(packet) = self.decoder.try_get_packet() {
            self.handle_packet(packet);
        }
    }

    fn pump_tx(&mut self) {
        loop {
            let bit = match self.pending_bit.take() {
                Some(bit) => bit,
                None => match self.encoder.read_bit() {
                    Ok(bit) => bit,
                    Err(nb::Error::WouldBlock) => return,
                    Err(nb::Error::Other(e)) => {
                        error!("encoder failed: {}", e);
                        return;
                    }
                },
            };
            match self.sink.write_bit(bit) {
                Ok(()) => {}
                Err(nb::Error::WouldBlock) => {
                    self.pending_bit = Some(bit);
                    return;
                }
                Err(nb::Error::Other(e)) => {
                    warn!("transmit sink failed: {}", e);
                    return;
                }
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet) {
        let addressed = self.promiscuous
            || packet.dest_addr == self.address
            || packet.dest_addr == BROADCAST_ADDRESS;
        if !addressed {
            trace!("ignoring packet for {}", packet.dest_addr);
            return;
        }
        if packet.payload_crc != packet.payload_checksum() {
            self.rx_bad = self.rx_bad.wrapping_add(1);
            warn!("dropping packet from {} with bad payload", packet.src_addr);
            return;
        }
        self.rx_good = self.rx_good.wrapping_add(1);
        match self.on_message {
            Some(callback) => callback(packet.payload()),
            None => self.inbox.push(packet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Wire {
        bits: Vec<bool>,
        busy: bool,
        stall_every: Option<usize>,
        calls: usize,
    }

    impl TransmitSink for Wire {
        fn line_busy(&mut self) -> bool {
            self.busy
        }

        fn write_bit(&mut self, bit: bool) -> nb::Result<(), Error> {
            self.calls += 1;
            if let Some(n) = self.stall_every {
                if self.calls % n == 0 {
                    return Err(nb::Error::WouldBlock);
                }
            }
            self.bits.push(bit);
            Ok(())
        }
    }

    fn node(address: u16) -> Node<Wire> {
        Node::with_defaults(address, Wire::default()).unwrap()
    }

    fn transfer(from: &mut Node<Wire>, to: &mut Node<Wire>) {
        while from.is_busy() {
            from.task();
        }
        let bits = core::mem::take(&mut from.sink_mut().bits);
        let mut fed = 0;
        for _ in 0..100_000 {
            if fed < bits.len() {
                fed += to.decoder_mut().process_bits(&bits[fed..]).unwrap();
            }
            to.task();
            if fed == bits.len() && !to.is_busy() {
                return;
            }
        }
        panic!("receiver did not settle");
    }

    #[test]
    fn test_send_and_receive() {
        let mut a = node(0x0001);
        let mut b = node(0x0002);
        a.send_message(0x0002, b"ping").unwrap();
        a.send_message(0x0002, b"pong").unwrap();
        assert_eq!(a.tx_good(), 2);
        transfer(&mut a, &mut b);

        let first = b.receive().unwrap();
        assert_eq!(first.payload(), b"ping");
        assert_eq!(first.src_addr, 0x0001);
        assert_eq!(first.seq_num, 0);
        assert_eq!(first.max_hops, DEFAULT_MAX_HOPS);
        assert_eq!(b.receive().unwrap().seq_num, 1);
        assert_eq!(b.rx_good(), 2);
        assert!(b.receive().is_none());
    }

    #[test]
    fn test_address_filter() {
        let mut a = node(0x0001);
        let mut b = node(0x0002);
        a.send_message(0x0003, b"not yours").unwrap();
        a.send_message(BROADCAST_ADDRESS, b"everyone").unwrap();
        transfer(&mut a, &mut b);
        assert_eq!(b.receive().unwrap().payload(), b"everyone");
        assert!(b.receive().is_none());

        b.set_promiscuous(true);
        a.send_message(0x0003, b"sniffed").unwrap();
        transfer(&mut a, &mut b);
        assert_eq!(b.receive().unwrap().payload(), b"sniffed");
    }

    #[test]
    fn test_bad_payload_counted() {
        let mut b = node(0x0002);
        let mut packet = Packet::new(0, 1, 0x0002, 0, 10, b"data");
        packet.payload_crc ^= 0x0001;
        b.decoder_mut().inject_packet(packet).unwrap();
        b.task();
        assert_eq!(b.rx_bad(), 1);
        assert_eq!(b.rx_good(), 0);
        assert!(b.receive().is_none());
    }

    static DELIVERED: AtomicUsize = AtomicUsize::new(0);

    fn count_delivery(payload: &[u8]) {
        assert_eq!(payload, b"cb");
        let _ = DELIVERED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_callback_delivery() {
        let mut b = node(0x0002);
        b.set_on_message_received(Some(count_delivery));
        let packet = Packet::new(0, 1, 0x0002, 0, 10, b"cb");
        b.decoder_mut().inject_packet(packet).unwrap();
        b.task();
        assert_eq!(DELIVERED.load(Ordering::SeqCst), 1);
        assert!(b.receive().is_none());
    }

    #[test]
    fn test_send_rejections() {
        let mut a = node(0x0001);
        assert_eq!(
            a.send_message(0x0002, &[0u8; MAX_PAYLOAD_SIZE + 1]),
            Err(Error::InvalidParameters)
        );
        a.sink_mut().busy = true;
        assert_eq!(a.send_message(0x0002, b"hi"), Err(Error::LineBusy));
        assert_eq!(a.tx_good(), 0);
    }

    #[test]
    fn test_stalling_sink_loses_no_bits() {
        let mut a = node(0x0001);
        let mut b = node(0x0002);
        a.sink_mut().stall_every = Some(5);
        a.send_message(0x0002, b"slow").unwrap();
        transfer(&mut a, &mut b);
        assert_eq!(b.receive().unwrap().payload(), b"slow");
    }
}
