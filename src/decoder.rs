//! Receive pipeline orchestrator.
//!
//! [`Decoder`] chains the pluggable stages with the packet parser:
//!
//! ```text
//! samples -> BitSource -> bits -> ByteSource -> bytes -> FrameSource -> frame bytes -> PacketDecoder -> packets
//! ```
//!
//! Every call to [`Decoder::task`] runs each stage's own task once and then
//! moves at most one item across each stage boundary, and only when the
//! downstream stage has room. No call blocks; a stage without input simply
//! makes no progress until the next tick.
//!
//! Data can enter at any stage: [`process_samples`](Decoder::process_samples),
//! [`process_bits`](Decoder::process_bits),
//! [`process_bytes`](Decoder::process_bytes) or
//! [`inject_packet`](Decoder::inject_packet).
//!
//! ## Example
//!
//! ```rust
//! use peregrine::decoder::Decoder;
//!
//! let mut decoder = Decoder::with_defaults().unwrap();
//! decoder.init();
//! decoder.process_samples(&[2048; 66]).unwrap();
//! while decoder.is_busy() {
//!     decoder.task();
//! }
//! assert!(decoder.try_get_packet().is_err());
//! ```

use crate::assembler::{BitOrder, ByteAssembler};
use crate::cobs::CobsDecoder;
use crate::error::{Error, Result};
use crate::fsk::{FskConfig, FskDecoder};
use crate::goertzel::Sample;
use crate::packet::{Packet, PacketDecoder};
use crate::preamble::Preamble;
use crate::stage::{BitSource, ByteSource, FrameSource, Stage};

/// Lifecycle state of the [`Decoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum DecoderState {
    /// Not usable; call [`Decoder::init`].
    #[default]
    Uninitialized,
    /// Constructed; the next [`Decoder::task`] (or [`Decoder::init`]) resets the stages.
    Initializing,
    /// No stage has pending work.
    Idle,
    /// At least one stage has pending work.
    Processing,
}

/// The receive pipeline.
///
/// # Type Parameters
///
/// - `B`: bit stage, [`FskDecoder`] by default
/// - `Y`: byte stage, [`ByteAssembler`] by default
/// - `F`: frame stage, [`CobsDecoder`] by default
#[derive(Debug, Clone)]
pub struct Decoder<B = FskDecoder, Y = ByteAssembler, F = CobsDecoder>
where
    B: BitSource,
    Y: ByteSource,
    F: FrameSource,
{
    state: DecoderState,
    bit_stage: B,
    byte_stage: Y,
    frame_stage: F,
    packet_stage: PacketDecoder,
}

impl Decoder {
    /// Builds the default pipeline for `config`.
    ///
    /// # Arguments
    /// - `config`: FSK stage parameters
    /// - `preamble`: marker used for byte sync and by the packet parser
    /// - `order`: bit order on the wire
    ///
    /// # Errors
    /// [`Error::InvalidParameters`] if `config` does not validate.
    pub fn with_config(config: FskConfig, preamble: Preamble, order: BitOrder) -> Result<Self> {
        Ok(Self::new(
            FskDecoder::new(config)?,
            ByteAssembler::new(preamble, order),
            CobsDecoder::new(),
            preamble,
        ))
    }

    /// Builds the default pipeline with default modem parameters.
    ///
    /// # Errors
    /// See [`with_config`](Self::with_config).
    pub fn with_defaults() -> Result<Self> {
        Self::with_config(FskConfig::default(), Preamble::default(), BitOrder::default())
    }
}

impl<B, Y, F> Decoder<B, Y, F>
where
    B: BitSource,
    Y: ByteSource,
    F: FrameSource,
{
    /// Assembles a pipeline from its stages.
    ///
    /// The decoder starts in [`DecoderState::Initializing`].
    pub fn new(bit_stage: B, byte_stage: Y, frame_stage: F, preamble: Preamble) -> Self {
        Self {
            state: DecoderState::Initializing,
            bit_stage,
            byte_stage,
            frame_stage,
            packet_stage: PacketDecoder::new(preamble),
        }
    }

    /// Resets every stage and makes the decoder ready for data.
    pub fn init(&mut self) {
        self.reset_stages();
        self.state = DecoderState::Idle;
        debug!("decoder initialized");
    }

    /// Drops all pipeline data and disables the decoder until the next [`init`](Self::init).
    pub fn deinit(&mut self) {
        self.reset_stages();
        self.state = DecoderState::Uninitialized;
        debug!("decoder deinitialized");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// The bit stage.
    pub fn bit_stage(&self) -> &B {
        &self.bit_stage
    }

    /// The bit stage, mutably.
    pub fn bit_stage_mut(&mut self) -> &mut B {
        &mut self.bit_stage
    }

    /// The byte stage.
    pub fn byte_stage(&self) -> &Y {
        &self.byte_stage
    }

    /// The frame stage.
    pub fn frame_stage(&self) -> &F {
        &self.frame_stage
    }

    /// The packet parser.
    pub fn packet_stage(&self) -> &PacketDecoder {
        &self.packet_stage
    }

    /// Advances the pipeline by one tick.
    ///
    /// Runs every stage task, then moves at most one item across each stage
    /// boundary whose downstream input has room.
    pub fn task(&mut self) {
        match self.state {
            DecoderState::Uninitialized => return,
            DecoderState::Initializing => {
                self.init();
                return;
            }
            DecoderState::Idle | DecoderState::Processing => {}
        }

        self.bit_stage.task();
        self.byte_stage.task();
        self.frame_stage.task();
        self.packet_stage.task();

        if self.byte_stage.is_ready() {
            if let Some(bit) = self.bit_stage.take() {
                self.byte_stage.accept(bit);
            }
        }
        if self.frame_stage.is_ready() {
            if let Some(byte) = self.byte_stage.take() {
                self.frame_stage.accept(byte);
            }
        }
        if self.packet_stage.is_ready() {
            if let Some(byte) = self.frame_stage.take() {
                self.packet_stage.accept(byte);
            }
        }

        self.state = if self.stages_idle() {
            DecoderState::Idle
        } else {
            DecoderState::Processing
        };
    }

    /// `true` while any stage has queued input or undelivered output.
    ///
    /// Completed packets waiting for [`try_get_packet`](Self::try_get_packet)
    /// do not count.
    pub fn is_busy(&self) -> bool {
        self.state == DecoderState::Processing || !self.stages_idle()
    }

    /// Queues raw samples for the bit stage.
    ///
    /// # Errors
    /// [`Error::Uninitialized`] unless the decoder is initialized.
    pub fn process_samples(&mut self, samples: &[Sample]) -> Result<()> {
        self.ensure_ready()?;
        for &sample in samples {
            self.bit_stage.accept(sample);
        }
        Ok(())
    }

    /// Queues bits for the byte stage, skipping the bit stage.
    ///
    /// # Returns
    /// The number of bits accepted; fewer than `bits.len()` when the byte stage
    /// is full. Retry with the rest after the next [`task`](Self::task).
    ///
    /// # Errors
    /// [`Error::Uninitialized`] unless the decoder is initialized.
    pub fn process_bits(&mut self, bits: &[bool]) -> Result<usize> {
        self.ensure_ready()?;
        Ok(feed(&mut self.byte_stage, bits))
    }

    /// Queues bytes for the frame stage, skipping the bit and byte stages.
    ///
    /// # Returns
    /// The number of bytes accepted.
    ///
    /// # Errors
    /// [`Error::Uninitialized`] unless the decoder is initialized.
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        self.ensure_ready()?;
        Ok(feed(&mut self.frame_stage, bytes))
    }

    /// Places `packet` in the output queue as if it had been decoded.
    ///
    /// # Errors
    /// [`Error::Uninitialized`] unless the decoder is initialized.
    pub fn inject_packet(&mut self, packet: Packet) -> Result<()> {
        self.ensure_ready()?;
        self.packet_stage.inject(packet);
        Ok(())
    }

    /// `true` when a decoded packet is waiting.
    pub fn has_packet(&self) -> bool {
        self.packet_stage.has_packet()
    }

    /// Takes the oldest decoded packet without blocking.
    ///
    /// # Errors
    /// - `nb::Error::WouldBlock` when no packet is waiting
    /// - [`Error::Uninitialized`] unless the decoder is initialized
    pub fn try_get_packet(&mut self) -> nb::Result<Packet, Error> {
        self.ensure_ready()?;
        self.packet_stage.take().ok_or(nb::Error::WouldBlock)
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            DecoderState::Idle | DecoderState::Processing => Ok(()),
            DecoderState::Uninitialized | DecoderState::Initializing => Err(Error::Uninitialized),
        }
    }

    fn stages_idle(&self) -> bool {
        self.bit_stage.is_idle()
            && self.byte_stage.is_idle()
            && self.frame_stage.is_idle()
            && self.packet_stage.is_idle()
    }

    fn reset_stages(&mut self) {
        self.bit_stage.reset();
        self.byte_stage.reset();
        self.frame_stage.reset();
        self.packet_stage.reset();
    }
}

fn feed<S: Stage>(stage: &mut S, items: &[S::Input]) -> usize {
    let mut accepted = 0;
    for &item in items {
        if !stage.is_ready() {
            break;
        }
        stage.accept(item);
        accepted += 1;
    }
    accepted
}
