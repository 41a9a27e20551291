//! Constants used across the modem and framing stack.
//!
//! This module holds the compile-time configuration surface: packet limits,
//! the wire header layout, every inter-stage queue capacity and the default
//! modem parameters.
//!
//! ## Key Concepts
//!
//! - **Packet limits**: a packet on the wire is the preamble marker, the 13 byte
//!   header, up to [`MAX_PAYLOAD_SIZE`] payload bytes and a 2 byte payload checksum.
//! - **Frames**: COBS frames are decoded into a [`FRAME_BUFFER_SIZE`] byte buffer.
//! - **Queues**: each stage owns its input and output ring buffers; the sizes
//!   below bound every allocation the pipeline makes.
//! - **Modem defaults**: tones sit on whole Goertzel bins of the default window
//!   so silence and the opposite tone contribute almost no energy.

/// Maximum size (in bytes) of a packet on the wire, preamble marker included.
pub const MAX_PACKET_SIZE: usize = 32;

/// Maximum number of payload bytes carried by one packet.
pub const MAX_PAYLOAD_SIZE: usize = 15;

/// Length (in bytes) of the fixed packet header.
///
/// `type(1) | src(2) | dest(2) | seq(2) | payload_len(2) | hop_count(1) | max_hops(1) | header_crc(2)`
pub const HEADER_SIZE: usize = 13;

/// Length (in bytes) of the trailing payload checksum.
pub const PAYLOAD_CRC_SIZE: usize = 2;

/// Default preamble pattern, transmitted as `0xAB 0xBA`.
pub const DEFAULT_PREAMBLE: u16 = 0xABBA;

/// Capacity of the COBS frame decoding buffer.
pub const FRAME_BUFFER_SIZE: usize = 256;

/// Longest run of non-zero bytes a single COBS block can carry.
pub const COBS_MAX_BLOCK: usize = 254;

/// Capacity of the raw sample queue feeding the FSK stage.
pub const SAMPLE_BUFFER_SIZE: usize = 512;

/// Capacity of the decided-bit queue between the FSK stage and the byte assembler.
pub const BIT_BUFFER_SIZE: usize = 64;

/// Capacity of the byte queues between the assembler, the frame codec and the packet codec.
pub const BYTE_BUFFER_SIZE: usize = 64;

/// Capacity of the decoded frame byte queue. Room for one queued frame while
/// the next one is being decoded.
pub const FRAME_QUEUE_SIZE: usize = 2 * FRAME_BUFFER_SIZE;

/// Number of decoded packets held until the application collects them.
pub const PACKET_QUEUE_SIZE: usize = 4;

/// Capacity (in bytes) of the encoder transmit queue.
pub const TX_BUFFER_SIZE: usize = 256;

/// Default symbol rate in bits per second.
pub const DEFAULT_BAUD_RATE: u32 = 100;

/// Default tone for a `0` bit (space), in Hz.
pub const DEFAULT_FREQ_0: f32 = 1100.0;

/// Default tone for a `1` bit (mark), in Hz.
pub const DEFAULT_FREQ_1: f32 = 2200.0;

/// Default sample rate, three times the highest default tone.
pub const DEFAULT_SAMPLE_RATE: f32 = 6600.0;

/// Default window length in samples (`DEFAULT_SAMPLE_RATE / DEFAULT_BAUD_RATE`).
pub const DEFAULT_SAMPLES_PER_BIT: usize = 66;

/// Goertzel power both tones must stay under for a window to count as silence.
pub const DEFAULT_POWER_THRESHOLD: f32 = 1_000_000.0;

/// Mid-scale value of a 12-bit ADC, the DC bias of generated tones.
pub const SAMPLE_BIAS: u16 = 2048;

/// Default peak amplitude of generated tones around [`SAMPLE_BIAS`].
pub const DEFAULT_TONE_AMPLITUDE: u16 = 1000;

/// Default hop limit stamped on outgoing packets.
pub const DEFAULT_MAX_HOPS: u8 = 10;

/// Destination address accepted by every node.
pub const BROADCAST_ADDRESS: u16 = u16::MAX;
