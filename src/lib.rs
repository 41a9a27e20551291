//! # peregrine
//!
//! A portable, no_std software modem and framing stack for low-rate mesh nodes
//! that talk over an audio frequency-shift-keyed (FSK) link.
//!
//! The receive path turns raw ADC samples into validated packets through four
//! poll-driven stages:
//!
//! ```text
//! samples -> FskDecoder -> bits -> ByteAssembler -> bytes -> CobsDecoder -> frames -> PacketDecoder -> packets
//! ```
//!
//! - Goertzel tone detection decides one bit per window of samples
//! - a bit-level preamble search locks the byte boundary
//! - COBS frames delimit packets with a single zero byte
//! - additive header and payload checksums guard every packet
//!
//! The transmit path mirrors it: [`encoder::Encoder`] frames packets into a bit
//! stream and [`tone::ToneGenerator`] renders bits as tones for a DAC.
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support |
//! | `delay-loop`          | Uses `embedded_hal::delay::DelayNs` to pace a polling loop |
//! | `timer-isr` (default) | Uses `critical_section::with` for an interrupt fed sample queue |
//! | `dma`                 | Exposes ring buffer storage for DMA producers |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust
//! use peregrine::decoder::Decoder;
//!
//! let mut decoder = Decoder::with_defaults().unwrap();
//! decoder.init();
//!
//! # let samples = [2048u16; 66];
//! decoder.process_samples(&samples).unwrap();
//! decoder.task(); // Call from the main loop
//!
//! if let Ok(packet) = decoder.try_get_packet() {
//!     // packet.payload()
//!     # let _ = packet;
//! }
//! ```
//!
//! For a complete node with addressing and transmission, see [`node::Node`].
//!
//! ## Integration Notes
//!
//! - Nothing blocks: every `task()` performs a bounded amount of work
//! - Samples may be produced from an interrupt through the `timer-isr` queue
//! - All buffers are fixed size; the crate never allocates
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
mod fmt;

#[cfg(feature = "timer-isr")]
pub use critical_section;

pub use heapless;

pub mod assembler;
pub mod cobs;
pub mod consts;
pub(crate) mod crc;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fsk;
pub mod goertzel;
pub mod node;
pub mod packet;
pub mod preamble;
pub mod ring;
pub mod stage;
pub mod timer;
pub mod tone;
