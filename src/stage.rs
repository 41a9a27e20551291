//! Capabilities of the pluggable decode stages.
//!
//! The [`Decoder`](crate::decoder::Decoder) drives three pluggable stages, one
//! per capability, chosen at construction time:
//!
//! | Capability       | Input      | Output        | Default implementation |
//! |------------------|------------|---------------|------------------------|
//! | [`BitSource`]    | [`Sample`] | `bool`        | [`FskDecoder`](crate::fsk::FskDecoder) |
//! | [`ByteSource`]   | `bool`     | `u8`          | [`ByteAssembler`](crate::assembler::ByteAssembler) |
//! | [`FrameSource`]  | `u8`       | `u8` (frames) | [`CobsDecoder`](crate::cobs::CobsDecoder) |
//!
//! Every stage owns its input and output queues. The decoder moves items
//! between them by copy; stages never see each other.

use crate::goertzel::Sample;

/// A poll-driven pipeline stage with its own input and output queues.
pub trait Stage {
    /// Item type consumed by the stage.
    type Input: Copy;
    /// Item type produced by the stage.
    type Output: Copy;

    /// Queues one input item.
    ///
    /// Callers check [`is_ready`](Self::is_ready) first; a stage that is not
    /// ready may drop its oldest queued input.
    fn accept(&mut self, item: Self::Input);

    /// `true` while the input queue has room for another item.
    fn is_ready(&self) -> bool;

    /// Performs a bounded amount of work on the queued input.
    ///
    /// Malformed data never escapes this call: the stage resets itself and
    /// carries on with the next input.
    fn task(&mut self);

    /// Takes the oldest produced item, if any.
    fn take(&mut self) -> Option<Self::Output>;

    /// `true` when the stage has no queued input it could act on and no
    /// output waiting to be collected.
    fn is_idle(&self) -> bool;

    /// Drops all queued data and returns the stage to its initial search state.
    fn reset(&mut self);
}

/// Converts raw samples into decided bits.
pub trait BitSource: Stage<Input = Sample, Output = bool> {}

/// Converts a bit stream into preamble aligned bytes.
pub trait ByteSource: Stage<Input = bool, Output = u8> {}

/// Converts a byte stream into the bytes of completed, unstuffed frames.
pub trait FrameSource: Stage<Input = u8, Output = u8> {}
