//! Error kinds shared by every stage of the modem.
//!
//! Stage-local data errors (overflow, checksum, malformed frame) are handled by
//! resetting the stage that hit them; they are only returned from the
//! single-step APIs (`process_byte`, `process_bit`, ...). Only
//! [`Error::InvalidParameters`] at configuration time is meant to stop startup.

use thiserror::Error;

/// Errors produced by the modem, framing and packet layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error {
    /// A configuration value is out of range (zero rate, equal tones, ...).
    #[error("invalid parameters")]
    InvalidParameters,

    /// The operation was attempted before the component was initialized.
    #[error("component is not initialized")]
    Uninitialized,

    /// Data does not fit in a fixed-size buffer.
    #[error("buffer overflow")]
    BufferOverflow,

    /// A COBS block would run past the end of the frame buffer.
    #[error("frame exceeds the frame buffer")]
    FrameOverflow,

    /// A zero delimiter arrived while a COBS block was still open.
    #[error("malformed frame")]
    MalformedFrame,

    /// The caller supplied output buffer cannot hold the result.
    #[error("output buffer too small")]
    BufferTooSmall,

    /// A header or payload checksum does not match its contents.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// `pop`/`peek` on an empty ring buffer.
    #[error("buffer is empty")]
    EmptyBuffer,

    /// The transmit sink reported the line as busy.
    #[error("line busy")]
    LineBusy,
}

/// Shorthand result type for the crate.
pub type Result<T> = core::result::Result<T, Error>;
