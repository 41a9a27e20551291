//! Consistent Overhead Byte Stuffing.
//!
//! COBS removes every zero byte from a payload so a single `0x00` can delimit
//! frames on the wire. The payload is split at its zero bytes into blocks; each
//! block is sent as a code byte (`block length + 1`) followed by its non-zero
//! bytes, and the zero that ended the block is implied. A code of `0xFF` marks a
//! full 254 byte block with no implied zero.
//!
//! ```text
//! payload  11 22 00 33      ->  03 11 22 02 33 00
//! payload  00               ->  01 01 00
//! ```
//!
//! - [`encode`] and [`decode`] work on whole frames held in slices.
//! - [`CobsDecoder`] is the streaming frame stage of the receive pipeline. It
//!   emits the bytes of every completed, non-empty frame and resets itself on
//!   malformed input.

use crate::consts::{BYTE_BUFFER_SIZE, COBS_MAX_BLOCK, FRAME_BUFFER_SIZE, FRAME_QUEUE_SIZE};
use crate::error::{Error, Result};
use crate::ring::RingBuffer;
use crate::stage::{FrameSource, Stage};

/// Worst-case encoded size of a `len` byte payload, delimiter included.
pub const fn max_encoded_len(len: usize) -> usize {
    len + len / COBS_MAX_BLOCK + 2
}

/// Stuffs `input` into `output` and appends the `0x00` delimiter.
///
/// # Returns
/// The number of bytes written.
///
/// # Errors
/// [`Error::BufferTooSmall`] if `output` is shorter than
/// [`max_encoded_len`]`(input.len())`.
pub fn encode(input: &[u8], output: &mut [u8]) -> Result<usize> {
    if output.len() < max_encoded_len(input.len()) {
        return Err(Error::BufferTooSmall);
    }

    let mut code_index = 0;
    let mut write_index = 1;
    let mut code: u8 = 1;
    for &byte in input {
        if byte == 0 {
            output[code_index] = code;
            code_index = write_index;
            write_index += 1;
            code = 1;
            continue;
        }
        output[write_index] = byte;
        write_index += 1;
        code += 1;
        if code == 0xFF {
            output[code_index] = code;
            code_index = write_index;
            write_index += 1;
            code = 1;
        }
    }
    output[code_index] = code;
    output[write_index] = 0;
    Ok(write_index + 1)
}

/// Unstuffs one frame from `input` into `output`.
///
/// Decoding stops at the first `0x00` delimiter; a missing trailing delimiter
/// is tolerated when the last block is complete.
///
/// # Returns
/// The decoded length, `0` for an empty frame.
///
/// # Errors
/// - [`Error::BufferTooSmall`] if the frame does not fit in `output`
/// - [`Error::MalformedFrame`] if the input ends or hits a zero inside a block
pub fn decode(input: &[u8], output: &mut [u8]) -> Result<usize> {
    let mut state = FrameState::default();
    for &byte in input {
        match state.push(byte, output) {
            Ok(Some(len)) => return Ok(len),
            Ok(None) => {}
            Err(Error::FrameOverflow) => return Err(Error::BufferTooSmall),
            Err(e) => return Err(e),
        }
    }
    if state.code != 0 {
        return Err(Error::MalformedFrame);
    }
    Ok(state.write_index)
}

/// Decoding state of one frame, independent of where the bytes are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FrameState {
    code: u8,
    remaining: u8,
    write_index: usize,
    pending_zero: bool,
}

impl FrameState {
    /// Consumes one byte, writing decoded data into `frame`.
    ///
    /// Returns the frame length when `byte` is the delimiter. The zero implied
    /// by a short block is only written once the next block header arrives, so
    /// the block in front of the delimiter never gains a trailing zero.
    fn push(&mut self, byte: u8, frame: &mut [u8]) -> Result<Option<usize>> {
        if self.code == 0 {
            if byte == 0 {
                let len = self.write_index;
                self.clear();
                return Ok(Some(len));
            }
            let pending = usize::from(self.pending_zero);
            let remaining = byte - 1;
            if self.write_index + pending + usize::from(remaining) > frame.len() {
                self.clear();
                return Err(Error::FrameOverflow);
            }
            if self.pending_zero {
                frame[self.write_index] = 0;
                self.write_index += 1;
                self.pending_zero = false;
            }
            self.code = byte;
            self.remaining = remaining;
            if self.remaining == 0 {
                self.finish_block();
            }
            return Ok(None);
        }

        if byte == 0 {
            self.clear();
            return Err(Error::MalformedFrame);
        }
        frame[self.write_index] = byte;
        self.write_index += 1;
        self.remaining -= 1;
        if self.remaining == 0 {
            self.finish_block();
        }
        Ok(None)
    }

    fn finish_block(&mut self) {
        self.pending_zero = self.code < 0xFF;
        self.code = 0;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Byte-to-frame stage of the receive pipeline.
///
/// Completed frames are appended byte by byte to the output queue; frame
/// boundaries are not preserved there, the packet layer resynchronizes on its
/// own marker.
#[derive(Debug, Clone)]
pub struct CobsDecoder {
    state: FrameState,
    frame: [u8; FRAME_BUFFER_SIZE],
    input: RingBuffer<u8, BYTE_BUFFER_SIZE>,
    output: RingBuffer<u8, FRAME_QUEUE_SIZE>,
    frames: u32,
    errors: u32,
}

impl Default for CobsDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CobsDecoder {
    /// Creates a decoder waiting for the first block header.
    pub fn new() -> Self {
        Self {
            state: FrameState::default(),
            frame: [0; FRAME_BUFFER_SIZE],
            input: RingBuffer::new(),
            output: RingBuffer::new(),
            frames: 0,
            errors: 0,
        }
    }

    /// Number of non-empty frames completed.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Number of frames discarded as malformed or oversized.
    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// `true` while a frame is partially decoded.
    pub fn in_frame(&self) -> bool {
        self.state != FrameState::default()
    }

    /// Feeds one byte straight into the decoder, bypassing the input queue.
    ///
    /// # Returns
    /// `Some(len)` when `byte` completed a non-empty frame, whose bytes are
    /// now in the output queue.
    ///
    /// # Errors
    /// [`Error::FrameOverflow`] or [`Error::MalformedFrame`]; the partial frame
    /// is dropped and the decoder waits for the next block header.
    pub fn process_byte(&mut self, byte: u8) -> Result<Option<usize>> {
        match self.state.push(byte, &mut self.frame) {
            Ok(Some(0)) => Ok(None),
            Ok(Some(len)) => {
                for &b in &self.frame[..len] {
                    self.output.push(b);
                }
                self.frames = self.frames.wrapping_add(1);
                info!("cobs frame complete, {} bytes", len);
                Ok(Some(len))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.errors = self.errors.wrapping_add(1);
                warn!("cobs frame dropped: {}", e);
                Err(e)
            }
        }
    }
}

impl Stage for CobsDecoder {
    type Input = u8;
    type Output = u8;

    fn accept(&mut self, item: u8) {
        self.input.push(item);
    }

    fn is_ready(&self) -> bool {
        !self.input.is_full()
    }

    /// Decodes queued bytes while the output queue can hold a whole frame.
    fn task(&mut self) {
        while self.output.free() >= FRAME_BUFFER_SIZE {
            let Ok(byte) = self.input.pop() else {
                break;
            };
            let _ = self.process_byte(byte);
        }
    }

    fn take(&mut self) -> Option<u8> {
        self.output.pop().ok()
    }

    fn is_idle(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    fn reset(&mut self) {
        self.state.clear();
        self.input.reset();
        self.output.reset();
        self.frames = 0;
        self.errors = 0;
    }
}

impl FrameSource for CobsDecoder {}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(input: &[u8]) -> Vec<u8> {
        let mut out = vec![0; max_encoded_len(input.len())];
        let n = encode(input, &mut out).unwrap();
        out.truncate(n);
        out
    }

    fn stream(decoder: &mut CobsDecoder, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &b in bytes {
            decoder.accept(b);
            decoder.task();
            while let Some(byte) = decoder.take() {
                out.push(byte);
            }
        }
        out
    }

    #[test]
    fn test_literal_cases() {
        assert_eq!(encoded(&[]), vec![0x01, 0x00]);
        assert_eq!(encoded(&[0x00]), vec![0x01, 0x01, 0x00]);
        assert_eq!(encoded(&[0x41]), vec![0x02, 0x41, 0x00]);
        assert_eq!(
            encoded(&[0x11, 0x22, 0x00, 0x33]),
            vec![0x03, 0x11, 0x22, 0x02, 0x33, 0x00]
        );
        assert_eq!(encoded(&[0x00, 0x00]), vec![0x01, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_long_run_splits_blocks() {
        let input: Vec<u8> = (1..=254u8).collect();
        let out = encoded(&input);
        assert_eq!(out.len(), max_encoded_len(254));
        assert_eq!(out[0], 0xFF);
        assert_eq!(&out[1..255], &input[..]);
        assert_eq!(&out[255..], &[0x01, 0x00]);
        assert!(out[..out.len() - 1].iter().all(|&b| b != 0));
    }

    #[test]
    fn test_round_trip_all_lengths() {
        let mut decoded = vec![0u8; 512];
        for len in 0..=500usize {
            let input: Vec<u8> = (0..len).map(|i| (i * 7 % 5) as u8 * (i % 13) as u8).collect();
            let frame = encoded(&input);
            assert!(frame[..frame.len() - 1].iter().all(|&b| b != 0));
            let n = decode(&frame, &mut decoded).unwrap();
            assert_eq!(&decoded[..n], &input[..], "len {len}");
        }
    }

    #[test]
    fn test_encode_rejects_small_output() {
        let mut out = [0u8; 3];
        assert_eq!(encode(&[1, 2], &mut out), Err(Error::BufferTooSmall));
    }

    #[test]
    fn test_decode_errors() {
        let mut out = [0u8; 8];
        assert_eq!(decode(&[0x05, 0x01, 0x00], &mut out), Err(Error::MalformedFrame));
        assert_eq!(decode(&[0x05, 0x01], &mut out), Err(Error::MalformedFrame));
        assert_eq!(
            decode(&[0x0A, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0x00], &mut out),
            Err(Error::BufferTooSmall)
        );
        assert_eq!(decode(&[0x03, 0x11, 0x22], &mut out), Ok(2));
    }

    #[test]
    fn test_no_zero_after_final_block() {
        let mut out = [0u8; 8];
        let n = decode(&[0x03, 0x11, 0x22, 0x00], &mut out).unwrap();
        assert_eq!(&out[..n], &[0x11, 0x22]);
    }

    #[test]
    fn test_stream_decodes_back_to_back_frames() {
        let mut decoder = CobsDecoder::new();
        let mut wire = encoded(&[0xAB, 0xBA, 0x00, 0x01]);
        wire.extend(encoded(&[0x42]));
        assert_eq!(stream(&mut decoder, &wire), vec![0xAB, 0xBA, 0x00, 0x01, 0x42]);
        assert_eq!(decoder.frames(), 2);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_stream_recovers_from_malformed_prefix() {
        let mut decoder = CobsDecoder::new();
        // Marker bytes forwarded by the byte assembler, then the frame.
        let mut wire = vec![0xAB, 0xBA, 0x00];
        wire.extend(encoded(&[0x10, 0x20]));
        assert_eq!(stream(&mut decoder, &wire), vec![0x10, 0x20]);
        assert_eq!(decoder.errors(), 1);
        assert!(!decoder.in_frame());
    }

    #[test]
    fn test_stream_overflow_resets() {
        let mut decoder = CobsDecoder::new();
        let mut wire = vec![0xFF; 2];
        wire.extend(vec![0x01; 300]);
        wire.push(0x00);
        let mut out = Vec::new();
        for &b in &wire {
            if let Err(e) = decoder.process_byte(b) {
                assert_eq!(e, Error::FrameOverflow);
            }
            while let Some(byte) = decoder.take() {
                out.push(byte);
            }
        }
        assert!(decoder.errors() >= 1);
        assert!(!decoder.in_frame());
    }

    #[test]
    fn test_empty_frames_emit_nothing() {
        let mut decoder = CobsDecoder::new();
        assert!(stream(&mut decoder, &[0x00, 0x00, 0x01, 0x00]).is_empty());
        assert_eq!(decoder.frames(), 0);
    }
}
