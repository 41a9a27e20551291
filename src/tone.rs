//! Phase-continuous FSK tone synthesis, the transmit mirror of [`crate::fsk`].
//!
//! [`ToneGenerator`] renders one bit period of biased sine samples per call,
//! carrying the oscillator phase across bits so switching tones never produces
//! a discontinuity. Output samples use the same biased 12-bit range the
//! receive side expects from the ADC.

use core::f32::consts::PI;

use libm::{roundf, sinf};

use crate::consts::{DEFAULT_TONE_AMPLITUDE, SAMPLE_BIAS};
use crate::error::{Error, Result};
use crate::fsk::FskConfig;
use crate::goertzel::Sample;

const TAU: f32 = 2.0 * PI;

/// Renders bits as tone windows for a DAC or for loopback testing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ToneGenerator {
    step_0: f32,
    step_1: f32,
    phase: f32,
    samples_per_bit: usize,
    amplitude: f32,
}

impl ToneGenerator {
    /// Builds a generator matching the receive configuration `config`.
    ///
    /// # Errors
    /// [`Error::InvalidParameters`] if `config` does not validate.
    pub fn new(config: &FskConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            step_0: TAU * config.freq_0 / config.sample_rate,
            step_1: TAU * config.freq_1 / config.sample_rate,
            phase: 0.0,
            samples_per_bit: config.sample_size,
            amplitude: f32::from(DEFAULT_TONE_AMPLITUDE),
        })
    }

    /// Replaces the peak amplitude around [`SAMPLE_BIAS`].
    pub fn with_amplitude(mut self, amplitude: u16) -> Self {
        self.amplitude = f32::from(amplitude);
        self
    }

    /// Number of samples rendered per bit.
    pub fn samples_per_bit(&self) -> usize {
        self.samples_per_bit
    }

    /// Writes one bit period of tone into the front of `out`.
    ///
    /// # Returns
    /// The number of samples written, always [`samples_per_bit`](Self::samples_per_bit).
    ///
    /// # Errors
    /// [`Error::BufferTooSmall`] if `out` is shorter than one bit period.
    pub fn fill(&mut self, bit: bool, out: &mut [Sample]) -> Result<usize> {
        let window = out
            .get_mut(..self.samples_per_bit)
            .ok_or(Error::BufferTooSmall)?;
        let step = if bit { self.step_1 } else { self.step_0 };
        for sample in window.iter_mut() {
            let value = f32::from(SAMPLE_BIAS) + self.amplitude * sinf(self.phase);
            *sample = roundf(value) as Sample;
            self.phase += step;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
        Ok(self.samples_per_bit)
    }

    /// Writes one bit period of carrier-free bias into the front of `out`.
    ///
    /// # Errors
    /// [`Error::BufferTooSmall`] if `out` is shorter than one bit period.
    pub fn fill_silence(&mut self, out: &mut [Sample]) -> Result<usize> {
        let window = out
            .get_mut(..self.samples_per_bit)
            .ok_or(Error::BufferTooSmall)?;
        window.fill(SAMPLE_BIAS);
        Ok(self.samples_per_bit)
    }

    /// Restarts the oscillator at phase zero.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}
