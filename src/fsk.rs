//! FSK bit detection stage.
//!
//! This module provides [`FskDecoder`], the first stage of the receive pipeline.
//! It buffers raw ADC samples and turns every window of
//! [`FskConfig::sample_size`] samples into at most one bit by comparing the
//! Goertzel power of the two tones:
//!
//! - both powers under [`FskConfig::power_threshold`]: silence, no bit
//! - otherwise: the bit is `power_1 > power_0`
//!
//! The window is always discarded after a decision, decided or not, so the
//! window phase stays locked to symbol boundaries as long as the producer
//! supplies one window per bit period.
//!
//! ## Window alignment
//!
//! With [`FskConfig::align_windows`] set, the decoder waits for
//! `sample_size + sample_size / 4` samples and first drops the offset in
//! `0..sample_size / 4` that maximizes `|power_1 - power_0|`. This costs
//! `sample_size / 4` extra Goertzel runs per bit and recovers from slow phase
//! drift between transmitter and receiver.
//!
//! ## Example
//!
//! ```rust
//! use peregrine::fsk::{FskConfig, FskDecoder};
//! use peregrine::stage::Stage;
//! use peregrine::tone::ToneGenerator;
//!
//! let config = FskConfig::default();
//! let mut decoder = FskDecoder::new(config).unwrap();
//! let mut tone = ToneGenerator::new(&config).unwrap();
//!
//! let mut window = [0u16; 66];
//! let _ = tone.fill(true, &mut window).unwrap();
//! decoder.push_samples(&window);
//! decoder.task();
//! assert_eq!(decoder.take(), Some(true));
//! ```

use libm::fabsf;

use crate::consts::{
    BIT_BUFFER_SIZE, DEFAULT_FREQ_0, DEFAULT_FREQ_1, DEFAULT_POWER_THRESHOLD, DEFAULT_SAMPLE_RATE,
    DEFAULT_SAMPLES_PER_BIT, SAMPLE_BUFFER_SIZE,
};
use crate::error::{Error, Result};
use crate::goertzel::{Goertzel, Sample};
use crate::ring::RingBuffer;
use crate::stage::{BitSource, Stage};
use crate::timer::calculate_timing;

/// Modem parameters of the FSK stage.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FskConfig {
    /// Samples per bit, the Goertzel window length.
    pub sample_size: usize,
    /// ADC sample rate in Hz.
    pub sample_rate: f32,
    /// Tone for a `0` bit in Hz.
    pub freq_0: f32,
    /// Tone for a `1` bit in Hz.
    pub freq_1: f32,
    /// Power both tones must stay under for a window to be treated as silence.
    pub power_threshold: f32,
    /// Search for the best window offset before each decision.
    pub align_windows: bool,
}

impl Default for FskConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLES_PER_BIT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            freq_0: DEFAULT_FREQ_0,
            freq_1: DEFAULT_FREQ_1,
            power_threshold: DEFAULT_POWER_THRESHOLD,
            align_windows: false,
        }
    }
}

impl FskConfig {
    /// Derives the sample rate and window length from a tone pair and baud rate.
    ///
    /// # Arguments
    /// - `freq_0`: tone for a `0` bit in Hz
    /// - `freq_1`: tone for a `1` bit in Hz
    /// - `baud_rate`: bits per second
    ///
    /// # Returns
    /// A configuration with the default power threshold and alignment off.
    ///
    /// # Errors
    /// [`Error::InvalidParameters`] if the plan is not realizable, see
    /// [`calculate_timing`].
    pub fn from_baud(freq_0: f32, freq_1: f32, baud_rate: u32) -> Result<Self> {
        let timing = calculate_timing(freq_0, freq_1, baud_rate)?;
        let config = Self {
            sample_size: timing.samples_per_bit,
            sample_rate: timing.sample_rate,
            freq_0,
            freq_1,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    /// [`Error::InvalidParameters`] if the window is empty or does not fit the
    /// sample queue, if the rate or a tone is not strictly positive, if the
    /// tones are equal, or if the threshold is negative.
    pub fn validate(&self) -> Result<()> {
        let needed = self.sample_size + self.search_span();
        if self.sample_size == 0
            || needed > SAMPLE_BUFFER_SIZE
            || !(self.sample_rate > 0.0)
            || !(self.freq_0 > 0.0)
            || !(self.freq_1 > 0.0)
            || self.freq_0 == self.freq_1
            || !(self.power_threshold >= 0.0)
        {
            return Err(Error::InvalidParameters);
        }
        Ok(())
    }

    /// Number of candidate offsets tried by the window alignment search.
    pub fn search_span(&self) -> usize {
        if self.align_windows {
            self.sample_size / 4
        } else {
            0
        }
    }
}

/// Operating state of the [`FskDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FskState {
    /// Fewer than one window of samples queued.
    #[default]
    Idle,
    /// At least one window queued, decisions pending.
    Decoding,
}

/// Sample-to-bit stage of the receive pipeline.
#[derive(Debug, Clone)]
pub struct FskDecoder {
    config: FskConfig,
    filter_0: Goertzel,
    filter_1: Goertzel,
    state: FskState,
    samples: RingBuffer<Sample, SAMPLE_BUFFER_SIZE>,
    bits: RingBuffer<bool, BIT_BUFFER_SIZE>,
    windows: u32,
    silent_windows: u32,
}

impl FskDecoder {
    /// Builds a decoder for `config`.
    ///
    /// # Errors
    /// [`Error::InvalidParameters`] if [`FskConfig::validate`] fails.
    pub fn new(config: FskConfig) -> Result<Self> {
        config.validate().inspect_err(|_| {
            error!(
                "invalid fsk config: sample_size={}, sample_rate={}, freq_0={}, freq_1={}",
                config.sample_size,
                config.sample_rate,
                config.freq_0,
                config.freq_1
            );
        })?;
        Ok(Self {
            config,
            filter_0: Goertzel::new(config.freq_0, config.sample_rate)?,
            filter_1: Goertzel::new(config.freq_1, config.sample_rate)?,
            state: FskState::Idle,
            samples: RingBuffer::new(),
            bits: RingBuffer::new(),
            windows: 0,
            silent_windows: 0,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &FskConfig {
        &self.config
    }

    /// Current operating state.
    pub fn state(&self) -> FskState {
        self.state
    }

    /// Number of windows evaluated since construction or the last reset.
    pub fn windows(&self) -> u32 {
        self.windows
    }

    /// Number of evaluated windows that were classified as silence.
    pub fn silent_windows(&self) -> u32 {
        self.silent_windows
    }

    /// Number of samples waiting to be decoded.
    pub fn pending_samples(&self) -> usize {
        self.samples.count()
    }

    /// Queues raw samples. When the queue is full the oldest samples are lost.
    pub fn push_samples(&mut self, samples: &[Sample]) {
        for &sample in samples {
            self.samples.push(sample);
        }
        if self.samples.count() >= self.window_requirement() {
            self.state = FskState::Decoding;
        }
    }

    /// The raw sample queue, for producers that fill it from DMA.
    #[cfg(feature = "dma")]
    pub fn sample_queue_mut(&mut self) -> &mut RingBuffer<Sample, SAMPLE_BUFFER_SIZE> {
        &mut self.samples
    }

    /// Classifies one window without touching the queues.
    ///
    /// # Returns
    /// - `Some(bit)` when at least one tone is above the threshold
    /// - `None` for silence
    ///
    /// # Errors
    /// [`Error::InvalidParameters`] on an empty window.
    pub fn decode_window(&self, window: &[Sample]) -> Result<Option<bool>> {
        if window.is_empty() {
            return Err(Error::InvalidParameters);
        }
        let power_0 = self.filter_0.power(window.iter().copied());
        let power_1 = self.filter_1.power(window.iter().copied());
        Ok(self.decide(power_0, power_1))
    }

    fn decide(&self, power_0: f32, power_1: f32) -> Option<bool> {
        let threshold = self.config.power_threshold;
        if power_0 < threshold && power_1 < threshold {
            None
        } else {
            Some(power_1 > power_0)
        }
    }

    fn window_requirement(&self) -> usize {
        self.config.sample_size + self.config.search_span()
    }

    fn window_powers(&self, offset: usize) -> (f32, f32) {
        let n = self.config.sample_size;
        let window = || self.samples.iter().skip(offset).take(n);
        (self.filter_0.power(window()), self.filter_1.power(window()))
    }

    fn best_offset(&self) -> usize {
        let mut best = 0;
        let mut best_separation = -1.0f32;
        for offset in 0..self.config.search_span() {
            let (power_0, power_1) = self.window_powers(offset);
            let separation = fabsf(power_1 - power_0);
            if separation > best_separation {
                best_separation = separation;
                best = offset;
            }
        }
        best
    }
}

impl Stage for FskDecoder {
    type Input = Sample;
    type Output = bool;

    fn accept(&mut self, item: Sample) {
        self.samples.push(item);
    }

    fn is_ready(&self) -> bool {
        !self.samples.is_full()
    }

    /// Evaluates at most one window, and only while the bit queue has room.
    fn task(&mut self) {
        if self.samples.count() < self.window_requirement() {
            self.state = FskState::Idle;
            return;
        }
        self.state = FskState::Decoding;
        if self.bits.is_full() {
            return;
        }

        if self.config.align_windows {
            let offset = self.best_offset();
            self.samples.discard(offset);
        }
        let (power_0, power_1) = self.window_powers(0);
        self.samples.discard(self.config.sample_size);
        self.windows = self.windows.wrapping_add(1);

        match self.decide(power_0, power_1) {
            Some(bit) => {
                trace!("fsk bit {} (p0={}, p1={})", bit, power_0, power_1);
                self.bits.push(bit);
            }
            None => {
                self.silent_windows = self.silent_windows.wrapping_add(1);
                debug!("fsk silence (p0={}, p1={})", power_0, power_1);
            }
        }

        if self.samples.count() < self.window_requirement() {
            self.state = FskState::Idle;
        }
    }

    fn take(&mut self) -> Option<bool> {
        self.bits.pop().ok()
    }

    fn is_idle(&self) -> bool {
        self.samples.count() < self.window_requirement() && self.bits.is_empty()
    }

    fn reset(&mut self) {
        self.samples.reset();
        self.bits.reset();
        self.state = FskState::Idle;
        self.windows = 0;
        self.silent_windows = 0;
    }
}

impl BitSource for FskDecoder {}
