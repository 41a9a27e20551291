//! Single-bin tone energy detection (Goertzel algorithm).
//!
//! The Goertzel recursion evaluates the power of one DFT bin in `O(n)` with a
//! single multiply per sample:
//!
//! ```text
//! k    = 2 * cos(2π * target_freq / sample_rate)
//! s[i] = x[i] + k * s[i-1] - s[i-2]
//! P    = s[n-1]² + s[n-2]² - k * s[n-1] * s[n-2]
//! ```
//!
//! Both functions here are pure, so the FSK stage runs them twice over the same
//! window (once per candidate tone) without copying it.

use core::f32::consts::PI;

use libm::cosf;

use crate::error::{Error, Result};

/// One ADC reading of the biased sine wave.
pub type Sample = u16;

/// A Goertzel filter tuned to one frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Goertzel {
    coeff: f32,
}

impl Goertzel {
    /// Tunes a filter to `target_freq` for samples taken at `sample_rate`.
    ///
    /// # Errors
    /// [`Error::InvalidParameters`] if either value is not strictly positive.
    pub fn new(target_freq: f32, sample_rate: f32) -> Result<Self> {
        if !(sample_rate > 0.0) || !(target_freq > 0.0) {
            error!(
                "invalid goertzel parameters: target_freq={}, sample_rate={}",
                target_freq,
                sample_rate
            );
            return Err(Error::InvalidParameters);
        }
        let normalized = target_freq / sample_rate;
        Ok(Self {
            coeff: 2.0 * cosf(2.0 * PI * normalized),
        })
    }

    /// Runs the recursion over `samples` and returns the bin power.
    ///
    /// An empty input yields `0.0`.
    pub fn power<I>(&self, samples: I) -> f32
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut s_prev = 0.0f32;
        let mut s_prev2 = 0.0f32;
        for sample in samples {
            let s = sample as f32 + self.coeff * s_prev - s_prev2;
            s_prev2 = s_prev;
            s_prev = s;
        }
        s_prev2 * s_prev2 + s_prev * s_prev - self.coeff * s_prev * s_prev2
    }
}

/// Computes the power of `target_freq` over a window of samples.
///
/// # Errors
/// [`Error::InvalidParameters`] when `samples` is empty or either frequency
/// argument is not strictly positive.
pub fn compute_power(samples: &[Sample], target_freq: f32, sample_rate: f32) -> Result<f32> {
    if samples.is_empty() {
        error!("goertzel called with an empty window");
        return Err(Error::InvalidParameters);
    }
    let filter = Goertzel::new(target_freq, sample_rate)?;
    Ok(filter.power(samples.iter().copied()))
}
