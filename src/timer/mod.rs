//! Timing and scheduling utilities for the modem.
//!
//! The modem is poll driven: nothing blocks, and every stage advances a bounded
//! amount of work per [`Decoder::task`](crate::decoder::Decoder::task) call.
//! This module helps pick the sampling parameters and wire the poll loop to the
//! host:
//!
//! - [`calculate_timing`]: sample rate and window length for a tone pair and baud rate
//! - `run_until_idle`: `DelayNs` driven poll loop (feature `delay-loop`)
//! - `global_sample_queue_init`, `push_samples_from_isr` and
//!   `drain_sample_queue`: interrupt-safe sample hand-off (feature `timer-isr`)
//!
//! Common tone plans (sample rate = 3 x the higher tone):
//!
//! | freq_0 | freq_1 | Baud | Sample rate | Samples / bit |
//! |--------|--------|------|-------------|---------------|
//! |   1100 |   2200 |  100 |        6600 |            66 |
//! |   1200 |   2200 |  300 |        6600 |            22 |
//! |   1100 |   2200 |    8 |        6600 |           825 |

use libm::roundf;

use crate::error::{Error, Result};

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;

/// Oversampling factor applied to the highest tone.
pub const OVERSAMPLING: f32 = 3.0;

/// Sampling parameters for one tone plan.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FskTiming {
    /// ADC sample rate in Hz.
    pub sample_rate: f32,
    /// Samples per bit, the Goertzel window length.
    pub samples_per_bit: usize,
}

/// Computes the sample rate and samples-per-bit for a tone pair.
///
/// The sample rate is [`OVERSAMPLING`] times the higher tone; the window is the
/// number of samples in one bit period, rounded to the nearest sample.
///
/// # Arguments
/// - `freq_0`: tone for a `0` bit in Hz
/// - `freq_1`: tone for a `1` bit in Hz
/// - `baud_rate`: bits per second
///
/// # Errors
/// [`Error::InvalidParameters`] for non-positive values, equal tones, or a baud
/// rate so high that a bit would be shorter than one sample.
pub fn calculate_timing(freq_0: f32, freq_1: f32, baud_rate: u32) -> Result<FskTiming> {
    if !(freq_0 > 0.0) || !(freq_1 > 0.0) || freq_0 == freq_1 || baud_rate == 0 {
        return Err(Error::InvalidParameters);
    }
    let sample_rate = freq_0.max(freq_1) * OVERSAMPLING;
    let samples_per_bit = roundf(sample_rate / baud_rate as f32) as usize;
    if samples_per_bit == 0 {
        return Err(Error::InvalidParameters);
    }
    Ok(FskTiming {
        sample_rate,
        samples_per_bit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{
        DEFAULT_BAUD_RATE, DEFAULT_FREQ_0, DEFAULT_FREQ_1, DEFAULT_SAMPLE_RATE,
        DEFAULT_SAMPLES_PER_BIT,
    };

    #[test]
    fn test_default_plan() {
        let timing = calculate_timing(DEFAULT_FREQ_0, DEFAULT_FREQ_1, DEFAULT_BAUD_RATE).unwrap();
        assert_eq!(timing.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(timing.samples_per_bit, DEFAULT_SAMPLES_PER_BIT);
    }

    #[test]
    fn test_order_of_tones_does_not_matter() {
        let a = calculate_timing(1200.0, 2200.0, 300).unwrap();
        let b = calculate_timing(2200.0, 1200.0, 300).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.samples_per_bit, 22);
    }

    #[test]
    fn test_rejects_bad_plans() {
        assert_eq!(calculate_timing(0.0, 2200.0, 100), Err(Error::InvalidParameters));
        assert_eq!(calculate_timing(1100.0, 1100.0, 100), Err(Error::InvalidParameters));
        assert_eq!(calculate_timing(1100.0, 2200.0, 0), Err(Error::InvalidParameters));
        assert_eq!(
            calculate_timing(1100.0, 2200.0, 1_000_000),
            Err(Error::InvalidParameters)
        );
    }
}
