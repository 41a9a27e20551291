use crate::decoder::Decoder;
use crate::stage::{BitSource, ByteSource, FrameSource};
use embedded_hal::delay::DelayNs;

/// Runs a blocking loop that ticks the decoder until it has no pending work.
///
/// This is a simple polling loop for environments where interrupts are
/// unavailable or undesired. A delay of `tick_us` microseconds separates two
/// ticks, leaving the sample producer time to refill the queue.
///
/// # Arguments
/// - `decoder`: the receive pipeline to drive
/// - `delay`: a delay provider implementing [`DelayNs`], typically from the HAL
/// - `tick_us`: delay between two ticks, in microseconds
/// - `max_ticks`: upper bound on the number of ticks
///
/// # Returns
/// The number of ticks run. Equal to `max_ticks` when the decoder was still
/// busy at the end.
///
/// # Example
/// ```rust
/// use embedded_hal_mock::eh1::delay::NoopDelay;
/// use peregrine::decoder::Decoder;
/// use peregrine::timer::run_until_idle;
///
/// let mut decoder = Decoder::with_defaults().unwrap();
/// decoder.init();
/// decoder.process_samples(&[2048; 132]).unwrap();
/// let ticks = run_until_idle(&mut decoder, &mut NoopDelay::new(), 150, 1_000);
/// assert!(ticks < 1_000);
/// ```
pub fn run_until_idle<D, B, Y, F>(
    decoder: &mut Decoder<B, Y, F>,
    delay: &mut D,
    tick_us: u32,
    max_ticks: u32,
) -> u32
where
    D: DelayNs,
    B: BitSource,
    Y: ByteSource,
    F: FrameSource,
{
    for tick in 0..max_ticks {
        decoder.task();
        if !decoder.is_busy() {
            return tick + 1;
        }
        delay.delay_us(tick_us);
    }
    max_ticks
}
