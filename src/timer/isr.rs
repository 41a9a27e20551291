use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::goertzel::Sample;
use crate::ring::RingBuffer;
use crate::stage::{BitSource, ByteSource, FrameSource};
use core::cell::RefCell;
use critical_section::Mutex;

/// A sample queue shared between an ADC interrupt and the poll loop.
pub type SampleQueue<const N: usize> = Mutex<RefCell<Option<RingBuffer<Sample, N>>>>;

/// Used to initialize a global static sample queue for use with
/// `critical_section`.
///
/// # Returns
/// * An empty queue slot; fill it with [`global_sample_queue_setup`]
///
/// # Example
/// ```rust
/// use peregrine::timer::{global_sample_queue_init, SampleQueue};
///
/// static SAMPLES: SampleQueue<256> = global_sample_queue_init();
/// ```
pub const fn global_sample_queue_init<const N: usize>() -> SampleQueue<N> {
    Mutex::new(RefCell::new(None))
}

/// Creates the ring buffer behind a global sample queue.
///
/// Calling it again discards every queued sample.
///
/// # Arguments
/// * The global static sample queue
///
/// # Example
/// ```rust
/// use peregrine::timer::{global_sample_queue_init, global_sample_queue_setup, SampleQueue};
///
/// static SAMPLES: SampleQueue<256> = global_sample_queue_init();
///
/// global_sample_queue_setup(&SAMPLES);
/// ```
pub fn global_sample_queue_setup<const N: usize>(queue: &'static SampleQueue<N>) {
    critical_section::with(|cs| {
        let _ = queue.borrow(cs).replace(Some(RingBuffer::new()));
    });
}

/// Pushes samples from the ADC interrupt.
///
/// When the queue is full the oldest samples are overwritten.
///
/// # Arguments
/// * The global static sample queue
/// * The samples read since the last interrupt
///
/// # Errors
/// [`Error::Uninitialized`] if [`global_sample_queue_setup`] was not called.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn ADC1() {
///     let sample = adc.read();
///     let _ = push_samples_from_isr(&SAMPLES, &[sample]);
/// }
/// ```
pub fn push_samples_from_isr<const N: usize>(
    queue: &'static SampleQueue<N>,
    samples: &[Sample],
) -> Result<()> {
    critical_section::with(|cs| {
        let mut slot = queue.borrow(cs).borrow_mut();
        let ring = slot.as_mut().ok_or(Error::Uninitialized)?;
        for &sample in samples {
            ring.push(sample);
        }
        Ok(())
    })
}

/// Moves every queued sample into the decoder.
///
/// Each sample is taken in its own critical section, so the interrupt is
/// never held off for the whole drain.
///
/// # Returns
/// The number of samples moved.
///
/// # Errors
/// - [`Error::Uninitialized`] if the queue was not set up
/// - any error of [`Decoder::process_samples`]
pub fn drain_sample_queue<const N: usize, B, Y, F>(
    queue: &'static SampleQueue<N>,
    decoder: &mut Decoder<B, Y, F>,
) -> Result<usize>
where
    B: BitSource,
    Y: ByteSource,
    F: FrameSource,
{
    let mut moved = 0;
    loop {
        let next = critical_section::with(|cs| {
            queue
                .borrow(cs)
                .borrow_mut()
                .as_mut()
                .map(|ring| ring.pop().ok())
        });
        match next {
            None => return Err(Error::Uninitialized),
            Some(None) => return Ok(moved),
            Some(Some(sample)) => {
                decoder.process_samples(core::slice::from_ref(&sample))?;
                moved += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SAMPLE_BIAS;

    static QUEUE: SampleQueue<128> = global_sample_queue_init();
    static UNSET: SampleQueue<8> = global_sample_queue_init();

    crate::init_sample_queue!(MACRO_QUEUE, 16);

    #[test]
    fn test_isr_to_decoder() {
        global_sample_queue_setup(&QUEUE);
        let mut decoder = Decoder::with_defaults().unwrap();
        decoder.init();

        push_samples_from_isr(&QUEUE, &[SAMPLE_BIAS; 66]).unwrap();
        assert_eq!(drain_sample_queue(&QUEUE, &mut decoder), Ok(66));
        assert_eq!(drain_sample_queue(&QUEUE, &mut decoder), Ok(0));
        decoder.task();
        assert_eq!(decoder.bit_stage().windows(), 1);
    }

    #[test]
    fn test_unset_queue() {
        let mut decoder = Decoder::with_defaults().unwrap();
        decoder.init();
        assert_eq!(push_samples_from_isr(&UNSET, &[1]), Err(Error::Uninitialized));
        assert_eq!(
            drain_sample_queue(&UNSET, &mut decoder),
            Err(Error::Uninitialized)
        );
    }

    #[test]
    fn test_macro_declared_queue_overwrites() {
        global_sample_queue_setup(&MACRO_QUEUE);
        let samples: Vec<Sample> = (0..20).collect();
        push_samples_from_isr(&MACRO_QUEUE, &samples).unwrap();

        let mut decoder = Decoder::with_defaults().unwrap();
        decoder.init();
        assert_eq!(drain_sample_queue(&MACRO_QUEUE, &mut decoder), Ok(16));
        assert_eq!(decoder.bit_stage().pending_samples(), 16);
    }
}
