/// Declares a static global sample queue protected by a `critical_section` mutex.
///
/// This macro creates a `static` [`SampleQueue`](crate::timer::SampleQueue)
/// suitable for interrupt-based environments, where the ADC interrupt pushes
/// samples and the poll loop drains them into the decoder.
///
/// # Arguments
/// - `$name`: name of the static
/// - `$n`: queue capacity in samples
///
/// # Example
/// ```rust
/// use peregrine::timer::global_sample_queue_setup;
///
/// peregrine::init_sample_queue!(SAMPLES, 256);
///
/// global_sample_queue_setup(&SAMPLES);
/// ```
///
/// # Notes
/// - Fill the slot with [`global_sample_queue_setup`](crate::timer::global_sample_queue_setup)
///   before the interrupt is enabled.
#[macro_export]
macro_rules! init_sample_queue {
    ( $name:ident, $n:expr ) => {
        pub static $name: $crate::timer::SampleQueue<{ $n }> =
            $crate::timer::global_sample_queue_init();
    };
}
