//! Asynchronous timer abstraction pacing the async runner.

/// Async delay pacing the runner between poll ticks.
pub trait PollTimer {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl core::future::Future<Output = ()> + 'a;
}

/// Timer backed by `embassy_time::Timer`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyTimer;

impl PollTimer for EmbassyTimer {
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl core::future::Future<Output = ()> + 'a {
        embassy_time::Timer::after_millis(millis as u64)
    }
}
