//! Monotonic time source read by the poll loop.
use embassy_time::Instant;

/// Clock abstraction so deadlines can be driven by tests.
pub trait TickClock {
    fn now(&self) -> Instant;
}

/// Clock backed by the embassy time driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TickClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: TickClock + ?Sized> TickClock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
