//! Async driver for firmware running an executor.
//!
//! The dispatcher is purely poll based; [`Runner`] calls it at a fixed
//! period, sleeping on a [`PollTimer`] in between, until a caller supplied
//! future resolves.
use core::future::Future;

use futures_util::{future::select, future::Either, pin_mut};

use crate::protocol::dispatch::{DispatchOutcome, Dispatcher};
use crate::protocol::transport::traits::{
    clock::TickClock, poll_timer::PollTimer, transport::Transport,
};

/// Default poll period (ms).
pub const POLL_PERIOD_MS: u32 = 1;

/// Received messages handled back to back before the runner sleeps again.
pub const MAX_MESSAGES_PER_TICK: usize = 8;

/// Periodic driver borrowing a [`Dispatcher`].
pub struct Runner<'d, 'a, T, K, P, const N: usize>
where
    T: Transport,
    K: TickClock,
    P: PollTimer,
{
    dispatcher: &'d mut Dispatcher<'a, T, K, N>,
    timer: P,
    period_ms: u32,
}

impl<'d, 'a, T, K, P, const N: usize> Runner<'d, 'a, T, K, P, N>
where
    T: Transport,
    K: TickClock,
    P: PollTimer,
{
    pub fn new(dispatcher: &'d mut Dispatcher<'a, T, K, N>, timer: P) -> Self {
        Self {
            dispatcher,
            timer,
            period_ms: POLL_PERIOD_MS,
        }
    }

    pub fn with_period(mut self, period_ms: u32) -> Self {
        self.period_ms = period_ms.max(1);
        self
    }

    /// Run dispatch cycles until `stop` completes, returning its output.
    ///
    /// A cycle that delivered a message is followed immediately by another,
    /// up to [`MAX_MESSAGES_PER_TICK`], so a burst of traffic does not wait
    /// one period per frame.
    pub async fn drive_until<F: Future>(&mut self, stop: F) -> F::Output {
        pin_mut!(stop);

        loop {
            for _ in 0..MAX_MESSAGES_PER_TICK {
                if self.dispatcher.poll() == DispatchOutcome::Idle {
                    break;
                }
            }

            let tick = self.timer.delay_ms(self.period_ms);
            pin_mut!(tick);

            match select(stop.as_mut(), tick).await {
                Either::Left((output, _pending_tick)) => return output,
                Either::Right(((), _)) => {}
            }
        }
    }

    pub fn dispatcher(&mut self) -> &mut Dispatcher<'a, T, K, N> {
        &mut *self.dispatcher
    }
}
