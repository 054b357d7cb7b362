//! State shared between the CAN interrupt and the poll loop.
//!
//! The interrupt is the single producer of the receive queue and the poll
//! loop its single consumer. Both sides also bump the diagnostic counters.
//! Every shared access goes through a critical section provided by
//! [`CriticalSectionRawMutex`], so a `CanLink` can live in a `static`:
//!
//! ```rust,ignore
//! static LINK: CanLink<16> = CanLink::new();
//! ```

pub mod diagnostics;

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embedded_can::ErrorKind;

use crate::protocol::transport::can_frame::CanFrame;
use diagnostics::{CanDiagnostic, CanDiagnostics};

/// Bounded receive queue plus diagnostic counters.
pub struct CanLink<const RX: usize> {
    rx: Channel<CriticalSectionRawMutex, CanFrame, RX>,
    diagnostics: CanDiagnostics,
}

impl<const RX: usize> Default for CanLink<RX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const RX: usize> CanLink<RX> {
    pub const fn new() -> Self {
        Self {
            rx: Channel::new(),
            diagnostics: CanDiagnostics::new(),
        }
    }

    /// Producer side: queue a frame received from the controller.
    ///
    /// A full queue keeps its existing frames untouched and drops `frame`.
    /// Returns `false` in that case.
    pub fn push_received(&self, frame: CanFrame) -> bool {
        self.diagnostics.increment(CanDiagnostic::RxMessages);
        match self.rx.try_send(frame) {
            Ok(()) => {
                self.update_rx_usage();
                true
            }
            Err(_) => {
                self.diagnostics.increment(CanDiagnostic::RxBufferOverrun);
                #[cfg(feature = "defmt")]
                defmt::warn!("CAN receive queue overrun, frame dropped");
                false
            }
        }
    }

    /// Producer side: account for a controller receive error.
    pub fn record_rx_error(&self, error: ErrorKind) {
        match error {
            ErrorKind::Overrun => self.diagnostics.increment(CanDiagnostic::RxBufferOverrun),
            _ => {
                self.diagnostics.increment(CanDiagnostic::RxErrors);
                self.diagnostics
                    .increment(CanDiagnostic::ErrorFramesDetected);
            }
        }
    }

    /// Consumer side: oldest queued frame.
    pub fn pop_received(&self) -> Option<CanFrame> {
        let frame = self.rx.try_receive().ok();
        if frame.is_some() {
            self.update_rx_usage();
        }
        frame
    }

    /// Frames currently waiting in the receive queue.
    pub fn rx_usage(&self) -> usize {
        self.rx.len()
    }

    pub fn diagnostics(&self) -> &CanDiagnostics {
        &self.diagnostics
    }

    fn update_rx_usage(&self) {
        self.diagnostics
            .set(CanDiagnostic::RxBufferUsage, self.rx.len() as u16);
    }
}
