//! CANID lifecycle: ownership of the current identifier, conflict
//! detection and the self-enumeration state machine.
//!
//! The manager never touches the bus itself. [`CanIdManager::on_frame`] and
//! [`CanIdManager::poll`] return what the transport has to do, so the whole
//! protocol runs from the cooperative poll loop:
//!
//! 1. A conflict (a data frame sourced from our CANID) moves the manager to
//!    `Required` and starts the holdoff. Hearing another node's enumeration
//!    request restarts the holdoff.
//! 2. When the holdoff expires the manager asks for an enumeration request
//!    (zero-length RTR) to be sent, then records every CANID heard during
//!    the listening window.
//! 3. When the window closes, the lowest free identifier is claimed; if none
//!    is free the configured default is adopted.
use embassy_time::{Duration, Instant};

use crate::protocol::managment::enumeration::{CanIdResult, EnumerationBitmap};
use crate::protocol::transport::{
    can_frame::CanFrame,
    can_id::CanId,
    can_link::diagnostics::{CanDiagnostic, CanDiagnostics},
    TransportConfig,
};

/// Enumeration progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnumerationState {
    /// Holding a CANID, nothing pending.
    Idle,
    /// Enumeration scheduled once the holdoff since `since` has elapsed.
    Required { since: Instant },
    /// Request sent (or waiting to be sent, `deadline == None`); listening.
    InProgress { deadline: Option<Instant> },
}

/// What the transport must do with a received frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameVerdict {
    /// Application traffic: hand it to the dispatcher.
    Deliver,
    /// Enumeration traffic already accounted for.
    Consumed,
    /// Enumeration request: answer with a zero-length frame carrying our CANID.
    Answer(CanId),
}

/// What the transport must do on this poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnumerationStep {
    Nothing,
    /// Transmit an enumeration request sourced from `source`, then call
    /// [`CanIdManager::request_sent`].
    SendRequest { source: u8 },
    /// The listening window closed with this result.
    Finished(CanIdResult),
}

/// CANID owner and enumeration state machine.
#[derive(Debug)]
pub struct CanIdManager {
    current: Option<CanId>,
    state: EnumerationState,
    seen: EnumerationBitmap,
    holdoff: Duration,
    window: Duration,
    fallback: Option<CanId>,
    max_enumerated: u8,
}

impl CanIdManager {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            current: None,
            state: EnumerationState::Idle,
            seen: EnumerationBitmap::new(),
            holdoff: config.holdoff(),
            window: config.enumeration_timeout,
            fallback: CanId::new(config.default_can_id).ok(),
            max_enumerated: config.max_enumerated_can_id,
        }
    }

    pub fn current(&self) -> Option<CanId> {
        self.current
    }

    pub fn state(&self) -> EnumerationState {
        self.state
    }

    pub fn is_enumerating(&self) -> bool {
        self.state != EnumerationState::Idle
    }

    /// Application frames may only leave with an owned CANID and outside the
    /// listening window.
    pub fn can_transmit(&self) -> bool {
        self.current.is_some() && !matches!(self.state, EnumerationState::InProgress { .. })
    }

    /// Adopt `can_id` and abandon any pending enumeration.
    pub fn assign(&mut self, can_id: CanId) {
        self.current = Some(can_id);
        self.state = EnumerationState::Idle;
    }

    /// Drop the current CANID (factory reset).
    pub fn forget(&mut self) {
        self.current = None;
    }

    /// Open a new enumeration window right away.
    pub fn start(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("Starting CANID enumeration");

        self.seen.clear();
        self.state = EnumerationState::InProgress { deadline: None };
    }

    /// Schedule an enumeration after the holdoff, unless one is already pending.
    pub fn schedule(&mut self, now: Instant) {
        if self.state == EnumerationState::Idle {
            self.state = EnumerationState::Required { since: now };
        }
    }

    /// The enumeration request left the node: the listening window starts now.
    pub fn request_sent(&mut self, now: Instant) {
        if let EnumerationState::InProgress { deadline } = &mut self.state {
            if deadline.is_none() {
                *deadline = Some(now + self.window);
            }
        }
    }

    /// Apply the enumeration rules to a received frame.
    pub fn on_frame(
        &mut self,
        frame: &CanFrame,
        now: Instant,
        diagnostics: &CanDiagnostics,
    ) -> FrameVerdict {
        let source = frame.id.source();

        match self.state {
            EnumerationState::InProgress { .. } => self.seen.mark(source),
            EnumerationState::Required { .. } => {
                if frame.rtr {
                    // Another node is enumerating: let it finish first.
                    self.state = EnumerationState::Required { since: now };
                }
            }
            EnumerationState::Idle => {
                if !frame.rtr && self.current.map(CanId::get) == Some(source) {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("CANID conflict detected on {}", source);

                    diagnostics.increment(CanDiagnostic::CanIdConflicts);
                    self.state = EnumerationState::Required { since: now };
                }
            }
        }

        if frame.rtr {
            match self.current {
                Some(can_id) => FrameVerdict::Answer(can_id),
                None => FrameVerdict::Consumed,
            }
        } else if frame.len == 0 {
            FrameVerdict::Consumed
        } else {
            FrameVerdict::Deliver
        }
    }

    /// Advance timers.
    pub fn poll(&mut self, now: Instant, diagnostics: &CanDiagnostics) -> EnumerationStep {
        match self.state {
            EnumerationState::Idle => EnumerationStep::Nothing,
            EnumerationState::Required { since } => {
                if now >= since + self.holdoff {
                    self.start();
                    EnumerationStep::SendRequest {
                        source: self.request_source(),
                    }
                } else {
                    EnumerationStep::Nothing
                }
            }
            EnumerationState::InProgress { deadline: None } => EnumerationStep::SendRequest {
                source: self.request_source(),
            },
            EnumerationState::InProgress {
                deadline: Some(deadline),
            } => {
                if now >= deadline {
                    EnumerationStep::Finished(self.finish(diagnostics))
                } else {
                    EnumerationStep::Nothing
                }
            }
        }
    }

    fn request_source(&self) -> u8 {
        self.current.map_or(0, CanId::get)
    }

    fn finish(&mut self, diagnostics: &CanDiagnostics) -> CanIdResult {
        let result = self.seen.lowest_free(self.max_enumerated);
        self.state = EnumerationState::Idle;

        match result {
            CanIdResult::Ok(can_id) => {
                #[cfg(feature = "defmt")]
                defmt::info!("Enumeration claimed CANID {}", can_id.get());

                diagnostics.increment(CanDiagnostic::CanIdEnumerations);
                diagnostics.increment(CanDiagnostic::CanIdChanges);
                self.current = Some(can_id);
            }
            CanIdResult::Fail => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Enumeration failed, no free CANID");

                diagnostics.increment(CanDiagnostic::CanIdEnumerationFailures);
                self.current = self.fallback;
            }
        }
        result
    }
}
