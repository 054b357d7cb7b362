//! CAN diagnostic counters, shared between interrupt context and the poll
//! loop behind a critical-section mutex.
use core::cell::Cell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

use crate::core::DiagnosticValue;

/// Number of CAN diagnostics reported by the CAN service.
pub const CAN_DIAGNOSTIC_COUNT: usize = 16;

/// Diagnostic categories, in `DGN` index order (index = discriminant + 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CanDiagnostic {
    RxErrors = 0,
    TxErrors,
    Status,
    TxBufferUsage,
    TxBufferOverrun,
    TxMessages,
    RxBufferUsage,
    RxBufferOverrun,
    RxMessages,
    ErrorFramesDetected,
    ErrorFramesGenerated,
    LostArbitration,
    CanIdEnumerations,
    CanIdConflicts,
    CanIdChanges,
    CanIdEnumerationFailures,
}

impl CanDiagnostic {
    pub const fn slot(self) -> usize {
        self as usize
    }

    /// Category reported at `DGN` index `index` (1-based).
    pub const fn from_index(index: u8) -> Option<Self> {
        use CanDiagnostic::*;
        Some(match index {
            1 => RxErrors,
            2 => TxErrors,
            3 => Status,
            4 => TxBufferUsage,
            5 => TxBufferOverrun,
            6 => TxMessages,
            7 => RxBufferUsage,
            8 => RxBufferOverrun,
            9 => RxMessages,
            10 => ErrorFramesDetected,
            11 => ErrorFramesGenerated,
            12 => LostArbitration,
            13 => CanIdEnumerations,
            14 => CanIdConflicts,
            15 => CanIdChanges,
            16 => CanIdEnumerationFailures,
            _ => return None,
        })
    }
}

/// Counter block. Every access is one short critical section, so an
/// interrupt can never observe a half-updated counter.
pub struct CanDiagnostics {
    counters: Mutex<CriticalSectionRawMutex, Cell<[u16; CAN_DIAGNOSTIC_COUNT]>>,
}

impl Default for CanDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl CanDiagnostics {
    pub const fn new() -> Self {
        Self {
            counters: Mutex::new(Cell::new([0; CAN_DIAGNOSTIC_COUNT])),
        }
    }

    /// Add one to a counter, saturating at `u16::MAX`.
    pub fn increment(&self, diagnostic: CanDiagnostic) {
        self.update(diagnostic, |value| value.saturating_add(1));
    }

    /// Overwrite a gauge such as buffer usage.
    pub fn set(&self, diagnostic: CanDiagnostic, value: u16) {
        self.update(diagnostic, |_| value);
    }

    pub fn get(&self, diagnostic: CanDiagnostic) -> u16 {
        self.counters
            .lock(|counters| counters.get()[diagnostic.slot()])
    }

    /// Value at `DGN` index `index` (1-based); `None` outside `1..=16`.
    pub fn value(&self, index: u8) -> Option<DiagnosticValue> {
        CanDiagnostic::from_index(index).map(|diagnostic| DiagnosticValue(self.get(diagnostic)))
    }

    pub fn snapshot(&self) -> [u16; CAN_DIAGNOSTIC_COUNT] {
        self.counters.lock(|counters| counters.get())
    }

    /// Clear every counter. Only a factory reset does this.
    pub fn reset(&self) {
        self.counters
            .lock(|counters| counters.set([0; CAN_DIAGNOSTIC_COUNT]));
    }

    fn update(&self, diagnostic: CanDiagnostic, f: impl FnOnce(u16) -> u16) {
        self.counters.lock(|counters| {
            let mut values = counters.get();
            values[diagnostic.slot()] = f(values[diagnostic.slot()]);
            counters.set(values);
        });
    }
}
