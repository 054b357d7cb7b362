//! Byte-addressed non-volatile storage used to persist the CANID.
use crate::error::NvmError;

/// Opaque location inside the non-volatile store.
pub type FlashAddress = u32;

/// Key-value byte store. Implementations handle page buffering and erase
/// cycles; the core only reads and writes single bytes.
pub trait NvStore {
    fn read(&self, address: FlashAddress) -> Result<u8, NvmError>;
    fn write(&mut self, address: FlashAddress, value: u8) -> Result<(), NvmError>;
}
