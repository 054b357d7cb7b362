//! Services shipped with the core. Applications register their own
//! services (NV, event teach, producer, consumer, ...) next to these.
pub mod can_service;
