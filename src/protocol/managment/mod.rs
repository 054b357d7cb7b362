//! Network management logic: CANID ownership, conflict detection and
//! self-enumeration.
pub mod can_id_manager;
pub mod enumeration;
