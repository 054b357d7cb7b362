//! High-level components of the VLCB node: CAN transport, CANID management,
//! service registry, message dispatch, timed responses and built-in services.
pub mod dispatch;
pub mod managment;
pub mod service;
pub mod services;
pub mod timed_response;
pub mod transport;
