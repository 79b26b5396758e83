//! Signaling adapters.
//!
//! The real transport (a hosted realtime service, a WebSocket relay, ...) is
//! supplied by the host application and implements
//! [`SignalingPort`](crate::application::session_facade::SignalingPort).
//! This crate ships [`loopback::LoopbackHub`], an in-process implementation
//! used by tests and the rehearsal binary.

pub mod loopback;
