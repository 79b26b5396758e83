//! Peer-to-peer media adapters.
//!
//! The production connector wraps the host platform's WebRTC stack; its
//! offer/answer exchange is outside this crate.  [`mock`] provides in-memory
//! stand-ins that record what the bridge did so tests and the rehearsal
//! binary can run without cameras or network.

pub mod mock;
