//! Infrastructure layer for the session runtime.
//!
//! Contains the adapters behind the application seams: the signaling
//! channel, the peer-to-peer media stand-ins, the document surface, and
//! file-system storage for the configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mentor_core`, but MUST NOT be imported by the `application` or domain
//! layers outside of tests.

pub mod peer;
pub mod signaling;
pub mod storage;
pub mod surface;
