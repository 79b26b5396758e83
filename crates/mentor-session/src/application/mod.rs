//! Application layer use cases for the session runtime.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `mentor_core`) and the infrastructure (signaling
//! transports, media stacks, the host UI).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "replay the
//!   mentor's click on the child's screen, but only after consent").
//! - **Depend on abstractions** (traits such as `SignalingPort`,
//!   `DocumentSurface`, `PeerConnector`) rather than concrete adapters.
//! - **Contain no network or file I/O of their own**.
//!
//! # Sub-modules
//!
//! - **`peer_directory`**    – Counterparts visible on the signaling channel.
//! - **`control_handshake`** – The request/accept/reject/release consent
//!   protocol.  Every cross-client side effect is gated on its state.
//! - **`input_mirror`**      – Mentor-side capture (throttle, selectors,
//!   mode diffing) and child-side replay.
//! - **`cursor_presence`**   – The ghost cursor and its inactivity countdown.
//! - **`remote_desktop`**    – Full desktop control over a peer-to-peer link
//!   with per-event coordinate scaling.
//! - **`session_facade`**    – The role-aware entry point composing all of
//!   the above.

pub mod control_handshake;
pub mod cursor_presence;
pub mod input_mirror;
pub mod peer_directory;
pub mod remote_desktop;
pub mod session_facade;
