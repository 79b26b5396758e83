//! # mentor-core
//!
//! Shared library for mentor remote assistance containing the signaling
//! message catalogue, the control-channel codec, the consent state machine,
//! and the target descriptors used to replay input across clients.
//!
//! This crate is used by both roles of the session runtime.
//! It has zero dependencies on UI frameworks, media stacks, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! Mentor remote assistance lets a trusted adult (the "mentor") help a child
//! who is using the same application on another machine.  The mentor can
//! either mirror interactions inside the shared application (clicks and text
//! input replayed against the child's UI) or fully operate the child's screen
//! through a peer-to-peer video channel.  Nothing happens on the child's side
//! until the child has explicitly accepted control.
//!
//! This crate (`mentor-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – What travels between the two clients.  Signaling
//!   messages (`control:request`, `cursor:move`, ...) are JSON envelopes;
//!   remote-desktop control frames use a compact binary format (24-byte
//!   header + payload) on an ordered data channel.
//!
//! - **`domain`** – Pure rules with no I/O.  The most important piece is the
//!   `ControlSession`: the single-slot consent state machine that gates every
//!   cross-client side effect.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mentor_core::ControlSession` instead of the full module path.
pub use domain::cursor::{GhostCursor, CURSOR_TIMEOUT};
pub use domain::geometry::{scale_to_source, GeometryError, Rect, Size};
pub use domain::handshake::{ControlRequest, ControlSession, ControlState, HandshakeError};
pub use domain::roles::{Peer, PeerId, Role};
pub use domain::target::{ElementInfo, FieldInfo, TargetDescriptor};
pub use protocol::codec::{
    decode_frame, decode_signal, encode_frame, encode_signal, CodecError, DecodedFrame, Envelope,
};
pub use protocol::messages::{
    ControlFrame, EventKind, Mission, Modifier, ModifierSet, MouseButton, SignalMessage,
};
pub use protocol::sequence::{SequenceCounter, SequenceGuard};
