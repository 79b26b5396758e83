//! The control handshake: a single-slot consent state machine.
//!
//! Each client holds its own authoritative `ControlSession`.  The two copies
//! are driven into agreement purely by the messages exchanged over the
//! signaling channel, so they may briefly diverge for one round-trip.
//!
//! ```text
//!            request              accept
//!   Idle ─────────────► Requested ───────► Active
//!    ▲  ◄───────────────────┘                │
//!    │     reject / release / reset          │
//!    └───────────────────────────────────────┘
//!                 release / reset
//! ```
//!
//! A second request while `Requested` replaces the pending one (same slot, new
//! payload).  There is no request queue and no automatic expiry.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::domain::roles::PeerId;

/// Current consent state of a control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    #[default]
    Idle,
    Requested,
    Active,
}

/// Payload carried by a `control:request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Unique identifier of this particular request.
    pub request_id: Uuid,
    /// Display name of the requesting mentor, shown in the consent prompt.
    pub mentor_name: String,
    /// Optional free-text reason shown to the child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ControlRequest {
    pub fn new(mentor_name: impl Into<String>, note: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            mentor_name: mentor_name.into(),
            note,
        }
    }
}

/// Errors returned by an illegal handshake transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// Accept or reject was attempted without a pending request.
    #[error("no pending control request (state is {0:?})")]
    NotRequested(ControlState),

    /// A message arrived from a peer that is not the session counterpart.
    #[error("peer {actual} is not the session counterpart")]
    UnexpectedPeer { actual: PeerId },

    /// A request arrived while another session is already active.
    #[error("control is already active with {0}")]
    AlreadyActive(PeerId),
}

/// One side's view of the control relationship with a single counterpart.
#[derive(Debug, Clone, Default)]
pub struct ControlSession {
    state: ControlState,
    counterpart: Option<PeerId>,
    pending: Option<ControlRequest>,
}

impl ControlSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ControlState::Active
    }

    pub fn is_requested(&self) -> bool {
        self.state == ControlState::Requested
    }

    /// The peer on the other end of the session, if any.
    pub fn counterpart(&self) -> Option<PeerId> {
        self.counterpart
    }

    /// The request currently awaiting an answer.
    pub fn pending_request(&self) -> Option<&ControlRequest> {
        self.pending.as_ref()
    }

    /// Returns `true` when `peer` is the counterpart of an active session.
    pub fn is_active_with(&self, peer: PeerId) -> bool {
        self.is_active() && self.counterpart == Some(peer)
    }

    /// Moves to `Requested`, replacing any pending request.
    ///
    /// Returns the superseded request, if there was one.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::AlreadyActive`] while a session is active.
    pub fn request(
        &mut self,
        peer: PeerId,
        request: ControlRequest,
    ) -> Result<Option<ControlRequest>, HandshakeError> {
        if let (ControlState::Active, Some(current)) = (self.state, self.counterpart) {
            return Err(HandshakeError::AlreadyActive(current));
        }
        self.state = ControlState::Requested;
        self.counterpart = Some(peer);
        let superseded = self.pending.replace(request);
        if let Some(old) = &superseded {
            debug!(request_id = %old.request_id, mentor = %peer, "pending control request replaced");
        }
        Ok(superseded)
    }

    /// Moves a pending request to `Active`.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::NotRequested`] without a pending request and
    /// [`HandshakeError::UnexpectedPeer`] when `peer` did not take part in it.
    pub fn accept(&mut self, peer: PeerId) -> Result<(), HandshakeError> {
        self.check_pending(peer)?;
        self.state = ControlState::Active;
        self.pending = None;
        debug!(counterpart = %peer, "control session active");
        Ok(())
    }

    /// Drops a pending request back to `Idle`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ControlSession::accept`].
    pub fn reject(&mut self, peer: PeerId) -> Result<(), HandshakeError> {
        self.check_pending(peer)?;
        self.clear();
        Ok(())
    }

    /// Ends a pending or active session.
    ///
    /// Returns `false` if the session was already idle, which makes repeated
    /// releases harmless.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::UnexpectedPeer`] when `peer` is not the
    /// counterpart of the current session.
    pub fn release(&mut self, peer: PeerId) -> Result<bool, HandshakeError> {
        if self.state == ControlState::Idle {
            return Ok(false);
        }
        if self.counterpart != Some(peer) {
            return Err(HandshakeError::UnexpectedPeer { actual: peer });
        }
        self.clear();
        Ok(true)
    }

    /// Unconditionally returns to `Idle` (connection loss, local teardown).
    ///
    /// Returns the state that was left.
    pub fn reset(&mut self) -> ControlState {
        let previous = self.state;
        self.clear();
        previous
    }

    fn check_pending(&self, peer: PeerId) -> Result<(), HandshakeError> {
        if self.state != ControlState::Requested {
            return Err(HandshakeError::NotRequested(self.state));
        }
        if self.counterpart != Some(peer) {
            return Err(HandshakeError::UnexpectedPeer { actual: peer });
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.state = ControlState::Idle;
        self.counterpart = None;
        self.pending = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
