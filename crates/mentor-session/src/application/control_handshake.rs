//! ControlHandshake use case: drives the local [`ControlSession`] from user
//! actions and from incoming `control:*` messages.
//!
//! # Who may do what
//!
//! | Message            | Sent by | Handled by | Effect on the receiver                     |
//! |--------------------|---------|------------|--------------------------------------------|
//! | `control:request`  | mentor  | child      | Idle/Requested → Requested (slot replaced) |
//! | `control:accept`   | child   | mentor     | Requested → Active                         |
//! | `control:reject`   | child   | mentor     | Requested → Idle                           |
//! | `control:release`  | either  | either     | Requested/Active → Idle                    |
//!
//! Only the addressed counterpart can move a session; anything else is logged
//! at `debug` and dropped.  Local operations take effect immediately and
//! return the message that tells the other side, so a release never waits for
//! an acknowledgement.
//!
//! This use case performs no I/O.  It returns [`Outgoing`] messages and the
//! caller publishes them.

use mentor_core::{
    ControlRequest, ControlSession, ControlState, HandshakeError, PeerId, Role, SignalMessage,
};
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by local handshake operations.
#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    /// The operation belongs to the other role.
    #[error("operation requires the {required} role")]
    WrongRole { required: Role },

    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

/// A message the caller must publish to one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: PeerId,
    pub message: SignalMessage,
}

impl Outgoing {
    fn new(to: PeerId, message: SignalMessage) -> Self {
        Self { to, message }
    }
}

/// Something the UI should hear about after an incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeNotice {
    /// A mentor asked for control; `replaced` is set when it superseded an
    /// unanswered request.
    Requested {
        from: PeerId,
        request: ControlRequest,
        replaced: bool,
    },
    /// The child granted control (mentor side).
    Granted { peer: PeerId },
    /// The child declined (mentor side).
    Refused { peer: PeerId },
    /// The counterpart ended a pending or active session.
    Released { peer: PeerId },
}

/// Result of handling one incoming `control:*` message.
#[derive(Debug, Default, PartialEq)]
pub struct HandshakeOutcome {
    pub replies: Vec<Outgoing>,
    pub notice: Option<HandshakeNotice>,
}

impl HandshakeOutcome {
    fn notice(notice: HandshakeNotice) -> Self {
        Self {
            replies: Vec::new(),
            notice: Some(notice),
        }
    }

    fn reply(to: PeerId, message: SignalMessage) -> Self {
        Self {
            replies: vec![Outgoing::new(to, message)],
            notice: None,
        }
    }
}

/// One client's half of the consent protocol.
#[derive(Debug)]
pub struct ControlHandshake {
    role: Role,
    session: ControlSession,
}

impl ControlHandshake {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            session: ControlSession::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session(&self) -> &ControlSession {
        &self.session
    }

    pub fn state(&self) -> ControlState {
        self.session.state()
    }

    // ── Local operations ──────────────────────────────────────────────────────

    /// Mentor: asks `child` for control.
    ///
    /// Re-requesting while the first request is unanswered replaces it on both
    /// sides.  Switching to a different child withdraws the earlier request.
    ///
    /// # Errors
    ///
    /// [`ControlError::WrongRole`] on a child client, or
    /// [`HandshakeError::AlreadyActive`] while controlling anyone.
    pub fn request(
        &mut self,
        child: PeerId,
        request: ControlRequest,
    ) -> Result<Vec<Outgoing>, ControlError> {
        self.require(Role::Mentor)?;
        let previous = self.session.counterpart().filter(|_| self.session.is_requested());
        self.session.request(child, request.clone())?;

        let mut out = Vec::with_capacity(2);
        if let Some(prev) = previous.filter(|p| *p != child) {
            out.push(Outgoing::new(prev, SignalMessage::ControlRelease));
        }
        out.push(Outgoing::new(child, SignalMessage::ControlRequest(request)));
        info!(%child, "control requested");
        Ok(out)
    }

    /// Mentor: request when idle, cancel when requested, release when active.
    ///
    /// # Errors
    ///
    /// Same as [`ControlHandshake::request`].
    pub fn toggle(
        &mut self,
        child: PeerId,
        request: ControlRequest,
    ) -> Result<Vec<Outgoing>, ControlError> {
        self.require(Role::Mentor)?;
        match (self.session.state(), self.session.counterpart()) {
            (ControlState::Idle, _) => self.request(child, request),
            (_, Some(current)) if current == child => Ok(self.release().into_iter().collect()),
            (ControlState::Requested, _) => self.request(child, request),
            (ControlState::Active, current) => Err(ControlError::Handshake(
                HandshakeError::AlreadyActive(current.unwrap_or(child)),
            )),
        }
    }

    /// Child: grants the pending request.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::NotRequested`] when nothing is pending.
    pub fn accept(&mut self) -> Result<Outgoing, ControlError> {
        self.require(Role::Child)?;
        let mentor = self.pending_counterpart()?;
        self.session.accept(mentor)?;
        info!(%mentor, "control accepted");
        Ok(Outgoing::new(mentor, SignalMessage::ControlAccept))
    }

    /// Child: declines the pending request.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::NotRequested`] when nothing is pending.
    pub fn reject(&mut self) -> Result<Outgoing, ControlError> {
        self.require(Role::Child)?;
        let mentor = self.pending_counterpart()?;
        self.session.reject(mentor)?;
        info!(%mentor, "control rejected");
        Ok(Outgoing::new(mentor, SignalMessage::ControlReject))
    }

    /// Either role: ends the current session locally and returns the release
    /// for the counterpart.  Returns `None` when already idle.
    pub fn release(&mut self) -> Option<Outgoing> {
        let peer = self.session.counterpart()?;
        let left = self.session.reset();
        if left == ControlState::Idle {
            return None;
        }
        info!(%peer, from = ?left, "control released locally");
        Some(Outgoing::new(peer, SignalMessage::ControlRelease))
    }

    /// Drops the session without telling anyone (connection lost, teardown).
    pub fn reset(&mut self) -> ControlState {
        let left = self.session.reset();
        if left != ControlState::Idle {
            info!(from = ?left, "control session reset");
        }
        left
    }

    /// Resets the session if `peer` was its counterpart.  Returns `true` if so.
    pub fn on_peer_left(&mut self, peer: PeerId) -> bool {
        if self.session.counterpart() == Some(peer) && self.session.state() != ControlState::Idle {
            info!(%peer, "counterpart left, control session reset");
            self.session.reset();
            true
        } else {
            false
        }
    }

    // ── Incoming messages ─────────────────────────────────────────────────────

    /// Applies a `control:*` message from `from`.
    ///
    /// `sender_role` is the role the peer directory lists for `from`; `None`
    /// for unknown peers.  Non-control messages are ignored.
    pub fn on_message(
        &mut self,
        from: PeerId,
        sender_role: Option<Role>,
        message: &SignalMessage,
    ) -> HandshakeOutcome {
        if sender_role != Some(self.role.counterpart()) {
            debug!(%from, ?sender_role, event = message.kind().as_str(), "control message from non-counterpart role dropped");
            return HandshakeOutcome::default();
        }
        match (self.role, message) {
            (Role::Child, SignalMessage::ControlRequest(request)) => {
                self.on_request(from, request.clone())
            }
            (Role::Mentor, SignalMessage::ControlAccept) => match self.session.accept(from) {
                Ok(()) => {
                    info!(child = %from, "control granted");
                    HandshakeOutcome::notice(HandshakeNotice::Granted { peer: from })
                }
                Err(e) => dropped(from, "control:accept", e),
            },
            (Role::Mentor, SignalMessage::ControlReject) => match self.session.reject(from) {
                Ok(()) => {
                    info!(child = %from, "control refused");
                    HandshakeOutcome::notice(HandshakeNotice::Refused { peer: from })
                }
                Err(e) => dropped(from, "control:reject", e),
            },
            (_, SignalMessage::ControlRelease) => match self.session.release(from) {
                Ok(true) => {
                    info!(peer = %from, "control released by counterpart");
                    HandshakeOutcome::notice(HandshakeNotice::Released { peer: from })
                }
                Ok(false) => HandshakeOutcome::default(),
                Err(e) => dropped(from, "control:release", e),
            },
            _ => HandshakeOutcome::default(),
        }
    }

    fn on_request(&mut self, mentor: PeerId, request: ControlRequest) -> HandshakeOutcome {
        if self.session.is_active_with(mentor) {
            // The mentor lost track of the grant; confirm it again.
            debug!(%mentor, "repeated request during active session acknowledged");
            return HandshakeOutcome::reply(mentor, SignalMessage::ControlAccept);
        }

        let previous = self.session.counterpart().filter(|_| self.session.is_requested());
        match self.session.request(mentor, request.clone()) {
            Ok(superseded) => {
                let mut outcome = HandshakeOutcome::notice(HandshakeNotice::Requested {
                    from: mentor,
                    request,
                    replaced: superseded.is_some(),
                });
                if let Some(prev) = previous.filter(|p| *p != mentor) {
                    outcome.replies.push(Outgoing::new(prev, SignalMessage::ControlReject));
                }
                info!(%mentor, replaced = superseded.is_some(), "control request pending");
                outcome
            }
            Err(HandshakeError::AlreadyActive(current)) => {
                debug!(%mentor, %current, "request refused while another mentor is active");
                HandshakeOutcome::reply(mentor, SignalMessage::ControlReject)
            }
            Err(e) => dropped(mentor, "control:request", e),
        }
    }

    fn require(&self, required: Role) -> Result<(), ControlError> {
        if self.role == required {
            Ok(())
        } else {
            Err(ControlError::WrongRole { required })
        }
    }

    fn pending_counterpart(&self) -> Result<PeerId, ControlError> {
        match self.session.counterpart() {
            Some(peer) if self.session.is_requested() => Ok(peer),
            _ => Err(HandshakeError::NotRequested(self.session.state()).into()),
        }
    }
}

fn dropped(from: PeerId, event: &str, err: HandshakeError) -> HandshakeOutcome {
    debug!(%from, event, error = %err, "control message dropped");
    HandshakeOutcome::default()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn req(name: &str) -> ControlRequest {
        ControlRequest::new(name, None)
    }

    /// Child handshake with one pending request from `mentor`.
    fn child_with_pending(mentor: PeerId) -> ControlHandshake {
        let mut child = ControlHandshake::new(Role::Child);
        child.on_message(mentor, Some(Role::Mentor), &SignalMessage::ControlRequest(req("Mo")));
        child
    }

    #[test]
    fn test_full_exchange_reaches_active_on_both_sides() {
        // Arrange
        let mentor_id = Uuid::new_v4();
        let child_id = Uuid::new_v4();
        let mut mentor = ControlHandshake::new(Role::Mentor);
        let mut child = ControlHandshake::new(Role::Child);

        // Act
        let out = mentor.request(child_id, req("Mo")).unwrap();
        child.on_message(mentor_id, Some(Role::Mentor), &out[0].message);
        let accept = child.accept().unwrap();
        mentor.on_message(child_id, Some(Role::Child), &accept.message);

        // Assert
        assert_eq!(mentor.state(), ControlState::Active);
        assert_eq!(child.state(), ControlState::Active);
        assert_eq!(accept.to, mentor_id);
    }

    #[test]
    fn test_second_request_replaces_pending_one() {
        let mentor = Uuid::new_v4();
        let mut child = child_with_pending(mentor);
        let second = ControlRequest::new("Mo", Some("second".into()));

        let outcome =
            child.on_message(mentor, Some(Role::Mentor), &SignalMessage::ControlRequest(second.clone()));

        assert!(outcome.replies.is_empty());
        assert_eq!(child.session().pending_request(), Some(&second));
        assert!(matches!(
            outcome.notice,
            Some(HandshakeNotice::Requested { replaced: true, .. })
        ));
    }

    #[test]
    fn test_request_from_other_mentor_rejects_the_superseded_one() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut child = child_with_pending(first);

        let outcome =
            child.on_message(second, Some(Role::Mentor), &SignalMessage::ControlRequest(req("B")));

        assert_eq!(outcome.replies, vec![Outgoing::new(first, SignalMessage::ControlReject)]);
        assert_eq!(child.session().counterpart(), Some(second));
    }

    #[test]
    fn test_request_while_active_with_other_mentor_is_refused() {
        let first = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let mut child = child_with_pending(first);
        child.accept().unwrap();

        let outcome =
            child.on_message(intruder, Some(Role::Mentor), &SignalMessage::ControlRequest(req("X")));

        assert_eq!(outcome.replies, vec![Outgoing::new(intruder, SignalMessage::ControlReject)]);
        assert!(child.session().is_active_with(first));
    }

    #[test]
    fn test_repeated_request_from_active_mentor_is_reacknowledged() {
        let mentor = Uuid::new_v4();
        let mut child = child_with_pending(mentor);
        child.accept().unwrap();

        let outcome =
            child.on_message(mentor, Some(Role::Mentor), &SignalMessage::ControlRequest(req("Mo")));

        assert_eq!(outcome.replies, vec![Outgoing::new(mentor, SignalMessage::ControlAccept)]);
        assert_eq!(child.state(), ControlState::Active);
    }

    #[test]
    fn test_request_from_child_role_is_ignored() {
        let mut child = ControlHandshake::new(Role::Child);
        let outcome = child.on_message(
            Uuid::new_v4(),
            Some(Role::Child),
            &SignalMessage::ControlRequest(req("sneaky")),
        );
        assert_eq!(outcome, HandshakeOutcome::default());
        assert_eq!(child.state(), ControlState::Idle);
    }

    #[test]
    fn test_accept_from_unaddressed_child_is_ignored() {
        let mut mentor = ControlHandshake::new(Role::Mentor);
        let child = Uuid::new_v4();
        mentor.request(child, req("Mo")).unwrap();

        mentor.on_message(Uuid::new_v4(), Some(Role::Child), &SignalMessage::ControlAccept);

        assert_eq!(mentor.state(), ControlState::Requested);
    }

    #[test]
    fn test_reject_returns_mentor_to_idle() {
        let mut mentor = ControlHandshake::new(Role::Mentor);
        let child = Uuid::new_v4();
        mentor.request(child, req("Mo")).unwrap();

        let outcome = mentor.on_message(child, Some(Role::Child), &SignalMessage::ControlReject);

        assert_eq!(mentor.state(), ControlState::Idle);
        assert_eq!(outcome.notice, Some(HandshakeNotice::Refused { peer: child }));
    }

    #[test]
    fn test_toggle_cycles_request_cancel() {
        let mut mentor = ControlHandshake::new(Role::Mentor);
        let child = Uuid::new_v4();

        let first = mentor.toggle(child, req("Mo")).unwrap();
        assert!(matches!(first[0].message, SignalMessage::ControlRequest(_)));
        assert_eq!(mentor.state(), ControlState::Requested);

        let second = mentor.toggle(child, req("Mo")).unwrap();
        assert_eq!(second, vec![Outgoing::new(child, SignalMessage::ControlRelease)]);
        assert_eq!(mentor.state(), ControlState::Idle);
    }

    #[test]
    fn test_switching_child_while_requested_withdraws_first() {
        let mut mentor = ControlHandshake::new(Role::Mentor);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        mentor.request(a, req("Mo")).unwrap();

        let out = mentor.toggle(b, req("Mo")).unwrap();

        assert_eq!(out[0], Outgoing::new(a, SignalMessage::ControlRelease));
        assert_eq!(out[1].to, b);
        assert_eq!(mentor.session().counterpart(), Some(b));
    }

    #[test]
    fn test_release_is_local_and_immediate() {
        let mentor = Uuid::new_v4();
        let mut child = child_with_pending(mentor);
        child.accept().unwrap();

        let out = child.release().unwrap();

        assert_eq!(child.state(), ControlState::Idle);
        assert_eq!(out, Outgoing::new(mentor, SignalMessage::ControlRelease));
        assert!(child.release().is_none(), "second release is a no-op");
    }

    #[test]
    fn test_mentor_release_on_child_cancels_pending_request() {
        let mentor = Uuid::new_v4();
        let mut child = child_with_pending(mentor);

        let outcome = child.on_message(mentor, Some(Role::Mentor), &SignalMessage::ControlRelease);

        assert_eq!(child.state(), ControlState::Idle);
        assert!(child.session().pending_request().is_none());
        assert_eq!(outcome.notice, Some(HandshakeNotice::Released { peer: mentor }));
    }

    #[test]
    fn test_role_checks_on_local_operations() {
        let mut mentor = ControlHandshake::new(Role::Mentor);
        let mut child = ControlHandshake::new(Role::Child);

        assert_eq!(mentor.accept(), Err(ControlError::WrongRole { required: Role::Child }));
        assert_eq!(
            child.request(Uuid::new_v4(), req("x")),
            Err(ControlError::WrongRole { required: Role::Mentor })
        );
        assert_eq!(
            child.accept(),
            Err(ControlError::Handshake(HandshakeError::NotRequested(ControlState::Idle)))
        );
    }

    #[test]
    fn test_peer_left_resets_only_for_counterpart() {
        let mentor = Uuid::new_v4();
        let mut child = child_with_pending(mentor);
        child.accept().unwrap();

        assert!(!child.on_peer_left(Uuid::new_v4()));
        assert!(child.on_peer_left(mentor));
        assert_eq!(child.state(), ControlState::Idle);
    }
}
