//! SessionFacade: the single, role-aware entry point of a client.
//!
//! One facade is constructed per client instance and shared by reference
//! (`Arc<SessionFacade>`).  It owns the peer directory, the control
//! handshake, the role-specific pipelines and, on a mentor, the remote
//! desktop bridge.
//!
//! # How it fits together (for beginners)
//!
//! ```text
//!            UI (mentor)                         UI (child)
//!                │                                    ▲
//!   request/toggle, send_*              events, snapshot, cursor_watch
//!                ▼                                    │
//!         SessionFacade ──► SignalingPort ──► pump task ──► SessionFacade
//!                                                     │
//!                                  ControlHandshake / MirrorReceiver /
//!                                  CursorPresence / mission slot
//! ```
//!
//! - **Local operations** lock the session state, run a use case, release
//!   the lock and only then publish the resulting messages.
//! - **Incoming traffic** is handled by a background *pump* task started by
//!   [`SessionFacade::connect`].  It holds only a `Weak` reference, so
//!   dropping the last `Arc` stops it.
//! - **Observable state** is exposed as a [`SessionSnapshot`], a
//!   `watch` channel for the ghost cursor, and a stream of
//!   [`SessionEvent`]s for things the UI should react to once.
//!
//! Every failure degrades to "no active remote assistance": connection loss
//! resets the handshake, hides the ghost cursor and tears the desktop link
//! down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mentor_core::protocol::messages::MissionDismissPayload;
use mentor_core::{
    decode_signal, encode_signal, CodecError, ControlRequest, ControlState, ElementInfo, Envelope,
    FieldInfo, GhostCursor, Mission, Modifier, Peer, PeerId, Role, SignalMessage, CURSOR_TIMEOUT,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::control_handshake::{ControlError, ControlHandshake, HandshakeNotice, Outgoing};
use super::cursor_presence::CursorPresence;
use super::input_mirror::{
    DocumentSurface, MirrorReceiver, MirrorSender, ReplayOutcome, CURSOR_THROTTLE,
};
use super::peer_directory::PeerDirectory;
use super::remote_desktop::{
    DesktopConnectionState, DesktopError, DesktopInjector, DesktopInputReceiver, DesktopSettings,
    FrameOutcome, MediaDevices, PeerConnector, RemoteDesktopBridge, VideoViewport,
};

/// Queue depth of the UI event stream.
const EVENT_CAPACITY: usize = 256;

// ── Signaling seam ────────────────────────────────────────────────────────────

/// Error type for signaling operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SignalingError {
    #[error("not connected to the signaling channel")]
    NotConnected,

    #[error("already connected to room {0:?}")]
    AlreadyConnected(String),

    /// The transport is gone.
    #[error("signaling channel closed: {0}")]
    Closed(String),
}

/// Everything a client can hear from the signaling channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Message(Envelope),
    PresenceJoin(Peer),
    PresenceLeave { peer_id: PeerId },
    /// This client's own connection dropped.
    ConnectionLost,
}

/// Abstract bidirectional publish/subscribe channel with presence.
///
/// - `connect` joins a room and returns this client's event stream.
///   Members already in the room are announced with `PresenceJoin`.
/// - `publish` delivers an [`Envelope`] to every other member it is
///   addressed to, in publish order.
/// - A transport failure is reported once as `ConnectionLost`.
#[async_trait]
pub trait SignalingPort: Send + Sync {
    async fn connect(
        &self,
        room: &str,
        me: Peer,
    ) -> Result<mpsc::Receiver<SignalingEvent>, SignalingError>;

    async fn publish(&self, envelope: Envelope) -> Result<(), SignalingError>;

    /// Leaves the room.  Succeeds when not connected.
    async fn disconnect(&self) -> Result<(), SignalingError>;
}

// ── Settings and ports ────────────────────────────────────────────────────────

/// Tunables for one client session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub cursor_throttle: Duration,
    pub cursor_timeout: Duration,
    pub request_webcam: bool,
    pub negotiation_timeout: Duration,
}

impl SessionSettings {
    fn desktop(&self) -> DesktopSettings {
        DesktopSettings {
            request_webcam: self.request_webcam,
            negotiation_timeout: self.negotiation_timeout,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        let desktop = DesktopSettings::default();
        Self {
            cursor_throttle: CURSOR_THROTTLE,
            cursor_timeout: CURSOR_TIMEOUT,
            request_webcam: desktop.request_webcam,
            negotiation_timeout: desktop.negotiation_timeout,
        }
    }
}

/// Host adapters a client needs; the variant also fixes the client's role.
pub enum RolePorts {
    Mentor {
        connector: Arc<dyn PeerConnector>,
        devices: Arc<dyn MediaDevices>,
    },
    Child {
        surface: Arc<dyn DocumentSurface>,
        injector: Arc<dyn DesktopInjector>,
    },
}

// ── Errors, events, snapshot ──────────────────────────────────────────────────

/// Error type for facade operations.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("operation requires the {required} role")]
    WrongRole { required: Role },

    #[error("not connected to a room")]
    NotConnected,

    #[error("already connected to a room")]
    AlreadyConnected,

    /// The peer is not listed as an online counterpart.
    #[error("unknown or offline peer {0}")]
    UnknownPeer(PeerId),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Desktop(#[from] DesktopError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One-shot notifications for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PeerJoined(Peer),
    PeerLeft { peer_id: PeerId },
    /// Child: a mentor asks for control.
    ControlRequested {
        from: PeerId,
        request: ControlRequest,
        replaced: bool,
    },
    /// Mentor: the child accepted.
    ControlGranted { peer: PeerId },
    /// Mentor: the child declined.
    ControlRefused { peer: PeerId },
    /// The counterpart released, withdrew, or left.
    ControlReleased { peer: PeerId },
    /// Child: a mirrored mode change was applied.
    ModeChanged { mode: String },
    MissionAssigned(Mission),
    MissionDismissed { id: String },
    /// A user-visible failure (connection, permission).
    Error(String),
    /// This client lost its signaling connection.
    ConnectionLost,
}

impl From<HandshakeNotice> for SessionEvent {
    fn from(notice: HandshakeNotice) -> Self {
        match notice {
            HandshakeNotice::Requested {
                from,
                request,
                replaced,
            } => SessionEvent::ControlRequested {
                from,
                request,
                replaced,
            },
            HandshakeNotice::Granted { peer } => SessionEvent::ControlGranted { peer },
            HandshakeNotice::Refused { peer } => SessionEvent::ControlRefused { peer },
            HandshakeNotice::Released { peer } => SessionEvent::ControlReleased { peer },
        }
    }
}

/// Point-in-time view of everything the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub role: Role,
    pub is_connected: bool,
    /// Remote desktop link state (always `idle` on a child).
    pub connection_state: DesktopConnectionState,
    /// Online peers, sorted by display name.
    pub connected_users: Vec<Peer>,
    pub control_requested: bool,
    pub control_active: bool,
    pub control_peer: Option<PeerId>,
    pub pending_request: Option<ControlRequest>,
    /// Hidden on a mentor.
    pub mentor_cursor: GhostCursor,
    pub active_mission: Option<Mission>,
    pub error: Option<String>,
}

// ── Facade ────────────────────────────────────────────────────────────────────

enum RoleState {
    Mentor {
        mirror: MirrorSender,
    },
    Child {
        replay: MirrorReceiver,
        cursor: CursorPresence,
        frames: DesktopInputReceiver,
        mission: Option<Mission>,
    },
}

struct SessionState {
    connected: bool,
    directory: PeerDirectory,
    handshake: ControlHandshake,
    role_state: RoleState,
    error: Option<String>,
    pump: Option<JoinHandle<()>>,
}

impl SessionState {
    /// Clears everything that only lives while control is held.
    fn end_control(&mut self) {
        match &mut self.role_state {
            RoleState::Mentor { mirror } => mirror.reset(),
            RoleState::Child { cursor, frames, .. } => {
                cursor.hide();
                frames.reset();
            }
        }
    }

    /// Runs [`end_control`](Self::end_control) if the handshake just went idle.
    fn settle(&mut self, before: ControlState) {
        if before != ControlState::Idle && self.handshake.state() == ControlState::Idle {
            self.end_control();
        }
    }
}

/// Role-aware session of one client.
pub struct SessionFacade {
    me: Peer,
    signaling: Arc<dyn SignalingPort>,
    state: Mutex<SessionState>,
    desktop: Option<Mutex<RemoteDesktopBridge>>,
    desktop_state: watch::Sender<DesktopConnectionState>,
    cursor: Option<watch::Receiver<GhostCursor>>,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionFacade {
    /// Creates a disconnected session.  The role follows from `ports`.
    pub fn new(
        display_name: impl Into<String>,
        settings: SessionSettings,
        signaling: Arc<dyn SignalingPort>,
        ports: RolePorts,
    ) -> (Arc<Self>, mpsc::Receiver<SessionEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (desktop_state, _) = watch::channel(DesktopConnectionState::Idle);

        let (role, role_state, desktop, cursor) = match ports {
            RolePorts::Mentor { connector, devices } => (
                Role::Mentor,
                RoleState::Mentor {
                    mirror: MirrorSender::new(settings.cursor_throttle),
                },
                Some(Mutex::new(RemoteDesktopBridge::new(
                    connector,
                    devices,
                    settings.desktop(),
                ))),
                None,
            ),
            RolePorts::Child { surface, injector } => {
                let presence = CursorPresence::new(settings.cursor_timeout);
                let cursor = presence.subscribe();
                (
                    Role::Child,
                    RoleState::Child {
                        replay: MirrorReceiver::new(surface),
                        cursor: presence,
                        frames: DesktopInputReceiver::new(injector),
                        mission: None,
                    },
                    None,
                    Some(cursor),
                )
            }
        };

        let facade = Arc::new(Self {
            me: Peer::new(display_name, role),
            signaling,
            state: Mutex::new(SessionState {
                connected: false,
                directory: PeerDirectory::new(),
                handshake: ControlHandshake::new(role),
                role_state,
                error: None,
                pump: None,
            }),
            desktop,
            desktop_state,
            cursor,
            events,
        });
        (facade, events_rx)
    }

    pub fn me(&self) -> &Peer {
        &self.me
    }

    pub fn id(&self) -> PeerId {
        self.me.id
    }

    pub fn role(&self) -> Role {
        self.me.role
    }

    /// Live ghost cursor state; `None` on a mentor.
    pub fn cursor_watch(&self) -> Option<watch::Receiver<GhostCursor>> {
        self.cursor.clone()
    }

    /// Live remote desktop link state.
    pub fn desktop_watch(&self) -> watch::Receiver<DesktopConnectionState> {
        self.desktop_state.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        let session = state.handshake.session();
        SessionSnapshot {
            role: self.me.role,
            is_connected: state.connected,
            connection_state: *self.desktop_state.borrow(),
            connected_users: state.directory.all().into_iter().filter(|p| p.online).collect(),
            control_requested: session.is_requested(),
            control_active: session.is_active(),
            control_peer: session.counterpart(),
            pending_request: session.pending_request().cloned(),
            mentor_cursor: self
                .cursor
                .as_ref()
                .map(|rx| *rx.borrow())
                .unwrap_or_default(),
            active_mission: match &state.role_state {
                RoleState::Child { mission, .. } => mission.clone(),
                RoleState::Mentor { .. } => None,
            },
            error: state.error.clone(),
        }
    }

    // ── Connection ────────────────────────────────────────────────────────────

    /// Joins `room` and starts handling incoming traffic.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyConnected`], or the signaling failure (also
    /// stored as the user-visible error).
    pub async fn connect(self: &Arc<Self>, room: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if state.connected {
            return Err(SessionError::AlreadyConnected);
        }
        let mut rx = match self.signaling.connect(room, self.me.clone()).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(room, error = %e, "signaling connect failed");
                state.error = Some(e.to_string());
                return Err(e.into());
            }
        };
        state.connected = true;
        state.error = None;

        let weak = Arc::downgrade(self);
        state.pump = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(session) = weak.upgrade() else {
                    break;
                };
                session.handle_event(event).await;
            }
            debug!("signaling event stream ended");
        }));
        info!(room, role = %self.me.role, name = %self.me.display_name, "session connected");
        Ok(())
    }

    /// Leaves the room, ending any control session and the desktop link.
    /// Calling it while disconnected only clears the user-visible error.
    pub async fn disconnect(&self) {
        let (release, pump) = {
            let mut state = self.state.lock().await;
            state.error = None;
            if !state.connected {
                debug!("disconnect while not connected ignored");
                return;
            }
            state.connected = false;
            let release = state.handshake.release();
            state.end_control();
            state.directory.clear();
            (release, state.pump.take())
        };
        if let Some(pump) = pump {
            pump.abort();
        }
        if let Some(out) = release {
            if let Err(e) = self.publish(out).await {
                debug!(error = %e, "release on disconnect not delivered");
            }
        }
        if let Err(e) = self.signaling.disconnect().await {
            warn!(error = %e, "signaling disconnect failed");
        }
        self.teardown_desktop().await;
        info!("session disconnected");
    }

    // ── Control handshake ─────────────────────────────────────────────────────

    /// Mentor: asks `child` for control.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownPeer`] unless `child` is an online child, or
    /// the handshake refusal (already in control).
    pub async fn request_control(&self, child: PeerId, note: Option<String>) -> Result<(), SessionError> {
        self.require(Role::Mentor)?;
        let outgoing = {
            let mut state = self.lock_connected().await?;
            if !state.directory.is_online_with_role(child, Role::Child) {
                return Err(SessionError::UnknownPeer(child));
            }
            let before = state.handshake.state();
            let request = ControlRequest::new(self.me.display_name.clone(), note);
            let outgoing = state.handshake.request(child, request)?;
            state.settle(before);
            outgoing
        };
        self.publish_all(outgoing).await
    }

    /// Mentor: requests control of `child`, or cancels/releases it when
    /// `child` is already the counterpart.
    ///
    /// # Errors
    ///
    /// Same as [`request_control`](Self::request_control).
    pub async fn toggle_control(&self, child: PeerId, note: Option<String>) -> Result<(), SessionError> {
        self.require(Role::Mentor)?;
        let outgoing = {
            let mut state = self.lock_connected().await?;
            let is_counterpart = state.handshake.session().counterpart() == Some(child);
            if !is_counterpart && !state.directory.is_online_with_role(child, Role::Child) {
                return Err(SessionError::UnknownPeer(child));
            }
            let before = state.handshake.state();
            let request = ControlRequest::new(self.me.display_name.clone(), note);
            let outgoing = state.handshake.toggle(child, request)?;
            state.settle(before);
            outgoing
        };
        self.publish_all(outgoing).await
    }

    /// Child: grants the pending request.
    ///
    /// # Errors
    ///
    /// [`SessionError::Control`] when nothing is pending.
    pub async fn accept_control(&self) -> Result<(), SessionError> {
        self.require(Role::Child)?;
        let outgoing = self.lock_connected().await?.handshake.accept()?;
        self.publish(outgoing).await
    }

    /// Child: declines the pending request.
    ///
    /// # Errors
    ///
    /// [`SessionError::Control`] when nothing is pending.
    pub async fn reject_control(&self) -> Result<(), SessionError> {
        self.require(Role::Child)?;
        let outgoing = {
            let mut state = self.lock_connected().await?;
            let before = state.handshake.state();
            let outgoing = state.handshake.reject()?;
            state.settle(before);
            outgoing
        };
        self.publish(outgoing).await
    }

    /// Either role: ends the pending or active session.
    ///
    /// The local state is idle (replay halted, cursor hidden) before the
    /// counterpart is told.  Does nothing when already idle.
    pub async fn release_control(&self) -> Result<(), SessionError> {
        let outgoing = {
            let mut state = self.lock_connected().await?;
            let before = state.handshake.state();
            let outgoing = state.handshake.release();
            state.settle(before);
            outgoing
        };
        match outgoing {
            Some(out) => self.publish(out).await,
            None => Ok(()),
        }
    }

    // ── Input mirroring (mentor) ──────────────────────────────────────────────

    /// Mirrors a pointer move.  Returns `false` when throttled or not in control.
    pub async fn send_cursor_move(&self, x: f64, y: f64) -> Result<bool, SessionError> {
        let now = Instant::now();
        self.mirror("cursor:move", |mirror| mirror.pointer_moved(x, y, now))
            .await
    }

    /// Mirrors a click observed by the capture-phase listener.
    pub async fn send_click(&self, element: &ElementInfo, x: f64, y: f64) -> Result<bool, SessionError> {
        self.mirror("input:click", |mirror| mirror.clicked(element, x, y))
            .await
    }

    /// Mirrors a text field change, or its submission when `submitted`.
    pub async fn send_keyboard_input(
        &self,
        field: &FieldInfo,
        value: &str,
        submitted: bool,
    ) -> Result<bool, SessionError> {
        self.mirror("input:key", |mirror| {
            if submitted {
                mirror.field_submitted(field, value)
            } else {
                mirror.field_changed(field, value)
            }
        })
        .await
    }

    /// Reports the mentor's current mode; sent only when it changed.
    pub async fn send_mode_change(&self, mode: &str) -> Result<bool, SessionError> {
        self.mirror("mode:change", |mirror| mirror.mode_observed(mode))
            .await
    }

    async fn mirror<F>(&self, event: &'static str, build: F) -> Result<bool, SessionError>
    where
        F: FnOnce(&mut MirrorSender) -> Option<SignalMessage>,
    {
        self.require(Role::Mentor)?;
        let outgoing = {
            let mut guard = self.lock_connected().await?;
            let state = &mut *guard;
            let session = state.handshake.session();
            let Some(child) = session.counterpart().filter(|_| session.is_active()) else {
                debug!(event, "not in control, nothing mirrored");
                return Ok(false);
            };
            let RoleState::Mentor { mirror } = &mut state.role_state else {
                return Err(SessionError::WrongRole {
                    required: Role::Mentor,
                });
            };
            match build(mirror) {
                Some(message) => Outgoing { to: child, message },
                None => return Ok(false),
            }
        };
        self.publish(outgoing).await?;
        Ok(true)
    }

    // ── Missions (mentor) ─────────────────────────────────────────────────────

    /// Flashes `mission` on `child`'s display.
    pub async fn assign_mission(&self, child: PeerId, mission: Mission) -> Result<(), SessionError> {
        self.send_to_child(child, SignalMessage::MissionAssign(mission))
            .await
    }

    pub async fn dismiss_mission(&self, child: PeerId, id: &str) -> Result<(), SessionError> {
        let payload = MissionDismissPayload { id: id.to_string() };
        self.send_to_child(child, SignalMessage::MissionDismiss(payload))
            .await
    }

    async fn send_to_child(&self, child: PeerId, message: SignalMessage) -> Result<(), SessionError> {
        self.require(Role::Mentor)?;
        {
            let state = self.lock_connected().await?;
            if !state.directory.is_online_with_role(child, Role::Child) {
                return Err(SessionError::UnknownPeer(child));
            }
        }
        self.publish(Outgoing { to: child, message }).await
    }

    // ── Remote desktop (mentor) ───────────────────────────────────────────────

    /// Opens a remote desktop session with `peer`.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownPeer`] unless `peer` is an online child;
    /// [`DesktopError::ConnectionFailed`] on negotiation failure or timeout.
    /// Failures are also stored as the user-visible error.
    /// [`DesktopError::Cancelled`] when a disconnect or a newer connect
    /// superseded this one; nothing is stored.
    pub async fn connect_to_peer(&self, peer: PeerId) -> Result<(), SessionError> {
        let bridge = self.bridge()?;
        {
            let state = self.lock_connected().await?;
            if !state.directory.is_online_with_role(peer, Role::Child) {
                return Err(SessionError::UnknownPeer(peer));
            }
        }
        let attempt = bridge.lock().await.begin_connect(peer);
        self.desktop_state.send_replace(DesktopConnectionState::Connecting);

        // Negotiate unlocked so the pump and `disconnect_desktop` never wait on it.
        let negotiated = attempt.negotiate().await;

        let (result, status, error) = {
            let mut bridge = bridge.lock().await;
            let result = bridge.finish_connect(negotiated);
            (result, bridge.state(), bridge.take_error())
        };
        if result == Err(DesktopError::Cancelled) {
            debug!(%peer, "desktop connection attempt superseded");
            self.desktop_state.send_replace(status);
            return result.map_err(Into::into);
        }
        self.state.lock().await.error = None;
        self.after_desktop(status, error).await;
        result.map_err(Into::into)
    }

    /// Sends a click at `(x, y)` on the rendered video.  Returns the
    /// source-space coordinates that were transmitted.
    pub async fn send_desktop_click(&self, x: f64, y: f64) -> Result<(i32, i32), SessionError> {
        let bridge = self.bridge()?;
        let (result, status, error) = {
            let mut bridge = bridge.lock().await;
            let result = bridge.send_click(x, y).await;
            (result, bridge.state(), bridge.take_error())
        };
        self.after_desktop(status, error).await;
        result.map_err(Into::into)
    }

    /// Sends a literal key plus modifiers over the desktop control channel.
    pub async fn send_key(&self, key: &str, modifiers: &[Modifier]) -> Result<(), SessionError> {
        let bridge = self.bridge()?;
        let (result, status, error) = {
            let mut bridge = bridge.lock().await;
            let result = bridge.send_key(key, modifiers).await;
            (result, bridge.state(), bridge.take_error())
        };
        self.after_desktop(status, error).await;
        result.map_err(Into::into)
    }

    /// Ends the remote desktop session.  Idempotent; clears the error.
    pub async fn disconnect_desktop(&self) -> Result<(), SessionError> {
        self.bridge()?;
        self.teardown_desktop().await;
        self.state.lock().await.error = None;
        Ok(())
    }

    /// Registers the element the remote screen is rendered into.
    pub async fn attach_viewport(&self, viewport: Arc<dyn VideoViewport>) -> Result<(), SessionError> {
        self.bridge()?.lock().await.attach_viewport(viewport);
        Ok(())
    }

    /// Reports that the live desktop link failed (stream ended, transport closed).
    pub async fn desktop_link_failed(&self, reason: &str) -> Result<(), SessionError> {
        let bridge = self.bridge()?;
        let (status, error) = {
            let mut bridge = bridge.lock().await;
            bridge.on_link_failure(reason);
            (bridge.state(), bridge.take_error())
        };
        self.after_desktop(status, error).await;
        Ok(())
    }

    fn bridge(&self) -> Result<&Mutex<RemoteDesktopBridge>, SessionError> {
        self.desktop.as_ref().ok_or(SessionError::WrongRole {
            required: Role::Mentor,
        })
    }

    async fn after_desktop(&self, status: DesktopConnectionState, error: Option<DesktopError>) {
        self.desktop_state.send_replace(status);
        if let Some(error) = error {
            let message = error.to_string();
            self.state.lock().await.error = Some(message.clone());
            self.emit(SessionEvent::Error(message));
        }
    }

    async fn teardown_desktop(&self) {
        if let Some(bridge) = &self.desktop {
            bridge.lock().await.disconnect();
            self.desktop_state.send_replace(DesktopConnectionState::Idle);
        }
    }

    // ── Remote desktop (child) ────────────────────────────────────────────────

    /// Applies one frame received on the desktop control channel from `from`.
    pub async fn handle_desktop_frame(&self, from: PeerId, bytes: &[u8]) -> Result<FrameOutcome, SessionError> {
        self.require(Role::Child)?;
        let mut guard = self.lock_connected().await?;
        let state = &mut *guard;
        match &mut state.role_state {
            RoleState::Child { frames, .. } => {
                Ok(frames.handle_frame(state.handshake.session(), from, bytes))
            }
            RoleState::Mentor { .. } => Err(SessionError::WrongRole {
                required: Role::Child,
            }),
        }
    }

    // ── Incoming traffic ──────────────────────────────────────────────────────

    async fn handle_event(&self, event: SignalingEvent) {
        match event {
            SignalingEvent::Message(envelope) => self.handle_envelope(envelope).await,
            SignalingEvent::PresenceJoin(peer) => {
                if peer.id == self.me.id {
                    return;
                }
                if self.state.lock().await.directory.upsert(peer.clone()) {
                    info!(peer = %peer.id, name = %peer.display_name, role = %peer.role, "peer joined");
                }
                self.emit(SessionEvent::PeerJoined(peer));
            }
            SignalingEvent::PresenceLeave { peer_id } => self.peer_left(peer_id).await,
            SignalingEvent::ConnectionLost => self.connection_lost().await,
        }
    }

    async fn handle_envelope(&self, envelope: Envelope) {
        if !envelope.is_for(self.me.id) {
            return;
        }
        let from = envelope.from;
        let message = match decode_signal(&envelope) {
            Ok(message) => message,
            Err(e) => {
                debug!(%from, event = %envelope.event, error = %e, "undecodable message dropped");
                return;
            }
        };

        let (replies, events) = {
            let mut state = self.state.lock().await;
            self.dispatch(&mut state, from, message)
        };
        for reply in replies {
            if let Err(e) = self.publish(reply).await {
                warn!(error = %e, "handshake reply not delivered");
            }
        }
        for event in events {
            self.emit(event);
        }
    }

    fn dispatch(
        &self,
        state: &mut SessionState,
        from: PeerId,
        message: SignalMessage,
    ) -> (Vec<Outgoing>, Vec<SessionEvent>) {
        let sender_role = state.directory.role_of(from);
        let mut events = Vec::new();

        match &message {
            SignalMessage::ControlRequest(_)
            | SignalMessage::ControlAccept
            | SignalMessage::ControlReject
            | SignalMessage::ControlRelease => {
                let before = state.handshake.state();
                let outcome = state.handshake.on_message(from, sender_role, &message);
                state.settle(before);
                events.extend(outcome.notice.map(SessionEvent::from));
                return (outcome.replies, events);
            }
            SignalMessage::CursorMove(position) => {
                if let RoleState::Child { cursor, .. } = &mut state.role_state {
                    if state.handshake.session().is_active_with(from) {
                        cursor.on_move(position.x, position.y);
                    } else {
                        debug!(%from, "cursor move gated by consent");
                    }
                }
            }
            SignalMessage::InputClick(_) | SignalMessage::InputKey(_) | SignalMessage::ModeChange(_) => {
                if let RoleState::Child { replay, .. } = &state.role_state {
                    let outcome = replay.apply(state.handshake.session(), from, &message);
                    if let (ReplayOutcome::Applied, SignalMessage::ModeChange(change)) = (&outcome, &message) {
                        events.push(SessionEvent::ModeChanged {
                            mode: change.mode.clone(),
                        });
                    }
                }
            }
            SignalMessage::MissionAssign(mission) => {
                if let RoleState::Child { mission: slot, .. } = &mut state.role_state {
                    if sender_role == Some(Role::Mentor) {
                        info!(%from, id = %mission.id, "mission assigned");
                        *slot = Some(mission.clone());
                        events.push(SessionEvent::MissionAssigned(mission.clone()));
                    } else {
                        debug!(%from, "mission from non-mentor dropped");
                    }
                }
            }
            SignalMessage::MissionDismiss(dismiss) => {
                if let RoleState::Child { mission: slot, .. } = &mut state.role_state {
                    if sender_role == Some(Role::Mentor)
                        && slot.as_ref().is_some_and(|m| m.id == dismiss.id)
                    {
                        *slot = None;
                        events.push(SessionEvent::MissionDismissed {
                            id: dismiss.id.clone(),
                        });
                    }
                }
            }
        }
        (Vec::new(), events)
    }

    async fn peer_left(&self, peer_id: PeerId) {
        let ended = {
            let mut state = self.state.lock().await;
            state.directory.remove(peer_id);
            let ended = state.handshake.on_peer_left(peer_id);
            if ended {
                state.end_control();
            }
            ended
        };
        info!(peer = %peer_id, "peer left");
        self.emit(SessionEvent::PeerLeft { peer_id });
        if ended {
            self.emit(SessionEvent::ControlReleased { peer: peer_id });
        }

        if let Some(bridge) = &self.desktop {
            let mut bridge = bridge.lock().await;
            if bridge.peer() == Some(peer_id) {
                bridge.disconnect();
                self.desktop_state.send_replace(DesktopConnectionState::Idle);
            }
        }
    }

    async fn connection_lost(&self) {
        {
            let mut state = self.state.lock().await;
            state.connected = false;
            // This runs on the pump itself; the stream ends on its own.
            state.pump = None;
            state.handshake.reset();
            state.end_control();
            state.directory.clear();
            state.error = Some(SignalingError::Closed("connection lost".into()).to_string());
        }
        warn!("signaling connection lost, remote assistance ended");
        if let Err(e) = self.signaling.disconnect().await {
            debug!(error = %e, "signaling cleanup after loss failed");
        }
        self.teardown_desktop().await;
        self.emit(SessionEvent::ConnectionLost);
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn require(&self, required: Role) -> Result<(), SessionError> {
        if self.me.role == required {
            Ok(())
        } else {
            Err(SessionError::WrongRole { required })
        }
    }

    async fn lock_connected(&self) -> Result<MutexGuard<'_, SessionState>, SessionError> {
        let state = self.state.lock().await;
        if state.connected {
            Ok(state)
        } else {
            Err(SessionError::NotConnected)
        }
    }

    async fn publish(&self, outgoing: Outgoing) -> Result<(), SessionError> {
        let envelope = encode_signal(&outgoing.message, self.me.id, Some(outgoing.to))?;
        debug!(to = %outgoing.to, event = %envelope.event, "publishing");
        self.signaling.publish(envelope).await?;
        Ok(())
    }

    async fn publish_all(&self, outgoing: Vec<Outgoing>) -> Result<(), SessionError> {
        for out in outgoing {
            self.publish(out).await?;
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!(error = %e, "session event dropped");
        }
    }
}

impl Drop for SessionFacade {
    fn drop(&mut self) {
        if let Some(pump) = self.state.get_mut().pump.take() {
            pump.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
