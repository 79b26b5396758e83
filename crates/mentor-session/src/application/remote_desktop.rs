//! RemoteDesktopBridge: full desktop control over a peer-to-peer link.
//!
//! Where the input mirror replays clicks on a shared document, the desktop
//! bridge has nothing to target but a video frame of the child's screen.  The
//! mentor clicks on the rendered video; the bridge rescales the point into
//! the child's screen pixels and sends it over the link's ordered control
//! channel.
//!
//! # Connection states (for beginners)
//!
//! ```text
//!          connect_to_peer             negotiated
//!   idle ─────────────────► connecting ──────────► connected
//!    ▲                          │                     │
//!    │     negotiation failed   │                     │ channel failure
//!    ├──────────────────────────┘                     ▼
//!    │                                              error
//!    └──────────────── disconnect (any state) ◄───────┘
//! ```
//!
//! Negotiation itself (offer/answer/candidates) lives behind
//! [`PeerConnector`]; the bridge only sees the resulting stream handles and
//! the control channel.  Whenever the state becomes `idle` or `error` every
//! stream has been stopped and every handle dropped.
//!
//! # Connecting without holding the bridge
//!
//! A negotiation can take seconds.  Callers that share the bridge behind a
//! lock split [`connect_to_peer`](RemoteDesktopBridge::connect_to_peer) into
//! three steps so the lock is only held at the edges:
//!
//! ```text
//! lock ─ begin_connect ─ unlock ─ ConnectAttempt::negotiate ─ lock ─ finish_connect ─ unlock
//! ```
//!
//! Every `begin_connect` and `disconnect` bumps a generation number.  An
//! attempt notices the bump, stops negotiating, and `finish_connect` throws
//! away whatever it produced.
//!
//! Frame numbers keep increasing across links, so the child's duplicate
//! filter never mistakes a reconnected link's first frames for replays.
//!
//! # Child side
//!
//! [`DesktopInputReceiver`] decodes frames arriving on the child and passes
//! them to a [`DesktopInjector`] only while the child's own control session
//! is active with the sender.  Frames are numbered; a replayed number is
//! dropped, so an accidental duplicate is a no-op.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mentor_core::protocol::codec::encode_frame_now;
use mentor_core::{
    decode_frame, scale_to_source, CodecError, ControlFrame, ControlSession, Modifier,
    ModifierSet, MouseButton, PeerId, Rect, SequenceCounter, SequenceGuard, Size,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Error type for the remote desktop bridge.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DesktopError {
    /// Negotiation failed or timed out.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A media device (camera) was refused by the user or the OS.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The remote video has no usable size yet, or no viewport is attached.
    #[error("video not ready: {0}")]
    VideoNotReady(String),

    /// The control channel closed underneath the session.
    #[error("control channel closed: {0}")]
    ChannelClosed(String),

    /// An operation needs a connected session.
    #[error("no remote desktop connection")]
    NotConnected,

    /// A newer connect or a disconnect superseded this attempt.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// The native input layer refused an injected event.
    #[error("input injection failed: {0}")]
    Injection(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Lifecycle of a remote desktop session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesktopConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

// ── Ports ─────────────────────────────────────────────────────────────────────

/// A media track (screen capture, webcam) that must be stopped explicitly.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> String;
    fn stop(&self);
}

/// The underlying peer connection.
pub trait PeerConnection: Send + Sync {
    fn close(&self);
}

/// Reliable, ordered channel carrying encoded [`ControlFrame`]s.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn send(&self, frame: Vec<u8>) -> Result<(), DesktopError>;
    fn close(&self);
}

/// Everything a successful negotiation hands back.
pub struct PeerLink {
    pub connection: Box<dyn PeerConnection>,
    /// The child's screen capture.
    pub screen: Box<dyn MediaStream>,
    /// The child's webcam, when webcams were requested and available.
    pub remote_video: Option<Box<dyn MediaStream>>,
    pub channel: Arc<dyn ControlChannel>,
}

/// Performs the external offer/answer exchange with `peer`.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn negotiate(&self, peer: PeerId, with_local_video: bool) -> Result<PeerLink, DesktopError>;
}

/// Local capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Opens the local webcam; [`DesktopError::PermissionDenied`] when refused.
    async fn open_camera(&self) -> Result<Box<dyn MediaStream>, DesktopError>;
}

/// The element rendering the child's screen on the mentor's UI.
///
/// Both values are read live on every click.
#[cfg_attr(test, mockall::automock)]
pub trait VideoViewport: Send + Sync {
    /// On-screen bounding rectangle of the rendered video.
    fn bounding_rect(&self) -> Rect;
    /// Natural (source) resolution of the video stream.
    fn natural_size(&self) -> Size;
}

/// Native input synthesis on the child's machine.
pub trait DesktopInjector: Send + Sync {
    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<(), DesktopError>;
    fn key(&self, key: &str, modifiers: ModifierSet) -> Result<(), DesktopError>;
}

// ── Mentor side ───────────────────────────────────────────────────────────────

/// Tunables for [`RemoteDesktopBridge`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesktopSettings {
    pub request_webcam: bool,
    pub negotiation_timeout: Duration,
}

impl Default for DesktopSettings {
    fn default() -> Self {
        Self {
            request_webcam: false,
            negotiation_timeout: Duration::from_secs(15),
        }
    }
}

/// Mentor-side remote desktop session.
pub struct RemoteDesktopBridge {
    connector: Arc<dyn PeerConnector>,
    devices: Arc<dyn MediaDevices>,
    settings: DesktopSettings,
    state: DesktopConnectionState,
    peer: Option<PeerId>,
    link: Option<PeerLink>,
    local_video: Option<Box<dyn MediaStream>>,
    viewport: Option<Arc<dyn VideoViewport>>,
    sequence: SequenceCounter,
    last_error: Option<DesktopError>,
    generation: watch::Sender<u64>,
}

/// A negotiation started by [`RemoteDesktopBridge::begin_connect`].
///
/// Owns clones of the ports, so it runs without borrowing the bridge.
pub struct ConnectAttempt {
    generation: u64,
    peer: PeerId,
    connector: Arc<dyn PeerConnector>,
    devices: Arc<dyn MediaDevices>,
    settings: DesktopSettings,
    cancel: watch::Receiver<u64>,
}

/// The result of [`ConnectAttempt::negotiate`], to be handed back to
/// [`RemoteDesktopBridge::finish_connect`].
pub struct Negotiated {
    generation: u64,
    peer: PeerId,
    link: Result<PeerLink, DesktopError>,
    local_video: Option<Box<dyn MediaStream>>,
    camera_error: Option<DesktopError>,
}

impl ConnectAttempt {
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Opens the camera if requested, then negotiates within the timeout.
    ///
    /// Returns early with [`DesktopError::Cancelled`] once the bridge moves
    /// to a newer generation.
    pub async fn negotiate(mut self) -> Negotiated {
        let (local_video, camera_error) = if self.settings.request_webcam {
            match self.devices.open_camera().await {
                Ok(stream) => (Some(stream), None),
                Err(e) => {
                    warn!(error = %e, "local camera unavailable, continuing without it");
                    (None, Some(e))
                }
            }
        } else {
            (None, None)
        };

        let timeout = self.settings.negotiation_timeout;
        let negotiation = self.connector.negotiate(self.peer, local_video.is_some());
        let link = tokio::select! {
            outcome = tokio::time::timeout(timeout, negotiation) => match outcome {
                Ok(Ok(link)) => Ok(link),
                Ok(Err(e @ DesktopError::ConnectionFailed(_))) => Err(e),
                Ok(Err(e)) => Err(DesktopError::ConnectionFailed(e.to_string())),
                Err(_) => Err(DesktopError::ConnectionFailed(format!(
                    "negotiation timed out after {timeout:?}"
                ))),
            },
            _ = self.cancel.changed() => Err(DesktopError::Cancelled),
        };

        Negotiated {
            generation: self.generation,
            peer: self.peer,
            link,
            local_video,
            camera_error,
        }
    }
}

impl Negotiated {
    /// Stops everything the attempt opened.
    fn discard(self) {
        if let Ok(link) = self.link {
            release_link(link);
        }
        if let Some(video) = self.local_video {
            video.stop();
        }
    }
}

impl RemoteDesktopBridge {
    pub fn new(
        connector: Arc<dyn PeerConnector>,
        devices: Arc<dyn MediaDevices>,
        settings: DesktopSettings,
    ) -> Self {
        Self {
            connector,
            devices,
            settings,
            state: DesktopConnectionState::Idle,
            peer: None,
            link: None,
            local_video: None,
            viewport: None,
            sequence: SequenceCounter::new(),
            last_error: None,
            generation: watch::Sender::new(0),
        }
    }

    pub fn state(&self) -> DesktopConnectionState {
        self.state
    }

    /// The peer of the current (or connecting) session.
    pub fn peer(&self) -> Option<PeerId> {
        self.peer
    }

    /// The most recent user-visible failure, if any.
    pub fn last_error(&self) -> Option<&DesktopError> {
        self.last_error.as_ref()
    }

    /// Hands the pending failure to the caller so it is reported once.
    pub fn take_error(&mut self) -> Option<DesktopError> {
        self.last_error.take()
    }

    /// Returns `true` while any stream or channel handle is held.
    pub fn holds_media(&self) -> bool {
        self.link.is_some() || self.local_video.is_some()
    }

    /// Whether a local webcam stream is being sent.
    pub fn has_local_video(&self) -> bool {
        self.local_video.is_some()
    }

    /// Whether the child's webcam is being received.
    pub fn has_remote_video(&self) -> bool {
        self.link.as_ref().is_some_and(|l| l.remote_video.is_some())
    }

    /// Attaches the element that renders the child's screen.
    pub fn attach_viewport(&mut self, viewport: Arc<dyn VideoViewport>) {
        self.viewport = Some(viewport);
    }

    pub fn detach_viewport(&mut self) {
        self.viewport = None;
    }

    /// Opens a session with `peer`, replacing any existing one.
    ///
    /// A refused camera is recorded in [`last_error`](Self::last_error) and
    /// the session continues without local video.
    ///
    /// # Errors
    ///
    /// [`DesktopError::ConnectionFailed`] when negotiation fails or exceeds
    /// the configured timeout; the bridge is back in `idle` afterwards.
    pub async fn connect_to_peer(&mut self, peer: PeerId) -> Result<(), DesktopError> {
        let attempt = self.begin_connect(peer);
        let negotiated = attempt.negotiate().await;
        self.finish_connect(negotiated)
    }

    /// Tears down the current session, moves to `connecting`, and returns
    /// the negotiation to run outside any lock around the bridge.
    pub fn begin_connect(&mut self, peer: PeerId) -> ConnectAttempt {
        self.teardown();
        let generation = self.bump_generation();
        self.last_error = None;
        self.state = DesktopConnectionState::Connecting;
        self.peer = Some(peer);
        info!(%peer, generation, "remote desktop connecting");
        ConnectAttempt {
            generation,
            peer,
            connector: Arc::clone(&self.connector),
            devices: Arc::clone(&self.devices),
            settings: self.settings,
            cancel: self.generation.subscribe(),
        }
    }

    /// Installs the outcome of `negotiated` if its attempt is still current.
    ///
    /// # Errors
    ///
    /// [`DesktopError::Cancelled`] (bridge untouched, media released) when
    /// the attempt was superseded; otherwise as
    /// [`connect_to_peer`](Self::connect_to_peer).
    pub fn finish_connect(&mut self, negotiated: Negotiated) -> Result<(), DesktopError> {
        if negotiated.generation != *self.generation.borrow()
            || self.state != DesktopConnectionState::Connecting
        {
            debug!(peer = %negotiated.peer, "stale connection attempt discarded");
            negotiated.discard();
            return Err(DesktopError::Cancelled);
        }

        let Negotiated {
            peer,
            link,
            local_video,
            camera_error,
            ..
        } = negotiated;
        match link {
            Ok(link) => {
                self.link = Some(link);
                self.local_video = local_video;
                self.last_error = camera_error;
                self.state = DesktopConnectionState::Connected;
                info!(%peer, "remote desktop connected");
                Ok(())
            }
            Err(e) => {
                warn!(%peer, error = %e, "remote desktop negotiation failed");
                if let Some(video) = local_video {
                    video.stop();
                }
                self.state = DesktopConnectionState::Idle;
                self.peer = None;
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Sends a left click at `(x, y)` relative to the rendered video's box.
    ///
    /// # Errors
    ///
    /// See [`send_click_with`](Self::send_click_with).
    pub async fn send_click(&mut self, x: f64, y: f64) -> Result<(i32, i32), DesktopError> {
        self.send_click_with(x, y, MouseButton::Left).await
    }

    /// Sends a click, rescaled into source pixels with the live dimensions.
    ///
    /// Returns the transmitted source coordinates.
    ///
    /// # Errors
    ///
    /// [`DesktopError::NotConnected`], [`DesktopError::VideoNotReady`], or
    /// [`DesktopError::ChannelClosed`] (which also moves the bridge to `error`).
    pub async fn send_click_with(
        &mut self,
        x: f64,
        y: f64,
        button: MouseButton,
    ) -> Result<(i32, i32), DesktopError> {
        self.require_connected()?;
        let viewport = self
            .viewport
            .as_ref()
            .ok_or_else(|| DesktopError::VideoNotReady("no viewport attached".into()))?;
        let (sx, sy) = scale_to_source(x, y, viewport.bounding_rect(), viewport.natural_size())
            .map_err(|e| DesktopError::VideoNotReady(e.to_string()))?;
        debug!(x, y, sx, sy, "desktop click scaled to source");
        self.transmit(ControlFrame::Click { x: sx, y: sy, button }).await?;
        Ok((sx, sy))
    }

    /// Sends a literal key with the held modifiers.
    ///
    /// # Errors
    ///
    /// [`DesktopError::NotConnected`] or [`DesktopError::ChannelClosed`].
    pub async fn send_key(&mut self, key: &str, modifiers: &[Modifier]) -> Result<(), DesktopError> {
        self.require_connected()?;
        let frame = ControlFrame::Key {
            key: key.to_string(),
            modifiers: modifiers.iter().copied().collect(),
        };
        self.transmit(frame).await
    }

    /// Ends the session, cancelling a pending negotiation.  Safe to call in
    /// any state, any number of times.
    pub fn disconnect(&mut self) {
        if self.state == DesktopConnectionState::Idle && !self.holds_media() {
            debug!("remote desktop already idle");
            self.last_error = None;
            return;
        }
        self.teardown();
        self.bump_generation();
        self.state = DesktopConnectionState::Idle;
        self.peer = None;
        self.last_error = None;
        info!("remote desktop disconnected");
    }

    /// Reports a failure of the live link (remote stream ended, transport
    /// closed).  Tears everything down and moves to `error`.
    pub fn on_link_failure(&mut self, reason: &str) {
        if matches!(
            self.state,
            DesktopConnectionState::Connected | DesktopConnectionState::Connecting
        ) {
            self.fail(DesktopError::ChannelClosed(reason.to_string()));
        }
    }

    fn require_connected(&self) -> Result<(), DesktopError> {
        if self.state == DesktopConnectionState::Connected && self.link.is_some() {
            Ok(())
        } else {
            Err(DesktopError::NotConnected)
        }
    }

    async fn transmit(&mut self, frame: ControlFrame) -> Result<(), DesktopError> {
        let channel = match &self.link {
            Some(link) => Arc::clone(&link.channel),
            None => return Err(DesktopError::NotConnected),
        };
        let bytes = encode_frame_now(&frame, self.sequence.next())?;
        if let Err(e) = channel.send(bytes).await {
            self.fail(e.clone());
            return Err(e);
        }
        Ok(())
    }

    fn fail(&mut self, error: DesktopError) {
        error!(error = %error, "remote desktop link failed");
        self.teardown();
        self.bump_generation();
        self.state = DesktopConnectionState::Error;
        self.last_error = Some(error);
    }

    fn bump_generation(&mut self) -> u64 {
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
        *self.generation.borrow()
    }

    /// Stops every track and closes every handle.
    fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            release_link(link);
        }
        if let Some(video) = self.local_video.take() {
            video.stop();
        }
    }
}

fn release_link(link: PeerLink) {
    link.channel.close();
    link.screen.stop();
    if let Some(video) = link.remote_video {
        video.stop();
    }
    link.connection.close();
}

impl Drop for RemoteDesktopBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ── Child side ────────────────────────────────────────────────────────────────

/// What happened to one incoming control frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Applied(ControlFrame),
    /// Local session not active with the sender.
    Gated,
    /// Sequence number already seen.
    Duplicate(u64),
    Malformed(CodecError),
    Failed(DesktopError),
}

/// Child-side consumer of desktop control frames.
pub struct DesktopInputReceiver {
    injector: Arc<dyn DesktopInjector>,
    guard: SequenceGuard,
}

impl DesktopInputReceiver {
    pub fn new(injector: Arc<dyn DesktopInjector>) -> Self {
        Self {
            injector,
            guard: SequenceGuard::new(),
        }
    }

    /// Decodes and injects `bytes` from `from` if the session allows it.
    pub fn handle_frame(&mut self, session: &ControlSession, from: PeerId, bytes: &[u8]) -> FrameOutcome {
        if !session.is_active_with(from) {
            debug!(%from, state = ?session.state(), "desktop frame gated by consent");
            return FrameOutcome::Gated;
        }
        let decoded = match decode_frame(bytes) {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, "malformed desktop frame dropped");
                return FrameOutcome::Malformed(e);
            }
        };
        if !self.guard.accept(decoded.sequence) {
            debug!(sequence = decoded.sequence, "duplicate desktop frame dropped");
            return FrameOutcome::Duplicate(decoded.sequence);
        }

        let result = match &decoded.frame {
            ControlFrame::Click { x, y, button } => self.injector.click(*x, *y, *button),
            ControlFrame::Key { key, modifiers } => self.injector.key(key, *modifiers),
        };
        match result {
            Ok(()) => FrameOutcome::Applied(decoded.frame),
            Err(e) => {
                warn!(error = %e, "desktop input injection failed");
                FrameOutcome::Failed(e)
            }
        }
    }

    /// Forgets the sequence high-water mark (new control session).
    pub fn reset(&mut self) {
        self.guard.reset();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
