//! Mock peer connector, media devices, and desktop injector.
//!
//! Every handle given to the bridge has a matching *probe* kept here, so a
//! test can check after the fact that a stream was stopped or a channel was
//! closed even though the bridge owned (and dropped) the handle.
//!
//! ```ignore
//! let connector = Arc::new(MockPeerConnector::new());
//! bridge.connect_to_peer(child).await?;
//! bridge.disconnect();
//! assert!(!connector.last_link().unwrap().screen.is_live());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mentor_core::{ModifierSet, MouseButton, PeerId, Rect, Size};
use uuid::Uuid;

use crate::application::remote_desktop::{
    ControlChannel, DesktopError, DesktopInjector, MediaDevices, MediaStream, PeerConnection,
    PeerConnector, PeerLink, VideoViewport,
};

// ── Streams ───────────────────────────────────────────────────────────────────

/// Observes whether a [`MockMediaStream`] is still running.
#[derive(Debug, Clone)]
pub struct StreamProbe {
    pub id: String,
    live: Arc<AtomicBool>,
}

impl StreamProbe {
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// A media track that only tracks its running flag.
pub struct MockMediaStream {
    id: String,
    live: Arc<AtomicBool>,
}

impl MockMediaStream {
    /// Creates a live stream and the probe that observes it.
    pub fn new(kind: &str) -> (Self, StreamProbe) {
        let id = format!("{kind}-{}", Uuid::new_v4());
        let live = Arc::new(AtomicBool::new(true));
        let probe = StreamProbe {
            id: id.clone(),
            live: Arc::clone(&live),
        };
        (Self { id, live }, probe)
    }
}

impl MediaStream for MockMediaStream {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

// ── Control channel ───────────────────────────────────────────────────────────

/// Records every frame sent; can be told to fail.
#[derive(Default)]
pub struct MockControlChannel {
    frames: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
    failing: AtomicBool,
}

impl MockControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every frame sent so far.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Makes every later `send` fail with [`DesktopError::ChannelClosed`].
    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ControlChannel for MockControlChannel {
    async fn send(&self, frame: Vec<u8>) -> Result<(), DesktopError> {
        if self.is_closed() || self.failing.load(Ordering::SeqCst) {
            return Err(DesktopError::ChannelClosed("mock channel closed".into()));
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockPeerConnection {
    closed: Arc<AtomicBool>,
}

impl PeerConnection for MockPeerConnection {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

/// Everything observable about one negotiated link.
#[derive(Clone)]
pub struct LinkProbe {
    pub peer: PeerId,
    pub with_local_video: bool,
    pub screen: StreamProbe,
    pub remote_video: Option<StreamProbe>,
    pub channel: Arc<MockControlChannel>,
    connection: Arc<AtomicBool>,
}

impl LinkProbe {
    pub fn connection_closed(&self) -> bool {
        self.connection.load(Ordering::SeqCst)
    }
}

/// A connector whose negotiation succeeds, fails, or stalls on demand.
#[derive(Default)]
pub struct MockPeerConnector {
    remote_video: bool,
    failure: Option<String>,
    delay: Option<Duration>,
    links: Mutex<Vec<LinkProbe>>,
}

impl MockPeerConnector {
    /// Negotiation succeeds with a screen stream and a control channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`new`](Self::new), plus a remote webcam stream.
    pub fn with_remote_video() -> Self {
        Self {
            remote_video: true,
            ..Self::default()
        }
    }

    /// Negotiation always fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Negotiation takes `delay` before succeeding.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn links(&self) -> Vec<LinkProbe> {
        self.links.lock().unwrap().clone()
    }

    pub fn last_link(&self) -> Option<LinkProbe> {
        self.links.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PeerConnector for MockPeerConnector {
    async fn negotiate(&self, peer: PeerId, with_local_video: bool) -> Result<PeerLink, DesktopError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(DesktopError::ConnectionFailed(reason.clone()));
        }

        let (screen, screen_probe) = MockMediaStream::new("screen");
        let (remote_video, video_probe) = if self.remote_video {
            let (stream, probe) = MockMediaStream::new("remote-video");
            (Some(Box::new(stream) as Box<dyn MediaStream>), Some(probe))
        } else {
            (None, None)
        };
        let channel = Arc::new(MockControlChannel::new());
        let closed = Arc::new(AtomicBool::new(false));

        self.links.lock().unwrap().push(LinkProbe {
            peer,
            with_local_video,
            screen: screen_probe,
            remote_video: video_probe,
            channel: Arc::clone(&channel),
            connection: Arc::clone(&closed),
        });

        Ok(PeerLink {
            connection: Box::new(MockPeerConnection { closed }),
            screen: Box::new(screen),
            remote_video,
            channel,
        })
    }
}

// ── Devices ───────────────────────────────────────────────────────────────────

/// Camera access that is either granted or denied.
#[derive(Default)]
pub struct MockMediaDevices {
    deny: bool,
    opened: Mutex<Vec<StreamProbe>>,
}

impl MockMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every camera request is refused.
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    /// Probes of every camera stream handed out.
    pub fn opened(&self) -> Vec<StreamProbe> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn open_camera(&self) -> Result<Box<dyn MediaStream>, DesktopError> {
        if self.deny {
            return Err(DesktopError::PermissionDenied("camera access refused".into()));
        }
        let (stream, probe) = MockMediaStream::new("camera");
        self.opened.lock().unwrap().push(probe);
        Ok(Box::new(stream))
    }
}

// ── Viewport and injector ─────────────────────────────────────────────────────

/// A viewport whose geometry can be changed between clicks.
pub struct FixedViewport {
    rect: Mutex<Rect>,
    natural: Size,
}

impl FixedViewport {
    pub fn new(rect: Rect, natural: Size) -> Self {
        Self {
            rect: Mutex::new(rect),
            natural,
        }
    }

    /// Simulates a layout reflow of the rendered video.
    pub fn resize(&self, rect: Rect) {
        *self.rect.lock().unwrap() = rect;
    }
}

impl VideoViewport for FixedViewport {
    fn bounding_rect(&self) -> Rect {
        *self.rect.lock().unwrap()
    }

    fn natural_size(&self) -> Size {
        self.natural
    }
}

/// Records injected clicks and keys instead of synthesizing them.
#[derive(Default)]
pub struct MockDesktopInjector {
    pub(crate) clicks: Mutex<Vec<(i32, i32, MouseButton)>>,
    pub(crate) keys: Mutex<Vec<(String, ModifierSet)>>,
    /// When `true`, every injection returns [`DesktopError::Injection`].
    pub should_fail: bool,
}

impl MockDesktopInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clicks(&self) -> Vec<(i32, i32, MouseButton)> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<(String, ModifierSet)> {
        self.keys.lock().unwrap().clone()
    }
}

impl DesktopInjector for MockDesktopInjector {
    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<(), DesktopError> {
        if self.should_fail {
            return Err(DesktopError::Injection("mock failure".into()));
        }
        self.clicks.lock().unwrap().push((x, y, button));
        Ok(())
    }

    fn key(&self, key: &str, modifiers: ModifierSet) -> Result<(), DesktopError> {
        if self.should_fail {
            return Err(DesktopError::Injection("mock failure".into()));
        }
        self.keys.lock().unwrap().push((key.to_string(), modifiers));
        Ok(())
    }
}
