//! InputMirror: mirrors UI interactions from the mentor's client onto the
//! child's client.
//!
//! # Sender (mentor)
//!
//! [`MirrorSender`] turns local UI observations into signaling messages:
//!
//! - **Pointer moves** become `cursor:move`, throttled to one message per
//!   `cursor_throttle` (16 ms, ≈ 60 Hz).  Intermediate samples are dropped.
//! - **Clicks** become `input:click` with a [`TargetDescriptor`].  The host UI
//!   must report clicks from a capture-phase listener so the mirror sees the
//!   event before any local handler can stop it.
//! - **Text fields** become `input:key` on every change, plus one more with
//!   `key = "Enter"` on submission.
//! - **Mode** becomes `mode:change`, only when it differs from the last value
//!   sent.
//!
//! # Receiver (child)
//!
//! [`MirrorReceiver`] replays `input:*` and `mode:change` through a
//! [`DocumentSurface`].  Every replay is gated on the child's own
//! [`ControlSession`] being `Active` with the sender; the message itself is
//! never trusted.  A target that does not resolve drops that one event.

use std::sync::Arc;
use std::time::Duration;

use mentor_core::protocol::messages::{
    ClickPayload, CursorMovePayload, KeyPayload, ModeChangePayload, SUBMIT_KEY,
};
use mentor_core::{ControlSession, ElementInfo, FieldInfo, PeerId, SignalMessage, TargetDescriptor};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Default minimum spacing between two `cursor:move` messages.
pub const CURSOR_THROTTLE: Duration = Duration::from_millis(16);

// ── Document surface seam ─────────────────────────────────────────────────────

/// Opaque handle to a resolved control on the child's UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// Errors reported by the host UI while applying a replayed action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurfaceError {
    /// The handle no longer refers to a live control.
    #[error("element {0:?} is no longer attached")]
    Detached(ElementHandle),

    /// The control exists but does not support the action (e.g. typing into a button).
    #[error("element {handle:?} does not support {action}")]
    Unsupported {
        handle: ElementHandle,
        action: &'static str,
    },
}

/// The child's UI as seen by the replay pipeline.
///
/// Implementations resolve descriptors through a registry of control hooks
/// rather than the structural document tree.
pub trait DocumentSurface: Send + Sync {
    /// Resolves a descriptor to a live control, if any.
    fn resolve(&self, target: &TargetDescriptor) -> Option<ElementHandle>;

    /// Activates a control (synthetic click).
    fn activate(&self, element: ElementHandle) -> Result<(), SurfaceError>;

    /// Replaces the value of a text control.
    fn set_value(&self, element: ElementHandle, value: &str) -> Result<(), SurfaceError>;

    /// Submits the form or action a text control belongs to.
    fn submit(&self, element: ElementHandle) -> Result<(), SurfaceError>;

    /// Switches the application into `mode`.
    fn set_mode(&self, mode: &str) -> Result<(), SurfaceError>;
}

// ── Sender ────────────────────────────────────────────────────────────────────

/// Mentor-side capture pipeline.
#[derive(Debug)]
pub struct MirrorSender {
    throttle: Duration,
    last_cursor: Option<Instant>,
    last_mode: Option<String>,
}

impl MirrorSender {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            last_cursor: None,
            last_mode: None,
        }
    }

    /// Returns a `cursor:move` unless one was produced less than `throttle` ago.
    pub fn pointer_moved(&mut self, x: f64, y: f64, now: Instant) -> Option<SignalMessage> {
        if let Some(last) = self.last_cursor {
            if now.saturating_duration_since(last) < self.throttle {
                return None;
            }
        }
        self.last_cursor = Some(now);
        Some(SignalMessage::CursorMove(CursorMovePayload { x, y }))
    }

    /// Returns an `input:click` for a clicked element, or `None` when the
    /// element has nothing to identify it by.
    pub fn clicked(&self, element: &ElementInfo, x: f64, y: f64) -> Option<SignalMessage> {
        let Some(selector) = TargetDescriptor::for_element(element) else {
            debug!(?element, "click on unidentifiable element not mirrored");
            return None;
        };
        Some(SignalMessage::InputClick(ClickPayload { selector, x, y }))
    }

    /// Returns an `input:key` carrying the field's new value.
    pub fn field_changed(&self, field: &FieldInfo, value: &str) -> Option<SignalMessage> {
        self.key_input(field, value, None)
    }

    /// Returns an `input:key` with the submit intent.
    pub fn field_submitted(&self, field: &FieldInfo, value: &str) -> Option<SignalMessage> {
        self.key_input(field, value, Some(SUBMIT_KEY.to_string()))
    }

    /// Returns a `mode:change` if `mode` differs from the last one sent.
    pub fn mode_observed(&mut self, mode: &str) -> Option<SignalMessage> {
        if self.last_mode.as_deref() == Some(mode) {
            return None;
        }
        self.last_mode = Some(mode.to_string());
        Some(SignalMessage::ModeChange(ModeChangePayload {
            mode: mode.to_string(),
        }))
    }

    /// Forgets throttle and mode history (control session ended).
    pub fn reset(&mut self) {
        self.last_cursor = None;
        self.last_mode = None;
    }

    fn key_input(&self, field: &FieldInfo, value: &str, key: Option<String>) -> Option<SignalMessage> {
        let Some(selector) = TargetDescriptor::for_field(field) else {
            debug!(?field, "input on unidentifiable field not mirrored");
            return None;
        };
        Some(SignalMessage::InputKey(KeyPayload {
            selector,
            value: value.to_string(),
            key,
        }))
    }
}

impl Default for MirrorSender {
    fn default() -> Self {
        Self::new(CURSOR_THROTTLE)
    }
}

// ── Receiver ──────────────────────────────────────────────────────────────────

/// What happened to one replayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The action was applied to the local UI.
    Applied,
    /// The local session is not active with the sender; nothing was done.
    Gated,
    /// The target did not resolve; the event was dropped.
    Unresolved,
    /// The UI refused the action.
    Failed(SurfaceError),
    /// Not a replayable message (e.g. `cursor:move`, `control:*`).
    NotReplayable,
}

/// Child-side replay pipeline.
pub struct MirrorReceiver {
    surface: Arc<dyn DocumentSurface>,
}

impl MirrorReceiver {
    pub fn new(surface: Arc<dyn DocumentSurface>) -> Self {
        Self { surface }
    }

    /// Replays `message` from `from` if, and only if, `session` is active
    /// with that peer.
    pub fn apply(&self, session: &ControlSession, from: PeerId, message: &SignalMessage) -> ReplayOutcome {
        let replayable = matches!(
            message,
            SignalMessage::InputClick(_) | SignalMessage::InputKey(_) | SignalMessage::ModeChange(_)
        );
        if !replayable {
            return ReplayOutcome::NotReplayable;
        }
        if !session.is_active_with(from) {
            debug!(%from, event = message.kind().as_str(), state = ?session.state(), "replay gated by consent");
            return ReplayOutcome::Gated;
        }

        let result = match message {
            SignalMessage::InputClick(click) => match self.resolve(&click.selector) {
                Some(el) => self.surface.activate(el),
                None => return ReplayOutcome::Unresolved,
            },
            SignalMessage::InputKey(key) => match self.resolve(&key.selector) {
                Some(el) => self.surface.set_value(el, &key.value).and_then(|()| {
                    if key.is_submit() {
                        self.surface.submit(el)
                    } else {
                        Ok(())
                    }
                }),
                None => return ReplayOutcome::Unresolved,
            },
            SignalMessage::ModeChange(mode) => self.surface.set_mode(&mode.mode),
            _ => return ReplayOutcome::NotReplayable,
        };

        match result {
            Ok(()) => ReplayOutcome::Applied,
            Err(e) => {
                debug!(error = %e, "replayed action refused by surface");
                ReplayOutcome::Failed(e)
            }
        }
    }

    fn resolve(&self, target: &TargetDescriptor) -> Option<ElementHandle> {
        let handle = self.surface.resolve(target);
        if handle.is_none() {
            debug!(%target, "replay target not found, event dropped");
        }
        handle
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
