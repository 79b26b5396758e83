//! All mentor remote-assistance message types.
//!
//! Two families of messages exist:
//!
//! - [`SignalMessage`] travels over the external publish/subscribe signaling
//!   channel as a named event plus a JSON payload.
//! - [`ControlFrame`] travels over the ordered peer-to-peer data channel of a
//!   remote-desktop session, encoded in the compact binary frame format.

use serde::{Deserialize, Serialize};

use crate::domain::handshake::ControlRequest;
use crate::domain::target::TargetDescriptor;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current control-frame format version byte.
pub const FRAME_VERSION: u8 = 0x01;

/// Total size of the control-frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 24;

/// Key value carried by `input:key` when a field is submitted.
pub const SUBMIT_KEY: &str = "Enter";

// ── Signaling event names ─────────────────────────────────────────────────────

/// Every event name in the signaling catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ControlRequest,
    ControlAccept,
    ControlReject,
    ControlRelease,
    CursorMove,
    InputClick,
    InputKey,
    ModeChange,
    MissionAssign,
    MissionDismiss,
}

impl EventKind {
    /// The event name used on the signaling channel.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ControlRequest => "control:request",
            EventKind::ControlAccept => "control:accept",
            EventKind::ControlReject => "control:reject",
            EventKind::ControlRelease => "control:release",
            EventKind::CursorMove => "cursor:move",
            EventKind::InputClick => "input:click",
            EventKind::InputKey => "input:key",
            EventKind::ModeChange => "mode:change",
            EventKind::MissionAssign => "mission:assign",
            EventKind::MissionDismiss => "mission:dismiss",
        }
    }

    /// Returns `true` for events that must arrive reliably and in order.
    ///
    /// Cursor moves are lossy by design; everything else is not.
    pub fn requires_ordered_delivery(self) -> bool {
        !matches!(self, EventKind::CursorMove)
    }
}

impl TryFrom<&str> for EventKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, ()> {
        match value {
            "control:request" => Ok(EventKind::ControlRequest),
            "control:accept" => Ok(EventKind::ControlAccept),
            "control:reject" => Ok(EventKind::ControlReject),
            "control:release" => Ok(EventKind::ControlRelease),
            "cursor:move" => Ok(EventKind::CursorMove),
            "input:click" => Ok(EventKind::InputClick),
            "input:key" => Ok(EventKind::InputKey),
            "mode:change" => Ok(EventKind::ModeChange),
            "mission:assign" => Ok(EventKind::MissionAssign),
            "mission:dismiss" => Ok(EventKind::MissionDismiss),
            _ => Err(()),
        }
    }
}

// ── Signaling payloads ────────────────────────────────────────────────────────

/// `cursor:move`: viewport-relative pointer position on the mentor's client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorMovePayload {
    pub x: f64,
    pub y: f64,
}

/// `input:click`: a click on a resolvable control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickPayload {
    pub selector: TargetDescriptor,
    /// Viewport-relative click position (informational for the replay).
    pub x: f64,
    pub y: f64,
}

/// `input:key`: the new value of a text field, optionally with a submit key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPayload {
    pub selector: TargetDescriptor,
    pub value: String,
    /// `Some("Enter")` when the field was submitted; `None` for a plain change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl KeyPayload {
    /// Returns `true` if this input carries the submit intent.
    pub fn is_submit(&self) -> bool {
        self.key.as_deref() == Some(SUBMIT_KEY)
    }
}

/// `mode:change`: the mentor's application switched mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChangePayload {
    pub mode: String,
}

/// An assignment shown to the child as a short "mission flash".
///
/// The payload is opaque to this crate and is forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// `mission:dismiss`: removes the mission with the given id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionDismissPayload {
    pub id: String,
}

// ── Top-level signaling enum ──────────────────────────────────────────────────

/// All valid signaling messages, discriminated by event name.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalMessage {
    ControlRequest(ControlRequest),
    ControlAccept,
    ControlReject,
    ControlRelease,
    CursorMove(CursorMovePayload),
    InputClick(ClickPayload),
    InputKey(KeyPayload),
    ModeChange(ModeChangePayload),
    MissionAssign(Mission),
    MissionDismiss(MissionDismissPayload),
}

impl SignalMessage {
    /// Returns the [`EventKind`] discriminant for this message.
    pub fn kind(&self) -> EventKind {
        match self {
            SignalMessage::ControlRequest(_) => EventKind::ControlRequest,
            SignalMessage::ControlAccept => EventKind::ControlAccept,
            SignalMessage::ControlReject => EventKind::ControlReject,
            SignalMessage::ControlRelease => EventKind::ControlRelease,
            SignalMessage::CursorMove(_) => EventKind::CursorMove,
            SignalMessage::InputClick(_) => EventKind::InputClick,
            SignalMessage::InputKey(_) => EventKind::InputKey,
            SignalMessage::ModeChange(_) => EventKind::ModeChange,
            SignalMessage::MissionAssign(_) => EventKind::MissionAssign,
            SignalMessage::MissionDismiss(_) => EventKind::MissionDismiss,
        }
    }
}

// ── Remote desktop control frames ─────────────────────────────────────────────

/// Control-frame type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Click = 0x01,
    Key = 0x02,
}

impl TryFrom<u8> for FrameType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(FrameType::Click),
            0x02 => Ok(FrameType::Key),
            _ => Err(()),
        }
    }
}

/// Mouse button identifier for desktop clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButton {
    #[default]
    Left = 0x01,
    Right = 0x02,
    Middle = 0x03,
}

impl TryFrom<u8> for MouseButton {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MouseButton::Left),
            0x02 => Ok(MouseButton::Right),
            0x03 => Ok(MouseButton::Middle),
            _ => Err(()),
        }
    }
}

/// A modifier key held during a forwarded key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    /// Command (macOS) / Windows / Super.
    Cmd,
    Shift,
    Alt,
    Ctrl,
}

impl Modifier {
    const ALL: [Modifier; 4] = [Modifier::Cmd, Modifier::Shift, Modifier::Alt, Modifier::Ctrl];

    fn bit(self) -> u8 {
        match self {
            Modifier::Cmd => 1 << 0,
            Modifier::Shift => 1 << 1,
            Modifier::Alt => 1 << 2,
            Modifier::Ctrl => 1 << 3,
        }
    }
}

/// Set of modifiers, packed into one byte on the wire.
///
/// Bit layout: bit 0 Cmd, bit 1 Shift, bit 2 Alt, bit 3 Ctrl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifierSet(pub u8);

impl ModifierSet {
    /// Mask of all defined bits.
    pub const MASK: u8 = 0b0000_1111;

    pub fn contains(&self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    pub fn insert(&mut self, modifier: Modifier) {
        self.0 |= modifier.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterates the modifiers in a fixed order (cmd, shift, alt, ctrl).
    pub fn iter(&self) -> impl Iterator<Item = Modifier> + '_ {
        Modifier::ALL.into_iter().filter(|m| self.contains(*m))
    }
}

impl FromIterator<Modifier> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        let mut set = ModifierSet::default();
        for m in iter {
            set.insert(m);
        }
        set
    }
}

/// A click or key press forwarded to the child's native desktop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// A click at source-screen coordinates.
    Click { x: i32, y: i32, button: MouseButton },
    /// A literal key plus the modifiers held with it.
    Key { key: String, modifiers: ModifierSet },
}

impl ControlFrame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            ControlFrame::Click { .. } => FrameType::Click,
            ControlFrame::Key { .. } => FrameType::Key,
        }
    }
}
