//! Codecs for signaling envelopes and desktop control frames.
//!
//! # Signaling envelopes
//!
//! The signaling channel carries JSON objects of the form
//!
//! ```text
//! { "event": "input:click", "from": "<uuid>", "to": "<uuid>|null", "payload": { ... } }
//! ```
//!
//! [`encode_signal`] and [`decode_signal`] convert between [`SignalMessage`]
//! and [`Envelope`].  Decoding is strict: an unknown event name or a payload
//! that does not match its event is an error, so the caller can drop the
//! envelope without touching any state.
//!
//! # Control frames
//!
//! Desktop clicks and key presses use a compact binary format:
//!
//! ```text
//! [version:1][frame_type:1][reserved:2][payload_len:4][seq:8][timestamp_us:8][payload:N]
//! ```
//!
//! Total header size: 24 bytes. All multi-byte integers are big-endian.
//!
//! | Frame | Payload                                        |
//! |-------|------------------------------------------------|
//! | Click | `x:i32` `y:i32` `button:u8`                    |
//! | Key   | `modifiers:u8` `key_len:u16` `key:utf8[key_len]` |

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::roles::PeerId;
use crate::protocol::messages::{
    ControlFrame, EventKind, FrameType, ModifierSet, MouseButton, SignalMessage,
    FRAME_HEADER_SIZE, FRAME_VERSION,
};

/// Errors that can occur while encoding or decoding either message family.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CodecError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The frame type byte in the header is not a recognized value.
    #[error("unknown frame type: 0x{0:02X}")]
    UnknownFrameType(u8),

    /// The frame version in the header is not supported.
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// The frame payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The declared payload length does not match the data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The envelope names an event outside the catalogue.
    #[error("unknown event: {0:?}")]
    UnknownEvent(String),

    /// The envelope payload does not have the shape its event requires.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },

    /// The envelope itself is not valid JSON.
    #[error("invalid envelope: {0}")]
    Json(String),
}

// ── Signaling envelopes ───────────────────────────────────────────────────────

/// One message as it travels over the signaling channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub from: PeerId,
    /// Intended recipient; `None` broadcasts to every subscriber of the room.
    #[serde(default)]
    pub to: Option<PeerId>,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Returns `true` if `peer` should process this envelope.
    ///
    /// Envelopes are never delivered back to their sender.
    pub fn is_for(&self, peer: PeerId) -> bool {
        self.from != peer && self.to.map_or(true, |to| to == peer)
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|e| CodecError::Json(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text).map_err(|e| CodecError::Json(e.to_string()))
    }
}

/// Wraps a [`SignalMessage`] in an [`Envelope`].
///
/// # Errors
///
/// Returns [`CodecError::InvalidPayload`] if the payload cannot be serialized.
///
/// # Examples
///
/// ```rust
/// use mentor_core::protocol::{decode_signal, encode_signal, SignalMessage};
/// use uuid::Uuid;
///
/// let from = Uuid::new_v4();
/// let env = encode_signal(&SignalMessage::ControlAccept, from, None).unwrap();
/// assert_eq!(env.event, "control:accept");
/// assert_eq!(decode_signal(&env).unwrap(), SignalMessage::ControlAccept);
/// ```
pub fn encode_signal(
    msg: &SignalMessage,
    from: PeerId,
    to: Option<PeerId>,
) -> Result<Envelope, CodecError> {
    let kind = msg.kind();
    let payload = match msg {
        SignalMessage::ControlRequest(m) => to_value(kind, m)?,
        SignalMessage::ControlAccept
        | SignalMessage::ControlReject
        | SignalMessage::ControlRelease => Value::Null,
        SignalMessage::CursorMove(m) => to_value(kind, m)?,
        SignalMessage::InputClick(m) => to_value(kind, m)?,
        SignalMessage::InputKey(m) => to_value(kind, m)?,
        SignalMessage::ModeChange(m) => to_value(kind, m)?,
        SignalMessage::MissionAssign(m) => to_value(kind, m)?,
        SignalMessage::MissionDismiss(m) => to_value(kind, m)?,
    };
    Ok(Envelope {
        event: kind.as_str().to_string(),
        from,
        to,
        payload,
    })
}

/// Interprets an [`Envelope`] as a [`SignalMessage`].
///
/// # Errors
///
/// Returns [`CodecError::UnknownEvent`] or [`CodecError::InvalidPayload`].
pub fn decode_signal(env: &Envelope) -> Result<SignalMessage, CodecError> {
    let kind = EventKind::try_from(env.event.as_str())
        .map_err(|_| CodecError::UnknownEvent(env.event.clone()))?;
    let payload = &env.payload;
    let msg = match kind {
        EventKind::ControlRequest => SignalMessage::ControlRequest(from_value(kind, payload)?),
        EventKind::ControlAccept => SignalMessage::ControlAccept,
        EventKind::ControlReject => SignalMessage::ControlReject,
        EventKind::ControlRelease => SignalMessage::ControlRelease,
        EventKind::CursorMove => SignalMessage::CursorMove(from_value(kind, payload)?),
        EventKind::InputClick => SignalMessage::InputClick(from_value(kind, payload)?),
        EventKind::InputKey => SignalMessage::InputKey(from_value(kind, payload)?),
        EventKind::ModeChange => SignalMessage::ModeChange(from_value(kind, payload)?),
        EventKind::MissionAssign => SignalMessage::MissionAssign(from_value(kind, payload)?),
        EventKind::MissionDismiss => SignalMessage::MissionDismiss(from_value(kind, payload)?),
    };
    Ok(msg)
}

fn to_value<T: Serialize>(kind: EventKind, value: &T) -> Result<Value, CodecError> {
    serde_json::to_value(value).map_err(|e| CodecError::InvalidPayload {
        event: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}

fn from_value<T: for<'de> Deserialize<'de>>(kind: EventKind, value: &Value) -> Result<T, CodecError> {
    T::deserialize(value).map_err(|e| CodecError::InvalidPayload {
        event: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}

// ── Control frames ────────────────────────────────────────────────────────────

/// A decoded control frame together with its header metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame: ControlFrame,
    pub sequence: u64,
    pub timestamp_us: u64,
    /// Total bytes consumed (header + payload).
    pub consumed: usize,
}

/// Encodes a [`ControlFrame`] including the 24-byte header.
///
/// Pass a pre-incremented value from a [`crate::protocol::SequenceCounter`].
///
/// # Errors
///
/// Returns [`CodecError::MalformedPayload`] if a key name exceeds `u16::MAX` bytes.
///
/// # Examples
///
/// ```rust
/// use mentor_core::protocol::{decode_frame, encode_frame, ControlFrame, MouseButton};
///
/// let frame = ControlFrame::Click { x: 200, y: 200, button: MouseButton::Left };
/// let bytes = encode_frame(&frame, 7, 0).unwrap();
/// let decoded = decode_frame(&bytes).unwrap();
/// assert_eq!(decoded.frame, frame);
/// assert_eq!(decoded.sequence, 7);
/// ```
pub fn encode_frame(
    frame: &ControlFrame,
    sequence_number: u64,
    timestamp_us: u64,
) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::new();
    match frame {
        ControlFrame::Click { x, y, button } => {
            payload.extend_from_slice(&x.to_be_bytes());
            payload.extend_from_slice(&y.to_be_bytes());
            payload.push(*button as u8);
        }
        ControlFrame::Key { key, modifiers } => {
            let key_len = u16::try_from(key.len())
                .map_err(|_| CodecError::MalformedPayload(format!("key too long: {} bytes", key.len())))?;
            payload.push(modifiers.0);
            payload.extend_from_slice(&key_len.to_be_bytes());
            payload.extend_from_slice(key.as_bytes());
        }
    }

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.push(FRAME_VERSION);
    buf.push(frame.frame_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&sequence_number.to_be_bytes());
    buf.extend_from_slice(&timestamp_us.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Encodes a [`ControlFrame`] stamped with the current system time.
pub fn encode_frame_now(frame: &ControlFrame, sequence_number: u64) -> Result<Vec<u8>, CodecError> {
    let timestamp_us = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;
    encode_frame(frame, sequence_number, timestamp_us)
}

/// Decodes one [`ControlFrame`] from the beginning of `bytes`.
///
/// # Errors
///
/// Returns [`CodecError`] if the bytes are malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame, CodecError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(CodecError::InsufficientData {
            needed: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != FRAME_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let frame_type =
        FrameType::try_from(bytes[1]).map_err(|_| CodecError::UnknownFrameType(bytes[1]))?;

    // bytes[2..4] are reserved

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let sequence = read_u64(&bytes[8..16]);
    let timestamp_us = read_u64(&bytes[16..24]);

    let total = FRAME_HEADER_SIZE + payload_len;
    if bytes.len() < total {
        return Err(CodecError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - FRAME_HEADER_SIZE,
        });
    }
    let payload = &bytes[FRAME_HEADER_SIZE..total];

    let frame = match frame_type {
        FrameType::Click => decode_click(payload)?,
        FrameType::Key => decode_key(payload)?,
    };
    Ok(DecodedFrame {
        frame,
        sequence,
        timestamp_us,
        consumed: total,
    })
}

fn read_u64(b: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&b[..8]);
    u64::from_be_bytes(arr)
}

fn require(payload: &[u8], needed: usize) -> Result<(), CodecError> {
    if payload.len() < needed {
        Err(CodecError::InsufficientData {
            needed,
            available: payload.len(),
        })
    } else {
        Ok(())
    }
}

fn decode_click(p: &[u8]) -> Result<ControlFrame, CodecError> {
    require(p, 9)?;
    let x = i32::from_be_bytes([p[0], p[1], p[2], p[3]]);
    let y = i32::from_be_bytes([p[4], p[5], p[6], p[7]]);
    let button = MouseButton::try_from(p[8])
        .map_err(|_| CodecError::MalformedPayload(format!("unknown mouse button: 0x{:02X}", p[8])))?;
    Ok(ControlFrame::Click { x, y, button })
}

fn decode_key(p: &[u8]) -> Result<ControlFrame, CodecError> {
    require(p, 3)?;
    let bits = p[0];
    if bits & !ModifierSet::MASK != 0 {
        return Err(CodecError::MalformedPayload(format!(
            "undefined modifier bits: 0b{bits:08b}"
        )));
    }
    let key_len = u16::from_be_bytes([p[1], p[2]]) as usize;
    require(p, 3 + key_len)?;
    let key = std::str::from_utf8(&p[3..3 + key_len])
        .map_err(|e| CodecError::MalformedPayload(format!("key is not UTF-8: {e}")))?
        .to_string();
    if key.is_empty() {
        return Err(CodecError::MalformedPayload("empty key".to_string()));
    }
    Ok(ControlFrame::Key {
        key,
        modifiers: ModifierSet(bits),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
