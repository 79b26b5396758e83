//! Client roles and peer identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a client instance, derived from UUID v4.
pub type PeerId = Uuid;

/// The role a client plays for the whole lifetime of its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The controlling/guiding side.
    Mentor,
    /// The controlled/assisted side.
    Child,
}

impl Role {
    /// Returns the role expected on the other end of a session.
    pub fn counterpart(self) -> Role {
        match self {
            Role::Mentor => Role::Child,
            Role::Child => Role::Mentor,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Mentor => f.write_str("mentor"),
            Role::Child => f.write_str("child"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mentor" => Ok(Role::Mentor),
            "child" => Ok(Role::Child),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A counterpart client as announced by the signaling layer.
///
/// Peers are mirrored from presence notifications; the core never creates
/// them on its own initiative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub display_name: String,
    pub role: Role,
    pub online: bool,
}

impl Peer {
    /// Creates an online peer with a fresh identifier.
    pub fn new(display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            role,
            online: true,
        }
    }
}
