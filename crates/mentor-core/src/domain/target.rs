//! Target descriptors: how a UI element is named across two clients.
//!
//! The mentor's client turns the element it clicked (or typed into) into a
//! [`TargetDescriptor`]; the child's client resolves the same descriptor
//! against its own registry of controls.  The descriptor is a logical
//! capability lookup, not a structural path, so presentation changes that keep
//! the identifiers stable do not break replay.
//!
//! # Priority rules
//!
//! | Source                  | 1st        | 2nd          | 3rd                        |
//! |-------------------------|------------|--------------|----------------------------|
//! | clicked element         | identifier | control hook | first two style classes    |
//! | text field              | identifier | field name   | control hook               |
//!
//! # Wire form
//!
//! On the wire a descriptor travels as a selector string:
//!
//! ```text
//! #save-button            element identifier
//! [data-control="next"]   control hook
//! [name="title"]          field name
//! .card.primary           class path (at most two tokens)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attribute name the UI uses to tag a control with a stable hook.
pub const CONTROL_HOOK_ATTR: &str = "data-control";

/// Maximum number of style classes used to build a class-path descriptor.
const MAX_CLASS_TOKENS: usize = 2;

/// What the capture side knows about a clicked element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementInfo {
    pub id: Option<String>,
    pub control_hook: Option<String>,
    pub classes: Vec<String>,
}

/// What the capture side knows about a text field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub control_hook: Option<String>,
}

/// Error returned when a selector string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised selector: {0:?}")]
pub struct SelectorParseError(pub String);

/// A stable, role-independent reference to a UI control.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetDescriptor {
    ElementId(String),
    ControlHook(String),
    FieldName(String),
    ClassPath(Vec<String>),
}

impl TargetDescriptor {
    /// Derives the descriptor for a clicked element.
    ///
    /// Returns `None` when the element carries nothing usable, in which case
    /// the click is not mirrored.
    pub fn for_element(element: &ElementInfo) -> Option<Self> {
        if let Some(id) = non_empty(&element.id) {
            return Some(Self::ElementId(id.to_string()));
        }
        if let Some(hook) = non_empty(&element.control_hook) {
            return Some(Self::ControlHook(hook.to_string()));
        }
        let classes: Vec<String> = element
            .classes
            .iter()
            .flat_map(|c| c.split_whitespace())
            .take(MAX_CLASS_TOKENS)
            .map(str::to_string)
            .collect();
        if classes.is_empty() {
            None
        } else {
            Some(Self::ClassPath(classes))
        }
    }

    /// Derives the descriptor for a text field.
    pub fn for_field(field: &FieldInfo) -> Option<Self> {
        non_empty(&field.id)
            .map(|id| Self::ElementId(id.to_string()))
            .or_else(|| non_empty(&field.name).map(|n| Self::FieldName(n.to_string())))
            .or_else(|| non_empty(&field.control_hook).map(|h| Self::ControlHook(h.to_string())))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementId(id) => write!(f, "#{id}"),
            Self::ControlHook(hook) => write!(f, "[{CONTROL_HOOK_ATTR}=\"{hook}\"]"),
            Self::FieldName(name) => write!(f, "[name=\"{name}\"]"),
            Self::ClassPath(classes) => write!(f, ".{}", classes.join(".")),
        }
    }
}

impl FromStr for TargetDescriptor {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SelectorParseError(s.to_string());
        let s = s.trim();

        if let Some(id) = s.strip_prefix('#') {
            return if id.is_empty() { Err(err()) } else { Ok(Self::ElementId(id.to_string())) };
        }
        if let Some(path) = s.strip_prefix('.') {
            let classes: Vec<String> = path.split('.').map(str::to_string).collect();
            if classes.iter().any(String::is_empty) {
                return Err(err());
            }
            return Ok(Self::ClassPath(classes));
        }
        if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let (attr, value) = inner.split_once('=').ok_or_else(err)?;
            let value = value.trim_matches('"');
            if value.is_empty() {
                return Err(err());
            }
            return match attr {
                CONTROL_HOOK_ATTR => Ok(Self::ControlHook(value.to_string())),
                "name" => Ok(Self::FieldName(value.to_string())),
                _ => Err(err()),
            };
        }
        Err(err())
    }
}

impl TryFrom<String> for TargetDescriptor {
    type Error = SelectorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetDescriptor> for String {
    fn from(value: TargetDescriptor) -> Self {
        value.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
