//! Ghost cursor state: the mentor's pointer as rendered on the child's display.
//!
//! The ghost cursor is a receiver-side artifact.  It is moved only by incoming
//! `cursor:move` messages, hidden by its own inactivity countdown, and hidden
//! immediately whenever the owning control session leaves `Active`.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Inactivity period after which the ghost cursor is hidden.
pub const CURSOR_TIMEOUT: Duration = Duration::from_millis(3000);

/// Position and visibility of the mentor's ghost cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GhostCursor {
    /// Viewport-relative X position.
    pub x: f64,
    /// Viewport-relative Y position.
    pub y: f64,
    pub visible: bool,
    #[serde(skip)]
    pub last_update: Option<Instant>,
}

impl GhostCursor {
    /// Records a new position and makes the cursor visible.
    pub fn apply_move(&mut self, x: f64, y: f64, now: Instant) {
        self.x = x;
        self.y = y;
        self.visible = true;
        self.last_update = Some(now);
    }

    /// Returns `true` when the cursor is visible but has not moved for `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_update {
            Some(at) if self.visible => now.saturating_duration_since(at) >= timeout,
            _ => false,
        }
    }

    /// Hides the cursor if it is stale; returns `true` if it was hidden.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> bool {
        if self.is_stale(now, timeout) {
            self.visible = false;
            true
        } else {
            false
        }
    }

    /// Hides the cursor regardless of the countdown.
    pub fn hide(&mut self) {
        self.visible = false;
    }
}
