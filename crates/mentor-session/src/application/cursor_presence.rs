//! CursorPresence: the mentor's ghost cursor on the child's display.
//!
//! Only the child client creates one.  Each accepted `cursor:move` shows the
//! cursor at the new position and restarts a countdown (3000 ms by default);
//! when the countdown runs out the cursor hides.  The session hides it
//! immediately whenever control leaves `Active`, without waiting.
//!
//! The current value is published on a `tokio::sync::watch` channel so the
//! UI can render the latest position without polling.
//!
//! # Timer (for beginners)
//!
//! Every move aborts the previous countdown task and spawns a new one.  The
//! task also remembers a *generation* number; if a move slipped in between
//! the timer firing and the task running, the numbers no longer match and the
//! stale task leaves the cursor alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mentor_core::{GhostCursor, CURSOR_TIMEOUT};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

pub struct CursorPresence {
    timeout: Duration,
    state: Arc<watch::Sender<GhostCursor>>,
    generation: Arc<AtomicU64>,
    timer: Option<JoinHandle<()>>,
}

impl CursorPresence {
    pub fn new(timeout: Duration) -> Self {
        let (tx, _rx) = watch::channel(GhostCursor::default());
        Self {
            timeout,
            state: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
            timer: None,
        }
    }

    /// A receiver that always holds the latest cursor state.
    pub fn subscribe(&self) -> watch::Receiver<GhostCursor> {
        self.state.subscribe()
    }

    pub fn current(&self) -> GhostCursor {
        *self.state.borrow()
    }

    /// Shows the cursor at `(x, y)` and restarts the inactivity countdown.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_move(&mut self, x: f64, y: f64) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|c| c.apply_move(x, y, Instant::now()));
        trace!(x, y, "ghost cursor moved");

        if let Some(previous) = self.timer.take() {
            previous.abort();
        }
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);
        let timeout = self.timeout;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            state.send_if_modified(|c| {
                if current.load(Ordering::SeqCst) == generation && c.visible {
                    c.hide();
                    trace!("ghost cursor hidden after inactivity");
                    true
                } else {
                    false
                }
            });
        }));
    }

    /// Hides the cursor now and cancels the countdown.
    pub fn hide(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.state.send_if_modified(|c| {
            let was_visible = c.visible;
            c.hide();
            was_visible
        });
    }
}

impl Default for CursorPresence {
    fn default() -> Self {
        Self::new(CURSOR_TIMEOUT)
    }
}

impl Drop for CursorPresence {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    /// Lets the countdown task run after the clock moved.
    async fn settle() {
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_hides_3000ms_after_last_move() {
        // Arrange
        let mut presence = CursorPresence::default();

        // Act
        presence.on_move(10.0, 20.0);
        sleep(Duration::from_millis(2999)).await;
        settle().await;

        // Assert – still visible just before the deadline
        assert!(presence.current().visible);

        sleep(Duration::from_millis(2)).await;
        settle().await;
        assert!(!presence.current().visible);
        assert_eq!((presence.current().x, presence.current().y), (10.0, 20.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_move_restarts_countdown() {
        let mut presence = CursorPresence::default();

        presence.on_move(1.0, 1.0);
        sleep(Duration::from_millis(2000)).await;
        presence.on_move(2.0, 2.0);
        sleep(Duration::from_millis(2000)).await;
        settle().await;

        let cursor = presence.current();
        assert!(cursor.visible, "4000ms after first move but only 2000ms after second");
        assert_eq!((cursor.x, cursor.y), (2.0, 2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_position_wins() {
        let mut presence = CursorPresence::default();
        for i in 0..5 {
            presence.on_move(i as f64, i as f64);
        }
        assert_eq!(presence.current().x, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hide_is_immediate_and_cancels_timer() {
        let mut presence = CursorPresence::default();
        let mut rx = presence.subscribe();

        presence.on_move(5.0, 5.0);
        presence.hide();

        assert!(!presence.current().visible);
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().visible);

        sleep(Duration::from_millis(3500)).await;
        settle().await;
        assert!(!rx.has_changed().unwrap(), "cancelled timer must not publish again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_timeout_is_honoured() {
        let mut presence = CursorPresence::new(Duration::from_millis(500));
        presence.on_move(0.0, 0.0);
        sleep(Duration::from_millis(501)).await;
        settle().await;
        assert!(!presence.current().visible);
    }
}
