//! Sequence numbering for desktop control frames.
//!
//! # Why number control frames? (for beginners)
//!
//! Every control frame a mentor sends carries an increasing sequence number.
//! The data channel is ordered and reliable, but a reconnecting peer may
//! replay its last few frames, and a replayed click on a native desktop is a
//! real second click.  The receiver keeps a [`SequenceGuard`] and drops any
//! frame whose number it has already passed.
//!
//! [`SequenceCounter`] is an `AtomicU64`, so the sender can hand out numbers
//! from any task without a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free, monotonically increasing counter for frame sequence numbers.
///
/// Starts at 0 and wraps at `u64::MAX` without panicking.
///
/// # Examples
///
/// ```rust
/// use mentor_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence number and atomically increments the counter.
    pub fn next(&self) -> u64 {
        // Relaxed: the number orders frames, it does not publish memory.
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the value the next call to [`next`](Self::next) will hand out.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }

    /// Starts numbering from zero again (new peer connection).
    pub fn reset(&self) {
        self.inner.store(0, Ordering::Relaxed);
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver-side high-water mark that rejects replayed frames.
#[derive(Debug, Clone, Default)]
pub struct SequenceGuard {
    last_seen: Option<u64>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and advances the mark if `sequence` is new.
    pub fn accept(&mut self, sequence: u64) -> bool {
        match self.last_seen {
            Some(last) if sequence <= last => false,
            _ => {
                self.last_seen = Some(sequence);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_seen = None;
    }
}
