//! In-memory document surface for tests and rehearsal.
//!
//! Controls are registered under a [`TargetDescriptor`] and receive a fresh
//! [`ElementHandle`].  Every action applied through the
//! [`DocumentSurface`] trait is recorded in order so tests can assert exactly
//! what the replay pipeline did to the UI.
//!
//! # Usage in tests
//!
//! ```ignore
//! let surface = Arc::new(MockDocumentSurface::new());
//! let save = surface.register("#save".parse().unwrap());
//! let receiver = MirrorReceiver::new(surface.clone());
//! // ... replay a click ...
//! assert_eq!(surface.actions(), vec![SurfaceAction::Activate(save)]);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use mentor_core::TargetDescriptor;

use crate::application::input_mirror::{DocumentSurface, ElementHandle, SurfaceError};

/// One action applied to the mock document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceAction {
    Activate(ElementHandle),
    SetValue(ElementHandle, String),
    Submit(ElementHandle),
    SetMode(String),
}

/// A registry-backed document that records instead of rendering.
#[derive(Default)]
pub struct MockDocumentSurface {
    pub(crate) registry: Mutex<HashMap<TargetDescriptor, ElementHandle>>,
    pub(crate) actions: Mutex<Vec<SurfaceAction>>,
    pub(crate) next_handle: AtomicU64,
    /// When `true`, every action returns [`SurfaceError::Detached`].
    pub should_fail: bool,
}

impl MockDocumentSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a control and returns its handle.
    pub fn register(&self, target: TargetDescriptor) -> ElementHandle {
        let handle = ElementHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.registry.lock().unwrap().insert(target, handle);
        handle
    }

    /// Removes a control, as if the UI had re-rendered without it.
    pub fn unregister(&self, target: &TargetDescriptor) {
        self.registry.lock().unwrap().remove(target);
    }

    /// Snapshot of every recorded action, oldest first.
    pub fn actions(&self) -> Vec<SurfaceAction> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, handle: ElementHandle, action: SurfaceAction) -> Result<(), SurfaceError> {
        if self.should_fail {
            return Err(SurfaceError::Detached(handle));
        }
        self.actions.lock().unwrap().push(action);
        Ok(())
    }
}

impl DocumentSurface for MockDocumentSurface {
    fn resolve(&self, target: &TargetDescriptor) -> Option<ElementHandle> {
        self.registry.lock().unwrap().get(target).copied()
    }

    fn activate(&self, element: ElementHandle) -> Result<(), SurfaceError> {
        self.record(element, SurfaceAction::Activate(element))
    }

    fn set_value(&self, element: ElementHandle, value: &str) -> Result<(), SurfaceError> {
        self.record(element, SurfaceAction::SetValue(element, value.to_string()))
    }

    fn submit(&self, element: ElementHandle) -> Result<(), SurfaceError> {
        self.record(element, SurfaceAction::Submit(element))
    }

    fn set_mode(&self, mode: &str) -> Result<(), SurfaceError> {
        self.record(ElementHandle(u64::MAX), SurfaceAction::SetMode(mode.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_target_resolves() {
        let surface = MockDocumentSurface::new();
        let handle = surface.register(TargetDescriptor::ControlHook("next".into()));

        assert_eq!(surface.resolve(&TargetDescriptor::ControlHook("next".into())), Some(handle));
        assert_eq!(surface.resolve(&TargetDescriptor::ElementId("next".into())), None);
    }

    #[test]
    fn test_unregistered_target_stops_resolving() {
        let surface = MockDocumentSurface::new();
        let target = TargetDescriptor::ElementId("save".into());
        surface.register(target.clone());
        surface.unregister(&target);
        assert!(surface.resolve(&target).is_none());
    }

    #[test]
    fn test_should_fail_records_nothing() {
        let surface = MockDocumentSurface {
            should_fail: true,
            ..Default::default()
        };
        assert!(surface.activate(ElementHandle(0)).is_err());
        assert!(surface.actions().is_empty());
    }
}
