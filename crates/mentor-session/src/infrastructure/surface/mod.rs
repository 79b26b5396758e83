//! Adapters for the host application's document.
//!
//! The real adapter lives in the UI shell and resolves target descriptors
//! through its own control-hook registry.  This crate ships the in-memory
//! [`mock::MockDocumentSurface`] used by tests and the rehearsal binary.

pub mod mock;
