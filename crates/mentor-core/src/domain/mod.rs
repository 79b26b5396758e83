//! Domain entities for mentor remote assistance.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the workspace holds the rules that make remote
//! assistance safe: who may control whom, when a replayed event may take
//! effect, how a UI element is named across two clients, and how a click on a
//! rendered video frame maps back to the source screen.  None of it touches a
//! socket, a timer, or a UI toolkit, so every rule can be unit-tested in
//! isolation.

/// Ghost cursor state and its inactivity rule.
pub mod cursor;

/// Render-space to source-space coordinate scaling.
pub mod geometry;

/// The consent state machine (`Idle → Requested → Active`).
///
/// See [`handshake::ControlSession`] for the main type.
pub mod handshake;

/// Client roles and peer identity.
pub mod roles;

/// Target descriptors used to re-locate UI elements across clients.
pub mod target;
