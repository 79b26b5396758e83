//! Integration tests for the consent handshake and input mirroring.
//!
//! # Purpose
//!
//! These tests run a real mentor and a real child [`SessionFacade`] over the
//! in-process loopback hub, exactly as the rehearsal binary does.  They
//! verify:
//!
//! - The happy path: request, accept, mirrored input replayed on the child.
//! - Consent gating: nothing reaches the child's document unless its own
//!   session is active with the sender, whatever arrives on the wire.
//! - Replace semantics for an unanswered request.
//! - Release and abrupt connection loss: the child returns to idle and the
//!   ghost cursor disappears immediately.
//! - Mission flashes accepted only from a mentor.
//!
//! # Waiting for the other side
//!
//! Each client handles incoming traffic on its own pump task.  Tests wait on
//! the [`SessionEvent`] stream, and use a mission flash as a *barrier*:
//! signaling delivery is ordered, so once the child reports the barrier
//! mission, everything published before it has been handled.

use std::sync::Arc;
use std::time::Duration;

use mentor_core::protocol::messages::{ClickPayload, KeyPayload};
use mentor_core::{
    encode_signal, ElementInfo, FieldInfo, Mission, Peer, Role, SignalMessage, TargetDescriptor,
};
use mentor_session::application::session_facade::{
    RolePorts, SessionEvent, SessionFacade, SessionSettings, SignalingEvent, SignalingPort,
};
use mentor_session::infrastructure::peer::mock::{
    MockDesktopInjector, MockMediaDevices, MockPeerConnector,
};
use mentor_session::infrastructure::signaling::loopback::{LoopbackHub, LoopbackSignaling};
use mentor_session::infrastructure::surface::mock::{MockDocumentSurface, SurfaceAction};
use tokio::sync::mpsc;

const ROOM: &str = "family";
const WAIT: Duration = Duration::from_secs(2);

// ── Harness ───────────────────────────────────────────────────────────────────

struct Pair {
    hub: Arc<LoopbackHub>,
    mentor: Arc<SessionFacade>,
    mentor_events: mpsc::Receiver<SessionEvent>,
    child: Arc<SessionFacade>,
    child_events: mpsc::Receiver<SessionEvent>,
    surface: Arc<MockDocumentSurface>,
    barriers: usize,
}

async fn connected_pair(settings: SessionSettings) -> Pair {
    let hub = LoopbackHub::new();
    let (mentor, mut mentor_events) = SessionFacade::new(
        "Mo",
        settings,
        Arc::new(hub.endpoint()),
        RolePorts::Mentor {
            connector: Arc::new(MockPeerConnector::new()),
            devices: Arc::new(MockMediaDevices::new()),
        },
    );
    let surface = Arc::new(MockDocumentSurface::new());
    let (child, mut child_events) = SessionFacade::new(
        "Sam",
        settings,
        Arc::new(hub.endpoint()),
        RolePorts::Child {
            surface: surface.clone(),
            injector: Arc::new(MockDesktopInjector::new()),
        },
    );

    mentor.connect(ROOM).await.unwrap();
    child.connect(ROOM).await.unwrap();
    let child_id = child.id();
    let mentor_id = mentor.id();
    wait_for(&mut mentor_events, |e| matches!(e, SessionEvent::PeerJoined(p) if p.id == child_id)).await;
    wait_for(&mut child_events, |e| matches!(e, SessionEvent::PeerJoined(p) if p.id == mentor_id)).await;

    Pair {
        hub,
        mentor,
        mentor_events,
        child,
        child_events,
        surface,
        barriers: 0,
    }
}

impl Pair {
    async fn activate(&mut self) {
        self.mentor.request_control(self.child.id(), None).await.unwrap();
        wait_for(&mut self.child_events, |e| matches!(e, SessionEvent::ControlRequested { .. })).await;
        self.child.accept_control().await.unwrap();
        wait_for(&mut self.mentor_events, |e| matches!(e, SessionEvent::ControlGranted { .. })).await;
    }

    /// Returns once the child has handled everything published so far.
    async fn barrier(&mut self) {
        self.barriers += 1;
        let id = format!("barrier-{}", self.barriers);
        let mission = Mission {
            id: id.clone(),
            title: "barrier".into(),
            description: String::new(),
        };
        self.mentor.assign_mission(self.child.id(), mission).await.unwrap();
        wait_for(&mut self.child_events, |e| matches!(e, SessionEvent::MissionAssigned(m) if m.id == id)).await;
    }

    /// Joins the room as an extra raw client announced with `role`.
    async fn intruder(&mut self, role: Role) -> (LoopbackSignaling, Peer, mpsc::Receiver<SignalingEvent>) {
        let endpoint = self.hub.endpoint();
        let peer = Peer::new("Eve", role);
        let rx = endpoint.connect(ROOM, peer.clone()).await.unwrap();
        let id = peer.id;
        wait_for(&mut self.child_events, |e| matches!(e, SessionEvent::PeerJoined(p) if p.id == id)).await;
        (endpoint, peer, rx)
    }
}

async fn wait_for<F>(events: &mut mpsc::Receiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

fn save_button() -> ElementInfo {
    ElementInfo {
        id: Some("save".into()),
        control_hook: None,
        classes: vec!["btn primary".into()],
    }
}

fn click_on_save() -> SignalMessage {
    SignalMessage::InputClick(ClickPayload {
        selector: TargetDescriptor::ElementId("save".into()),
        x: 1.0,
        y: 1.0,
    })
}

// ── Handshake ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_accept_reaches_active_on_both_sides() {
    // Arrange
    let mut pair = connected_pair(SessionSettings::default()).await;

    // Act
    pair.activate().await;

    // Assert
    let mentor = pair.mentor.snapshot().await;
    let child = pair.child.snapshot().await;
    assert!(mentor.control_active);
    assert!(child.control_active);
    assert_eq!(mentor.control_peer, Some(pair.child.id()));
    assert_eq!(child.control_peer, Some(pair.mentor.id()));
}

#[tokio::test]
async fn test_second_request_replaces_pending_one() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    let child_id = pair.child.id();

    pair.mentor.request_control(child_id, Some("first".into())).await.unwrap();
    pair.mentor.request_control(child_id, Some("second".into())).await.unwrap();

    let second = wait_for(&mut pair.child_events, |e| {
        matches!(e, SessionEvent::ControlRequested { replaced: true, .. })
    })
    .await;
    let SessionEvent::ControlRequested { request, .. } = second else {
        unreachable!()
    };
    assert_eq!(request.note.as_deref(), Some("second"));

    let snap = pair.child.snapshot().await;
    assert!(snap.control_requested);
    assert_eq!(snap.pending_request.and_then(|r| r.note).as_deref(), Some("second"));
}

#[tokio::test]
async fn test_reject_returns_both_sides_to_idle() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    pair.mentor.request_control(pair.child.id(), None).await.unwrap();
    wait_for(&mut pair.child_events, |e| matches!(e, SessionEvent::ControlRequested { .. })).await;

    pair.child.reject_control().await.unwrap();
    wait_for(&mut pair.mentor_events, |e| matches!(e, SessionEvent::ControlRefused { .. })).await;

    assert!(!pair.mentor.snapshot().await.control_requested);
    assert!(!pair.child.snapshot().await.control_requested);
}

#[tokio::test]
async fn test_toggle_while_pending_withdraws_request() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    let child_id = pair.child.id();

    pair.mentor.toggle_control(child_id, None).await.unwrap();
    wait_for(&mut pair.child_events, |e| matches!(e, SessionEvent::ControlRequested { .. })).await;
    pair.mentor.toggle_control(child_id, None).await.unwrap();
    wait_for(&mut pair.child_events, |e| matches!(e, SessionEvent::ControlReleased { .. })).await;

    let snap = pair.child.snapshot().await;
    assert!(!snap.control_requested);
    assert!(snap.pending_request.is_none());
    assert!(pair.child.accept_control().await.is_err(), "nothing left to accept");
}

// ── Mirroring ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_mirrored_click_and_submit_are_replayed() {
    // Arrange
    let mut pair = connected_pair(SessionSettings::default()).await;
    let save = pair.surface.register(TargetDescriptor::ElementId("save".into()));
    let title = pair.surface.register(TargetDescriptor::FieldName("title".into()));
    pair.activate().await;
    let field = FieldInfo {
        name: Some("title".into()),
        ..Default::default()
    };

    // Act
    assert!(pair.mentor.send_click(&save_button(), 10.0, 20.0).await.unwrap());
    assert!(pair.mentor.send_keyboard_input(&field, "Drag", false).await.unwrap());
    assert!(pair.mentor.send_keyboard_input(&field, "Dragons", true).await.unwrap());
    pair.barrier().await;

    // Assert
    assert_eq!(
        pair.surface.actions(),
        vec![
            SurfaceAction::Activate(save),
            SurfaceAction::SetValue(title, "Drag".into()),
            SurfaceAction::SetValue(title, "Dragons".into()),
            SurfaceAction::Submit(title),
        ]
    );
}

#[tokio::test]
async fn test_mode_change_sent_only_when_it_differs() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    pair.activate().await;

    assert!(pair.mentor.send_mode_change("book").await.unwrap());
    assert!(!pair.mentor.send_mode_change("book").await.unwrap());
    assert!(pair.mentor.send_mode_change("diary").await.unwrap());
    pair.barrier().await;

    assert_eq!(
        pair.surface.actions(),
        vec![SurfaceAction::SetMode("book".into()), SurfaceAction::SetMode("diary".into())]
    );
}

#[tokio::test]
async fn test_unresolved_target_is_dropped_without_side_effects() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    pair.activate().await;

    assert!(pair.mentor.send_click(&save_button(), 1.0, 1.0).await.unwrap());
    pair.barrier().await;

    assert!(pair.surface.actions().is_empty());
    assert!(pair.child.snapshot().await.error.is_none(), "never surfaced to the user");
}

#[tokio::test]
async fn test_input_arriving_before_accept_is_not_applied() {
    // Arrange: the wire carries input although the child never accepted.
    let mut pair = connected_pair(SessionSettings::default()).await;
    pair.surface.register(TargetDescriptor::ElementId("save".into()));
    let (rogue, eve, _rx) = pair.intruder(Role::Mentor).await;

    // Act
    let envelope = encode_signal(&click_on_save(), eve.id, Some(pair.child.id())).unwrap();
    rogue.publish(envelope).await.unwrap();
    pair.barrier().await;

    // Assert
    assert!(pair.surface.actions().is_empty());
}

#[tokio::test]
async fn test_other_mentor_cannot_ride_on_active_consent() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    pair.surface.register(TargetDescriptor::ElementId("save".into()));
    pair.activate().await;
    let (rogue, eve, _rx) = pair.intruder(Role::Mentor).await;

    let key = SignalMessage::InputKey(KeyPayload {
        selector: TargetDescriptor::ElementId("save".into()),
        value: "oops".into(),
        key: Some("Enter".into()),
    });
    for message in [click_on_save(), key] {
        let envelope = encode_signal(&message, eve.id, Some(pair.child.id())).unwrap();
        rogue.publish(envelope).await.unwrap();
    }
    pair.barrier().await;

    assert!(pair.surface.actions().is_empty());
    assert!(pair.child.snapshot().await.control_active, "consent with Mo is untouched");
}

#[tokio::test]
async fn test_mentor_sends_nothing_without_control() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    pair.surface.register(TargetDescriptor::ElementId("save".into()));

    assert!(!pair.mentor.send_click(&save_button(), 1.0, 1.0).await.unwrap());
    assert!(!pair.mentor.send_cursor_move(1.0, 1.0).await.unwrap());
    pair.barrier().await;

    assert!(pair.surface.actions().is_empty());
    assert!(!pair.child.snapshot().await.mentor_cursor.visible);
}

// ── Ghost cursor ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ghost_cursor_follows_latest_move_then_times_out() {
    let settings = SessionSettings {
        cursor_timeout: Duration::from_millis(100),
        cursor_throttle: Duration::ZERO,
        ..SessionSettings::default()
    };
    let mut pair = connected_pair(settings).await;
    pair.activate().await;

    pair.mentor.send_cursor_move(10.0, 10.0).await.unwrap();
    pair.mentor.send_cursor_move(42.0, 24.0).await.unwrap();
    pair.barrier().await;

    let cursor = pair.child.snapshot().await.mentor_cursor;
    assert!(cursor.visible);
    assert_eq!((cursor.x, cursor.y), (42.0, 24.0));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!pair.child.snapshot().await.mentor_cursor.visible);
}

#[tokio::test]
async fn test_child_release_is_immediate_and_reaches_mentor() {
    // Arrange
    let mut pair = connected_pair(SessionSettings::default()).await;
    pair.activate().await;
    pair.mentor.send_cursor_move(5.0, 5.0).await.unwrap();
    pair.barrier().await;
    assert!(pair.child.snapshot().await.mentor_cursor.visible);

    // Act
    pair.child.release_control().await.unwrap();

    // Assert: local effect before any acknowledgement
    let snap = pair.child.snapshot().await;
    assert!(!snap.control_active);
    assert!(!snap.mentor_cursor.visible);

    wait_for(&mut pair.mentor_events, |e| matches!(e, SessionEvent::ControlReleased { .. })).await;
    assert!(!pair.mentor.snapshot().await.control_active);
    assert!(!pair.mentor.send_cursor_move(6.0, 6.0).await.unwrap());
}

#[tokio::test]
async fn test_mentor_connection_drop_resets_child_and_hides_cursor() {
    // Arrange
    let mut pair = connected_pair(SessionSettings::default()).await;
    pair.activate().await;
    pair.mentor.send_cursor_move(5.0, 5.0).await.unwrap();
    pair.barrier().await;

    // Act
    pair.hub.drop_peer(pair.mentor.id()).await;

    // Assert
    let mentor_id = pair.mentor.id();
    wait_for(&mut pair.child_events, |e| {
        matches!(e, SessionEvent::ControlReleased { peer } if *peer == mentor_id)
    })
    .await;
    let child = pair.child.snapshot().await;
    assert!(!child.control_active);
    assert!(!child.mentor_cursor.visible);
    assert!(child.connected_users.is_empty());

    wait_for(&mut pair.mentor_events, |e| matches!(e, SessionEvent::ConnectionLost)).await;
    let mentor = pair.mentor.snapshot().await;
    assert!(!mentor.is_connected);
    assert!(!mentor.control_active);
    assert!(mentor.error.is_some());
}

#[tokio::test]
async fn test_disconnect_releases_control_on_the_other_side() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    pair.activate().await;

    pair.mentor.disconnect().await;

    wait_for(&mut pair.child_events, |e| matches!(e, SessionEvent::ControlReleased { .. })).await;
    assert!(!pair.child.snapshot().await.control_active);
    assert!(!pair.mentor.snapshot().await.is_connected);
}

// ── Missions ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_mission_flash_is_forwarded_and_dismissed() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    let mission = Mission {
        id: "m1".into(),
        title: "Add a picture".into(),
        description: "Page two needs an illustration".into(),
    };

    pair.mentor.assign_mission(pair.child.id(), mission.clone()).await.unwrap();
    wait_for(&mut pair.child_events, |e| matches!(e, SessionEvent::MissionAssigned(_))).await;
    assert_eq!(pair.child.snapshot().await.active_mission, Some(mission));

    pair.mentor.dismiss_mission(pair.child.id(), "other").await.unwrap();
    pair.mentor.dismiss_mission(pair.child.id(), "m1").await.unwrap();
    let dismissed = wait_for(&mut pair.child_events, |e| matches!(e, SessionEvent::MissionDismissed { .. })).await;

    assert_eq!(dismissed, SessionEvent::MissionDismissed { id: "m1".into() });
    assert!(pair.child.snapshot().await.active_mission.is_none());
}

#[tokio::test]
async fn test_mission_from_a_child_peer_is_ignored() {
    let mut pair = connected_pair(SessionSettings::default()).await;
    let (other_child, eve, _rx) = pair.intruder(Role::Child).await;
    let fake = Mission {
        id: "fake".into(),
        title: "Click everything".into(),
        description: String::new(),
    };

    let envelope = encode_signal(&SignalMessage::MissionAssign(fake), eve.id, Some(pair.child.id())).unwrap();
    other_child.publish(envelope).await.unwrap();
    pair.barrier().await;

    let active = pair.child.snapshot().await.active_mission.unwrap();
    assert!(active.id.starts_with("barrier"));
}
