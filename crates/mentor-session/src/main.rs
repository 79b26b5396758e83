//! Mentor-assist session rehearsal: entry point.
//!
//! Wires a mentor and a child client together over the in-process loopback
//! signaling hub and walks one complete assistance session, logging every
//! step.  It is the quickest way to see the protocol work end to end without
//! a signaling service, cameras, or a second machine.
//!
//! # Usage
//!
//! ```text
//! mentor-session [OPTIONS]
//!
//! Options:
//!   --config    <PATH>   Config file [default: platform config dir]
//!   --log-level <LEVEL>  Log filter when RUST_LOG is unset [default: from config]
//!   --room      <NAME>   Room to rehearse in [default: from config]
//! ```
//!
//! # What the rehearsal does
//!
//! ```text
//! mentor                                  child
//!   │── control:request ──────────────────►│  (pending)
//!   │◄───────────────────── control:accept ─│  (active)
//!   │── mode:change / cursor:move ────────►│  mode applied, ghost cursor shown
//!   │── input:click / input:key ──────────►│  replayed on the mock document
//!   │══ desktop click (100,100) on 800×600 ══► injected at (200,200)
//!   │── control:release ──────────────────►│  (idle, cursor hidden)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mentor_core::{ElementInfo, FieldInfo, Mission, Modifier, Rect, Size, TargetDescriptor};
use mentor_session::application::session_facade::{
    RolePorts, SessionEvent, SessionFacade, SessionSettings,
};
use mentor_session::infrastructure::peer::mock::{
    FixedViewport, MockDesktopInjector, MockMediaDevices, MockPeerConnector,
};
use mentor_session::infrastructure::signaling::loopback::LoopbackHub;
use mentor_session::infrastructure::storage::config::{self, AssistConfig};
use mentor_session::infrastructure::surface::mock::MockDocumentSurface;

/// How long the rehearsal waits for any single protocol step.
const STEP_TIMEOUT: Duration = Duration::from_secs(2);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Rehearses a mentor remote-assistance session in-process.
#[derive(Debug, Parser)]
#[command(
    name = "mentor-session",
    about = "In-process rehearsal of a mentor remote-assistance session",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "MENTOR_ASSIST_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set (e.g. `debug`).
    #[arg(long, env = "MENTOR_ASSIST_LOG")]
    log_level: Option<String>,

    /// Room name; overrides the config file.
    #[arg(long)]
    room: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (cfg, load_error) = match &cli.config {
        Some(path) => (
            config::load_config_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None,
        ),
        None => match config::load_config() {
            Ok(cfg) => (cfg, None),
            Err(e) => (AssistConfig::default(), Some(e)),
        },
    };

    // Initialise structured logging.  `RUST_LOG` wins over everything else.
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| cfg.session.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    if let Some(e) = load_error {
        warn!("config unavailable, using defaults: {e}");
    }
    let room = cli.room.clone().unwrap_or_else(|| cfg.session.room.clone());
    info!(%room, "mentor-assist rehearsal starting");

    rehearse(&room, &cfg).await?;

    info!("mentor-assist rehearsal finished");
    Ok(())
}

async fn rehearse(room: &str, cfg: &AssistConfig) -> anyhow::Result<()> {
    let settings: SessionSettings = cfg.settings();
    let hub = LoopbackHub::new();

    // ── Mentor client ─────────────────────────────────────────────────────────
    let connector = Arc::new(MockPeerConnector::with_remote_video());
    let (mentor, mut mentor_events) = SessionFacade::new(
        cfg.session.display_name.clone(),
        settings,
        Arc::new(hub.endpoint()),
        RolePorts::Mentor {
            connector: connector.clone(),
            devices: Arc::new(MockMediaDevices::new()),
        },
    );

    // ── Child client ──────────────────────────────────────────────────────────
    let surface = Arc::new(MockDocumentSurface::new());
    surface.register(TargetDescriptor::ElementId("save".into()));
    surface.register(TargetDescriptor::FieldName("title".into()));
    let injector = Arc::new(MockDesktopInjector::new());
    let (child, mut child_events) = SessionFacade::new(
        "Sam",
        settings,
        Arc::new(hub.endpoint()),
        RolePorts::Child {
            surface: surface.clone(),
            injector: injector.clone(),
        },
    );

    mentor.connect(room).await?;
    child.connect(room).await?;
    wait_for(&mut mentor_events, "child presence", |e| {
        matches!(e, SessionEvent::PeerJoined(p) if p.id == child.id())
    })
    .await?;
    wait_for(&mut child_events, "mentor presence", |e| {
        matches!(e, SessionEvent::PeerJoined(p) if p.id == mentor.id())
    })
    .await?;

    // ── Handshake ─────────────────────────────────────────────────────────────
    mentor
        .request_control(child.id(), Some("Let's finish the story together".into()))
        .await?;
    wait_for(&mut child_events, "control request", |e| {
        matches!(e, SessionEvent::ControlRequested { .. })
    })
    .await?;
    child.accept_control().await?;
    wait_for(&mut mentor_events, "control grant", |e| {
        matches!(e, SessionEvent::ControlGranted { .. })
    })
    .await?;
    info!("control active on both sides");

    // ── Input mirroring ───────────────────────────────────────────────────────
    mentor.send_mode_change("book").await?;
    mentor.send_cursor_move(320.0, 240.0).await?;
    let save = ElementInfo {
        id: Some("save".into()),
        ..Default::default()
    };
    mentor.send_click(&save, 320.0, 240.0).await?;
    let title = FieldInfo {
        name: Some("title".into()),
        ..Default::default()
    };
    mentor.send_keyboard_input(&title, "Dragons", true).await?;
    mentor
        .assign_mission(
            child.id(),
            Mission {
                id: "m1".into(),
                title: "Add a picture".into(),
                description: "Pick an illustration for page two".into(),
            },
        )
        .await?;
    wait_for(&mut child_events, "mission", |e| {
        matches!(e, SessionEvent::MissionAssigned(_))
    })
    .await?;

    let snapshot = child.snapshot().await;
    info!(
        cursor_visible = snapshot.mentor_cursor.visible,
        x = snapshot.mentor_cursor.x,
        y = snapshot.mentor_cursor.y,
        mission = ?snapshot.active_mission.map(|m| m.title),
        "child view"
    );
    info!(actions = ?surface.actions(), "replayed on child document");

    // ── Remote desktop ────────────────────────────────────────────────────────
    mentor.connect_to_peer(child.id()).await?;
    mentor
        .attach_viewport(Arc::new(FixedViewport::new(
            Rect::new(0.0, 0.0, 800.0, 600.0),
            Size::new(1600.0, 1200.0),
        )))
        .await?;
    let (sx, sy) = mentor.send_desktop_click(100.0, 100.0).await?;
    info!(sx, sy, "desktop click (100,100) on 800x600 sent as source pixels");
    mentor.send_key("s", &[Modifier::Cmd]).await?;

    // Hand the frames the mentor sent to the child, as the data channel would.
    let link = connector
        .last_link()
        .ok_or_else(|| anyhow!("no desktop link negotiated"))?;
    for frame in link.channel.frames() {
        let outcome = child.handle_desktop_frame(mentor.id(), &frame).await?;
        info!(?outcome, "desktop frame on child");
    }
    info!(clicks = ?injector.clicks(), keys = injector.keys().len(), "injected on child");

    // ── Release ───────────────────────────────────────────────────────────────
    mentor.release_control().await?;
    wait_for(&mut child_events, "release", |e| {
        matches!(e, SessionEvent::ControlReleased { .. })
    })
    .await?;
    let snapshot = child.snapshot().await;
    info!(
        control_active = snapshot.control_active,
        cursor_visible = snapshot.mentor_cursor.visible,
        "child after release"
    );

    mentor.disconnect_desktop().await?;
    mentor.disconnect().await;
    child.disconnect().await;
    Ok(())
}

/// Waits until `events` yields an event matching `pred`, skipping others.
async fn wait_for<F>(
    events: &mut mpsc::Receiver<SessionEvent>,
    what: &str,
    pred: F,
) -> anyhow::Result<SessionEvent>
where
    F: Fn(&SessionEvent) -> bool,
{
    let found = tokio::time::timeout(STEP_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .with_context(|| format!("timed out waiting for {what}"))?;
    found.ok_or_else(|| anyhow!("event stream closed while waiting for {what}"))
}
