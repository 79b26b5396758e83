//! Criterion benchmarks for the signaling and control-frame codecs.
//!
//! Cursor moves are sent up to ~60 times per second and desktop control
//! frames on every click or key press, so both paths should stay well below
//! a millisecond.
//!
//! Run with:
//! ```bash
//! cargo bench --package mentor-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mentor_core::protocol::messages::{ClickPayload, CursorMovePayload, KeyPayload};
use mentor_core::{
    decode_frame, decode_signal, encode_frame, encode_signal, ControlFrame, Envelope, Modifier,
    MouseButton, SignalMessage, TargetDescriptor,
};
use uuid::Uuid;

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn signal_fixtures() -> Vec<(&'static str, SignalMessage)> {
    vec![
        ("CursorMove", SignalMessage::CursorMove(CursorMovePayload { x: 512.0, y: 384.0 })),
        (
            "InputClick",
            SignalMessage::InputClick(ClickPayload {
                selector: TargetDescriptor::ClassPath(vec!["card".into(), "primary".into()]),
                x: 10.0,
                y: 20.0,
            }),
        ),
        (
            "InputKey",
            SignalMessage::InputKey(KeyPayload {
                selector: TargetDescriptor::FieldName("title".into()),
                value: "The dragon who learned to read".into(),
                key: Some("Enter".into()),
            }),
        ),
    ]
}

fn frame_fixtures() -> Vec<(&'static str, ControlFrame)> {
    vec![
        ("Click", ControlFrame::Click { x: 1440, y: 900, button: MouseButton::Left }),
        (
            "KeyWithModifiers",
            ControlFrame::Key {
                key: "z".into(),
                modifiers: [Modifier::Cmd, Modifier::Shift].into_iter().collect(),
            },
        ),
    ]
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_signal_text(c: &mut Criterion) {
    let from = Uuid::new_v4();
    let mut group = c.benchmark_group("signal_json_roundtrip");
    for (name, msg) in signal_fixtures() {
        group.bench_with_input(BenchmarkId::new("event", name), &msg, |b, msg| {
            b.iter(|| {
                let text = encode_signal(black_box(msg), from, None).unwrap().to_json().unwrap();
                decode_signal(&Envelope::from_json(black_box(&text)).unwrap()).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("control_frame_roundtrip");
    for (name, frame) in frame_fixtures() {
        group.bench_with_input(BenchmarkId::new("frame", name), &frame, |b, frame| {
            b.iter(|| {
                let bytes = encode_frame(black_box(frame), black_box(1), black_box(0)).unwrap();
                decode_frame(black_box(&bytes)).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_signal_text, bench_frames);
criterion_main!(benches);
