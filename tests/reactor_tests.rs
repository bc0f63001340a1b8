mod common;

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use aiko::capability::{Capability, CapabilityRegistry, Context};
use aiko::kernel::activation::{Activation, ActivationMode};
use aiko::kernel::dispatcher::RouteSource;
use aiko::kernel::event::{AssistantState, AudioFrame, CaptureStatus};
use aiko::kernel::telemetry::TelemetryEvent;
use common::{reactor, Behavior, Step, TestCapability};

const WINDOW: Duration = Duration::from_secs(5);
const POST: Duration = Duration::from_secs(3);

fn lights() -> TestCapability {
    TestCapability::new("lights", Behavior::Accept).with_triggers(&["turn on"])
}

fn status(ok: bool) -> CaptureStatus {
    CaptureStatus {
        ok,
        message: if ok { "ready".into() } else { "unplugged".into() },
    }
}

#[test]
fn test_warm_up_moves_to_idle() {
    let mut t = reactor(vec![], CapabilityRegistry::builder().build(), WINDOW, POST);
    let rx = t.reactor.subscribe_state();
    assert_eq!(t.reactor.state(), AssistantState::Init);

    t.reactor.warm_up().unwrap();
    assert_eq!(t.reactor.state(), AssistantState::Idle);
    assert_eq!(*rx.borrow(), AssistantState::Idle);
}

#[test]
fn test_triggered_command_is_dispatched() {
    let cap = lights();
    let (calls, seen) = (cap.counter(), cap.log());
    let mut t = reactor(vec![], CapabilityRegistry::builder().register(cap).build(), WINDOW, POST);
    t.reactor.warm_up().unwrap();

    let outcome = t.reactor.handle_phrase("Aika turn on the light");
    assert_eq!(
        outcome.activation,
        Activation::Triggered {
            command: "turn on the light".into()
        }
    );
    let winner = outcome.handled_by.expect("keyword route should win");
    assert!(matches!(winner.source, RouteSource::Keyword { ref keyword } if keyword == "turn on"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(seen.lock().unwrap()[0], "turn on the light");

    assert_eq!(t.reactor.state(), AssistantState::Active);
    // Success switches to the shorter follow-up window.
    let snap = t.reactor.activation().snapshot();
    assert_eq!(snap.mode, ActivationMode::Active);
    assert!(snap.remaining_at(Instant::now()) <= POST);

    let stats = t.reactor.telemetry.snapshot();
    assert_eq!(stats.triggered, 1);
    assert_eq!(stats.routes_handled, 1);
    assert_eq!(stats.handled_by_keyword, 1);
}

#[test]
fn test_follow_up_and_unaddressed_phrases() {
    let cap = lights();
    let calls = cap.counter();
    let mut t = reactor(vec![], CapabilityRegistry::builder().register(cap).build(), WINDOW, POST);
    t.reactor.warm_up().unwrap();

    let ignored = t.reactor.handle_phrase("turn on the light");
    assert_eq!(ignored.activation, Activation::NotAddressed);
    assert!(ignored.handled_by.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Name alone opens the window without dispatching.
    let named = t.reactor.handle_phrase("aiko");
    assert_eq!(named.activation, Activation::Triggered { command: String::new() });
    assert!(named.handled_by.is_none());
    assert_eq!(t.reactor.state(), AssistantState::Active);

    let follow_up = t.reactor.handle_phrase("turn on the lamp");
    assert!(matches!(follow_up.activation, Activation::InWindow { .. }));
    assert!(follow_up.handled_by.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = t.reactor.telemetry.snapshot();
    assert_eq!(stats.addressed, 2);
    assert_eq!(stats.triggered, 1);
}

#[test]
fn test_unhandled_command_keeps_full_window() {
    let declines = TestCapability::new("nope", Behavior::Fail);
    let mut t = reactor(vec![], CapabilityRegistry::builder().register(declines).build(), WINDOW, POST);
    t.reactor.warm_up().unwrap();

    let outcome = t.reactor.handle_phrase("aiko sing a song");
    assert!(outcome.handled_by.is_none());
    assert!(t.reactor.activation().snapshot().remaining_at(Instant::now()) > POST);

    let stats = t.reactor.telemetry.snapshot();
    assert_eq!(stats.routes_unhandled, 1);
    assert_eq!(stats.capability_failures, 1);
    assert_eq!(stats.route_success_ratio(), 0.0);
}

#[test]
fn test_window_timeout_returns_to_idle() {
    let mut t = reactor(
        vec![],
        CapabilityRegistry::builder().build(),
        Duration::from_millis(50),
        Duration::from_millis(30),
    );
    t.reactor.warm_up().unwrap();
    t.reactor.handle_phrase("aiko");
    assert_eq!(t.reactor.state(), AssistantState::Active);

    thread::sleep(Duration::from_millis(80));
    assert!(t.reactor.tick_step(None).unwrap().is_none());
    assert_eq!(t.reactor.state(), AssistantState::Idle);
    assert_eq!(t.reactor.activation().mode(), ActivationMode::Idle);
}

#[test]
fn test_tick_step_transcribes_then_dispatches() {
    let cap = lights();
    let calls = cap.counter();
    let steps = vec![Step::Interim, Step::Final("aiko turn on the light")];
    let mut t = reactor(steps, CapabilityRegistry::builder().register(cap).build(), WINDOW, POST);
    t.reactor.warm_up().unwrap();

    let frame = || AudioFrame::new(vec![0; 4000]);
    assert!(t.reactor.tick_step(Some(frame())).unwrap().is_none());
    let outcome = t.reactor.tick_step(Some(frame())).unwrap().unwrap();
    assert_eq!(outcome.text, "aiko turn on the light");
    assert!(outcome.handled_by.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(t.reactor.telemetry.snapshot().phrases, 1);
}

#[test]
fn test_capture_outage_blocks_and_recovers() {
    let mut t = reactor(vec![], CapabilityRegistry::builder().build(), WINDOW, POST);
    t.reactor.warm_up().unwrap();

    t.reactor.on_capture_status(&status(true));
    assert_eq!(t.reactor.state(), AssistantState::Idle);
    assert_eq!(t.resets.load(Ordering::SeqCst), 0);

    t.reactor.on_capture_status(&status(false));
    t.reactor.on_capture_status(&status(false));
    assert_eq!(t.reactor.state(), AssistantState::Blocked);

    // Still blocked while addressed; the window opens regardless.
    t.reactor.handle_phrase("aiko");
    assert_eq!(t.reactor.state(), AssistantState::Blocked);

    t.reactor.on_capture_status(&status(true));
    assert_eq!(t.resets.load(Ordering::SeqCst), 1);
    assert_eq!(t.reactor.state(), AssistantState::Active);

    let stats = t.reactor.telemetry.snapshot();
    assert_eq!(stats.capture_failures, 1);
    assert_eq!(stats.capture_reconnects, 1);
}

#[test]
fn test_recovery_without_window_goes_idle() {
    let mut t = reactor(vec![], CapabilityRegistry::builder().build(), WINDOW, POST);
    t.reactor.warm_up().unwrap();
    t.reactor.on_capture_status(&status(false));
    t.reactor.on_capture_status(&status(true));
    assert_eq!(t.reactor.state(), AssistantState::Idle);
}

struct Ticker {
    fail: bool,
}

impl Capability for Ticker {
    fn name(&self) -> &str {
        "ticker"
    }

    fn execute(&self, _text: &str, _ctx: &Context<'_>) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn on_tick(&self, _ctx: &Context<'_>) -> anyhow::Result<()> {
        if self.fail {
            panic!("tick exploded");
        }
        Ok(())
    }
}

#[test]
fn test_capability_ticks_are_isolated() {
    let registry = CapabilityRegistry::builder()
        .register(Ticker { fail: true })
        .register(Ticker { fail: false })
        .build();
    let mut t = reactor(vec![], registry, WINDOW, POST);

    // Not due yet.
    t.reactor.run_capability_ticks(Instant::now());
    assert_eq!(t.reactor.telemetry.snapshot().capability_failures, 0);

    t.reactor.run_capability_ticks(Instant::now() + Duration::from_secs(3601));
    assert_eq!(t.reactor.telemetry.snapshot().capability_failures, 1);
}

#[test]
fn test_session_summary_aggregates() {
    let cap = lights();
    let mut t = reactor(vec![], CapabilityRegistry::builder().register(cap).build(), WINDOW, POST);
    t.reactor.warm_up().unwrap();
    t.reactor.handle_phrase("aiko turn on the light");
    t.reactor.handle_phrase("aiko what is this");

    match t.reactor.telemetry.aggregate_session(Duration::from_secs(60)) {
        TelemetryEvent::SessionSummary {
            duration_secs,
            commands_handled,
            route_success_ratio,
            ..
        } => {
            assert_eq!(duration_secs, 60.0);
            assert_eq!(commands_handled, 1);
            assert!((route_success_ratio - 0.5).abs() < f32::EPSILON);
        }
        other => panic!("unexpected event {:?}", other),
    }
}
