use std::sync::Arc;
use std::time::{Duration, Instant};

use aiko::kernel::activation::{Activation, ActivationMode, ActivationWindow};
use aiko::kernel::matcher::{Trigger, TriggerMatcher};

const WINDOW: Duration = Duration::from_secs(5);
const POST: Duration = Duration::from_secs(3);

fn window() -> ActivationWindow {
    let trigger = Trigger::new("aiko", 80).with_phonetic("aika", 95);
    let matcher = Arc::new(TriggerMatcher::default().with_trigger(trigger.clone()));
    ActivationWindow::new(matcher, &trigger, WINDOW, POST)
}

#[test]
fn test_starts_idle_and_ignores_plain_speech() {
    let w = window();
    assert_eq!(w.mode(), ActivationMode::Idle);
    assert!(!w.is_active());
    assert_eq!(w.check("turn on the light"), Activation::NotAddressed);
}

#[test]
fn test_trigger_is_detected_without_mutation() {
    let w = window();
    let activation = w.check("Aika turn on the light");
    assert_eq!(
        activation,
        Activation::Triggered {
            command: "turn on the light".into()
        }
    );
    assert_eq!(activation.command(), Some("turn on the light"));
    // Checking alone does not open the window.
    assert_eq!(w.mode(), ActivationMode::Idle);
}

#[test]
fn test_window_duration_after_refresh() {
    let mut w = window();
    let t0 = Instant::now();
    w.refresh_at(t0);

    assert_eq!(w.mode(), ActivationMode::Active);
    assert!(w.is_active_at(t0));
    assert!(w.is_active_at(t0 + Duration::from_millis(4_900)));
    assert!(!w.is_active_at(t0 + WINDOW));
    assert!(!w.is_active_at(t0 + Duration::from_millis(5_100)));
}

#[test]
fn test_follow_up_inside_window() {
    let mut w = window();
    let t0 = Instant::now();
    w.refresh_at(t0);

    let inside = w.check_at("Turn Off  ", t0 + Duration::from_secs(1));
    assert_eq!(inside, Activation::InWindow { command: "turn off".into() });

    let outside = w.check_at("turn off", t0 + Duration::from_secs(6));
    assert_eq!(outside, Activation::NotAddressed);
}

#[test]
fn test_timeout_fires_once() {
    let mut w = window();
    let t0 = Instant::now();
    w.refresh_at(t0);

    let mut fired = 0;
    assert!(!w.handle_timeouts_at(t0 + Duration::from_secs(4), || fired += 1));
    assert!(w.handle_timeouts_at(t0 + Duration::from_millis(5_100), || fired += 1));
    assert!(!w.handle_timeouts_at(t0 + Duration::from_secs(7), || fired += 1));
    assert_eq!(fired, 1);
    assert_eq!(w.mode(), ActivationMode::Idle);
}

#[test]
fn test_post_command_window_is_shorter() {
    let mut w = window();
    let t0 = Instant::now();
    w.refresh_at(t0);
    w.extend_post_command_at(t0);

    assert_eq!(w.mode(), ActivationMode::Active);
    assert!(w.is_active_at(t0 + Duration::from_millis(2_900)));
    assert!(!w.is_active_at(t0 + Duration::from_millis(3_100)));

    let snap = w.snapshot();
    assert_eq!(snap.window, WINDOW);
    assert_eq!(snap.post_command_window, POST);
    assert!(snap.remaining_at(t0) <= POST);
}

#[test]
fn test_refresh_reopens_full_window() {
    let mut w = window();
    let t0 = Instant::now();
    w.refresh_at(t0);
    w.extend_post_command_at(t0);
    w.refresh_at(t0 + Duration::from_secs(2));
    assert!(w.is_active_at(t0 + Duration::from_millis(6_900)));
}
