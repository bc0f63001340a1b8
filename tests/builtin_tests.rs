mod common;

use std::sync::Arc;

use aiko::capability::builtin::{parse_reminder, ClockCapability, ReminderCapability, ReminderRequest};
use aiko::capability::{Capability, CapabilityRegistry, Context, NotifyLevel, NotifyTarget};
use aiko::kernel::event::{AssistantState, InputSource};
use aiko::scheduler::{SqliteTaskStore, TaskStatus};
use chrono::Local;
use common::{context, RecordingNotifier};
use serde_json::json;

fn request(delay_secs: i64, text: &str) -> Option<Result<ReminderRequest, &'static str>> {
    Some(Ok(ReminderRequest {
        delay_secs,
        text: text.into(),
    }))
}

#[test]
fn test_parse_reminder_forms() {
    assert_eq!(parse_reminder("remind me in ten minutes to stretch"), request(600, "stretch"));
    assert_eq!(parse_reminder("Remind me to call mom in an hour"), request(3600, "call mom"));
    assert_eq!(
        parse_reminder("reminder in 30 seconds check the oven"),
        request(30, "check the oven")
    );
    assert_eq!(parse_reminder("set a reminder in 2 hours about laundry"), request(7200, "laundry"));
}

#[test]
fn test_parse_reminder_rejections() {
    assert_eq!(parse_reminder("what time is it"), None);
    assert_eq!(parse_reminder("remind me to stretch"), Some(Err("missing delay")));
    assert!(matches!(parse_reminder("remind me in a while to stretch"), Some(Err(_))));
    assert_eq!(parse_reminder("remind me in 200 hours to rest"), Some(Err("delay out of range")));
    assert_eq!(parse_reminder("remind me in 0 minutes to rest"), Some(Err("delay out of range")));
    assert_eq!(parse_reminder("remind me in five minutes"), Some(Err("nothing to remind about")));
}

#[test]
fn test_reminder_stores_task() {
    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let reminder = ReminderCapability::new(store.clone());
    let registry = CapabilityRegistry::builder().build();
    let notifier = RecordingNotifier::default();
    let ctx = context(&notifier, &registry);

    let before = Local::now().naive_local();
    assert!(reminder.execute("remind me in 5 minutes to stretch", &ctx).unwrap());

    let tasks = store.all_tasks().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, ReminderCapability::TASK_TYPE);
    assert_eq!(tasks[0].status, TaskStatus::Pending);
    assert_eq!(tasks[0].payload, json!({"text": "stretch", "to_gui": true}));
    let delay = tasks[0].execute_at - before;
    assert!(delay.num_seconds() >= 299 && delay.num_seconds() <= 301, "{:?}", delay);

    let texts = notifier.texts();
    assert!(texts[0].starts_with("Okay, I'll remind you at "));
}

#[test]
fn test_reminder_declines_other_phrases_and_warns_on_bad_delay() {
    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let reminder = ReminderCapability::new(store.clone());
    let registry = CapabilityRegistry::builder().build();
    let notifier = RecordingNotifier::default();
    let ctx = context(&notifier, &registry);

    assert!(!reminder.execute("play some jazz", &ctx).unwrap());
    assert!(reminder.execute("remind me to stretch", &ctx).unwrap());
    assert!(store.all_tasks().unwrap().is_empty());

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].level, NotifyLevel::Warning);
}

#[test]
fn test_reminder_fires_as_broadcast() {
    let reminder = ReminderCapability::new(Arc::new(SqliteTaskStore::open_in_memory().unwrap()));
    assert_eq!(reminder.task_type(), Some("reminder"));
    let registry = CapabilityRegistry::builder().build();
    let notifier = RecordingNotifier::default();
    let ctx = context(&notifier, &registry);

    reminder.on_schedule(&json!({"text": "stretch"}), &ctx).unwrap();
    reminder.on_schedule(&json!("plain note"), &ctx).unwrap();

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent[0].text, "Reminder: stretch");
    assert_eq!(sent[0].target, NotifyTarget::Broadcast);
    assert_eq!(sent[1].text, "Reminder: plain note");
}

#[test]
fn test_clock_replies_with_time() {
    let registry = CapabilityRegistry::builder().build();
    let notifier = RecordingNotifier::default();
    let ctx = context(&notifier, &registry);

    assert!(ClockCapability.execute("what time is it", &ctx).unwrap());
    assert!(!ClockCapability.execute("play music", &ctx).unwrap());

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.starts_with("It's "));
    assert_eq!(sent[0].target, NotifyTarget::Reply(InputSource::Mic));
}

#[test]
fn test_reply_returns_to_the_originating_source() {
    let registry = CapabilityRegistry::builder().build();
    let notifier = RecordingNotifier::default();
    let scheduled = Context::new(AssistantState::Idle, InputSource::Scheduler, &notifier, &registry);

    assert!(ClockCapability.execute("what time is it", &scheduled).unwrap());

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent[0].target, NotifyTarget::Reply(InputSource::Scheduler));
    assert_eq!(InputSource::Scheduler.to_string(), "scheduler");
    assert_eq!(InputSource::Mic.to_string(), "mic");
}
