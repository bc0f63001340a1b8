//! Capabilities shipped with the binary.

use anyhow::Context as _;
use chrono::{Local, NaiveDateTime};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{Capability, Context, NotifyLevel};
use crate::scheduler::TaskStore;

/// Answers "what time is it".
#[derive(Debug, Default)]
pub struct ClockCapability;

impl Capability for ClockCapability {
    fn name(&self) -> &str {
        "clock"
    }

    fn execute(&self, text: &str, ctx: &Context<'_>) -> anyhow::Result<bool> {
        let text = text.to_lowercase();
        if !(text.contains("time") || text.contains("clock")) {
            return Ok(false);
        }
        let now = Local::now().format("%H:%M");
        ctx.reply(format!("It's {}", now));
        Ok(true)
    }

    fn triggers(&self) -> Vec<String> {
        vec!["what time".into(), "time".into()]
    }

    fn samples(&self) -> Vec<String> {
        [
            "what time is it",
            "tell me the time",
            "what's the time",
            "current time",
            "what time is it now",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

const REMINDER_PREFIXES: [&str; 4] = ["set a reminder", "remind me", "reminder", "remind"];
const FILLER_WORDS: [&str; 5] = ["to", "about", "that", "of", "me"];
/// Reminders further out than a week are refused.
const MAX_DELAY_SECS: i64 = 7 * 24 * 3600;

/// "remind me in 10 minutes to stretch" stores a `reminder` task.
pub struct ReminderCapability {
    store: Arc<dyn TaskStore>,
}

impl ReminderCapability {
    pub const TASK_TYPE: &'static str = "reminder";

    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

/// Parsed "in N <unit> [to] <text>" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderRequest {
    pub delay_secs: i64,
    pub text: String,
}

fn number_word(word: &str) -> Option<i64> {
    let n = match word {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "fifteen" => 15,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        _ => return word.parse().ok(),
    };
    Some(n)
}

fn unit_secs(word: &str) -> Option<i64> {
    match word.trim_end_matches('s') {
        "second" | "sec" => Some(1),
        "minute" | "min" => Some(60),
        "hour" | "hr" => Some(3600),
        _ => None,
    }
}

/// Parse a reminder phrase. `None` when the phrase is not a reminder request at all.
pub fn parse_reminder(text: &str) -> Option<Result<ReminderRequest, &'static str>> {
    let lower = text.trim().to_lowercase();
    let rest = REMINDER_PREFIXES
        .iter()
        .find_map(|p| lower.strip_prefix(p))?
        .trim();

    let words: Vec<&str> = rest.split_whitespace().collect();
    let Some(in_pos) = words.iter().position(|w| *w == "in") else {
        return Some(Err("missing delay"));
    };
    let (Some(amount), Some(unit)) = (
        words.get(in_pos + 1).and_then(|w| number_word(w)),
        words.get(in_pos + 2).and_then(|w| unit_secs(w)),
    ) else {
        return Some(Err("delay must look like 'in 10 minutes'"));
    };
    let delay_secs = amount.saturating_mul(unit);
    if delay_secs <= 0 || delay_secs > MAX_DELAY_SECS {
        return Some(Err("delay out of range"));
    }

    // Text may come before ("remind me to X in 5 minutes") or after the delay.
    let mut text_words: Vec<&str> = words[..in_pos].to_vec();
    text_words.extend_from_slice(&words[(in_pos + 3).min(words.len())..]);
    while text_words.first().is_some_and(|w| FILLER_WORDS.contains(w)) {
        text_words.remove(0);
    }
    if text_words.is_empty() {
        return Some(Err("nothing to remind about"));
    }

    Some(Ok(ReminderRequest {
        delay_secs,
        text: text_words.join(" "),
    }))
}

impl Capability for ReminderCapability {
    fn name(&self) -> &str {
        "reminder"
    }

    fn execute(&self, text: &str, ctx: &Context<'_>) -> anyhow::Result<bool> {
        let request = match parse_reminder(text) {
            None => return Ok(false),
            Some(Err(problem)) => {
                ctx.reply_with(
                    format!("Could not set the reminder ({}). Try: remind me in 10 minutes to stretch", problem),
                    NotifyLevel::Warning,
                );
                return Ok(true);
            }
            Some(Ok(request)) => request,
        };

        let execute_at: NaiveDateTime =
            Local::now().naive_local() + chrono::Duration::seconds(request.delay_secs);
        let id = self
            .store
            .add_task(Self::TASK_TYPE, &json!({ "text": request.text, "to_gui": true }), execute_at)
            .context("storing reminder")?;
        info!(task_id = id, "Reminder: scheduled in {}s", request.delay_secs);
        ctx.reply(format!("Okay, I'll remind you at {}", execute_at.format("%H:%M")));
        Ok(true)
    }

    fn triggers(&self) -> Vec<String> {
        vec!["remind me".into(), "reminder".into(), "set a reminder".into()]
    }

    fn samples(&self) -> Vec<String> {
        [
            "remind me in ten minutes to stretch",
            "remind me to call mom in an hour",
            "set a reminder in five minutes",
            "reminder in 30 seconds check the oven",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn task_type(&self) -> Option<&str> {
        Some(Self::TASK_TYPE)
    }

    fn on_schedule(&self, payload: &Value, ctx: &Context<'_>) -> anyhow::Result<()> {
        let text = match payload {
            Value::Object(map) => map
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or("empty reminder")
                .to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        ctx.broadcast(format!("Reminder: {}", text), NotifyLevel::Info);
        Ok(())
    }
}
