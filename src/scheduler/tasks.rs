use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Timestamp layout used in the `scheduler` table. Lexicographic order equals time order.
pub const EXEC_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TaskStatus::Pending),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted delayed action. Status only ever moves from pending to done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: i64,
    pub task_type: String,
    /// Parsed JSON, or a JSON string when the stored payload was plain text.
    pub payload: Value,
    pub execute_at: NaiveDateTime,
    pub status: TaskStatus,
}

pub fn format_exec_at(at: NaiveDateTime) -> String {
    at.format(EXEC_AT_FORMAT).to_string()
}

pub fn parse_exec_at(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), EXEC_AT_FORMAT).ok()
}

/// Stored payload text to a value: JSON when it parses, the raw text otherwise.
pub fn decode_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Plain strings are stored verbatim so other writers can use bare text payloads.
pub fn encode_payload(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
