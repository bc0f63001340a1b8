use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// One captured block of mono 16-bit PCM.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub captured_at: Instant,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            captured_at: Instant::now(),
        }
    }

    /// Little-endian byte view, the layout speech engines expect on the wire.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Finalized recognizer output for one utterance.
#[derive(Debug, Clone)]
pub struct Phrase {
    pub id: Uuid,
    pub text: String,
    pub arrived_at: Instant,
}

impl Phrase {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            arrived_at: Instant::now(),
        }
    }
}

/// Microphone health as last reported by the capture service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStatus {
    pub ok: bool,
    pub message: String,
}

impl CaptureStatus {
    pub fn pending() -> Self {
        Self {
            ok: false,
            message: "starting".to_string(),
        }
    }
}

/// Coarse assistant state exposed to capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssistantState {
    Init,
    Idle,
    Active,
    /// Microphone unavailable.
    Blocked,
}

impl fmt::Display for AssistantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            AssistantState::Init => "init",
            AssistantState::Idle => "idle",
            AssistantState::Active => "active",
            AssistantState::Blocked => "blocked",
        };
        f.write_str(tag)
    }
}

/// Where the command being handled came from; replies go back there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    Mic,
    Scheduler,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            InputSource::Mic => "mic",
            InputSource::Scheduler => "scheduler",
        };
        f.write_str(tag)
    }
}
