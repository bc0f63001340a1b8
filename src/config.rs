//! Runtime configuration.
//!
//! Persisted as pretty JSON. Every section carries `#[serde(default)]` so a
//! partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use crate::error::{Error, Result};

/// Env var consulted when no path is passed on the command line.
pub const CONFIG_ENV: &str = "AIKO_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AikoConfig {
    pub bot: BotConfig,
    pub audio: AudioConfig,
    pub speech: SpeechConfig,
    pub trigger: TriggerConfig,
    pub dispatch: DispatchConfig,
    pub scheduler: SchedulerConfig,
    pub supervisor: SupervisorConfig,
    pub log: LogConfig,
    pub debug: DebugConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Canonical activation name.
    pub name: String,
    /// Known recognizer misspellings of the name, with confidence 0-100.
    pub phonetic: BTreeMap<String, u8>,
    /// Lead-in words accepted before the name ("hey aiko").
    pub prefixes: BTreeMap<String, u8>,
    pub match_threshold: u8,
}

impl Default for BotConfig {
    fn default() -> Self {
        let phonetic = [
            ("aiko", 100),
            ("aika", 95),
            ("ai ko", 95),
            ("aiki", 90),
            ("aiku", 90),
            ("eiko", 90),
            ("haiku", 85),
            ("ai k", 85),
            ("maiko", 80),
            ("maika", 75),
            ("raikov", 70),
        ];
        let prefixes = [
            ("hey", 100),
            ("okay", 100),
            ("ok", 100),
            ("listen", 100),
            ("hi", 95),
            ("yo", 90),
        ];
        Self {
            name: "aiko".to_string(),
            phonetic: phonetic.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            prefixes: prefixes.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            match_threshold: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub device_id: usize,
    pub sample_rate: u32,
    pub block_size: usize,
    /// Capacity of the capture -> main loop frame queue, in blocks.
    pub queue_capacity: usize,
    pub watchdog_timeout_secs: f64,
    pub reconnect_cooldown_secs: f64,
    /// Replay this WAV file instead of opening a microphone.
    pub replay_path: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_id: 1,
            sample_rate: 16_000,
            block_size: 4_000,
            queue_capacity: 64,
            watchdog_timeout_secs: 2.0,
            reconnect_cooldown_secs: 10.0,
            replay_path: None,
        }
    }
}

impl AudioConfig {
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.watchdog_timeout_secs)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_cooldown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub model_path: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/vosk-model-small"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub active_window_secs: f64,
    pub post_command_window_secs: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            active_window_secs: 5.0,
            post_command_window_secs: 3.0,
        }
    }
}

impl TriggerConfig {
    pub fn active_window(&self) -> Duration {
        Duration::from_secs_f64(self.active_window_secs)
    }

    pub fn post_command_window(&self) -> Duration {
        Duration::from_secs_f64(self.post_command_window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Keyword threshold for ordinary ("start") triggers.
    pub start_threshold: u8,
    /// Keyword threshold for triggers in the stop family.
    pub stop_threshold: u8,
    pub stop_keywords: Vec<String>,
    /// Minimum cosine similarity for a classifier prediction.
    pub classifier_threshold: f32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            start_threshold: 70,
            stop_threshold: 75,
            stop_keywords: ["stop", "cancel", "turn off", "shut down", "quiet"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            classifier_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub db_path: PathBuf,
    pub interval_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("aiko_data.db"),
            interval_secs: 5.0,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub max_restarts: u32,
    pub restart_cooldown_secs: f64,
    pub join_timeout_secs: f64,
    /// How long the main loop blocks on the frame queue per iteration.
    pub poll_timeout_ms: u64,
    pub capability_tick_secs: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_cooldown_secs: 5.0,
            join_timeout_secs: 2.0,
            poll_timeout_ms: 150,
            capability_tick_secs: 5.0,
        }
    }
}

impl SupervisorConfig {
    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.restart_cooldown_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.join_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn capability_tick(&self) -> Duration {
        Duration::from_secs_f64(self.capability_tick_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub matcher_debug: bool,
    pub log_commands: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            matcher_debug: false,
            log_commands: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub lock_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lock_path: PathBuf::from("session.lock"),
        }
    }
}

impl AikoConfig {
    /// Resolve the config path: explicit argument, then `AIKO_CONFIG`, then `config.json`.
    pub fn resolve_path(arg: Option<String>) -> PathBuf {
        arg.or_else(|| std::env::var(CONFIG_ENV).ok())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load config from disk.
    ///
    /// A missing file is created with defaults. A malformed file is logged and
    /// replaced in memory (not on disk) by defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            let defaults = Self::default();
            match defaults.save(path) {
                Ok(()) => info!("Config: no file found, wrote defaults to {}", path.display()),
                Err(e) => error!("Config: failed to write defaults to {}: {}", path.display(), e),
            }
            return defaults;
        }

        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Config: failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".into()));
        }
        if self.audio.block_size == 0 || self.audio.queue_capacity == 0 {
            return Err(Error::Config("audio.block_size and audio.queue_capacity must be positive".into()));
        }
        for (key, value) in [
            ("bot.match_threshold", self.bot.match_threshold),
            ("dispatch.start_threshold", self.dispatch.start_threshold),
            ("dispatch.stop_threshold", self.dispatch.stop_threshold),
        ] {
            if value > 100 {
                return Err(Error::Config(format!("{} must be within 0..=100, got {}", key, value)));
            }
        }
        if self.trigger.post_command_window_secs > self.trigger.active_window_secs {
            return Err(Error::Config(
                "trigger.post_command_window_secs cannot exceed trigger.active_window_secs".into(),
            ));
        }
        for (key, secs) in [
            ("audio.watchdog_timeout_secs", self.audio.watchdog_timeout_secs),
            ("audio.reconnect_cooldown_secs", self.audio.reconnect_cooldown_secs),
            ("trigger.active_window_secs", self.trigger.active_window_secs),
            ("trigger.post_command_window_secs", self.trigger.post_command_window_secs),
            ("scheduler.interval_secs", self.scheduler.interval_secs),
            ("supervisor.restart_cooldown_secs", self.supervisor.restart_cooldown_secs),
            ("supervisor.join_timeout_secs", self.supervisor.join_timeout_secs),
            ("supervisor.capability_tick_secs", self.supervisor.capability_tick_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(Error::Config(format!("{} must be a non-negative number", key)));
            }
        }
        Ok(())
    }
}
