use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::matcher::{Trigger, TriggerMatcher};
use crate::config::TriggerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationMode {
    Idle,
    Active,
}

/// How a phrase came to be treated as addressed to the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// The phrase started with the assistant's name; `command` is what followed it.
    Triggered { command: String },
    /// No name, but the follow-up window was open.
    InWindow { command: String },
    NotAddressed,
}

impl Activation {
    pub fn is_addressed(&self) -> bool {
        !matches!(self, Activation::NotAddressed)
    }

    /// Command text with the trigger removed, if the phrase was addressed.
    pub fn command(&self) -> Option<&str> {
        match self {
            Activation::Triggered { command } | Activation::InWindow { command } => Some(command),
            Activation::NotAddressed => None,
        }
    }
}

/// By-value view of the window, safe to hand to other threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationSnapshot {
    pub mode: ActivationMode,
    pub last_activation: Option<Instant>,
    pub window: Duration,
    pub post_command_window: Duration,
}

impl ActivationSnapshot {
    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.last_activation {
            Some(at) => self.window.saturating_sub(now.saturating_duration_since(at)),
            None => Duration::ZERO,
        }
    }
}

/// Tracks whether an un-prefixed follow-up should still count as a command.
///
/// Owned by the main loop; every mutation happens there. The idle transition is
/// level-triggered: `handle_timeouts` compares elapsed time against the window on
/// each poll rather than arming a timer.
pub struct ActivationWindow {
    matcher: Arc<TriggerMatcher>,
    names: Vec<String>,
    threshold: u8,
    mode: ActivationMode,
    last_activation: Option<Instant>,
    window: Duration,
    post_command_window: Duration,
}

impl ActivationWindow {
    pub fn new(matcher: Arc<TriggerMatcher>, trigger: &Trigger, window: Duration, post_command_window: Duration) -> Self {
        info!(
            "Activation: name '{}', threshold {}%, window {:.1}s (post-command {:.1}s)",
            trigger.name,
            trigger.threshold,
            window.as_secs_f64(),
            post_command_window.as_secs_f64()
        );
        Self {
            matcher,
            names: vec![trigger.name.clone()],
            threshold: trigger.threshold,
            mode: ActivationMode::Idle,
            last_activation: None,
            window,
            post_command_window: post_command_window.min(window),
        }
    }

    pub fn from_config(matcher: Arc<TriggerMatcher>, trigger: &Trigger, cfg: &TriggerConfig) -> Self {
        Self::new(matcher, trigger, cfg.active_window(), cfg.post_command_window())
    }

    /// Decide whether `phrase` is addressed to the assistant.
    pub fn check(&self, phrase: &str) -> Activation {
        self.check_at(phrase, Instant::now())
    }

    pub fn check_at(&self, phrase: &str, now: Instant) -> Activation {
        if let Some(hit) = self.matcher.check_trigger(phrase, &self.names, self.threshold) {
            info!("Activation: trigger '{}' found, command '{}'", hit.matched, hit.remaining);
            return Activation::Triggered { command: hit.remaining };
        }

        if self.is_active_at(now) {
            debug!("Activation: phrase inside active window");
            return Activation::InWindow {
                command: phrase.trim().to_lowercase(),
            };
        }

        Activation::NotAddressed
    }

    /// Reopen the window for its full duration (idle -> active).
    pub fn refresh(&mut self) {
        self.refresh_at(Instant::now());
    }

    pub fn refresh_at(&mut self, now: Instant) {
        self.last_activation = Some(now);
        if self.mode != ActivationMode::Active {
            info!("Activation: idle -> active");
        }
        self.mode = ActivationMode::Active;
        debug!("Activation: window reset to {:.1}s", self.window.as_secs_f64());
    }

    /// After a successful command, leave only the short post-command window open.
    pub fn extend_post_command(&mut self) {
        self.extend_post_command_at(Instant::now());
    }

    pub fn extend_post_command_at(&mut self, now: Instant) {
        let backdate = self.window.saturating_sub(self.post_command_window);
        self.last_activation = Some(now.checked_sub(backdate).unwrap_or(now));
        self.mode = ActivationMode::Active;
        debug!("Activation: window shortened to {:.1}s after command", self.post_command_window.as_secs_f64());
    }

    /// Close the window once it has elapsed; `on_idle` fires once per active -> idle edge.
    pub fn handle_timeouts<F: FnOnce()>(&mut self, on_idle: F) -> bool {
        self.handle_timeouts_at(Instant::now(), on_idle)
    }

    pub fn handle_timeouts_at<F: FnOnce()>(&mut self, now: Instant, on_idle: F) -> bool {
        if self.mode == ActivationMode::Active && !self.is_active_at(now) {
            info!("Activation: window closed by timeout");
            self.mode = ActivationMode::Idle;
            on_idle();
            return true;
        }
        false
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Instant::now())
    }

    pub fn is_active_at(&self, now: Instant) -> bool {
        match self.last_activation {
            Some(at) => now.saturating_duration_since(at) < self.window,
            None => false,
        }
    }

    pub fn mode(&self) -> ActivationMode {
        self.mode
    }

    pub fn snapshot(&self) -> ActivationSnapshot {
        ActivationSnapshot {
            mode: self.mode,
            last_activation: self.last_activation,
            window: self.window,
            post_command_window: self.post_command_window,
        }
    }
}
