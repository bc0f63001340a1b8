use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::activation::{Activation, ActivationWindow};
use super::dispatcher::{AttemptOutcome, CommandDispatcher, RouteCandidate, RouteSource};
use super::event::{AssistantState, AudioFrame, CaptureStatus, InputSource};
use super::telemetry::{RouteKind, TelemetryEvent, TelemetryRecorder};
use crate::capability::{isolate, Context, Notifier};
use crate::config::AikoConfig;
use crate::error::Result;
use crate::speech::TranscriptionService;

#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// How often every capability's `on_tick` runs.
    pub capability_tick: Duration,
    /// Log each addressed command at `info`.
    pub log_commands: bool,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self::from_config(&AikoConfig::default())
    }
}

impl ReactorConfig {
    pub fn from_config(cfg: &AikoConfig) -> Self {
        Self {
            capability_tick: cfg.supervisor.capability_tick(),
            log_commands: cfg.debug.log_commands,
        }
    }
}

/// What happened to one finalized phrase.
#[derive(Debug, Clone)]
pub struct PhraseOutcome {
    pub text: String,
    pub activation: Activation,
    /// The candidate that handled the command, if any.
    pub handled_by: Option<RouteCandidate>,
}

/// The main loop's state machine: transcription, activation and dispatch.
///
/// Owns the activation window and the assistant state tag. Every mutation of
/// either happens inside `tick_step` or `on_capture_status`, both called from
/// the single main loop.
pub struct Reactor {
    transcriber: TranscriptionService,
    activation: ActivationWindow,
    dispatcher: CommandDispatcher,
    notifier: Arc<dyn Notifier>,
    state: AssistantState,
    state_tx: watch::Sender<AssistantState>,
    capture_ok: Option<bool>,
    last_capability_tick: Instant,
    config: ReactorConfig,
    pub telemetry: TelemetryRecorder,
}

impl Reactor {
    pub fn new(
        transcriber: TranscriptionService,
        activation: ActivationWindow,
        dispatcher: CommandDispatcher,
        notifier: Arc<dyn Notifier>,
        config: ReactorConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(AssistantState::Init);
        Self {
            transcriber,
            activation,
            dispatcher,
            notifier,
            state: AssistantState::Init,
            state_tx,
            capture_ok: None,
            last_capability_tick: Instant::now(),
            config,
            telemetry: TelemetryRecorder::new(),
        }
    }

    pub fn state(&self) -> AssistantState {
        self.state
    }

    /// State updates for other threads (scheduler contexts, front ends).
    pub fn subscribe_state(&self) -> watch::Receiver<AssistantState> {
        self.state_tx.subscribe()
    }

    pub fn activation(&self) -> &ActivationWindow {
        &self.activation
    }

    /// Load the speech model now. A failure here should abort startup.
    pub fn warm_up(&mut self) -> Result<()> {
        self.transcriber.warm_up()?;
        if self.state == AssistantState::Init {
            self.set_state(AssistantState::Idle);
        }
        Ok(())
    }

    /// One main loop step. `frame` is `None` when the queue poll timed out.
    ///
    /// Returns `Err` only when the speech model cannot be loaded.
    pub fn tick_step(&mut self, frame: Option<AudioFrame>) -> Result<Option<PhraseOutcome>> {
        // 1. Level-triggered window timeout
        let mut closed = false;
        self.activation.handle_timeouts(|| closed = true);
        if closed && self.state == AssistantState::Active {
            self.set_state(AssistantState::Idle);
        }

        // 2. Periodic capability ticks
        self.run_capability_ticks(Instant::now());

        // 3. Transcribe
        let Some(frame) = frame else {
            return Ok(None);
        };
        let Some(phrase) = self.transcriber.accept_frame(&frame)? else {
            return Ok(None);
        };
        self.telemetry.record(TelemetryEvent::PhraseRecognized);
        debug!("Reactor: heard '{}'", phrase.text);

        // 4. Activation and dispatch
        Ok(Some(self.handle_phrase(&phrase.text)))
    }

    /// Activation check and dispatch for an already transcribed phrase.
    pub fn handle_phrase(&mut self, text: &str) -> PhraseOutcome {
        let activation = self.activation.check(text);
        let command = match &activation {
            Activation::Triggered { command } => {
                self.telemetry.record(TelemetryEvent::Addressed { triggered: true });
                self.activation.refresh();
                if self.state != AssistantState::Blocked {
                    self.set_state(AssistantState::Active);
                }
                if self.config.log_commands {
                    info!("Reactor: command after trigger -> '{}'", command);
                }
                Some(command.clone())
            }
            Activation::InWindow { command } => {
                self.telemetry.record(TelemetryEvent::Addressed { triggered: false });
                if self.config.log_commands {
                    info!("Reactor: follow-up in window -> '{}'", command);
                }
                Some(command.clone())
            }
            Activation::NotAddressed => {
                debug!("Reactor: not addressed, ignoring '{}'", text);
                None
            }
        };

        let handled_by = match command {
            Some(command) if !command.is_empty() => self.dispatch(&command),
            _ => None,
        };
        if handled_by.is_some() {
            self.activation.extend_post_command();
        }

        PhraseOutcome {
            text: text.to_string(),
            activation,
            handled_by,
        }
    }

    fn dispatch(&mut self, command: &str) -> Option<RouteCandidate> {
        let registry = self.dispatcher.registry().clone();
        let ctx = Context::new(self.state, InputSource::Mic, self.notifier.as_ref(), &registry);
        let mut failures = 0u64;
        let winner = self.dispatcher.route_observed(command, &ctx, |_, outcome| {
            if matches!(outcome, AttemptOutcome::Failed(_)) {
                failures += 1;
            }
        });

        for _ in 0..failures {
            self.telemetry.record(TelemetryEvent::CapabilityFailed);
        }
        let handled_by = winner.as_ref().map(|c| match c.source {
            RouteSource::Classifier { .. } => RouteKind::Classifier,
            RouteSource::Keyword { .. } => RouteKind::Keyword,
            RouteSource::Fallback => RouteKind::Fallback,
        });
        self.telemetry.record(TelemetryEvent::RouteCompleted { handled_by });
        winner
    }

    /// Fold a microphone status change into the state tag.
    ///
    /// A failed -> ok edge also resets the recognizer so audio from before the
    /// outage is not joined to new speech.
    pub fn on_capture_status(&mut self, status: &CaptureStatus) {
        let previous = self.capture_ok.replace(status.ok);
        if previous == Some(status.ok) {
            return;
        }
        self.telemetry.record(TelemetryEvent::CaptureStatus { ok: status.ok });

        if status.ok {
            if previous == Some(false) {
                info!("Reactor: microphone recovered, resetting recognizer");
                self.transcriber.reset();
            }
            if self.state == AssistantState::Blocked || self.state == AssistantState::Init {
                let next = if self.activation.is_active() {
                    AssistantState::Active
                } else {
                    AssistantState::Idle
                };
                self.set_state(next);
            }
        } else {
            error!("Reactor: microphone unavailable: {}", status.message);
            self.set_state(AssistantState::Blocked);
        }
    }

    pub fn run_capability_ticks(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_capability_tick) < self.config.capability_tick {
            return;
        }
        self.last_capability_tick = now;

        let registry = self.dispatcher.registry().clone();
        let ctx = Context::new(self.state, InputSource::Mic, self.notifier.as_ref(), &registry);
        for (_, capability) in registry.iter() {
            if let Err(e) = isolate(|| capability.on_tick(&ctx)) {
                error!(capability = capability.name(), "Reactor: on_tick failed: {}", e);
                self.telemetry.record(TelemetryEvent::CapabilityFailed);
            }
        }
    }

    fn set_state(&mut self, next: AssistantState) {
        if self.state == next {
            return;
        }
        info!("State: {} -> {}", self.state, next);
        self.telemetry.record(TelemetryEvent::StateTransition { from: self.state, to: next });
        self.state = next;
        self.state_tx.send_replace(next);
    }
}
