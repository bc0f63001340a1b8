#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aiko::capability::{Capability, CapabilityRegistry, Context, Notification, Notifier};
use aiko::error::{Error, Result};
use aiko::intent::NullClassifier;
use aiko::kernel::activation::ActivationWindow;
use aiko::kernel::dispatcher::{CommandDispatcher, KeywordThresholds};
use aiko::kernel::event::{AssistantState, InputSource};
use aiko::kernel::matcher::{Trigger, TriggerMatcher};
use aiko::kernel::reactor::{Reactor, ReactorConfig};
use aiko::speech::{SpeechEngine, TranscriptionService};

/// Collects every notification for later inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.text.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub fn context<'a>(notifier: &'a dyn Notifier, registry: &'a CapabilityRegistry) -> Context<'a> {
    Context::new(AssistantState::Idle, InputSource::Mic, notifier, registry)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Accept,
    Decline,
    Fail,
    Panic,
}

/// Capability with scripted behavior that counts its invocations.
pub struct TestCapability {
    pub name: String,
    pub behavior: Behavior,
    pub triggers: Vec<String>,
    pub samples: Vec<String>,
    pub task_type: Option<String>,
    pub calls: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl TestCapability {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            triggers: Vec::new(),
            samples: Vec::new(),
            task_type: None,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_triggers(mut self, triggers: &[&str]) -> Self {
        self.triggers = triggers.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_samples(mut self, samples: &[&str]) -> Self {
        self.samples = samples.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task_type = Some(task_type.to_string());
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        self.seen.clone()
    }
}

impl Capability for TestCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, text: &str, _ctx: &Context<'_>) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(text.to_string());
        match self.behavior {
            Behavior::Accept => Ok(true),
            Behavior::Decline => Ok(false),
            Behavior::Fail => anyhow::bail!("{} exploded", self.name),
            Behavior::Panic => panic!("{} panicked", self.name),
        }
    }

    fn triggers(&self) -> Vec<String> {
        self.triggers.clone()
    }

    fn samples(&self) -> Vec<String> {
        self.samples.clone()
    }

    fn task_type(&self) -> Option<&str> {
        self.task_type.as_deref()
    }

    fn on_schedule(&self, payload: &serde_json::Value, _ctx: &Context<'_>) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(payload.to_string());
        match self.behavior {
            Behavior::Fail => anyhow::bail!("{} schedule failed", self.name),
            Behavior::Panic => panic!("{} schedule panicked", self.name),
            Behavior::Accept | Behavior::Decline => Ok(()),
        }
    }
}

/// One scripted engine response per accepted frame.
#[derive(Debug, Clone)]
pub enum Step {
    Interim,
    Final(&'static str),
    Fail,
}

/// Speech engine replaying a script; counts resets.
pub struct ScriptedEngine {
    pub script: VecDeque<Step>,
    pub resets: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<Step>) -> (Self, Arc<AtomicUsize>) {
        let resets = Arc::new(AtomicUsize::new(0));
        (
            Self {
                script: steps.into(),
                resets: resets.clone(),
            },
            resets,
        )
    }
}

impl SpeechEngine for ScriptedEngine {
    fn accept(&mut self, _samples: &[i16]) -> Result<Option<String>> {
        match self.script.pop_front() {
            Some(Step::Final(text)) => Ok(Some(text.to_string())),
            Some(Step::Fail) => Err(Error::Speech("scripted failure".into())),
            Some(Step::Interim) | None => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reactor wired to a scripted engine, an "aiko" trigger and `registry`.
pub struct TestReactor {
    pub reactor: Reactor,
    pub resets: Arc<AtomicUsize>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn reactor(steps: Vec<Step>, registry: CapabilityRegistry, window: Duration, post: Duration) -> TestReactor {
    let trigger = Trigger::new("aiko", 80).with_phonetic("aika", 95);
    let matcher = Arc::new(TriggerMatcher::default().with_trigger(trigger.clone()));
    let activation = ActivationWindow::new(matcher.clone(), &trigger, window, post);
    let dispatcher = CommandDispatcher::new(
        Arc::new(registry),
        Box::new(NullClassifier),
        matcher,
        KeywordThresholds::default(),
    );
    let (engine, resets) = ScriptedEngine::new(steps);
    let notifier = Arc::new(RecordingNotifier::default());
    let reactor = Reactor::new(
        TranscriptionService::with_engine(Box::new(engine)),
        activation,
        dispatcher,
        notifier.clone(),
        ReactorConfig {
            capability_tick: Duration::from_secs(3600),
            log_commands: true,
        },
    );
    TestReactor {
        reactor,
        resets,
        notifier,
    }
}
