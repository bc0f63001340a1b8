use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use aiko::audio::{AudioCaptureService, CpalBackend, InputBackend, WavReplayBackend};
use aiko::capability::builtin::{ClockCapability, ReminderCapability};
use aiko::capability::{CapabilityRegistry, LogNotifier, Notifier};
use aiko::config::AikoConfig;
use aiko::intent::NgramClassifier;
use aiko::kernel::activation::ActivationWindow;
use aiko::kernel::dispatcher::{CommandDispatcher, KeywordThresholds};
use aiko::kernel::matcher::{Trigger, TriggerMatcher, DEFAULT_CACHE_CAPACITY};
use aiko::kernel::reactor::{Reactor, ReactorConfig};
use aiko::lifecycle::SessionLock;
use aiko::scheduler::{SqliteTaskStore, TaskScheduler, TaskStore};
use aiko::speech::{default_loader, TranscriptionService};
use aiko::supervisor::{capture_status_channel, capture_worker, scheduler_worker, Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Config path and logging. RUST_LOG wins over the config filter.
    let config_path = AikoConfig::resolve_path(std::env::args().nth(1));
    let configured_filter = AikoConfig::load(&config_path)
        .map(|cfg| cfg.log.filter)
        .unwrap_or_else(|_| "info".to_string());
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured_filter)))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!("Aiko core booting...");
    let config = AikoConfig::load_or_default(&config_path);
    tracing::info!("Config loaded from {}", config_path.display());

    // 2. Crash detection
    let mut session = SessionLock::acquire(&config.session.lock_path)?;
    if !session.previous_session_clean() {
        tracing::warn!("Previous session did not shut down cleanly");
    }

    // 3. Storage and capabilities
    let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::open(&config.scheduler.db_path)?);
    let registry = Arc::new(
        CapabilityRegistry::builder()
            .register(ClockCapability)
            .register(ReminderCapability::new(store.clone()))
            .build(),
    );
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    // 4. Matching, activation and dispatch
    let trigger = Trigger::from_config(&config.bot);
    let matcher = Arc::new(
        TriggerMatcher::new(DEFAULT_CACHE_CAPACITY)
            .with_trigger(trigger.clone())
            .with_debug(config.debug.matcher_debug),
    );
    let activation = ActivationWindow::from_config(matcher.clone(), &trigger, &config.trigger);
    let classifier = NgramClassifier::train(&registry, config.dispatch.classifier_threshold);
    let dispatcher = CommandDispatcher::new(
        registry.clone(),
        Box::new(classifier),
        matcher,
        KeywordThresholds::from_config(&config.dispatch),
    );

    // 5. Speech. A broken model is fatal before any thread starts.
    let transcriber = TranscriptionService::new(default_loader(&config.speech, config.audio.sample_rate));
    let mut reactor = Reactor::new(
        transcriber,
        activation,
        dispatcher,
        notifier.clone(),
        ReactorConfig::from_config(&config),
    );
    reactor.warm_up()?;

    // 6. Workers
    let (frame_tx, frame_rx) = mpsc::channel(config.audio.queue_capacity);
    let (status_callback, status_rx) = capture_status_channel();
    let backend: Box<dyn InputBackend> = match &config.audio.replay_path {
        Some(path) => {
            tracing::info!("Audio input replayed from {}", path.display());
            Box::new(WavReplayBackend::new(path.clone()))
        }
        None => Box::new(CpalBackend::new()),
    };
    let capture = Arc::new(
        AudioCaptureService::new(backend, frame_tx, &config.audio).with_status_callback(status_callback),
    );
    let scheduler = Arc::new(TaskScheduler::new(
        store,
        registry,
        notifier,
        reactor.subscribe_state(),
        config.scheduler.interval(),
    ));

    let mut supervisor = Supervisor::new(reactor, frame_rx, status_rx, &config.supervisor)
        .with_worker("audio", capture_worker(capture))
        .with_worker("scheduler", scheduler_worker(scheduler));

    // 7. Ctrl+C cancels the global stop signal
    let stop = supervisor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping...");
            stop.cancel();
        }
    });

    tracing::info!("Aiko active. Say '{}' to start. Press Ctrl+C to stop.", trigger.name);
    let result = supervisor.run().await;

    session.release()?;
    result?;
    Ok(())
}
