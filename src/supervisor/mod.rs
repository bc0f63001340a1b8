//! Top-level orchestration: worker threads, the main phrase loop and shutdown.

pub mod worker;

pub use worker::{SupervisedWorker, WorkerEvent, WorkerFactory};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audio::{AudioCaptureService, StatusCallback};
use crate::config::SupervisorConfig;
use crate::error::Result;
use crate::kernel::event::{AudioFrame, CaptureStatus};
use crate::kernel::reactor::Reactor;
use crate::kernel::telemetry::TelemetryEvent;
use crate::scheduler::TaskScheduler;

/// Status callback for the capture service plus the receiving end for the main loop.
///
/// Unbounded so no transition is lost; transitions are rare.
pub fn capture_status_channel() -> (StatusCallback, mpsc::UnboundedReceiver<CaptureStatus>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: StatusCallback = Box::new(move |status: &CaptureStatus| {
        let _ = tx.send(status.clone());
    });
    (callback, rx)
}

/// Worker that runs `AudioCaptureService::listen` on its own thread.
pub fn capture_worker(capture: Arc<AudioCaptureService>) -> WorkerFactory {
    Box::new(move |token: CancellationToken| {
        let capture = capture.clone();
        thread::Builder::new()
            .name("aiko-audio".into())
            .spawn(move || capture.listen(&token))
    })
}

/// Worker that runs the task scheduler loop on its own thread.
pub fn scheduler_worker(scheduler: Arc<TaskScheduler>) -> WorkerFactory {
    Box::new(move |token: CancellationToken| {
        let scheduler = scheduler.clone();
        thread::Builder::new()
            .name("aiko-scheduler".into())
            .spawn(move || scheduler.run(&token))
    })
}

/// Runs the main loop and keeps the worker threads alive.
///
/// Each loop iteration checks worker liveness, folds capture status changes
/// into the reactor, then waits briefly for one audio frame and hands it (or
/// the timeout) to `Reactor::tick_step`.
pub struct Supervisor {
    reactor: Reactor,
    frames: mpsc::Receiver<AudioFrame>,
    statuses: mpsc::UnboundedReceiver<CaptureStatus>,
    workers: Vec<SupervisedWorker>,
    cancel: CancellationToken,
    max_restarts: u32,
    restart_cooldown: Duration,
    join_timeout: Duration,
    poll_timeout: Duration,
    started_at: Instant,
    stopped: bool,
}

impl Supervisor {
    pub fn new(
        reactor: Reactor,
        frames: mpsc::Receiver<AudioFrame>,
        statuses: mpsc::UnboundedReceiver<CaptureStatus>,
        cfg: &SupervisorConfig,
    ) -> Self {
        Self {
            reactor,
            frames,
            statuses,
            workers: Vec::new(),
            cancel: CancellationToken::new(),
            max_restarts: cfg.max_restarts,
            restart_cooldown: cfg.restart_cooldown(),
            join_timeout: cfg.join_timeout(),
            poll_timeout: cfg.poll_timeout(),
            started_at: Instant::now(),
            stopped: false,
        }
    }

    pub fn with_worker(mut self, name: &str, factory: WorkerFactory) -> Self {
        self.workers
            .push(SupervisedWorker::new(name, factory, self.max_restarts, self.restart_cooldown));
        self
    }

    /// The global stop signal. Cancelling it makes `run` return after shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn workers(&self) -> &[SupervisedWorker] {
        &self.workers
    }

    /// Run until cancelled or until a fatal error.
    ///
    /// Fatal errors (restart budget exhausted, speech model failure) cancel
    /// every worker, run `shutdown` and are returned.
    pub async fn run(&mut self) -> Result<()> {
        self.started_at = Instant::now();
        info!("Supervisor: starting {} worker(s)", self.workers.len());

        let now = Instant::now();
        for i in 0..self.workers.len() {
            let event = self.workers[i].start(&self.cancel, now);
            if let Err(e) = event {
                return self.fail(e).await;
            }
        }

        info!("Supervisor: main loop running (poll {}ms)", self.poll_timeout.as_millis());
        while !self.cancel.is_cancelled() {
            // 1. Worker liveness
            if let Err(e) = self.check_workers(Instant::now()) {
                return self.fail(e).await;
            }

            // 2. Capture status transitions
            while let Ok(status) = self.statuses.try_recv() {
                self.reactor.on_capture_status(&status);
            }

            // 3. Wait for audio, bounded so timeouts and ticks keep running
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = timeout(self.poll_timeout, self.frames.recv()) => match received {
                    Ok(Some(frame)) => Some(frame),
                    Ok(None) => {
                        tokio::time::sleep(self.poll_timeout).await;
                        None
                    }
                    Err(_) => None,
                },
            };

            // 4. Core step
            if let Err(e) = self.reactor.tick_step(frame) {
                return self.fail(e).await;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn check_workers(&mut self, now: Instant) -> Result<()> {
        for worker in &mut self.workers {
            match worker.poll(&self.cancel, now)? {
                WorkerEvent::Restarted { attempt } => {
                    self.reactor.telemetry.record(TelemetryEvent::WorkerRestarted {
                        worker: worker.name().to_string(),
                        attempt,
                    });
                }
                WorkerEvent::Running | WorkerEvent::Died { .. } | WorkerEvent::CoolingDown => {}
            }
        }
        Ok(())
    }

    async fn fail(&mut self, e: crate::error::Error) -> Result<()> {
        error!("Supervisor: fatal error, shutting down: {}", e);
        self.cancel.cancel();
        self.shutdown().await;
        Err(e)
    }

    /// Cancel all workers and join each with a bounded wait. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("Supervisor: shutting down");
        self.cancel.cancel();

        let join_timeout = self.join_timeout;
        for worker in &mut self.workers {
            if !worker.stop(join_timeout).await {
                warn!(worker = worker.name(), "Supervisor: proceeding without joining worker");
            }
        }

        self.reactor
            .telemetry
            .log_session_summary(self.started_at.elapsed());
        info!("Supervisor: shutdown complete");
    }
}
