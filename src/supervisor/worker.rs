use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Starts one run of a worker thread. Called again for every restart.
pub type WorkerFactory = Box<dyn FnMut(CancellationToken) -> std::io::Result<JoinHandle<Result<()>>> + Send>;

/// What `poll` found out about a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Running,
    /// The thread ended; a restart is scheduled after the cooldown.
    Died { reason: String },
    /// A new thread was started.
    Restarted { attempt: u32 },
    /// Waiting out the cooldown.
    CoolingDown,
}

/// A named worker thread with a restart budget.
pub struct SupervisedWorker {
    name: String,
    factory: WorkerFactory,
    handle: Option<JoinHandle<Result<()>>>,
    token: Option<CancellationToken>,
    restarts: u32,
    max_restarts: u32,
    cooldown: Duration,
    next_attempt_at: Option<Instant>,
}

impl SupervisedWorker {
    pub fn new(name: impl Into<String>, factory: WorkerFactory, max_restarts: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            factory,
            handle: None,
            token: None,
            restarts: 0,
            max_restarts,
            cooldown,
            next_attempt_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// First start. A spawn failure counts as a death.
    pub fn start(&mut self, parent: &CancellationToken, now: Instant) -> Result<WorkerEvent> {
        match self.spawn(parent) {
            Ok(()) => {
                info!(worker = %self.name, "Supervisor: worker started");
                Ok(WorkerEvent::Running)
            }
            Err(reason) => self.record_death(reason, now),
        }
    }

    /// Check liveness and restart when due.
    ///
    /// Returns `Err(RestartBudgetExhausted)` when the worker dies with no
    /// restarts left.
    pub fn poll(&mut self, parent: &CancellationToken, now: Instant) -> Result<WorkerEvent> {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                self.handle = Some(handle);
                return Ok(WorkerEvent::Running);
            }
            let reason = match handle.join() {
                Ok(Ok(())) => "exited".to_string(),
                Ok(Err(e)) => format!("failed: {}", e),
                Err(_) => "panicked".to_string(),
            };
            return self.record_death(reason, now);
        }

        match self.next_attempt_at {
            Some(at) if now < at => Ok(WorkerEvent::CoolingDown),
            _ => {
                self.restarts += 1;
                self.next_attempt_at = None;
                warn!(
                    worker = %self.name,
                    "Supervisor: restarting worker (attempt {}/{})",
                    self.restarts,
                    self.max_restarts
                );
                match self.spawn(parent) {
                    Ok(()) => Ok(WorkerEvent::Restarted { attempt: self.restarts }),
                    Err(reason) => self.record_death(reason, now),
                }
            }
        }
    }

    fn spawn(&mut self, parent: &CancellationToken) -> std::result::Result<(), String> {
        let token = parent.child_token();
        match (self.factory)(token.clone()) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.token = Some(token);
                Ok(())
            }
            Err(e) => Err(format!("spawn failed: {}", e)),
        }
    }

    fn record_death(&mut self, reason: String, now: Instant) -> Result<WorkerEvent> {
        self.token = None;
        if self.restarts >= self.max_restarts {
            error!(
                worker = %self.name,
                "Supervisor: worker {} with no restarts left ({}/{})",
                reason,
                self.restarts,
                self.max_restarts
            );
            return Err(Error::RestartBudgetExhausted {
                worker: self.name.clone(),
                restarts: self.restarts,
            });
        }
        error!(
            worker = %self.name,
            "Supervisor: worker {}, restarting in {:.1}s",
            reason,
            self.cooldown.as_secs_f64()
        );
        self.next_attempt_at = Some(now + self.cooldown);
        Ok(WorkerEvent::Died { reason })
    }

    /// Cancel the worker and wait up to `timeout` for it to finish.
    ///
    /// Returns false when the thread had to be left behind.
    pub async fn stop(&mut self, timeout: Duration) -> bool {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(worker = %self.name, "Supervisor: worker did not stop within {:.1}s, detaching", timeout.as_secs_f64());
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        match handle.join() {
            Ok(Ok(())) => info!(worker = %self.name, "Supervisor: worker stopped"),
            Ok(Err(e)) => warn!(worker = %self.name, "Supervisor: worker stopped with error: {}", e),
            Err(_) => warn!(worker = %self.name, "Supervisor: worker panicked during shutdown"),
        }
        true
    }
}
