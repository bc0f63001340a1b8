use chrono::{Local, NaiveDateTime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::store::TaskStore;
use crate::capability::{isolate, CapabilityRegistry, Context, NotifyLevel, Notifier};
use crate::error::Result;
use crate::kernel::event::{AssistantState, InputSource};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// What one `tick` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    /// `on_schedule` returned `Ok`.
    pub delivered: usize,
    /// No capability owns the task type.
    pub unclaimed: usize,
    /// `on_schedule` failed or panicked.
    pub failed: usize,
    /// Could not be marked done; stays pending for the next tick.
    pub left_pending: usize,
}

/// Fires due tasks from the store at the owning capability.
///
/// Delivery is at-least-once: a task is marked done only after its hook has
/// run, so a storage failure in between re-delivers it on the next tick.
pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    registry: Arc<CapabilityRegistry>,
    notifier: Arc<dyn Notifier>,
    state: watch::Receiver<AssistantState>,
    interval: Duration,
    active: AtomicBool,
}

impl TaskScheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<CapabilityRegistry>,
        notifier: Arc<dyn Notifier>,
        state: watch::Receiver<AssistantState>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
            state,
            interval,
            active: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            info!("Scheduler: started (interval {:.1}s)", self.interval.as_secs_f64());
        }
    }

    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Scheduler: stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Tick on the interval until `stop` or cancellation.
    pub fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.start();
        while self.is_active() && !cancel.is_cancelled() {
            self.tick();
            let until = Instant::now() + self.interval;
            while Instant::now() < until {
                if !self.is_active() || cancel.is_cancelled() {
                    break;
                }
                thread::sleep(until.saturating_duration_since(Instant::now()).min(SLEEP_SLICE));
            }
        }
        self.stop();
        Ok(())
    }

    pub fn tick(&self) -> TickReport {
        self.tick_at(Local::now().naive_local())
    }

    pub fn tick_at(&self, now: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();

        let tasks = match self.store.due_tasks(now) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Scheduler: failed to read due tasks: {}", e);
                return report;
            }
        };
        report.due = tasks.len();
        if tasks.is_empty() {
            return report;
        }
        debug!("Scheduler: {} task(s) due", tasks.len());

        let state = *self.state.borrow();
        let ctx = Context::new(state, InputSource::Scheduler, self.notifier.as_ref(), &self.registry);

        for task in tasks {
            match self.registry.by_task_type(&task.task_type) {
                Some((_, capability)) => {
                    let name = capability.name();
                    match isolate(|| capability.on_schedule(&task.payload, &ctx)) {
                        Ok(()) => {
                            info!(task_id = task.id, capability = name, "Scheduler: task delivered");
                            report.delivered += 1;
                        }
                        Err(e) => {
                            error!(task_id = task.id, capability = name, "Scheduler: on_schedule failed: {}", e);
                            report.failed += 1;
                        }
                    }
                }
                None => {
                    warn!(task_id = task.id, task_type = %task.task_type, "Scheduler: no capability owns this task type");
                    ctx.broadcast(
                        format!("Scheduled task #{} of type '{}' has no handler", task.id, task.task_type),
                        NotifyLevel::Warning,
                    );
                    report.unclaimed += 1;
                }
            }

            if let Err(e) = self.store.mark_done(task.id) {
                error!(task_id = task.id, "Scheduler: could not mark task done, it stays pending: {}", e);
                report.left_pending += 1;
            }
        }

        report
    }
}
