use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backend::InputBackend;
use super::processing::{FrameSink, Heartbeat, StreamSpec};
use crate::config::AudioConfig;
use crate::error::{Error, Result};
use crate::kernel::event::{AudioFrame, CaptureStatus};

/// Longest single sleep while waiting; bounds how late a stop or restart is noticed.
const MAX_POLL: Duration = Duration::from_millis(400);
const MIN_POLL: Duration = Duration::from_millis(10);
const COOLDOWN_SLICE: Duration = Duration::from_millis(100);

pub type StatusCallback = Box<dyn Fn(&CaptureStatus) + Send + Sync>;

/// Keeps a microphone stream open, watches it for silence and reconnects.
///
/// `listen` blocks the calling thread until cancelled. It is meant to run on a
/// dedicated worker thread; `restart` may be called from any thread.
pub struct AudioCaptureService {
    backend: Box<dyn InputBackend>,
    frames: mpsc::Sender<AudioFrame>,
    spec: StreamSpec,
    device_id: AtomicUsize,
    restart_requested: AtomicBool,
    watchdog_timeout: Duration,
    reconnect_cooldown: Duration,
    last_status: Mutex<Option<bool>>,
    on_status_change: Option<StatusCallback>,
}

impl AudioCaptureService {
    pub fn new(backend: Box<dyn InputBackend>, frames: mpsc::Sender<AudioFrame>, cfg: &AudioConfig) -> Self {
        Self {
            backend,
            frames,
            spec: StreamSpec {
                sample_rate: cfg.sample_rate,
                block_size: cfg.block_size,
            },
            device_id: AtomicUsize::new(cfg.device_id),
            restart_requested: AtomicBool::new(false),
            watchdog_timeout: cfg.watchdog_timeout(),
            reconnect_cooldown: cfg.reconnect_cooldown(),
            last_status: Mutex::new(None),
            on_status_change: None,
        }
    }

    /// Called on every ok/failed transition, never twice in a row with the same `ok`.
    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.on_status_change = Some(callback);
        self
    }

    pub fn device_id(&self) -> usize {
        self.device_id.load(Ordering::SeqCst)
    }

    /// Last reported health; `None` before the first open attempt.
    pub fn is_ok(&self) -> Option<bool> {
        self.last_status.lock().ok().and_then(|s| *s)
    }

    /// Ask the running loop to close its stream and reopen, optionally on another device.
    pub fn restart(&self, new_device: Option<usize>) {
        if let Some(device) = new_device {
            info!("Audio: switching to device #{}", device);
            self.device_id.store(device, Ordering::SeqCst);
        }
        self.restart_requested.store(true, Ordering::SeqCst);
    }

    /// Capture loop. Returns `Ok` when cancelled.
    ///
    /// A device index that is not currently listed is never opened. Like an
    /// open error or a stalled stream, it is reported through the status
    /// callback and retried after the cooldown, so a replugged microphone is
    /// picked up again.
    pub fn listen(&self, cancel: &CancellationToken) -> Result<()> {
        info!(
            "Audio: capture starting (device #{}, {} Hz, block {})",
            self.device_id(),
            self.spec.sample_rate,
            self.spec.block_size
        );

        while !cancel.is_cancelled() {
            self.restart_requested.store(false, Ordering::SeqCst);
            let device = self.device_id();

            // 1. Validate the device before touching the driver
            match self.backend.device_count() {
                Ok(available) if device >= available => {
                    let err = Error::DeviceNotFound { index: device, available };
                    error!("Audio: {}", err);
                    self.report(false, &err.to_string());
                    self.cool_down(cancel);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    self.report(false, &format!("device query failed: {}", e));
                    self.cool_down(cancel);
                    continue;
                }
            }

            // 2. Open and watch
            let heartbeat = Heartbeat::new();
            heartbeat.beat();
            let sink = FrameSink::new(self.frames.clone(), heartbeat.clone(), self.spec);
            match self.backend.open(device, &self.spec, sink) {
                Ok(stream) => {
                    let name = self.backend.device_name(device).unwrap_or_else(|| format!("#{}", device));
                    self.report(true, &format!("microphone {} ready", name));
                    let failure = self.watch(&heartbeat, cancel);
                    drop(stream);
                    match failure {
                        None => {
                            debug!("Audio: stream closed (stop or restart)");
                            continue;
                        }
                        Some(reason) => {
                            warn!("Audio: {}", reason);
                            self.report(false, &reason);
                        }
                    }
                }
                Err(e) => {
                    error!("Audio: failed to open device #{}: {}", device, e);
                    self.report(false, &format!("microphone error: {}", e));
                }
            }

            // 3. Back off before the next attempt
            self.cool_down(cancel);
        }

        info!("Audio: capture stopped");
        Ok(())
    }

    /// Block while the stream is healthy. `None` means stop or restart was requested.
    fn watch(&self, heartbeat: &Heartbeat, cancel: &CancellationToken) -> Option<String> {
        let poll = (self.watchdog_timeout / 4).clamp(MIN_POLL, MAX_POLL);
        loop {
            if cancel.is_cancelled() || self.restart_requested.load(Ordering::SeqCst) {
                return None;
            }
            let silent_for = heartbeat.since_last();
            if silent_for > self.watchdog_timeout {
                return Some(format!(
                    "hardware timeout: no audio for {:.1}s",
                    silent_for.as_secs_f64()
                ));
            }
            thread::sleep(poll);
        }
    }

    /// Sleep out the reconnect cooldown in short slices.
    fn cool_down(&self, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        info!("Audio: reconnecting in {:.1}s", self.reconnect_cooldown.as_secs_f64());
        let until = Instant::now() + self.reconnect_cooldown;
        while Instant::now() < until {
            if cancel.is_cancelled() || self.restart_requested.load(Ordering::SeqCst) {
                return;
            }
            let left = until.saturating_duration_since(Instant::now());
            thread::sleep(left.min(COOLDOWN_SLICE));
        }
    }

    fn report(&self, ok: bool, message: &str) {
        let changed = match self.last_status.lock() {
            Ok(mut last) => {
                let changed = *last != Some(ok);
                *last = Some(ok);
                changed
            }
            Err(_) => true,
        };
        if !changed {
            debug!("Audio: status unchanged ({}): {}", if ok { "ok" } else { "failed" }, message);
            return;
        }
        if ok {
            info!("Audio: UP {}", message);
        } else {
            warn!("Audio: DOWN {}", message);
        }
        if let Some(callback) = &self.on_status_change {
            callback(&CaptureStatus {
                ok,
                message: message.to_string(),
            });
        }
    }
}
