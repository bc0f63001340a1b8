use rubato::{FftFixedIn, Resampler};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::kernel::event::AudioFrame;

/// Input frames per resampler chunk.
const RESAMPLE_CHUNK: usize = 1024;
/// Log a queue-overflow warning once per this many dropped blocks.
const DROP_LOG_EVERY: u64 = 50;

/// Target stream shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub block_size: usize,
}

impl StreamSpec {
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }
}

/// Time of the last delivered audio, shared between the driver callback and the watchdog.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    base: Instant,
    last_ms: Arc<AtomicU64>,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            last_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn beat(&self) {
        let ms = self.base.elapsed().as_millis() as u64;
        self.last_ms.store(ms, Ordering::Relaxed);
    }

    pub fn since_last(&self) -> Duration {
        let now = self.base.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_ms.load(Ordering::Relaxed)))
    }
}

/// Downmix to mono and resample to the target rate.
struct Converter {
    channels: usize,
    resampler: Option<FftFixedIn<f32>>,
    input: Vec<f32>,
}

impl Converter {
    fn new(channels: u16, input_rate: u32, target_rate: u32) -> Result<Self> {
        let resampler = if input_rate != target_rate {
            let r = FftFixedIn::<f32>::new(input_rate as usize, target_rate as usize, RESAMPLE_CHUNK, 2, 1)
                .map_err(|e| Error::Audio(format!("resampler setup failed: {}", e)))?;
            Some(r)
        } else {
            None
        };
        Ok(Self {
            channels: channels.max(1) as usize,
            resampler,
            input: Vec::new(),
        })
    }

    /// Feed interleaved samples; returns mono samples at the target rate.
    fn convert(&mut self, interleaved: &[f32]) -> Vec<i16> {
        self.input.extend(
            interleaved
                .chunks(self.channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );

        let Some(resampler) = self.resampler.as_mut() else {
            return self.input.drain(..).map(to_i16).collect();
        };

        let mut out = Vec::new();
        while self.input.len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<f32> = self.input.drain(..needed).collect();
            match resampler.process(&[chunk], None) {
                Ok(channels) => {
                    if let Some(mono) = channels.first() {
                        out.extend(mono.iter().copied().map(to_i16));
                    }
                }
                Err(e) => {
                    warn!("Audio: resampling failed, chunk dropped: {}", e);
                }
            }
        }
        out
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Receives driver buffers, re-blocks them and pushes owned frames onto the queue.
///
/// Driver buffers are reused by the host, so every block is copied before it is
/// queued. The queue is bounded; when the main loop falls behind, new blocks are
/// dropped rather than blocking the driver thread.
pub struct FrameSink {
    tx: mpsc::Sender<AudioFrame>,
    heartbeat: Heartbeat,
    spec: StreamSpec,
    pending: Vec<i16>,
    converter: Option<Converter>,
    dropped: u64,
}

impl FrameSink {
    pub fn new(tx: mpsc::Sender<AudioFrame>, heartbeat: Heartbeat, spec: StreamSpec) -> Self {
        Self {
            tx,
            heartbeat,
            pending: Vec::with_capacity(spec.block_size * 2),
            spec,
            converter: None,
            dropped: 0,
        }
    }

    /// Declare the native shape of the incoming data; adds downmix/resample as needed.
    pub fn with_input_format(mut self, channels: u16, sample_rate: u32) -> Result<Self> {
        if channels != 1 || sample_rate != self.spec.sample_rate {
            info!(
                "Audio: converting {}ch @ {}Hz -> mono @ {}Hz",
                channels, sample_rate, self.spec.sample_rate
            );
            self.converter = Some(Converter::new(channels, sample_rate, self.spec.sample_rate)?);
        }
        Ok(self)
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    pub fn push_i16(&mut self, data: &[i16]) {
        self.heartbeat.beat();
        match self.converter.as_mut() {
            Some(converter) => {
                let floats: Vec<f32> = data.iter().copied().map(to_f32).collect();
                let mono = converter.convert(&floats);
                self.pending.extend_from_slice(&mono);
            }
            None => self.pending.extend_from_slice(data),
        }
        self.flush_blocks();
    }

    pub fn push_f32(&mut self, data: &[f32]) {
        self.heartbeat.beat();
        match self.converter.as_mut() {
            Some(converter) => {
                let mono = converter.convert(data);
                self.pending.extend_from_slice(&mono);
            }
            None => self.pending.extend(data.iter().copied().map(to_i16)),
        }
        self.flush_blocks();
    }

    fn flush_blocks(&mut self) {
        while self.pending.len() >= self.spec.block_size {
            let block: Vec<i16> = self.pending.drain(..self.spec.block_size).collect();
            match self.tx.try_send(AudioFrame::new(block)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    if self.dropped % DROP_LOG_EVERY == 1 {
                        warn!("Audio: frame queue full, {} blocks dropped so far", self.dropped);
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Audio: frame queue closed, discarding block");
                }
            }
        }
    }
}
