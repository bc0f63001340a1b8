use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::backend::{InputBackend, StreamGuard};
use super::processing::{FrameSink, StreamSpec};
use crate::error::{Error, Result};

/// Plays a recorded WAV file through the capture pipeline at real-time pace.
///
/// Exposes a single device. When the file ends the stream goes quiet, so the
/// capture watchdog sees it the same way it sees an unplugged microphone.
#[derive(Debug, Clone)]
pub struct WavReplayBackend {
    path: PathBuf,
    realtime: bool,
}

impl WavReplayBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            realtime: true,
        }
    }

    /// Skip real-time pacing. Blocks that do not fit in the frame queue are dropped.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct ReplayStream {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for ReplayStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_samples(path: &Path) -> Result<(Vec<f32>, u16, u32)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| Error::Audio(format!("cannot open {}: {}", path.display(), e)))?;
    let spec = reader.spec();
    let samples: std::result::Result<Vec<f32>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
    };
    let samples = samples.map_err(|e| Error::Audio(format!("cannot decode {}: {}", path.display(), e)))?;
    Ok((samples, spec.channels, spec.sample_rate))
}

impl InputBackend for WavReplayBackend {
    fn device_count(&self) -> Result<usize> {
        Ok(1)
    }

    fn device_name(&self, index: usize) -> Option<String> {
        (index == 0).then(|| format!("replay:{}", self.path.display()))
    }

    fn open(&self, device: usize, spec: &StreamSpec, sink: FrameSink) -> Result<StreamGuard> {
        if device != 0 {
            return Err(Error::DeviceNotFound {
                index: device,
                available: 1,
            });
        }
        let (samples, channels, rate) = read_samples(&self.path)?;
        info!(
            "Audio: replaying {} ({} samples, {}ch @ {}Hz)",
            self.path.display(),
            samples.len(),
            channels,
            rate
        );
        let mut sink = sink.with_input_format(channels, rate)?;

        // Feed native-rate chunks that cover one output block.
        let chunk_frames = ((spec.block_size as u64 * rate as u64) / spec.sample_rate as u64).max(1) as usize;
        let chunk_len = chunk_frames * channels.max(1) as usize;
        let pace = if self.realtime {
            Some(spec.block_duration())
        } else {
            None
        };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::Builder::new()
            .name("aiko-replay".into())
            .spawn(move || {
                let started = Instant::now();
                for (i, chunk) in samples.chunks(chunk_len).enumerate() {
                    if stop_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    sink.push_f32(chunk);
                    if let Some(block) = pace {
                        let due = block * (i as u32 + 1);
                        if let Some(wait) = due.checked_sub(started.elapsed()) {
                            thread::sleep(wait);
                        }
                    }
                }
                debug!("Audio: replay finished");
                // Stay open but silent until closed.
                while !stop_flag.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(20));
                }
            })
            .map_err(Error::Io)?;

        Ok(StreamGuard::new(ReplayStream {
            stop,
            handle: Some(handle),
        }))
    }
}
