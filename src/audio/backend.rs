use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::any::Any;
use tracing::{error, info};

use super::processing::{FrameSink, StreamSpec};
use crate::error::{Error, Result};

/// Keeps an open input stream alive. Dropping it closes the stream.
pub struct StreamGuard {
    _inner: Box<dyn Any>,
}

impl StreamGuard {
    pub fn new<T: 'static>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

/// Source of raw audio. Implemented by the sound card driver and by test fakes.
pub trait InputBackend: Send + Sync {
    /// Number of input devices currently visible.
    fn device_count(&self) -> Result<usize>;

    fn device_name(&self, _index: usize) -> Option<String> {
        None
    }

    /// Start delivering audio from `device` into `sink` until the guard is dropped.
    fn open(&self, device: usize, spec: &StreamSpec, sink: FrameSink) -> Result<StreamGuard>;
}

/// Sound card input through the default cpal host.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    fn device(&self, index: usize) -> Result<cpal::Device> {
        let host = cpal::default_host();
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| Error::Audio(format!("cannot enumerate input devices: {}", e)))?
            .collect();
        let available = devices.len();
        devices
            .into_iter()
            .nth(index)
            .ok_or(Error::DeviceNotFound { index, available })
    }
}

fn stream_error(err: cpal::StreamError) {
    error!("Audio: stream error: {}", err);
}

impl InputBackend for CpalBackend {
    fn device_count(&self) -> Result<usize> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| Error::Audio(format!("cannot enumerate input devices: {}", e)))?;
        Ok(devices.count())
    }

    fn device_name(&self, index: usize) -> Option<String> {
        self.device(index).ok().and_then(|d| d.name().ok())
    }

    fn open(&self, index: usize, spec: &StreamSpec, sink: FrameSink) -> Result<StreamGuard> {
        let device = self.device(index)?;
        info!("Audio: input device #{} '{}'", index, device.name().unwrap_or_default());

        // Prefer a native config at the target rate so no resampling is needed.
        let mut selected = None;
        let ranges = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(format!("cannot query device configs: {}", e)))?;
        for range in ranges {
            let usable_format = matches!(
                range.sample_format(),
                cpal::SampleFormat::I16 | cpal::SampleFormat::F32
            );
            if usable_format
                && range.min_sample_rate().0 <= spec.sample_rate
                && range.max_sample_rate().0 >= spec.sample_rate
            {
                let mono_first = range.channels() == 1;
                selected = Some(range.with_sample_rate(cpal::SampleRate(spec.sample_rate)));
                if mono_first {
                    break;
                }
            }
        }

        let supported = match selected {
            Some(c) => c,
            None => device
                .default_input_config()
                .map_err(|e| Error::Audio(format!("no default input config: {}", e)))?,
        };
        let channels = supported.channels();
        let rate = supported.sample_rate().0;
        let format = supported.sample_format();
        info!("Audio: config selected rate={}Hz channels={} format={:?}", rate, channels, format);

        let mut sink = sink.with_input_format(channels, rate)?;
        let config: cpal::StreamConfig = supported.into();

        let stream = match format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| sink.push_f32(data),
                stream_error,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| sink.push_i16(data),
                stream_error,
                None,
            ),
            cpal::SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let signed: Vec<i16> = data.iter().map(|&s| (s as i32 - 32768) as i16).collect();
                    sink.push_i16(&signed)
                },
                stream_error,
                None,
            ),
            other => return Err(Error::Audio(format!("unsupported sample format {:?}", other))),
        }
        .map_err(|e| Error::Audio(format!("cannot build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::Audio(format!("cannot start input stream: {}", e)))?;
        Ok(StreamGuard::new(stream))
    }
}
