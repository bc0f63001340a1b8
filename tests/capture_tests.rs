use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use aiko::audio::{AudioCaptureService, FrameSink, Heartbeat, InputBackend, StreamGuard, StreamSpec, WavReplayBackend};
use aiko::config::AudioConfig;
use aiko::error::{Error, Result};
use aiko::kernel::event::AudioFrame;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy)]
enum Mode {
    /// Opens fine, never delivers audio.
    Silent,
    /// Pushes a 10 ms block every 10 ms until closed.
    Streaming,
}

type OpenLog = Arc<Mutex<Vec<(usize, Instant)>>>;

struct FakeBackend {
    devices: Arc<AtomicUsize>,
    queries: Arc<AtomicUsize>,
    mode: Mode,
    opens: OpenLog,
}

struct Feeder {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Drop for Feeder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl InputBackend for FakeBackend {
    fn device_count(&self) -> Result<usize> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.load(Ordering::SeqCst))
    }

    fn open(&self, device: usize, _spec: &StreamSpec, mut sink: FrameSink) -> Result<StreamGuard> {
        self.opens.lock().unwrap().push((device, Instant::now()));
        match self.mode {
            Mode::Silent => Ok(StreamGuard::new(())),
            Mode::Streaming => {
                let stop = Arc::new(AtomicBool::new(false));
                let flag = stop.clone();
                let handle = thread::spawn(move || {
                    while !flag.load(Ordering::SeqCst) {
                        sink.push_i16(&[0; 160]);
                        thread::sleep(Duration::from_millis(10));
                    }
                });
                Ok(StreamGuard::new(Feeder {
                    stop,
                    handle: Some(handle),
                }))
            }
        }
    }
}

struct Harness {
    service: Arc<AudioCaptureService>,
    frames: mpsc::Receiver<AudioFrame>,
    statuses: Arc<Mutex<Vec<(bool, String)>>>,
    opens: OpenLog,
    /// Devices currently plugged in.
    devices: Arc<AtomicUsize>,
    queries: Arc<AtomicUsize>,
}

fn harness(devices: usize, mode: Mode, device_id: usize) -> Harness {
    let cfg = AudioConfig {
        device_id,
        sample_rate: 16_000,
        block_size: 160,
        queue_capacity: 256,
        watchdog_timeout_secs: 0.2,
        reconnect_cooldown_secs: 0.3,
        replay_path: None,
    };
    let opens = OpenLog::default();
    let devices = Arc::new(AtomicUsize::new(devices));
    let queries = Arc::new(AtomicUsize::new(0));
    let backend = FakeBackend {
        devices: devices.clone(),
        queries: queries.clone(),
        mode,
        opens: opens.clone(),
    };
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    let (tx, frames) = mpsc::channel(cfg.queue_capacity);
    let service = AudioCaptureService::new(Box::new(backend), tx, &cfg).with_status_callback(Box::new(
        move |status| sink.lock().unwrap().push((status.ok, status.message.clone())),
    ));
    Harness {
        service: Arc::new(service),
        frames,
        statuses,
        opens,
        devices,
        queries,
    }
}

fn spawn_listen(service: &Arc<AudioCaptureService>, cancel: &CancellationToken) -> thread::JoinHandle<Result<()>> {
    let service = service.clone();
    let cancel = cancel.clone();
    thread::spawn(move || service.listen(&cancel))
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let until = Instant::now() + deadline;
    while Instant::now() < until {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn test_streaming_delivers_frames() {
    let mut h = harness(2, Mode::Streaming, 1);
    let cancel = CancellationToken::new();
    let worker = spawn_listen(&h.service, &cancel);

    let mut received = Vec::new();
    assert!(wait_until(Duration::from_secs(2), || {
        while let Ok(frame) = h.frames.try_recv() {
            received.push(frame);
        }
        received.len() >= 3
    }));
    assert!(received.iter().all(|f| f.len() == 160));

    cancel.cancel();
    worker.join().unwrap().unwrap();
    let statuses = h.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].0);
    assert_eq!(h.service.is_ok(), Some(true));
}

#[test]
fn test_watchdog_reconnects_after_cooldown() {
    let h = harness(1, Mode::Silent, 0);
    let cancel = CancellationToken::new();
    let worker = spawn_listen(&h.service, &cancel);

    assert!(wait_until(Duration::from_secs(3), || h.opens.lock().unwrap().len() >= 2));
    cancel.cancel();
    worker.join().unwrap().unwrap();

    let opens = h.opens.lock().unwrap().clone();
    // Watchdog (0.2 s) plus cooldown (0.3 s) between attempts.
    let gap = opens[1].1.duration_since(opens[0].1);
    assert!(gap >= Duration::from_millis(450), "gap {:?}", gap);

    let statuses = h.statuses.lock().unwrap().clone();
    assert!(statuses.len() >= 2);
    assert!(statuses[0].0);
    assert!(!statuses[1].0);
    assert!(statuses[1].1.starts_with("hardware timeout"), "{}", statuses[1].1);
    // Reported on transitions only.
    assert!(statuses.windows(2).all(|pair| pair[0].0 != pair[1].0));
}

#[test]
fn test_missing_device_is_retried_until_plugged_in() {
    let h = harness(0, Mode::Streaming, 1);
    let cancel = CancellationToken::new();
    let worker = spawn_listen(&h.service, &cancel);

    // Unplugged: polled again after each cooldown, never opened.
    assert!(wait_until(Duration::from_secs(3), || h.queries.load(Ordering::SeqCst) >= 3));
    assert!(h.opens.lock().unwrap().is_empty());
    assert!(!worker.is_finished());
    {
        let statuses = h.statuses.lock().unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(!statuses[0].0);
        assert!(statuses[0].1.contains("not found"), "{}", statuses[0].1);
    }
    assert_eq!(h.service.is_ok(), Some(false));

    // Plugged back in: the next attempt opens it.
    h.devices.store(2, Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(3), || h.opens.lock().unwrap().len() == 1));
    assert_eq!(h.opens.lock().unwrap()[0].0, 1);

    cancel.cancel();
    worker.join().unwrap().unwrap();
    let statuses = h.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 2);
    assert!(statuses[1].0);
}

#[test]
fn test_restart_switches_device_without_failure() {
    let h = harness(3, Mode::Streaming, 0);
    let cancel = CancellationToken::new();
    let worker = spawn_listen(&h.service, &cancel);

    assert!(wait_until(Duration::from_secs(2), || h.opens.lock().unwrap().len() == 1));
    h.service.restart(Some(2));
    assert!(wait_until(Duration::from_secs(2), || h.opens.lock().unwrap().len() == 2));

    cancel.cancel();
    worker.join().unwrap().unwrap();

    let opens = h.opens.lock().unwrap().clone();
    assert_eq!(opens[0].0, 0);
    assert_eq!(opens[1].0, 2);
    assert_eq!(h.service.device_id(), 2);
    let statuses = h.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].0);
}

#[test]
fn test_cancel_before_start_returns_immediately() {
    let h = harness(1, Mode::Streaming, 0);
    let cancel = CancellationToken::new();
    cancel.cancel();
    h.service.listen(&cancel).unwrap();
    assert!(h.opens.lock().unwrap().is_empty());
    assert_eq!(h.service.is_ok(), None);
}

#[test]
fn test_sink_reblocks_and_drops_when_full() {
    let (tx, mut rx) = mpsc::channel(2);
    let heartbeat = Heartbeat::new();
    let spec = StreamSpec {
        sample_rate: 16_000,
        block_size: 100,
    };
    let mut sink = FrameSink::new(tx, heartbeat.clone(), spec);

    sink.push_i16(&[1; 150]);
    sink.push_i16(&[2; 150]);
    sink.push_i16(&[3; 100]);

    let first = rx.try_recv().unwrap();
    assert_eq!(first.len(), 100);
    assert!(first.samples.iter().all(|&s| s == 1));
    let second = rx.try_recv().unwrap();
    assert_eq!(&second.samples[..50], &[1; 50]);
    assert_eq!(&second.samples[50..], &[2; 50]);
    // Later blocks found the queue full.
    assert!(rx.try_recv().is_err());
    assert!(heartbeat.since_last() < Duration::from_secs(1));
}

#[test]
fn test_wav_replay_feeds_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("phrase.wav");
    let wav_spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, wav_spec).unwrap();
    for _ in 0..1_600 {
        writer.write_sample(8_000i16).unwrap();
    }
    writer.finalize().unwrap();

    let backend = WavReplayBackend::new(&path).unpaced();
    assert_eq!(backend.device_count().unwrap(), 1);
    assert!(backend.device_name(0).unwrap().starts_with("replay:"));

    let (tx, mut rx) = mpsc::channel(16);
    let spec = StreamSpec {
        sample_rate: 16_000,
        block_size: 400,
    };
    assert!(matches!(
        backend.open(1, &spec, FrameSink::new(tx.clone(), Heartbeat::new(), spec)),
        Err(Error::DeviceNotFound { index: 1, available: 1 })
    ));

    let guard = backend.open(0, &spec, FrameSink::new(tx, Heartbeat::new(), spec)).unwrap();
    let mut frames = Vec::new();
    assert!(wait_until(Duration::from_secs(2), || {
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames.len() == 4
    }));
    drop(guard);

    assert!(frames.iter().all(|f| f.len() == 400));
    assert!(frames[0].samples.iter().all(|&s| (7_990..=8_010).contains(&s)));
}
