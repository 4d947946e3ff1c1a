//! Microphone sampler
//!
//! `AudioSampler` acquires a live input stream through a `CaptureBackend`,
//! feeds captured PCM into a `SpectrumAnalyzer`, and exposes point-in-time
//! byte-range magnitude snapshots to the render loop.
//!
//! Resource rules:
//! - the sampler is the sole owner of the capture handle
//! - `close()` is idempotent and releases every underlying resource
//! - a failure partway through `open()` tears down whatever was created
//!   before the failing step; the sampler stays closed

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tokio::sync::mpsc;

use super::{AudioError, SpectrumAnalyzer};

/// Callback receiving mono f32 samples from the capture thread.
pub type SampleSink = Arc<dyn Fn(&[f32]) + Send + Sync>;

/// Callback invoked when the stream dies mid-session (device unplugged,
/// backend failure). Fired at most once per open capture.
pub type ErrorSink = Arc<dyn Fn(AudioError) + Send + Sync>;

/// Processing constraints applied to the capture request. Always on for
/// voice memos.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// A request to open an input device.
#[derive(Debug, Clone, Default)]
pub struct CaptureRequest {
    /// Device name to match. `None` selects the system default input.
    pub device: Option<String>,
    pub constraints: CaptureConstraints,
}

/// Handle to an open capture. Dropping or closing stops the stream.
pub trait CaptureHandle: Send {
    /// Stop the capture. Must be safe to call more than once.
    fn close(&mut self);
    /// Sample rate of the delivered samples.
    fn sample_rate(&self) -> u32;
}

/// Backend that can open live audio input. CPAL in production, a counting
/// fake in tests.
pub trait CaptureBackend: Send + Sync {
    fn open(
        &self,
        request: &CaptureRequest,
        sink: SampleSink,
        on_error: ErrorSink,
    ) -> Result<Box<dyn CaptureHandle>, AudioError>;
}

// ---------------------------------------------------------------------------
// CPAL backend
// ---------------------------------------------------------------------------

/// CPAL-based capture backend. The stream lives on a dedicated audio thread
/// because `cpal::Stream` is not `Send`; the handle talks to it over a
/// channel.
pub struct CpalBackend;

enum OpenOutcome {
    Ready { sample_rate: u32 },
    Failed(AudioError),
}

struct CpalHandle {
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    sample_rate: u32,
}

impl CaptureHandle for CpalHandle {
    fn close(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // Receiver may already be gone if the stream died on its own.
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl CaptureBackend for CpalBackend {
    fn open(
        &self,
        request: &CaptureRequest,
        sink: SampleSink,
        on_error: ErrorSink,
    ) -> Result<Box<dyn CaptureHandle>, AudioError> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<OpenOutcome>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let device_name = request.device.clone();
        let constraints = request.constraints;

        let thread = std::thread::Builder::new()
            .name("memoscribe-capture".to_string())
            .spawn(move || {
                run_capture_thread(device_name, constraints, sink, on_error, ready_tx, stop_rx)
            })
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(OpenOutcome::Ready { sample_rate }) => Ok(Box::new(CpalHandle {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
                sample_rate,
            })),
            Ok(OpenOutcome::Failed(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::StreamCreationFailed(
                    "Capture thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }
}

/// Body of the dedicated audio thread: owns the CPAL stream for its whole
/// lifetime and blocks until asked to stop.
fn run_capture_thread(
    device_name: Option<String>,
    constraints: CaptureConstraints,
    sink: SampleSink,
    on_error: ErrorSink,
    ready_tx: std::sync::mpsc::Sender<OpenOutcome>,
    stop_rx: std::sync::mpsc::Receiver<()>,
) {
    let host = cpal::default_host();

    let device = match find_device(&host, device_name.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            let _ = ready_tx.send(OpenOutcome::Failed(e));
            return;
        }
    };

    log::info!(
        "Using audio input device: {:?} (echo_cancellation={}, noise_suppression={}, auto_gain={})",
        device.name(),
        constraints.echo_cancellation,
        constraints.noise_suppression,
        constraints.auto_gain_control
    );

    let supported_config = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(OpenOutcome::Failed(AudioError::DeviceUnavailable(
                e.to_string(),
            )));
            return;
        }
    };

    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;

    let err_sink = on_error.clone();
    let err_fn = move |err: cpal::StreamError| {
        log::error!("Audio stream error: {}", err);
        err_sink(AudioError::DeviceUnavailable(err.to_string()));
    };

    let stream = match build_stream(&device, &config, sample_format, channels, sink, err_fn) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(OpenOutcome::Failed(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(OpenOutcome::Failed(AudioError::StreamCreationFailed(
            e.to_string(),
        )));
        return;
    }

    let _ = ready_tx.send(OpenOutcome::Ready { sample_rate });

    // Keep the stream alive until close() or sender drop.
    let _ = stop_rx.recv();
    drop(stream);
    log::debug!("Capture thread exiting");
}

fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, AudioError> {
    match name {
        Some(wanted) => {
            let mut devices = host
                .input_devices()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceUnavailable(wanted.to_string()))
        }
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default input".to_string())),
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    channels: usize,
    sink: SampleSink,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError> {
    match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, channels, sink, err_fn),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, channels, sink, err_fn),
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, channels, sink, err_fn),
        other => Err(AudioError::StreamCreationFailed(format!(
            "Unsupported sample format {:?}",
            other
        ))),
    }
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    sink: SampleSink,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = downmix_to_mono(data, channels);
                sink(&mono);
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::DeviceUnavailable("device not available".to_string())
            }
            other => AudioError::StreamCreationFailed(other.to_string()),
        })?;
    Ok(stream)
}

/// Average interleaved channels down to mono f32.
fn downmix_to_mono<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: cpal::Sample,
    f32: cpal::FromSample<T>,
{
    use cpal::Sample;

    if channels <= 1 {
        return data.iter().map(|&s| f32::from_sample(s)).collect();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
            sum / channels as f32
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Owns the capture handle and the analysis node for one visualizer.
pub struct AudioSampler {
    backend: Arc<dyn CaptureBackend>,
    analyzer: Arc<Mutex<SpectrumAnalyzer>>,
    handle: Option<Box<dyn CaptureHandle>>,
    /// Optional fan-out of captured PCM16 to the transcription transport.
    tap: Option<mpsc::Sender<Vec<i16>>>,
    fft_size: usize,
}

impl AudioSampler {
    pub fn new(backend: Arc<dyn CaptureBackend>, fft_size: usize, smoothing: f32) -> Self {
        Self {
            backend,
            analyzer: Arc::new(Mutex::new(SpectrumAnalyzer::new(fft_size, smoothing))),
            handle: None,
            tap: None,
            fft_size,
        }
    }

    /// Install a PCM16 tap that receives every captured chunk while open.
    /// Must be called before `open`.
    pub fn set_tap(&mut self, tap: Option<mpsc::Sender<Vec<i16>>>) {
        self.tap = tap;
    }

    /// Acquire the input device and start feeding the analyzer.
    ///
    /// On failure the sampler holds no live resources and may be reopened.
    pub fn open(
        &mut self,
        request: &CaptureRequest,
        on_error: ErrorSink,
    ) -> Result<(), AudioError> {
        if self.handle.is_some() {
            return Ok(());
        }

        // Fresh analyzer state for every capture: stale smoothing from the
        // previous session must not bleed into the new one.
        {
            let mut analyzer = self.analyzer.lock().unwrap();
            analyzer.reset();
        }

        let analyzer = self.analyzer.clone();
        let tap = self.tap.clone();
        let sink: SampleSink = Arc::new(move |samples: &[f32]| {
            if let Ok(mut a) = analyzer.lock() {
                a.push_samples(samples);
            }
            if let Some(tx) = &tap {
                let pcm: Vec<i16> = samples
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                // Drop chunks rather than block the audio thread.
                let _ = tx.try_send(pcm);
            }
        });

        let handle = self.backend.open(request, sink, on_error)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// True once `open` has completed and the capture is live.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Sample rate of the open capture, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.sample_rate())
    }

    /// Point-in-time frequency-magnitude snapshot (0-255 per bin).
    ///
    /// Returns zeros while closed; callers gate real consumption on their
    /// own warmup logic.
    pub fn sample(&self) -> Vec<u8> {
        if self.handle.is_none() {
            return vec![0; self.fft_size / 2];
        }
        match self.analyzer.lock() {
            Ok(mut analyzer) => analyzer.byte_frequency_data(),
            Err(_) => vec![0; self.fft_size / 2],
        }
    }

    /// Stop capture and release the device. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
            log::debug!("Audio sampler closed");
        }
        if let Ok(mut analyzer) = self.analyzer.lock() {
            analyzer.reset();
        }
    }
}

impl Drop for AudioSampler {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that records open/close counts and can be told to fail.
    struct FakeBackend {
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    struct FakeHandle {
        closes: Arc<AtomicUsize>,
        closed: bool,
    }

    impl CaptureHandle for FakeHandle {
        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    impl CaptureBackend for FakeBackend {
        fn open(
            &self,
            _request: &CaptureRequest,
            _sink: SampleSink,
            _on_error: ErrorSink,
        ) -> Result<Box<dyn CaptureHandle>, AudioError> {
            if self.fail {
                return Err(AudioError::PermissionDenied);
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeHandle {
                closes: self.closes.clone(),
                closed: false,
            }))
        }
    }

    fn fake_backend(fail: bool) -> (Arc<FakeBackend>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(FakeBackend {
            opens: opens.clone(),
            closes: closes.clone(),
            fail,
        });
        (backend, opens, closes)
    }

    fn noop_error_sink() -> ErrorSink {
        Arc::new(|_| {})
    }

    #[test]
    fn test_open_close_releases_everything() {
        let (backend, opens, closes) = fake_backend(false);
        let mut sampler = AudioSampler::new(backend, 256, 0.8);

        sampler
            .open(&CaptureRequest::default(), noop_error_sink())
            .expect("open");
        assert!(sampler.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        sampler.close();
        assert!(!sampler.is_open());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // Idempotent: a second close releases nothing twice.
        sampler.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_repeated_cycles_never_leak() {
        let (backend, opens, closes) = fake_backend(false);
        let mut sampler = AudioSampler::new(backend, 256, 0.8);

        for _ in 0..5 {
            sampler
                .open(&CaptureRequest::default(), noop_error_sink())
                .expect("open");
            sampler.close();
        }
        assert_eq!(opens.load(Ordering::SeqCst), 5);
        assert_eq!(closes.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_failed_open_leaves_sampler_closed() {
        let (backend, opens, _closes) = fake_backend(true);
        let mut sampler = AudioSampler::new(backend, 256, 0.8);

        let err = sampler
            .open(&CaptureRequest::default(), noop_error_sink())
            .unwrap_err();
        assert!(matches!(err, AudioError::PermissionDenied));
        assert!(!sampler.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sample_returns_zeros_while_closed() {
        let (backend, _, _) = fake_backend(false);
        let sampler = AudioSampler::new(backend, 256, 0.8);
        let bins = sampler.sample();
        assert_eq!(bins.len(), 128);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_drop_closes_handle() {
        let (backend, _, closes) = fake_backend(false);
        {
            let mut sampler = AudioSampler::new(backend, 256, 0.8);
            sampler
                .open(&CaptureRequest::default(), noop_error_sink())
                .expect("open");
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sink_feeds_analyzer() {
        // Backend that hands the installed sink back to the test.
        struct SinkGrabber {
            grabbed: Arc<Mutex<Option<SampleSink>>>,
        }
        impl CaptureBackend for SinkGrabber {
            fn open(
                &self,
                _request: &CaptureRequest,
                sink: SampleSink,
                _on_error: ErrorSink,
            ) -> Result<Box<dyn CaptureHandle>, AudioError> {
                *self.grabbed.lock().unwrap() = Some(sink);
                Ok(Box::new(FakeHandle {
                    closes: Arc::new(AtomicUsize::new(0)),
                    closed: false,
                }))
            }
        }

        let grabbed = Arc::new(Mutex::new(None));
        let mut sampler = AudioSampler::new(
            Arc::new(SinkGrabber {
                grabbed: grabbed.clone(),
            }),
            128,
            0.0,
        );
        sampler
            .open(&CaptureRequest::default(), noop_error_sink())
            .expect("open");

        let sink = grabbed.lock().unwrap().clone().expect("sink installed");
        let tone: Vec<f32> = (0..128)
            .map(|i| (2.0 * std::f32::consts::PI * 4.0 * i as f32 / 128.0).sin() * 0.05)
            .collect();
        sink(&tone);

        let bins = sampler.sample();
        assert!(bins[4] > 0);
    }
}
