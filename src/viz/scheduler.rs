//! Frame scheduling
//!
//! One scheduler owns one recurring frame task. Start/stop are explicit and
//! cancellation is token-based; nothing reschedules itself from inside a
//! frame. Tests drive the render loop by calling `frame()` directly with a
//! fake clock instead of starting the task.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::RenderLoop;

/// Target frame interval (~60 fps).
const FRAME_INTERVAL_MS: u64 = 16;

pub struct FrameScheduler {
    task: Option<tokio::task::JoinHandle<()>>,
    cancel: CancellationToken,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            task: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Start driving frames. A second start while running is a no-op.
    pub fn start(&mut self, renderer: Arc<Mutex<RenderLoop>>) {
        if self.is_running() {
            return;
        }
        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();

        self.task = Some(tokio::spawn(async move {
            let epoch = Instant::now();
            let mut tick = tokio::time::interval(Duration::from_millis(FRAME_INTERVAL_MS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            log::debug!("Frame scheduler started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let now_ms = epoch.elapsed().as_secs_f64() * 1000.0;
                        if let Ok(mut rl) = renderer.lock() {
                            rl.frame(now_ms);
                        }
                    }
                }
            }
            log::debug!("Frame scheduler stopped");
        }));
    }

    /// Cancel the frame task. Safe to call when not running.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        AudioError, AudioSampler, CaptureBackend, CaptureHandle, CaptureRequest, ErrorSink,
        SampleSink,
    };
    use crate::settings::VisualizerSettings;

    struct NullBackend;
    struct NullHandle;

    impl CaptureHandle for NullHandle {
        fn close(&mut self) {}
        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    impl CaptureBackend for NullBackend {
        fn open(
            &self,
            _request: &CaptureRequest,
            _sink: SampleSink,
            _on_error: ErrorSink,
        ) -> Result<Box<dyn CaptureHandle>, AudioError> {
            Ok(Box::new(NullHandle))
        }
    }

    fn renderer() -> Arc<Mutex<RenderLoop>> {
        let sampler = AudioSampler::new(Arc::new(NullBackend), 256, 0.0);
        Arc::new(Mutex::new(RenderLoop::new(
            sampler,
            VisualizerSettings::default(),
            200,
            64,
        )))
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let mut scheduler = FrameScheduler::new();
        assert!(!scheduler.is_running());

        scheduler.start(renderer());
        assert!(scheduler.is_running());

        scheduler.stop();
        tokio::task::yield_now().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_double_start_is_a_noop() {
        let mut scheduler = FrameScheduler::new();
        let rl = renderer();
        scheduler.start(rl.clone());
        scheduler.start(rl);
        assert!(scheduler.is_running());
        scheduler.stop();
        tokio::task::yield_now().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_scheduler_drives_frames() {
        let mut scheduler = FrameScheduler::new();
        let rl = renderer();
        rl.lock()
            .unwrap()
            .activate(&CaptureRequest::default(), Arc::new(|_| {}))
            .expect("activate");

        scheduler.start(rl.clone());
        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.stop();

        assert!(rl.lock().unwrap().fade_opacity() > 0.0);
    }
}
