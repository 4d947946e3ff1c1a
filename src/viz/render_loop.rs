//! Per-frame waveform rendering
//!
//! One `RenderLoop` drives the whole visual lifecycle:
//!
//! `Idle -> Starting (fade-in + warmup) -> Live -> Stopping (fade-out) -> Idle`
//!
//! plus a `Processing` phase that animates a synthetic wave while a service
//! round-trip is in flight and no real audio is flowing. Every frame is
//! synchronous; the loop never awaits. A device loss mid-session drains
//! through `Stopping` exactly like an explicit stop.

use crate::audio::{AudioError, AudioSampler, CaptureRequest, ErrorSink};
use crate::settings::{VisualizerSettings, WaveformMode};

use super::history::{
    mirrored_targets, reduce_to_scalar, ScrollingHistory, StaticBars, AMPLITUDE_FLOOR,
};
use super::surface::{edge_fade_mask, Surface};

/// Analyser snapshots discarded right after connect; the first few are
/// typically jittery.
const WARMUP_FRAMES: u32 = 10;

/// Opacity gained per baseline frame while fading in.
const FADE_IN_RATE: f32 = 0.08;

/// Opacity lost per baseline frame while fading out.
const FADE_OUT_RATE: f32 = 0.1;

/// Per-frame shrink factor applied to leftover bar data while stopping.
const STOP_DATA_FADE_RATE: f32 = 0.03;

/// Synthetic wave time advance per frame.
const SYNTHETIC_TIME_STEP: f32 = 0.03;

/// Real-to-synthetic cross-fade advance per frame.
const TRANSITION_STEP: f32 = 0.02;

/// Bars above this value get a glow pass.
const GLOW_THRESHOLD: f32 = 0.3;

/// Delta-time normalization baseline (60 fps).
const BASELINE_FRAME_MS: f64 = 1000.0 / 60.0;

fn ease_out_cubic(t: f32) -> f32 {
    1.0 - (1.0 - t).powi(3)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Dormant. Still scheduled, but frames skip all work.
    Idle,
    /// Fade-in and warmup; real samples are not consumed yet.
    Starting,
    /// Steady sampling and painting.
    Live,
    /// Fade-out; buffers are cleared when opacity reaches zero.
    Stopping,
    /// Synthetic placeholder wave while a service round-trip is pending.
    Processing,
}

pub struct RenderLoop {
    settings: VisualizerSettings,
    sampler: AudioSampler,

    phase: RenderPhase,
    fade_opacity: f32,
    warmup_frames: u32,
    is_initialized: bool,

    last_frame_ms: Option<f64>,
    last_sample_ms: f64,

    history: ScrollingHistory,
    bars: StaticBars,
    synthetic: Vec<f32>,
    /// Last real captured frame, kept for the synthetic cross-fade.
    last_active_data: Vec<f32>,
    transition_progress: f32,
    synthetic_time: f32,

    needs_redraw: bool,
    surface: Surface,
    edge_mask: Vec<f32>,
    mask_width: u32,
}

impl RenderLoop {
    pub fn new(sampler: AudioSampler, settings: VisualizerSettings, width: u32, height: u32) -> Self {
        let history_size = settings.history_size;
        Self {
            settings,
            sampler,
            phase: RenderPhase::Idle,
            fade_opacity: 0.0,
            warmup_frames: 0,
            is_initialized: false,
            last_frame_ms: None,
            last_sample_ms: 0.0,
            history: ScrollingHistory::new(history_size),
            bars: StaticBars::new(),
            synthetic: Vec::new(),
            last_active_data: Vec::new(),
            transition_progress: 0.0,
            synthetic_time: 0.0,
            needs_redraw: true,
            surface: Surface::new(width, height),
            edge_mask: Vec::new(),
            mask_width: 0,
        }
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    pub fn fade_opacity(&self) -> f32 {
        self.fade_opacity
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn is_dormant(&self) -> bool {
        self.phase == RenderPhase::Idle && self.history.is_empty() && self.bars.is_empty()
    }

    fn bar_count(&self) -> usize {
        let step = self.settings.bar_width + self.settings.bar_gap;
        if step == 0 {
            return 0;
        }
        (self.surface.width() / step) as usize
    }

    /// Begin capturing: resets every buffer, opens the microphone, and
    /// enters `Starting`. On failure the loop stays `Idle` holding no
    /// resources.
    pub fn activate(
        &mut self,
        request: &CaptureRequest,
        on_error: ErrorSink,
    ) -> Result<(), AudioError> {
        self.clear_buffers();
        self.fade_opacity = 0.0;
        self.warmup_frames = 0;
        self.is_initialized = false;
        self.needs_redraw = true;

        self.sampler.open(request, on_error)?;
        self.is_initialized = true;
        self.phase = RenderPhase::Starting;
        log::debug!("Render loop activated");
        Ok(())
    }

    /// Stop capturing. The loop fades out and clears its buffers once
    /// opacity reaches zero.
    pub fn deactivate(&mut self) {
        self.sampler.close();
        self.is_initialized = false;
        if self.fade_opacity > 0.0 {
            self.phase = RenderPhase::Stopping;
        } else {
            self.clear_buffers();
            self.phase = RenderPhase::Idle;
        }
        self.needs_redraw = true;
    }

    /// The capture device vanished mid-session. Identical to an explicit
    /// stop: drain, fade out, clear.
    pub fn device_lost(&mut self) {
        log::warn!("Capture device lost, draining render loop");
        self.deactivate();
    }

    /// Enter or leave the synthetic processing animation. Entering is only
    /// meaningful while not actively capturing.
    pub fn set_processing(&mut self, processing: bool) {
        match (processing, self.phase) {
            (true, RenderPhase::Idle) | (true, RenderPhase::Stopping) => {
                self.transition_progress = 0.0;
                self.phase = RenderPhase::Processing;
                self.needs_redraw = true;
            }
            (false, RenderPhase::Processing) => {
                // Inverse fade runs before the buffers clear.
                self.phase = RenderPhase::Stopping;
                self.needs_redraw = true;
            }
            _ => {}
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface.resize(width, height);
        self.mask_width = 0;
        self.needs_redraw = true;
    }

    /// Access the sampler (tap installation happens before activate).
    pub fn sampler_mut(&mut self) -> &mut AudioSampler {
        &mut self.sampler
    }

    fn clear_buffers(&mut self) {
        self.history.clear();
        self.bars.clear();
        self.synthetic.clear();
        self.last_active_data.clear();
        self.transition_progress = 0.0;
    }

    /// Run one frame. `now_ms` comes from the scheduler's monotonic clock;
    /// all animation rates are normalized to a 60 fps baseline so frame
    /// pacing does not change perceived speed.
    pub fn frame(&mut self, now_ms: f64) {
        let dt = match self.last_frame_ms {
            Some(prev) => ((now_ms - prev) / BASELINE_FRAME_MS).max(0.0) as f32,
            None => 1.0,
        };
        self.last_frame_ms = Some(now_ms);

        match self.phase {
            RenderPhase::Idle => {
                if !self.needs_redraw {
                    return;
                }
                self.needs_redraw = false;
                self.surface.clear();
                return;
            }
            RenderPhase::Starting => {
                self.fade_opacity = (self.fade_opacity + FADE_IN_RATE * dt).min(1.0);
                if self.is_initialized {
                    self.warmup_frames += 1;
                    if self.warmup_frames > WARMUP_FRAMES {
                        self.phase = RenderPhase::Live;
                    }
                }
            }
            RenderPhase::Live => {
                self.fade_opacity = (self.fade_opacity + FADE_IN_RATE * dt).min(1.0);
                if now_ms - self.last_sample_ms > self.settings.update_rate_ms as f64 {
                    self.last_sample_ms = now_ms;
                    let bins = self.sampler.sample();
                    self.ingest(&bins);
                }
            }
            RenderPhase::Processing => {
                self.fade_opacity = (self.fade_opacity + FADE_IN_RATE * dt).min(1.0);
                self.advance_synthetic();
            }
            RenderPhase::Stopping => {
                self.fade_opacity = (self.fade_opacity - FADE_OUT_RATE * dt).max(0.0);
                let shrink = 1.0 - (STOP_DATA_FADE_RATE * dt).min(1.0);
                self.history.scale_all(shrink);
                self.bars.scale_all(shrink);
                for v in self.synthetic.iter_mut() {
                    *v *= shrink;
                }
                self.needs_redraw = true;
                if self.fade_opacity <= 0.0 {
                    self.clear_buffers();
                    self.phase = RenderPhase::Idle;
                }
            }
        }

        // Chase targets in static mode for critically-damped-looking motion.
        if self.settings.mode == WaveformMode::Static && !self.bars.is_empty() {
            let factor = (self.settings.lerp_factor * dt).min(1.0);
            self.bars.interpolate(factor);
            self.needs_redraw = true;
        }

        let is_fading = self.fade_opacity > 0.0 && self.fade_opacity < 1.0;
        let active = matches!(
            self.phase,
            RenderPhase::Starting | RenderPhase::Live | RenderPhase::Processing
        );
        if !self.needs_redraw && !active && !is_fading {
            return;
        }
        self.needs_redraw = active || is_fading;

        self.paint();
    }

    /// Fold a fresh spectrum snapshot into the mode-appropriate buffer.
    fn ingest(&mut self, bins: &[u8]) {
        match self.settings.mode {
            WaveformMode::Static => {
                let targets = mirrored_targets(bins, self.bar_count(), self.settings.sensitivity);
                self.last_active_data = targets.clone();
                self.bars.set_targets(targets);
            }
            WaveformMode::Scrolling => {
                let value = reduce_to_scalar(bins, self.settings.sensitivity);
                self.history.push(value);
                self.last_active_data = self.history.snapshot();
            }
        }
        self.needs_redraw = true;
    }

    /// Generate the deterministic placeholder wave: three summed sinusoids
    /// under a center-weighting envelope, cross-faded from the last real
    /// frame so the hand-off is visually continuous.
    fn advance_synthetic(&mut self) {
        self.synthetic_time += SYNTHETIC_TIME_STEP;
        self.transition_progress = (self.transition_progress + TRANSITION_STEP).min(1.0);

        let bar_count = self.bar_count();
        if bar_count == 0 {
            return;
        }
        let half = (bar_count / 2).max(1);
        let t = self.synthetic_time;
        let mut data = Vec::with_capacity(bar_count);

        for i in 0..bar_count {
            let normalized = (i as f32 - half as f32) / half as f32;
            let center_weight = 1.0 - normalized.abs() * 0.4;

            let combined = match self.settings.mode {
                WaveformMode::Static => {
                    (t * 1.5 + normalized * 3.0).sin() * 0.25
                        + (t * 0.8 - normalized * 2.0).sin() * 0.2
                        + (t * 2.0 + normalized).cos() * 0.15
                }
                WaveformMode::Scrolling => {
                    (t * 1.5 + i as f32 * 0.15).sin() * 0.25
                        + (t * 0.8 - i as f32 * 0.1).sin() * 0.2
                        + (t * 2.0 + i as f32 * 0.05).cos() * 0.15
                }
            };
            let wave_value = (0.2 + combined) * center_weight;

            let final_value = if !self.last_active_data.is_empty() && self.transition_progress < 1.0
            {
                let last_index = match self.settings.mode {
                    WaveformMode::Static => i.min(self.last_active_data.len() - 1),
                    WaveformMode::Scrolling => {
                        ((i as f32 / bar_count as f32) * self.last_active_data.len() as f32)
                            .floor() as usize
                    }
                };
                let last = self
                    .last_active_data
                    .get(last_index)
                    .copied()
                    .unwrap_or(0.0);
                last * (1.0 - self.transition_progress) + wave_value * self.transition_progress
            } else {
                wave_value
            };

            data.push(final_value.clamp(AMPLITUDE_FLOOR, 1.0));
        }

        self.synthetic = data;
        self.needs_redraw = true;
    }

    fn paint(&mut self) {
        self.surface.clear();
        if self.fade_opacity <= 0.0 && self.phase != RenderPhase::Processing {
            return;
        }

        let width = self.surface.width();
        let height = self.surface.height();
        let step = (self.settings.bar_width + self.settings.bar_gap) as i32;
        let bar_count = self.bar_count();
        let center_y = height as f32 / 2.0;
        let fade = self.fade_opacity;
        let color = self.settings.bar_color;
        let glow = self.settings.glow_enabled
            && matches!(self.phase, RenderPhase::Starting | RenderPhase::Live);

        // Snapshot the values to paint; bar counts are small.
        let data: Vec<f32> = match self.phase {
            RenderPhase::Processing => self.synthetic.clone(),
            _ => match self.settings.mode {
                WaveformMode::Static => {
                    if self.bars.displayed().is_empty() {
                        self.synthetic.clone()
                    } else {
                        self.bars.displayed().to_vec()
                    }
                }
                WaveformMode::Scrolling => self.history.snapshot(),
            },
        };
        if data.is_empty() {
            return;
        }

        let scrolling = self.settings.mode == WaveformMode::Scrolling
            && self.phase != RenderPhase::Processing;

        for i in 0..bar_count.min(data.len()) {
            let (value, x) = if scrolling {
                // Newest sample hugs the right edge.
                let value = data[data.len() - 1 - i];
                let x = width as i32 - (i as i32 + 1) * step;
                (value, x)
            } else {
                (data[i], i as i32 * step)
            };

            if x < -(self.settings.bar_width as i32) || x > width as i32 {
                continue;
            }

            let bar_height = (value * height as f32 * 0.8)
                .max(self.settings.min_bar_height as f32);
            let y = (center_y - bar_height / 2.0) as i32;
            let h = bar_height as u32;

            if glow && value > GLOW_THRESHOLD {
                let intensity = ease_out_cubic(value) * 0.3 * fade;
                let pad = (8.0 * value) as i32;
                self.surface.fill_rect(
                    x - pad,
                    y - pad,
                    self.settings.bar_width + 2 * pad as u32,
                    h + 2 * pad as u32,
                    color,
                    intensity * 0.5,
                );
                self.surface.fill_rect(
                    x - pad / 2,
                    y - pad / 2,
                    self.settings.bar_width + pad as u32,
                    h + pad as u32,
                    color,
                    intensity,
                );
            }

            let alpha = (0.4 + value * 0.6) * fade;
            self.surface
                .fill_rect(x, y, self.settings.bar_width, h, color, alpha);
        }

        if self.settings.fade_edges && self.settings.fade_width > 0 && width > 0 {
            if self.mask_width != width {
                self.edge_mask = edge_fade_mask(width, self.settings.fade_width);
                self.mask_width = width;
            }
            self.surface.apply_column_mask(&self.edge_mask);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CaptureBackend, CaptureHandle, SampleSink};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct TestBackend {
        closes: Arc<AtomicUsize>,
        sink: Arc<Mutex<Option<SampleSink>>>,
    }

    struct TestHandle {
        closes: Arc<AtomicUsize>,
    }

    impl CaptureHandle for TestHandle {
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    impl CaptureBackend for TestBackend {
        fn open(
            &self,
            _request: &CaptureRequest,
            sink: SampleSink,
            _on_error: ErrorSink,
        ) -> Result<Box<dyn CaptureHandle>, AudioError> {
            *self.sink.lock().unwrap() = Some(sink);
            Ok(Box::new(TestHandle {
                closes: self.closes.clone(),
            }))
        }
    }

    fn test_loop(mode: WaveformMode) -> (RenderLoop, Arc<Mutex<Option<SampleSink>>>) {
        let sink = Arc::new(Mutex::new(None));
        let backend = Arc::new(TestBackend {
            closes: Arc::new(AtomicUsize::new(0)),
            sink: sink.clone(),
        });
        let settings = VisualizerSettings {
            mode,
            ..VisualizerSettings::default()
        };
        let sampler = AudioSampler::new(backend, settings.fft_size, 0.0);
        (RenderLoop::new(sampler, settings, 200, 64), sink)
    }

    fn noop_errors() -> ErrorSink {
        Arc::new(|_| {})
    }

    #[test]
    fn test_fade_in_is_monotonic_until_one() {
        let (mut rl, _) = test_loop(WaveformMode::Static);
        rl.activate(&CaptureRequest::default(), noop_errors())
            .expect("activate");

        let mut last = rl.fade_opacity();
        assert_eq!(last, 0.0);
        for frame in 0..40 {
            rl.frame(frame as f64 * 16.67);
            let now = rl.fade_opacity();
            assert!(now >= last, "fade decreased at frame {}", frame);
            last = now;
        }
        assert!((last - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fade_out_reaches_zero_and_clears() {
        let (mut rl, _) = test_loop(WaveformMode::Static);
        rl.activate(&CaptureRequest::default(), noop_errors())
            .expect("activate");
        for frame in 0..30 {
            rl.frame(frame as f64 * 16.67);
        }
        assert_eq!(rl.phase(), RenderPhase::Live);

        rl.deactivate();
        assert_eq!(rl.phase(), RenderPhase::Stopping);

        let mut last = rl.fade_opacity();
        for frame in 30..80 {
            rl.frame(frame as f64 * 16.67);
            let now = rl.fade_opacity();
            assert!(now <= last, "fade increased during stop");
            last = now;
        }
        assert_eq!(last, 0.0);
        assert_eq!(rl.phase(), RenderPhase::Idle);
        assert!(rl.is_dormant());
    }

    #[test]
    fn test_starting_becomes_live_after_warmup() {
        let (mut rl, _) = test_loop(WaveformMode::Static);
        rl.activate(&CaptureRequest::default(), noop_errors())
            .expect("activate");
        assert_eq!(rl.phase(), RenderPhase::Starting);

        for frame in 0..(WARMUP_FRAMES + 2) {
            rl.frame(frame as f64 * 16.67);
        }
        assert_eq!(rl.phase(), RenderPhase::Live);
    }

    #[test]
    fn test_live_ingests_and_paints_bars() {
        let (mut rl, sink) = test_loop(WaveformMode::Static);
        rl.activate(&CaptureRequest::default(), noop_errors())
            .expect("activate");

        // Feed a loud tone into the capture sink.
        let feed = sink.lock().unwrap().clone().expect("sink");
        let tone: Vec<f32> = (0..256)
            .map(|i| (2.0 * std::f32::consts::PI * 10.0 * i as f32 / 256.0).sin() * 0.3)
            .collect();
        feed(&tone);

        for frame in 0..40 {
            rl.frame(frame as f64 * 16.67);
        }
        assert_eq!(rl.phase(), RenderPhase::Live);
        assert!(!rl.surface().is_blank());
    }

    #[test]
    fn test_device_loss_equals_stop() {
        let (mut rl, _) = test_loop(WaveformMode::Scrolling);
        rl.activate(&CaptureRequest::default(), noop_errors())
            .expect("activate");
        for frame in 0..20 {
            rl.frame(frame as f64 * 16.67);
        }

        rl.device_lost();
        assert_eq!(rl.phase(), RenderPhase::Stopping);
        for frame in 20..80 {
            rl.frame(frame as f64 * 16.67);
        }
        assert_eq!(rl.phase(), RenderPhase::Idle);
        assert!(rl.is_dormant());
    }

    #[test]
    fn test_processing_animates_synthetic_wave() {
        let (mut rl, _) = test_loop(WaveformMode::Static);
        rl.set_processing(true);
        assert_eq!(rl.phase(), RenderPhase::Processing);

        for frame in 0..10 {
            rl.frame(frame as f64 * 16.67);
        }
        assert!(!rl.surface().is_blank());

        rl.set_processing(false);
        assert_eq!(rl.phase(), RenderPhase::Stopping);
        for frame in 10..80 {
            rl.frame(frame as f64 * 16.67);
        }
        assert_eq!(rl.phase(), RenderPhase::Idle);
    }

    #[test]
    fn test_synthetic_values_stay_clamped() {
        let (mut rl, _) = test_loop(WaveformMode::Static);
        rl.set_processing(true);
        for frame in 0..120 {
            rl.frame(frame as f64 * 16.67);
        }
        assert!(!rl.synthetic.is_empty());
        for &v in &rl.synthetic {
            assert!((AMPLITUDE_FLOOR..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_idle_frames_skip_work() {
        let (mut rl, _) = test_loop(WaveformMode::Static);
        rl.frame(0.0);
        assert!(rl.surface().is_blank());
        // Dirty flag consumed; subsequent frames are no-ops.
        rl.frame(16.67);
        assert!(rl.surface().is_blank());
    }

    #[test]
    fn test_activation_resets_previous_session_data() {
        let (mut rl, _) = test_loop(WaveformMode::Scrolling);
        rl.activate(&CaptureRequest::default(), noop_errors())
            .expect("activate");
        for frame in 0..40 {
            rl.frame(frame as f64 * 16.67);
        }
        rl.deactivate();
        rl.activate(&CaptureRequest::default(), noop_errors())
            .expect("activate again");
        assert_eq!(rl.fade_opacity(), 0.0);
        assert!(rl.history.is_empty());
        assert_eq!(rl.phase(), RenderPhase::Starting);
    }
}
