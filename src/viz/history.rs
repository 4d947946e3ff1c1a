//! Amplitude history buffers and spectrum reduction
//!
//! Two addressing modes feed the renderer:
//! - scrolling: a bounded FIFO of loudness scalars, oldest evicted first
//! - static: a fixed-length mirrored bar array where new samples become
//!   *targets* and a parallel displayed array chases them each frame

use std::collections::VecDeque;

/// Silence floor. Amplitudes are clamped to [floor, 1] before storage so
/// bars stay visible when nothing is speaking.
pub const AMPLITUDE_FLOOR: f32 = 0.05;

/// Lower edge of the voice-relevant sub-band, as a fraction of bin count.
/// Excludes the near-DC bins.
const SUB_BAND_LOW: f32 = 0.05;

/// Upper edge of the voice-relevant sub-band. Bins above this carry little
/// voice loudness.
const SUB_BAND_HIGH: f32 = 0.4;

fn sub_band(bins: &[u8]) -> &[u8] {
    let start = (bins.len() as f32 * SUB_BAND_LOW).floor() as usize;
    let end = (bins.len() as f32 * SUB_BAND_HIGH).floor() as usize;
    &bins[start..end.max(start + 1).min(bins.len())]
}

fn clamp_amplitude(value: f32) -> f32 {
    value.clamp(AMPLITUDE_FLOOR, 1.0)
}

/// Reduce a spectrum snapshot to a single loudness scalar (scrolling mode):
/// sub-band average scaled by sensitivity, clamped to [floor, 1].
pub fn reduce_to_scalar(bins: &[u8], sensitivity: f32) -> f32 {
    let band = sub_band(bins);
    if band.is_empty() {
        return AMPLITUDE_FLOOR;
    }
    let sum: u32 = band.iter().map(|&b| b as u32).sum();
    let average = sum as f32 / band.len() as f32 / 255.0 * sensitivity;
    clamp_amplitude(average)
}

/// Map a spectrum snapshot onto a mirrored bar array (static mode).
///
/// Half the bar positions are sampled index-proportionally from the
/// sub-band, then laid out left half reversed, right half forward, so the
/// result is symmetric about the center. Length is `2 * (bar_count / 2)`.
pub fn mirrored_targets(bins: &[u8], bar_count: usize, sensitivity: f32) -> Vec<f32> {
    let band = sub_band(bins);
    let half_count = bar_count / 2;
    let mut bars = Vec::with_capacity(half_count * 2);
    if band.is_empty() || half_count == 0 {
        return bars;
    }

    let value_at = |i: usize| {
        let data_index = (i as f32 / half_count as f32 * band.len() as f32).floor() as usize;
        let raw = band.get(data_index).copied().unwrap_or(0);
        clamp_amplitude(raw as f32 / 255.0 * sensitivity)
    };

    for i in (0..half_count).rev() {
        bars.push(value_at(i));
    }
    for i in 0..half_count {
        bars.push(value_at(i));
    }
    bars
}

/// Bounded FIFO of amplitude samples (scrolling mode).
#[derive(Debug)]
pub struct ScrollingHistory {
    values: VecDeque<f32>,
    capacity: usize,
}

impl ScrollingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when over capacity.
    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(clamp_amplitude(value));
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Newest-last snapshot of the retained samples.
    pub fn snapshot(&self) -> Vec<f32> {
        self.values.iter().copied().collect()
    }

    /// Scale every retained sample in place (stop fade-out).
    pub fn scale_all(&mut self, factor: f32) {
        for v in self.values.iter_mut() {
            *v *= factor;
        }
    }
}

/// Target and displayed bar arrays for static mode.
///
/// Targets are replaced wholesale on each sampling tick; displayed values
/// chase them via lerp every frame. A length mismatch (surface resize)
/// forces a hard reset instead of interpolating across sizes.
#[derive(Debug, Default)]
pub struct StaticBars {
    targets: Vec<f32>,
    displayed: Vec<f32>,
}

impl StaticBars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_targets(&mut self, targets: Vec<f32>) {
        if self.displayed.len() != targets.len() {
            self.displayed = targets.clone();
        }
        self.targets = targets;
    }

    /// Chase targets: `displayed += (target - displayed) * factor`.
    pub fn interpolate(&mut self, factor: f32) {
        let factor = factor.clamp(0.0, 1.0);
        for (shown, &target) in self.displayed.iter_mut().zip(self.targets.iter()) {
            *shown += (target - *shown) * factor;
        }
    }

    pub fn displayed(&self) -> &[f32] {
        &self.displayed
    }

    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.displayed.clear();
    }

    pub fn scale_all(&mut self, factor: f32) {
        for v in self.targets.iter_mut() {
            *v *= factor;
        }
        for v in self.displayed.iter_mut() {
            *v *= factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrolling_keeps_last_n_in_order() {
        let mut history = ScrollingHistory::new(4);
        for i in 0..7 {
            history.push(0.1 + i as f32 * 0.1);
        }
        assert_eq!(history.len(), 4);
        let snapshot = history.snapshot();
        let expected: Vec<f32> = (3..7).map(|i| 0.1 + i as f32 * 0.1).collect();
        for (got, want) in snapshot.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "{} != {}", got, want);
        }
    }

    #[test]
    fn test_push_clamps_to_floor_and_one() {
        let mut history = ScrollingHistory::new(4);
        history.push(0.0);
        history.push(3.0);
        let snapshot = history.snapshot();
        assert_eq!(snapshot[0], AMPLITUDE_FLOOR);
        assert_eq!(snapshot[1], 1.0);
    }

    #[test]
    fn test_reduce_averages_sub_band_only() {
        // 100 bins: sub-band is [5, 40). Put energy only outside it.
        let mut bins = vec![0u8; 100];
        for b in bins.iter_mut().take(5) {
            *b = 255;
        }
        for b in bins.iter_mut().skip(40) {
            *b = 255;
        }
        assert_eq!(reduce_to_scalar(&bins, 1.0), AMPLITUDE_FLOOR);

        // Energy inside the band raises the scalar.
        for b in bins.iter_mut().take(40).skip(5) {
            *b = 128;
        }
        let value = reduce_to_scalar(&bins, 1.0);
        assert!(value > 0.4 && value < 0.6);
    }

    #[test]
    fn test_sensitivity_scales_before_clamp() {
        let bins = vec![128u8; 100];
        let base = reduce_to_scalar(&bins, 1.0);
        let boosted = reduce_to_scalar(&bins, 2.0);
        assert!(boosted > base);
        assert!(boosted <= 1.0);
    }

    #[test]
    fn test_mirrored_targets_structural_symmetry() {
        // Deterministic ramp spectrum: every sub-band position has a unique
        // value, so equal mirrored entries prove they were sourced from the
        // same relative position.
        let bins: Vec<u8> = (0..128).map(|i| (i * 2) as u8).collect();
        let bars = mirrored_targets(&bins, 20, 1.0);
        assert_eq!(bars.len(), 20);
        for i in 0..bars.len() / 2 {
            assert_eq!(bars[i], bars[bars.len() - 1 - i], "index {}", i);
        }
    }

    #[test]
    fn test_mirrored_targets_odd_bar_count_truncates() {
        let bins: Vec<u8> = (0..128).map(|i| i as u8).collect();
        let bars = mirrored_targets(&bins, 21, 1.0);
        assert_eq!(bars.len(), 20);
    }

    #[test]
    fn test_static_bars_hard_reset_on_length_change() {
        let mut bars = StaticBars::new();
        bars.set_targets(vec![0.5; 10]);
        assert_eq!(bars.displayed(), bars.targets());

        bars.interpolate(0.5);
        bars.set_targets(vec![1.0; 10]);
        bars.interpolate(0.5);
        assert!((bars.displayed()[0] - 0.75).abs() < 1e-6);

        // New length: displayed snaps to targets instead of lerping.
        bars.set_targets(vec![0.2; 6]);
        assert_eq!(bars.displayed().len(), 6);
        assert_eq!(bars.displayed()[0], 0.2);
    }

    #[test]
    fn test_interpolate_converges_toward_target() {
        let mut bars = StaticBars::new();
        bars.set_targets(vec![0.0]);
        bars.set_targets(vec![1.0]);
        let mut last = bars.displayed()[0];
        for _ in 0..20 {
            bars.interpolate(0.3);
            let now = bars.displayed()[0];
            assert!(now >= last);
            last = now;
        }
        assert!(last > 0.99);
    }
}
