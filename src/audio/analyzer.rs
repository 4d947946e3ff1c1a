//! Short-time spectral magnitude analysis
//!
//! Keeps a rolling window of the most recent time-domain samples and
//! computes Hanning-windowed FFT magnitudes on demand. Successive snapshots
//! are smoothed with an EMA and mapped from decibels to the 0-255 byte
//! range, so consumers get analyser-style frequency data.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

/// dB level mapped to byte value 0.
const MIN_DECIBELS: f32 = -100.0;

/// dB level mapped to byte value 255.
const MAX_DECIBELS: f32 = -30.0;

pub struct SpectrumAnalyzer {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    hanning_window: Vec<f32>,
    /// Most recent `fft_size` time-domain samples.
    samples: VecDeque<f32>,
    /// Smoothed magnitudes from previous snapshots, one per bin.
    smoothed: Vec<f32>,
    /// EMA factor: 0 = no smoothing, near 1 = heavy smoothing.
    smoothing: f32,
}

impl SpectrumAnalyzer {
    /// Create an analyzer for the given FFT window size (power of two).
    pub fn new(fft_size: usize, smoothing_time_constant: f32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let hanning_window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (fft_size - 1) as f32).cos())
            })
            .collect();

        Self {
            fft_size,
            fft,
            hanning_window,
            samples: VecDeque::with_capacity(fft_size),
            smoothed: vec![0.0; fft_size / 2],
            smoothing: smoothing_time_constant.clamp(0.0, 0.99),
        }
    }

    /// Number of frequency bins in a snapshot (half the FFT size).
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Append mono time-domain samples, keeping only the newest window.
    pub fn push_samples(&mut self, data: &[f32]) {
        for &s in data {
            if self.samples.len() >= self.fft_size {
                self.samples.pop_front();
            }
            self.samples.push_back(s);
        }
    }

    /// Drop all buffered samples and smoothing state.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.smoothed.fill(0.0);
    }

    /// Compute a byte-range magnitude snapshot of the current window.
    ///
    /// Each bin is `20*log10(magnitude)` mapped linearly from
    /// [MIN_DECIBELS, MAX_DECIBELS] onto [0, 255], after EMA smoothing
    /// across successive calls.
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let mut buffer: Vec<Complex<f32>> = self
            .samples
            .iter()
            .zip(self.hanning_window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        let bins = self.frequency_bin_count();
        let mut out = Vec::with_capacity(bins);
        for (k, c) in buffer[..bins].iter().enumerate() {
            let magnitude = (c.re * c.re + c.im * c.im).sqrt() / self.fft_size as f32;

            let prev = self.smoothed[k];
            let smoothed = self.smoothing * prev + (1.0 - self.smoothing) * magnitude;
            self.smoothed[k] = smoothed;

            let db = if smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                MIN_DECIBELS
            };
            let scaled = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
            out.push((scaled.clamp(0.0, 1.0) * 255.0) as u8);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_count_is_half_fft_size() {
        let analyzer = SpectrumAnalyzer::new(256, 0.0);
        assert_eq!(analyzer.frequency_bin_count(), 128);
    }

    #[test]
    fn test_silence_maps_to_zero() {
        let mut analyzer = SpectrumAnalyzer::new(128, 0.0);
        analyzer.push_samples(&vec![0.0; 128]);
        let bins = analyzer.byte_frequency_data();
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_raises_matching_bin() {
        let mut analyzer = SpectrumAnalyzer::new(256, 0.0);
        // 8 full cycles over the window lands in bin 8. Amplitude is kept
        // low so neighbouring bins do not clamp to 255 alongside the peak.
        let samples: Vec<f32> = (0..256)
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * i as f32 / 256.0).sin() * 0.1)
            .collect();
        analyzer.push_samples(&samples);
        let bins = analyzer.byte_frequency_data();

        let loudest = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| v)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, 8);
        assert!(bins[8] > bins[40]);
    }

    #[test]
    fn test_smoothing_decays_instead_of_dropping() {
        let mut analyzer = SpectrumAnalyzer::new(128, 0.8);
        let tone: Vec<f32> = (0..128)
            .map(|i| (2.0 * std::f32::consts::PI * 4.0 * i as f32 / 128.0).sin() * 0.05)
            .collect();
        analyzer.push_samples(&tone);
        let loud = analyzer.byte_frequency_data()[4];

        // Replace the window with silence: the smoothed bin should fall but
        // not collapse to zero in one step.
        analyzer.push_samples(&vec![0.0; 128]);
        let after = analyzer.byte_frequency_data()[4];
        assert!(after < loud);
        assert!(after > 0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut analyzer = SpectrumAnalyzer::new(128, 0.8);
        analyzer.push_samples(&vec![0.9; 128]);
        analyzer.byte_frequency_data();
        analyzer.reset();
        let bins = analyzer.byte_frequency_data();
        assert!(bins.iter().all(|&b| b == 0));
    }
}
