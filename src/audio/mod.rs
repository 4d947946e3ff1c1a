//! Audio capture and spectral analysis
//!
//! This module owns microphone input. Capture goes through a
//! `CaptureBackend` trait (CPAL in production, fakes in tests) and feeds a
//! `SpectrumAnalyzer` that exposes byte-range frequency magnitudes to the
//! visualizer.

mod analyzer;
pub mod sampler;

pub use analyzer::SpectrumAnalyzer;
pub use sampler::{
    AudioSampler, CaptureBackend, CaptureConstraints, CaptureHandle, CaptureRequest, CpalBackend,
    ErrorSink, SampleSink,
};

/// Errors that can occur while acquiring or running audio capture.
#[derive(Debug, Clone)]
pub enum AudioError {
    /// The OS denied microphone access.
    PermissionDenied,
    /// No matching input device, or the device vanished.
    DeviceUnavailable(String),
    StreamCreationFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::PermissionDenied => write!(f, "Microphone permission denied"),
            AudioError::DeviceUnavailable(d) => write!(f, "Audio input device unavailable: {}", d),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
        }
    }
}

impl std::error::Error for AudioError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::DeviceUnavailable("USB Mic".to_string());
        assert!(err.to_string().contains("USB Mic"));

        let err = AudioError::StreamCreationFailed("busy".to_string());
        assert!(err.to_string().contains("busy"));
    }
}
