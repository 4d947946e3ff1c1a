//! Audio streaming pipeline
//!
//! Bridges the capture callback (sync) to the realtime websocket (async):
//! receives raw PCM16 through the sampler tap channel, downsamples to the
//! service rate, accumulates fixed-duration chunks, and sends them.

use tokio::sync::mpsc;

use super::protocol::{SessionConfig, SERVICE_SAMPLE_RATE};
use super::realtime::{fetch_token, RealtimeSession};
use super::{TranscriptionEventReceiver, TransportError};

/// Configuration for the audio streamer.
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Source sample rate from the capture device (typically 48000).
    pub source_sample_rate: u32,
    /// Chunk duration in milliseconds.
    pub chunk_duration_ms: u32,
    /// Language code for the session configuration.
    pub language_code: String,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            source_sample_rate: 48_000,
            chunk_duration_ms: 100,
            language_code: "en".to_string(),
        }
    }
}

impl StreamerConfig {
    /// Samples per chunk at the service sample rate.
    pub fn samples_per_chunk(&self) -> usize {
        (SERVICE_SAMPLE_RATE * self.chunk_duration_ms / 1000) as usize
    }
}

/// Streams tapped capture audio to the realtime session.
pub struct AudioStreamer {
    config: StreamerConfig,
    rx: mpsc::Receiver<Vec<i16>>,
    session: RealtimeSession,
    /// Accumulator for building fixed-duration chunks.
    buffer: Vec<i16>,
    samples_per_chunk: usize,
    chunks_sent: u64,
}

impl AudioStreamer {
    pub fn new(
        session: RealtimeSession,
        rx: mpsc::Receiver<Vec<i16>>,
        config: StreamerConfig,
    ) -> Self {
        let samples_per_chunk = config.samples_per_chunk();
        log::info!(
            "AudioStreamer: initialized ({}Hz -> {}Hz, {}ms chunks = {} samples)",
            config.source_sample_rate,
            SERVICE_SAMPLE_RATE,
            config.chunk_duration_ms,
            samples_per_chunk
        );

        Self {
            config,
            rx,
            session,
            buffer: Vec::with_capacity(samples_per_chunk * 2),
            samples_per_chunk,
            chunks_sent: 0,
        }
    }

    /// Run until the tap channel closes (capture stopped) or a send fails.
    /// Returns the number of chunks sent.
    pub async fn run(mut self) -> Result<u64, TransportError> {
        log::debug!("AudioStreamer: starting streaming loop");

        while let Some(samples) = self.rx.recv().await {
            self.process_samples(samples).await?;
        }

        // Channel closed: flush the final partial chunk and close cleanly.
        if !self.buffer.is_empty() {
            self.send_chunk().await?;
        }
        self.session.disconnect().await;

        log::info!(
            "AudioStreamer: streaming complete, {} chunks sent",
            self.chunks_sent
        );
        Ok(self.chunks_sent)
    }

    async fn process_samples(&mut self, samples: Vec<i16>) -> Result<(), TransportError> {
        let downsampled = downsample(
            &samples,
            self.config.source_sample_rate,
            SERVICE_SAMPLE_RATE,
        );
        self.buffer.extend(downsampled);

        while self.buffer.len() >= self.samples_per_chunk {
            self.send_chunk().await?;
        }
        Ok(())
    }

    async fn send_chunk(&mut self) -> Result<(), TransportError> {
        let chunk_size = self.buffer.len().min(self.samples_per_chunk);
        let chunk: Vec<i16> = self.buffer.drain(..chunk_size).collect();

        self.session.send_audio(&chunk).await?;
        self.chunks_sent += 1;

        if self.chunks_sent % 50 == 0 {
            log::debug!("AudioStreamer: sent {} chunks", self.chunks_sent);
        }
        Ok(())
    }
}

/// Fetch a token, connect a session, and wire up a streamer over the given
/// tap channel. Returns the streamer (drive with `run()`) and the event
/// receiver for the session loop.
pub async fn connect_streamer(
    api_key: &str,
    rx: mpsc::Receiver<Vec<i16>>,
    config: StreamerConfig,
) -> Result<(AudioStreamer, TranscriptionEventReceiver), TransportError> {
    let token = fetch_token(api_key).await?;

    let mut session =
        RealtimeSession::connect(&token, SessionConfig::new(&config.language_code)).await?;
    log::info!("Streamer connected (session: {})", session.session_id());

    let events_rx = session
        .take_events()
        .ok_or_else(|| TransportError::Protocol("Event receiver already taken".to_string()))?;

    Ok((AudioStreamer::new(session, rx, config), events_rx))
}

/// Downsample PCM16 by integer-ratio averaging (e.g. 48kHz -> 16kHz).
/// Returns the input unchanged when rates match or the ratio is fractional.
pub fn downsample(samples: &[i16], source_rate: u32, target_rate: u32) -> Vec<i16> {
    if target_rate == 0 || source_rate == 0 {
        log::warn!(
            "Invalid sample rate (source: {}, target: {}), returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    if source_rate == target_rate {
        return samples.to_vec();
    }

    if source_rate % target_rate != 0 {
        log::warn!(
            "Unsupported resample ratio {}:{}, returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    let ratio = (source_rate / target_rate) as usize;

    samples
        .chunks(ratio)
        .map(|chunk| {
            let sum: i64 = chunk.iter().map(|&s| s as i64).sum();
            (sum / chunk.len() as i64) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_per_chunk_at_service_rate() {
        let config = StreamerConfig::default();
        // 16000 Hz * 100ms / 1000 = 1600 samples
        assert_eq!(config.samples_per_chunk(), 1600);

        let config = StreamerConfig {
            chunk_duration_ms: 50,
            ..Default::default()
        };
        assert_eq!(config.samples_per_chunk(), 800);
    }

    #[test]
    fn test_downsample_3_to_1() {
        let samples = vec![3, 6, 9, 30, 60, 90];
        let out = downsample(&samples, 48_000, 16_000);
        assert_eq!(out, vec![6, 60]);
    }

    #[test]
    fn test_downsample_passthrough_on_equal_rates() {
        let samples = vec![1, 2, 3];
        assert_eq!(downsample(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn test_downsample_fractional_ratio_passthrough() {
        let samples = vec![1, 2, 3];
        assert_eq!(downsample(&samples, 44_100, 16_000), samples);
    }

    #[tokio::test]
    async fn test_tap_channel_close_is_observed() {
        let (tx, mut rx) = mpsc::channel::<Vec<i16>>(10);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
