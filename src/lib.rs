//! memoscribe: voice-memo capture engine
//!
//! Records microphone audio, streams it to a realtime speech-to-text
//! service, renders a live waveform to a pixel surface at display refresh
//! rate, assembles finalized segments into a de-duplicated transcript, and
//! archives finished memos to durable local storage.
//!
//! # Architecture
//!
//! ```text
//! mic ──▶ AudioSampler ──▶ AmplitudeHistory ──▶ RenderLoop ──▶ Surface
//!              │ (tap)
//!              ▼
//!        AudioStreamer ──▶ realtime STT ──▶ TranscriptAssembler
//!                                                 │ (on stop)
//!                                                 ▼
//!                                            ArchiveStore (CSV)
//! ```
//!
//! Session lifecycle runs through a single reducer (`state_machine`) with
//! an async effect runner (`effects`); everything else is event-handler
//! work on the same loop.

pub mod archive;
pub mod audio;
mod effects;
pub mod platform;
pub mod settings;
mod state_machine;
pub mod transcript;
pub mod transport;
pub mod viz;

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use archive::ArchiveStore;
use audio::{AudioSampler, CpalBackend};
use platform::PlatformCapabilities;
use settings::AppSettings;
use transcript::{group_segments, SpeakerRegistry, TranscriptAssembler};
use viz::{FrameScheduler, RenderLoop};

pub use effects::{EffectRunner, SessionEffectRunner};
pub use state_machine::{reduce, Effect, Event, State};

/// Default pixel surface size for the waveform.
const DEFAULT_SURFACE_WIDTH: u32 = 800;
const DEFAULT_SURFACE_HEIGHT: u32 = 64;

/// Event channel capacity. Events are small and drained quickly.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// UI state published to whatever front end is attached.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    Idle,
    Starting,
    Recording {
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
    },
    Paused,
    Resuming,
    Error {
        message: String,
    },
}

fn state_to_ui(state: &State) -> UiState {
    match state {
        State::Idle => UiState::Idle,
        State::Starting { .. } => UiState::Starting,
        State::Recording { started_at, .. } => UiState::Recording {
            elapsed_secs: started_at.elapsed().as_secs(),
        },
        State::Paused { .. } => UiState::Paused,
        State::Resuming { .. } => UiState::Resuming,
        State::Error { message } => UiState::Error {
            message: message.clone(),
        },
    }
}

/// A running recording session: the event loop, visualizer, transport
/// plumbing, and archive, bundled behind a small handle.
pub struct Session {
    tx: mpsc::Sender<Event>,
    ui_rx: watch::Receiver<UiState>,
    assembler: Arc<Mutex<TranscriptAssembler>>,
    speakers: Arc<Mutex<SpeakerRegistry>>,
    archive: Arc<Mutex<ArchiveStore>>,
    renderer: Arc<Mutex<RenderLoop>>,
    scheduler: Arc<Mutex<FrameScheduler>>,
    loop_task: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Build and start a session over the real audio/transport/archive
    /// stack. Must be called within a tokio runtime.
    pub fn start(
        settings: AppSettings,
        caps: PlatformCapabilities,
        api_key: String,
    ) -> Result<Self, archive::ArchiveError> {
        let archive = Arc::new(Mutex::new(ArchiveStore::open(&caps)?));

        let sampler = AudioSampler::new(
            Arc::new(CpalBackend),
            settings.visualizer.fft_size,
            settings.visualizer.smoothing_time_constant,
        );
        let renderer = Arc::new(Mutex::new(RenderLoop::new(
            sampler,
            settings.visualizer.clone(),
            DEFAULT_SURFACE_WIDTH,
            DEFAULT_SURFACE_HEIGHT,
        )));
        let scheduler = Arc::new(Mutex::new(FrameScheduler::new()));
        let assembler = Arc::new(Mutex::new(TranscriptAssembler::new()));
        let speakers = Arc::new(Mutex::new(SpeakerRegistry::new()));
        let settings = Arc::new(Mutex::new(settings));

        let runner = SessionEffectRunner::new(
            renderer.clone(),
            scheduler.clone(),
            assembler.clone(),
            speakers.clone(),
            archive.clone(),
            settings,
            caps,
            api_key,
        );

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (ui_tx, ui_rx) = watch::channel(UiState::Idle);

        let loop_task = tokio::spawn(run_session_loop(
            rx,
            tx.clone(),
            runner,
            ui_tx,
            scheduler.clone(),
        ));

        Ok(Self {
            tx,
            ui_rx,
            assembler,
            speakers,
            archive,
            renderer,
            scheduler,
            loop_task,
        })
    }

    /// Send an event into the session loop.
    pub async fn send(&self, event: Event) {
        if self.tx.send(event).await.is_err() {
            log::warn!("Session loop is gone, event dropped");
        }
    }

    /// Watch channel carrying the published UI state.
    pub fn ui(&self) -> watch::Receiver<UiState> {
        self.ui_rx.clone()
    }

    /// Full transcript so far (finalized segments only).
    pub fn transcript(&self) -> String {
        self.assembler.lock().unwrap().transcript()
    }

    /// In-flight partial text for the current utterance.
    pub fn partial(&self) -> String {
        self.assembler.lock().unwrap().partial().to_string()
    }

    /// Paragraph view of the current transcript.
    pub fn paragraphs(&self) -> Vec<String> {
        group_segments(self.assembler.lock().unwrap().segments())
    }

    /// Display names of the speakers heard this session.
    pub fn speaker_names(&self) -> Vec<String> {
        self.speakers
            .lock()
            .unwrap()
            .known()
            .into_iter()
            .map(|s| s.name)
            .collect()
    }

    /// Shared archive store, for browse/update/export surfaces.
    pub fn archive(&self) -> Arc<Mutex<ArchiveStore>> {
        self.archive.clone()
    }

    /// Current waveform pixel surface, cloned for display.
    pub fn surface(&self) -> viz::Surface {
        self.renderer.lock().unwrap().surface().clone()
    }

    /// Stop the loop and every owned task.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Event::Exit).await;
        let _ = self.loop_task.await;
        self.scheduler.lock().unwrap().stop();
    }
}

/// Run the session event loop: reduce every event, publish UI state, and
/// hand effects to the runner.
async fn run_session_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    runner: Arc<dyn EffectRunner>,
    ui_tx: watch::Sender<UiState>,
    scheduler: Arc<Mutex<FrameScheduler>>,
) {
    let mut state = State::default();
    ui_tx.send_replace(state_to_ui(&state));
    log::info!("Session loop started");

    while let Some(event) = rx.recv().await {
        if matches!(event, Event::Exit) {
            log::info!("Exit requested, shutting down session loop");
            break;
        }

        let old_discriminant = std::mem::discriminant(&state);
        let (next, effects) = reduce(&state, event);
        let new_discriminant = std::mem::discriminant(&next);

        if old_discriminant != new_discriminant {
            log::info!("State transition: {:?} -> {:?}", state, next);
        }
        state = next;

        for effect in effects {
            if matches!(effect, Effect::EmitUi) {
                ui_tx.send_replace(state_to_ui(&state));
                continue;
            }
            runner.spawn(effect, tx.clone());
        }
    }

    scheduler.lock().unwrap().stop();
    log::info!("Session loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_state_serializes_tagged() {
        let json = serde_json::to_string(&UiState::Idle).expect("serialize");
        assert_eq!(json, r#"{"status":"idle"}"#);

        let json = serde_json::to_string(&UiState::Error {
            message: "boom".to_string(),
        })
        .expect("serialize");
        assert!(json.contains(r#""status":"error""#));
        assert!(json.contains("boom"));
    }

    #[test]
    fn test_state_to_ui_maps_every_state() {
        assert!(matches!(state_to_ui(&State::Idle), UiState::Idle));
        let err = State::Error {
            message: "x".to_string(),
        };
        assert!(matches!(state_to_ui(&err), UiState::Error { .. }));
    }
}
