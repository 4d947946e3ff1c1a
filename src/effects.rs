//! Effect runner for the recording session
//!
//! Executes the effects produced by the state machine: visualizer
//! lifecycle, transport bring-up/teardown, partial commits, clipboard copy,
//! and archive persistence. Completion is reported back into the event
//! loop; nothing here mutates session state directly.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::archive::{ArchiveStore, ArchivedTranscript};
use crate::audio::CaptureRequest;
use crate::platform::PlatformCapabilities;
use crate::settings::AppSettings;
use crate::state_machine::{Effect, Event};
use crate::transcript::{SpeakerRegistry, TranscriptAssembler};
use crate::transport::{connect_streamer, StreamerConfig, TranscriptionEvent};
use crate::viz::{FrameScheduler, RenderLoop};

/// Capacity of the sampler-to-streamer PCM tap channel.
const TAP_CHANNEL_CAPACITY: usize = 100;

/// Trait for running effects asynchronously. Completion events are sent
/// back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// Production effect runner wired to the real visualizer, transport, and
/// archive.
#[derive(Clone)]
pub struct SessionEffectRunner {
    renderer: Arc<Mutex<RenderLoop>>,
    scheduler: Arc<Mutex<FrameScheduler>>,
    assembler: Arc<Mutex<TranscriptAssembler>>,
    speakers: Arc<Mutex<SpeakerRegistry>>,
    archive: Arc<Mutex<ArchiveStore>>,
    settings: Arc<Mutex<AppSettings>>,
    caps: PlatformCapabilities,
    api_key: String,
    /// Tap receiver parked between StartVisualizer and ConnectTransport.
    pending_tap: Arc<Mutex<Option<mpsc::Receiver<Vec<i16>>>>>,
    /// Tasks of the active transport (streamer + event pump).
    transport_tasks: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl SessionEffectRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        renderer: Arc<Mutex<RenderLoop>>,
        scheduler: Arc<Mutex<FrameScheduler>>,
        assembler: Arc<Mutex<TranscriptAssembler>>,
        speakers: Arc<Mutex<SpeakerRegistry>>,
        archive: Arc<Mutex<ArchiveStore>>,
        settings: Arc<Mutex<AppSettings>>,
        caps: PlatformCapabilities,
        api_key: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            renderer,
            scheduler,
            assembler,
            speakers,
            archive,
            settings,
            caps,
            api_key,
            pending_tap: Arc::new(Mutex::new(None)),
            transport_tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn start_visualizer(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let (tap_tx, tap_rx) = mpsc::channel(TAP_CHANNEL_CAPACITY);
        *self.pending_tap.lock().unwrap() = Some(tap_rx);

        let request = {
            let settings = self.settings.lock().unwrap();
            CaptureRequest {
                device: settings.input_device.clone(),
                constraints: Default::default(),
            }
        };

        let device_events = tx.clone();
        let error_sink: crate::audio::ErrorSink = Arc::new(move |err| {
            log::warn!("Capture error surfaced: {}", err);
            let _ = device_events.try_send(Event::DeviceLost { id });
        });

        let result = {
            let mut renderer = self.renderer.lock().unwrap();
            renderer.sampler_mut().set_tap(Some(tap_tx));
            renderer.activate(&request, error_sink)
        };

        match result {
            Ok(()) => {
                self.scheduler.lock().unwrap().start(self.renderer.clone());
                let _ = tx.try_send(Event::CaptureReady { id });
            }
            Err(e) => {
                *self.pending_tap.lock().unwrap() = None;
                let _ = tx.try_send(Event::CaptureFailed {
                    id,
                    err: e.to_string(),
                });
            }
        }
    }

    async fn connect_transport(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let Some(tap_rx) = self.pending_tap.lock().unwrap().take() else {
            let _ = tx
                .send(Event::TransportFailed {
                    id,
                    err: "No audio tap available for streaming".to_string(),
                })
                .await;
            return;
        };

        let config = {
            let settings = self.settings.lock().unwrap();
            let source_rate = self
                .renderer
                .lock()
                .unwrap()
                .sampler_mut()
                .sample_rate()
                .unwrap_or(48_000);
            StreamerConfig {
                source_sample_rate: source_rate,
                language_code: settings.language_code.clone(),
                ..Default::default()
            }
        };

        match connect_streamer(&self.api_key, tap_rx, config).await {
            Ok((streamer, mut events_rx)) => {
                let streamer_task = tokio::spawn(async move {
                    match streamer.run().await {
                        Ok(chunks) => log::debug!("Streamer finished after {} chunks", chunks),
                        Err(e) => log::warn!("Streamer ended with error: {}", e),
                    }
                });

                let assembler = self.assembler.clone();
                let speakers = self.speakers.clone();
                let pump_tx = tx.clone();
                let pump_task = tokio::spawn(async move {
                    while let Some(event) = events_rx.recv().await {
                        match event {
                            TranscriptionEvent::Partial { text } => {
                                assembler.lock().unwrap().on_partial(&text);
                            }
                            TranscriptionEvent::Committed { text, words } => {
                                let mut assembler = assembler.lock().unwrap();
                                assembler.on_finalized_segment(&text, &words);
                                let mut speakers = speakers.lock().unwrap();
                                for speaker_id in assembler.speaker_ids() {
                                    speakers.name_of(speaker_id);
                                }
                            }
                            TranscriptionEvent::AuthError { message }
                            | TranscriptionEvent::QuotaExceeded { message }
                            | TranscriptionEvent::Error { message } => {
                                let _ = pump_tx
                                    .send(Event::TransportFailed { id, err: message })
                                    .await;
                            }
                            TranscriptionEvent::Closed => {
                                let _ = pump_tx.send(Event::TransportClosed { id }).await;
                            }
                        }
                    }
                });

                {
                    let mut tasks = self.transport_tasks.lock().unwrap();
                    tasks.push(streamer_task);
                    tasks.push(pump_task);
                }

                let _ = tx.send(Event::TransportReady { id }).await;
            }
            Err(e) => {
                let _ = tx
                    .send(Event::TransportFailed {
                        id,
                        err: e.to_string(),
                    })
                    .await;
            }
        }
    }

    fn disconnect_transport(&self) {
        *self.pending_tap.lock().unwrap() = None;
        let mut tasks = self.transport_tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    fn persist_archive(
        &self,
        title: String,
        category: String,
        is_important: bool,
        has_consent: bool,
    ) -> Event {
        let (segments, speakers) = {
            let assembler = self.assembler.lock().unwrap();
            (
                assembler.segments().to_vec(),
                self.speakers.lock().unwrap().known(),
            )
        };

        if segments.is_empty() {
            return Event::ArchiveFailed {
                err: "Nothing to archive".to_string(),
            };
        }

        let record = ArchivedTranscript::new(
            &title,
            segments,
            speakers,
            &category,
            is_important,
            has_consent,
        );
        let title = record.title.clone();

        match self.archive.lock().unwrap().archive(record) {
            Ok(()) => {
                log::info!("Archived transcript: {}", title);
                Event::ArchiveOk
            }
            Err(e) => Event::ArchiveFailed { err: e.to_string() },
        }
    }

    fn copy_transcript(&self) {
        if !self.caps.has_clipboard() {
            log::debug!("Clipboard unavailable on this host");
            return;
        }
        let text = self.assembler.lock().unwrap().transcript();
        if text.is_empty() {
            return;
        }
        match arboard::Clipboard::new() {
            Ok(mut clipboard) => {
                if let Err(e) = clipboard.set_text(text) {
                    log::warn!("Clipboard copy failed: {}", e);
                }
            }
            Err(e) => log::warn!("Clipboard unavailable: {}", e),
        }
    }
}

impl EffectRunner for SessionEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        log::debug!("Running effect: {:?}", effect);
        let runner = self.clone();

        match effect {
            Effect::ResetSession => {
                runner.assembler.lock().unwrap().clear();
                runner.speakers.lock().unwrap().reset();
            }
            Effect::StartVisualizer { id } => {
                tokio::spawn(async move { runner.start_visualizer(id, tx) });
            }
            Effect::StopVisualizer => {
                // Release order: capture stops first, then the loop drains;
                // the scheduler keeps animating the fade-out.
                runner.renderer.lock().unwrap().deactivate();
            }
            Effect::SetProcessing { on } => {
                runner.renderer.lock().unwrap().set_processing(on);
            }
            Effect::ConnectTransport { id } => {
                tokio::spawn(async move { runner.connect_transport(id, tx).await });
            }
            Effect::DisconnectTransport { .. } => {
                runner.disconnect_transport();
            }
            Effect::CommitPartial { boundary } => {
                runner.assembler.lock().unwrap().commit_pending(boundary);
            }
            Effect::CopyTranscript => {
                tokio::spawn(async move { runner.copy_transcript() });
            }
            Effect::PersistArchive {
                title,
                category,
                is_important,
                has_consent,
            } => {
                tokio::spawn(async move {
                    let event =
                        runner.persist_archive(title, category, is_important, has_consent);
                    let _ = tx.send(event).await;
                });
            }
            Effect::EmitUi => {
                // Handled by the session loop itself.
            }
        }
    }
}

