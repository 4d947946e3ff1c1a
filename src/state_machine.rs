//! Recording-session state machine
//!
//! Single-writer pattern: every lifecycle transition goes through the pure
//! `reduce()` function, which returns the next state plus a list of effects
//! for the async runner. Events carrying a stale session id (from a
//! previous recording) are ignored.

use std::time::Instant;
use uuid::Uuid;

use crate::transcript::CommitBoundary;

/// Authoritative session state. All transitions go through the reducer.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    /// Opening capture and connecting the transcription transport.
    Starting { session_id: Uuid },
    Recording {
        session_id: Uuid,
        started_at: Instant,
    },
    /// Transport disconnected, transcript retained, capture released.
    Paused { session_id: Uuid },
    /// Reconnecting capture + transport after a pause.
    Resuming { session_id: Uuid },
    Error { message: String },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Events from the keyboard surface, the capture backend, the transport
/// pump, and the archive writer.
#[derive(Debug, Clone)]
pub enum Event {
    // User intents
    StartRequested,
    StopRequested,
    PauseRequested,
    ResumeRequested,
    /// Escape: abort the in-progress recording, discarding its content.
    CancelRequested,
    ClearRequested,
    CopyRequested,
    ArchiveRequested {
        title: String,
        category: String,
        is_important: bool,
        has_consent: bool,
    },
    /// Application exit requested.
    Exit,

    // Capture events
    CaptureReady { id: Uuid },
    CaptureFailed { id: Uuid, err: String },
    /// The input device vanished mid-session.
    DeviceLost { id: Uuid },

    // Transport events
    TransportReady { id: Uuid },
    TransportFailed { id: Uuid, err: String },
    /// The connection ended without a local disconnect request.
    TransportClosed { id: Uuid },

    // Archive events
    ArchiveOk,
    ArchiveFailed { err: String },
}

/// Effects to be executed after a state transition. The effect runner
/// handles these asynchronously and reports back via events.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Clear assembler content and speaker names for a fresh session.
    ResetSession,
    /// Open the sampler and start fading the waveform in.
    StartVisualizer { id: Uuid },
    /// Drain the waveform to idle and release the capture device.
    StopVisualizer,
    /// Toggle the synthetic processing animation.
    SetProcessing { on: bool },
    /// Fetch a token and bring up the streaming transport.
    ConnectTransport { id: Uuid },
    /// Tear down the streaming transport.
    DisconnectTransport { id: Uuid },
    /// Force-commit the pending partial at a boundary.
    CommitPartial { boundary: CommitBoundary },
    /// Copy the current transcript to the clipboard.
    CopyTranscript,
    /// Build and persist an archive record from the current transcript.
    PersistArchive {
        title: String,
        category: String,
        is_important: bool,
        has_consent: bool,
    },
    /// Signal to publish UI state.
    EmitUi,
}

/// Reducer function: `(state, event) -> (next_state, effects)`
///
/// Key rules:
/// - Never mutate state in place
/// - Ignore capture/transport events whose session id is stale
/// - Emit `EmitUi` after every observable change
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    let current_id: Option<Uuid> = match state {
        Idle | Error { .. } => None,
        Starting { session_id }
        | Recording { session_id, .. }
        | Paused { session_id }
        | Resuming { session_id } => Some(*session_id),
    };

    let is_stale = |eid: Uuid| Some(eid) != current_id;

    match (state, event) {
        // -----------------
        // Idle / Error
        // -----------------
        (Idle, StartRequested) | (Error { .. }, StartRequested) => {
            let id = Uuid::new_v4();
            (
                Starting { session_id: id },
                vec![ResetSession, StartVisualizer { id }, EmitUi],
            )
        }
        (Idle, ArchiveRequested {
            title,
            category,
            is_important,
            has_consent,
        }) => (
            Idle,
            vec![
                SetProcessing { on: true },
                PersistArchive {
                    title,
                    category,
                    is_important,
                    has_consent,
                },
                EmitUi,
            ],
        ),
        (Idle, ArchiveOk) | (Idle, ArchiveFailed { .. }) => {
            (Idle, vec![SetProcessing { on: false }, EmitUi])
        }
        (Idle, ClearRequested) | (Error { .. }, ClearRequested) => {
            (Idle, vec![ResetSession, EmitUi])
        }

        // -----------------
        // Starting / Resuming: capture first, then transport
        // -----------------
        (Starting { session_id }, CaptureReady { id })
        | (Resuming { session_id }, CaptureReady { id })
            if *session_id == id =>
        {
            (state.clone(), vec![ConnectTransport { id }, EmitUi])
        }
        (Starting { session_id }, CaptureFailed { id, err })
        | (Resuming { session_id }, CaptureFailed { id, err })
            if *session_id == id =>
        {
            (
                Error { message: err },
                vec![StopVisualizer, EmitUi],
            )
        }
        (Starting { session_id }, TransportReady { id })
        | (Resuming { session_id }, TransportReady { id })
            if *session_id == id =>
        {
            (
                Recording {
                    session_id: *session_id,
                    started_at: Instant::now(),
                },
                vec![EmitUi],
            )
        }
        (Starting { session_id }, TransportFailed { id, err })
        | (Resuming { session_id }, TransportFailed { id, err })
            if *session_id == id =>
        {
            (
                Error { message: err },
                vec![StopVisualizer, DisconnectTransport { id }, EmitUi],
            )
        }
        (Starting { session_id }, CancelRequested)
        | (Resuming { session_id }, CancelRequested) => (
            Idle,
            vec![
                DisconnectTransport { id: *session_id },
                StopVisualizer,
                ResetSession,
                EmitUi,
            ],
        ),

        // -----------------
        // Recording
        // -----------------
        (Recording { session_id, .. }, StopRequested) => (
            Idle,
            vec![
                CommitPartial {
                    boundary: CommitBoundary::Stop,
                },
                DisconnectTransport { id: *session_id },
                StopVisualizer,
                EmitUi,
            ],
        ),
        (Recording { session_id, .. }, PauseRequested) => (
            Paused {
                session_id: *session_id,
            },
            vec![
                CommitPartial {
                    boundary: CommitBoundary::Pause,
                },
                DisconnectTransport { id: *session_id },
                StopVisualizer,
                EmitUi,
            ],
        ),
        (Recording { session_id, .. }, CancelRequested) => (
            Idle,
            vec![
                DisconnectTransport { id: *session_id },
                StopVisualizer,
                ResetSession,
                EmitUi,
            ],
        ),
        // A vanished device is treated exactly like an explicit stop: the
        // captured transcript survives.
        (Recording { session_id, .. }, DeviceLost { id }) if *session_id == id => (
            Idle,
            vec![
                CommitPartial {
                    boundary: CommitBoundary::Stop,
                },
                DisconnectTransport { id },
                StopVisualizer,
                EmitUi,
            ],
        ),
        (Recording { session_id, .. }, TransportFailed { id, err }) if *session_id == id => (
            Error { message: err },
            vec![
                CommitPartial {
                    boundary: CommitBoundary::Stop,
                },
                DisconnectTransport { id },
                StopVisualizer,
                EmitUi,
            ],
        ),
        (Recording { session_id, .. }, TransportClosed { id }) if *session_id == id => (
            Idle,
            vec![
                CommitPartial {
                    boundary: CommitBoundary::Stop,
                },
                StopVisualizer,
                EmitUi,
            ],
        ),

        // -----------------
        // Paused
        // -----------------
        (Paused { session_id }, ResumeRequested) => (
            Resuming {
                session_id: *session_id,
            },
            vec![
                StartVisualizer { id: *session_id },
                EmitUi,
            ],
        ),
        (Paused { .. }, StopRequested) => (
            Idle,
            vec![
                CommitPartial {
                    boundary: CommitBoundary::Stop,
                },
                EmitUi,
            ],
        ),
        (Paused { .. }, CancelRequested) => (Idle, vec![ResetSession, EmitUi]),

        // -----------------
        // Anywhere
        // -----------------
        (_, CopyRequested) => (state.clone(), vec![CopyTranscript]),
        (_, Exit) => (state.clone(), vec![]),

        // Stale or out-of-place capture/transport events are dropped.
        (_, CaptureReady { id })
        | (_, CaptureFailed { id, .. })
        | (_, DeviceLost { id })
        | (_, TransportReady { id })
        | (_, TransportFailed { id, .. })
        | (_, TransportClosed { id })
            if is_stale(id) =>
        {
            log::debug!("Ignoring stale event for session {}", id);
            (state.clone(), vec![])
        }

        (state, event) => {
            log::debug!("Ignoring {:?} in state {:?}", event, state);
            (state.clone(), vec![])
        }
    }
}
