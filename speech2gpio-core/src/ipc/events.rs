//! Event types broadcast to session observers.
//!
//! | Event | Subscribe with |
//! |-------|----------------|
//! | `TranscriptEvent` | `Session::subscribe_transcripts` |
//! | `SessionStatusEvent` | `Session::subscribe_status` |

use serde::{Deserialize, Serialize};

use crate::recognizer::Confidence;

// ---------------------------------------------------------------------------
// Transcript events
// ---------------------------------------------------------------------------

/// Published for every successful recognition result, before the confidence
/// gate decides whether it actuates anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Recognised text.
    pub transcript: String,
    pub confidence: Confidence,
}

// ---------------------------------------------------------------------------
// Session status events
// ---------------------------------------------------------------------------

/// Emitted when the session changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub state: SessionState,
    /// Optional human-readable detail (e.g. compile status, error message).
    pub detail: Option<String>,
}

/// Lifecycle state of a `Session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created; `start()` not yet called.
    Uninitialized,
    /// Pins acquired and grammar registered. A session whose grammar failed
    /// to compile stays here until shutdown.
    Initializing,
    /// Continuous recognition is active and events are being dispatched.
    Running,
    /// Teardown in progress.
    ShuttingDown,
    /// All resources released. Terminal.
    Terminated,
}

impl SessionState {
    /// Whether the session currently owns hardware or recognizer resources.
    pub fn holds_resources(self) -> bool {
        matches!(self, SessionState::Initializing | SessionState::Running)
    }
}
