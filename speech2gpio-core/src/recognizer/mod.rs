//! Speech recognizer abstraction.
//!
//! The `SpeechRecognizer` trait decouples the engine from any specific speech
//! backend. The engine registers list constraints, asks for compilation, and
//! then hands the recognizer a channel sender; results arrive on that
//! channel as `RecognitionEvent`s whenever the backend produces them.
//!
//! Backends shipped here:
//! - `TextRecognizer` matches typed transcripts against the grammar.
//! - `ScriptedRecognizer` replays injected events (tests).

pub mod scripted;
pub mod text;

pub use scripted::{ScriptedFeed, ScriptedRecognizer};
pub use text::{TextInput, TextRecognizer};

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grammar::PhraseConstraint;

/// Status a recognizer attaches to a compile attempt or a recognition result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecognitionStatus {
    Success,
    TopicLanguageNotSupported,
    GrammarLanguageMismatch,
    GrammarCompilationFailure,
    AudioQualityFailure,
    UserCanceled,
    TimeoutExceeded,
    PauseLimitExceeded,
    NetworkFailure,
    MicrophoneUnavailable,
    Unknown,
}

impl RecognitionStatus {
    pub fn is_success(self) -> bool {
        self == RecognitionStatus::Success
    }
}

/// Outcome of `SpeechRecognizer::compile_constraints`.
pub type CompilationStatus = RecognitionStatus;

/// Categorical match certainty, ordered `Rejected < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Rejected,
    Low,
    Medium,
    High,
}

/// One recognition result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub status: RecognitionStatus,
    /// Recognised text as reported by the backend.
    pub transcript: String,
    pub confidence: Confidence,
    /// Tag string of the matched constraint, if any.
    pub matched_tag: Option<String>,
}

impl RecognitionResult {
    pub fn success(transcript: impl Into<String>, confidence: Confidence, tag: Option<&str>) -> Self {
        Self {
            status: RecognitionStatus::Success,
            transcript: transcript.into(),
            confidence,
            matched_tag: tag.map(str::to_owned),
        }
    }

    pub fn failure(status: RecognitionStatus) -> Self {
        Self {
            status,
            transcript: String::new(),
            confidence: Confidence::Rejected,
            matched_tag: None,
        }
    }
}

/// Event emitted by a recognizer. A backend may emit an event without a
/// result payload; the dispatcher drops those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionEvent {
    pub result: Option<RecognitionResult>,
}

impl RecognitionEvent {
    pub fn new(result: RecognitionResult) -> Self {
        Self {
            result: Some(result),
        }
    }

    pub fn empty() -> Self {
        Self { result: None }
    }
}

impl From<RecognitionResult> for RecognitionEvent {
    fn from(result: RecognitionResult) -> Self {
        Self::new(result)
    }
}

/// Contract for speech recognition backends.
pub trait SpeechRecognizer: Send + 'static {
    /// Register one list constraint. Must be called before
    /// `compile_constraints`.
    fn add_constraint(&mut self, constraint: &PhraseConstraint);

    /// Compile all registered constraints.
    ///
    /// # Errors
    /// Returns an error only if the backend itself is unusable. A grammar the
    /// backend refuses is reported through the returned status.
    fn compile_constraints(&mut self) -> Result<CompilationStatus>;

    /// Begin continuous recognition, delivering every result to `events`.
    /// The backend drops `events` when it is disposed.
    fn start_continuous(&mut self, events: Sender<RecognitionEvent>) -> Result<()>;

    /// Stop recognition and free backend resources.
    fn dispose(&mut self);
}
