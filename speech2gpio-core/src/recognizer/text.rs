//! `TextRecognizer`: list-constraint matching over typed transcripts.
//!
//! Stands in for a speech backend when the host has no microphone: each line
//! submitted through `TextInput` is matched against the compiled phrase
//! index and delivered as a recognition result.
//!
//! Matching collapses runs of whitespace and trailing sentence punctuation,
//! and folds case unless the recognizer was built case-sensitive. An exact
//! hit reports `Confidence::High` with the constraint's tag; anything else
//! reports `Confidence::Rejected` with no tag.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{
    CompilationStatus, Confidence, RecognitionEvent, RecognitionResult, RecognitionStatus,
    SpeechRecognizer,
};
use crate::error::{Result, SpeechGpioError};
use crate::grammar::{self, PhraseConstraint};

#[derive(Default)]
struct Shared {
    /// Normalised phrase → tag wire name. Empty until compiled.
    index: HashMap<String, &'static str>,
    sender: Option<Sender<RecognitionEvent>>,
}

pub struct TextRecognizer {
    case_sensitive: bool,
    constraints: Vec<PhraseConstraint>,
    shared: Arc<Mutex<Shared>>,
}

/// Submission handle for a running `TextRecognizer`.
#[derive(Clone)]
pub struct TextInput {
    case_sensitive: bool,
    shared: Arc<Mutex<Shared>>,
}

impl TextRecognizer {
    pub fn new(case_sensitive: bool) -> (Self, TextInput) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                case_sensitive,
                constraints: Vec::new(),
                shared: Arc::clone(&shared),
            },
            TextInput {
                case_sensitive,
                shared,
            },
        )
    }
}

fn normalize(text: &str, case_sensitive: bool) -> String {
    let joined = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let trimmed = joined.trim_end_matches(['.', '!', '?', ',']);
    if case_sensitive {
        trimmed.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

impl SpeechRecognizer for TextRecognizer {
    fn add_constraint(&mut self, constraint: &PhraseConstraint) {
        self.constraints.push(constraint.clone());
    }

    fn compile_constraints(&mut self) -> Result<CompilationStatus> {
        if let Err(e) = grammar::validate_with_case(&self.constraints, self.case_sensitive) {
            warn!("text recognizer refused grammar: {e}");
            return Ok(RecognitionStatus::GrammarCompilationFailure);
        }

        let mut index = HashMap::new();
        for constraint in &self.constraints {
            for phrase in constraint.phrases() {
                let key = normalize(phrase, self.case_sensitive);
                if let Some(previous) = index.insert(key, constraint.tag().wire_name()) {
                    // Validation only trims; inner spacing and trailing
                    // punctuation can still collide here.
                    if previous != constraint.tag().wire_name() {
                        return Ok(RecognitionStatus::GrammarCompilationFailure);
                    }
                }
            }
        }

        debug!(phrases = index.len(), "text recognizer compiled");
        self.shared.lock().index = index;
        Ok(RecognitionStatus::Success)
    }

    fn start_continuous(&mut self, events: Sender<RecognitionEvent>) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.index.is_empty() {
            return Err(SpeechGpioError::Recognizer(
                "constraints not compiled".into(),
            ));
        }
        shared.sender = Some(events);
        Ok(())
    }

    fn dispose(&mut self) {
        let mut shared = self.shared.lock();
        shared.sender = None;
        shared.index.clear();
    }
}

impl TextInput {
    /// Match `text` against the compiled grammar without delivering it.
    pub fn recognize(&self, text: &str) -> RecognitionResult {
        let shared = self.shared.lock();
        let key = normalize(text, self.case_sensitive);
        match shared.index.get(&key) {
            Some(tag) => RecognitionResult::success(text.trim(), Confidence::High, Some(*tag)),
            None => RecognitionResult::success(text.trim(), Confidence::Rejected, None),
        }
    }

    /// Recognise `text` and deliver the result to the session. Blank input
    /// is ignored. Returns `false` if recognition is not running.
    pub fn submit(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let result = self.recognize(text);
        match self.shared.lock().sender.as_ref() {
            Some(sender) => sender.send(RecognitionEvent::new(result)).is_ok(),
            None => false,
        }
    }
}
