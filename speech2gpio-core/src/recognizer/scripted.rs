//! `ScriptedRecognizer`: replays events pushed through a `ScriptedFeed`.
//!
//! Lets tests drive the full session without a speech backend. The feed
//! also exposes what the session did to the recognizer (registered
//! constraints, start, dispose count).

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;

use super::{CompilationStatus, RecognitionEvent, RecognitionStatus, SpeechRecognizer};
use crate::error::{Result, SpeechGpioError};
use crate::grammar::PhraseConstraint;

#[derive(Default)]
struct Journal {
    constraints: Mutex<Vec<PhraseConstraint>>,
    sender: Mutex<Option<Sender<RecognitionEvent>>>,
    /// Events pushed before `start_continuous`; flushed on start.
    pending: Mutex<Vec<RecognitionEvent>>,
    started: AtomicBool,
    dispose_count: AtomicUsize,
}

pub struct ScriptedRecognizer {
    compile_status: CompilationStatus,
    journal: Arc<Journal>,
}

/// Test-side handle paired with a `ScriptedRecognizer`.
#[derive(Clone)]
pub struct ScriptedFeed {
    journal: Arc<Journal>,
}

impl ScriptedRecognizer {
    pub fn new() -> (Self, ScriptedFeed) {
        let journal = Arc::new(Journal::default());
        (
            Self {
                compile_status: RecognitionStatus::Success,
                journal: Arc::clone(&journal),
            },
            ScriptedFeed { journal },
        )
    }

    /// Status `compile_constraints` will report.
    pub fn with_compile_status(mut self, status: CompilationStatus) -> Self {
        self.compile_status = status;
        self
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn add_constraint(&mut self, constraint: &PhraseConstraint) {
        self.journal.constraints.lock().push(constraint.clone());
    }

    fn compile_constraints(&mut self) -> Result<CompilationStatus> {
        Ok(self.compile_status)
    }

    fn start_continuous(&mut self, events: Sender<RecognitionEvent>) -> Result<()> {
        if self.journal.dispose_count.load(Ordering::SeqCst) > 0 {
            return Err(SpeechGpioError::Recognizer("recognizer disposed".into()));
        }

        let pending = std::mem::take(&mut *self.journal.pending.lock());
        debug!(pending = pending.len(), "scripted recognizer started");
        for event in pending {
            let _ = events.send(event);
        }
        *self.journal.sender.lock() = Some(events);
        self.journal.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dispose(&mut self) {
        self.journal.sender.lock().take();
        self.journal.dispose_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedFeed {
    /// Deliver `event` to the session. Queued if recognition has not
    /// started yet. Returns `false` once the recognizer is disposed.
    pub fn push(&self, event: impl Into<RecognitionEvent>) -> bool {
        let event = event.into();
        if let Some(sender) = self.journal.sender.lock().as_ref() {
            return sender.send(event).is_ok();
        }
        if self.journal.dispose_count.load(Ordering::SeqCst) > 0 {
            return false;
        }
        self.journal.pending.lock().push(event);
        true
    }

    pub fn registered_constraints(&self) -> Vec<PhraseConstraint> {
        self.journal.constraints.lock().clone()
    }

    pub fn is_started(&self) -> bool {
        self.journal.started.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.journal.dispose_count.load(Ordering::SeqCst)
    }
}
