//! Recognition dispatcher: filters recognition events and routes accepted
//! commands to the actuator.
//!
//! ## Gates (per event, in order)
//!
//! ```text
//! 1. Event has a result payload           else drop: NoResult
//! 2. Result status is Success              else drop: Status
//!    (transcript observers are notified here)
//! 3. Confidence at or above the floor      else drop: LowConfidence
//! 4. A constraint tag matched              else drop: NoMatchedTag
//! 5. Tag is in the command table           else drop: UnmappedTag (warn)
//! 6. Write each (pin, level) in table order through the Actuator
//! ```
//!
//! `Dispatcher::evaluate` is pure; `Dispatcher::dispatch` adds the side
//! effects. `run` drives `dispatch` from the recognizer channel on a
//! blocking thread, one event at a time.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    actuator::{Actuator, WriteOutcome},
    command::{ActionSet, CommandTable, CommandTag, PinAction},
    ipc::events::TranscriptEvent,
    recognizer::{Confidence, RecognitionEvent, RecognitionStatus},
};

/// Lowest confidence floor the dispatcher will honour. `Low` and `Rejected`
/// results are never actuated.
pub const MIN_CONFIDENCE_FLOOR: Confidence = Confidence::Medium;

/// How long `run` waits on the channel before re-checking the running flag.
const RECV_POLL_MS: u64 = 50;

/// Why an event produced no pin writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    NoResult,
    Status(RecognitionStatus),
    LowConfidence(Confidence),
    NoMatchedTag,
    UnmappedTag(String),
}

/// Routing decision for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept { tag: CommandTag, actions: ActionSet },
    Dropped(DropReason),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accept { .. })
    }
}

#[derive(Default)]
pub struct DispatchDiagnostics {
    pub events_in: AtomicUsize,
    pub accepted: AtomicUsize,
    pub dropped_no_result: AtomicUsize,
    pub dropped_status: AtomicUsize,
    pub dropped_low_confidence: AtomicUsize,
    pub dropped_no_tag: AtomicUsize,
    pub dropped_unmapped: AtomicUsize,
    pub writes_applied: AtomicUsize,
    pub writes_failed: AtomicUsize,
}

impl DispatchDiagnostics {
    pub fn reset(&self) {
        self.events_in.store(0, Ordering::Relaxed);
        self.accepted.store(0, Ordering::Relaxed);
        self.dropped_no_result.store(0, Ordering::Relaxed);
        self.dropped_status.store(0, Ordering::Relaxed);
        self.dropped_low_confidence.store(0, Ordering::Relaxed);
        self.dropped_no_tag.store(0, Ordering::Relaxed);
        self.dropped_unmapped.store(0, Ordering::Relaxed);
        self.writes_applied.store(0, Ordering::Relaxed);
        self.writes_failed.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            events_in: self.events_in.load(Ordering::Acquire),
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped_no_result: self.dropped_no_result.load(Ordering::Relaxed),
            dropped_status: self.dropped_status.load(Ordering::Relaxed),
            dropped_low_confidence: self.dropped_low_confidence.load(Ordering::Relaxed),
            dropped_no_tag: self.dropped_no_tag.load(Ordering::Relaxed),
            dropped_unmapped: self.dropped_unmapped.load(Ordering::Relaxed),
            writes_applied: self.writes_applied.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
        }
    }

    fn count_drop(&self, reason: &DropReason) {
        let counter = match reason {
            DropReason::NoResult => &self.dropped_no_result,
            DropReason::Status(_) => &self.dropped_status,
            DropReason::LowConfidence(_) => &self.dropped_low_confidence,
            DropReason::NoMatchedTag => &self.dropped_no_tag,
            DropReason::UnmappedTag(_) => &self.dropped_unmapped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub events_in: usize,
    pub accepted: usize,
    pub dropped_no_result: usize,
    pub dropped_status: usize,
    pub dropped_low_confidence: usize,
    pub dropped_no_tag: usize,
    pub dropped_unmapped: usize,
    pub writes_applied: usize,
    pub writes_failed: usize,
}

/// Transcript observer: a broadcast sender plus the shared sequence counter.
#[derive(Clone)]
pub struct TranscriptObserver {
    pub tx: broadcast::Sender<TranscriptEvent>,
    pub seq: Arc<AtomicU64>,
}

pub struct Dispatcher {
    table: CommandTable,
    confidence_floor: Confidence,
    observer: Option<TranscriptObserver>,
    diagnostics: Arc<DispatchDiagnostics>,
}

impl Dispatcher {
    /// `confidence_floor` below `Medium` is raised to `Medium`.
    pub fn new(confidence_floor: Confidence) -> Self {
        Self {
            table: CommandTable,
            confidence_floor: confidence_floor.max(MIN_CONFIDENCE_FLOOR),
            observer: None,
            diagnostics: Arc::new(DispatchDiagnostics::default()),
        }
    }

    /// Publish a `TranscriptEvent` for every successful result.
    pub fn with_observer(mut self, observer: TranscriptObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<DispatchDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn confidence_floor(&self) -> Confidence {
        self.confidence_floor
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Apply the gates to `event` without side effects.
    pub fn evaluate(&self, event: &RecognitionEvent) -> Decision {
        let Some(result) = event.result.as_ref() else {
            return Decision::Dropped(DropReason::NoResult);
        };
        if !result.status.is_success() {
            return Decision::Dropped(DropReason::Status(result.status));
        }
        if result.confidence < self.confidence_floor {
            return Decision::Dropped(DropReason::LowConfidence(result.confidence));
        }
        let Some(wire_tag) = result.matched_tag.as_deref() else {
            return Decision::Dropped(DropReason::NoMatchedTag);
        };
        match self.table.lookup(wire_tag) {
            Some((tag, actions)) => Decision::Accept { tag, actions },
            None => Decision::Dropped(DropReason::UnmappedTag(wire_tag.to_string())),
        }
    }

    /// Pin writes `event` would cause, in order. Empty when dropped.
    pub fn plan(&self, event: &RecognitionEvent) -> Vec<PinAction> {
        match self.evaluate(event) {
            Decision::Accept { actions, .. } => actions.to_vec(),
            Decision::Dropped(_) => Vec::new(),
        }
    }

    /// Evaluate `event` and perform its writes. Never fails.
    ///
    /// `events_in` is bumped last, so a reader that sees it has also seen
    /// every write and counter for the event.
    pub fn dispatch(&self, event: &RecognitionEvent, actuator: &Actuator) -> Decision {
        self.notify_observer(event);

        let decision = self.evaluate(event);
        match &decision {
            Decision::Dropped(reason) => {
                self.diagnostics.count_drop(reason);
                match reason {
                    DropReason::UnmappedTag(tag) => {
                        warn!(tag = %tag, "recognizer reported a tag with no command mapping")
                    }
                    other => debug!(reason = ?other, "recognition event dropped"),
                }
            }
            Decision::Accept { tag, actions } => {
                self.diagnostics.accepted.fetch_add(1, Ordering::Relaxed);
                info!(%tag, "command accepted");
                for (line, level) in actions.iter() {
                    match actuator.set_pin(line, level) {
                        WriteOutcome::Applied => {
                            self.diagnostics.writes_applied.fetch_add(1, Ordering::Relaxed);
                        }
                        WriteOutcome::Failed(_) | WriteOutcome::Released => {
                            self.diagnostics.writes_failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }
        self.diagnostics.events_in.fetch_add(1, Ordering::Release);
        decision
    }

    fn notify_observer(&self, event: &RecognitionEvent) {
        let (Some(observer), Some(result)) = (self.observer.as_ref(), event.result.as_ref()) else {
            return;
        };
        if !result.status.is_success() {
            return;
        }
        debug!(
            transcript = %result.transcript,
            confidence = ?result.confidence,
            "speech recognised"
        );
        let seq = observer.seq.fetch_add(1, Ordering::Relaxed);
        // No subscribers is not an error.
        let _ = observer.tx.send(TranscriptEvent {
            seq,
            transcript: result.transcript.clone(),
            confidence: result.confidence,
        });
    }
}

/// Everything the consumer loop needs, passed as one struct so the
/// `spawn_blocking` closure stays tidy.
pub struct DispatchContext {
    pub dispatcher: Dispatcher,
    pub actuator: Arc<Actuator>,
    pub events: Receiver<RecognitionEvent>,
    pub running: Arc<AtomicBool>,
}

/// Dispatch events until the channel disconnects or `running` clears.
pub fn run(ctx: DispatchContext) {
    info!("dispatcher started");
    let poll = Duration::from_millis(RECV_POLL_MS);

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }
        match ctx.events.recv_timeout(poll) {
            Ok(event) => {
                ctx.dispatcher.dispatch(&event, &ctx.actuator);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("recognizer channel closed");
                break;
            }
        }
    }

    let stats = ctx.dispatcher.diagnostics();
    info!(
        events = stats.events_in,
        accepted = stats.accepted,
        writes = stats.writes_applied,
        "dispatcher stopped"
    );
}
