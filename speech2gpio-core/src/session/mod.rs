//! `Session`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Session::new()
//!     └─► start()      → pins opened, grammar compiled, status = Initializing
//!         │              compile ok: dispatcher spawned, recognition started,
//!         │              status = Running
//!         │              always (once pins are open): self-test task spawned
//!         └─► shutdown() → status = ShuttingDown → Terminated
//! ```
//!
//! A grammar that fails to compile leaves the session in `Initializing`: the
//! pins are live and the self-test still blinks, but no command is ever
//! accepted. `shutdown()` is idempotent; each pin and the recognizer are
//! released exactly once. A `shutdown()` that lands while `start()` is still
//! opening pins or compiling the grammar wins: `start()` releases what it
//! acquired and fails with `ShutDownDuringStart`.
//!
//! ## Threading
//!
//! `start()` must be called inside a Tokio runtime. The dispatcher loop runs
//! on `spawn_blocking` and pulls events from a crossbeam channel fed by the
//! recognizer. The self-test is an ordinary async task whose hold is a
//! `tokio::time::sleep`, so it never delays event delivery. Both reach the
//! hardware only through the shared `Actuator`.

pub mod config;

pub use config::SessionConfig;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    actuator::Actuator,
    dispatch::{
        self, DiagnosticsSnapshot, DispatchContext, DispatchDiagnostics, Dispatcher,
        TranscriptObserver,
    },
    error::{Result, SpeechGpioError},
    gpio::{GpioController, PinLevel, PinLine, PinRegistry},
    grammar,
    ipc::events::{SessionState, SessionStatusEvent, TranscriptEvent},
    recognizer::{CompilationStatus, RecognitionStatus, SpeechRecognizer},
};

/// Broadcast channel capacity for observer events.
const BROADCAST_CAP: usize = 256;

/// What `start()` managed to bring up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartReport {
    pub compilation: CompilationStatus,
    /// `true` if continuous recognition is running.
    pub listening: bool,
}

/// Resources owned by a started session. Every field is taken exactly once
/// by `shutdown()`.
#[derive(Default)]
struct Resources {
    actuator: Option<Arc<Actuator>>,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    dispatcher_task: Option<JoinHandle<()>>,
    self_test_task: Option<JoinHandle<()>>,
}

pub struct Session {
    config: SessionConfig,
    state: Arc<Mutex<SessionState>>,
    /// `true` while the dispatcher loop should keep consuming events.
    running: Arc<AtomicBool>,
    resources: Mutex<Resources>,
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    /// Sequence counter for transcript events.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<DispatchDiagnostics>,
}

impl Session {
    pub fn new(mut config: SessionConfig) -> Self {
        config.normalize();
        let (transcript_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            state: Arc::new(Mutex::new(SessionState::Uninitialized)),
            running: Arc::new(AtomicBool::new(false)),
            resources: Mutex::new(Resources::default()),
            transcript_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(DispatchDiagnostics::default()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Acquire the pins, compile the grammar, start recognition and run the
    /// self-test.
    ///
    /// A failed grammar compile is not an error: the returned report says
    /// so and the session stays `Initializing`.
    ///
    /// # Errors
    /// `recognizer` has been disposed on every error path.
    /// - `InvalidConfig` if both lines share a pin.
    /// - `AlreadyStarted` unless the session is `Uninitialized`.
    /// - `PinUnavailable` / `Gpio` if the pins cannot be opened. The session
    ///   is then `Terminated`.
    /// - `ShutDownDuringStart` if `shutdown()` ran before startup finished.
    ///   Any pins opened by this call have been released.
    pub fn start(
        &self,
        gpio: &dyn GpioController,
        mut recognizer: Box<dyn SpeechRecognizer>,
    ) -> Result<StartReport> {
        if let Err(e) = self.config.validate() {
            recognizer.dispose();
            return Err(e);
        }
        {
            let mut state = self.state.lock();
            if *state != SessionState::Uninitialized {
                drop(state);
                recognizer.dispose();
                return Err(SpeechGpioError::AlreadyStarted);
            }
            *state = SessionState::Initializing;
        }
        self.emit_status(SessionState::Initializing, None);

        // ── GPIO ──────────────────────────────────────────────────────────
        let pins = match PinRegistry::acquire(gpio, self.config.red_pin, self.config.green_pin) {
            Ok(pins) => pins,
            Err(e) => {
                error!("GPIO initialisation failed: {e}");
                recognizer.dispose();
                self.transition(
                    SessionState::Initializing,
                    SessionState::Terminated,
                    Some(e.to_string()),
                );
                return Err(e);
            }
        };
        let actuator = Arc::new(Actuator::new(pins));

        // ── Grammar ───────────────────────────────────────────────────────
        let constraints = grammar::build_constraints();
        let compilation = match grammar::validate(&constraints)
            .and_then(|()| grammar::configure(recognizer.as_mut(), &constraints))
        {
            Ok(status) => status,
            Err(e) => {
                error!("grammar setup failed: {e}");
                RecognitionStatus::GrammarCompilationFailure
            }
        };

        // `state` stays locked until the resources are stored, so a
        // concurrent `shutdown()` either finds them or is seen here.
        let mut state = self.state.lock();
        if *state != SessionState::Initializing {
            drop(state);
            warn!("session shut down while starting, releasing resources");
            recognizer.dispose();
            let released = actuator.release();
            info!(released, "GPIO pins released");
            return Err(SpeechGpioError::ShutDownDuringStart);
        }

        // ── Dispatcher + continuous recognition ───────────────────────────
        let mut resources = self.resources.lock();
        let listening = compilation.is_success()
            && self.start_listening(recognizer.as_mut(), &actuator, &mut resources);

        resources.recognizer = Some(recognizer);
        resources.actuator = Some(Arc::clone(&actuator));

        // ── Self-test ─────────────────────────────────────────────────────
        let hold = Duration::from_millis(self.config.self_test_hold_ms);
        resources.self_test_task = Some(tokio::spawn(async move {
            self_test(&actuator, hold).await;
        }));
        drop(resources);

        if listening {
            *state = SessionState::Running;
        }
        drop(state);

        if listening {
            self.emit_status(SessionState::Running, None);
            info!("session running, listening for commands");
        } else {
            self.emit_status(
                SessionState::Initializing,
                Some(format!("recognition not started (compilation: {compilation:?})")),
            );
        }

        Ok(StartReport {
            compilation,
            listening,
        })
    }

    fn start_listening(
        &self,
        recognizer: &mut dyn SpeechRecognizer,
        actuator: &Arc<Actuator>,
        resources: &mut Resources,
    ) -> bool {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        let mut dispatcher = Dispatcher::new(self.config.confidence_floor)
            .with_diagnostics(Arc::clone(&self.diagnostics));
        if self.config.publish_transcripts {
            dispatcher = dispatcher.with_observer(TranscriptObserver {
                tx: self.transcript_tx.clone(),
                seq: Arc::clone(&self.seq),
            });
        }

        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);
        let ctx = DispatchContext {
            dispatcher,
            actuator: Arc::clone(actuator),
            events: events_rx,
            running: Arc::clone(&self.running),
        };
        resources.dispatcher_task = Some(tokio::task::spawn_blocking(move || dispatch::run(ctx)));

        match recognizer.start_continuous(events_tx) {
            Ok(()) => true,
            Err(e) => {
                // The sender was dropped with the failed call, so the
                // dispatcher sees a disconnected channel and exits.
                error!("failed to start continuous recognition: {e}");
                self.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Wait for the startup self-test to finish. Returns immediately if it
    /// already finished, was aborted, or the session never started.
    pub async fn join_self_test(&self) {
        let task = self.resources.lock().self_test_task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("self-test task failed: {e}");
                }
            }
        }
    }

    /// Stop recognition and release every resource.
    ///
    /// Returns `true` if this call performed the teardown, `false` if there
    /// was nothing to tear down.
    pub fn shutdown(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Uninitialized {
                *state = SessionState::Terminated;
                drop(state);
                self.emit_status(SessionState::Terminated, None);
                return false;
            }
            if !state.holds_resources() {
                return false;
            }
            *state = SessionState::ShuttingDown;
        }
        self.emit_status(SessionState::ShuttingDown, None);
        info!("session shutdown requested");

        self.running.store(false, Ordering::SeqCst);
        let resources = std::mem::take(&mut *self.resources.lock());

        if let Some(task) = resources.self_test_task {
            task.abort();
        }
        if let Some(mut recognizer) = resources.recognizer {
            recognizer.dispose();
        }
        if let Some(actuator) = resources.actuator {
            let released = actuator.release();
            info!(released, "GPIO pins released");
        }
        // The dispatcher exits on its own once the recognizer has dropped
        // the channel sender; its handle is simply detached.
        drop(resources.dispatcher_task);

        self.set_status(SessionState::Terminated, None);
        true
    }

    /// Current lifecycle state (snapshot).
    pub fn status(&self) -> SessionState {
        *self.state.lock()
    }

    /// Subscribe to transcripts of every successful recognition result.
    pub fn subscribe_transcripts(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.transcript_tx.subscribe()
    }

    /// Subscribe to lifecycle state changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of dispatcher counters.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_state: SessionState, detail: Option<String>) {
        *self.state.lock() = new_state;
        self.emit_status(new_state, detail);
    }

    /// Move to `to` only if the session is still in `from`.
    fn transition(&self, from: SessionState, to: SessionState, detail: Option<String>) {
        {
            let mut state = self.state.lock();
            if *state != from {
                return;
            }
            *state = to;
        }
        self.emit_status(to, detail);
    }

    fn emit_status(&self, state: SessionState, detail: Option<String>) {
        let _ = self.status_tx.send(SessionStatusEvent { state, detail });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Startup blink: both pins high, hold, both low.
pub async fn self_test(actuator: &Actuator, hold: Duration) {
    info!(hold_ms = hold.as_millis() as u64, "running self-test");
    for line in PinLine::ALL {
        actuator.set_pin(line, PinLevel::High);
    }
    tokio::time::sleep(hold).await;
    for line in PinLine::ALL {
        actuator.set_pin(line, PinLevel::Low);
    }
    info!("self-test complete");
}
