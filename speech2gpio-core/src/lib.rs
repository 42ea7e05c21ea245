//! # speech2gpio-core
//!
//! Voice command to GPIO dispatch engine.
//!
//! ## Architecture
//!
//! ```text
//! Grammar ─► SpeechRecognizer ─► crossbeam channel ─► dispatch::run (spawn_blocking)
//!                                                          │
//!                                                 status / confidence / tag gates
//!                                                          │
//!                                                    CommandTable lookup
//!                                                          │
//! self-test task (tokio) ──────────────────────────► Actuator (one write lock)
//!                                                          │
//!                                                     PinRegistry ─► GPIO
//! ```
//!
//! `Session` owns every resource and releases each exactly once.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod actuator;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod gpio;
pub mod grammar;
pub mod ipc;
pub mod recognizer;
pub mod session;

// Convenience re-exports for downstream crates
pub use actuator::{Actuator, WriteOutcome};
pub use command::{actions_for, ActionSet, CommandTable, CommandTag};
pub use dispatch::{Decision, Dispatcher, DropReason};
pub use error::SpeechGpioError;
pub use gpio::{GpioController, OutputPin, PinLevel, PinLine, SimulatedGpio};
pub use grammar::PhraseConstraint;
pub use ipc::events::{SessionState, SessionStatusEvent, TranscriptEvent};
pub use recognizer::{
    Confidence, RecognitionEvent, RecognitionResult, RecognitionStatus, SpeechRecognizer,
};
pub use session::{Session, SessionConfig, StartReport};
