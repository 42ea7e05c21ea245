//! Observer events published by a running session.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them to a UI or log them as JSON lines.

pub mod events;
