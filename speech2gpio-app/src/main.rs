//! speech2gpio host.
//!
//! Runs a session against `SimulatedGpio` with a `TextRecognizer`: every
//! line typed on stdin is treated as a recognised utterance. Ctrl-C or EOF
//! tears the session down.

mod settings;

use anyhow::Context;
use speech2gpio_core::gpio::SimulatedGpio;
use speech2gpio_core::recognizer::TextRecognizer;
use speech2gpio_core::Session;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::settings::{load_settings, settings_path};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("speech2gpio=info")),
        )
        .init();

    info!("speech2gpio starting");

    let path = settings_path();
    let config = load_settings(&path);
    info!(
        settings_path = ?path,
        red_pin = config.red_pin,
        green_pin = config.green_pin,
        self_test_hold_ms = config.self_test_hold_ms,
        confidence_floor = ?config.confidence_floor,
        "session settings loaded"
    );

    // ── Session setup ─────────────────────────────────────────────────────
    let gpio = SimulatedGpio::new();
    let (recognizer, input) = TextRecognizer::new(config.case_sensitive_phrases);
    let session = Session::new(config.clone());

    forward_observer_events(&session);

    let report = session
        .start(&gpio, Box::new(recognizer))
        .context("failed to start session")?;
    if !report.listening {
        warn!(
            compilation = ?report.compilation,
            "recognition is not running; commands will be ignored"
        );
    }

    // ── Input loop ────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("failed to read stdin")? {
                Some(line) => {
                    input.submit(&line);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────
    session.shutdown();
    let stats = session.diagnostics_snapshot();
    info!(
        events = stats.events_in,
        accepted = stats.accepted,
        dropped_low_confidence = stats.dropped_low_confidence,
        writes_applied = stats.writes_applied,
        red = ?gpio.level(config.red_pin),
        green = ?gpio.level(config.green_pin),
        "speech2gpio stopped"
    );
    let json = serde_json::json!({
        "eventsIn": stats.events_in,
        "accepted": stats.accepted,
        "writesApplied": stats.writes_applied,
        "writesFailed": stats.writes_failed,
    });
    println!("{json}");
    Ok(())
}

/// Log transcripts and state changes as they are published.
fn forward_observer_events(session: &Session) {
    let mut transcripts = session.subscribe_transcripts();
    tokio::spawn(async move {
        loop {
            match transcripts.recv().await {
                Ok(ev) => info!(
                    seq = ev.seq,
                    transcript = %ev.transcript,
                    confidence = ?ev.confidence,
                    "heard"
                ),
                Err(RecvError::Lagged(n)) => warn!("transcript observer lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut status = session.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status.recv().await {
                Ok(ev) => info!(state = ?ev.state, detail = ?ev.detail, "session state changed"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}
