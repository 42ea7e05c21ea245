use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use speech2gpio_core::gpio::{PinWrite, SimulatedGpio};
use speech2gpio_core::recognizer::{ScriptedFeed, ScriptedRecognizer, TextRecognizer};
use speech2gpio_core::{
    Confidence, GpioController, OutputPin, PinLevel, RecognitionEvent, RecognitionResult, RecognitionStatus, Session,
    SessionConfig, SessionState, SpeechGpioError,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

const RED: u32 = 5;
const GREEN: u32 = 27;

fn config(hold_ms: u64) -> SessionConfig {
    SessionConfig {
        self_test_hold_ms: hold_ms,
        ..SessionConfig::default()
    }
}

fn command(transcript: &str, confidence: Confidence, tag: &str) -> RecognitionEvent {
    RecognitionEvent::new(RecognitionResult::success(transcript, confidence, Some(tag)))
}

/// Start a session whose self-test has already finished and been cleared
/// from the journal.
async fn started_session(gpio: &SimulatedGpio) -> (Session, ScriptedFeed) {
    let (recognizer, feed) = ScriptedRecognizer::new();
    let session = Session::new(config(0));
    let report = session
        .start(gpio, Box::new(recognizer))
        .expect("session start");
    assert!(report.listening);
    session.join_self_test().await;
    gpio.clear_writes();
    (session, feed)
}

async fn wait_for_events(session: &Session, count: usize) {
    let start = Instant::now();
    while session.diagnostics_snapshot().events_in < count {
        if start.elapsed() >= Duration::from_secs(5) {
            panic!(
                "timed out waiting for {count} events, saw {}",
                session.diagnostics_snapshot().events_in
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn drain_states(rx: &mut broadcast::Receiver<speech2gpio_core::SessionStatusEvent>) -> Vec<SessionState> {
    let mut states = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => states.push(ev.state),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return states,
        }
    }
}

/// True if `observed` is some interleaving of `a` and `b` that keeps each
/// one's internal order.
fn is_interleaving(observed: &[PinLevel], a: &[PinLevel], b: &[PinLevel]) -> bool {
    if observed.len() != a.len() + b.len() {
        return false;
    }
    // reachable[j] after processing i elements of `a`: prefix of length i + j
    // is an interleaving of a[..i] and b[..j].
    let mut reachable = vec![false; b.len() + 1];
    reachable[0] = true;
    for j in 1..=b.len() {
        reachable[j] = reachable[j - 1] && observed[j - 1] == b[j - 1];
    }
    for i in 1..=a.len() {
        reachable[0] = reachable[0] && observed[i - 1] == a[i - 1];
        for j in 1..=b.len() {
            let from_a = reachable[j] && observed[i + j - 1] == a[i - 1];
            let from_b = reachable[j - 1] && observed[i + j - 1] == b[j - 1];
            reachable[j] = from_a || from_b;
        }
    }
    reachable[b.len()]
}

#[tokio::test]
async fn self_test_blinks_both_pins() {
    let gpio = SimulatedGpio::new();
    let (recognizer, _feed) = ScriptedRecognizer::new();
    let session = Session::new(config(20));

    session
        .start(&gpio, Box::new(recognizer))
        .expect("session start");
    session.join_self_test().await;

    assert_eq!(
        gpio.writes(),
        vec![
            PinWrite { pin: RED, level: PinLevel::High },
            PinWrite { pin: GREEN, level: PinLevel::High },
            PinWrite { pin: RED, level: PinLevel::Low },
            PinWrite { pin: GREEN, level: PinLevel::Low },
        ]
    );
}

#[tokio::test]
async fn both_on_writes_green_then_red() {
    let gpio = SimulatedGpio::new();
    let (session, feed) = started_session(&gpio).await;

    assert!(feed.push(command("Turn on both lights", Confidence::High, "BOTH_ON")));
    wait_for_events(&session, 1).await;

    assert_eq!(
        gpio.writes(),
        vec![
            PinWrite { pin: GREEN, level: PinLevel::High },
            PinWrite { pin: RED, level: PinLevel::High },
        ]
    );
}

#[tokio::test]
async fn low_confidence_green_off_writes_nothing() {
    let gpio = SimulatedGpio::new();
    let (session, feed) = started_session(&gpio).await;
    let mut transcripts = session.subscribe_transcripts();

    feed.push(command("turn off green light", Confidence::Low, "GREEN_OFF"));
    wait_for_events(&session, 1).await;

    assert!(gpio.writes().is_empty());
    assert_eq!(session.diagnostics_snapshot().dropped_low_confidence, 1);

    // The transcript is still surfaced to observers.
    let published = transcripts.try_recv().expect("transcript published");
    assert_eq!(published.transcript, "turn off green light");
    assert_eq!(published.confidence, Confidence::Low);
}

#[tokio::test]
async fn failed_status_never_writes() {
    let gpio = SimulatedGpio::new();
    let (session, feed) = started_session(&gpio).await;

    for status in [
        RecognitionStatus::AudioQualityFailure,
        RecognitionStatus::UserCanceled,
        RecognitionStatus::MicrophoneUnavailable,
    ] {
        feed.push(RecognitionResult {
            status,
            transcript: "turn on red light".into(),
            confidence: Confidence::High,
            matched_tag: Some("RED_ON".into()),
        });
    }
    feed.push(RecognitionEvent::empty());
    wait_for_events(&session, 4).await;

    assert!(gpio.writes().is_empty());
    let stats = session.diagnostics_snapshot();
    assert_eq!(stats.dropped_status, 3);
    assert_eq!(stats.dropped_no_result, 1);
}

#[tokio::test]
async fn red_off_at_medium_confidence_writes_red_low_once() {
    let gpio = SimulatedGpio::new();
    let (session, feed) = started_session(&gpio).await;

    feed.push(command("switch the red light off", Confidence::Medium, "RED_OFF"));
    wait_for_events(&session, 1).await;

    assert_eq!(gpio.writes(), vec![PinWrite { pin: RED, level: PinLevel::Low }]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn self_test_and_dispatch_serialize_pin_writes() {
    const COMMANDS: usize = 20;

    let gpio = SimulatedGpio::new().with_write_latency(Duration::from_millis(1));
    let (recognizer, feed) = ScriptedRecognizer::new();
    let session = Session::new(config(30));

    session
        .start(&gpio, Box::new(recognizer))
        .expect("session start");
    for i in 0..COMMANDS {
        let (text, tag) = if i % 2 == 0 {
            ("turn on both lights", "BOTH_ON")
        } else {
            ("turn off both lights", "BOTH_OFF")
        };
        feed.push(command(text, Confidence::High, tag));
    }

    session.join_self_test().await;
    wait_for_events(&session, COMMANDS).await;

    assert_eq!(gpio.overlapping_writes(), 0, "a write started inside another");

    let self_test = [PinLevel::High, PinLevel::Low];
    let commands: Vec<PinLevel> = (0..COMMANDS)
        .map(|i| PinLevel::from(i % 2 == 0))
        .collect();
    for pin in [RED, GREEN] {
        let observed = gpio.writes_for(pin);
        assert!(
            is_interleaving(&observed, &self_test, &commands),
            "pin {pin} saw {observed:?}"
        );
    }
}

#[tokio::test]
async fn shutdown_releases_everything_exactly_once() {
    let gpio = SimulatedGpio::new();
    let (session, feed) = started_session(&gpio).await;
    let mut status = session.subscribe_status();

    assert!(session.shutdown());
    assert!(!session.shutdown());

    assert_eq!(session.status(), SessionState::Terminated);
    assert_eq!(gpio.release_count(RED), 1);
    assert_eq!(gpio.release_count(GREEN), 1);
    assert_eq!(feed.dispose_count(), 1);
    assert_eq!(
        drain_states(&mut status),
        vec![SessionState::ShuttingDown, SessionState::Terminated]
    );

    // Events after teardown go nowhere.
    assert!(!feed.push(command("turn on red light", Confidence::High, "RED_ON")));
    assert!(gpio.writes().is_empty());

    drop(session);
    assert_eq!(gpio.release_count(RED), 1);
    assert_eq!(feed.dispose_count(), 1);
}

#[tokio::test]
async fn shutdown_during_self_test_cancels_the_blink() {
    let gpio = SimulatedGpio::new();
    let (recognizer, _feed) = ScriptedRecognizer::new();
    let session = Session::new(config(5_000));

    session
        .start(&gpio, Box::new(recognizer))
        .expect("session start");
    // Let the self-test raise both pins and enter its hold.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(session.shutdown());
    session.join_self_test().await;

    assert_eq!(gpio.writes_for(RED), vec![PinLevel::High]);
    assert!(!gpio.is_open(RED));
    assert!(!gpio.is_open(GREEN));
}

#[tokio::test]
async fn compile_failure_fails_closed_but_still_self_tests() {
    let gpio = SimulatedGpio::new();
    let (recognizer, feed) = ScriptedRecognizer::new();
    let recognizer = recognizer.with_compile_status(RecognitionStatus::GrammarCompilationFailure);
    let session = Session::new(config(0));

    let report = session
        .start(&gpio, Box::new(recognizer))
        .expect("compile failure is not fatal");
    assert_eq!(report.compilation, RecognitionStatus::GrammarCompilationFailure);
    assert!(!report.listening);
    assert_eq!(session.status(), SessionState::Initializing);
    assert!(!feed.is_started());
    assert_eq!(feed.registered_constraints().len(), 6);

    session.join_self_test().await;
    assert_eq!(gpio.writes().len(), 4);

    // Nothing consumes commands.
    feed.push(command("turn on red light", Confidence::High, "RED_ON"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gpio.writes().len(), 4);
    assert_eq!(session.diagnostics_snapshot().events_in, 0);

    assert!(session.shutdown());
    assert_eq!(feed.dispose_count(), 1);
    assert_eq!(gpio.release_count(GREEN), 1);
}

#[tokio::test]
async fn gpio_failure_terminates_and_disposes_recognizer() {
    let gpio = SimulatedGpio::new();
    gpio.mark_unavailable(GREEN);
    let (recognizer, feed) = ScriptedRecognizer::new();
    let session = Session::new(config(0));

    let err = session
        .start(&gpio, Box::new(recognizer))
        .expect_err("green pin is unavailable");
    assert!(matches!(err, SpeechGpioError::PinUnavailable { pin: GREEN }));
    assert_eq!(session.status(), SessionState::Terminated);
    assert_eq!(feed.dispose_count(), 1);
    assert_eq!(gpio.release_count(RED), 1);
    assert!(gpio.writes().is_empty());

    assert!(!session.shutdown());
    assert_eq!(feed.dispose_count(), 1);
}

#[tokio::test]
async fn second_start_is_rejected() {
    let gpio = SimulatedGpio::new();
    let (session, _feed) = started_session(&gpio).await;
    let (again, again_feed) = ScriptedRecognizer::new();

    assert!(matches!(
        session.start(&gpio, Box::new(again)),
        Err(SpeechGpioError::AlreadyStarted)
    ));
    assert_eq!(again_feed.dispose_count(), 1);
    assert_eq!(session.status(), SessionState::Running);
}

#[tokio::test]
async fn invalid_config_disposes_recognizer() {
    let gpio = SimulatedGpio::new();
    let (recognizer, feed) = ScriptedRecognizer::new();
    let session = Session::new(SessionConfig {
        red_pin: 4,
        green_pin: 4,
        ..config(0)
    });

    let err = session
        .start(&gpio, Box::new(recognizer))
        .expect_err("both lines share pin 4");
    assert!(matches!(err, SpeechGpioError::InvalidConfig(_)));
    assert_eq!(feed.dispose_count(), 1);
    assert_eq!(session.status(), SessionState::Uninitialized);
    assert!(!gpio.is_open(4));
}

#[test]
fn new_session_normalizes_config() {
    let session = Session::new(SessionConfig {
        self_test_hold_ms: 60_000,
        confidence_floor: Confidence::Rejected,
        ..SessionConfig::default()
    });
    assert_eq!(session.config().self_test_hold_ms, 10_000);
    assert_eq!(session.config().confidence_floor, Confidence::Medium);
}

/// Wraps `SimulatedGpio` and parks inside `open_pin(gate_pin)` until the
/// test lets it continue.
struct GatedGpio {
    inner: SimulatedGpio,
    gate_pin: u32,
    entered: Arc<Barrier>,
    proceed: Arc<Barrier>,
}

impl GpioController for GatedGpio {
    fn open_pin(&self, pin: u32) -> speech2gpio_core::error::Result<Box<dyn OutputPin>> {
        if pin == self.gate_pin {
            self.entered.wait();
            self.proceed.wait();
        }
        self.inner.open_pin(pin)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_while_opening_pins_wins_over_start() {
    let gpio = SimulatedGpio::new();
    let entered = Arc::new(Barrier::new(2));
    let proceed = Arc::new(Barrier::new(2));
    let gated = GatedGpio {
        inner: gpio.clone(),
        gate_pin: RED,
        entered: Arc::clone(&entered),
        proceed: Arc::clone(&proceed),
    };
    let (recognizer, feed) = ScriptedRecognizer::new();
    let session = Arc::new(Session::new(config(0)));

    let starter = {
        let session = Arc::clone(&session);
        tokio::task::spawn_blocking(move || session.start(&gated, Box::new(recognizer)))
    };

    tokio::task::block_in_place(|| entered.wait());
    assert!(session.shutdown());
    assert_eq!(session.status(), SessionState::Terminated);
    tokio::task::block_in_place(|| proceed.wait());

    let result = starter.await.expect("start task");
    assert!(matches!(result, Err(SpeechGpioError::ShutDownDuringStart)));
    assert_eq!(session.status(), SessionState::Terminated);
    assert_eq!(feed.dispose_count(), 1);
    assert!(!feed.is_started());
    for pin in [RED, GREEN] {
        assert!(!gpio.is_open(pin));
        assert_eq!(gpio.release_count(pin), 1);
    }
    assert!(gpio.writes().is_empty());

    assert!(!session.shutdown());
    assert_eq!(feed.dispose_count(), 1);
}

#[tokio::test]
async fn text_recognizer_drives_pins_end_to_end() {
    let gpio = SimulatedGpio::new();
    let (recognizer, input) = TextRecognizer::new(false);
    let session = Session::new(config(0));

    session
        .start(&gpio, Box::new(recognizer))
        .expect("session start");
    session.join_self_test().await;
    gpio.clear_writes();

    assert!(input.submit("Turn the green light on"));
    assert!(input.submit("make me a sandwich"));
    assert!(input.submit("turn both the lights off!"));
    wait_for_events(&session, 3).await;

    assert_eq!(
        gpio.writes(),
        vec![
            PinWrite { pin: GREEN, level: PinLevel::High },
            PinWrite { pin: GREEN, level: PinLevel::Low },
            PinWrite { pin: RED, level: PinLevel::Low },
        ]
    );
    assert_eq!(session.diagnostics_snapshot().dropped_low_confidence, 1);

    session.shutdown();
    assert!(!input.submit("turn on red light"));
}
