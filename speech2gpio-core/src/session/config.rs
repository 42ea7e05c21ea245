//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::dispatch::MIN_CONFIDENCE_FLOOR;
use crate::error::{Result, SpeechGpioError};
use crate::recognizer::Confidence;

/// Upper bound for the self-test hold, in milliseconds.
const MAX_SELF_TEST_HOLD_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SessionConfig {
    /// Hardware number of the red LED pin. Default: 5.
    pub red_pin: u32,
    /// Hardware number of the green LED pin. Default: 27.
    pub green_pin: u32,
    /// How long both pins stay high during the startup self-test.
    /// Default: 1000.
    pub self_test_hold_ms: u64,
    /// Minimum confidence for a result to actuate. `Low` and `Rejected` are
    /// raised to `Medium`. Default: `Medium`.
    pub confidence_floor: Confidence,
    /// Publish every successful transcript to observers, including ones the
    /// confidence gate then drops. Default: true.
    pub publish_transcripts: bool,
    /// Match phrases exactly instead of case-folded. Only consulted by
    /// recognizers that do their own matching. Default: false.
    pub case_sensitive_phrases: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            red_pin: 5,
            green_pin: 27,
            self_test_hold_ms: 1_000,
            confidence_floor: Confidence::Medium,
            publish_transcripts: true,
            case_sensitive_phrases: false,
        }
    }
}

impl SessionConfig {
    pub fn normalize(&mut self) {
        self.self_test_hold_ms = self.self_test_hold_ms.min(MAX_SELF_TEST_HOLD_MS);
        self.confidence_floor = self.confidence_floor.max(MIN_CONFIDENCE_FLOOR);
    }

    /// # Errors
    /// `InvalidConfig` if both lines are mapped to the same pin.
    pub fn validate(&self) -> Result<()> {
        if self.red_pin == self.green_pin {
            return Err(SpeechGpioError::InvalidConfig(format!(
                "red and green both use pin {}",
                self.red_pin
            )));
        }
        Ok(())
    }

    /// Parse from JSON, filling missing fields with defaults, then normalize.
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(raw)
            .map_err(|e| SpeechGpioError::InvalidConfig(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = SessionConfig::from_json("{}").expect("parse");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn fields_use_camel_case() {
        let config = SessionConfig::from_json(
            r#"{"redPin": 17, "greenPin": 22, "selfTestHoldMs": 250, "confidenceFloor": "high"}"#,
        )
        .expect("parse");
        assert_eq!(config.red_pin, 17);
        assert_eq!(config.green_pin, 22);
        assert_eq!(config.self_test_hold_ms, 250);
        assert_eq!(config.confidence_floor, Confidence::High);
    }

    #[test]
    fn normalize_clamps_floor_and_hold() {
        let mut config = SessionConfig {
            confidence_floor: Confidence::Low,
            self_test_hold_ms: 60_000,
            ..SessionConfig::default()
        };
        config.normalize();
        assert_eq!(config.confidence_floor, Confidence::Medium);
        assert_eq!(config.self_test_hold_ms, MAX_SELF_TEST_HOLD_MS);
    }

    #[test]
    fn shared_pin_is_rejected() {
        let err = SessionConfig::from_json(r#"{"redPin": 4, "greenPin": 4}"#)
            .expect_err("same pin twice");
        assert!(matches!(err, SpeechGpioError::InvalidConfig(_)));
    }
}
