//! Phrase grammar: the list constraints registered with the recognizer.
//!
//! Single-light commands accept eight phrasings each:
//!
//! ```text
//! {turn|switch} {on|off} [the] {red|green} light
//! {turn|switch} [the] {red|green} light {on|off}
//! ```
//!
//! Both-light commands accept four, with "turn" only:
//!
//! ```text
//! turn {on|off} both [the] lights
//! turn both [the] lights {on|off}
//! ```

use std::collections::HashMap;

use tracing::{error, info};

use crate::command::CommandTag;
use crate::error::{Result, SpeechGpioError};
use crate::recognizer::{CompilationStatus, SpeechRecognizer};

/// Accepted phrases for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseConstraint {
    phrases: Vec<String>,
    tag: CommandTag,
}

impl PhraseConstraint {
    /// # Errors
    /// `InvalidGrammar` if `phrases` is empty or contains a blank phrase.
    pub fn new(phrases: Vec<String>, tag: CommandTag) -> Result<Self> {
        if phrases.is_empty() {
            return Err(SpeechGpioError::InvalidGrammar(format!(
                "constraint {tag} has no phrases"
            )));
        }
        if phrases.iter().any(|p| p.trim().is_empty()) {
            return Err(SpeechGpioError::InvalidGrammar(format!(
                "constraint {tag} contains a blank phrase"
            )));
        }
        Ok(Self { phrases, tag })
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn tag(&self) -> CommandTag {
        self.tag
    }
}

fn light_phrases(color: &str, state: &str) -> Vec<String> {
    ["turn", "switch"]
        .into_iter()
        .flat_map(|verb| {
            [
                format!("{verb} {state} {color} light"),
                format!("{verb} {state} the {color} light"),
                format!("{verb} {color} light {state}"),
                format!("{verb} the {color} light {state}"),
            ]
        })
        .collect()
}

fn both_phrases(state: &str) -> Vec<String> {
    vec![
        format!("turn {state} both lights"),
        format!("turn {state} both the lights"),
        format!("turn both lights {state}"),
        format!("turn both the lights {state}"),
    ]
}

/// Phrases for `tag` in the built-in vocabulary.
pub fn phrases_for(tag: CommandTag) -> Vec<String> {
    match tag {
        CommandTag::RedOn => light_phrases("red", "on"),
        CommandTag::GreenOn => light_phrases("green", "on"),
        CommandTag::RedOff => light_phrases("red", "off"),
        CommandTag::GreenOff => light_phrases("green", "off"),
        CommandTag::BothOn => both_phrases("on"),
        CommandTag::BothOff => both_phrases("off"),
    }
}

/// The six built-in constraints, in `CommandTag::ALL` order.
pub fn build_constraints() -> Vec<PhraseConstraint> {
    CommandTag::ALL
        .into_iter()
        .map(|tag| PhraseConstraint {
            phrases: phrases_for(tag),
            tag,
        })
        .collect()
}

/// Reject grammars a recognizer could not compile unambiguously. Phrases
/// are compared case-folded.
pub fn validate(constraints: &[PhraseConstraint]) -> Result<()> {
    validate_with_case(constraints, false)
}

/// Like `validate`, but phrases that differ only by case are distinct when
/// `case_sensitive` is set.
pub fn validate_with_case(constraints: &[PhraseConstraint], case_sensitive: bool) -> Result<()> {
    if constraints.is_empty() {
        return Err(SpeechGpioError::InvalidGrammar("no constraints".into()));
    }

    let mut owners: HashMap<String, CommandTag> = HashMap::new();
    for constraint in constraints {
        if constraint.phrases.is_empty() {
            return Err(SpeechGpioError::InvalidGrammar(format!(
                "constraint {} has no phrases",
                constraint.tag
            )));
        }
        for phrase in &constraint.phrases {
            let key = if case_sensitive {
                phrase.trim().to_string()
            } else {
                phrase.trim().to_lowercase()
            };
            if key.is_empty() {
                return Err(SpeechGpioError::InvalidGrammar(format!(
                    "constraint {} contains a blank phrase",
                    constraint.tag
                )));
            }
            match owners.get(&key) {
                Some(&owner) if owner != constraint.tag => {
                    return Err(SpeechGpioError::InvalidGrammar(format!(
                        "phrase {phrase:?} is claimed by both {owner} and {}",
                        constraint.tag
                    )));
                }
                _ => {
                    owners.insert(key, constraint.tag);
                }
            }
        }
    }
    Ok(())
}

/// Register `constraints` with `recognizer` and compile them.
///
/// Does not start recognition; the caller decides what to do with the
/// returned status. A non-success status is logged here.
pub fn configure(
    recognizer: &mut dyn SpeechRecognizer,
    constraints: &[PhraseConstraint],
) -> Result<CompilationStatus> {
    for constraint in constraints {
        recognizer.add_constraint(constraint);
    }

    let status = recognizer.compile_constraints()?;
    if status.is_success() {
        info!(constraints = constraints.len(), "grammar compiled");
    } else {
        error!(?status, "grammar compilation failed, recognition will not start");
    }
    Ok(status)
}
