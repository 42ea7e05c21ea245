//! Command tags and the tag → pin action table.
//!
//! | Tag | Actions |
//! |-----|---------|
//! | `RedOn` | red high |
//! | `GreenOn` | green high |
//! | `RedOff` | red low |
//! | `GreenOff` | green low |
//! | `BothOn` | green high, red high |
//! | `BothOff` | green low, red low |
//!
//! Two-pin commands always write green first.

use serde::{Deserialize, Serialize};

use crate::gpio::{PinLevel, PinLine};

/// Semantic command attached to a grammar constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandTag {
    RedOn,
    GreenOn,
    RedOff,
    GreenOff,
    BothOn,
    BothOff,
}

impl CommandTag {
    pub const ALL: [CommandTag; 6] = [
        CommandTag::RedOn,
        CommandTag::GreenOn,
        CommandTag::RedOff,
        CommandTag::GreenOff,
        CommandTag::BothOn,
        CommandTag::BothOff,
    ];

    /// Tag string registered with the recognizer and reported back on a match.
    pub fn wire_name(self) -> &'static str {
        match self {
            CommandTag::RedOn => "RED_ON",
            CommandTag::GreenOn => "GREEN_ON",
            CommandTag::RedOff => "RED_OFF",
            CommandTag::GreenOff => "GREEN_OFF",
            CommandTag::BothOn => "BOTH_ON",
            CommandTag::BothOff => "BOTH_OFF",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.wire_name() == name)
    }
}

impl std::fmt::Display for CommandTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One pin write.
pub type PinAction = (PinLine, PinLevel);

/// Ordered pin writes for a command. At most two entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSet {
    actions: [Option<PinAction>; 2],
}

impl ActionSet {
    const fn one(line: PinLine, level: PinLevel) -> Self {
        Self {
            actions: [Some((line, level)), None],
        }
    }

    /// Green first, then red.
    const fn both(level: PinLevel) -> Self {
        Self {
            actions: [Some((PinLine::Green, level)), Some((PinLine::Red, level))],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = PinAction> + '_ {
        self.actions.iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.actions[0].is_none()
    }

    pub fn to_vec(&self) -> Vec<PinAction> {
        self.iter().collect()
    }
}

/// Actions for `tag`. Total over the enum.
pub const fn actions_for(tag: CommandTag) -> ActionSet {
    match tag {
        CommandTag::RedOn => ActionSet::one(PinLine::Red, PinLevel::High),
        CommandTag::GreenOn => ActionSet::one(PinLine::Green, PinLevel::High),
        CommandTag::RedOff => ActionSet::one(PinLine::Red, PinLevel::Low),
        CommandTag::GreenOff => ActionSet::one(PinLine::Green, PinLevel::Low),
        CommandTag::BothOn => ActionSet::both(PinLevel::High),
        CommandTag::BothOff => ActionSet::both(PinLevel::Low),
    }
}

/// Read-only lookup keyed by the recognizer's tag string.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTable;

impl CommandTable {
    pub fn lookup(&self, wire_tag: &str) -> Option<(CommandTag, ActionSet)> {
        CommandTag::from_wire_name(wire_tag).map(|tag| (tag, actions_for(tag)))
    }
}
