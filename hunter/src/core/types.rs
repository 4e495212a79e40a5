//! Shared deterministic types for the resolution engine.
//!
//! These types define the contracts between the engine, the executor and the
//! poll loop. They carry no I/O and compare by value so decisions are stable
//! across runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a registration time-slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlotId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque identifier for a registrable option (e.g. a course code).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(String);

impl OptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OptionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One cycle's view of what is held per slot.
///
/// Slots missing from the map hold nothing. Rebuilt from the portal every
/// cycle and never carried over.
pub type Bindings = BTreeMap<SlotId, OptionId>;

/// Position of an option within its slot's priority list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    /// Index in the list; 0 is most preferred.
    Ranked(usize),
    /// Not listed, or nothing held.
    Unranked,
}

/// Point-in-time seat availability for one `(slot, option)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
    /// The probe could not read state. Never acted on.
    Unknown,
}

/// A single portal write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "write", rename_all = "lowercase")]
pub enum Write {
    Register { slot: SlotId, option: OptionId },
    Drop { slot: SlotId, option: OptionId },
}

impl Write {
    pub fn slot(&self) -> &SlotId {
        match self {
            Write::Register { slot, .. } | Write::Drop { slot, .. } => slot,
        }
    }

    pub fn option(&self) -> &OptionId {
        match self {
            Write::Register { option, .. } | Write::Drop { option, .. } => option,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Write::Register { .. } => "register",
            Write::Drop { .. } => "drop",
        }
    }
}

/// The engine's decision for one slot in one cycle.
///
/// `Replace` is the upgrade transaction: drop the held option, then register
/// the target. The two writes are issued in that order and never together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    None,
    Register {
        slot: SlotId,
        option: OptionId,
    },
    Drop {
        slot: SlotId,
        option: OptionId,
    },
    Replace {
        slot: SlotId,
        held: OptionId,
        target: OptionId,
    },
}

impl Action {
    /// Writes this action issues, in order.
    pub fn writes(&self) -> Vec<Write> {
        match self {
            Action::None => Vec::new(),
            Action::Register { slot, option } => vec![Write::Register {
                slot: slot.clone(),
                option: option.clone(),
            }],
            Action::Drop { slot, option } => vec![Write::Drop {
                slot: slot.clone(),
                option: option.clone(),
            }],
            Action::Replace { slot, held, target } => vec![
                Write::Drop {
                    slot: slot.clone(),
                    option: held.clone(),
                },
                Write::Register {
                    slot: slot.clone(),
                    option: target.clone(),
                },
            ],
        }
    }

    /// Option this action ends up holding, if it registers one.
    pub fn target(&self) -> Option<&OptionId> {
        match self {
            Action::Register { option, .. } => Some(option),
            Action::Replace { target, .. } => Some(target),
            Action::None | Action::Drop { .. } => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Action::None)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::None => f.write_str("none"),
            Action::Register { slot, option } => write!(f, "register {option} in {slot}"),
            Action::Drop { slot, option } => write!(f, "drop {option} from {slot}"),
            Action::Replace { slot, held, target } => {
                write!(f, "replace {held} with {target} in {slot}")
            }
        }
    }
}
