//! Per-slot preference lists and their load-time invariants.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::core::types::{Bindings, OptionId, Rank, SlotId};

/// Configuration error raised while building a [`PriorityTable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriorityError {
    #[error("priority table is empty")]
    EmptyTable,
    #[error("slot id must not be blank")]
    BlankSlot,
    #[error("slot '{slot}': priority list is empty")]
    EmptyList { slot: SlotId },
    #[error("slot '{slot}': option id must not be blank")]
    BlankOption { slot: SlotId },
    #[error("slot '{slot}': duplicate option '{option}'")]
    DuplicateOption { slot: SlotId, option: OptionId },
    #[error("slot '{slot}' is defined more than once")]
    DuplicateSlot { slot: SlotId },
    #[error("line {line}: expected CODE:SLOT, got '{text}'")]
    MalformedLine { line: usize, text: String },
    #[error("line {line}: option '{option}' is already listed for slot '{slot}'")]
    DuplicateLine {
        line: usize,
        slot: SlotId,
        option: OptionId,
    },
}

/// Ordered candidates for one slot; rank is the position (0 = best).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityList {
    options: Vec<OptionId>,
}

impl PriorityList {
    /// Build a list, rejecting blank and duplicate options.
    pub fn new(slot: &SlotId, options: Vec<OptionId>) -> Result<Self, PriorityError> {
        if options.is_empty() {
            return Err(PriorityError::EmptyList { slot: slot.clone() });
        }
        let mut seen = HashSet::new();
        for option in &options {
            if option.as_str().trim().is_empty() {
                return Err(PriorityError::BlankOption { slot: slot.clone() });
            }
            if !seen.insert(option) {
                return Err(PriorityError::DuplicateOption {
                    slot: slot.clone(),
                    option: option.clone(),
                });
            }
        }
        Ok(Self { options })
    }

    pub fn rank(&self, option: &OptionId) -> Rank {
        self.options
            .iter()
            .position(|candidate| candidate == option)
            .map_or(Rank::Unranked, Rank::Ranked)
    }

    pub fn best(&self) -> &OptionId {
        // Non-empty by construction.
        &self.options[0]
    }

    pub fn options(&self) -> &[OptionId] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// Immutable slot -> preference mapping, loaded once per run.
///
/// Iteration order is by slot id so cycles process slots deterministically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTable {
    slots: BTreeMap<SlotId, PriorityList>,
}

impl PriorityTable {
    /// Build a table from `(slot, ranked options)` entries.
    pub fn from_entries<I>(entries: I) -> Result<Self, PriorityError>
    where
        I: IntoIterator<Item = (SlotId, Vec<OptionId>)>,
    {
        let mut slots = BTreeMap::new();
        for (slot, options) in entries {
            if slot.as_str().trim().is_empty() {
                return Err(PriorityError::BlankSlot);
            }
            let list = PriorityList::new(&slot, options)?;
            if slots.contains_key(&slot) {
                return Err(PriorityError::DuplicateSlot { slot });
            }
            slots.insert(slot, list);
        }
        if slots.is_empty() {
            return Err(PriorityError::EmptyTable);
        }
        Ok(Self { slots })
    }

    pub fn get(&self, slot: &SlotId) -> Option<&PriorityList> {
        self.slots.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotId, &PriorityList)> {
        self.slots.iter()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn option_count(&self) -> usize {
        self.slots.values().map(PriorityList::len).sum()
    }

    /// Rank of whatever `bindings` holds for `slot`.
    pub fn rank_of(&self, slot: &SlotId, bindings: &Bindings) -> Rank {
        match (self.slots.get(slot), bindings.get(slot)) {
            (Some(list), Some(held)) => list.rank(held),
            _ => Rank::Unranked,
        }
    }

    /// True when every slot holds its rank-0 option.
    pub fn all_best(&self, bindings: &Bindings) -> bool {
        self.slots
            .iter()
            .all(|(slot, list)| bindings.get(slot) == Some(list.best()))
    }
}

/// Parse the `CODE:SLOT` course list format into ranked entries.
///
/// Blank lines are skipped. Within a slot, rank follows line order. Slots are
/// returned in order of first appearance. A code repeated within one slot is
/// rejected with the line number of the repeat.
pub fn parse_course_lines(text: &str) -> Result<Vec<(SlotId, Vec<OptionId>)>, PriorityError> {
    let mut entries: Vec<(SlotId, Vec<OptionId>)> = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = || PriorityError::MalformedLine {
            line: idx + 1,
            text: line.to_string(),
        };
        let (code, slot) = line.split_once(':').ok_or_else(malformed)?;
        let (code, slot) = (code.trim(), slot.trim());
        if code.is_empty() || slot.is_empty() {
            return Err(malformed());
        }

        let slot = SlotId::new(slot);
        let option = OptionId::new(code);
        match entries.iter_mut().find(|(existing, _)| *existing == slot) {
            Some((_, options)) if options.contains(&option) => {
                return Err(PriorityError::DuplicateLine {
                    line: idx + 1,
                    slot,
                    option,
                });
            }
            Some((_, options)) => options.push(option),
            None => entries.push((slot, vec![option])),
        }
    }
    Ok(entries)
}
