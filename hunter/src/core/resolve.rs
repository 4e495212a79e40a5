//! Deterministic building blocks of per-slot resolution.
//!
//! The window limits a scan to strictly better candidates in rank order, so a
//! slot never moves to an option ranked at or below its current placement.
//! The probing scan itself runs in [`crate::cycle`], against the portal.

use crate::core::priority::PriorityList;
use crate::core::types::{Action, OptionId, Rank, SlotId};

/// Candidates worth probing for a slot holding `held`.
///
/// A ranked holding limits the window to strictly better ranks. An empty slot
/// or an unlisted holding opens the whole list.
pub fn candidate_window<'a>(
    list: &'a PriorityList,
    held: Option<&OptionId>,
) -> &'a [OptionId] {
    let rank = held.map_or(Rank::Unranked, |option| list.rank(option));
    match rank {
        Rank::Ranked(r) => &list.options()[..r],
        Rank::Unranked => list.options(),
    }
}

/// Action that takes `slot` from `held` to an available `candidate`.
pub fn action_for(slot: &SlotId, held: Option<&OptionId>, candidate: &OptionId) -> Action {
    match held {
        Some(held) => Action::Replace {
            slot: slot.clone(),
            held: held.clone(),
            target: candidate.clone(),
        },
        None => Action::Register {
            slot: slot.clone(),
            option: candidate.clone(),
        },
    }
}
