//! Orchestration for a single poll cycle.
//!
//! A cycle refreshes the bindings snapshot, resolves every slot in the
//! priority table, then executes the resulting actions one after another.
//! Nothing observed in one cycle is reused by the next.

use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::core::priority::{PriorityList, PriorityTable};
use crate::core::resolve::{action_for, candidate_window};
use crate::core::types::{Action, Availability, Bindings, OptionId, Rank, SlotId};
use crate::executor::{ActionExecutor, ActionOutcome, ActionReport};
use crate::io::portal::{Portal, ReadError, SessionLost, probe_availability};

/// Cooperative delays that bound load on the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Minimum delay between cycles.
    pub cycle: Duration,
    /// Delay between consecutive availability probes.
    pub probe: Duration,
    /// Delay between attempts of a transiently failing write.
    pub retry: Duration,
}

/// The engine's decision for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDecision {
    pub slot: SlotId,
    pub held: Option<OptionId>,
    pub rank: Rank,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// Bindings were read and every slot was resolved.
    Completed,
    /// Bindings could not be read; nothing was attempted.
    Aborted { reason: String },
    /// The portal session ended. The report holds whatever the cycle did
    /// before that, and no further cycle can run.
    SessionLost { reason: String },
}

/// Everything one cycle observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-indexed cycle number within the run.
    pub cycle: u64,
    pub status: CycleStatus,
    /// Bindings as read at the start of the cycle.
    pub bindings: Bindings,
    pub decisions: Vec<SlotDecision>,
    pub actions: Vec<ActionReport>,
    /// Every probe this cycle failed to read state.
    pub degraded: bool,
}

impl CycleReport {
    fn unread(cycle: u64, status: CycleStatus) -> Self {
        Self {
            cycle,
            status,
            bindings: Bindings::new(),
            decisions: Vec::new(),
            actions: Vec::new(),
            degraded: false,
        }
    }

    pub fn committed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ActionOutcome::Committed))
    }

    /// The fatal error that ended this cycle, if any.
    pub fn session_lost(&self) -> Option<SessionLost> {
        match &self.status {
            CycleStatus::SessionLost { reason } => Some(SessionLost::new(reason.clone())),
            _ => None,
        }
    }

    fn count(&self, pred: impl Fn(&ActionOutcome) -> bool) -> usize {
        self.actions
            .iter()
            .filter(|report| pred(&report.outcome))
            .count()
    }
}

/// Probes issued during one cycle, paced against each other.
#[derive(Debug, Default)]
struct ProbeTally {
    issued: usize,
    unknown: usize,
}

/// Run one full cycle: refresh, resolve all slots, execute.
///
/// A failed binding read aborts the cycle without touching the portal
/// further. A lost session stops the cycle where it happened; the returned
/// report then carries [`CycleStatus::SessionLost`] along with every decision
/// and write attempt made up to that point.
#[instrument(skip_all, fields(cycle = cycle))]
pub async fn run_cycle<P: Portal + ?Sized>(
    portal: &mut P,
    table: &PriorityTable,
    pacing: &Pacing,
    cycle: u64,
) -> CycleReport {
    let bindings = match portal.read_bindings().await {
        Ok(bindings) => bindings,
        Err(ReadError::Unavailable(reason)) => {
            warn!(cycle, %reason, "could not read bindings; skipping cycle");
            return CycleReport::unread(cycle, CycleStatus::Aborted { reason });
        }
        Err(ReadError::SessionLost(reason)) => {
            error!(cycle, %reason, "session lost while reading bindings");
            return CycleReport::unread(cycle, CycleStatus::SessionLost { reason });
        }
    };

    let mut status = CycleStatus::Completed;
    let mut tally = ProbeTally::default();
    let mut decisions = Vec::with_capacity(table.slot_count());
    for (slot, list) in table.iter() {
        let held = bindings.get(slot);
        match resolve_slot(portal, slot, held, list, pacing.probe, &mut tally).await {
            Ok(action) => decisions.push(SlotDecision {
                slot: slot.clone(),
                held: held.cloned(),
                rank: table.rank_of(slot, &bindings),
                action,
            }),
            Err(lost) => {
                error!(cycle, %slot, reason = %lost.reason, "session lost while probing");
                status = CycleStatus::SessionLost {
                    reason: lost.reason,
                };
                break;
            }
        }
    }

    let degraded = tally.issued > 0 && tally.unknown == tally.issued;
    if degraded {
        warn!(cycle, probes = tally.issued, "every probe failed this cycle; portal degraded");
    }

    let executor = ActionExecutor::new(pacing.retry);
    let mut actions = Vec::with_capacity(decisions.len());
    if status == CycleStatus::Completed {
        for decision in &decisions {
            let report = executor.execute(portal, &decision.action).await;
            let lost = match &report.outcome {
                ActionOutcome::Skipped => {
                    debug!(cycle, slot = %decision.slot, "no action");
                    None
                }
                ActionOutcome::Committed => {
                    info!(
                        cycle,
                        slot = %decision.slot,
                        action = %decision.action,
                        outcome = "committed",
                        "action resolved"
                    );
                    None
                }
                ActionOutcome::Failed { reason, .. } => {
                    warn!(
                        cycle,
                        slot = %decision.slot,
                        action = %decision.action,
                        outcome = "failed",
                        %reason,
                        "action resolved"
                    );
                    None
                }
                ActionOutcome::SessionLost { reason, .. } => Some(reason.clone()),
            };
            actions.push(report);
            if let Some(reason) = lost {
                status = CycleStatus::SessionLost { reason };
                break;
            }
        }
    }

    CycleReport {
        cycle,
        status,
        bindings,
        decisions,
        actions,
        degraded,
    }
}

/// Resolve one slot by probing its candidate window in rank order.
///
/// The first available candidate wins. `Unknown` reads count as unavailable
/// for this cycle, and [`Action::None`] is returned when the window holds
/// nothing available.
async fn resolve_slot<P: Portal + ?Sized>(
    portal: &mut P,
    slot: &SlotId,
    held: Option<&OptionId>,
    list: &PriorityList,
    probe_pause: Duration,
    tally: &mut ProbeTally,
) -> Result<Action, SessionLost> {
    for candidate in candidate_window(list, held) {
        if tally.issued > 0 {
            tokio::time::sleep(probe_pause).await;
        }
        tally.issued += 1;
        match probe_availability(portal, slot, candidate).await? {
            Availability::Available => return Ok(action_for(slot, held, candidate)),
            Availability::Unavailable => {
                debug!(%slot, option = %candidate, "no seats");
            }
            Availability::Unknown => tally.unknown += 1,
        }
    }
    Ok(Action::None)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::io::portal::WriteError;
    use crate::test_support::{PortalCall, ScriptedPortal, table};

    fn pacing() -> Pacing {
        Pacing {
            cycle: Duration::from_millis(1_000),
            probe: Duration::from_millis(50),
            retry: Duration::from_millis(10),
        }
    }

    fn list(slot: &str, options: &[&str]) -> PriorityList {
        PriorityList::new(
            &SlotId::new(slot),
            options.iter().map(|o| OptionId::new(*o)).collect(),
        )
        .expect("priority list")
    }

    /// Resolve `slot` once against `portal`, the way a cycle does.
    async fn resolve_once(
        portal: &mut ScriptedPortal,
        slot: &str,
        held: Option<&str>,
        options: &[&str],
    ) -> Action {
        let held = held.map(OptionId::new);
        let mut tally = ProbeTally::default();
        resolve_slot(
            portal,
            &SlotId::new(slot),
            held.as_ref(),
            &list(slot, options),
            Duration::from_millis(1),
            &mut tally,
        )
        .await
        .expect("resolve")
    }

    fn probed(portal: &ScriptedPortal) -> Vec<&str> {
        portal
            .calls
            .iter()
            .filter_map(|call| match call {
                PortalCall::Probe(_, option) => Some(option.as_str()),
                _ => None,
            })
            .collect()
    }

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("runtime")
    }

    #[tokio::test(start_paused = true)]
    async fn better_option_available_replaces_held() {
        let mut portal = ScriptedPortal::new().with_seats("S1", "A", 1);
        let action = resolve_once(&mut portal, "S1", Some("B"), &["A", "B", "C"]).await;
        assert_eq!(
            action,
            Action::Replace {
                slot: "S1".into(),
                held: "B".into(),
                target: "A".into(),
            }
        );
        assert_eq!(action.writes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn worse_options_are_never_considered() {
        let mut portal = ScriptedPortal::new().with_seats("S1", "C", 1);
        let action = resolve_once(&mut portal, "S1", Some("B"), &["A", "B", "C"]).await;
        assert_eq!(action, Action::None);
        assert_eq!(probed(&portal), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_slot_registers_first_available() {
        let mut portal = ScriptedPortal::new().with_seats("S2", "Y", 1);
        let action = resolve_once(&mut portal, "S2", None, &["X", "Y"]).await;
        assert_eq!(
            action,
            Action::Register {
                slot: "S2".into(),
                option: "Y".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unlisted_occupant_is_replaced() {
        let mut portal = ScriptedPortal::new().with_seats("S3", "X", 1);
        let action = resolve_once(&mut portal, "S3", Some("Z"), &["X"]).await;
        assert_eq!(
            action,
            Action::Replace {
                slot: "S3".into(),
                held: "Z".into(),
                target: "X".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rank_zero_holding_does_not_probe() {
        let mut portal = ScriptedPortal::new().with_seats("S1", "B", 1);
        let action = resolve_once(&mut portal, "S1", Some("A"), &["A", "B"]).await;
        assert_eq!(action, Action::None);
        assert_eq!(portal.probe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_reads_are_not_acted_on() {
        let mut portal = ScriptedPortal::new()
            .with_seats("S1", "A", 1)
            .with_seats("S1", "B", 1)
            .with_probe_error("S1", "A", ReadError::Unavailable("stale".to_string()));
        let action = resolve_once(&mut portal, "S1", None, &["A", "B"]).await;
        assert_eq!(
            action,
            Action::Register {
                slot: "S1".into(),
                option: "B".into(),
            }
        );

        let mut portal = ScriptedPortal::new()
            .with_seats("S1", "A", 1)
            .with_probe_error("S1", "A", ReadError::Unavailable("stale".to_string()));
        let action = resolve_once(&mut portal, "S1", None, &["A"]).await;
        assert_eq!(action, Action::None);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_stops_at_first_available() {
        let mut portal = ScriptedPortal::new()
            .with_seats("S1", "A", 1)
            .with_seats("S1", "B", 1)
            .with_seats("S1", "C", 1);
        let action = resolve_once(&mut portal, "S1", None, &["A", "B", "C"]).await;
        assert_eq!(portal.probe_calls(), 1);
        assert_eq!(action.target(), Some(&OptionId::new("A")));
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_resolves_every_slot_independently() {
        let table = table(&[("S1", &["A", "B", "C"]), ("S2", &["X", "Y"]), ("S3", &["X"])]);
        let mut portal = ScriptedPortal::new()
            .with_binding("S1", "B")
            .with_binding("S3", "Z")
            .with_seats("S1", "A", 1)
            .with_seats("S2", "Y", 1)
            .with_seats("S3", "X", 1);

        let report = run_cycle(&mut portal, &table, &pacing(), 1).await;

        assert_eq!(report.status, CycleStatus::Completed);
        assert_eq!(report.committed(), 3);
        assert_eq!(portal.held("S1"), Some("A"));
        assert_eq!(portal.held("S2"), Some("Y"));
        assert_eq!(portal.held("S3"), Some("X"));
        let ranks: Vec<Rank> = report.decisions.iter().map(|d| d.rank).collect();
        assert_eq!(ranks, vec![Rank::Ranked(1), Rank::Unranked, Rank::Unranked]);
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_action_per_slot() {
        let table = table(&[("S1", &["A", "B"]), ("S2", &["X"])]);
        let mut portal = ScriptedPortal::new()
            .with_seats("S1", "A", 1)
            .with_seats("S1", "B", 1)
            .with_seats("S2", "X", 1);

        let report = run_cycle(&mut portal, &table, &pacing(), 1).await;

        assert_eq!(report.decisions.len(), 2);
        assert_eq!(report.actions.len(), 2);
        let registers_in_s1 = portal
            .calls
            .iter()
            .filter(|call| matches!(call, PortalCall::Register(slot, _) if slot.as_str() == "S1"))
            .count();
        assert_eq!(registers_in_s1, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_bindings_abort_without_acting() {
        let table = table(&[("S1", &["A"])]);
        let mut portal = ScriptedPortal::new()
            .with_seats("S1", "A", 1)
            .with_read_failures(vec![ReadError::Unavailable("page not rendered".to_string())]);

        let report = run_cycle(&mut portal, &table, &pacing(), 1).await;

        assert_eq!(
            report.status,
            CycleStatus::Aborted {
                reason: "page not rendered".to_string()
            }
        );
        assert!(report.session_lost().is_none());
        assert_eq!(portal.calls, vec![PortalCall::ReadBindings]);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_are_paced() {
        let table = table(&[("S1", &["A", "B", "C"])]);
        let mut portal = ScriptedPortal::new();
        let started = tokio::time::Instant::now();

        let report = run_cycle(&mut portal, &table, &pacing(), 1).await;

        assert_eq!(portal.probe_calls(), 3);
        assert_eq!(report.actions[0].outcome, ActionOutcome::Skipped);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(150), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn all_unknown_probes_mark_cycle_degraded() {
        let table = table(&[("S1", &["A"]), ("S2", &["X"])]);
        let mut portal = ScriptedPortal::new()
            .with_probe_error("S1", "A", ReadError::Unavailable("stale".to_string()))
            .with_probe_error("S2", "X", ReadError::Unavailable("stale".to_string()));

        let report = run_cycle(&mut portal, &table, &pacing(), 4).await;

        assert!(report.degraded);
        assert_eq!(report.cycle, 4);
        assert!(report.decisions.iter().all(|d| d.action.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn session_loss_during_probe_stops_the_cycle() {
        let table = table(&[("S1", &["A"]), ("S2", &["X"])]);
        let mut portal = ScriptedPortal::new()
            .with_seats("S2", "X", 1)
            .with_probe_error(
                "S1",
                "A",
                ReadError::SessionLost("redirected to login".to_string()),
            );

        let report = run_cycle(&mut portal, &table, &pacing(), 1).await;

        assert_eq!(
            report.session_lost(),
            Some(SessionLost::new("redirected to login"))
        );
        assert!(report.decisions.is_empty());
        assert!(report.actions.is_empty());
        assert!(portal.write_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn session_loss_during_write_keeps_attempts() {
        let table = table(&[("S1", &["A", "B"]), ("S2", &["X"])]);
        let mut portal = ScriptedPortal::new()
            .with_binding("S1", "B")
            .with_seats("S1", "A", 1)
            .with_seats("S2", "X", 1)
            .with_register_failures(
                "S1",
                "A",
                vec![WriteError::SessionLost("logged out".to_string())],
            );

        let report = run_cycle(&mut portal, &table, &pacing(), 2).await;

        assert_eq!(
            report.status,
            CycleStatus::SessionLost {
                reason: "logged out".to_string()
            }
        );
        assert_eq!(report.decisions.len(), 2);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].attempts.len(), 2);
        assert_eq!(portal.held("S1"), None);
        assert_eq!(portal.held("S2"), None);
    }

    fn scenario() -> impl Strategy<Value = (Vec<String>, Option<usize>, bool, Vec<bool>)> {
        (1usize..6).prop_flat_map(|len| {
            let options: Vec<String> = (0..len).map(|i| format!("O{i}")).collect();
            (
                Just(options),
                proptest::option::of(0..len),
                any::<bool>(),
                proptest::collection::vec(any::<bool>(), len),
            )
        })
    }

    /// Portal for slot `S` holding `held` with seats where `avail` is set.
    fn seeded(options: &[String], held: Option<&str>, avail: &[bool]) -> ScriptedPortal {
        let mut portal = ScriptedPortal::new();
        if let Some(held) = held {
            portal = portal.with_binding("S", held);
        }
        for (option, free) in options.iter().zip(avail) {
            if *free {
                portal = portal.with_seats("S", option, 1);
            }
        }
        portal
    }

    proptest! {
        #[test]
        fn never_targets_rank_at_or_below_held(
            (options, held_rank, _unlisted, avail) in scenario()
        ) {
            let refs: Vec<&str> = options.iter().map(String::as_str).collect();
            let held = held_rank.map(|r| refs[r]);
            let mut portal = seeded(&options, held, &avail);
            let action = paused_runtime().block_on(resolve_once(&mut portal, "S", held, &refs));

            if let (Some(r), Some(target)) = (held_rank, action.target()) {
                match list("S", &refs).rank(target) {
                    Rank::Ranked(t) => prop_assert!(t < r),
                    Rank::Unranked => prop_assert!(false, "target must be listed"),
                }
            }
        }

        #[test]
        fn picks_best_available_in_window(
            (options, held_rank, unlisted, avail) in scenario()
        ) {
            let refs: Vec<&str> = options.iter().map(String::as_str).collect();
            let held = match (held_rank, unlisted) {
                (Some(r), _) => Some(refs[r]),
                (None, true) => Some("unlisted"),
                (None, false) => None,
            };
            let limit = held_rank.unwrap_or(options.len());
            let expected = (0..limit).find(|&r| avail[r]);

            let mut portal = seeded(&options, held, &avail);
            let action = paused_runtime().block_on(resolve_once(&mut portal, "S", held, &refs));

            match expected {
                None => prop_assert_eq!(action, Action::None),
                Some(r) => {
                    prop_assert_eq!(action.target(), Some(&OptionId::new(refs[r])));
                    prop_assert_eq!(action.writes().len(), if held.is_some() { 2 } else { 1 });
                    prop_assert_eq!(portal.probe_calls(), r + 1);
                }
            }
        }

        #[test]
        fn no_op_is_idempotent(
            (options, held_rank, _unlisted, _avail) in scenario()
        ) {
            let refs: Vec<&str> = options.iter().map(String::as_str).collect();
            let held = held_rank.map(|r| refs[r]);
            let table = table(&[("S", refs.as_slice())]);
            let mut portal = seeded(&options, held, &vec![false; options.len()]);
            let runtime = paused_runtime();
            for cycle in 1..=3 {
                let report = runtime.block_on(run_cycle(&mut portal, &table, &pacing(), cycle));
                prop_assert_eq!(&report.decisions[0].action, &Action::None);
                prop_assert!(portal.write_calls().is_empty());
            }
            prop_assert_eq!(portal.held("S"), held);
        }
    }
}
