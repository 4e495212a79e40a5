//! Multi-cycle poll loop for `hunter run`.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::priority::PriorityTable;
use crate::cycle::{CycleReport, CycleStatus, Pacing, run_cycle};
use crate::io::portal::Portal;

/// Loop-level settings, read once before the first cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    pub pacing: Pacing,
    /// Stop once every slot holds its rank-0 option.
    pub stop_when_best: bool,
    /// Stop after this many cycles.
    pub max_cycles: Option<u64>,
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The cancellation token fired.
    Cancelled,
    /// Every slot holds its most preferred option.
    AllBest,
    /// The configured cycle limit was reached.
    CycleLimit { max_cycles: u64 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub cycles: u64,
    pub stop: LoopStop,
}

/// Poll the portal until cancelled, an opt-in stop condition holds, or the
/// session is lost.
///
/// Cancellation is checked before each refresh and during the pause between
/// cycles, never while a write is in flight. A lost session is returned as an
/// error wrapping [`crate::io::portal::SessionLost`], after `on_cycle` has seen
/// the partial report of the cycle it ended. Every other failure is handled
/// inside the cycle and polling continues.
pub async fn run_loop<P, F>(
    portal: &mut P,
    table: &PriorityTable,
    config: &LoopConfig,
    cancel: &CancellationToken,
    mut on_cycle: F,
) -> Result<LoopOutcome>
where
    P: Portal + ?Sized,
    F: FnMut(&CycleReport),
{
    let mut cycles = 0u64;
    loop {
        if cancel.is_cancelled() {
            info!(cycles, "cancelled");
            return Ok(LoopOutcome {
                cycles,
                stop: LoopStop::Cancelled,
            });
        }
        if let Some(max_cycles) = config.max_cycles
            && cycles >= max_cycles
        {
            return Ok(LoopOutcome {
                cycles,
                stop: LoopStop::CycleLimit { max_cycles },
            });
        }

        cycles += 1;
        let report = run_cycle(portal, table, &config.pacing, cycles).await;
        on_cycle(&report);
        if let Some(lost) = report.session_lost() {
            return Err(anyhow::Error::new(lost).context(format!("cycle {cycles}")));
        }

        if config.stop_when_best
            && report.status == CycleStatus::Completed
            && table.all_best(&report.bindings)
        {
            info!(cycles, "every slot holds its best option");
            return Ok(LoopOutcome {
                cycles,
                stop: LoopStop::AllBest,
            });
        }
        if let CycleStatus::Aborted { reason } = &report.status {
            warn!(cycle = cycles, %reason, "cycle aborted; retrying after pause");
        }

        let more_cycles = config.max_cycles.is_none_or(|max| cycles < max);
        if more_cycles {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(config.pacing.cycle) => {}
            }
        }
    }
}
