//! Priority-driven course slot hunter.
//!
//! Reads a priority table from `hunter.toml`, watches the portal, and upgrades
//! each slot to the best option with a free seat.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use hunter::core::priority::PriorityTable;
use hunter::core::types::Rank;
use hunter::cycle::{CycleReport, CycleStatus, run_cycle};
use hunter::executor::ActionOutcome;
use hunter::exit_codes;
use hunter::io::audit_log::AuditLog;
use hunter::io::config::{HunterConfig, config_dir, load_config};
use hunter::io::dry_run::DryRunPortal;
use hunter::io::file_portal::FilePortal;
use hunter::io::portal::{Portal, ReadError, SessionLost};
use hunter::logging;
use hunter::looping::{LoopConfig, LoopStop, run_loop};

#[derive(Parser)]
#[command(
    name = "hunter",
    version,
    about = "Upgrade course slots to the most preferred option with a free seat"
)]
struct Cli {
    /// Path to the hunter configuration.
    #[arg(long, global = true, default_value = "hunter.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the config and priority table and report what was found.
    Validate,
    /// Print the option held in every slot and its rank.
    Status,
    /// Resolve one cycle without writing to the portal.
    Plan,
    /// Poll the portal until interrupted.
    Run {
        /// Probe and resolve as usual but never submit writes.
        #[arg(long)]
        dry_run: bool,
        /// Stop after this many cycles.
        #[arg(long)]
        max_cycles: Option<u64>,
        /// Append every write attempt to this JSONL file.
        #[arg(long)]
        audit_log: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run(Cli::parse()).await {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            if err.downcast_ref::<SessionLost>().is_some() {
                exit_codes::SESSION_LOST
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Validate => cmd_validate(&cli.config),
        Command::Status => cmd_status(&cli.config).await,
        Command::Plan => cmd_plan(&cli.config).await,
        Command::Run {
            dry_run,
            max_cycles,
            audit_log,
        } => cmd_run(&cli.config, dry_run, max_cycles, audit_log).await,
    }
}

/// Config, priority table and portal location, resolved against the config dir.
struct Setup {
    config: HunterConfig,
    table: PriorityTable,
    portal_path: PathBuf,
}

fn load_setup(config_path: &Path) -> Result<Setup> {
    let config = load_config(config_path)?;
    let base_dir = config_dir(config_path);
    let table = config.priority_table(&base_dir)?;
    let portal_path = config.portal_path(&base_dir);
    Ok(Setup {
        config,
        table,
        portal_path,
    })
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    let setup = load_setup(config_path)?;
    println!(
        "ok: {} slots, {} options",
        setup.table.slot_count(),
        setup.table.option_count()
    );
    Ok(())
}

async fn cmd_status(config_path: &Path) -> Result<()> {
    let setup = load_setup(config_path)?;
    let mut portal = FilePortal::new(&setup.portal_path);
    let bindings = match portal.read_bindings().await {
        Ok(bindings) => bindings,
        Err(ReadError::SessionLost(reason)) => return Err(SessionLost::new(reason).into()),
        Err(err) => return Err(anyhow::Error::new(err).context("read bindings")),
    };

    for (slot, _) in setup.table.iter() {
        let held = bindings
            .get(slot)
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!("{slot}\t{held}\t{}", rank_label(setup.table.rank_of(slot, &bindings)));
    }
    for (slot, option) in &bindings {
        if setup.table.get(slot).is_none() {
            println!("{slot}\t{option}\tuntracked");
        }
    }
    Ok(())
}

async fn cmd_plan(config_path: &Path) -> Result<()> {
    let setup = load_setup(config_path)?;
    let mut portal = DryRunPortal::new(FilePortal::new(&setup.portal_path));
    let report = run_cycle(&mut portal, &setup.table, &setup.config.pacing(), 1).await;
    match &report.status {
        CycleStatus::Completed => {}
        CycleStatus::Aborted { reason } => {
            return Err(anyhow!("could not read bindings: {reason}"));
        }
        CycleStatus::SessionLost { reason } => {
            return Err(SessionLost::new(reason.clone()).into());
        }
    }
    for decision in &report.decisions {
        println!("{}\t{}", decision.slot, decision.action);
    }
    Ok(())
}

async fn cmd_run(
    config_path: &Path,
    dry_run: bool,
    max_cycles: Option<u64>,
    audit_log: Option<PathBuf>,
) -> Result<()> {
    let setup = load_setup(config_path)?;
    let loop_config = LoopConfig {
        pacing: setup.config.pacing(),
        stop_when_best: setup.config.stop_when_best,
        max_cycles,
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping after the current cycle");
            on_signal.cancel();
        }
    });

    info!(
        slots = setup.table.slot_count(),
        portal = %setup.portal_path.display(),
        dry_run,
        "starting"
    );
    let portal = FilePortal::new(&setup.portal_path);
    let audit = audit_log.map(AuditLog::new);
    if dry_run {
        let mut portal = DryRunPortal::new(portal);
        drive(&mut portal, &setup.table, &loop_config, &cancel, audit.as_ref()).await
    } else {
        let mut portal = portal;
        drive(&mut portal, &setup.table, &loop_config, &cancel, audit.as_ref()).await
    }
}

/// Run the poll loop, reporting each cycle and appending to the audit log.
///
/// An audit log failure cancels the loop and is returned once it has stopped.
async fn drive<P: Portal>(
    portal: &mut P,
    table: &PriorityTable,
    config: &LoopConfig,
    cancel: &CancellationToken,
    audit: Option<&AuditLog>,
) -> Result<()> {
    let mut audit_error = None;
    let outcome = run_loop(portal, table, config, cancel, |report| {
        print_cycle(report);
        if let Some(audit) = audit
            && audit_error.is_none()
            && let Err(err) = audit.append(report)
        {
            audit_error = Some(err);
            cancel.cancel();
        }
    })
    .await?;

    if let Some(err) = audit_error {
        return Err(err);
    }
    match outcome.stop {
        LoopStop::Cancelled => println!("cancelled after {} cycles", outcome.cycles),
        LoopStop::AllBest => println!(
            "every slot holds its best option after {} cycles",
            outcome.cycles
        ),
        LoopStop::CycleLimit { max_cycles } => println!("stopped after {max_cycles} cycles"),
    }
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    for action in &report.actions {
        let label = action.outcome.label();
        match &action.outcome {
            ActionOutcome::Skipped => {}
            ActionOutcome::Committed => {
                println!("cycle {}: {}: {label}", report.cycle, action.action);
            }
            ActionOutcome::Failed { reason, .. } | ActionOutcome::SessionLost { reason, .. } => {
                println!("cycle {}: {}: {label} ({reason})", report.cycle, action.action);
            }
        }
    }
}

fn rank_label(rank: Rank) -> String {
    match rank {
        Rank::Ranked(idx) => format!("rank {idx}"),
        Rank::Unranked => "unranked".to_string(),
    }
}
