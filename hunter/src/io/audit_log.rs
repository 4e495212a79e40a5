//! Append-only JSONL audit trail of portal write attempts.
//!
//! Unlike tracing output, which is filtered by `RUST_LOG`, this file records
//! every attempt when `--audit-log` is given.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::core::types::{OptionId, SlotId};
use crate::cycle::CycleReport;

/// One line of the audit log.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuditRecord {
    pub at: String,
    pub cycle: u64,
    pub slot: SlotId,
    pub option: OptionId,
    pub write: &'static str,
    pub attempt: u32,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Flatten a cycle's write attempts into audit records stamped with `at`.
pub fn records(report: &CycleReport, at: DateTime<Utc>) -> Vec<AuditRecord> {
    let at = at.to_rfc3339_opts(SecondsFormat::Millis, true);
    report
        .actions
        .iter()
        .flat_map(|action| &action.attempts)
        .map(|attempt| AuditRecord {
            at: at.clone(),
            cycle: report.cycle,
            slot: attempt.write.slot().clone(),
            option: attempt.write.option().clone(),
            write: attempt.write.kind(),
            attempt: attempt.attempt,
            outcome: attempt.outcome(),
            error: attempt.error.as_ref().map(ToString::to_string),
        })
        .collect()
}

/// JSONL file that write attempts are appended to.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append every write attempt in `report`. Returns the number of lines written.
    pub fn append(&self, report: &CycleReport) -> Result<usize> {
        let records = records(report, Utc::now());
        if records.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create audit log dir {}", parent.display()))?;
        }

        let mut buf = String::new();
        for record in &records {
            buf.push_str(&serde_json::to_string(record).context("serialize audit record")?);
            buf.push('\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log {}", self.path.display()))?;
        file.write_all(buf.as_bytes())
            .with_context(|| format!("append audit log {}", self.path.display()))?;
        Ok(records.len())
    }
}
