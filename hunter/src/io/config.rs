//! Hunter configuration stored in `hunter.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::priority::{PriorityTable, parse_course_lines};
use crate::core::types::{OptionId, SlotId};
use crate::cycle::Pacing;

/// Hunter configuration (TOML).
///
/// Read once at startup; nothing is reloaded while the loop runs. Missing
/// pacing fields default to the values the portal tolerated in practice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HunterConfig {
    /// Minimum delay between poll cycles.
    pub cycle_pause_ms: u64,

    /// Delay between individual availability probes within a cycle.
    pub probe_pause_ms: u64,

    /// Delay between attempts of a write that failed transiently.
    pub retry_pause_ms: u64,

    /// Stop once every slot holds its rank-0 option.
    pub stop_when_best: bool,

    /// Optional `CODE:SLOT` course list, relative to the config file.
    pub courses_file: Option<PathBuf>,

    /// Slot -> options, most preferred first.
    pub priorities: BTreeMap<String, Vec<String>>,

    pub portal: PortalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortalConfig {
    /// JSON state document used by the file-backed portal.
    pub state_file: PathBuf,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("portal.json"),
        }
    }
}

impl Default for HunterConfig {
    fn default() -> Self {
        Self {
            cycle_pause_ms: 1_200,
            probe_pause_ms: 200,
            retry_pause_ms: 500,
            stop_when_best: false,
            courses_file: None,
            priorities: BTreeMap::new(),
            portal: PortalConfig::default(),
        }
    }
}

impl HunterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cycle_pause_ms == 0 {
            return Err(anyhow!("cycle_pause_ms must be > 0"));
        }
        if self.probe_pause_ms == 0 {
            return Err(anyhow!("probe_pause_ms must be > 0"));
        }
        if self.retry_pause_ms == 0 {
            return Err(anyhow!("retry_pause_ms must be > 0"));
        }
        if self.priorities.is_empty() && self.courses_file.is_none() {
            return Err(anyhow!(
                "no priorities configured (set [priorities] or courses_file)"
            ));
        }
        if self.portal.state_file.as_os_str().is_empty() {
            return Err(anyhow!("portal.state_file must not be empty"));
        }
        Ok(())
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            cycle: Duration::from_millis(self.cycle_pause_ms),
            probe: Duration::from_millis(self.probe_pause_ms),
            retry: Duration::from_millis(self.retry_pause_ms),
        }
    }

    /// Build the priority table from `[priorities]` plus the optional course list.
    ///
    /// `base_dir` anchors a relative `courses_file`. A slot defined in both
    /// sources is rejected.
    pub fn priority_table(&self, base_dir: &Path) -> Result<PriorityTable> {
        let mut entries: Vec<(SlotId, Vec<OptionId>)> = self
            .priorities
            .iter()
            .map(|(slot, options)| {
                (
                    SlotId::new(slot.trim()),
                    options.iter().map(|o| OptionId::new(o.trim())).collect(),
                )
            })
            .collect();

        if let Some(courses_file) = &self.courses_file {
            let path = base_dir.join(courses_file);
            let text =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            let parsed =
                parse_course_lines(&text).with_context(|| format!("parse {}", path.display()))?;
            entries.extend(parsed);
        }

        PriorityTable::from_entries(entries).context("invalid priority table")
    }

    pub fn portal_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.portal.state_file)
    }
}

/// Load and validate config from a TOML file.
pub fn load_config(path: &Path) -> Result<HunterConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HunterConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Directory that relative paths in the config at `path` resolve against.
pub fn config_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
