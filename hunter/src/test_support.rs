//! Test-only helpers: a scripted in-memory portal and on-disk fixtures.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::core::priority::PriorityTable;
use crate::core::types::{Bindings, OptionId, SlotId};
use crate::io::file_portal::PortalState;
use crate::io::portal::{Portal, ReadError, WriteError};

/// Every call the scripted portal received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalCall {
    ReadBindings,
    Probe(SlotId, OptionId),
    Register(SlotId, OptionId),
    Drop(SlotId, OptionId),
}

/// Seat change applied when the portal sees its `at_read`-th binding read (1-indexed).
#[derive(Debug, Clone)]
struct SeatChange {
    at_read: usize,
    slot: SlotId,
    option: OptionId,
    seats: u32,
}

/// In-memory portal with scripted failures and capacity churn.
///
/// Successful writes mutate bindings and seat counts the way a real portal
/// would, so multi-cycle tests observe their own effects.
#[derive(Debug, Default)]
pub struct ScriptedPortal {
    pub bindings: Bindings,
    seats: BTreeMap<(SlotId, OptionId), u32>,
    read_failures: VecDeque<ReadError>,
    probe_errors: HashMap<(SlotId, OptionId), ReadError>,
    register_failures: HashMap<(SlotId, OptionId), VecDeque<WriteError>>,
    drop_failures: HashMap<(SlotId, OptionId), VecDeque<WriteError>>,
    seat_changes: Vec<SeatChange>,
    reads: usize,
    pub calls: Vec<PortalCall>,
}

fn key(slot: &str, option: &str) -> (SlotId, OptionId) {
    (SlotId::new(slot), OptionId::new(option))
}

impl ScriptedPortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binding(mut self, slot: &str, option: &str) -> Self {
        self.bindings.insert(SlotId::new(slot), OptionId::new(option));
        self
    }

    pub fn with_seats(mut self, slot: &str, option: &str, seats: u32) -> Self {
        self.seats.insert(key(slot, option), seats);
        self
    }

    /// Set `seats` for `(slot, option)` when the `at_read`-th binding read happens.
    pub fn with_seats_at_read(
        mut self,
        at_read: usize,
        slot: &str,
        option: &str,
        seats: u32,
    ) -> Self {
        self.seat_changes.push(SeatChange {
            at_read,
            slot: SlotId::new(slot),
            option: OptionId::new(option),
            seats,
        });
        self
    }

    /// Queue failures returned by the next binding reads, one per read.
    pub fn with_read_failures(mut self, failures: Vec<ReadError>) -> Self {
        self.read_failures.extend(failures);
        self
    }

    pub fn with_probe_error(mut self, slot: &str, option: &str, err: ReadError) -> Self {
        self.probe_errors.insert(key(slot, option), err);
        self
    }

    /// Queue failures returned by successive register attempts for `(slot, option)`.
    pub fn with_register_failures(
        mut self,
        slot: &str,
        option: &str,
        failures: Vec<WriteError>,
    ) -> Self {
        self.register_failures
            .entry(key(slot, option))
            .or_default()
            .extend(failures);
        self
    }

    /// Queue failures returned by successive drop attempts for `(slot, option)`.
    pub fn with_drop_failures(
        mut self,
        slot: &str,
        option: &str,
        failures: Vec<WriteError>,
    ) -> Self {
        self.drop_failures
            .entry(key(slot, option))
            .or_default()
            .extend(failures);
        self
    }

    pub fn held(&self, slot: &str) -> Option<&str> {
        self.bindings.get(&SlotId::new(slot)).map(OptionId::as_str)
    }

    pub fn write_calls(&self) -> Vec<&PortalCall> {
        self.calls
            .iter()
            .filter(|call| matches!(call, PortalCall::Register(..) | PortalCall::Drop(..)))
            .collect()
    }

    pub fn probe_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, PortalCall::Probe(..)))
            .count()
    }
}

#[async_trait]
impl Portal for ScriptedPortal {
    async fn read_bindings(&mut self) -> Result<Bindings, ReadError> {
        self.calls.push(PortalCall::ReadBindings);
        self.reads += 1;
        for change in self.seat_changes.iter().filter(|c| c.at_read == self.reads) {
            self.seats
                .insert((change.slot.clone(), change.option.clone()), change.seats);
        }
        if let Some(err) = self.read_failures.pop_front() {
            return Err(err);
        }
        Ok(self.bindings.clone())
    }

    async fn probe(&mut self, slot: &SlotId, option: &OptionId) -> Result<bool, ReadError> {
        self.calls.push(PortalCall::Probe(slot.clone(), option.clone()));
        let k = (slot.clone(), option.clone());
        if let Some(err) = self.probe_errors.get(&k) {
            return Err(err.clone());
        }
        Ok(self.seats.get(&k).copied().unwrap_or(0) > 0)
    }

    async fn register(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError> {
        self.calls.push(PortalCall::Register(slot.clone(), option.clone()));
        let k = (slot.clone(), option.clone());
        if let Some(err) = self.register_failures.get_mut(&k).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if self.bindings.contains_key(slot) {
            return Err(WriteError::Rejected(format!("{slot} already occupied")));
        }
        let seats = self.seats.entry(k).or_insert(0);
        if *seats == 0 {
            return Err(WriteError::Rejected(format!("no seats for {option}")));
        }
        *seats -= 1;
        self.bindings.insert(slot.clone(), option.clone());
        Ok(())
    }

    async fn drop_option(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError> {
        self.calls.push(PortalCall::Drop(slot.clone(), option.clone()));
        let k = (slot.clone(), option.clone());
        if let Some(err) = self.drop_failures.get_mut(&k).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if self.bindings.get(slot) != Some(option) {
            return Err(WriteError::Rejected(format!("{option} not held in {slot}")));
        }
        self.bindings.remove(slot);
        *self.seats.entry(k).or_insert(0) += 1;
        Ok(())
    }
}

/// Build a priority table from literal `(slot, [options])` pairs.
pub fn table(entries: &[(&str, &[&str])]) -> PriorityTable {
    PriorityTable::from_entries(entries.iter().map(|(slot, options)| {
        (
            SlotId::new(*slot),
            options.iter().map(|o| OptionId::new(*o)).collect(),
        )
    }))
    .expect("valid priority table")
}

/// Temporary directory holding a config file and a portal state file.
pub struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("hunter.toml")
    }

    pub fn portal_path(&self) -> PathBuf {
        self.path().join("portal.json")
    }

    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Write `hunter.toml` with fast pacing, the given priorities block and a
    /// portal pointing at `portal.json`.
    pub fn write_config(&self, priorities: &str) -> Result<PathBuf> {
        let contents = format!(
            "cycle_pause_ms = 5\nprobe_pause_ms = 1\nretry_pause_ms = 1\n\n\
             [priorities]\n{priorities}\n\n\
             [portal]\nstate_file = \"portal.json\"\n"
        );
        self.write("hunter.toml", &contents)
    }

    pub fn write_portal(&self, state: &PortalState) -> Result<PathBuf> {
        let mut buf = serde_json::to_string_pretty(state).context("serialize portal state")?;
        buf.push('\n');
        self.write("portal.json", &buf)
    }

    pub fn read_portal(&self) -> Result<PortalState> {
        let path = self.portal_path();
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
    }
}
