//! File-backed portal for rehearsals and offline runs.
//!
//! The whole registration state lives in one JSON document that is re-read on
//! every call, so editing it while `hunter run` is active simulates seats
//! opening up or bindings changing behind the engine's back.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{Bindings, OptionId, SlotId};
use crate::io::portal::{Portal, ReadError, WriteError};

/// Persisted portal state (`portal.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortalState {
    /// `false` makes every call fail as a lost session.
    #[serde(default = "signed_in_default")]
    pub signed_in: bool,
    #[serde(default)]
    pub bindings: Bindings,
    /// Free seats per slot and option. Missing entries have none.
    #[serde(default)]
    pub seats: BTreeMap<SlotId, BTreeMap<OptionId, u32>>,
}

fn signed_in_default() -> bool {
    true
}

impl Default for PortalState {
    fn default() -> Self {
        Self {
            signed_in: true,
            bindings: Bindings::new(),
            seats: BTreeMap::new(),
        }
    }
}

impl PortalState {
    pub fn seats_for(&self, slot: &SlotId, option: &OptionId) -> u32 {
        self.seats
            .get(slot)
            .and_then(|by_option| by_option.get(option))
            .copied()
            .unwrap_or(0)
    }

    fn seats_mut(&mut self, slot: &SlotId, option: &OptionId) -> &mut u32 {
        self.seats
            .entry(slot.clone())
            .or_default()
            .entry(option.clone())
            .or_insert(0)
    }

    /// Take a seat for `option` in an empty `slot`.
    pub fn register(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError> {
        if let Some(held) = self.bindings.get(slot) {
            return Err(WriteError::Rejected(format!(
                "{slot} already holds {held}"
            )));
        }
        let seats = self.seats_mut(slot, option);
        if *seats == 0 {
            return Err(WriteError::Rejected(format!("no seats left for {option} in {slot}")));
        }
        *seats -= 1;
        self.bindings.insert(slot.clone(), option.clone());
        Ok(())
    }

    /// Release `option` from `slot`, returning its seat.
    pub fn drop_option(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError> {
        if self.bindings.get(slot) != Some(option) {
            return Err(WriteError::Rejected(format!("{option} is not held in {slot}")));
        }
        self.bindings.remove(slot);
        *self.seats_mut(slot, option) += 1;
        Ok(())
    }
}

/// Portal whose state is a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FilePortal {
    path: PathBuf,
}

impl FilePortal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<PortalState> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read portal state {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse portal state {}", self.path.display()))
    }

    /// Atomically replace the state file (temp file + rename).
    async fn store(&self, state: &PortalState) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(state).context("serialize portal state")?;
        buf.push('\n');
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, buf)
            .await
            .with_context(|| format!("write temp portal state {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("replace portal state {}", self.path.display()))
    }

    async fn load_for_read(&self) -> Result<PortalState, ReadError> {
        let state = self
            .load()
            .await
            .map_err(|err| ReadError::Unavailable(format!("{err:#}")))?;
        if !state.signed_in {
            return Err(ReadError::SessionLost("signed out".to_string()));
        }
        Ok(state)
    }

    async fn apply<F>(&self, write: F) -> Result<(), WriteError>
    where
        F: FnOnce(&mut PortalState) -> Result<(), WriteError> + Send,
    {
        let mut state = self
            .load()
            .await
            .map_err(|err| WriteError::Transient(format!("{err:#}")))?;
        if !state.signed_in {
            return Err(WriteError::SessionLost("signed out".to_string()));
        }
        write(&mut state)?;
        self.store(&state)
            .await
            .map_err(|err| WriteError::Transient(format!("{err:#}")))
    }
}

#[async_trait]
impl Portal for FilePortal {
    async fn read_bindings(&mut self) -> Result<Bindings, ReadError> {
        let state = self.load_for_read().await?;
        debug!(path = %self.path.display(), held = state.bindings.len(), "read bindings");
        Ok(state.bindings)
    }

    async fn probe(&mut self, slot: &SlotId, option: &OptionId) -> Result<bool, ReadError> {
        let state = self.load_for_read().await?;
        Ok(state.seats_for(slot, option) > 0)
    }

    async fn register(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError> {
        self.apply(|state| state.register(slot, option)).await
    }

    async fn drop_option(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError> {
        self.apply(|state| state.drop_option(slot, option)).await
    }
}
