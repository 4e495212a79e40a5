//! Portal abstraction for registration state.
//!
//! The [`Portal`] trait decouples the poll loop from whatever transport talks
//! to the registration service. Tests use a scripted portal; the CLI ships a
//! file-backed one.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{Availability, Bindings, OptionId, SlotId};

/// Failure to read portal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// State could not be read this time; later reads may succeed.
    #[error("portal read failed: {0}")]
    Unavailable(String),
    /// The session is gone; nothing further can succeed.
    #[error("portal session lost: {0}")]
    SessionLost(String),
}

/// Failure to submit a register or drop request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// Interaction blocked or stale; the same write may succeed if repeated.
    #[error("transient write failure: {0}")]
    Transient(String),
    /// The portal refused the write outright (no seat, not held).
    #[error("write rejected: {0}")]
    Rejected(String),
    /// The session is gone; nothing further can succeed.
    #[error("portal session lost: {0}")]
    SessionLost(String),
}

impl WriteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, WriteError::Transient(_))
    }
}

/// Fatal portal failure that ends the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("portal session lost: {reason}")]
pub struct SessionLost {
    pub reason: String,
}

impl SessionLost {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Read/write operations the engine needs from the registration service.
///
/// Calls may block for a full round trip; timeouts are the implementation's
/// concern. The poll loop owns the portal exclusively for the whole run.
#[async_trait]
pub trait Portal: Send {
    /// Current slot -> held option bindings. Slots holding nothing are absent.
    async fn read_bindings(&mut self) -> Result<Bindings, ReadError>;

    /// Whether `option` has a free seat in `slot` right now.
    async fn probe(&mut self, slot: &SlotId, option: &OptionId) -> Result<bool, ReadError>;

    async fn register(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError>;

    async fn drop_option(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError>;
}

/// Probe and fold recoverable read failures into [`Availability::Unknown`].
///
/// Session loss is still returned as an error.
pub async fn probe_availability<P: Portal + ?Sized>(
    portal: &mut P,
    slot: &SlotId,
    option: &OptionId,
) -> Result<Availability, SessionLost> {
    match portal.probe(slot, option).await {
        Ok(true) => Ok(Availability::Available),
        Ok(false) => Ok(Availability::Unavailable),
        Err(ReadError::Unavailable(reason)) => {
            tracing::debug!(%slot, %option, %reason, "probe failed; treating as unknown");
            Ok(Availability::Unknown)
        }
        Err(ReadError::SessionLost(reason)) => Err(SessionLost::new(reason)),
    }
}
