//! Portal wrapper that reads through and never writes.

use async_trait::async_trait;
use tracing::info;

use crate::core::types::{Bindings, OptionId, SlotId};
use crate::io::portal::{Portal, ReadError, WriteError};

/// Passes reads to the inner portal; logs and acknowledges writes without
/// submitting them.
#[derive(Debug)]
pub struct DryRunPortal<P> {
    inner: P,
}

impl<P> DryRunPortal<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<P: Portal> Portal for DryRunPortal<P> {
    async fn read_bindings(&mut self) -> Result<Bindings, ReadError> {
        self.inner.read_bindings().await
    }

    async fn probe(&mut self, slot: &SlotId, option: &OptionId) -> Result<bool, ReadError> {
        self.inner.probe(slot, option).await
    }

    async fn register(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError> {
        info!(%slot, %option, "dry run: would register");
        Ok(())
    }

    async fn drop_option(&mut self, slot: &SlotId, option: &OptionId) -> Result<(), WriteError> {
        info!(%slot, %option, "dry run: would drop");
        Ok(())
    }
}
