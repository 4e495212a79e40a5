//! Executes resolved actions against the portal with bounded retry.
//!
//! Each portal write is attempted up to [`MAX_WRITE_ATTEMPTS`] times when it
//! fails transiently. Rejections are final for the cycle, and a lost session
//! stops the action immediately. Every attempt is logged and returned to the
//! caller, including on a lost session, so the run can be audited afterwards.

use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::core::types::{Action, Write};
use crate::io::portal::{Portal, WriteError};

/// Attempts per write before a transient failure is surfaced.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// One submission of one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAttempt {
    pub write: Write,
    /// 1-indexed attempt number for this write.
    pub attempt: u32,
    pub error: Option<WriteError>,
}

impl WriteAttempt {
    pub fn outcome(&self) -> &'static str {
        match &self.error {
            None => "ok",
            Some(WriteError::Transient(_)) => "transient",
            Some(WriteError::Rejected(_)) => "rejected",
            Some(WriteError::SessionLost(_)) => "session_lost",
        }
    }
}

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Every write of the action went through.
    Committed,
    /// A write failed for good this cycle.
    Failed {
        reason: String,
        /// The held option was dropped but the replacement did not register.
        slot_vacated: bool,
    },
    /// The portal session ended mid-action. Nothing further can be written.
    SessionLost { reason: String, slot_vacated: bool },
    /// Nothing to do.
    Skipped,
}

impl ActionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ActionOutcome::Committed => "committed",
            ActionOutcome::Failed { .. } => "failed",
            ActionOutcome::SessionLost { .. } => "session lost",
            ActionOutcome::Skipped => "skipped",
        }
    }
}

/// What happened to one action, with every write attempt made for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub action: Action,
    pub outcome: ActionOutcome,
    pub attempts: Vec<WriteAttempt>,
}

/// Submits actions one write at a time.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    retry_pause: Duration,
    max_attempts: u32,
}

impl ActionExecutor {
    pub fn new(retry_pause: Duration) -> Self {
        Self {
            retry_pause,
            max_attempts: MAX_WRITE_ATTEMPTS,
        }
    }

    /// Execute `action`, stopping at the first write that fails for good.
    ///
    /// Drop and register halves of a replacement are independent writes: if
    /// the register fails after the drop succeeded, the slot stays empty and
    /// the next cycle sees it as such. A lost session is reported through
    /// [`ActionOutcome::SessionLost`] together with the attempts made so far.
    #[instrument(skip_all, fields(action = %action))]
    pub async fn execute<P: Portal + ?Sized>(
        &self,
        portal: &mut P,
        action: &Action,
    ) -> ActionReport {
        let mut attempts = Vec::new();
        if action.is_none() {
            return ActionReport {
                action: action.clone(),
                outcome: ActionOutcome::Skipped,
                attempts,
            };
        }

        let mut outcome = ActionOutcome::Committed;
        for (idx, write) in action.writes().into_iter().enumerate() {
            if let Err(err) = self.submit(portal, &write, &mut attempts).await {
                let slot_vacated = idx > 0;
                if slot_vacated {
                    warn!(
                        slot = %write.slot(),
                        "slot left empty after drop; will re-resolve next cycle"
                    );
                }
                outcome = match err {
                    WriteError::SessionLost(reason) => ActionOutcome::SessionLost {
                        reason,
                        slot_vacated,
                    },
                    err => ActionOutcome::Failed {
                        reason: format!(
                            "{} {} in {}: {err}",
                            write.kind(),
                            write.option(),
                            write.slot()
                        ),
                        slot_vacated,
                    },
                };
                break;
            }
        }

        ActionReport {
            action: action.clone(),
            outcome,
            attempts,
        }
    }

    /// Submit one write, retrying transient failures. Returns the write's
    /// final failure, if any.
    async fn submit<P: Portal + ?Sized>(
        &self,
        portal: &mut P,
        write: &Write,
        attempts: &mut Vec<WriteAttempt>,
    ) -> Result<(), WriteError> {
        let slot = write.slot();
        let option = write.option();
        let kind = write.kind();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match write {
                Write::Register { slot, option } => portal.register(slot, option).await,
                Write::Drop { slot, option } => portal.drop_option(slot, option).await,
            };
            attempts.push(WriteAttempt {
                write: write.clone(),
                attempt,
                error: result.as_ref().err().cloned(),
            });

            match result {
                Ok(()) => {
                    info!(%slot, %option, write = kind, attempt, outcome = "ok", "write committed");
                    return Ok(());
                }
                Err(err @ WriteError::SessionLost(_)) => {
                    error!(
                        %slot,
                        %option,
                        write = kind,
                        attempt,
                        error = %err,
                        "session lost during write"
                    );
                    return Err(err);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        %slot,
                        %option,
                        write = kind,
                        attempt,
                        error = %err,
                        "transient write failure; retrying"
                    );
                    tokio::time::sleep(self.retry_pause).await;
                }
                Err(err) => {
                    warn!(%slot, %option, write = kind, attempt, error = %err, "write failed");
                    return Err(err);
                }
            }
        }
    }
}
