//! The clearing authority's agent.
//!
//! The regulator trails the bidders by one slot: the arrival of slot
//! notification `s + 1` means the market for slot `s` has closed, so the
//! regulator clears `s`. Slot notification 0 has no predecessor and is
//! skipped. Clearing runs on a single worker behind a bounded queue;
//! worker failures flow back to the control loop through an error channel.

use crate::{
    error::AgentError,
    notifier::NotifierHandle,
    telemetry::{TelemetryEvent, TelemetryHandle},
};
use sbm_core::{
    models::{ClearingPayload, EventId, ParticipantId, RevealKey, Slot},
    ports::{Action, Invoker},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Regulator tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatorConfig {
    /// Depth of the slot-notification and clearing work queues.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Whether a failed clearing invocation stops the simulation (true) or
    /// is logged and skipped (false).
    #[serde(default = "default_halt_on_error")]
    pub halt_on_error: bool,
}

fn default_queue_depth() -> usize {
    8
}

fn default_halt_on_error() -> bool {
    true
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            halt_on_error: default_halt_on_error(),
        }
    }
}

/// The regulating agent.
pub struct RegulatingAgent<L> {
    id: ParticipantId,
    ledger: Arc<L>,
    /// The market's private key, attached to mark-end calls in the
    /// single-key protocol; `None` when bidders reveal their own keys.
    authority_key: Option<RevealKey>,
    config: RegulatorConfig,
    telemetry: TelemetryHandle,
}

impl<L> RegulatingAgent<L>
where
    L: Invoker + 'static,
{
    /// Create the regulator.
    pub fn new(
        id: ParticipantId,
        ledger: Arc<L>,
        authority_key: Option<RevealKey>,
        config: RegulatorConfig,
        telemetry: TelemetryHandle,
    ) -> Self {
        Self {
            id,
            ledger,
            authority_key,
            config,
            telemetry,
        }
    }

    /// Register with the notifier and clear slots until cancellation.
    ///
    /// The clearing worker is joined before this returns.
    pub async fn run(
        self,
        notifier: &NotifierHandle,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let (slot_tx, mut slots) = mpsc::channel(self.config.queue_depth);
        if !notifier.register(self.id, slot_tx) {
            return Err(AgentError::Registration(self.id));
        }

        let workers = cancel.child_token();
        let (work_tx, work_rx) = mpsc::channel(self.config.queue_depth);
        let (err_tx, mut errors) = mpsc::channel(1);
        let worker = tokio::spawn(clearing_worker(
            self.ledger.clone(),
            self.authority_key.clone(),
            self.telemetry.clone(),
            work_rx,
            err_tx,
            workers.clone(),
        ));

        let mut result = Ok(());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                error = errors.recv() => match error {
                    Some(message) => {
                        if self.config.halt_on_error {
                            result = Err(AgentError::Clearing(message));
                            break;
                        }
                        // Explicitly configured to keep the market running.
                        warn!(regulator = %self.id, error = %message, "clearing failed, continuing");
                    }
                    // The worker dropped its error sender. Unless this is
                    // our own shutdown, the worker died mid-run.
                    None => {
                        if !cancel.is_cancelled() {
                            result = Err(AgentError::WorkerGone);
                        }
                        break;
                    }
                },
                slot = slots.recv() => {
                    let Some(slot) = slot else { break };
                    let Some(target) = slot.prev() else {
                        debug!(regulator = %self.id, "slot 0 has no market to close, skipping");
                        continue;
                    };
                    match work_tx.try_send(target) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!(regulator = %self.id, slot = %target, "clearing queue full, dropping slot");
                            self.telemetry.record(TelemetryEvent::QueueDrop { component: "regulator" });
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            result = Err(AgentError::WorkerGone);
                            break;
                        }
                    }
                }
            }
        }

        workers.cancel();
        drop(work_tx);
        let _ = worker.await;
        result
    }
}

/// Drain the clearing queue: one mark-end invocation per slot.
async fn clearing_worker<L: Invoker>(
    ledger: Arc<L>,
    authority_key: Option<RevealKey>,
    telemetry: TelemetryHandle,
    mut queue: mpsc::Receiver<Slot>,
    errors: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let slot = tokio::select! {
            _ = cancel.cancelled() => break,
            slot = queue.recv() => match slot {
                Some(slot) => slot,
                None => break,
            },
        };

        let payload = serde_json::to_vec(&authority_key).expect("key serialization failed");
        match ledger
            .invoke(EventId::random(), slot, Action::MarkEnd, &payload)
            .await
        {
            Ok(response) => match serde_json::from_slice::<ClearingPayload>(&response) {
                Ok(payload) => {
                    info!(slot = %slot, outcome = %payload.outcome, "slot cleared");
                    telemetry.record(TelemetryEvent::SlotCleared { payload });
                }
                Err(e) => {
                    report(&errors, format!("slot {slot}: bad clearing response: {e}"));
                }
            },
            Err(e) => {
                report(&errors, format!("slot {slot}: {e}"));
            }
        }
    }
}

/// Hand an error to the control loop; a full (or closed) channel means the
/// loop is already acting on an earlier one, so the message is logged here
/// instead of lost silently.
fn report(errors: &mpsc::Sender<String>, message: String) {
    if let Err(e) = errors.try_send(message) {
        warn!(error = %e.into_inner(), "clearing error not delivered to the control loop");
    }
}
