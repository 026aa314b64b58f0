use super::{ParticipantId, Side, Slot};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a submission ended, as seen by the submitting agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    /// The ledger accepted the transaction.
    Success,
    /// The ledger (or the transport) rejected it; the error text is kept
    /// verbatim for the end-of-run report.
    Failure(String),
}

impl SubmissionOutcome {
    /// Whether the submission succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionOutcome::Success)
    }
}

/// Append-only record of one submitted transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxRecord {
    /// Who submitted it.
    pub participant: ParticipantId,
    /// The slot it targeted.
    pub slot: Slot,
    /// Which side of the market, where applicable.
    pub side: Option<Side>,
    /// Wall-clock time between submission and response.
    pub latency: Duration,
    /// Terminal outcome.
    pub outcome: SubmissionOutcome,
}

/// Aggregated per-slot statistics.
///
/// Energy totals are additive and may be accumulated from events arriving
/// out of chronological order; arrival order carries no meaning here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Total kWh offered across all buy bids observed for the slot.
    pub energy_bid: f64,
    /// Total kWh offered across all sell bids observed for the slot.
    pub energy_offered: f64,
    /// kWh actually traded at clearing, zero for a no-trade slot.
    pub energy_traded: f64,
    /// The clearing price, if the slot cleared with a trade.
    pub clearing_price: Option<f64>,
    /// Sealed bids excluded from clearing for this slot.
    pub excluded_bids: u64,
}
