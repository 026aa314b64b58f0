use crate::models::{EventId, Slot};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// The actions the market contract understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Submit a sealed buy bid for a slot.
    SubmitBuy,
    /// Submit a sealed sell bid for a slot.
    SubmitSell,
    /// Post a reveal key against a previously stored sealed bid.
    PostKey,
    /// Close the slot and compute its clearing result.
    MarkEnd,
    /// A no-op write whose only purpose is to force block production.
    ClockTick,
    /// Read a slot's persisted clearing result.
    QueryResult,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::SubmitBuy => "submit-buy",
            Action::SubmitSell => "submit-sell",
            Action::PostKey => "post-key",
            Action::MarkEnd => "mark-end",
            Action::ClockTick => "clock-tick",
            Action::QueryResult => "query-result",
        };
        f.write_str(s)
    }
}

/// One produced ledger block, as visible to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block's position in the chain, starting at 0.
    pub number: u64,
    /// How many transactions the block carries.
    pub tx_count: u32,
}

/// Capability to submit state-changing actions to the ledger.
///
/// The core never retries: a failed invoke is surfaced to the caller and
/// recorded in telemetry, and any retry policy is layered externally.
pub trait Invoker: Send + Sync {
    /// Transport or contract failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submit `action` for `slot`, with a JSON-encoded payload.
    ///
    /// Returns the contract's JSON-encoded response on success.
    fn invoke(
        &self,
        event_id: EventId,
        slot: Slot,
        action: Action,
        payload: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send;
}

/// Capability for read-only contract calls.
pub trait Querier: Send + Sync {
    /// Transport or contract failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Execute a read-only `action` against `slot`.
    fn query(
        &self,
        event_id: EventId,
        action: Action,
        slot: Slot,
    ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send;
}

/// Capability to watch chain progress, used by the block-to-slot mapper and
/// by end-of-run telemetry.
pub trait BlockObserver: Send + Sync {
    /// Transport failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The current chain height (number of the newest block).
    fn height(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    /// Fetch one block by number.
    fn block(&self, number: u64) -> impl Future<Output = Result<Block, Self::Error>> + Send;
}
