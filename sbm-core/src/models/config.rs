use serde::{Deserialize, Serialize};

/// How reveal keys reach the ledger.
///
/// Selected once per run and injected into the agents and the ledger; no
/// component branches on anything other than this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevealProtocol {
    /// Bidders never reveal anything; the clearing authority attaches the
    /// market's private key to the mark-end call.
    SingleKey,
    /// Every sealed bid uses a fresh ephemeral secret, revealed individually
    /// once the bidding window closes.
    #[default]
    PerBidKey,
    /// One secret per participant, slot, and side; revealed once and merged
    /// into a per-slot key map on the ledger.
    BatchedKey,
}

impl RevealProtocol {
    /// Whether bidding agents are expected to post reveal keys at all.
    pub fn bidders_reveal(&self) -> bool {
        !matches!(self, RevealProtocol::SingleKey)
    }
}

/// Market-wide parameters shared by the agents and the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// The ledger block at which slot 0 opens.
    #[serde(default)]
    pub start_block: u64,

    /// How many blocks one slot spans. Must be positive.
    #[serde(default = "default_blocks_per_slot")]
    pub blocks_per_slot: u64,

    /// Factor converting trace energy readings into kWh bid quantities.
    #[serde(default = "default_kwh_conversion")]
    pub kwh_conversion: f64,

    /// The commit/reveal protocol in force for this run.
    #[serde(default)]
    pub reveal: RevealProtocol,

    /// Capacity of the ledger's bid-key index cache, in slots.
    ///
    /// Evicting a slot that is still open orphans its reveal keys, so this
    /// should comfortably exceed the number of concurrently open slots.
    #[serde(default = "default_bid_key_slots")]
    pub bid_key_slots: usize,
}

fn default_blocks_per_slot() -> u64 {
    1
}

fn default_kwh_conversion() -> f64 {
    1.0
}

fn default_bid_key_slots() -> usize {
    64
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            blocks_per_slot: default_blocks_per_slot(),
            kwh_conversion: default_kwh_conversion(),
            reveal: RevealProtocol::default(),
            bid_key_slots: default_bid_key_slots(),
        }
    }
}
