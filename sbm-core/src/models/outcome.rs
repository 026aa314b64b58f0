use serde::{Deserialize, Serialize};

/// The terminal result of clearing one slot.
///
/// Produced at most once per slot; idempotency is enforced by the ledger
/// handler, not by the clearing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClearingOutcome {
    /// An equilibrium trade was found.
    Trade {
        /// The single market-clearing price per kWh.
        price_per_unit: f64,
        /// The quantity traded at that price.
        quantity: f64,
    },
    /// No equilibrium existed (crossed-out prices or an empty side).
    ///
    /// This is an expected business outcome, not a failure.
    NoTrade,
}

impl ClearingOutcome {
    /// The traded quantity, which is zero for a no-trade slot.
    pub fn quantity(&self) -> f64 {
        match self {
            ClearingOutcome::Trade { quantity, .. } => *quantity,
            ClearingOutcome::NoTrade => 0.0,
        }
    }
}

impl std::fmt::Display for ClearingOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClearingOutcome::Trade {
                price_per_unit,
                quantity,
            } => write!(f, "trade {quantity:.3} kWh @ {price_per_unit:.3}"),
            ClearingOutcome::NoTrade => f.write_str("no trade"),
        }
    }
}
