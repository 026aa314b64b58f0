use super::{Bid, BidLocator, ClearingOutcome, EventId, RevealKey, Slot};
use serde::{Deserialize, Serialize};

/// The JSON-shaped plaintext sealed inside a bid envelope.
///
/// This is the only form in which a bid ever crosses the ledger boundary;
/// the ledger sees it exclusively after decryption at clearing time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BidPayload {
    /// Unit price in the market currency.
    pub price_per_unit: f64,
    /// Quantity in kWh.
    pub quantity_in_kwh: f64,
}

impl From<Bid> for BidPayload {
    fn from(bid: Bid) -> Self {
        Self {
            price_per_unit: bid.price_per_unit,
            quantity_in_kwh: bid.quantity,
        }
    }
}

impl From<BidPayload> for Bid {
    fn from(payload: BidPayload) -> Self {
        Self {
            price_per_unit: payload.price_per_unit,
            quantity: payload.quantity_in_kwh,
        }
    }
}

/// A key post: a reveal key quoted against the sealed bid it opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPostPayload {
    /// Where the sealed bid this key opens was stored.
    pub read_key_locator: BidLocator,
    /// The private key material being revealed.
    pub private_key: RevealKey,
    /// The transaction that originally carried the sealed bid.
    pub originating_tx_id: EventId,
}

/// The persisted result of clearing one slot, returned by the mark-end
/// handler and by result queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearingPayload {
    /// The slot that was cleared.
    pub slot: Slot,
    /// The clearing result, including the explicit no-trade case.
    pub outcome: ClearingOutcome,
    /// Sealed bids that could not be decrypted and were excluded from the
    /// clearing collections.
    pub excluded_bids: u64,
    /// Human-readable summary persisted alongside the outcome.
    pub message: String,
}
