use super::{EventId, Side, Slot};
use serde::{Deserialize, Serialize};

/// The ledger address of one sealed bid.
///
/// Returned by bid intake and quoted back by key posts, so the ledger can
/// match a reveal key to the sealed bid it decrypts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BidLocator {
    /// The slot the bid was submitted for.
    pub slot: Slot,
    /// Which side of the market the bid is on.
    pub side: Side,
    /// The transaction that carried the bid.
    pub event_id: EventId,
}

impl std::fmt::Display for BidLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bid/{}/{}/{}", self.slot, self.side, self.event_id)
    }
}

/// The ledger address of one stored reveal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyLocator {
    /// Locator of the sealed bid this key opens.
    pub bid: BidLocator,
}

impl std::fmt::Display for KeyLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "key/{}/{}/{}", self.bid.slot, self.bid.side, self.bid.event_id)
    }
}

/// A private x25519 secret published after a slot's bidding window closes.
///
/// In the per-bid protocol one key opens one sealed bid; in the batched
/// protocol one key opens every sealed bid a participant placed on one
/// slot/side pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealKey(pub [u8; 32]);

impl RevealKey {
    /// View the raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// Not derived: the secret bytes should never end up in logs.
impl std::fmt::Debug for RevealKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RevealKey(..)")
    }
}
