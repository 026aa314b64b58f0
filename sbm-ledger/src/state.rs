use sbm_core::{
    cache::LruCache,
    models::{
        Bid, BidLocator, ClearingPayload, EventId, KeyLocator, Map, RevealKey, Side, Slot,
    },
    ports::Block,
    seal::SealedBid,
};
use serde::{Deserialize, Serialize};

/// The outcome of attempting to decrypt one sealed bid at clearing time.
///
/// Exclusion is an explicit, countable result: a missing or malformed key
/// removes the single offending bid from the clearing collections and never
/// aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Decryption {
    /// The bid decrypted cleanly and joins its collection.
    Decrypted(Bid),
    /// The bid is excluded; the reason is logged and counted.
    Excluded(&'static str),
}

/// Market-wide counters, owned by the ledger and mutated only inside its
/// single lock.
///
/// The end-of-run report surfaces every counter here: a clean-looking run
/// can still have rejected or excluded work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStats {
    /// Sealed bids accepted into open slots.
    pub bids_accepted: u64,
    /// Bids rejected because their slot was already closed.
    pub bids_rejected_closed: u64,
    /// Reveal keys accepted.
    pub keys_posted: u64,
    /// Key posts rejected because their slot was already closed.
    pub keys_rejected_closed: u64,
    /// Key posts referencing a bid the ledger has no index entry for.
    pub keys_unmatched: u64,
    /// Sealed bids excluded from clearing (missing or unusable key).
    pub bids_excluded: u64,
    /// Slots cleared with a trade.
    pub slots_traded: u64,
    /// Slots cleared without an equilibrium.
    pub slots_no_trade: u64,
    /// No-op clock-tick writes processed.
    pub clock_ticks: u64,
    /// Bid-key index entries lost to LRU capacity pressure.
    pub index_evictions: u64,
}

/// Everything the ledger stores for one slot.
#[derive(Default)]
pub(crate) struct SlotState {
    /// Once set, all further bid and key submissions are rejected.
    pub closed: bool,
    /// Sealed bids, addressed by (side, event id) through their locator.
    pub bids: Map<BidLocator, SealedBid>,
    /// Per-bid reveal keys, keyed by the bid they open.
    pub keys: Map<BidLocator, RevealKey>,
    /// Batched reveal keys, merged per side.
    pub side_keys: Map<Side, Vec<RevealKey>>,
    /// Terminal clearing result, set exactly once.
    pub result: Option<ClearingPayload>,
}

/// The full ledger state behind the contract's single lock.
pub(crate) struct LedgerState {
    pub blocks: Vec<Block>,
    pub slots: Map<Slot, SlotState>,
    /// Bounded index mapping each open slot's submitters to their key
    /// locators; consulted when a reveal key must be matched back to the
    /// sealed bid it decrypts.
    pub bid_keys: LruCache<Slot, Map<EventId, KeyLocator>>,
    pub stats: MarketStats,
}

impl LedgerState {
    pub fn new(bid_keys: LruCache<Slot, Map<EventId, KeyLocator>>) -> Self {
        Self {
            // The chain starts with a genesis block at height 0.
            blocks: vec![Block {
                number: 0,
                tx_count: 0,
            }],
            slots: Map::default(),
            bid_keys,
            stats: MarketStats::default(),
        }
    }

    /// Append one block carrying a single transaction.
    pub fn produce_block(&mut self) -> u64 {
        let number = self.blocks.len() as u64;
        self.blocks.push(Block { number, tx_count: 1 });
        number
    }

    pub fn height(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }
}
