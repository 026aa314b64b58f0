use crate::state::{Decryption, LedgerState, MarketStats, SlotState};
use sbm_core::{
    cache::{CacheError, LruCache},
    models::{
        Bid, BidCollection, BidLocator, ClearingOutcome, ClearingPayload, EventId, KeyLocator,
        KeyPostPayload, MarketConfig, RevealKey, RevealProtocol, Side, Slot,
    },
    ports::{Action, Block, BlockObserver, Invoker, Querier},
    seal::SealedBid,
};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};
use x25519_dalek::PublicKey;

/// Contract-level failures surfaced through invoke and query results.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    /// The target slot was already marked closed.
    #[error("slot {0} is closed")]
    SlotClosed(Slot),
    /// A key post referenced a bid with no index entry.
    #[error("no sealed bid indexed at {0}")]
    UnknownBid(BidLocator),
    /// A result query hit a slot that has not been cleared yet.
    #[error("slot {0} has not been cleared")]
    NotCleared(Slot),
    /// The request payload did not decode.
    #[error("malformed payload: {0}")]
    Payload(String),
    /// The action is not valid on this interface (e.g. a write sent to the
    /// query endpoint).
    #[error("action {0} is not supported here")]
    Unsupported(Action),
}

/// The in-memory market ledger.
///
/// Cheap to clone; all clones share one state behind a single lock, which is
/// never held across an await point.
#[derive(Clone)]
pub struct SealedBidLedger {
    inner: Arc<Mutex<LedgerState>>,
    config: MarketConfig,
    market_public: PublicKey,
}

impl SealedBidLedger {
    /// Create an empty ledger holding only a genesis block.
    pub fn new(config: MarketConfig, market_public: PublicKey) -> Result<Self, CacheError> {
        let bid_keys = LruCache::new(config.bid_key_slots)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(LedgerState::new(bid_keys))),
            config,
            market_public,
        })
    }

    /// Snapshot of the aggregate market counters.
    pub fn stats(&self) -> MarketStats {
        self.lock().stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bid intake: store a sealed bid for an open slot and index it for
    /// later key matching. Returns the bid's locator.
    fn submit_bid(
        &self,
        event_id: EventId,
        slot: Slot,
        side: Side,
        sealed: SealedBid,
    ) -> Result<BidLocator, LedgerError> {
        let mut inner = self.lock();
        let state = inner.slots.entry(slot).or_default();
        if state.closed {
            inner.stats.bids_rejected_closed += 1;
            return Err(LedgerError::SlotClosed(slot));
        }

        let locator = BidLocator {
            slot,
            side,
            event_id,
        };
        state.bids.insert(locator, sealed);

        let mut index = inner.bid_keys.get(&slot).unwrap_or_default();
        index.insert(event_id, KeyLocator { bid: locator });
        if let Some((evicted, _)) = inner.bid_keys.put(slot, index) {
            // An evicted index orphans that slot's reveal keys.
            warn!(slot = %evicted, "bid-key index evicted under capacity pressure");
            inner.stats.index_evictions += 1;
        }

        inner.stats.bids_accepted += 1;
        inner.produce_block();
        Ok(locator)
    }

    /// Key posting: store or merge a reveal key for an open slot.
    fn post_key(
        &self,
        slot: Slot,
        payload: KeyPostPayload,
    ) -> Result<KeyLocator, LedgerError> {
        let mut inner = self.lock();
        let state = inner.slots.entry(slot).or_default();
        if state.closed {
            inner.stats.keys_rejected_closed += 1;
            return Err(LedgerError::SlotClosed(slot));
        }

        let indexed = inner
            .bid_keys
            .get(&slot)
            .and_then(|index| index.get(&payload.originating_tx_id).copied());
        let Some(locator) = indexed else {
            inner.stats.keys_unmatched += 1;
            return Err(LedgerError::UnknownBid(payload.read_key_locator));
        };

        let state = inner.slots.entry(slot).or_default();
        if self.config.reveal == RevealProtocol::BatchedKey {
            state
                .side_keys
                .entry(locator.bid.side)
                .or_default()
                .push(payload.private_key);
        } else {
            state.keys.insert(locator.bid, payload.private_key);
        }

        inner.stats.keys_posted += 1;
        inner.produce_block();
        Ok(locator)
    }

    /// Mark-end: close the slot, decrypt what can be decrypted, clear the
    /// market, and persist the terminal result.
    ///
    /// The close happens before any bid is examined, which is what makes the
    /// protocol sealed: nothing submitted after this call can influence the
    /// slot. Calling mark-end on an already-cleared slot returns the
    /// persisted result unchanged.
    fn mark_end(
        &self,
        slot: Slot,
        authority_key: Option<RevealKey>,
    ) -> Result<ClearingPayload, LedgerError> {
        let mut inner = self.lock();
        let state = inner.slots.entry(slot).or_default();

        if state.closed {
            return state
                .result
                .clone()
                .ok_or(LedgerError::SlotClosed(slot));
        }
        state.closed = true;

        let mut excluded = 0u64;
        let mut buyers = BidCollection::default();
        let mut sellers = BidCollection::default();
        for (locator, sealed) in &state.bids {
            match decrypt_bid(
                sealed,
                state,
                locator,
                authority_key.as_ref(),
                &self.market_public,
            ) {
                Decryption::Decrypted(bid) => match locator.side {
                    Side::Buy => buyers.0.push(bid),
                    Side::Sell => sellers.0.push(bid),
                },
                Decryption::Excluded(reason) => {
                    debug!(bid = %locator, reason, "sealed bid excluded from clearing");
                    excluded += 1;
                }
            }
        }

        let (outcome, message) = match sbm_clearing::clear(&buyers, &sellers) {
            Ok(outcome) => (outcome, "cleared".to_string()),
            Err(e) => (ClearingOutcome::NoTrade, e.to_string()),
        };

        let payload = ClearingPayload {
            slot,
            outcome,
            excluded_bids: excluded,
            message,
        };
        state.result = Some(payload.clone());

        match outcome {
            ClearingOutcome::Trade { .. } => inner.stats.slots_traded += 1,
            ClearingOutcome::NoTrade => inner.stats.slots_no_trade += 1,
        }
        inner.stats.bids_excluded += excluded;
        inner.bid_keys.remove(&slot);
        inner.produce_block();

        debug!(slot = %slot, outcome = %payload.outcome, excluded, "slot cleared");
        Ok(payload)
    }

    /// A no-op write that only forces block production.
    fn clock_tick(&self) -> u64 {
        let mut inner = self.lock();
        inner.stats.clock_ticks += 1;
        inner.produce_block()
    }

    fn query_result(&self, slot: Slot) -> Result<ClearingPayload, LedgerError> {
        let inner = self.lock();
        inner
            .slots
            .get(&slot)
            .and_then(|state| state.result.clone())
            .ok_or(LedgerError::NotCleared(slot))
    }
}

/// Try every key source available for one sealed bid, in priority order:
/// the authority key supplied with mark-end, then the bid's own posted key,
/// then any batched key merged for the bid's side.
fn decrypt_bid(
    sealed: &SealedBid,
    state: &SlotState,
    locator: &BidLocator,
    authority_key: Option<&RevealKey>,
    market_public: &PublicKey,
) -> Decryption {
    let validate = |bid: Bid| {
        if bid.quantity > 0.0 && bid.quantity.is_finite() && bid.price_per_unit.is_finite() {
            Decryption::Decrypted(bid)
        } else {
            Decryption::Excluded("decrypted bid is malformed")
        }
    };

    if let Some(key) = authority_key {
        return match sealed.open_with_market_key(key) {
            Ok(bid) => validate(bid),
            Err(_) => Decryption::Excluded("authority key does not open this bid"),
        };
    }

    if let Some(key) = state.keys.get(locator) {
        return match sealed.open_with_reveal(key, market_public) {
            Ok(bid) => validate(bid),
            Err(_) => Decryption::Excluded("posted key does not open this bid"),
        };
    }

    if let Some(keys) = state.side_keys.get(&locator.side) {
        for key in keys {
            if let Ok(bid) = sealed.open_with_reveal(key, market_public) {
                return validate(bid);
            }
        }
    }

    Decryption::Excluded("no reveal key arrived")
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, LedgerError> {
    serde_json::from_slice(payload).map_err(|e| LedgerError::Payload(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    // All response types serialize infallibly.
    serde_json::to_vec(value).expect("response serialization failed")
}

impl Invoker for SealedBidLedger {
    type Error = LedgerError;

    async fn invoke(
        &self,
        event_id: EventId,
        slot: Slot,
        action: Action,
        payload: &[u8],
    ) -> Result<Vec<u8>, Self::Error> {
        match action {
            Action::SubmitBuy => {
                let sealed: SealedBid = decode(payload)?;
                self.submit_bid(event_id, slot, Side::Buy, sealed)
                    .map(|locator| encode(&locator))
            }
            Action::SubmitSell => {
                let sealed: SealedBid = decode(payload)?;
                self.submit_bid(event_id, slot, Side::Sell, sealed)
                    .map(|locator| encode(&locator))
            }
            Action::PostKey => {
                let post: KeyPostPayload = decode(payload)?;
                self.post_key(slot, post).map(|locator| encode(&locator))
            }
            Action::MarkEnd => {
                let authority: Option<RevealKey> = decode(payload)?;
                self.mark_end(slot, authority).map(|result| encode(&result))
            }
            Action::ClockTick => {
                self.clock_tick();
                Ok(Vec::new())
            }
            Action::QueryResult => Err(LedgerError::Unsupported(action)),
        }
    }
}

impl Querier for SealedBidLedger {
    type Error = LedgerError;

    async fn query(
        &self,
        _event_id: EventId,
        action: Action,
        slot: Slot,
    ) -> Result<Vec<u8>, Self::Error> {
        match action {
            Action::QueryResult => self.query_result(slot).map(|result| encode(&result)),
            _ => Err(LedgerError::Unsupported(action)),
        }
    }
}

impl BlockObserver for SealedBidLedger {
    type Error = LedgerError;

    async fn height(&self) -> Result<u64, Self::Error> {
        Ok(self.lock().height())
    }

    async fn block(&self, number: u64) -> Result<Block, Self::Error> {
        let inner = self.lock();
        inner
            .blocks
            .get(number as usize)
            .copied()
            .ok_or(LedgerError::Payload(format!("no block {number}")))
    }
}
