//! The per-participant bidding agent.
//!
//! Each agent owns two bounded work queues (buy and sell), each drained by
//! its own worker, so both sides of a slot proceed concurrently. The
//! control loop only routes slot notifications; all ledger traffic happens
//! in the workers. A full queue drops the slot's work for that side rather
//! than stalling slot delivery.

use crate::{
    error::AgentError,
    notifier::NotifierHandle,
    telemetry::{TelemetryEvent, TelemetryHandle},
};
use rand::Rng as _;
use sbm_core::{
    cache::LruCache,
    models::{
        Bid, BidLocator, EventId, KeyPostPayload, ParticipantId, RevealKey, RevealProtocol, Side,
        Slot, SubmissionOutcome, Trace, TraceRow, TxRecord,
    },
    ports::{Action, Invoker},
    seal::{PublicKey, SealedBid, Sealer},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bidding agent tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidderConfig {
    /// Depth of the slot-notification queue and of each side's work queue.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Capacity (in slot/side pairs) of the reveal-locator cache.
    #[serde(default = "default_locator_slots")]
    pub locator_slots: usize,

    /// Factor converting trace energy readings into kWh quantities.
    #[serde(default = "default_kwh_conversion")]
    pub kwh_conversion: f64,

    /// The commit/reveal protocol in force.
    #[serde(default)]
    pub reveal: RevealProtocol,
}

fn default_queue_depth() -> usize {
    8
}

fn default_locator_slots() -> usize {
    32
}

fn default_kwh_conversion() -> f64 {
    1.0
}

impl Default for BidderConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            locator_slots: default_locator_slots(),
            kwh_conversion: default_kwh_conversion(),
            reveal: RevealProtocol::default(),
        }
    }
}

type LocatorCache = Arc<LruCache<(Slot, Side), Vec<(BidLocator, RevealKey)>>>;

/// One market participant.
pub struct BiddingAgent<L> {
    id: ParticipantId,
    trace: Arc<Trace>,
    ledger: Arc<L>,
    market_public: PublicKey,
    config: BidderConfig,
    telemetry: TelemetryHandle,
}

impl<L> BiddingAgent<L>
where
    L: Invoker + 'static,
{
    /// Create an agent driven by `trace` and submitting through `ledger`.
    pub fn new(
        id: ParticipantId,
        trace: Arc<Trace>,
        ledger: Arc<L>,
        market_public: PublicKey,
        config: BidderConfig,
        telemetry: TelemetryHandle,
    ) -> Self {
        Self {
            id,
            trace,
            ledger,
            market_public,
            config,
            telemetry,
        }
    }

    /// Register with the notifier and run until the trace is exhausted, the
    /// token is cancelled, or a fatal error occurs.
    ///
    /// Both workers are joined before this returns.
    pub async fn run(
        self,
        notifier: &NotifierHandle,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let (slot_tx, mut slots) = mpsc::channel(self.config.queue_depth);
        if !notifier.register(self.id, slot_tx) {
            return Err(AgentError::Registration(self.id));
        }

        let locators: LocatorCache = Arc::new(
            LruCache::new(self.config.locator_slots)
                .map_err(|e| AgentError::Config(e.to_string()))?,
        );

        let workers = cancel.child_token();
        let (buy_tx, buy_rx) = mpsc::channel(self.config.queue_depth);
        let (sell_tx, sell_rx) = mpsc::channel(self.config.queue_depth);
        let buy_worker = tokio::spawn(
            self.worker(Side::Buy, locators.clone())
                .run(buy_rx, workers.clone()),
        );
        let sell_worker = tokio::spawn(
            self.worker(Side::Sell, locators.clone())
                .run(sell_rx, workers.clone()),
        );

        let mut result = Ok(());
        'control: loop {
            let slot = tokio::select! {
                _ = cancel.cancelled() => break,
                slot = slots.recv() => match slot {
                    Some(slot) => slot,
                    None => break,
                },
            };

            // The arrival of slot s closes the bidding window for s - 1.
            if self.config.reveal.bidders_reveal() {
                if let Some(closed) = slot.prev() {
                    self.reveal(closed, &locators).await;
                }
            }

            let row_idx = slot.0 as usize;
            if self.trace.row(row_idx).is_none() {
                debug!(participant = %self.id, slot = %slot, "trace exhausted");
                break;
            }

            for (side, queue) in [(Side::Buy, &buy_tx), (Side::Sell, &sell_tx)] {
                match queue.try_send(row_idx) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // Dropped, not retried: the slot-delivery path must
                        // not wait on a slow worker.
                        warn!(participant = %self.id, slot = %slot, %side, "work queue full, dropping slot");
                        self.telemetry
                            .record(TelemetryEvent::QueueDrop { component: "bidder" });
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        result = Err(AgentError::WorkerGone);
                        break 'control;
                    }
                }
            }

            if self.trace.is_last_row(row_idx) {
                debug!(participant = %self.id, slot = %slot, "last trace row handled, terminating");
                break;
            }
        }

        // Stop accepting work, then wait for both workers to exit.
        workers.cancel();
        drop(buy_tx);
        drop(sell_tx);
        let _ = buy_worker.await;
        let _ = sell_worker.await;
        result
    }

    fn worker(&self, side: Side, locators: LocatorCache) -> Worker<L> {
        Worker {
            participant: self.id,
            side,
            trace: self.trace.clone(),
            ledger: self.ledger.clone(),
            market_public: self.market_public,
            config: self.config.clone(),
            telemetry: self.telemetry.clone(),
            locators,
            sealer: match self.config.reveal {
                RevealProtocol::BatchedKey => Some(Sealer::new()),
                _ => None,
            },
        }
    }

    /// Post the reveal keys for every bid cached against `slot`.
    ///
    /// An empty cache for the slot is a no-op; a failed post is telemetry,
    /// not a fatal error.
    async fn reveal(&self, slot: Slot, locators: &LocatorCache) {
        for side in [Side::Buy, Side::Sell] {
            let Some(list) = locators.remove(&(slot, side)) else {
                continue;
            };
            for (locator, key) in list {
                let payload = KeyPostPayload {
                    read_key_locator: locator,
                    private_key: key,
                    originating_tx_id: locator.event_id,
                };
                let event_id = EventId::random();
                let started = Instant::now();
                let outcome = match self
                    .ledger
                    .invoke(event_id, slot, Action::PostKey, &encode(&payload))
                    .await
                {
                    Ok(_) => SubmissionOutcome::Success,
                    Err(e) => {
                        warn!(participant = %self.id, slot = %slot, error = %e, "key reveal failed");
                        SubmissionOutcome::Failure(e.to_string())
                    }
                };
                self.telemetry.record(TelemetryEvent::KeyPosted {
                    event_id,
                    record: TxRecord {
                        participant: self.id,
                        slot,
                        side: Some(side),
                        latency: started.elapsed(),
                        outcome,
                    },
                });
            }
        }
    }
}

/// One side's submission worker.
struct Worker<L> {
    participant: ParticipantId,
    side: Side,
    trace: Arc<Trace>,
    ledger: Arc<L>,
    market_public: PublicKey,
    config: BidderConfig,
    telemetry: TelemetryHandle,
    locators: LocatorCache,
    /// Present only in the batched protocol: one sealing secret reused for
    /// every bid this worker submits.
    sealer: Option<Sealer>,
}

impl<L: Invoker> Worker<L> {
    async fn run(self, mut queue: mpsc::Receiver<usize>, cancel: CancellationToken) {
        loop {
            let row_idx = tokio::select! {
                _ = cancel.cancelled() => break,
                row = queue.recv() => match row {
                    Some(row) => row,
                    None => break,
                },
            };
            self.handle(row_idx).await;
        }
    }

    async fn handle(&self, row_idx: usize) {
        let Some(row) = self.trace.row(row_idx) else {
            return;
        };
        let amount = match self.side {
            Side::Buy => row.consumption,
            Side::Sell => row.generation,
        };
        if amount <= 0.0 {
            return;
        }

        let price = self.draw_price(row);
        let bid = match Bid::new(price, amount * self.config.kwh_conversion) {
            Ok(bid) => bid,
            Err(e) => {
                debug!(participant = %self.participant, row = row_idx, error = %e, "trace row yields no valid bid");
                return;
            }
        };

        let slot = Slot(row_idx as u64);
        let sealed = match &self.sealer {
            Some(sealer) => sealer
                .seal(bid, &self.market_public)
                .map(|sealed| (sealed, sealer.reveal_key())),
            None => SealedBid::seal(bid, &self.market_public),
        };
        let (sealed, key) = match sealed {
            Ok(pair) => pair,
            Err(e) => {
                warn!(participant = %self.participant, slot = %slot, error = %e, "sealing failed");
                return;
            }
        };

        let action = match self.side {
            Side::Buy => Action::SubmitBuy,
            Side::Sell => Action::SubmitSell,
        };
        let event_id = EventId::random();
        let started = Instant::now();
        let outcome = match self
            .ledger
            .invoke(event_id, slot, action, &encode(&sealed))
            .await
        {
            Ok(response) => match serde_json::from_slice::<BidLocator>(&response) {
                Ok(locator) => {
                    if self.config.reveal.bidders_reveal() {
                        // Only this worker writes this (slot, side) key.
                        let mut list = self
                            .locators
                            .get(&(slot, self.side))
                            .unwrap_or_default();
                        list.push((locator, key));
                        self.locators.put((slot, self.side), list);
                    }
                    SubmissionOutcome::Success
                }
                Err(e) => SubmissionOutcome::Failure(format!("bad locator response: {e}")),
            },
            Err(e) => SubmissionOutcome::Failure(e.to_string()),
        };

        self.telemetry.record(TelemetryEvent::BidSubmitted {
            event_id,
            record: TxRecord {
                participant: self.participant,
                slot,
                side: Some(self.side),
                latency: started.elapsed(),
                outcome,
            },
            quantity: bid.quantity,
        });
    }

    /// Draw a price within the row's band, biased toward the deadline side
    /// of the market: buyers trend toward the high bound, sellers toward
    /// the low bound.
    fn draw_price(&self, row: &TraceRow) -> f64 {
        let u: f64 = rand::rng().random();
        let span = row.high_price - row.low_price;
        match self.side {
            Side::Buy => row.low_price + span * u.sqrt(),
            Side::Sell => row.low_price + span * u * u,
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    // All payload types serialize infallibly.
    serde_json::to_vec(value).expect("payload serialization failed")
}
