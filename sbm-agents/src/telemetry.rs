//! Off-hot-path collection of per-transaction and per-slot statistics.
//!
//! Agents report through a bounded channel and never block on it: when the
//! collector falls behind, events are dropped and the drop itself is
//! counted. The collector is the sole writer of the aggregate tables and
//! keeps draining after cancellation so trailing events are not lost.

use sbm_core::models::{
    ClearingOutcome, ClearingPayload, EventId, Map, Side, Slot, SlotRecord, SubmissionOutcome,
    TxRecord,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// One telemetry datum.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A sealed bid was submitted (successfully or not).
    BidSubmitted {
        /// The submitting transaction.
        event_id: EventId,
        /// The submission record.
        record: TxRecord,
        /// The plaintext quantity, known only to the submitter.
        quantity: f64,
    },
    /// A reveal key was posted.
    KeyPosted {
        /// The posting transaction.
        event_id: EventId,
        /// The submission record.
        record: TxRecord,
    },
    /// A slot was cleared and its result parsed.
    SlotCleared {
        /// The persisted clearing result.
        payload: ClearingPayload,
    },
    /// A bounded queue was full and work was dropped.
    QueueDrop {
        /// Which component dropped.
        component: &'static str,
    },
}

/// Producer-side handle; cheap to clone.
#[derive(Clone)]
pub struct TelemetryHandle {
    tx: mpsc::Sender<TelemetryEvent>,
    dropped: Arc<AtomicU64>,
}

impl TelemetryHandle {
    /// Record an event without blocking. Drops (and counts) the event if the
    /// collector's queue is full.
    pub fn record(&self, event: TelemetryEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The single-writer aggregation loop.
pub struct TelemetryCollector {
    rx: mpsc::Receiver<TelemetryEvent>,
    dropped: Arc<AtomicU64>,
    transactions: Map<EventId, TxRecord>,
    slots: Map<Slot, SlotRecord>,
    queue_drops: Map<&'static str, u64>,
    failed_submissions: u64,
}

impl TelemetryCollector {
    /// Create a collector with the given channel depth, along with the
    /// producer handle.
    pub fn new(depth: usize) -> (Self, TelemetryHandle) {
        let (tx, rx) = mpsc::channel(depth);
        let dropped = Arc::new(AtomicU64::new(0));
        let handle = TelemetryHandle {
            tx,
            dropped: dropped.clone(),
        };
        (
            Self {
                rx,
                dropped,
                transactions: Map::default(),
                slots: Map::default(),
                queue_drops: Map::default(),
                failed_submissions: 0,
            },
            handle,
        )
    }

    /// Run until cancellation (or all producers hang up), then drain any
    /// trailing events and render the final report.
    pub async fn run(mut self, cancel: CancellationToken) -> Report {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => self.absorb(event),
                    None => break,
                },
            }
        }
        // Producers stop after cancellation; whatever is still queued is
        // drained before the tables are frozen.
        while let Ok(event) = self.rx.try_recv() {
            self.absorb(event);
        }
        self.into_report()
    }

    fn absorb(&mut self, event: TelemetryEvent) {
        trace!(?event, "telemetry event");
        match event {
            TelemetryEvent::BidSubmitted {
                event_id,
                record,
                quantity,
            } => {
                if record.outcome.is_success() {
                    let slot = self.slots.entry(record.slot).or_default();
                    match record.side {
                        Some(Side::Buy) => slot.energy_bid += quantity,
                        Some(Side::Sell) => slot.energy_offered += quantity,
                        None => {}
                    }
                } else {
                    self.failed_submissions += 1;
                }
                self.transactions.insert(event_id, record);
            }
            TelemetryEvent::KeyPosted { event_id, record } => {
                if !record.outcome.is_success() {
                    self.failed_submissions += 1;
                }
                self.transactions.insert(event_id, record);
            }
            TelemetryEvent::SlotCleared { payload } => {
                let slot = self.slots.entry(payload.slot).or_default();
                slot.excluded_bids += payload.excluded_bids;
                if let ClearingOutcome::Trade {
                    price_per_unit,
                    quantity,
                } = payload.outcome
                {
                    slot.energy_traded += quantity;
                    slot.clearing_price = Some(price_per_unit);
                }
            }
            TelemetryEvent::QueueDrop { component } => {
                *self.queue_drops.entry(component).or_default() += 1;
            }
        }
    }

    fn into_report(self) -> Report {
        let successes = self
            .transactions
            .values()
            .filter(|r| r.outcome.is_success())
            .count() as u64;
        Report {
            submissions_ok: successes,
            submissions_failed: self.failed_submissions,
            slots: self.slots,
            transactions: self.transactions,
            queue_drops: self.queue_drops,
            telemetry_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// The end-of-run aggregate.
///
/// A clean-looking run can still have silently dropped work, so the report
/// always surfaces the drop and failure counters next to the trade totals.
#[derive(Debug)]
pub struct Report {
    /// Transactions the ledger accepted.
    pub submissions_ok: u64,
    /// Transactions that failed (bids and key posts alike).
    pub submissions_failed: u64,
    /// Per-slot aggregates, keyed by slot.
    pub slots: Map<Slot, SlotRecord>,
    /// Per-transaction records, keyed by transaction ID.
    pub transactions: Map<EventId, TxRecord>,
    /// Work dropped at full queues, keyed by component.
    pub queue_drops: Map<&'static str, u64>,
    /// Telemetry events lost because the collector itself fell behind.
    pub telemetry_dropped: u64,
}

impl Report {
    /// Total energy traded across all cleared slots.
    pub fn total_traded(&self) -> f64 {
        self.slots.values().map(|s| s.energy_traded).sum()
    }

    /// Slots that cleared with a trade.
    pub fn traded_slots(&self) -> usize {
        self.slots
            .values()
            .filter(|s| s.clearing_price.is_some())
            .count()
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "submissions: {} ok, {} failed", self.submissions_ok, self.submissions_failed)?;
        writeln!(
            f,
            "slots: {} observed, {} traded, {:.3} kWh total",
            self.slots.len(),
            self.traded_slots(),
            self.total_traded()
        )?;
        let mut slots: Vec<_> = self.slots.iter().collect();
        slots.sort_by_key(|(slot, _)| **slot);
        for (slot, record) in slots {
            match record.clearing_price {
                Some(price) => writeln!(
                    f,
                    "  slot {slot}: bid {:.3} / offered {:.3} / traded {:.3} @ {price:.3} ({} excluded)",
                    record.energy_bid, record.energy_offered, record.energy_traded, record.excluded_bids
                )?,
                None => writeln!(
                    f,
                    "  slot {slot}: bid {:.3} / offered {:.3} / no trade ({} excluded)",
                    record.energy_bid, record.energy_offered, record.excluded_bids
                )?,
            }
        }
        for (component, count) in &self.queue_drops {
            writeln!(f, "dropped work: {component} x{count}")?;
        }
        write!(f, "telemetry events dropped: {}", self.telemetry_dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbm_core::models::ParticipantId;
    use std::time::Duration;

    fn record(slot: Slot, side: Side, ok: bool) -> TxRecord {
        TxRecord {
            participant: ParticipantId::random(),
            slot,
            side: Some(side),
            latency: Duration::from_millis(1),
            outcome: if ok {
                SubmissionOutcome::Success
            } else {
                SubmissionOutcome::Failure("rejected".into())
            },
        }
    }

    #[tokio::test]
    async fn drains_trailing_events_after_cancellation() {
        let (collector, handle) = TelemetryCollector::new(16);
        let cancel = CancellationToken::new();

        // Cancel first, then enqueue: the events must still be counted.
        cancel.cancel();
        handle.record(TelemetryEvent::BidSubmitted {
            event_id: EventId::random(),
            record: record(Slot(0), Side::Buy, true),
            quantity: 2.5,
        });
        handle.record(TelemetryEvent::QueueDrop { component: "bidder" });

        let report = collector.run(cancel).await;
        assert_eq!(report.submissions_ok, 1);
        assert_eq!(report.queue_drops.get("bidder"), Some(&1));
        assert_eq!(report.slots[&Slot(0)].energy_bid, 2.5);
    }

    #[tokio::test]
    async fn accumulates_energy_totals_in_any_order() {
        let (collector, handle) = TelemetryCollector::new(16);
        let cancel = CancellationToken::new();

        handle.record(TelemetryEvent::SlotCleared {
            payload: ClearingPayload {
                slot: Slot(1),
                outcome: ClearingOutcome::Trade {
                    price_per_unit: 7.0,
                    quantity: 4.0,
                },
                excluded_bids: 1,
                message: "cleared".into(),
            },
        });
        handle.record(TelemetryEvent::BidSubmitted {
            event_id: EventId::random(),
            record: record(Slot(1), Side::Sell, true),
            quantity: 4.0,
        });
        handle.record(TelemetryEvent::BidSubmitted {
            event_id: EventId::random(),
            record: record(Slot(1), Side::Buy, false),
            quantity: 9.0,
        });

        cancel.cancel();
        let report = collector.run(cancel).await;

        let slot = &report.slots[&Slot(1)];
        assert_eq!(slot.energy_traded, 4.0);
        assert_eq!(slot.energy_offered, 4.0);
        // Failed submissions contribute nothing to energy totals.
        assert_eq!(slot.energy_bid, 0.0);
        assert_eq!(slot.clearing_price, Some(7.0));
        assert_eq!(report.submissions_failed, 1);
    }

    #[test]
    fn full_channel_counts_the_drop() {
        let (collector, handle) = TelemetryCollector::new(1);
        handle.record(TelemetryEvent::QueueDrop { component: "a" });
        handle.record(TelemetryEvent::QueueDrop { component: "b" });
        assert_eq!(collector.dropped.load(Ordering::Relaxed), 1);
    }
}
