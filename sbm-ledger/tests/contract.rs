use sbm_core::{
    models::{
        Bid, BidLocator, ClearingOutcome, ClearingPayload, EventId, KeyLocator, KeyPostPayload,
        MarketConfig, RevealKey, RevealProtocol, Side, Slot,
    },
    ports::{Action, BlockObserver, Invoker, Querier},
    seal::{MarketKeyPair, Sealer, SealedBid},
};
use sbm_ledger::{LedgerError, SealedBidLedger};

fn ledger(reveal: RevealProtocol) -> (SealedBidLedger, MarketKeyPair) {
    let market = MarketKeyPair::generate();
    let config = MarketConfig {
        reveal,
        ..MarketConfig::default()
    };
    let ledger = SealedBidLedger::new(config, market.public()).unwrap();
    (ledger, market)
}

async fn submit(
    ledger: &SealedBidLedger,
    market: &MarketKeyPair,
    slot: Slot,
    action: Action,
    bid: Bid,
) -> Result<(EventId, RevealKey), LedgerError> {
    let (sealed, reveal) = SealedBid::seal(bid, &market.public()).unwrap();
    let event_id = EventId::random();
    ledger
        .invoke(event_id, slot, action, &serde_json::to_vec(&sealed).unwrap())
        .await?;
    Ok((event_id, reveal))
}

async fn post_key(
    ledger: &SealedBidLedger,
    slot: Slot,
    locator: BidLocator,
    key: RevealKey,
) -> Result<KeyLocator, LedgerError> {
    let payload = KeyPostPayload {
        read_key_locator: locator,
        private_key: key,
        originating_tx_id: locator.event_id,
    };
    let response = ledger
        .invoke(
            EventId::random(),
            slot,
            Action::PostKey,
            &serde_json::to_vec(&payload).unwrap(),
        )
        .await?;
    Ok(serde_json::from_slice(&response).unwrap())
}

async fn mark_end(
    ledger: &SealedBidLedger,
    slot: Slot,
    authority: Option<RevealKey>,
) -> Result<ClearingPayload, LedgerError> {
    let response = ledger
        .invoke(
            EventId::random(),
            slot,
            Action::MarkEnd,
            &serde_json::to_vec(&authority).unwrap(),
        )
        .await?;
    Ok(serde_json::from_slice(&response).unwrap())
}

#[tokio::test]
async fn single_key_protocol_clears_with_the_authority_key() {
    let (ledger, market) = ledger(RevealProtocol::SingleKey);
    let slot = Slot(3);

    let buy = Bid::new(10.0, 4.0).unwrap();
    let sell = Bid::new(6.0, 4.0).unwrap();
    submit(&ledger, &market, slot, Action::SubmitBuy, buy)
        .await
        .unwrap();
    submit(&ledger, &market, slot, Action::SubmitSell, sell)
        .await
        .unwrap();

    let result = mark_end(&ledger, slot, Some(market.reveal_key()))
        .await
        .unwrap();
    assert_eq!(
        result.outcome,
        ClearingOutcome::Trade {
            price_per_unit: 8.0,
            quantity: 4.0
        }
    );
    assert_eq!(result.excluded_bids, 0);
}

#[tokio::test]
async fn per_bid_keys_decrypt_only_revealed_bids() {
    let (ledger, market) = ledger(RevealProtocol::PerBidKey);
    let slot = Slot(0);

    let (buy_event, buy_key) = submit(
        &ledger,
        &market,
        slot,
        Action::SubmitBuy,
        Bid::new(9.0, 2.0).unwrap(),
    )
    .await
    .unwrap();
    // This seller never reveals: its bid must be excluded, not fatal.
    submit(
        &ledger,
        &market,
        slot,
        Action::SubmitSell,
        Bid::new(5.0, 2.0).unwrap(),
    )
    .await
    .unwrap();
    let (sell_event, sell_key) = submit(
        &ledger,
        &market,
        slot,
        Action::SubmitSell,
        Bid::new(4.0, 2.0).unwrap(),
    )
    .await
    .unwrap();

    let buy_locator = BidLocator {
        slot,
        side: sbm_core::models::Side::Buy,
        event_id: buy_event,
    };
    let sell_locator = BidLocator {
        slot,
        side: sbm_core::models::Side::Sell,
        event_id: sell_event,
    };
    post_key(&ledger, slot, buy_locator, buy_key).await.unwrap();
    post_key(&ledger, slot, sell_locator, sell_key)
        .await
        .unwrap();

    let result = mark_end(&ledger, slot, None).await.unwrap();
    assert_eq!(result.excluded_bids, 1);
    assert_eq!(
        result.outcome,
        ClearingOutcome::Trade {
            price_per_unit: 6.5,
            quantity: 2.0
        }
    );

    let stats = ledger.stats();
    assert_eq!(stats.bids_accepted, 3);
    assert_eq!(stats.bids_excluded, 1);
    assert_eq!(stats.slots_traded, 1);
}

#[tokio::test]
async fn one_batched_key_opens_every_bid_on_a_side() {
    let (ledger, market) = ledger(RevealProtocol::BatchedKey);
    let slot = Slot(4);

    // Both sell bids share one sealing secret, as a batched-protocol
    // participant would seal them.
    let seller = Sealer::new();
    let mut sell_events = Vec::new();
    for bid in [Bid::new(6.0, 1.0).unwrap(), Bid::new(6.0, 2.0).unwrap()] {
        let sealed = seller.seal(bid, &market.public()).unwrap();
        let event_id = EventId::random();
        ledger
            .invoke(
                event_id,
                slot,
                Action::SubmitSell,
                &serde_json::to_vec(&sealed).unwrap(),
            )
            .await
            .unwrap();
        sell_events.push(event_id);
    }

    let buyer = Sealer::new();
    let sealed = buyer
        .seal(Bid::new(10.0, 4.0).unwrap(), &market.public())
        .unwrap();
    let buy_event = EventId::random();
    ledger
        .invoke(
            buy_event,
            slot,
            Action::SubmitBuy,
            &serde_json::to_vec(&sealed).unwrap(),
        )
        .await
        .unwrap();

    // One reveal per participant and side: the sell key is posted against
    // the first sell bid only, yet must open the second one too.
    let sell_locator = BidLocator {
        slot,
        side: Side::Sell,
        event_id: sell_events[0],
    };
    post_key(&ledger, slot, sell_locator, seller.reveal_key())
        .await
        .unwrap();
    let buy_locator = BidLocator {
        slot,
        side: Side::Buy,
        event_id: buy_event,
    };
    post_key(&ledger, slot, buy_locator, buyer.reveal_key())
        .await
        .unwrap();

    let result = mark_end(&ledger, slot, None).await.unwrap();
    assert_eq!(result.excluded_bids, 0);
    assert_eq!(
        result.outcome,
        ClearingOutcome::Trade {
            price_per_unit: 8.0,
            quantity: 3.0
        }
    );

    let stats = ledger.stats();
    assert_eq!(stats.keys_posted, 2);
    assert_eq!(stats.bids_excluded, 0);
}

#[tokio::test]
async fn submissions_after_mark_end_are_rejected() {
    let (ledger, market) = ledger(RevealProtocol::SingleKey);
    let slot = Slot(1);

    mark_end(&ledger, slot, Some(market.reveal_key()))
        .await
        .unwrap();

    let err = submit(
        &ledger,
        &market,
        slot,
        Action::SubmitBuy,
        Bid::new(8.0, 1.0).unwrap(),
    )
    .await
    .unwrap_err();
    assert_eq!(err, LedgerError::SlotClosed(slot));
    assert_eq!(ledger.stats().bids_rejected_closed, 1);
}

#[tokio::test]
async fn mark_end_is_idempotent() {
    let (ledger, market) = ledger(RevealProtocol::SingleKey);
    let slot = Slot(2);

    submit(
        &ledger,
        &market,
        slot,
        Action::SubmitBuy,
        Bid::new(8.0, 1.0).unwrap(),
    )
    .await
    .unwrap();

    let first = mark_end(&ledger, slot, Some(market.reveal_key()))
        .await
        .unwrap();
    let second = mark_end(&ledger, slot, Some(market.reveal_key()))
        .await
        .unwrap();
    assert_eq!(first, second);
    // A one-sided market is an explicit no-trade, not a failure.
    assert_eq!(first.outcome, ClearingOutcome::NoTrade);
    assert_eq!(ledger.stats().slots_no_trade, 1);
}

#[tokio::test]
async fn cleared_slots_are_queryable() {
    let (ledger, market) = ledger(RevealProtocol::SingleKey);
    let slot = Slot(5);

    assert_eq!(
        ledger
            .query(EventId::random(), Action::QueryResult, slot)
            .await
            .unwrap_err(),
        LedgerError::NotCleared(slot)
    );

    let cleared = mark_end(&ledger, slot, Some(market.reveal_key()))
        .await
        .unwrap();
    let queried: ClearingPayload = serde_json::from_slice(
        &ledger
            .query(EventId::random(), Action::QueryResult, slot)
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(cleared, queried);
}

#[tokio::test]
async fn every_write_produces_a_block() {
    let (ledger, market) = ledger(RevealProtocol::SingleKey);
    assert_eq!(ledger.height().await.unwrap(), 0);

    ledger
        .invoke(EventId::random(), Slot(0), Action::ClockTick, b"null")
        .await
        .unwrap();
    assert_eq!(ledger.height().await.unwrap(), 1);

    submit(
        &ledger,
        &market,
        Slot(0),
        Action::SubmitBuy,
        Bid::new(8.0, 1.0).unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(ledger.height().await.unwrap(), 2);

    let block = ledger.block(2).await.unwrap();
    assert_eq!(block.number, 2);
    assert_eq!(block.tx_count, 1);
}
