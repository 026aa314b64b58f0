use rand::{Rng as _, SeedableRng as _, rngs::StdRng};
use sbm_agents::{
    BiddingAgent, BlockSlotMapper, RegulatingAgent, SlotNotifier, TelemetryCollector,
};
use sbm_core::models::{ParticipantId, RevealProtocol};
use sbm_core::seal::MarketKeyPair;
use sbm_ledger::SealedBidLedger;
use sbmsim::{AppConfig, Cli, synthesize};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// How long to wait, after the last trace row is submitted, for the trailing
/// slots to be closed and cleared.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // By convention, we leverage `tracing` to instrument and log various
    // operations throughout this project.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::import()?;
    let config = AppConfig::load(&cli)?;

    // A logged seed makes any run reproducible with `--seed`.
    let seed = cli.seed.unwrap_or_else(|| rand::rng().random());
    info!(seed, participants = config.sim.participants, slots = config.sim.slots, "generating traces");
    let mut rng = StdRng::seed_from_u64(seed);

    let keys = MarketKeyPair::generate();
    let ledger = Arc::new(SealedBidLedger::new(config.market.clone(), keys.public())?);

    // One token tears everything down; agents that fail cancel it so the
    // rest of the simulation does not run on without them.
    let cancel = CancellationToken::new();

    let (collector, telemetry) = TelemetryCollector::new(config.sim.telemetry_depth);
    let collector = tokio::spawn(collector.run(cancel.child_token()));

    let (slot_tx, slot_rx) = mpsc::channel(64);
    let (notifier, handle) = SlotNotifier::new(slot_rx);
    let notifier_task = tokio::spawn(notifier.run(cancel.child_token()));

    let authority = match config.market.reveal {
        RevealProtocol::SingleKey => Some(keys.reveal_key()),
        _ => None,
    };
    let regulator = RegulatingAgent::new(
        ParticipantId::random(),
        ledger.clone(),
        authority,
        config.regulator.clone(),
        telemetry.clone(),
    );
    let regulator_task = tokio::spawn({
        let handle = handle.clone();
        let cancel = cancel.clone();
        async move {
            let result = regulator.run(&handle, cancel.clone()).await;
            if result.is_err() {
                cancel.cancel();
            }
            result.map_err(anyhow::Error::new)
        }
    });

    let mut bidders = Vec::with_capacity(config.sim.participants);
    for _ in 0..config.sim.participants {
        let agent = BiddingAgent::new(
            ParticipantId::random(),
            Arc::new(synthesize(&config.sim, &mut rng)),
            ledger.clone(),
            keys.public(),
            config.bidder.clone(),
            telemetry.clone(),
        );
        let handle = handle.clone();
        let cancel = cancel.clone();
        bidders.push(tokio::spawn(async move {
            let result = agent.run(&handle, cancel.clone()).await;
            if result.is_err() {
                cancel.cancel();
            }
            result.map_err(anyhow::Error::new)
        }));
    }

    let mapper = BlockSlotMapper::new((*ledger).clone(), config.mapper.clone(), slot_tx);
    let mapper_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let result = mapper.run(cancel.clone()).await;
            if result.is_err() {
                cancel.cancel();
            }
            result.map_err(anyhow::Error::new)
        }
    });

    let mut failure: Option<anyhow::Error> = None;
    for bidder in bidders {
        if let Err(e) = bidder.await? {
            failure.get_or_insert(e);
        }
    }

    // Every trace is exhausted; the final slots still need their closing
    // notifications, so give the chain time to reach them before stopping.
    if failure.is_none() && !cancel.is_cancelled() {
        let target = config.sim.slots as u64;
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        loop {
            let stats = ledger.stats();
            if stats.slots_traded + stats.slots_no_trade >= target {
                break;
            }
            if cancel.is_cancelled() || tokio::time::Instant::now() >= deadline {
                warn!("stopping before every slot was cleared");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    cancel.cancel();
    for task in [regulator_task, mapper_task] {
        if let Err(e) = task.await? {
            failure.get_or_insert(e);
        }
    }
    notifier_task.await?;
    let report = collector.await?;

    println!("{report}");
    let stats = ledger.stats();
    info!(
        bids_accepted = stats.bids_accepted,
        bids_excluded = stats.bids_excluded,
        keys_posted = stats.keys_posted,
        slots_traded = stats.slots_traded,
        slots_no_trade = stats.slots_no_trade,
        clock_ticks = stats.clock_ticks,
        index_evictions = stats.index_evictions,
        "final ledger counters"
    );

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
