//! Maps ledger progress onto discrete slot indices.
//!
//! The mapper polls chain height, waits for the configured start block, and
//! emits one slot index per `blocks_per_slot` elapsed blocks. A second loop
//! on its own timer issues no-op clock-tick writes so an otherwise idle
//! ledger keeps producing blocks; tick failures are logged and ignored,
//! while a height-query failure is fatal to the whole simulation.

use sbm_core::{
    models::{EventId, Slot},
    ports::{Action, BlockObserver, Invoker},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Mapper timing and chain-geometry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// The block at which slot 0 opens.
    #[serde(default)]
    pub start_block: u64,

    /// How many blocks one slot spans. Must be positive.
    #[serde(default = "default_blocks_per_slot")]
    pub blocks_per_slot: u64,

    /// How often to poll chain height.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// How often to issue a keep-alive clock tick, independent of polling.
    #[serde(with = "humantime_serde", default = "default_tick_interval")]
    pub tick_interval: Duration,
}

fn default_blocks_per_slot() -> u64 {
    1
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(250)
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            blocks_per_slot: default_blocks_per_slot(),
            poll_interval: default_poll_interval(),
            tick_interval: default_tick_interval(),
        }
    }
}

/// Mapper failures. All of them are fatal: the mapper is the clock of the
/// simulation and everything downstream of it stops when it does.
#[derive(Debug, Error)]
pub enum MapperError<E> {
    /// `blocks_per_slot` must be positive.
    #[error("blocks_per_slot must be positive")]
    InvalidConfig,
    /// The chain was already past the start block when the mapper first saw
    /// it; the start block cannot be skipped silently.
    #[error("chain height {observed} overshot the configured start block {expected}")]
    MissedStartBlock {
        /// The configured start block.
        expected: u64,
        /// The height actually observed.
        observed: u64,
    },
    /// Height queries failed.
    #[error("ledger query failed")]
    Ledger(#[source] E),
    /// The downstream notifier hung up.
    #[error("slot channel closed")]
    ChannelClosed,
}

/// The block-to-slot mapper.
pub struct BlockSlotMapper<L> {
    ledger: L,
    config: MapperConfig,
    out: mpsc::Sender<Slot>,
}

impl<L> BlockSlotMapper<L>
where
    L: BlockObserver + Invoker + Clone + Send + Sync + 'static,
{
    /// Create a mapper feeding slot indices into `out`.
    pub fn new(ledger: L, config: MapperConfig, out: mpsc::Sender<Slot>) -> Self {
        Self {
            ledger,
            config,
            out,
        }
    }

    /// Run until cancellation or a fatal error.
    ///
    /// Both the polling loop and the clock-tick loop are owned here; `run`
    /// does not return until both have stopped, regardless of which one
    /// stopped first.
    pub async fn run(
        self,
        cancel: CancellationToken,
    ) -> Result<(), MapperError<<L as BlockObserver>::Error>> {
        if self.config.blocks_per_slot == 0 {
            return Err(MapperError::InvalidConfig);
        }

        let workers = cancel.child_token();
        let ticker = tokio::spawn(tick_loop(
            self.ledger.clone(),
            self.config.tick_interval,
            workers.clone(),
        ));

        let result = self.poll_loop(&cancel).await;

        // The poll loop is done (error or cancellation); stop the ticker and
        // join it before reporting anything.
        workers.cancel();
        let _ = ticker.await;
        result
    }

    async fn poll_loop(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), MapperError<<L as BlockObserver>::Error>> {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        // Slot of the last emission and the height it was observed at.
        let mut boundary: Option<(Slot, u64)> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = poll.tick() => {}
            }

            let height = self
                .ledger
                .height()
                .await
                .map_err(MapperError::Ledger)?;

            match boundary {
                None => {
                    if height < self.config.start_block {
                        continue;
                    }
                    if height > self.config.start_block {
                        return Err(MapperError::MissedStartBlock {
                            expected: self.config.start_block,
                            observed: height,
                        });
                    }
                    info!(height, "start block reached, opening slot 0");
                    self.emit(Slot(0)).await?;
                    boundary = Some((Slot(0), height));
                }
                Some((slot, boundary_height)) => {
                    let delta = height.saturating_sub(boundary_height);
                    if delta > 0 && delta % self.config.blocks_per_slot == 0 {
                        let next = Slot(slot.0 + delta / self.config.blocks_per_slot);
                        debug!(height, slot = %next, "slot boundary crossed");
                        self.emit(next).await?;
                        boundary = Some((next, height));
                    }
                }
            }
        }
    }

    async fn emit(
        &self,
        slot: Slot,
    ) -> Result<(), MapperError<<L as BlockObserver>::Error>> {
        self.out
            .send(slot)
            .await
            .map_err(|_| MapperError::ChannelClosed)
    }
}

/// Issue a no-op write on a fixed period to force block production.
async fn tick_loop<L: Invoker>(ledger: L, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        if let Err(e) = ledger
            .invoke(EventId::random(), Slot(0), Action::ClockTick, b"null")
            .await
        {
            // Not fatal: the next tick will try again.
            warn!(error = %e, "clock tick failed");
        }
    }
}
