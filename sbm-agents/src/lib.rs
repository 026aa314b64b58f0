#![warn(missing_docs)]
//! The concurrency pipeline driving the market simulation.
//!
//! Components are connected exclusively by bounded channels: the
//! block-to-slot mapper feeds the slot notifier, which fans slot boundaries
//! out to bidding agents and the regulating agent, all of which report into
//! the telemetry collector. No component ever blocks on a slow consumer:
//! full queues drop work and count the drop instead of applying
//! backpressure, because slot delivery must never stall on one participant.
//!
//! Shutdown is a single [`CancellationToken`](tokio_util::sync::CancellationToken)
//! shared by every component. Each component owns its workers and joins all
//! of them before returning; the first fatal error cancels the token exactly
//! once, and that is the only cross-component kill mechanism.

mod bidder;
mod error;
mod mapper;
mod notifier;
mod regulator;
mod telemetry;

pub use bidder::{BidderConfig, BiddingAgent};
pub use error::AgentError;
pub use mapper::{BlockSlotMapper, MapperConfig, MapperError};
pub use notifier::{NotifierHandle, SlotNotifier};
pub use regulator::{RegulatingAgent, RegulatorConfig};
pub use telemetry::{Report, TelemetryCollector, TelemetryEvent, TelemetryHandle};
