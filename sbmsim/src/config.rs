//! Application configuration management.
//!
//! Configuration is merged from three sources with a clear precedence order:
//! environment variables over a TOML file over built-in defaults.

use crate::Cli;
use sbm_agents::{BidderConfig, MapperConfig, RegulatorConfig};
use sbm_core::models::MarketConfig;
use serde::{Deserialize, Serialize};

/// Simulation-level knobs: how many participants, for how many slots, and
/// the envelope the synthetic traces are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// How many bidding agents to run.
    #[serde(default = "default_participants")]
    pub participants: usize,

    /// How many slots each agent's trace covers.
    #[serde(default = "default_slots")]
    pub slots: usize,

    /// Lower bound for per-row price bands.
    #[serde(default = "default_price_floor")]
    pub price_floor: f64,

    /// Upper bound for per-row price bands.
    #[serde(default = "default_price_ceiling")]
    pub price_ceiling: f64,

    /// Maximum per-slot generation in a trace row.
    #[serde(default = "default_max_energy")]
    pub max_generation: f64,

    /// Maximum per-slot consumption in a trace row.
    #[serde(default = "default_max_energy")]
    pub max_consumption: f64,

    /// Depth of the telemetry event queue.
    #[serde(default = "default_telemetry_depth")]
    pub telemetry_depth: usize,
}

fn default_participants() -> usize {
    4
}

fn default_slots() -> usize {
    12
}

fn default_price_floor() -> f64 {
    4.0
}

fn default_price_ceiling() -> f64 {
    12.0
}

fn default_max_energy() -> f64 {
    5.0
}

fn default_telemetry_depth() -> usize {
    256
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            participants: default_participants(),
            slots: default_slots(),
            price_floor: default_price_floor(),
            price_ceiling: default_price_ceiling(),
            max_generation: default_max_energy(),
            max_consumption: default_max_energy(),
            telemetry_depth: default_telemetry_depth(),
        }
    }
}

/// The main application configuration that composes all component configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Market contract configuration (chain geometry, reveal protocol).
    #[serde(default)]
    pub market: MarketConfig,

    /// Block-to-slot mapper timing. The `market` section is authoritative
    /// for chain geometry and overrides the mapper's copy at startup.
    #[serde(default)]
    pub mapper: MapperConfig,

    /// Bidding agent configuration. The `market` section is authoritative
    /// for the reveal protocol and unit conversion.
    #[serde(default)]
    pub bidder: BidderConfig,

    /// Regulating agent configuration.
    #[serde(default)]
    pub regulator: RegulatorConfig,

    /// Simulation scale and trace envelope.
    #[serde(default)]
    pub sim: SimConfig,
}

impl AppConfig {
    /// Load configuration with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file given by the CLI
    /// 3. Default values (lowest priority)
    ///
    /// Environment variables are mapped using the pattern
    /// `APP_<SECTION>__<KEY>` to `<section>.<key>`, e.g.
    /// `APP_MARKET__BLOCKS_PER_SLOT=3` or `APP_SIM__PARTICIPANTS=16`.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = &cli.config {
            if path.exists() {
                config = config.add_source(config::File::from(path.as_path()))
            } else {
                return Err(anyhow::anyhow!(
                    "Config file {} does not exist",
                    path.display()
                ));
            }
        }

        config = config.add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: Self = config.build()?.try_deserialize()?;
        loaded.reconcile();
        Ok(loaded)
    }

    /// Copy the authoritative `market` values into the component configs
    /// that carry their own copies.
    fn reconcile(&mut self) {
        self.mapper.start_block = self.market.start_block;
        self.mapper.blocks_per_slot = self.market.blocks_per_slot;
        self.bidder.reveal = self.market.reveal;
        self.bidder.kwh_conversion = self.market.kwh_conversion;
    }
}
