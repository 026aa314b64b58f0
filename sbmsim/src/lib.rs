#![warn(missing_docs)]
//! Wiring for the sealed-bid market simulation binary: command line,
//! layered configuration, and synthetic household trace generation.

mod cli;
pub use cli::Cli;

mod config;
pub use config::{AppConfig, SimConfig};

mod trace;
pub use trace::synthesize;
