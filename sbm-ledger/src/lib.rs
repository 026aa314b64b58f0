#![warn(missing_docs)]
//! An in-memory sealed-bid ledger.
//!
//! This crate is the adapter behind the `sbm-core` ports: it stores sealed
//! bids and reveal keys, produces one block per state-changing invocation
//! (clock ticks exist solely to keep the chain moving on an otherwise idle
//! market), and runs the close-then-clear protocol that gives slots their
//! sealed-bid property. Nothing submitted after a slot's mark-end call can
//! influence that slot's clearing result.

mod contract;
mod state;

pub use contract::{LedgerError, SealedBidLedger};
pub use state::{Decryption, MarketStats};
