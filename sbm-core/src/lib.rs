#![warn(missing_docs)]
//! Domain models and ports for the sealed-bid double-auction market.
//!
//! This crate is the hub of the workspace: it defines the entities every
//! other crate speaks in (slots, bids, sealed bids, clearing outcomes), the
//! capability traits the agents consume (`Invoker`, `Querier`,
//! `BlockObserver`), the bounded LRU cache used for bid-key indexing, and
//! the commit/reveal envelope that keeps bids opaque while a slot is open.

/// Core domain models for the market simulation.
///
/// The models in this module are primarily data structures with minimal
/// business logic, keeping domain entities separate from the ledger and
/// agent implementations that process them.
pub mod models;

/// Capability traits connecting the agents to a ledger implementation.
///
/// These are the "ports" of the hexagonal layout: agents are written against
/// these traits, and `sbm-ledger` provides the in-memory adapter.
pub mod ports;

/// A bounded, concurrency-safe LRU cache.
pub mod cache;

/// The sealed-bid envelope: public-key encryption with a revealable secret.
pub mod seal;
