#![warn(missing_docs)]
//! The sealed-bid double-auction clearing rule.
//!
//! Given a collection of buy bids and a collection of sell bids for one
//! slot, [`clear`] computes the single equilibrium trade (or reports that no
//! equilibrium exists). The function is pure and deterministic: the result
//! does not depend on the order bids are supplied in, and there are no side
//! effects.

mod auction;
mod stack;

pub use auction::{ClearingError, clear};
pub use stack::{StackLevel, build_stack};
