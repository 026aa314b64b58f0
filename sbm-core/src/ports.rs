mod ledger;

pub use ledger::{Action, Block, BlockObserver, Invoker, Querier};
