use crate::stack::build_stack;
use sbm_core::models::{BidCollection, ClearingOutcome, Side};
use thiserror::Error;

/// Why no trade was produced.
///
/// Both variants are expected business outcomes of a thin market, not
/// processing failures; the ledger records them as explicit no-trade
/// results.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClearingError {
    /// One side of the market submitted no bids at all.
    #[error("no {0} bids were submitted")]
    NoBids(Side),
    /// The best buy price is strictly below the best sell price.
    #[error("no equilibrium: bid and ask prices do not cross")]
    NoEquilibrium,
}

/// Compute the market-clearing trade for one slot.
///
/// Builds the demand and supply stacks, enumerates every crossing pair of
/// levels, prices each candidate at the midpoint of the two level prices
/// with quantity `min` of the two cumulative quantities, and selects the
/// candidate with the largest quantity, breaking ties toward the largest
/// price.
pub fn clear(
    buyers: &BidCollection,
    sellers: &BidCollection,
) -> Result<ClearingOutcome, ClearingError> {
    if buyers.is_empty() {
        return Err(ClearingError::NoBids(Side::Buy));
    }
    if sellers.is_empty() {
        return Err(ClearingError::NoBids(Side::Sell));
    }

    let demand = build_stack(Side::Buy, buyers);
    let supply = build_stack(Side::Sell, sellers);

    let best_buy = demand
        .iter()
        .map(|l| l.price)
        .fold(f64::NEG_INFINITY, f64::max);
    let best_sell = supply.iter().map(|l| l.price).fold(f64::INFINITY, f64::min);
    if best_buy < best_sell {
        return Err(ClearingError::NoEquilibrium);
    }

    let mut candidates = Vec::new();
    for buy in &demand {
        for sell in &supply {
            if buy.price >= sell.price {
                candidates.push((
                    (buy.price + sell.price) / 2.0,
                    buy.cumulative_quantity.min(sell.cumulative_quantity),
                ));
            }
        }
    }

    // The price check above guarantees at least one crossing pair.
    let (price, quantity) = if candidates.len() == 1 {
        candidates[0]
    } else {
        candidates
            .into_iter()
            .reduce(|best, next| {
                match next.1.total_cmp(&best.1).then(next.0.total_cmp(&best.0)) {
                    std::cmp::Ordering::Greater => next,
                    _ => best,
                }
            })
            .expect("at least one crossing candidate")
    };

    tracing::debug!(price, quantity, "selected clearing candidate");

    Ok(ClearingOutcome::Trade {
        price_per_unit: price,
        quantity,
    })
}
