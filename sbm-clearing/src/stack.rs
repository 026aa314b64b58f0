use sbm_core::models::{BidCollection, Side};

/// One level of a demand or supply stack: a price and the cumulative
/// quantity tradable at or better than that price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackLevel {
    /// The bid price at this level.
    pub price: f64,
    /// Cumulative quantity, summed from the best price toward this one.
    pub cumulative_quantity: f64,
}

/// Build the stack for one side of the market.
///
/// Bids are first ordered price-best-first (buyers descending, sellers
/// ascending) and a running cumulative quantity is computed; the levels are
/// then re-sorted into decreasing cumulative-quantity order, so each
/// position pairs a price with the total quantity that trades if that price
/// is marginal.
pub fn build_stack(side: Side, bids: &BidCollection) -> Vec<StackLevel> {
    let mut ordered: Vec<_> = bids.0.clone();
    match side {
        Side::Buy => ordered.sort_by(|a, b| b.price_per_unit.total_cmp(&a.price_per_unit)),
        Side::Sell => ordered.sort_by(|a, b| a.price_per_unit.total_cmp(&b.price_per_unit)),
    }

    let mut cumulative = 0.0;
    let mut stack: Vec<StackLevel> = ordered
        .into_iter()
        .map(|bid| {
            cumulative += bid.quantity;
            StackLevel {
                price: bid.price_per_unit,
                cumulative_quantity: cumulative,
            }
        })
        .collect();

    stack.sort_by(|a, b| b.cumulative_quantity.total_cmp(&a.cumulative_quantity));
    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbm_core::models::Bid;

    fn bids(pairs: &[(f64, f64)]) -> BidCollection {
        pairs
            .iter()
            .map(|&(p, q)| Bid::new(p, q).unwrap())
            .collect()
    }

    #[test]
    fn buyer_stack_orders_by_descending_cumulative_quantity() {
        let stack = build_stack(Side::Buy, &bids(&[(8.0, 3.0), (10.0, 5.0)]));
        // Walking price-best-first: (10, 5) then (8, 5+3); the re-sort puts
        // the largest cumulative quantity first.
        assert_eq!(stack[0].price, 8.0);
        assert_eq!(stack[0].cumulative_quantity, 8.0);
        assert_eq!(stack[1].price, 10.0);
        assert_eq!(stack[1].cumulative_quantity, 5.0);
    }

    #[test]
    fn seller_stack_accumulates_from_the_cheapest() {
        let stack = build_stack(Side::Sell, &bids(&[(6.0, 2.0), (4.0, 4.0)]));
        assert_eq!(stack[0].price, 6.0);
        assert_eq!(stack[0].cumulative_quantity, 6.0);
        assert_eq!(stack[1].price, 4.0);
        assert_eq!(stack[1].cumulative_quantity, 4.0);
    }

    #[test]
    fn empty_collection_yields_empty_stack() {
        assert!(build_stack(Side::Buy, &BidCollection::default()).is_empty());
    }
}
