use approx::assert_relative_eq;
use rstest::*;
use sbm_clearing::{ClearingError, clear};
use sbm_core::models::{Bid, BidCollection, ClearingOutcome, Side};

fn bids(pairs: &[(f64, f64)]) -> BidCollection {
    pairs
        .iter()
        .map(|&(p, q)| Bid::new(p, q).unwrap())
        .collect()
}

fn trade(outcome: ClearingOutcome) -> (f64, f64) {
    match outcome {
        ClearingOutcome::Trade {
            price_per_unit,
            quantity,
        } => (price_per_unit, quantity),
        ClearingOutcome::NoTrade => panic!("expected a trade"),
    }
}

#[rstest]
#[case::no_buyers(&[], &[(4.0, 4.0)], ClearingError::NoBids(Side::Buy))]
#[case::no_sellers(&[(10.0, 5.0)], &[], ClearingError::NoBids(Side::Sell))]
#[case::both_empty(&[], &[], ClearingError::NoBids(Side::Buy))]
fn empty_side_is_no_trade(
    #[case] buyers: &[(f64, f64)],
    #[case] sellers: &[(f64, f64)],
    #[case] expected: ClearingError,
) {
    assert_eq!(clear(&bids(buyers), &bids(sellers)), Err(expected));
}

#[rstest]
fn crossed_out_prices_are_no_equilibrium() {
    let buyers = bids(&[(3.0, 5.0), (2.0, 1.0)]);
    let sellers = bids(&[(4.0, 4.0), (7.0, 2.0)]);
    assert_eq!(clear(&buyers, &sellers), Err(ClearingError::NoEquilibrium));
}

#[rstest]
fn single_crossing_pair_is_returned_directly() {
    let buyers = bids(&[(10.0, 3.0)]);
    let sellers = bids(&[(6.0, 2.0)]);
    let (price, quantity) = trade(clear(&buyers, &sellers).unwrap());
    assert_relative_eq!(price, 8.0);
    assert_relative_eq!(quantity, 2.0);
}

/// The scenario walked through in the stacking construction: buyers
/// [(10,5),(8,3)], sellers [(4,4),(6,2)].
///
/// Demand stack: (8, 8), (10, 5). Supply stack: (6, 6), (4, 4).
/// Crossing candidates: (8,6)→(7.0, 6), (8,4)→(6.0, 4), (10,6)→(8.0, 5),
/// (10,4)→(7.0, 4). The largest quantity wins: price 7, quantity 6.
#[rstest]
fn stacking_scenario_prefers_largest_quantity() {
    let buyers = bids(&[(10.0, 5.0), (8.0, 3.0)]);
    let sellers = bids(&[(4.0, 4.0), (6.0, 2.0)]);
    let (price, quantity) = trade(clear(&buyers, &sellers).unwrap());
    assert_relative_eq!(price, 7.0);
    assert_relative_eq!(quantity, 6.0);
}

#[rstest]
fn equal_quantities_break_ties_toward_the_higher_price() {
    // Both crossing pairs trade the full single-bid quantity, so only the
    // price differs between candidates.
    let buyers = bids(&[(10.0, 2.0), (8.0, 2.0)]);
    let sellers = bids(&[(2.0, 2.0)]);
    // Demand stack: (8, 4), (10, 2); supply stack: (2, 2).
    // Candidates: (5.0, 2) and (6.0, 2) have equal quantity, so the higher
    // price wins.
    let (price, quantity) = trade(clear(&buyers, &sellers).unwrap());
    assert_relative_eq!(price, 6.0);
    assert_relative_eq!(quantity, 2.0);
}

#[rstest]
fn result_is_invariant_under_bid_permutation() {
    let buyers = [(9.5, 1.5), (7.0, 2.0), (8.25, 4.0)];
    let sellers = [(5.0, 3.0), (6.5, 1.0), (4.25, 2.5)];

    let baseline = clear(&bids(&buyers), &bids(&sellers)).unwrap();

    let mut buyers_rev = buyers;
    buyers_rev.reverse();
    let mut sellers_rev = sellers;
    sellers_rev.reverse();

    let permuted = clear(&bids(&buyers_rev), &bids(&sellers_rev)).unwrap();
    assert_eq!(baseline, permuted);
}

#[rstest]
fn quantity_never_exceeds_either_side_total() {
    let buyers = bids(&[(10.0, 5.0), (8.0, 3.0), (6.0, 10.0)]);
    let sellers = bids(&[(4.0, 4.0), (5.0, 2.0)]);
    let (price, quantity) = trade(clear(&buyers, &sellers).unwrap());

    assert!(quantity <= buyers.total_quantity());
    assert!(quantity <= sellers.total_quantity());
    // Price must lie within the band spanned by tradeable bids.
    assert!(price >= 4.0);
    assert!(price <= 10.0);
}

#[rstest]
fn touching_prices_still_clear() {
    let buyers = bids(&[(5.0, 1.0)]);
    let sellers = bids(&[(5.0, 1.0)]);
    let (price, quantity) = trade(clear(&buyers, &sellers).unwrap());
    assert_relative_eq!(price, 5.0);
    assert_relative_eq!(quantity, 1.0);
}
