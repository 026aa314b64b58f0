use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The side of the market a bid belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// A buy bid: the price is a maximum willingness to pay.
    Buy,
    /// A sell bid: the price is a minimum willingness to accept.
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// One bid for one slot: a unit price and a quantity of energy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    /// Maximum willingness to pay (buy) or minimum willingness to accept
    /// (sell), per kWh. Must be finite and non-negative.
    pub price_per_unit: f64,
    /// Quantity in kWh. Must be finite and strictly positive; zero-quantity
    /// bids are never submitted.
    pub quantity: f64,
}

/// Why a candidate bid was rejected at construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BidError {
    /// Price or quantity was NaN or infinite.
    #[error("bid fields must be finite")]
    NotFinite,
    /// Price was negative.
    #[error("bid price must be non-negative")]
    NegativePrice,
    /// Quantity was zero or negative.
    #[error("bid quantity must be strictly positive")]
    NonPositiveQuantity,
}

impl Bid {
    /// Construct a validated bid.
    pub fn new(price_per_unit: f64, quantity: f64) -> Result<Self, BidError> {
        if !price_per_unit.is_finite() || !quantity.is_finite() {
            Err(BidError::NotFinite)
        } else if price_per_unit < 0.0 {
            Err(BidError::NegativePrice)
        } else if quantity <= 0.0 {
            Err(BidError::NonPositiveQuantity)
        } else {
            Ok(Self {
                price_per_unit,
                quantity,
            })
        }
    }
}

/// An unordered multiset of bids belonging to one side of one slot.
///
/// Order carries no meaning: the clearing algorithm is deterministic under
/// any permutation of the contained bids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BidCollection(pub Vec<Bid>);

impl BidCollection {
    /// Total quantity across all bids in the collection.
    pub fn total_quantity(&self) -> f64 {
        self.0.iter().map(|b| b.quantity).sum()
    }

    /// Whether the collection holds no bids.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of bids in the collection.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Bid> for BidCollection {
    fn from_iter<T: IntoIterator<Item = Bid>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for BidCollection {
    type Item = Bid;
    type IntoIter = std::vec::IntoIter<Bid>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
