mod bid;
mod config;
mod outcome;
mod payload;
mod sealed;
mod slot;
mod telemetry;
mod trace;

pub use bid::{Bid, BidCollection, BidError, Side};
pub use config::{MarketConfig, RevealProtocol};
pub use outcome::ClearingOutcome;
pub use payload::{BidPayload, ClearingPayload, KeyPostPayload};
pub use sealed::{BidLocator, KeyLocator, RevealKey};
pub use slot::Slot;
pub use telemetry::{SlotRecord, SubmissionOutcome, TxRecord};
pub use trace::{Trace, TraceRow};

/// A hashmap with deterministic iteration order, used throughout the
/// workspace wherever reproducible runs matter.
pub type Map<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;

macro_rules! uuid_wrapper {
    ($(#[$doc:meta])* $struct: ident) => {
        $(#[$doc])*
        #[derive(
            Debug,
            Hash,
            PartialEq,
            Eq,
            Clone,
            Copy,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $struct(uuid::Uuid);

        impl $struct {
            /// Generate a fresh random identifier.
            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl From<uuid::Uuid> for $struct {
            fn from(value: uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl std::ops::Deref for $struct {
            type Target = uuid::Uuid;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Display for $struct {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_wrapper!(
    /// Identifies one market participant (a bidding agent or the regulator).
    ParticipantId
);
uuid_wrapper!(
    /// Identifies one submitted transaction (bid, key post, or clearing call).
    EventId
);
