use serde::{Deserialize, Serialize};

/// A discrete trading window, identified by an increasing integer.
///
/// Slot 0 is the first tradable window. Slots are totally ordered and are
/// announced strictly increasing; "no slot seen yet" is always represented
/// as `Option<Slot>`, never as a sentinel value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Slot(pub u64);

impl Slot {
    /// The slot immediately after this one.
    pub fn next(self) -> Slot {
        Slot(self.0 + 1)
    }

    /// The slot immediately before this one, or `None` for slot 0.
    ///
    /// The regulator uses this to map "notification for slot `s + 1`" to
    /// "clear slot `s`"; slot 0 has no predecessor and is skipped.
    pub fn prev(self) -> Option<Slot> {
        self.0.checked_sub(1).map(Slot)
    }
}

impl From<u64> for Slot {
    fn from(value: u64) -> Self {
        Slot(value)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
