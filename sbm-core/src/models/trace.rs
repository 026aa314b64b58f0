use serde::{Deserialize, Serialize};

/// One slot's worth of metering data for one participant.
///
/// Rows are indexed by slot: row `s` drives the bids for slot `s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    /// Energy generated during the slot, in trace units.
    pub generation: f64,
    /// Energy drawn from the grid during the slot, in trace units.
    pub grid_use: f64,
    /// Energy consumed during the slot, in trace units.
    pub consumption: f64,
    /// Lower bound of the participant's acceptable price band.
    pub low_price: f64,
    /// Upper bound of the participant's acceptable price band.
    pub high_price: f64,
}

/// A participant's full metering trace for one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace(pub Vec<TraceRow>);

impl Trace {
    /// The row for the given slot index, if the trace extends that far.
    pub fn row(&self, index: usize) -> Option<&TraceRow> {
        self.0.get(index)
    }

    /// Number of rows (slots) this trace covers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the trace holds no rows.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `index` addresses the final row of the trace.
    ///
    /// Agents terminate cleanly after handling their last row.
    pub fn is_last_row(&self, index: usize) -> bool {
        !self.0.is_empty() && index == self.0.len() - 1
    }
}
