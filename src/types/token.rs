use crate::core::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sweep {
    Assigned,
    Pool,
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sweep::Assigned => write!(f, "assigned"),
            Sweep::Pool => write!(f, "pool"),
        }
    }
}

/// Counts from one sweep whose transaction committed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepCounts {
    pub(crate) released: u64,
    pub(crate) deleted: u64,
}

/// Aggregate of one reconciliation pass. A failed sweep contributes no
/// counts, only an entry in `errors`.
#[derive(Debug, Default)]
pub(crate) struct Reconciliation {
    pub(crate) released: u64,
    pub(crate) deleted: u64,
    pub(crate) errors: Vec<(Sweep, Error)>,
}

impl Reconciliation {
    pub(crate) fn record(&mut self, sweep: Sweep, result: Result<SweepCounts, Error>) {
        match result {
            Ok(counts) => {
                self.released += counts.released;
                self.deleted += counts.deleted;
            }
            Err(e) => self.errors.push((sweep, e)),
        }
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
