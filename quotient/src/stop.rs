//! Cooperative stop conditions shared by the enumeration drivers.

use std::time::Instant;

/// When a `run*` call should hand control back to the caller.  Consulted at the
/// cooperative points only (cursor advances, definition batches, lookahead steps), so
/// the graph is always consistent when control returns.
pub(crate) enum StopWhen<'a> {
    Never,
    Deadline(Instant),
    /// Used by the composite strategies to bound their bursts.
    ActiveAtLeast(usize),
    External(&'a mut (dyn FnMut() -> bool + 'a)),
}

impl StopWhen<'_> {
    pub(crate) fn is_budgeted(&self) -> bool {
        !matches!(self, StopWhen::Never)
    }

    pub(crate) fn fires(&mut self, active: usize) -> bool {
        match self {
            StopWhen::Never => false,
            StopWhen::Deadline(deadline) => Instant::now() >= *deadline,
            StopWhen::ActiveAtLeast(n) => active >= *n,
            StopWhen::External(pred) => pred(),
        }
    }
}
