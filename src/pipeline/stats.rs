//! Per-pass counters.

use std::fmt;

/// Outcome counts of one pipeline pass.
///
/// `selected` is the number of records the pass picked up; every selected
/// record ends up in exactly one of the other three counters unless the pass
/// was stopped by a [`PipelineError`](super::PipelineError).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    selected: usize,
    succeeded: usize,
    skipped: usize,
    failed: usize,
}

impl PassStats {
    /// Creates counters for a pass that selected `selected` records.
    #[must_use]
    pub fn new(selected: usize) -> Self {
        Self {
            selected,
            ..Self::default()
        }
    }

    /// Records selected by the pass.
    #[must_use]
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Records handled and written back.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Malformed or vanished records left untouched.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Records whose stage failed; they stay selectable for the next run.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Records accounted for so far.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    pub(crate) fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub(crate) fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed += 1;
    }
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} selected, {} succeeded, {} skipped, {} failed",
            self.selected, self.succeeded, self.skipped, self.failed
        )
    }
}
