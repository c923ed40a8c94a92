//! Delta reconciliation: merge the cells a client changed onto a freshly
//! built baseline so storage always receives a complete matrix.

use super::params::SubmittedCell;
use super::types::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Changed(RuleMatrix),
    NoChange,
}

/// Build a delta from submitted cells, dropping `no_change` and malformed entries.
pub fn delta_from_submitted(cells: &[SubmittedCell]) -> Delta {
    let mut dropped = 0usize;
    let delta: Delta = cells
        .iter()
        .filter_map(|cell| match cell.parse() {
            Some((key, Some(enabled))) => Some((key, enabled)),
            Some((_, None)) => None,
            None => {
                dropped += 1;
                None
            }
        })
        .collect();
    if dropped > 0 {
        log::debug!("Dropped {dropped} malformed transition cells");
    }
    delta
}

/// Merge `delta` onto `baseline`.
///
/// Cells whose status pair is not part of the baseline are skipped. The
/// result holds exactly the baseline's keys.
pub fn reconcile(baseline: &RuleMatrix, delta: &Delta) -> Reconciled {
    if delta.is_empty() {
        return Reconciled::NoChange;
    }

    let mut merged = baseline.clone();
    let mut stale = 0usize;
    for (key, enabled) in delta.iter() {
        if !merged.set(key, *enabled) {
            stale += 1;
        }
    }
    if stale > 0 {
        log::debug!("Ignored {stale} delta cells outside the current scope");
    }
    Reconciled::Changed(merged)
}
