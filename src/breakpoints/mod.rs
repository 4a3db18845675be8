//! Adapter-side breakpoint descriptors
//!
//! The engine owns the actual breakpoints. These tables map engine
//! breakpoint IDs back to what the client asked for, which is what stop
//! classification needs.

pub mod exception;
pub mod instruction;

pub use exception::{ExceptionBreakpoint, ExceptionBreakpointCatalog, ExceptionKind};
pub use instruction::{InstructionBreakpoint, InstructionBreakpoints};

use crate::engine::BreakpointId;

/// Breakpoint IDs in flat stop-reason data
///
/// The data alternates breakpoint ID and location index; only the even
/// positions are breakpoint IDs.
pub fn breakpoint_ids(data: &[u64]) -> impl Iterator<Item = BreakpointId> + '_ {
    data.iter().step_by(2).map(|id| *id as BreakpointId)
}

/// Resolve every breakpoint ID in `data`, or nothing
///
/// A stop is attributed to one kind of breakpoint only when all hit
/// breakpoints are of that kind. Empty data never classifies.
pub(crate) fn classify_stop<T>(
    data: &[u64],
    mut lookup: impl FnMut(BreakpointId) -> Option<T>,
) -> Option<T> {
    let mut found = None;
    for id in breakpoint_ids(data) {
        found = Some(lookup(id)?);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_ids_skip_locations() {
        let ids: Vec<_> = breakpoint_ids(&[5, 1, 9, 2]).collect();
        assert_eq!(ids, vec![5, 9]);
    }

    #[test]
    fn test_classify_requires_every_id() {
        let known = |id| (id == 5 || id == 9).then_some(id);
        assert_eq!(classify_stop(&[5, 1, 9, 1], known), Some(9));
        assert_eq!(classify_stop(&[5, 1, 7, 1], known), None);
        assert_eq!(classify_stop(&[], known), None);
    }
}
