//! Job lifecycle state machine.
//!
//! `PENDING -> QUEUED -> PROCESSING -> {COMPLETED | FAILED | CANCELLED}`.
//! A job may be first observed in either entry state, so the check is
//! rank-based rather than an explicit edge list: any move that does not
//! go backwards is accepted, and nothing leaves a terminal state.

use crate::job::JobStatus;

/// Check whether a job in `from` may move to `to`.
///
/// A same-state event is allowed; it simply carries no status change.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    !from.is_terminal() && to.rank() >= from.rank()
}

/// Only a processing job accepts progress updates.
pub fn accepts_progress(status: JobStatus) -> bool {
    status == JobStatus::Processing
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_queued() {
        assert!(can_transition(Pending, Queued));
    }

    #[test]
    fn pending_straight_to_processing() {
        assert!(can_transition(Pending, Processing));
    }

    #[test]
    fn queued_to_processing() {
        assert!(can_transition(Queued, Processing));
    }

    #[test]
    fn entry_states_can_fail_or_cancel() {
        for from in [Pending, Queued] {
            assert!(can_transition(from, Failed));
            assert!(can_transition(from, Cancelled));
        }
    }

    #[test]
    fn processing_to_each_terminal() {
        for to in [Completed, Failed, Cancelled] {
            assert!(can_transition(Processing, to));
        }
    }

    #[test]
    fn same_state_is_allowed_while_running() {
        assert!(can_transition(Processing, Processing));
        assert!(can_transition(Queued, Queued));
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn queued_back_to_pending() {
        assert!(!can_transition(Queued, Pending));
    }

    #[test]
    fn processing_back_to_queued() {
        assert!(!can_transition(Processing, Queued));
        assert!(!can_transition(Processing, Pending));
    }

    #[test]
    fn nothing_leaves_a_terminal_state() {
        for from in [Completed, Failed, Cancelled] {
            for to in JobStatus::ALL {
                assert!(!can_transition(from, to), "{from} -> {to} should be rejected");
            }
        }
    }

    #[test]
    fn progress_only_while_processing() {
        assert!(accepts_progress(Processing));
        for status in [Pending, Queued, Completed, Failed, Cancelled] {
            assert!(!accepts_progress(status));
        }
    }
}
