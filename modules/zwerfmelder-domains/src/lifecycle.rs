//! Report lifecycle state machine.

use zwerfmelder_common::{ReportError, ReportStatus};

/// Allowed next statuses for each lifecycle state. `resolved` and `invalid`
/// are terminal.
pub fn allowed_transitions(from: ReportStatus) -> &'static [ReportStatus] {
    match from {
        ReportStatus::New => &[ReportStatus::Triaged, ReportStatus::Invalid],
        ReportStatus::Triaged => &[
            ReportStatus::Forwarded,
            ReportStatus::Resolved,
            ReportStatus::Invalid,
        ],
        ReportStatus::Forwarded => &[ReportStatus::Resolved, ReportStatus::Invalid],
        ReportStatus::Resolved | ReportStatus::Invalid => &[],
    }
}

/// Reject lifecycle moves outside the transition table, naming both the
/// attempted source and target.
pub fn ensure_transition(from: ReportStatus, to: ReportStatus) -> Result<(), ReportError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ReportError::InvalidStatusTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triaged_to_resolved_is_allowed() {
        assert!(ensure_transition(ReportStatus::Triaged, ReportStatus::Resolved).is_ok());
    }

    #[test]
    fn new_to_resolved_is_rejected() {
        let err = ensure_transition(ReportStatus::New, ReportStatus::Resolved).unwrap_err();
        assert_eq!(err.code(), "invalid_status_transition");
        assert!(err.to_string().contains("new"));
        assert!(err.to_string().contains("resolved"));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(allowed_transitions(ReportStatus::Resolved).is_empty());
        assert!(allowed_transitions(ReportStatus::Invalid).is_empty());
    }

    #[test]
    fn self_transition_is_rejected() {
        assert!(ensure_transition(ReportStatus::New, ReportStatus::New).is_err());
    }
}
