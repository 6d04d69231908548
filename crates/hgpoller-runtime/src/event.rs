//! Runtime events.

use hgpoller_core::{BranchOutcome, PollReport};

/// Events emitted by the runtime.
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// A cycle started.
    CycleStarted {
        /// Source name.
        source: String,
    },
    /// A tick found the previous cycle still running.
    CycleSkipped {
        /// Source name.
        source: String,
    },
    /// A branch finished its part of a cycle.
    BranchPolled {
        /// Source name.
        source: String,
        /// Branch or bookmark.
        branch: String,
        /// What happened.
        outcome: BranchOutcome,
    },
    /// A branch failed; its pointer is unchanged.
    BranchFailed {
        /// Source name.
        source: String,
        /// Branch or bookmark.
        branch: String,
        /// Error message.
        error: String,
    },
    /// A cycle finished.
    CycleCompleted {
        /// Source name.
        source: String,
        /// Changes emitted over every branch.
        emitted: usize,
    },
    /// A cycle failed before reaching any branch.
    CycleFailed {
        /// Source name.
        source: String,
        /// Error message.
        error: String,
    },
}

impl PollEvent {
    /// Returns the source name associated with this event.
    pub fn source(&self) -> &str {
        match self {
            PollEvent::CycleStarted { source }
            | PollEvent::CycleSkipped { source }
            | PollEvent::BranchPolled { source, .. }
            | PollEvent::BranchFailed { source, .. }
            | PollEvent::CycleCompleted { source, .. }
            | PollEvent::CycleFailed { source, .. } => source,
        }
    }

    /// Returns true if this is an error event.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            PollEvent::BranchFailed { .. } | PollEvent::CycleFailed { .. }
        )
    }

    /// Events describing the branches of a finished cycle, followed by the
    /// completion event.
    pub fn from_report(source: &str, report: &PollReport) -> Vec<PollEvent> {
        let mut events: Vec<PollEvent> = report
            .branches
            .iter()
            .map(|branch| match &branch.result {
                Ok(outcome) => PollEvent::BranchPolled {
                    source: source.to_string(),
                    branch: branch.branch.clone(),
                    outcome: outcome.clone(),
                },
                Err(e) => PollEvent::BranchFailed {
                    source: source.to_string(),
                    branch: branch.branch.clone(),
                    error: e.to_string(),
                },
            })
            .collect();
        events.push(PollEvent::CycleCompleted {
            source: source.to_string(),
            emitted: report.emitted(),
        });
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgpoller_core::{BranchReport, ParseFailure, PollError};
    use hgpoller_models::RevisionPointer;

    #[test]
    fn test_event_source() {
        let event = PollEvent::CycleStarted {
            source: "baz".to_string(),
        };
        assert_eq!(event.source(), "baz");
        assert!(!event.is_error());

        let event = PollEvent::CycleFailed {
            source: "baz".to_string(),
            error: "pull failed".to_string(),
        };
        assert_eq!(event.source(), "baz");
        assert!(event.is_error());
    }

    #[test]
    fn test_from_report() {
        let report = PollReport {
            branches: vec![
                BranchReport {
                    branch: "default".to_string(),
                    result: Ok(BranchOutcome::Initialized {
                        pointer: RevisionPointer::new("5"),
                    }),
                },
                BranchReport {
                    branch: "stable".to_string(),
                    result: Err(PollError::Parse(ParseFailure::NoHeads)),
                },
            ],
        };

        let events = PollEvent::from_report("baz", &report);

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], PollEvent::BranchPolled { branch, .. } if branch == "default"));
        assert!(events[1].is_error());
        assert!(matches!(events[2], PollEvent::CycleCompleted { emitted: 0, .. }));
    }
}
