use super::error::EngineError;
use std::fmt;

/// Lifecycle of one reaction inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionState {
    Pending,
    Relaxing,
    Classified,
    Persisted,
    Failed,
}

impl ReactionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: ReactionState) -> bool {
        use ReactionState::*;
        matches!(
            (self, next),
            (Pending, Relaxing)
                | (Relaxing, Classified)
                | (Classified, Persisted)
                | (Pending | Relaxing | Classified, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReactionState::Persisted | ReactionState::Failed)
    }
}

impl fmt::Display for ReactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReactionState::Pending => "pending",
            ReactionState::Relaxing => "relaxing",
            ReactionState::Classified => "classified",
            ReactionState::Persisted => "persisted",
            ReactionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A reaction that was skipped because of an error.
#[derive(Debug)]
pub struct ReactionFailure {
    pub index: usize,
    pub key: String,
    pub error: EngineError,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Keys of persisted reactions, in processing order.
    pub succeeded: Vec<String>,
    pub failures: Vec<ReactionFailure>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_advance_along_the_happy_path_only() {
        use ReactionState::*;
        assert!(Pending.can_advance_to(Relaxing));
        assert!(Relaxing.can_advance_to(Classified));
        assert!(Classified.can_advance_to(Persisted));
        assert!(Relaxing.can_advance_to(Failed));
        assert!(!Pending.can_advance_to(Persisted));
        assert!(!Persisted.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Relaxing));
        assert!(Persisted.is_terminal());
        assert!(!Classified.is_terminal());
    }

    #[test]
    fn report_counts_successes_and_failures() {
        let mut report = RunReport::default();
        report.succeeded.push("a".into());
        report.failures.push(ReactionFailure {
            index: 1,
            key: "b".into(),
            error: EngineError::Internal("boom".into()),
        });
        assert_eq!(report.total(), 2);
        assert!(!report.is_complete_success());
        assert_eq!(report.failed_keys().collect::<Vec<_>>(), vec!["b"]);
    }
}
