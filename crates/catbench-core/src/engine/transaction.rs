use super::error::EngineError;
use indexmap::IndexMap;

/// Bookkeeping a reaction writes into and that must be reverted if the reaction fails.
pub trait Checkpoint {
    type Mark;

    fn mark(&self) -> Self::Mark;

    fn restore(&mut self, mark: Self::Mark);
}

/// Reactions are only ever appended, so the length is enough to undo them.
impl<V> Checkpoint for IndexMap<String, V> {
    type Mark = usize;

    fn mark(&self) -> usize {
        self.len()
    }

    fn restore(&mut self, mark: usize) {
        self.truncate(mark);
    }
}

/// Runs `action` against `state` and reverts `state` to where it was if the action fails.
///
/// Anything the action reaches outside `state` (in particular the gas cache) is kept.
pub fn transaction<S, F, R>(state: &mut S, action: F) -> Result<R, EngineError>
where
    S: Checkpoint,
    F: FnOnce(&mut S) -> Result<R, EngineError>,
{
    // 1. Record where the state stands.
    let mark = state.mark();

    // 2. Execute the action.
    let result = action(state);

    // 3. On failure, drop everything the action appended.
    if result.is_err() {
        state.restore(mark);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_action_commits_new_entries() {
        let mut results = IndexMap::new();
        results.insert("Pt2_CO".to_string(), -0.2);
        let value = transaction(&mut results, |results| {
            results.insert("Pt2_CO_1".to_string(), -0.3);
            Ok(7)
        })
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn failed_action_discards_only_new_entries() {
        let mut results = IndexMap::new();
        results.insert("Pt2_CO".to_string(), -0.2);
        let result: Result<(), _> = transaction(&mut results, |results| {
            results.insert("Au2_O".to_string(), 1.0);
            results.insert("Au2_O_1".to_string(), 1.1);
            Err(EngineError::Internal("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["Pt2_CO"]);
    }
}
