//! Match conditions used to target tasks held by a queue
//!
//! The queue looks tasks up for targeted aborts by testing each held task
//! against a condition. The accepted shapes form a closed set rather than a
//! duck-typed predicate: match everything, match one task by identity, or
//! match on the task's opaque data payload

use serde_json::{Map, Value};

use crate::task::TaskIdentifier;

/// A condition against which tasks are matched for lookup and targeted aborts
#[derive(Clone, Debug, PartialEq)]
pub enum MatchCondition {
    /// Matches every task
    All,
    /// Matches the single task with the given identifier
    Target(TaskIdentifier),
    /// Matches tasks whose data payload is an object containing every given
    /// key/value pair (shallow containment, not deep equality)
    DataSubset(Map<String, Value>),
    /// Matches tasks whose data payload equals the given value wholesale
    DataEqual(Value),
}

impl MatchCondition {
    /// Whether a task with the given identity and data satisfies the
    /// condition
    ///
    /// Tasks without a data payload never satisfy the data-shaped conditions
    pub(crate) fn is_match(&self, id: TaskIdentifier, data: Option<&Value>) -> bool {
        match self {
            MatchCondition::All => true,
            MatchCondition::Target(target) => *target == id,
            MatchCondition::DataSubset(subset) => match data {
                Some(Value::Object(map)) => {
                    subset.iter().all(|(key, value)| map.get(key) == Some(value))
                },
                _ => false,
            },
            MatchCondition::DataEqual(value) => data == Some(value),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::{Value, json};
    use uuid::Uuid;

    use super::MatchCondition;

    /// Extract the object map from a JSON value
    fn as_map(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    /// Tests the unconditional match
    #[test]
    fn test_match_all() {
        let id = Uuid::new_v4();
        assert!(MatchCondition::All.is_match(id, None));
        assert!(MatchCondition::All.is_match(id, Some(&json!({"kind": "nav"}))));
    }

    /// Tests matching a task by identity
    #[test]
    fn test_match_target() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(MatchCondition::Target(id).is_match(id, None));
        assert!(!MatchCondition::Target(other).is_match(id, None));
    }

    /// Tests shallow containment over the data payload
    #[test]
    fn test_match_data_subset() {
        let id = Uuid::new_v4();
        let data = json!({"kind": "nav", "id": 3});

        let hit = MatchCondition::DataSubset(as_map(json!({"kind": "nav"})));
        let miss = MatchCondition::DataSubset(as_map(json!({"kind": "nav", "id": 9})));

        assert!(hit.is_match(id, Some(&data)));
        assert!(!miss.is_match(id, Some(&data)));

        // A task without data never matches a data condition
        assert!(!hit.is_match(id, None));
    }

    /// Tests wholesale equality over the data payload
    #[test]
    fn test_match_data_equal() {
        let id = Uuid::new_v4();
        let data = json!({"kind": "nav", "id": 3});

        let exact = MatchCondition::DataEqual(data.clone());
        let partial = MatchCondition::DataEqual(json!({"kind": "nav"}));

        assert!(exact.is_match(id, Some(&data)));
        assert!(!partial.is_match(id, Some(&data)));
    }
}
