//! Lock identifiers for task mutual-exclusion groups
//!
//! A lock names the group of tasks that may not run concurrently; the queue
//! admits at most one running task per lock. Callers may supply their own
//! token, tasks scheduled without one receive a generated token when started

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identifier of a mutual-exclusion group
///
/// Caller-supplied locks are arbitrary strings, generated locks are random
/// UUIDs so that unlocked tasks never contend with one another
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockId(String);

impl LockId {
    /// Generate a fresh lock token, unique per call
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The string representation of the lock
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LockId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LockId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
