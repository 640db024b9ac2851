//! Defines the task primitive for lock-coordinated asynchronous work
//!
//! A [`Task`](task::Task) is a single unit of async work with a start action,
//! an optional abort hook, and a single-settlement outcome observed through a
//! [`TaskWaiter`](waiter::TaskWaiter). Tasks carry a lock token identifying
//! the mutual-exclusion group they run under; the queue layer serializes
//! tasks per lock, the task itself holds no locking primitive

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::needless_pass_by_value)]

pub mod args;
pub mod error;
pub mod lock;
pub mod matching;
pub mod task;
pub mod waiter;

pub use args::{TaskArg, TaskConfig};
pub use error::{TaskError, TaskResult};
pub use lock::LockId;
pub use matching::MatchCondition;
pub use task::{AbortHook, StartFn, Task, TaskIdentifier, abort_hook, start_fn};
pub use waiter::TaskWaiter;
