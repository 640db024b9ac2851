//! Argument normalization for task construction
//!
//! Scheduling entry points accept a small set of call shapes: an existing
//! task to reuse, a lock token, a configuration block, a start action, an
//! abort hook, or a matching payload. [`Task::from_args`] folds a list of
//! these into a single task, failing fast on shapes that cannot yield one

use std::{future::Future, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::TaskError,
    lock::LockId,
    task::{AbortHook, StartFn, Task, abort_hook, start_fn},
};

/// A configuration block accepted by [`Task::from_args`]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    /// The lock the task should run under
    pub lock: Option<LockId>,
    /// The payload used for predicate matching
    pub data: Option<Value>,
}

/// A single argument to task construction, one accepted call shape each
pub enum TaskArg<T: Clone> {
    /// An already constructed task, reused as is
    Task(Arc<Task<T>>),
    /// The lock token the task should run under
    Lock(LockId),
    /// A configuration block carrying a lock and matching payload
    Config(TaskConfig),
    /// The action to run when the task starts
    Start(StartFn<T>),
    /// The hook to run when the task is aborted
    Abort(AbortHook),
    /// The payload used for predicate matching
    Data(Value),
}

impl<T: Clone + Send + Sync + 'static> TaskArg<T> {
    /// Build a start argument from a closure returning a future
    pub fn start<F, Fut>(action: F) -> Self
    where
        F: FnOnce(LockId) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        TaskArg::Start(start_fn(action))
    }

    /// Build an abort hook argument from a closure
    pub fn abort<F>(hook: F) -> Self
    where
        F: FnOnce(&str) -> Result<(), TaskError> + Send + 'static,
    {
        TaskArg::Abort(abort_hook(hook))
    }

    /// Build a lock argument from any lock-convertible token
    pub fn lock(lock: impl Into<LockId>) -> Self {
        TaskArg::Lock(lock.into())
    }

    /// Build a data argument from a matching payload
    pub fn data(value: Value) -> Self {
        TaskArg::Data(value)
    }

    /// Build a task argument reusing an existing task
    pub fn task(task: Arc<Task<T>>) -> Self {
        TaskArg::Task(task)
    }
}

impl<T: Clone + Send + Sync + 'static> Task<T> {
    /// Normalize an argument list into a task
    ///
    /// An existing task given as the sole argument is returned unchanged.
    /// Otherwise the list must contain exactly one start action; a lock may
    /// be given directly or through a configuration block. Lists from which
    /// no start action can be derived fail fast rather than constructing a
    /// task that cannot run
    pub fn from_args(args: Vec<TaskArg<T>>) -> Result<Arc<Self>, TaskError> {
        let mut args = args.into_iter();
        let first = args
            .next()
            .ok_or_else(|| TaskError::InvalidArgs("no arguments given".to_string()))?;

        // Reuse an existing task, which must stand alone
        if let TaskArg::Task(task) = first {
            if args.next().is_some() {
                return Err(TaskError::InvalidArgs(
                    "an existing task must be the only argument".to_string(),
                ));
            }
            return Ok(task);
        }

        let mut on_start: Option<StartFn<T>> = None;
        let mut on_abort: Option<AbortHook> = None;
        let mut lock: Option<LockId> = None;
        let mut data: Option<Value> = None;

        for arg in std::iter::once(first).chain(args) {
            match arg {
                TaskArg::Task(_) => {
                    return Err(TaskError::InvalidArgs(
                        "an existing task must be given first".to_string(),
                    ));
                },
                TaskArg::Start(action) => {
                    if on_start.replace(action).is_some() {
                        return Err(TaskError::InvalidArgs(
                            "multiple start actions given".to_string(),
                        ));
                    }
                },
                TaskArg::Abort(hook) => {
                    if on_abort.replace(hook).is_some() {
                        return Err(TaskError::InvalidArgs(
                            "multiple abort hooks given".to_string(),
                        ));
                    }
                },
                TaskArg::Lock(id) => {
                    if lock.replace(id).is_some() {
                        return Err(TaskError::InvalidArgs("multiple locks given".to_string()));
                    }
                },
                TaskArg::Data(value) => {
                    if data.replace(value).is_some() {
                        return Err(TaskError::InvalidArgs("multiple payloads given".to_string()));
                    }
                },
                TaskArg::Config(config) => {
                    if let Some(id) = config.lock
                        && lock.replace(id).is_some()
                    {
                        return Err(TaskError::InvalidArgs("multiple locks given".to_string()));
                    }
                    if let Some(value) = config.data
                        && data.replace(value).is_some()
                    {
                        return Err(TaskError::InvalidArgs("multiple payloads given".to_string()));
                    }
                },
            }
        }

        let on_start = on_start
            .ok_or_else(|| TaskError::InvalidArgs("no start action given".to_string()))?;
        Ok(Arc::new(Self::new(on_start, on_abort, data, lock)))
    }
}
