//! The task entity: a single asynchronous unit of work under a lock
//!
//! A task is created settled-pending, started at most once by its queue, and
//! settles exactly once: either by adopting the outcome of its start action
//! or by being force-rejected through [`Task::abort`]. The lock token is
//! resolved lazily, no later than start, and never changes afterwards

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, OnceLock},
    time::{SystemTime, UNIX_EPOCH},
};

use futures::{FutureExt, future::BoxFuture};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{TaskError, TaskResult},
    lock::LockId,
    matching::MatchCondition,
    waiter::TaskWaiter,
};

/// A type alias for the identifier underlying a task
pub type TaskIdentifier = Uuid;

/// The action invoked exactly once to begin a task's work
///
/// Receives the resolved lock token so that re-entrant scheduling from
/// inside the action can target the same lock
pub type StartFn<T> = Box<dyn FnOnce(LockId) -> BoxFuture<'static, TaskResult<T>> + Send>;

/// The cleanup hook invoked before a task is rejected on the abort path
///
/// A hook fault propagates synchronously to the `abort` caller and is never
/// folded into the task's own settlement
pub type AbortHook = Box<dyn FnOnce(&str) -> Result<(), TaskError> + Send>;

/// Box a start closure into a [`StartFn`]
pub fn start_fn<T, F, Fut>(action: F) -> StartFn<T>
where
    F: FnOnce(LockId) -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult<T>> + Send + 'static,
{
    Box::new(move |lock| action(lock).boxed())
}

/// Box an abort closure into an [`AbortHook`]
pub fn abort_hook<F>(hook: F) -> AbortHook
where
    F: FnOnce(&str) -> Result<(), TaskError> + Send + 'static,
{
    Box::new(hook)
}

/// Returns the current unix timestamp in milliseconds
fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or_default()
}

// --------
// | Task |
// --------

/// A single asynchronous unit of work coordinated through a lock
///
/// The task performs no blocking work itself; its queue is the sole caller
/// of [`start`](Self::start), and callers observe the outcome through the
/// [`TaskWaiter`] settlement surface
pub struct Task<T: Clone> {
    /// The ID of the task
    id: TaskIdentifier,
    /// The start action, consumed on first start
    on_start: Mutex<Option<StartFn<T>>>,
    /// The abort hook, consumed on first abort
    on_abort: Mutex<Option<AbortHook>>,
    /// The caller-supplied payload used only for predicate matching
    data: Option<Value>,
    /// The lock the task runs under, resolved no later than start
    lock: OnceLock<LockId>,
    /// The time the task was created, in unix millis
    ///
    /// Consumed by the queue for diagnostics and ordering, not by the task
    spawn_time: u64,
    /// The sending half of the completion source, taken on first settlement
    settle: Arc<Mutex<Option<oneshot::Sender<TaskResult<T>>>>>,
    /// The shared waiter handed to observers
    waiter: TaskWaiter<T>,
}

impl<T: Clone + Send + Sync + 'static> Task<T> {
    /// Create a new task
    ///
    /// Neither the start action nor the abort hook is invoked here; a task
    /// has no side effects before `start` or `abort`
    pub fn new(
        on_start: StartFn<T>,
        on_abort: Option<AbortHook>,
        data: Option<Value>,
        lock: Option<LockId>,
    ) -> Self {
        let (sender, receiver) = oneshot::channel();
        let lock_cell = OnceLock::new();
        if let Some(lock) = lock {
            let _ = lock_cell.set(lock);
        }

        Self {
            id: Uuid::new_v4(),
            on_start: Mutex::new(Some(on_start)),
            on_abort: Mutex::new(on_abort),
            data,
            lock: lock_cell,
            spawn_time: current_time_millis(),
            settle: Arc::new(Mutex::new(Some(sender))),
            waiter: TaskWaiter::new(receiver),
        }
    }

    /// Create a task from a start closure alone
    pub fn from_action<F, Fut>(action: F) -> Self
    where
        F: FnOnce(LockId) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        Self::new(start_fn(action), None, None, None)
    }

    // -----------
    // | Getters |
    // -----------

    /// The ID of the task
    pub fn id(&self) -> TaskIdentifier {
        self.id
    }

    /// The lock the task runs under
    ///
    /// `None` until one is supplied at construction or resolved by `start`
    pub fn lock(&self) -> Option<&LockId> {
        self.lock.get()
    }

    /// The task's matching payload
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// The time the task was created, in unix millis
    pub fn spawn_time(&self) -> u64 {
        self.spawn_time
    }

    /// Whether the task has settled
    pub fn is_settled(&self) -> bool {
        self.settle.lock().unwrap().is_none()
    }

    /// A waiter on the task's settlement
    ///
    /// Waiters taken after settlement observe the same outcome as waiters
    /// taken before
    pub fn waiter(&self) -> TaskWaiter<T> {
        self.waiter.clone()
    }

    // -------------
    // | Lifecycle |
    // -------------

    /// Start the task
    ///
    /// Resolves the lock if none was supplied, invokes the start action with
    /// it, and adopts the action's eventual outcome as the task's settlement.
    /// A task that settled before starting, e.g. one aborted while queued,
    /// never runs its start action. Returns the task's waiter
    pub fn start(&self) -> TaskWaiter<T> {
        // Take the action while holding the settlement slot so an abort
        // cannot slip between the settled check and the take
        let action = {
            let settle = self.settle.lock().unwrap();
            if settle.is_none() {
                return self.waiter();
            }
            self.on_start.lock().unwrap().take()
        };
        let Some(action) = action else {
            warn!("task {} started more than once", self.id);
            return self.waiter();
        };

        let lock = self.lock.get_or_init(LockId::generate).clone();
        info!("task {} starting under lock {lock}", self.id);
        let inner = action(lock);
        let settle = Arc::clone(&self.settle);
        tokio::spawn(async move {
            let result = inner.await;
            settle_slot(&settle, result);
        });

        self.waiter()
    }

    /// Abort the task, rejecting its settlement with the given message
    ///
    /// Callable before or after `start`. The abort hook runs before the
    /// rejection; a hook fault propagates to the caller and leaves the
    /// settlement untouched. If the task already settled naturally the
    /// rejection is a harmless lost write. Returns the task's waiter
    pub fn abort(&self, message: &str) -> Result<TaskWaiter<T>, TaskError> {
        if let Some(hook) = self.on_abort.lock().unwrap().take() {
            hook(message)?;
        }

        info!("task {} aborted: {message}", self.id);
        settle_slot(&self.settle, Err(TaskError::Aborted(message.to_string())));
        Ok(self.waiter())
    }

    /// Whether the task satisfies the given match condition
    pub fn matches(&self, condition: &MatchCondition) -> bool {
        condition.is_match(self.id, self.data.as_ref())
    }
}

/// Settle a task's completion source, a no-op if already settled
fn settle_slot<T: Clone>(
    slot: &Mutex<Option<oneshot::Sender<TaskResult<T>>>>,
    result: TaskResult<T>,
) {
    if let Some(sender) = slot.lock().unwrap().take() {
        // All observers may have dropped their waiters
        let _ = sender.send(result);
    }
}

impl<T: Clone> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("lock", &self.lock.get())
            .field("spawn_time", &self.spawn_time)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use crate::{
        error::TaskError,
        lock::LockId,
        task::{Task, abort_hook, start_fn},
    };

    /// Build a task that resolves to the given value
    fn value_task(value: u64) -> Task<u64> {
        Task::from_action(move |_| async move { Ok(value) })
    }

    /// Tests that starting a task resolves its waiter with the action's value
    #[tokio::test]
    async fn test_start_resolves_value() {
        let task = value_task(42);
        let waiter = task.start();
        assert_eq!(waiter.await, Ok(42));
    }

    /// Tests that a failing start action rejects the waiter untransformed
    #[tokio::test]
    async fn test_start_propagates_failure() {
        let task: Task<u64> =
            Task::from_action(|_| async { Err(TaskError::Failed("boom".to_string())) });

        let waiter = task.start();
        assert_eq!(waiter.await, Err(TaskError::Failed("boom".to_string())));
    }

    /// Tests that the settlement transitions at most once; an abort after
    /// natural completion is a lost write and late observers see the original
    /// outcome
    #[tokio::test]
    async fn test_single_settlement() {
        let task = value_task(42);
        let waiter = task.start();
        assert_eq!(waiter.await, Ok(42));

        task.abort("late").unwrap();
        assert_eq!(task.waiter().await, Ok(42));
    }

    /// Tests lazy lock resolution: undefined before start, stable and unique
    /// afterwards, and untouched by start when supplied at construction
    #[tokio::test]
    async fn test_lazy_lock() {
        let task1 = value_task(1);
        assert!(task1.lock().is_none());

        task1.start();
        let lock1 = task1.lock().cloned().unwrap();
        assert_eq!(task1.lock(), Some(&lock1));

        let task2 = value_task(2);
        task2.start();
        assert_ne!(task2.lock(), Some(&lock1));

        let supplied = LockId::from("render");
        let task3: Task<u64> = Task::new(
            start_fn(|_| async { Ok(3) }),
            None, // on_abort
            None, // data
            Some(supplied.clone()),
        );
        assert_eq!(task3.lock(), Some(&supplied));
        task3.start();
        assert_eq!(task3.lock(), Some(&supplied));
    }

    /// Tests aborting a task before it starts: the hook runs, the waiter
    /// rejects with the abort message, and the start action never runs
    #[tokio::test]
    async fn test_abort_before_start() {
        let started = Arc::new(AtomicUsize::new(0));
        let started_clone = started.clone();
        let hook_message = Arc::new(Mutex::new(None));
        let hook_message_clone = hook_message.clone();

        let task: Task<u64> = Task::new(
            start_fn(move |_| {
                started_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            }),
            Some(abort_hook(move |message| {
                *hook_message_clone.lock().unwrap() = Some(message.to_string());
                Ok(())
            })),
            None, // data
            None, // lock
        );

        task.abort("cancelled").unwrap();
        let waiter = task.start();

        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert_eq!(*hook_message.lock().unwrap(), Some("cancelled".to_string()));
        let err = waiter.await.unwrap_err();
        assert_eq!(err, TaskError::Aborted("cancelled".to_string()));
        assert!(err.is_abort());
    }

    /// Tests aborting a task mid-flight: the waiter rejects even though the
    /// start action never settles
    #[tokio::test]
    async fn test_abort_pending_task() {
        let (_gate, gate_rx) = tokio::sync::oneshot::channel::<()>();
        let task: Task<u64> = Task::from_action(move |_| async move {
            let _ = gate_rx.await;
            Ok(1)
        });

        let waiter = task.start();
        task.abort("superseded").unwrap();
        assert_eq!(waiter.await, Err(TaskError::Aborted("superseded".to_string())));
    }

    /// Tests that a fault raised by the abort hook propagates to the abort
    /// caller and leaves the task unsettled
    #[tokio::test]
    async fn test_abort_hook_fault() {
        let task: Task<u64> = Task::new(
            start_fn(|_| async { Ok(1) }),
            Some(abort_hook(|_| Err(TaskError::Failed("hook down".to_string())))),
            None, // data
            None, // lock
        );

        let err = task.abort("cancelled").unwrap_err();
        assert_eq!(err, TaskError::Failed("hook down".to_string()));
        assert!(!task.is_settled());
    }

    /// Tests that the abort hook runs at most once across repeated aborts
    #[tokio::test]
    async fn test_abort_hook_runs_once() {
        let hook_runs = Arc::new(AtomicUsize::new(0));
        let hook_runs_clone = hook_runs.clone();

        let task: Task<u64> = Task::new(
            start_fn(|_| async { Ok(1) }),
            Some(abort_hook(move |_| {
                hook_runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            None, // data
            None, // lock
        );

        task.abort("first").unwrap();
        task.abort("second").unwrap();

        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
        assert_eq!(task.waiter().await, Err(TaskError::Aborted("first".to_string())));
    }

    /// Tests that dropping an unstarted task surfaces as a never-settled
    /// error to its observers
    #[tokio::test]
    async fn test_dropped_task_never_settles() {
        let task = value_task(1);
        let waiter = task.waiter();

        drop(task);
        assert_eq!(waiter.await, Err(TaskError::NeverSettled));
    }
}
