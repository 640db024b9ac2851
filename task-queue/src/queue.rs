//! The task queue: per-lock mutual exclusion over running tasks
//!
//! The queue maps each lock to its current holder plus the tasks waiting
//! behind it in arrival order. It is the sole caller of `Task::start`; when
//! a holder settles, by completing naturally or by being aborted, the next
//! pending task on the lock is promoted

use std::{
    collections::{HashMap, VecDeque},
    iter,
    sync::{Arc, Mutex},
};

use task_core::{LockId, MatchCondition, Task, TaskArg, TaskIdentifier, TaskWaiter};
use tracing::{info, warn};

use crate::error::QueueError;

// ----------
// | Config |
// ----------

/// The policy applied when a task's lock is already held
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Policy {
    /// Queue the task behind the current holder; tasks on one lock run
    /// serially in arrival order
    #[default]
    Enqueue,
    /// Abort the current holder and run the task in its place; pending
    /// tasks stay queued behind the preemptor
    Preempt,
}

/// The configuration of a task queue
#[derive(Copy, Clone, Debug, Default)]
pub struct QueueConfig {
    /// The scheduling policy applied when a lock is contended
    pub policy: Policy,
}

// ---------
// | Queue |
// ---------

/// The bookkeeping for one lock: its holder and the tasks waiting behind it
struct LockSlot<T: Clone> {
    /// The task currently holding the lock
    running: Arc<Task<T>>,
    /// Tasks waiting on the lock in arrival order
    pending: VecDeque<Arc<Task<T>>>,
}

impl<T: Clone> LockSlot<T> {
    /// Create a slot for a freshly started holder
    fn new(running: Arc<Task<T>>) -> Self {
        Self { running, pending: VecDeque::new() }
    }
}

/// What `asap` decided to do with a task under its lock
enum Placement<T: Clone> {
    /// The lock was free, run the task
    Run,
    /// The task was queued behind the current holder
    Queued,
    /// The task displaced the given previous holder
    Preempted(Arc<Task<T>>),
}

/// Coordinates tasks competing for locks, at most one running per lock
#[derive(Clone)]
pub struct TaskQueue<T: Clone> {
    /// The per-lock slots of running and pending tasks
    slots: Arc<Mutex<HashMap<LockId, LockSlot<T>>>>,
    /// The queue config
    config: QueueConfig,
}

impl<T: Clone + Send + Sync + 'static> TaskQueue<T> {
    /// Create a queue with the default config
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a queue with the given config
    pub fn with_config(config: QueueConfig) -> Self {
        Self { slots: Arc::new(Mutex::new(HashMap::new())), config }
    }

    // --------------
    // | Scheduling |
    // --------------

    /// Schedule a task as soon as its lock allows, under the queue's default
    /// policy
    ///
    /// Arguments are normalized through `Task::from_args`; a task the queue
    /// already holds is reused rather than restarted
    pub fn asap(&self, args: Vec<TaskArg<T>>) -> Result<TaskWaiter<T>, QueueError> {
        self.asap_with(self.config.policy, args)
    }

    /// Schedule a task under an explicit contention policy
    pub fn asap_with(
        &self,
        policy: Policy,
        args: Vec<TaskArg<T>>,
    ) -> Result<TaskWaiter<T>, QueueError> {
        let task = Task::from_args(args)?;
        if self.contains(task.id()) {
            return Ok(task.waiter());
        }

        match task.lock().cloned() {
            // No lock was supplied; starting resolves a fresh token that
            // cannot be contended
            None => {
                task.start();
                if let Some(lock) = task.lock().cloned() {
                    let slot = LockSlot::new(Arc::clone(&task));
                    self.slots.lock().unwrap().insert(lock.clone(), slot);
                    self.spawn_watcher(lock, &task);
                }
            },
            Some(lock) => {
                let placement = {
                    let mut slots = self.slots.lock().unwrap();
                    match slots.get_mut(&lock) {
                        None => {
                            slots.insert(lock.clone(), LockSlot::new(Arc::clone(&task)));
                            Placement::Run
                        },
                        Some(slot) => match policy {
                            Policy::Enqueue => {
                                slot.pending.push_back(Arc::clone(&task));
                                Placement::Queued
                            },
                            Policy::Preempt => Placement::Preempted(Arc::clone(&slot.running)),
                        },
                    }
                };

                match placement {
                    Placement::Run => {
                        task.start();
                        self.spawn_watcher(lock, &task);
                    },
                    Placement::Queued => {
                        info!("task {} queued behind lock {lock}", task.id());
                    },
                    Placement::Preempted(previous) => {
                        warn!(
                            "task {} preempting task {} on lock {lock}",
                            task.id(),
                            previous.id(),
                        );

                        // Abort the holder before installing the newcomer; a
                        // hook fault leaves the holder running and tracked
                        previous.abort(&format!("preempted on lock {lock}"))?;
                        let installed = {
                            let mut slots = self.slots.lock().unwrap();
                            match slots.get_mut(&lock) {
                                Some(slot) if slot.running.id() == previous.id() => {
                                    slot.running = Arc::clone(&task);
                                    true
                                },
                                // The holder's watcher already promoted a
                                // pending task; run the newcomer next
                                Some(slot) => {
                                    slot.pending.push_front(Arc::clone(&task));
                                    false
                                },
                                None => {
                                    slots.insert(lock.clone(), LockSlot::new(Arc::clone(&task)));
                                    true
                                },
                            }
                        };

                        if installed {
                            task.start();
                            self.spawn_watcher(lock, &task);
                        }
                    },
                }
            },
        }

        Ok(task.waiter())
    }

    // -------------------
    // | Lookup + Aborts |
    // -------------------

    /// Find all held tasks, running or pending, satisfying the condition
    pub fn find_matching(&self, condition: &MatchCondition) -> Vec<Arc<Task<T>>> {
        let slots = self.slots.lock().unwrap();
        slots
            .values()
            .flat_map(|slot| iter::once(&slot.running).chain(slot.pending.iter()))
            .filter(|task| task.matches(condition))
            .cloned()
            .collect()
    }

    /// Abort every held task satisfying the condition, rejecting each with
    /// the given message
    ///
    /// Matched pending tasks are dropped from their queues; matched running
    /// tasks settle and their locks promote the next pending task. Returns
    /// the number of tasks aborted; a fault from any abort hook propagates
    pub fn abort_matching(
        &self,
        condition: &MatchCondition,
        message: &str,
    ) -> Result<usize, QueueError> {
        let targets = self.find_matching(condition);

        // Abort before untracking so a hook fault strands no task; settled
        // pending tasks are also skipped at promotion time
        for task in &targets {
            task.abort(message)?;
            self.remove_pending(task.id());
        }

        Ok(targets.len())
    }

    // -----------------
    // | Introspection |
    // -----------------

    /// Whether the queue holds the task with the given ID, running or pending
    pub fn contains(&self, id: TaskIdentifier) -> bool {
        let slots = self.slots.lock().unwrap();
        slots.values().any(|slot| {
            slot.running.id() == id || slot.pending.iter().any(|task| task.id() == id)
        })
    }

    /// The number of tasks the queue holds, running and pending
    pub fn num_tasks(&self) -> usize {
        let slots = self.slots.lock().unwrap();
        slots.values().map(|slot| 1 + slot.pending.len()).sum()
    }

    /// Whether the queue holds no tasks
    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }

    // -----------
    // | Helpers |
    // -----------

    /// Drop the task with the given ID from any pending queue it sits in
    fn remove_pending(&self, id: TaskIdentifier) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.values_mut() {
            slot.pending.retain(|task| task.id() != id);
        }
    }

    /// Watch a started task and release its lock once it settles
    fn spawn_watcher(&self, lock: LockId, task: &Task<T>) {
        let queue = self.clone();
        let waiter = task.waiter();
        let id = task.id();
        tokio::spawn(async move {
            let _ = waiter.await;
            queue.finish(&lock, id);
        });
    }

    /// Release a lock after its holder settles and promote the next pending
    /// task, skipping tasks that settled while waiting
    fn finish(&self, lock: &LockId, id: TaskIdentifier) {
        let next = {
            let mut slots = self.slots.lock().unwrap();
            let Some(slot) = slots.get_mut(lock) else { return };
            // A preemptor has already replaced this holder
            if slot.running.id() != id {
                return;
            }

            loop {
                match slot.pending.pop_front() {
                    Some(task) if task.is_settled() => continue,
                    Some(task) => {
                        slot.running = Arc::clone(&task);
                        break Some(task);
                    },
                    None => {
                        slots.remove(lock);
                        break None;
                    },
                }
            }
        };

        if let Some(task) = next {
            info!("promoting task {} on lock {lock}", task.id());
            task.start();
            self.spawn_watcher(lock.clone(), &task);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
