//! The queue that coordinates tasks competing for locks
//!
//! Holds the in-flight tasks of the system, admitting at most one running
//! task per lock. New work enters through [`TaskQueue::asap`](queue::TaskQueue::asap),
//! which either serializes behind the current lock holder or preempts it,
//! and targeted aborts find their victims through the task match conditions

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::needless_pass_by_value)]

pub mod error;
pub mod queue;

pub use error::QueueError;
pub use queue::{Policy, QueueConfig, TaskQueue};
