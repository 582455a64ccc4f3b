//! Pomodoro timers
//!
//! [`PomodoroTimer`] is the pure countdown. [`TimerPool`] runs one driver
//! task per mounted task id and forwards every persisted change to a
//! [`TaskSink`].

mod machine;
mod pool;

pub use machine::{PomodoroTimer, TimerSnapshot, TimerState, format_clock};
pub use pool::{TimerHandle, TimerPool};

use thiserror::Error;

use crate::domain::Task;

/// Receiver of task records emitted by timers
///
/// Calls are fire-and-forget and must not block: they run on the timer's
/// driver task. The pool's registry is not locked during a call.
pub trait TaskSink: Send + Sync {
    /// Replace the stored task whose id matches `task.id`
    fn update_task(&self, task: Task);
}

/// Errors from timer handles
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("No scheduler is available; the timer cannot run")]
    SchedulingUnavailable,

    #[error("Timer for task {0} is no longer mounted")]
    Unmounted(String),
}
