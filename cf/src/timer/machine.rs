//! Pomodoro timer state machine
//!
//! Pure and synchronous: every transition returns the task record to persist,
//! if the transition changed persisted fields. Scheduling lives in the driver.

use tracing::debug;

use crate::domain::{Task, TaskStatus};

/// Countdown state of a mounted timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Paused or not yet started
    Idle { remaining: u32 },
    /// Counting down once per second
    Running { remaining: u32 },
    /// Countdown reached zero
    Completed,
}

impl TimerState {
    /// Seconds left on the clock
    pub fn remaining(&self) -> u32 {
        match self {
            Self::Idle { remaining } | Self::Running { remaining } => *remaining,
            Self::Completed => 0,
        }
    }

    /// Derive the state from a persisted task
    ///
    /// The persisted status is mirrored: a task stored as running resumes
    /// running from its stored remaining time.
    pub fn from_task(task: &Task) -> Self {
        let remaining = task.remaining_seconds();
        match task.status {
            TaskStatus::Completed => Self::Completed,
            TaskStatus::Running if remaining == 0 => Self::Completed,
            TaskStatus::Running => Self::Running { remaining },
            TaskStatus::NotStarted => Self::Idle { remaining },
        }
    }
}

impl std::fmt::Display for TimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle { .. } => write!(f, "idle"),
            Self::Running { .. } => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Point-in-time view of a timer, published to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub task_id: String,
    pub state: TimerState,
    /// False when no scheduler is available and the timer cannot run
    pub available: bool,
}

impl TimerSnapshot {
    pub fn remaining(&self) -> u32 {
        self.state.remaining()
    }

    /// Remaining time as `MM:SS`
    pub fn clock(&self) -> String {
        format_clock(self.remaining())
    }
}

/// Format seconds as zero-padded `MM:SS`
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Fields that identify which countdown a snapshot belongs to
fn identity(task: &Task) -> (&str, u32, Option<u32>) {
    (task.id.as_str(), task.duration, task.time_left)
}

/// A countdown bound to one task
#[derive(Debug, Clone)]
pub struct PomodoroTimer {
    task: Task,
    state: TimerState,
}

impl PomodoroTimer {
    /// Mount a timer on `task`, deriving the state from what is persisted
    pub fn mount(task: Task) -> Self {
        let state = TimerState::from_task(&task);
        debug!(id = %task.id, %state, remaining = state.remaining(), "PomodoroTimer::mount: called");
        Self { task, state }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining(&self) -> u32 {
        self.state.remaining()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    /// Latest task snapshot, including every update this timer emitted
    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            task_id: self.task.id.clone(),
            state: self.state,
            available: true,
        }
    }

    /// Adopt a newer task snapshot from the owner
    ///
    /// When the id, duration or stored time left differ from the current
    /// snapshot the state is derived again, as on mount. Otherwise only the
    /// other fields are refreshed and the countdown carries on. Returns true
    /// when the state was derived again. Never emits an update.
    pub fn sync(&mut self, task: Task) -> bool {
        let changed = identity(&task) != identity(&self.task);
        if changed {
            self.state = TimerState::from_task(&task);
            debug!(id = %task.id, state = %self.state, "PomodoroTimer::sync: identity changed, state derived again");
        }
        self.task = task;
        changed
    }

    /// One elapsed second
    pub fn tick(&mut self) -> Option<Task> {
        let TimerState::Running { remaining } = self.state else {
            return None;
        };
        if remaining == 0 {
            return None;
        }

        let remaining = remaining - 1;
        if remaining == 0 {
            debug!(id = %self.task.id, "PomodoroTimer::tick: countdown finished");
            self.state = TimerState::Completed;
            Some(self.emit(TaskStatus::Completed, 0))
        } else {
            self.state = TimerState::Running { remaining };
            Some(self.emit(TaskStatus::Running, remaining))
        }
    }

    /// Start, pause, or restart a finished countdown
    ///
    /// Pausing stores the remaining time and reverts the status to
    /// `not_started`, so a stored `running` always means "being counted".
    pub fn toggle(&mut self) -> Option<Task> {
        match self.state {
            TimerState::Idle { remaining } if remaining > 0 => {
                debug!(id = %self.task.id, remaining, "PomodoroTimer::toggle: start");
                self.state = TimerState::Running { remaining };
                Some(self.emit(TaskStatus::Running, remaining))
            }
            TimerState::Running { remaining } => {
                debug!(id = %self.task.id, remaining, "PomodoroTimer::toggle: pause");
                self.state = TimerState::Idle { remaining };
                Some(self.emit(TaskStatus::NotStarted, remaining))
            }
            TimerState::Idle { .. } | TimerState::Completed => {
                let full = self.task.full_seconds();
                if full == 0 {
                    return None;
                }
                debug!(id = %self.task.id, full, "PomodoroTimer::toggle: re-arm");
                self.state = TimerState::Running { remaining: full };
                Some(self.emit(TaskStatus::Running, full))
            }
        }
    }

    /// Back to the full duration, not started
    pub fn reset(&mut self) -> Option<Task> {
        let full = self.task.full_seconds();
        debug!(id = %self.task.id, full, "PomodoroTimer::reset: called");
        self.state = TimerState::Idle { remaining: full };
        Some(self.emit(TaskStatus::NotStarted, full))
    }

    fn emit(&mut self, status: TaskStatus, time_left: u32) -> Task {
        self.task = self.task.with_progress(status, time_left);
        self.task.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewTask;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn task(duration: u32) -> Task {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let mut task = NewTask::new("Focus", date).duration(duration).into_task().unwrap();
        task.time_left = None;
        task
    }

    #[test]
    fn test_mount_without_time_left_uses_full_duration() {
        let timer = PomodoroTimer::mount(task(25));
        assert_eq!(timer.state(), TimerState::Idle { remaining: 1500 });
    }

    #[test]
    fn test_mount_resumes_persisted_running_task() {
        let mut t = task(25);
        t.time_left = Some(10);
        t.status = TaskStatus::Running;

        let timer = PomodoroTimer::mount(t);
        assert_eq!(timer.state(), TimerState::Running { remaining: 10 });
    }

    #[test]
    fn test_mount_mirrors_completed_and_paused() {
        let mut done = task(5);
        done.status = TaskStatus::Completed;
        done.time_left = Some(0);
        assert_eq!(PomodoroTimer::mount(done).state(), TimerState::Completed);

        let mut paused = task(5);
        paused.time_left = Some(42);
        assert_eq!(PomodoroTimer::mount(paused).state(), TimerState::Idle { remaining: 42 });
    }

    #[test]
    fn test_one_minute_task_completes_after_sixty_ticks() {
        let mut timer = PomodoroTimer::mount(task(1));

        let started = timer.toggle().unwrap();
        assert_eq!(started.status, TaskStatus::Running);
        assert_eq!(started.time_left, Some(60));

        let mut last = None;
        for _ in 0..60 {
            last = timer.tick();
        }

        let last = last.unwrap();
        assert_eq!(last.status, TaskStatus::Completed);
        assert_eq!(last.time_left, Some(0));
        assert_eq!(timer.state(), TimerState::Completed);

        // Halted: no further decrements
        assert_eq!(timer.tick(), None);
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn test_ticks_persist_running_status() {
        let mut timer = PomodoroTimer::mount(task(2));
        timer.toggle();

        let update = timer.tick().unwrap();
        assert_eq!(update.status, TaskStatus::Running);
        assert_eq!(update.time_left, Some(119));
        assert_eq!(timer.task(), &update);
    }

    #[test]
    fn test_idle_does_not_tick() {
        let mut timer = PomodoroTimer::mount(task(2));
        assert_eq!(timer.tick(), None);
        assert_eq!(timer.remaining(), 120);
    }

    #[test]
    fn test_pause_keeps_remaining_and_reverts_status() {
        let mut timer = PomodoroTimer::mount(task(2));
        timer.toggle();
        for _ in 0..5 {
            timer.tick();
        }

        let paused = timer.toggle().unwrap();
        assert_eq!(paused.status, TaskStatus::NotStarted);
        assert_eq!(paused.time_left, Some(115));
        assert_eq!(timer.state(), TimerState::Idle { remaining: 115 });

        // Paused timers do not advance
        assert_eq!(timer.tick(), None);

        let resumed = timer.toggle().unwrap();
        assert_eq!(resumed.status, TaskStatus::Running);
        assert_eq!(resumed.time_left, Some(115));
    }

    #[test]
    fn test_toggle_from_completed_rearms() {
        let mut t = task(3);
        t.status = TaskStatus::Completed;
        t.time_left = Some(0);
        let mut timer = PomodoroTimer::mount(t);

        let rearmed = timer.toggle().unwrap();
        assert_eq!(rearmed.status, TaskStatus::Running);
        assert_eq!(rearmed.time_left, Some(180));
        assert_eq!(timer.state(), TimerState::Running { remaining: 180 });
    }

    #[test]
    fn test_toggle_from_idle_at_zero_rearms() {
        let mut t = task(1);
        t.time_left = Some(0);
        let mut timer = PomodoroTimer::mount(t);
        assert_eq!(timer.state(), TimerState::Idle { remaining: 0 });

        let rearmed = timer.toggle().unwrap();
        assert_eq!(rearmed.time_left, Some(60));
        assert!(timer.is_running());
    }

    #[test]
    fn test_reset_restores_full_duration() {
        let mut timer = PomodoroTimer::mount(task(2));
        timer.toggle();
        timer.tick();
        timer.tick();

        let reset = timer.reset().unwrap();
        assert_eq!(reset.status, TaskStatus::NotStarted);
        assert_eq!(reset.time_left, Some(120));
        assert_eq!(timer.state(), TimerState::Idle { remaining: 120 });
    }

    #[test]
    fn test_updates_keep_other_fields() {
        let mut t = task(2);
        t.description = "Chapter 3".to_string();
        t.category = "Study".to_string();
        let mut timer = PomodoroTimer::mount(t.clone());

        let update = timer.toggle().unwrap();
        assert_eq!(update.id, t.id);
        assert_eq!(update.title, t.title);
        assert_eq!(update.description, "Chapter 3");
        assert_eq!(update.category, "Study");
        assert_eq!(update.date, t.date);
    }

    #[test]
    fn test_sync_echo_keeps_countdown() {
        let mut timer = PomodoroTimer::mount(task(2));
        timer.toggle();
        let update = timer.tick().unwrap();

        // The owner echoes back what we persisted, with an edited title
        let mut echoed = update.clone();
        echoed.title = "Renamed".to_string();
        assert!(!timer.sync(echoed));
        assert_eq!(timer.state(), TimerState::Running { remaining: 119 });
        assert_eq!(timer.task().title, "Renamed");
    }

    #[test]
    fn test_sync_identity_change_derives_again() {
        let mut timer = PomodoroTimer::mount(task(2));
        timer.toggle();
        timer.tick();

        let other = task(4);
        assert!(timer.sync(other.clone()));
        assert_eq!(timer.state(), TimerState::Idle { remaining: 240 });
        assert_eq!(timer.task().id, other.id);

        // Duration edit on the same task also derives again
        let mut longer = other.clone();
        longer.duration = 10;
        assert!(timer.sync(longer));
        assert_eq!(timer.remaining(), 600);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(61), "01:01");
        assert_eq!(format_clock(1500), "25:00");
    }

    proptest! {
        #[test]
        fn prop_n_ticks_subtract_n(duration in 1u32..=120, offset in 0u32..7200, n in 0u32..7200) {
            let full = duration * 60;
            let start = offset % full + 1;
            let n = n % start;

            let mut t = task(duration);
            t.time_left = Some(start);
            t.status = TaskStatus::Running;
            let mut timer = PomodoroTimer::mount(t);

            for _ in 0..n {
                let update = timer.tick().unwrap();
                prop_assert_eq!(update.status, TaskStatus::Running);
            }
            prop_assert_eq!(timer.state(), TimerState::Running { remaining: start - n });
        }

        #[test]
        fn prop_never_negative(duration in 1u32..=3, extra in 0u32..50) {
            let mut timer = PomodoroTimer::mount(task(duration));
            timer.toggle();
            for _ in 0..(duration * 60 + extra) {
                timer.tick();
            }
            prop_assert_eq!(timer.state(), TimerState::Completed);
            prop_assert_eq!(timer.task().time_left, Some(0));
            prop_assert!(timer.task().is_consistent());
        }
    }
}
