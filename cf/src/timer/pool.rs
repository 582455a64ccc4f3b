//! Timer drivers
//!
//! Each mounted timer runs as its own tokio task. The pool keeps at most one
//! live driver per task id: mounting again retires the previous driver, and
//! a retired driver can no longer write, since every write is first checked
//! against the registry. The sink itself is called with the registry unlocked,
//! so it may use the pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::machine::{PomodoroTimer, TimerSnapshot, TimerState};
use super::{TaskSink, TimerError};
use crate::domain::Task;

/// Commands accepted by a driver
#[derive(Debug)]
enum TimerCommand {
    Toggle,
    Reset,
    Sync(Task),
}

struct Mounted {
    generation: u64,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    next_generation: u64,
    active: HashMap<String, Mounted>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write path of one driver generation
struct WriteGate {
    task_id: String,
    generation: u64,
    registry: Arc<Mutex<Registry>>,
    sink: Arc<dyn TaskSink>,
}

impl WriteGate {
    /// Forward `task` to the sink unless this driver has been replaced
    fn emit(&self, task: Task) -> bool {
        let current = lock(&self.registry).active.get(&self.task_id).map(|m| m.generation);
        if current != Some(self.generation) {
            debug!(task_id = %self.task_id, generation = self.generation, "WriteGate::emit: retired driver, dropping write");
            return false;
        }
        self.sink.update_task(task);
        true
    }
}

/// Spawns and tracks timer drivers
#[derive(Clone)]
pub struct TimerPool {
    sink: Arc<dyn TaskSink>,
    tick: Duration,
    registry: Arc<Mutex<Registry>>,
}

impl TimerPool {
    /// Create a pool whose drivers tick every `tick` and write to `sink`
    pub fn new(sink: Arc<dyn TaskSink>, tick: Duration) -> Self {
        debug!(?tick, "TimerPool::new: called");
        Self {
            sink,
            tick,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Mount a timer on `task`, retiring any driver already mounted on its id
    ///
    /// Outside a tokio runtime the returned handle is unavailable: it reports
    /// an idle countdown and rejects every command.
    pub fn mount(&self, task: Task) -> TimerHandle {
        debug!(id = %task.id, "TimerPool::mount: called");
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(id = %task.id, error = %e, "No runtime available, timer will stay idle");
                return TimerHandle::unavailable(task);
            }
        };

        let timer = PomodoroTimer::mount(task);
        let task_id = timer.task().id.clone();
        let (snapshot_tx, snapshot_rx) = watch::channel(timer.snapshot());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let mut registry = lock(&self.registry);
        registry.next_generation += 1;
        let generation = registry.next_generation;

        let gate = WriteGate {
            task_id: task_id.clone(),
            generation,
            registry: Arc::clone(&self.registry),
            sink: Arc::clone(&self.sink),
        };
        let join = runtime.spawn(drive(timer, command_rx, gate, snapshot_tx, self.tick));

        if let Some(previous) = registry.active.insert(task_id.clone(), Mounted { generation, join }) {
            debug!(%task_id, previous = previous.generation, "TimerPool::mount: retiring previous driver");
            previous.join.abort();
        }
        drop(registry);

        info!(%task_id, generation, "Timer mounted");
        TimerHandle {
            task_id,
            generation,
            commands: Some(command_tx),
            snapshots: snapshot_rx,
            registry: Some(Arc::clone(&self.registry)),
        }
    }

    /// Whether a driver is mounted on `task_id`
    pub fn is_mounted(&self, task_id: &str) -> bool {
        lock(&self.registry).active.contains_key(task_id)
    }

    /// Ids of all mounted timers, sorted
    pub fn mounted(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.registry).active.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop every driver
    pub fn unmount_all(&self) {
        let mut registry = lock(&self.registry);
        for (task_id, mounted) in registry.active.drain() {
            debug!(%task_id, "TimerPool::unmount_all: stopping driver");
            mounted.join.abort();
        }
    }
}

/// Control surface of one mounted timer
///
/// Dropping the handle unmounts the timer.
pub struct TimerHandle {
    task_id: String,
    generation: u64,
    commands: Option<mpsc::UnboundedSender<TimerCommand>>,
    snapshots: watch::Receiver<TimerSnapshot>,
    registry: Option<Arc<Mutex<Registry>>>,
}

impl TimerHandle {
    fn unavailable(task: Task) -> Self {
        let timer = PomodoroTimer::mount(task);
        let snapshot = TimerSnapshot {
            task_id: timer.task().id.clone(),
            state: TimerState::Idle {
                remaining: timer.remaining(),
            },
            available: false,
        };
        let (_, snapshots) = watch::channel(snapshot);
        Self {
            task_id: timer.task().id.clone(),
            generation: 0,
            commands: None,
            snapshots,
            registry: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// False when the timer could not be scheduled
    pub fn is_available(&self) -> bool {
        self.commands.is_some()
    }

    /// Start, pause, or restart the countdown
    pub fn toggle(&self) -> Result<(), TimerError> {
        self.send(TimerCommand::Toggle)
    }

    /// Back to the full duration, not started
    pub fn reset(&self) -> Result<(), TimerError> {
        self.send(TimerCommand::Reset)
    }

    /// Hand the driver a newer snapshot of its task
    pub fn sync(&self, task: Task) -> Result<(), TimerError> {
        self.send(TimerCommand::Sync(task))
    }

    /// Latest published state
    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that observes every published state
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until the published state satisfies `predicate`
    pub async fn wait_until(&self, predicate: impl FnMut(&TimerSnapshot) -> bool) -> Result<TimerSnapshot, TimerError> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(predicate)
            .await
            .map_err(|_| TimerError::Unmounted(self.task_id.clone()))?;
        Ok(snapshot.clone())
    }

    /// Stop the driver
    pub fn unmount(self) {
        debug!(task_id = %self.task_id, "TimerHandle::unmount: called");
    }

    fn send(&self, command: TimerCommand) -> Result<(), TimerError> {
        debug!(task_id = %self.task_id, ?command, "TimerHandle::send: called");
        let Some(commands) = &self.commands else {
            warn!(task_id = %self.task_id, "Timer command ignored, no scheduler available");
            return Err(TimerError::SchedulingUnavailable);
        };
        commands
            .send(command)
            .map_err(|_| TimerError::Unmounted(self.task_id.clone()))
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        let Some(registry) = &self.registry else {
            return;
        };
        let mut registry = lock(registry);
        let current = registry.active.get(&self.task_id).map(|m| m.generation);
        if current == Some(self.generation)
            && let Some(mounted) = registry.active.remove(&self.task_id)
        {
            mounted.join.abort();
            info!(task_id = %self.task_id, "Timer unmounted");
        }
    }
}

fn arm(tick: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Driver loop: one per mounted timer
async fn drive(
    mut timer: PomodoroTimer,
    mut commands: mpsc::UnboundedReceiver<TimerCommand>,
    gate: WriteGate,
    snapshots: watch::Sender<TimerSnapshot>,
    tick: Duration,
) {
    debug!(task_id = %gate.task_id, generation = gate.generation, "drive: started");
    let mut ticker: Option<Interval> = None;

    loop {
        if !timer.is_running() {
            ticker = None;
        } else if ticker.is_none() {
            ticker = Some(arm(tick));
        }

        let mut disarm = false;
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!(task_id = %gate.task_id, "drive: handle dropped");
                    break;
                };
                let update = match command {
                    TimerCommand::Toggle => timer.toggle(),
                    TimerCommand::Reset => {
                        disarm = true;
                        timer.reset()
                    }
                    TimerCommand::Sync(task) => {
                        disarm = timer.sync(task);
                        None
                    }
                };
                if let Some(task) = update {
                    gate.emit(task);
                }
            }
            _ = next_tick(&mut ticker) => {
                if let Some(task) = timer.tick() {
                    gate.emit(task);
                }
            }
        }

        if disarm {
            ticker = None;
        }
        snapshots.send_replace(timer.snapshot());
    }

    debug!(task_id = %gate.task_id, "drive: stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskStatus};
    use chrono::NaiveDate;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<Task>>,
    }

    impl RecordingSink {
        fn updates(&self) -> Vec<Task> {
            self.updates.lock().unwrap().clone()
        }
    }

    impl TaskSink for RecordingSink {
        fn update_task(&self, task: Task) {
            self.updates.lock().unwrap().push(task);
        }
    }

    fn task(duration: u32) -> Task {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        NewTask::new("Deep work", date).duration(duration).into_task().unwrap()
    }

    fn pool() -> (TimerPool, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let pool = TimerPool::new(sink.clone(), Duration::from_secs(1));
        (pool, sink)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    /// Sink that looks the pool up again from inside every write
    #[derive(Default)]
    struct ReentrantSink {
        pool: Mutex<Option<TimerPool>>,
        mounted_during_write: Mutex<Vec<bool>>,
    }

    impl TaskSink for ReentrantSink {
        fn update_task(&self, task: Task) {
            let pool = self.pool.lock().unwrap().clone();
            if let Some(pool) = pool {
                self.mounted_during_write.lock().unwrap().push(pool.is_mounted(&task.id));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_may_call_back_into_pool() {
        let sink = Arc::new(ReentrantSink::default());
        let pool = TimerPool::new(sink.clone(), Duration::from_secs(1));
        *sink.pool.lock().unwrap() = Some(pool.clone());

        let handle = pool.mount(task(1));
        handle.toggle().unwrap();
        let done = tokio::time::timeout(
            Duration::from_secs(120),
            handle.wait_until(|s| s.state == TimerState::Completed),
        )
        .await
        .expect("driver stalled inside the sink")
        .unwrap();
        assert_eq!(done.remaining(), 0);

        let seen = sink.mounted_during_write.lock().unwrap().clone();
        assert_eq!(seen.len(), 61);
        assert!(seen.iter().all(|mounted| *mounted));

        // Break the pool <-> sink cycle
        sink.pool.lock().unwrap().take();
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_minute_task_completes() {
        let (pool, sink) = pool();
        let handle = pool.mount(task(1));

        handle.toggle().unwrap();
        tokio::time::sleep(Duration::from_millis(61_500)).await;

        assert_eq!(handle.snapshot().state, TimerState::Completed);

        let updates = sink.updates();
        // One start write, then one per second
        assert_eq!(updates.len(), 61);
        assert_eq!(updates[0].status, TaskStatus::Running);
        assert_eq!(updates[0].time_left, Some(60));
        assert_eq!(updates[1].time_left, Some(59));
        let last = updates.last().unwrap();
        assert_eq!(last.status, TaskStatus::Completed);
        assert_eq!(last.time_left, Some(0));
        assert_eq!(updates.iter().filter(|t| t.status == TaskStatus::Completed).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remounted_running_task_resumes() {
        let (pool, sink) = pool();
        let stored = task(25).with_progress(TaskStatus::Running, 10);

        let handle = pool.mount(stored);
        assert_eq!(handle.snapshot().state, TimerState::Running { remaining: 10 });

        tokio::time::sleep(Duration::from_millis(10_500)).await;

        assert_eq!(handle.snapshot().state, TimerState::Completed);
        let updates = sink.updates();
        assert_eq!(updates.len(), 10);
        assert_eq!(updates[0].time_left, Some(9));
        assert_eq!(updates.last().unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_countdown() {
        let (pool, sink) = pool();
        let handle = pool.mount(task(1));

        handle.toggle().unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        handle.toggle().unwrap();
        settle().await;

        assert_eq!(handle.snapshot().state, TimerState::Idle { remaining: 57 });
        let writes = sink.updates().len();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.snapshot().state, TimerState::Idle { remaining: 57 });
        assert_eq!(sink.updates().len(), writes);

        let last = sink.updates().pop().unwrap();
        assert_eq!(last.status, TaskStatus::NotStarted);
        assert_eq!(last.time_left, Some(57));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_countdown() {
        let (pool, sink) = pool();
        let handle = pool.mount(task(2));

        handle.toggle().unwrap();
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        handle.reset().unwrap();
        settle().await;

        assert_eq!(handle.snapshot().state, TimerState::Idle { remaining: 120 });
        let writes = sink.updates().len();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.updates().len(), writes);
        let last = sink.updates().pop().unwrap();
        assert_eq!(last.status, TaskStatus::NotStarted);
        assert_eq!(last.time_left, Some(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_again_retires_previous_driver() {
        let (pool, sink) = pool();
        let original = task(1);

        let first = pool.mount(original.clone());
        first.toggle().unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let writes = sink.updates().len();
        assert_eq!(writes, 3);

        let second = pool.mount(original.clone());
        tokio::time::sleep(Duration::from_secs(5)).await;

        // The retired driver wrote nothing more and the new one is idle
        assert_eq!(sink.updates().len(), writes);
        assert_eq!(second.snapshot().state, TimerState::Idle { remaining: 60 });
        assert_eq!(pool.mounted(), vec![original.id.clone()]);

        // Dropping the stale handle leaves the new driver mounted
        drop(first);
        assert!(pool.is_mounted(&original.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_with_new_duration_derives_again() {
        let (pool, _sink) = pool();
        let original = task(1);
        let handle = pool.mount(original.clone());

        handle.toggle().unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let mut edited = original.clone();
        edited.duration = 5;
        edited.time_left = Some(300);
        handle.sync(edited).unwrap();
        settle().await;

        assert_eq!(handle.snapshot().state, TimerState::Idle { remaining: 300 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_unmounts() {
        let (pool, _sink) = pool();
        let t = task(1);

        let handle = pool.mount(t.clone());
        assert!(pool.is_mounted(&t.id));

        handle.unmount();
        assert!(!pool.is_mounted(&t.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_completed() {
        let (pool, _sink) = pool();
        let handle = pool.mount(task(1));
        handle.toggle().unwrap();

        let done = handle
            .wait_until(|s| s.state == TimerState::Completed)
            .await
            .unwrap();
        assert_eq!(done.remaining(), 0);
    }

    #[test]
    fn test_no_runtime_means_unavailable() {
        let (pool, sink) = pool();
        let stored = task(25).with_progress(TaskStatus::Running, 100);

        let handle = pool.mount(stored);
        assert!(!handle.is_available());
        assert_eq!(handle.toggle(), Err(TimerError::SchedulingUnavailable));
        assert_eq!(handle.reset(), Err(TimerError::SchedulingUnavailable));

        let snapshot = handle.snapshot();
        assert!(!snapshot.available);
        assert_eq!(snapshot.state, TimerState::Idle { remaining: 100 });
        assert!(sink.updates().is_empty());
        assert!(pool.mounted().is_empty());
    }
}
