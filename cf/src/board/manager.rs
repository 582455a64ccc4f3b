//! TaskBoard - actor that owns the persisted task collection
//!
//! Every change to the collection goes through this actor, so writes never
//! interleave. Timers report progress on a separate unbounded channel that
//! never blocks the sender.

use std::sync::Arc;

use chrono::NaiveDate;
use kvstore::{PersistentState, StoreBackend};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::{BoardCommand, BoardError, BoardEvent, BoardResponse};
use crate::domain::{IdResolver, NewTask, Task, TaskEdit};
use crate::timer::TaskSink;

/// Handle to send commands to the TaskBoard
#[derive(Clone)]
pub struct TaskBoard {
    tx: mpsc::Sender<BoardCommand>,
    progress_tx: mpsc::UnboundedSender<Task>,
    event_tx: broadcast::Sender<BoardEvent>,
}

impl TaskBoard {
    /// Spawn a board bound to `key`
    ///
    /// Without a backend the board starts empty and keeps changes in memory
    /// until [`TaskBoard::attach_store`] is called.
    pub fn spawn(key: impl Into<String>, backend: Option<Arc<dyn StoreBackend>>) -> Self {
        let key = key.into();
        debug!(%key, has_backend = backend.is_some(), "TaskBoard::spawn: called");

        let mut tasks = PersistentState::create(key, Vec::<Task>::new());
        if let Some(backend) = backend {
            tasks.attach(backend);
        } else {
            warn!("No task store available, changes are kept in memory");
        }
        info!(count = tasks.get().len(), "Loaded tasks");

        let (tx, rx) = mpsc::channel(256);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(64);

        tokio::spawn(actor_loop(tasks, rx, progress_rx, event_tx.clone()));

        info!("TaskBoard spawned");
        Self {
            tx,
            progress_tx,
            event_tx,
        }
    }

    /// Subscribe to add/edit/delete notifications
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<BoardResponse<T>>) -> BoardCommand) -> BoardResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.map_err(|_| BoardError::ChannelError)?;
        reply_rx.await.map_err(|_| BoardError::ChannelError)?
    }

    /// Validate and store a new task
    pub async fn add_task(&self, input: NewTask) -> BoardResponse<Task> {
        debug!(title = %input.title, "add_task: called");
        self.request(|reply| BoardCommand::AddTask { input, reply }).await
    }

    /// Get a task by its full ID
    pub async fn get_task(&self, id: &str) -> BoardResponse<Option<Task>> {
        debug!(%id, "get_task: called");
        let id = id.to_string();
        self.request(|reply| BoardCommand::GetTask { id, reply }).await
    }

    /// Get a task by a full ID or a unique ID prefix
    pub async fn find_task(&self, reference: &str) -> BoardResponse<Task> {
        debug!(%reference, "find_task: called");
        let reference = reference.to_string();
        self.request(|reply| BoardCommand::FindTask { reference, reply }).await
    }

    /// Replace the stored task with the same ID
    pub async fn update_task(&self, task: Task) -> BoardResponse<()> {
        debug!(id = %task.id, "update_task: called");
        self.request(|reply| BoardCommand::UpdateTask { task, reply }).await
    }

    /// Apply user edits to a task
    pub async fn edit_task(&self, id: &str, edit: TaskEdit) -> BoardResponse<Task> {
        debug!(%id, ?edit, "edit_task: called");
        let id = id.to_string();
        self.request(|reply| BoardCommand::EditTask { id, edit, reply }).await
    }

    /// Remove a task, returning it
    pub async fn delete_task(&self, id: &str) -> BoardResponse<Task> {
        debug!(%id, "delete_task: called");
        let id = id.to_string();
        self.request(|reply| BoardCommand::DeleteTask { id, reply }).await
    }

    /// Tasks for `date` (or all tasks), running first and completed last
    pub async fn list_tasks(&self, date: Option<NaiveDate>) -> BoardResponse<Vec<Task>> {
        debug!(?date, "list_tasks: called");
        self.request(|reply| BoardCommand::ListTasks { date, reply }).await
    }

    /// Attach a store to a board spawned without one
    ///
    /// Returns the number of tasks held afterwards.
    pub async fn attach_store(&self, backend: Arc<dyn StoreBackend>) -> BoardResponse<usize> {
        debug!("attach_store: called");
        self.request(|reply| BoardCommand::AttachStore { backend, reply }).await
    }

    /// Stop the actor, waiting until queued timer progress is written
    pub async fn shutdown(&self) -> BoardResponse<()> {
        debug!("shutdown: called");
        self.request(|reply| BoardCommand::Shutdown { reply }).await
    }
}

impl TaskSink for TaskBoard {
    fn update_task(&self, task: Task) {
        if self.progress_tx.send(task).is_err() {
            warn!("Task board has stopped, timer progress dropped");
        }
    }
}

/// Sort for display: running, then not started, then completed; by title within
fn sort_for_display(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.status
            .display_rank()
            .cmp(&b.status.display_rank())
            .then_with(|| a.title.cmp(&b.title))
    });
}

/// Replace the stored task with `task.id`; false if no such task exists
fn replace_task(tasks: &mut PersistentState<Vec<Task>>, task: &Task) -> bool {
    tasks.transact(|all| match all.iter_mut().find(|t| t.id == task.id) {
        Some(slot) => {
            *slot = task.clone();
            true
        }
        None => false,
    })
}

fn resolve(tasks: &[Task], reference: &str) -> BoardResponse<Task> {
    let resolver = IdResolver::new(tasks.iter().map(|t| t.id.as_str()));
    match resolver.resolve(reference) {
        Ok(Some(id)) => tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(BoardError::NotFound(id)),
        Ok(None) => Err(BoardError::NotFound(reference.to_string())),
        Err(candidates) => Err(BoardError::Ambiguous {
            reference: reference.to_string(),
            candidates,
        }),
    }
}

fn publish(event_tx: &broadcast::Sender<BoardEvent>, event: BoardEvent) {
    // No subscribers is fine
    let _ = event_tx.send(event);
}

fn handle_command(
    tasks: &mut PersistentState<Vec<Task>>,
    cmd: BoardCommand,
    event_tx: &broadcast::Sender<BoardEvent>,
) -> Option<oneshot::Sender<BoardResponse<()>>> {
    match cmd {
        BoardCommand::AddTask { input, reply } => {
            debug!(title = %input.title, "actor_loop: AddTask command");
            let result = input.into_task().map_err(BoardError::from);
            if let Ok(task) = &result {
                tasks.transact(|all| all.push(task.clone()));
                info!(id = %task.id, title = %task.title, "Task added");
                publish(event_tx, BoardEvent::Added(task.clone()));
            }
            let _ = reply.send(result);
        }

        BoardCommand::GetTask { id, reply } => {
            debug!(%id, "actor_loop: GetTask command");
            tasks.refresh();
            let task = tasks.get().iter().find(|t| t.id == id).cloned();
            let _ = reply.send(Ok(task));
        }

        BoardCommand::FindTask { reference, reply } => {
            debug!(%reference, "actor_loop: FindTask command");
            tasks.refresh();
            let _ = reply.send(resolve(tasks.get(), &reference));
        }

        BoardCommand::UpdateTask { task, reply } => {
            debug!(id = %task.id, "actor_loop: UpdateTask command");
            let id = task.id.clone();
            let result = if replace_task(tasks, &task) {
                publish(event_tx, BoardEvent::Edited(task));
                Ok(())
            } else {
                Err(BoardError::NotFound(id))
            };
            let _ = reply.send(result);
        }

        BoardCommand::EditTask { id, edit, reply } => {
            debug!(%id, "actor_loop: EditTask command");
            let result = tasks.transact(|all| -> BoardResponse<Task> {
                let slot = all
                    .iter_mut()
                    .find(|t| t.id == id)
                    .ok_or_else(|| BoardError::NotFound(id.clone()))?;
                let mut task = slot.clone();
                edit.apply(&mut task)?;
                *slot = task.clone();
                Ok(task)
            });
            if let Ok(task) = &result {
                info!(%id, "Task edited");
                publish(event_tx, BoardEvent::Edited(task.clone()));
            }
            let _ = reply.send(result);
        }

        BoardCommand::DeleteTask { id, reply } => {
            debug!(%id, "actor_loop: DeleteTask command");
            let removed = tasks.transact(|all| all.iter().position(|t| t.id == id).map(|index| all.remove(index)));
            let result = match removed {
                Some(removed) => {
                    info!(%id, "Task deleted");
                    publish(event_tx, BoardEvent::Deleted(id));
                    Ok(removed)
                }
                None => Err(BoardError::NotFound(id)),
            };
            let _ = reply.send(result);
        }

        BoardCommand::ListTasks { date, reply } => {
            debug!(?date, "actor_loop: ListTasks command");
            tasks.refresh();
            let mut listed: Vec<Task> = tasks
                .get()
                .iter()
                .filter(|t| date.is_none_or(|d| t.date == d))
                .cloned()
                .collect();
            sort_for_display(&mut listed);
            let _ = reply.send(Ok(listed));
        }

        BoardCommand::AttachStore { backend, reply } => {
            debug!("actor_loop: AttachStore command");
            tasks.attach(backend);
            info!(count = tasks.get().len(), "Task store attached");
            let _ = reply.send(Ok(tasks.get().len()));
        }

        BoardCommand::Shutdown { reply } => {
            info!("TaskBoard shutting down");
            return Some(reply);
        }
    }
    None
}

/// Apply a timer's status and time left to the stored task
///
/// Timers own only those two fields, so edits made meanwhile (by this board
/// or by another client of the store) are kept.
fn apply_progress(tasks: &mut PersistentState<Vec<Task>>, task: Task) {
    debug!(id = %task.id, status = %task.status, time_left = ?task.time_left, "actor_loop: timer progress");
    let applied = tasks.transact(|all| match all.iter_mut().find(|t| t.id == task.id) {
        Some(slot) => {
            slot.status = task.status;
            slot.time_left = task.time_left.map(|t| t.min(slot.full_seconds()));
            true
        }
        None => false,
    });
    if !applied {
        warn!(id = %task.id, "Timer progress for unknown task ignored");
    }
}

/// The actor loop that owns the task collection and processes commands
async fn actor_loop(
    mut tasks: PersistentState<Vec<Task>>,
    mut rx: mpsc::Receiver<BoardCommand>,
    mut progress_rx: mpsc::UnboundedReceiver<Task>,
    event_tx: broadcast::Sender<BoardEvent>,
) {
    debug!("actor_loop: called");

    let mut stop_reply = None;
    loop {
        // Progress first, so a request sees every write queued before it
        tokio::select! {
            biased;
            Some(task) = progress_rx.recv() => apply_progress(&mut tasks, task),
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("actor_loop: all handles dropped");
                    break;
                };
                if let Some(reply) = handle_command(&mut tasks, cmd, &event_tx) {
                    stop_reply = Some(reply);
                    break;
                }
            }
        }
    }

    // Writes queued by timers before shutdown still land
    while let Ok(task) = progress_rx.try_recv() {
        apply_progress(&mut tasks, task);
    }

    info!("TaskBoard actor stopped");
    if let Some(reply) = stop_reply {
        let _ = reply.send(Ok(()));
    }
}
