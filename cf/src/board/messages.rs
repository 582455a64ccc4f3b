//! Task board messages
//!
//! Commands and responses for the actor pattern.

use std::sync::Arc;

use chrono::NaiveDate;
use kvstore::StoreBackend;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{NewTask, Task, TaskEdit, ValidationError};

/// Errors from board operations
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Ambiguous task reference '{reference}': matches {}", .candidates.join(", "))]
    Ambiguous { reference: String, candidates: Vec<String> },

    #[error("Invalid task: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Channel error")]
    ChannelError,
}

/// Response from board operations
pub type BoardResponse<T> = Result<T, BoardError>;

/// Change notifications for observers of the board
///
/// Timer progress is not announced; only changes made through the board's
/// own commands are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    Added(Task),
    Edited(Task),
    Deleted(String),
}

/// Commands sent to the TaskBoard actor
pub enum BoardCommand {
    AddTask {
        input: NewTask,
        reply: oneshot::Sender<BoardResponse<Task>>,
    },
    GetTask {
        id: String,
        reply: oneshot::Sender<BoardResponse<Option<Task>>>,
    },
    FindTask {
        reference: String,
        reply: oneshot::Sender<BoardResponse<Task>>,
    },
    UpdateTask {
        task: Task,
        reply: oneshot::Sender<BoardResponse<()>>,
    },
    EditTask {
        id: String,
        edit: TaskEdit,
        reply: oneshot::Sender<BoardResponse<Task>>,
    },
    DeleteTask {
        id: String,
        reply: oneshot::Sender<BoardResponse<Task>>,
    },
    ListTasks {
        date: Option<NaiveDate>,
        reply: oneshot::Sender<BoardResponse<Vec<Task>>>,
    },
    AttachStore {
        backend: Arc<dyn StoreBackend>,
        reply: oneshot::Sender<BoardResponse<usize>>,
    },
    /// Replies once queued timer progress has been written
    Shutdown {
        reply: oneshot::Sender<BoardResponse<()>>,
    },
}

impl std::fmt::Debug for BoardCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddTask { input, .. } => write!(f, "AddTask({})", input.title),
            Self::GetTask { id, .. } => write!(f, "GetTask({})", id),
            Self::FindTask { reference, .. } => write!(f, "FindTask({})", reference),
            Self::UpdateTask { task, .. } => write!(f, "UpdateTask({})", task.id),
            Self::EditTask { id, .. } => write!(f, "EditTask({})", id),
            Self::DeleteTask { id, .. } => write!(f, "DeleteTask({})", id),
            Self::ListTasks { date, .. } => write!(f, "ListTasks({:?})", date),
            Self::AttachStore { .. } => write!(f, "AttachStore"),
            Self::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}
