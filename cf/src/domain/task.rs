//! Task record and its input types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::id::generate_id;

/// Minimum length of a title or category
pub const MIN_LABEL_LEN: usize = 2;

/// Shortest allowed task, in minutes
pub const MIN_DURATION_MINUTES: u32 = 1;

/// Longest allowed task, in minutes
pub const MAX_DURATION_MINUTES: u32 = 120;

/// Duration used when none is given
pub const DEFAULT_DURATION_MINUTES: u32 = 25;

/// Category used when none is given
pub const DEFAULT_CATEGORY: &str = "Work";

/// Errors from validating task input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Title must be at least {} characters", MIN_LABEL_LEN)]
    TitleTooShort,

    #[error("Category must be at least {} characters", MIN_LABEL_LEN)]
    CategoryTooShort,

    #[error("Duration must be between {min} and {max} minutes, got {0}", min = MIN_DURATION_MINUTES, max = MAX_DURATION_MINUTES)]
    DurationOutOfRange(u32),
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().chars().count() < MIN_LABEL_LEN {
        return Err(ValidationError::TitleTooShort);
    }
    Ok(())
}

fn validate_category(category: &str) -> Result<(), ValidationError> {
    if category.trim().chars().count() < MIN_LABEL_LEN {
        return Err(ValidationError::CategoryTooShort);
    }
    Ok(())
}

fn validate_duration(duration: u32) -> Result<(), ValidationError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) {
        return Err(ValidationError::DurationOutOfRange(duration));
    }
    Ok(())
}

/// Progress status of a task
///
/// Aliases accept the labels written by earlier versions of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not being counted down
    #[default]
    #[serde(alias = "todo")]
    NotStarted,
    /// Actively counted down by a timer
    #[serde(alias = "in_progress")]
    Running,
    /// Countdown finished
    #[serde(alias = "done")]
    Completed,
}

impl TaskStatus {
    /// Position in the task list: running first, completed last
    pub fn display_rank(&self) -> u8 {
        match self {
            Self::Running => 0,
            Self::NotStarted => 1,
            Self::Completed => 2,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A scheduled unit of work with a Pomodoro countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier
    pub id: String,

    /// Short title
    pub title: String,

    /// Free-text details, possibly containing a URL
    #[serde(default)]
    pub description: String,

    /// Day the task is scheduled for
    pub date: NaiveDate,

    /// Planned run length in minutes
    pub duration: u32,

    /// Remaining run length in seconds; `None` means "use the full duration"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_left: Option<u32>,

    /// Free-text label
    pub category: String,

    /// Progress status
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    /// Full run length in seconds
    pub fn full_seconds(&self) -> u32 {
        self.duration.saturating_mul(60)
    }

    /// Remaining seconds, falling back to the full duration and clamped to it
    pub fn remaining_seconds(&self) -> u32 {
        let full = self.full_seconds();
        match self.status {
            TaskStatus::Completed => 0,
            _ => self.time_left.unwrap_or(full).min(full),
        }
    }

    /// Copy of this task with new progress fields; everything else is kept
    pub fn with_progress(&self, status: TaskStatus, time_left: u32) -> Self {
        debug!(id = %self.id, %status, time_left, "Task::with_progress: called");
        Self {
            status,
            time_left: Some(time_left.min(self.full_seconds())),
            ..self.clone()
        }
    }

    /// Check the invariants a stored task must hold
    pub fn is_consistent(&self) -> bool {
        let within = self.time_left.is_none_or(|t| t <= self.full_seconds());
        let completed_ok = self.status != TaskStatus::Completed || self.time_left.unwrap_or(0) == 0;
        self.duration >= MIN_DURATION_MINUTES && within && completed_ok
    }
}

/// Input for creating a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub duration: u32,
    pub category: String,
}

impl NewTask {
    /// A task for `date` with the default duration and category
    pub fn new(title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            date,
            duration: DEFAULT_DURATION_MINUTES,
            category: DEFAULT_CATEGORY.to_string(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn duration(mut self, minutes: u32) -> Self {
        self.duration = minutes;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Validate the input the way the add form does
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_duration(self.duration)?;
        validate_category(&self.category)?;
        Ok(())
    }

    /// Turn validated input into a fresh task with a new ID
    pub fn into_task(self) -> Result<Task, ValidationError> {
        self.validate()?;
        let task = Task {
            id: generate_id(),
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            date: self.date,
            duration: self.duration,
            time_left: Some(self.duration * 60),
            category: self.category.trim().to_string(),
            status: TaskStatus::NotStarted,
        };
        debug!(id = %task.id, "NewTask::into_task: created");
        Ok(task)
    }
}

/// Changes from the edit flow; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub duration: Option<u32>,
    pub category: Option<String>,
}

impl TaskEdit {
    /// Whether the edit changes anything
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.date.is_none()
            && self.duration.is_none()
            && self.category.is_none()
    }

    /// Apply to `task`. Nothing is changed unless every field validates.
    ///
    /// A not-started task with an untouched countdown gets the new full
    /// duration. Otherwise a shorter duration clamps `time_left` to the new
    /// maximum; it is never rescaled.
    pub fn apply(&self, task: &mut Task) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(duration) = self.duration {
            validate_duration(duration)?;
        }
        if let Some(category) = &self.category {
            validate_category(category)?;
        }

        if let Some(title) = &self.title {
            task.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            task.description = description.trim().to_string();
        }
        if let Some(date) = self.date {
            task.date = date;
        }
        if let Some(category) = &self.category {
            task.category = category.trim().to_string();
        }
        if let Some(duration) = self.duration {
            let untouched = task.status == TaskStatus::NotStarted && task.remaining_seconds() == task.full_seconds();
            task.duration = duration;
            let full = task.full_seconds();
            task.time_left = if untouched {
                Some(full)
            } else {
                task.time_left.map(|t| t.min(full))
            };
        }
        Ok(())
    }
}
