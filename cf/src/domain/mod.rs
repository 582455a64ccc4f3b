//! Domain types for ChronoFlow
//!
//! The task is the sole persisted entity. The whole collection is stored
//! as one JSON array under a single key.

mod id;
mod task;

pub use id::{IdResolver, generate_id, short_id};
pub use task::{
    DEFAULT_CATEGORY, DEFAULT_DURATION_MINUTES, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES, MIN_LABEL_LEN, NewTask,
    Task, TaskEdit, TaskStatus, ValidationError,
};
