//! ChronoFlow - daily task planner with a Pomodoro timer
//!
//! Tasks are scheduled per day, each with a countdown of its planned
//! duration. Progress survives restarts: the task collection lives in a
//! key-value store and a running countdown resumes where it stopped.
//!
//! # Modules
//!
//! - [`domain`] - Task record, validation and ID handling
//! - [`board`] - Actor owning the persisted task collection
//! - [`timer`] - Countdown state machine and its tokio drivers
//! - [`categorize`] - LLM-backed category and tag suggestions
//! - [`llm`] - LLM client trait with Anthropic and OpenAI implementations
//! - [`prompts`] - Handlebars prompt templates
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod board;
pub mod categorize;
pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod prompts;
pub mod timer;

pub use board::{BoardError, TaskBoard};
pub use domain::{NewTask, Task, TaskEdit, TaskStatus};
pub use timer::{TaskSink, TimerHandle, TimerPool};
