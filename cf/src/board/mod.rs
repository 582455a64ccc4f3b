//! Task board with actor pattern
//!
//! TaskBoard owns the persisted task collection and processes messages via
//! channels, providing single-writer access to the stored tasks.

mod manager;
mod messages;

pub use manager::TaskBoard;
pub use messages::{BoardCommand, BoardError, BoardEvent, BoardResponse};
