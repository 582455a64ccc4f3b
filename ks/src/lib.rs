//! KvStore - synchronous key-value store with a two-phase persistent state wrapper
//!
//! Values are stored as UTF-8 JSON text under string keys. A [`PersistentState`]
//! wraps one key and keeps an in-memory value in sync with the backend, while
//! tolerating the window before any backend is available.
//!
//! # Architecture
//!
//! ```text
//! <store_path>/
//! ├── .lock                  # exclusive write lock
//! ├── <name>.lease           # held while a client claims <name>
//! ├── chrono-flow-tasks.json # one file per key
//! └── ...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kvstore::{FileBackend, PersistentState};
//!
//! let backend = Arc::new(FileBackend::open(".kvstore")?);
//! let mut counter = PersistentState::create("counter", 0u32);
//! counter.attach(backend);
//! counter.update(|n| n + 1);
//! ```

pub mod backend;
pub mod cli;
pub mod config;
mod error;
mod state;

pub use backend::{FileBackend, Lease, MemoryBackend, StoreBackend, validate_key};
pub use error::StoreError;
pub use state::{Phase, PersistentState};

/// File extension used for stored values
pub const VALUE_EXTENSION: &str = "json";

/// File extension of lease files taken with [`FileBackend::try_lease`]
pub const LEASE_EXTENSION: &str = "lease";

/// Name of the lock file guarding writes in a [`FileBackend`] directory
pub const LOCK_FILE: &str = ".lock";
