//! Two-phase persistent state
//!
//! A `PersistentState<T>` holds one value bound to one key. It starts
//! `Uninitialized`, serving the caller-supplied default, and becomes `Ready`
//! once a backend is attached. From then on every change is written through.
//! Read and write failures are logged and swallowed: the store is a local
//! convenience cache, not a source of truth.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::backend::StoreBackend;

/// Initialization phase of a [`PersistentState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No backend yet; the value is the default or an unsaved local change
    Uninitialized,
    /// Backend attached; the value is the loaded one or the default
    Ready,
}

/// A value bound to a key, synchronized with a [`StoreBackend`]
pub struct PersistentState<T> {
    key: String,
    value: T,
    backend: Option<Arc<dyn StoreBackend>>,
    /// Set when the value changed before a backend was attached
    dirty: bool,
}

impl<T> PersistentState<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create an uninitialized state serving `initial` until a backend is attached
    pub fn create(key: impl Into<String>, initial: T) -> Self {
        let key = key.into();
        debug!(%key, "PersistentState::create: called");
        Self {
            key,
            value: initial,
            backend: None,
            dirty: false,
        }
    }

    /// Create a state and attach `backend` right away
    pub fn open(key: impl Into<String>, initial: T, backend: Arc<dyn StoreBackend>) -> Self {
        let mut state = Self::create(key, initial);
        state.attach(backend);
        state
    }

    /// Attach a backend and load the stored value, if any
    ///
    /// A stored, well-formed payload replaces the current value. A missing key
    /// or a corrupt payload keeps the current value. A value changed while
    /// uninitialized is written through when nothing was stored.
    pub fn attach(&mut self, backend: Arc<dyn StoreBackend>) {
        debug!(key = %self.key, "PersistentState::attach: called");
        let loaded = match backend.get(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Stored value is unreadable, keeping fallback");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %self.key, "PersistentState::attach: nothing stored");
                None
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read stored value, keeping fallback");
                None
            }
        };

        self.backend = Some(backend);

        match loaded {
            Some(value) => {
                debug!(key = %self.key, "PersistentState::attach: loaded stored value");
                self.value = value;
            }
            None if self.dirty => {
                debug!(key = %self.key, "PersistentState::attach: flushing local change");
                self.persist();
            }
            None => {}
        }
        self.dirty = false;
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        if self.backend.is_some() {
            Phase::Ready
        } else {
            Phase::Uninitialized
        }
    }

    /// Whether a backend is attached
    pub fn is_ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Key this state is bound to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replace the value and write it through
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.changed();
    }

    /// Derive the next value from the previous one and write it through
    pub fn update(&mut self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value);
        self.set(next);
    }

    /// Mutate the value in place and write it through
    pub fn modify<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.value);
        self.changed();
        result
    }

    /// Re-read the stored value, picking up writes made by other clients
    ///
    /// Keeps the current value when nothing readable is stored. Returns
    /// whether the value was replaced.
    pub fn refresh(&mut self) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        match backend.get(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.value = value;
                    true
                }
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Stored value is unreadable, keeping current");
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to re-read stored value");
                false
            }
        }
    }

    fn changed(&mut self) {
        if self.backend.is_some() {
            self.persist();
        } else {
            debug!(key = %self.key, "PersistentState: change held until a backend is attached");
            self.dirty = true;
        }
    }

    fn persist(&self) {
        let Some(backend) = &self.backend else {
            return;
        };
        let raw = match serde_json::to_string(&self.value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to serialize value, not persisted");
                return;
            }
        };
        if let Err(e) = backend.set(&self.key, &raw) {
            warn!(key = %self.key, error = %e, "Failed to persist value");
        }
    }
}

impl<T> PersistentState<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Mutate the latest stored value in place and write it back atomically
    ///
    /// `f` runs on the value as currently stored, so changes other clients
    /// wrote since this state last read are kept. Falls back to the in-memory
    /// value when nothing readable is stored or the backend fails.
    pub fn transact<R>(&mut self, mut f: impl FnMut(&mut T) -> R) -> R {
        let Some(backend) = self.backend.clone() else {
            return self.modify(f);
        };
        debug!(key = %self.key, "PersistentState::transact: called");

        let key = self.key.clone();
        let current = &self.value;
        let mut outcome: Option<(T, R)> = None;
        let written = backend.update(&key, &mut |raw| {
            let mut value = match raw.map(|raw| serde_json::from_str::<T>(&raw)) {
                Some(Ok(value)) => value,
                Some(Err(e)) => {
                    warn!(%key, error = %e, "Stored value is unreadable, applying to current");
                    current.clone()
                }
                None => current.clone(),
            };
            let result = f(&mut value);
            let raw = match serde_json::to_string(&value) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    warn!(%key, error = %e, "Failed to serialize value, not persisted");
                    None
                }
            };
            outcome = Some((value, result));
            raw
        });
        if let Err(e) = written {
            warn!(key = %self.key, error = %e, "Failed to persist value");
        }

        match outcome {
            Some((value, result)) => {
                self.value = value;
                result
            }
            // The backend failed before reading; apply locally
            None => f(&mut self.value),
        }
    }
}
