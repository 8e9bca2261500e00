//! Persistence
//!
//! Moves [`CartState`] in and out of durable storage. The in-memory state is always
//! authoritative: a snapshot that cannot be read is discarded, and a write that fails is
//! logged and retried on the next flush without touching the state.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::carts::CartState;

pub mod snapshot;
pub mod storage;

pub use snapshot::{
    PersistedField, PersistedFields, SCHEMA_VERSION, Snapshot, SnapshotError, SnapshotIssue,
    SnapshotRejected,
};
pub use storage::{FileStorage, MemoryStorage, NullStorage, SnapshotStorage, StorageError};

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The snapshot could not be encoded, decoded or validated.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// When recorded changes are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WritePolicy {
    /// Write after every change.
    #[default]
    Immediate,

    /// Write once `max_pending` changes have accumulated, or on an explicit flush.
    Batched {
        /// Changes held back before writing
        max_pending: u32,
    },
}

/// How a restore went.
#[derive(Debug)]
pub enum RestoreOutcome {
    /// A stored snapshot was loaded.
    Restored,

    /// Nothing was stored.
    Empty,

    /// A stored snapshot could not be used and was ignored.
    Discarded(PersistenceError),
}

impl RestoreOutcome {
    /// Whether a snapshot was loaded.
    pub fn is_restored(&self) -> bool {
        matches!(self, RestoreOutcome::Restored)
    }
}

/// Result of [`Persistor::restore`].
#[derive(Debug)]
pub struct Restore {
    /// State to start from, empty unless a snapshot was restored
    pub state: CartState,

    /// What happened
    pub outcome: RestoreOutcome,
}

/// Writes cart state to a [`SnapshotStorage`] under one key.
#[derive(Debug)]
pub struct Persistor<S> {
    storage: S,
    key: String,
    fields: PersistedFields,
    policy: WritePolicy,
    pending: u32,
    failures: u32,
}

impl<S: SnapshotStorage> Persistor<S> {
    /// Persist under `key`, writing every change.
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            fields: PersistedFields::ALL,
            policy: WritePolicy::Immediate,
            pending: 0,
            failures: 0,
        }
    }

    /// Only persist the given fields.
    #[must_use]
    pub fn with_fields(mut self, fields: PersistedFields) -> Self {
        self.fields = fields;
        self
    }

    /// Use `policy` to decide when to write.
    #[must_use]
    pub fn with_policy(mut self, policy: WritePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The storage key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Changes recorded but not yet written.
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Writes that have failed since this persistor was created.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Load the stored state.
    ///
    /// Missing, malformed or invalid snapshots yield an empty state; the reason is reported
    /// in [`Restore::outcome`].
    #[tracing::instrument(name = "persistence.restore", skip(self), fields(key = %self.key))]
    pub fn restore(&self) -> Restore {
        match self.load() {
            Ok(Some(state)) => {
                info!(carts = state.carts().len(), "restored cart snapshot");

                Restore {
                    state,
                    outcome: RestoreOutcome::Restored,
                }
            }
            Ok(None) => {
                debug!("no stored cart snapshot");

                Restore {
                    state: CartState::new(),
                    outcome: RestoreOutcome::Empty,
                }
            }
            Err(error) => {
                warn!(%error, "discarding unusable cart snapshot");

                Restore {
                    state: CartState::new(),
                    outcome: RestoreOutcome::Discarded(error),
                }
            }
        }
    }

    fn load(&self) -> Result<Option<CartState>, PersistenceError> {
        let Some(raw) = self.storage.read(&self.key)? else {
            return Ok(None);
        };

        let state = Snapshot::decode(&raw)?
            .validate()
            .map_err(SnapshotError::from)?;

        Ok(Some(state))
    }

    /// Note that `state` changed, writing it out if the policy says so.
    ///
    /// Returns whether a write succeeded.
    pub fn record_change(&mut self, state: &CartState) -> bool {
        self.pending = self.pending.saturating_add(1);

        let due = match self.policy {
            WritePolicy::Immediate => true,
            WritePolicy::Batched { max_pending } => self.pending >= max_pending,
        };

        due && self.flush(state)
    }

    /// Write `state` now if any change is pending.
    ///
    /// Failures are logged and counted; the pending changes stay pending so a later flush
    /// retries them. Returns whether a write succeeded.
    #[tracing::instrument(
        name = "persistence.flush",
        skip(self, state),
        fields(key = %self.key, pending = self.pending)
    )]
    pub fn flush(&mut self, state: &CartState) -> bool {
        if self.pending == 0 {
            return false;
        }

        match self.write(state) {
            Ok(()) => {
                debug!("wrote cart snapshot");
                self.pending = 0;

                true
            }
            Err(error) => {
                warn!(%error, "failed to write cart snapshot, keeping in-memory state");
                self.failures = self.failures.saturating_add(1);

                false
            }
        }
    }

    fn write(&mut self, state: &CartState) -> Result<(), PersistenceError> {
        let raw = Snapshot::capture(state, self.fields).encode()?;

        self.storage.write(&self.key, &raw)?;

        Ok(())
    }

    /// Delete the stored snapshot and forget pending changes.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend cannot delete the snapshot.
    pub fn purge(&mut self) -> Result<(), StorageError> {
        self.pending = 0;

        self.storage.remove(&self.key)
    }
}
