//! Snapshot Persistence
//!
//! `SAVE` and `BGSAVE` hand a [`Snapshot`](crate::storage::Snapshot) to a
//! [`SnapshotStore`]; on startup the server asks the same store for the last
//! saved snapshot and restores it into the engine.
//!
//! The store is a trait so the command layer does not care where snapshots
//! go. [`FileSnapshotStore`] is the implementation the server uses.

pub mod file;

pub use file::{FileSnapshotStore, MAGIC};

use crate::storage::Snapshot;
use thiserror::Error;

/// Errors raised while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] bincode::Error),

    #[error("snapshot file is corrupt: {0}")]
    Corrupt(String),
}

/// Somewhere a snapshot can be written to and read back from.
///
/// Both methods block; async callers should run them through
/// `spawn_blocking` or `block_in_place`.
pub trait SnapshotStore: Send + Sync {
    /// Persists `snapshot`, replacing whatever was saved before.
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError>;

    /// Loads the last saved snapshot, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<Snapshot>, PersistError>;
}
