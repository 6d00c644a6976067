use crate::{
    domain::{Board, BoardId, Entry, EntryId, Invitation, InvitationId, Lane, LaneId},
    error::Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod file_storage;
pub mod memory_storage;

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;

/// Every persisted record, keyed by identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub boards: HashMap<BoardId, Board>,
    #[serde(default)]
    pub lanes: HashMap<LaneId, Lane>,
    #[serde(default)]
    pub entries: HashMap<EntryId, Entry>,
    #[serde(default)]
    pub invitations: HashMap<InvitationId, Invitation>,
}

/// Storage trait for persisting committed engine state.
///
/// The engine keeps the working set in memory and hands a backend the full
/// post-commit snapshot. A backend must either persist it completely or
/// return an error, in which case the commit is rolled back.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initializes the storage backend
    async fn initialize(&self) -> Result<()>;

    /// Loads the last persisted snapshot
    async fn load(&self) -> Result<Snapshot>;

    /// Persists a committed snapshot atomically
    async fn persist(&self, snapshot: &Snapshot) -> Result<()>;

    /// Checks if the backend has been initialized
    async fn is_initialized(&self) -> bool;
}
