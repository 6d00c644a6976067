use crate::{
    domain::{position::is_dense, BoardId, LaneId},
    error::{Result, TavlaError},
    storage::{Snapshot, Storage},
    store::{
        locks::{LockKey, LockTable},
        transaction::{ChangeSet, Transaction},
    },
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

/// Committed records plus the locks and backend that guard them.
///
/// Shared by every store; the composition root owns the only handle it
/// hands out.
pub struct Database {
    records: RwLock<Snapshot>,
    locks: LockTable,
    storage: Arc<dyn Storage>,
}

impl Database {
    /// Initializes the backend and loads its last persisted state
    pub async fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        storage.initialize().await?;
        let snapshot = storage.load().await?;
        check_structure(&snapshot)?;

        info!(
            boards = snapshot.boards.len(),
            lanes = snapshot.lanes.len(),
            entries = snapshot.entries.len(),
            invitations = snapshot.invitations.len(),
            "loaded snapshot"
        );

        Ok(Self {
            records: RwLock::new(snapshot),
            locks: LockTable::new(),
            storage,
        })
    }

    /// Starts a transaction holding every key in `keys` exclusively
    pub(crate) async fn begin(&self, keys: impl IntoIterator<Item = LockKey>) -> Transaction<'_> {
        let locks = self.locks.acquire(keys).await;
        Transaction::new(self, locks)
    }

    /// Shared access to committed state, for reads outside any transaction
    pub(crate) async fn records(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.records.read().await
    }

    /// Applies a validated change set and persists it, or leaves state untouched
    pub(crate) async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut records = self.records.write().await;
        let undo = changes.apply(&mut records);

        if let Err(err) = self.storage.persist(&records).await {
            warn!(error = %err, "persisting commit failed, rolling back");
            undo.apply(&mut records);
            return Err(err);
        }

        Ok(())
    }
}

/// Rejects a loaded snapshot whose lanes or entries are orphaned or not dense
fn check_structure(snapshot: &Snapshot) -> Result<()> {
    let mut lanes: HashMap<BoardId, Vec<u32>> = HashMap::new();
    for lane in snapshot.lanes.values() {
        if !snapshot.boards.contains_key(&lane.board_id) {
            return Err(TavlaError::StorageError(format!(
                "lane {} belongs to missing board {}",
                lane.id, lane.board_id
            )));
        }
        lanes.entry(lane.board_id).or_default().push(lane.position);
    }

    let mut entries: HashMap<LaneId, Vec<u32>> = HashMap::new();
    for entry in snapshot.entries.values() {
        if !snapshot.lanes.contains_key(&entry.lane_id) {
            return Err(TavlaError::StorageError(format!(
                "entry {} belongs to missing lane {}",
                entry.id, entry.lane_id
            )));
        }
        entries.entry(entry.lane_id).or_default().push(entry.position);
    }

    if let Some(board_id) = lanes
        .iter()
        .find(|(_, positions)| !is_dense(positions.iter().copied()))
        .map(|(id, _)| id)
    {
        return Err(TavlaError::StorageError(format!(
            "lane positions of board {} are not dense",
            board_id
        )));
    }
    if let Some(lane_id) = entries
        .iter()
        .find(|(_, positions)| !is_dense(positions.iter().copied()))
        .map(|(id, _)| id)
    {
        return Err(TavlaError::StorageError(format!(
            "entry positions of lane {} are not dense",
            lane_id
        )));
    }

    Ok(())
}
