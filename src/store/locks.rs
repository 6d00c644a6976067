//! Per-domain exclusive locks.
//!
//! Every mutating operation names all the domains it touches up front and
//! acquires them in one batch. Keys are taken in their `Ord` order, so two
//! batches can never wait on each other in a cycle.

use crate::domain::{BoardId, LaneId, UserId};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// A lockable ordering or membership domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    /// Lane order of a board
    Board(BoardId),
    /// Entry order of a lane
    Lane(LaneId),
    /// Member set of a board
    Members(BoardId),
    /// The invitation row for a (board, invitee) pair
    Invite(BoardId, UserId),
}

const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
pub struct LockTable {
    slots: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until every key is held exclusively
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> LockSet {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.slot(*key).lock_owned().await);
        }

        debug!(?keys, "acquired domain locks");
        LockSet {
            keys,
            _guards: guards,
        }
    }

    fn slot(&self, key: LockKey) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        // Unreferenced slots have no holder and no waiter
        if slots.len() >= PRUNE_THRESHOLD {
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }

        slots
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held locks; released on drop
#[derive(Debug)]
pub struct LockSet {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    pub fn holds(&self, key: &LockKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_key_order_puts_boards_first() {
        let board = LockKey::Board(BoardId::new());
        let lane = LockKey::Lane(LaneId::new());
        let members = LockKey::Members(BoardId::new());
        assert!(board < lane);
        assert!(lane < members);
    }

    #[tokio::test]
    async fn test_duplicate_keys_are_taken_once() {
        let table = LockTable::new();
        let lane = LaneId::new();

        let set = table
            .acquire([LockKey::Lane(lane), LockKey::Lane(lane)])
            .await;
        assert!(set.holds(&LockKey::Lane(lane)));
        assert!(!set.holds(&LockKey::Lane(LaneId::new())));
    }

    #[tokio::test]
    async fn test_conflicting_sets_serialize() {
        let table = Arc::new(LockTable::new());
        let lane = LaneId::new();

        let held = table.acquire([LockKey::Lane(lane)]).await;

        let waiter = {
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                let _set = table.acquire([LockKey::Lane(lane)]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_unrelated_sets_do_not_block() {
        let table = LockTable::new();
        let _first = table.acquire([LockKey::Lane(LaneId::new())]).await;

        tokio::time::timeout(
            Duration::from_secs(1),
            table.acquire([LockKey::Lane(LaneId::new())]),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_idle_slots_are_pruned() {
        let table = LockTable::new();
        for _ in 0..PRUNE_THRESHOLD + 10 {
            let _set = table.acquire([LockKey::Lane(LaneId::new())]).await;
        }
        assert!(table.len() < PRUNE_THRESHOLD + 10);
    }
}
