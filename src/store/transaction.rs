use crate::{
    domain::{
        position::is_dense, Board, BoardId, Entry, EntryId, Invitation, InvitationId, Lane, LaneId,
        UserId,
    },
    error::{Result, TavlaError},
    storage::Snapshot,
    store::{
        database::Database,
        locks::{LockKey, LockSet},
    },
};
use std::{
    collections::{BTreeSet, HashMap},
    hash::Hash,
};
use tracing::warn;

/// Staged writes. `None` deletes the record.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    boards: HashMap<BoardId, Option<Board>>,
    lanes: HashMap<LaneId, Option<Lane>>,
    entries: HashMap<EntryId, Option<Entry>>,
    invitations: HashMap<InvitationId, Option<Invitation>>,
}

impl ChangeSet {
    fn is_empty(&self) -> bool {
        self.boards.is_empty()
            && self.lanes.is_empty()
            && self.entries.is_empty()
            && self.invitations.is_empty()
    }

    /// Writes the changes into `snapshot` and returns the change set that undoes them
    pub(crate) fn apply(self, snapshot: &mut Snapshot) -> ChangeSet {
        ChangeSet {
            boards: apply_table(&mut snapshot.boards, self.boards),
            lanes: apply_table(&mut snapshot.lanes, self.lanes),
            entries: apply_table(&mut snapshot.entries, self.entries),
            invitations: apply_table(&mut snapshot.invitations, self.invitations),
        }
    }
}

fn apply_table<K: Eq + Hash + Copy, V>(
    table: &mut HashMap<K, V>,
    changes: HashMap<K, Option<V>>,
) -> HashMap<K, Option<V>> {
    changes
        .into_iter()
        .map(|(key, change)| {
            let previous = match change {
                Some(value) => table.insert(key, value),
                None => table.remove(&key),
            };
            (key, previous)
        })
        .collect()
}

/// Records visible to a transaction: staged writes shadow committed ones
fn merged<K: Eq + Hash, V: Clone>(
    base: &HashMap<K, V>,
    staged: &HashMap<K, Option<V>>,
    keep: impl Fn(&V) -> bool,
) -> Vec<V> {
    base.iter()
        .filter(|(key, _)| !staged.contains_key(*key))
        .map(|(_, value)| value)
        .chain(staged.values().flatten())
        .filter(|value| keep(*value))
        .cloned()
        .collect()
}

/// An isolated unit of work over the locked domains.
///
/// Writes are staged until [`Transaction::commit`]; dropping the transaction
/// without committing discards them.
pub struct Transaction<'a> {
    db: &'a Database,
    locks: LockSet,
    staged: ChangeSet,
    touched_boards: BTreeSet<BoardId>,
    touched_lanes: BTreeSet<LaneId>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(db: &'a Database, locks: LockSet) -> Self {
        Self {
            db,
            locks,
            staged: ChangeSet::default(),
            touched_boards: BTreeSet::new(),
            touched_lanes: BTreeSet::new(),
        }
    }

    pub async fn board(&self, id: &BoardId) -> Option<Board> {
        if let Some(staged) = self.staged.boards.get(id) {
            return staged.clone();
        }
        self.db.records().await.boards.get(id).cloned()
    }

    pub async fn lane(&self, id: &LaneId) -> Option<Lane> {
        if let Some(staged) = self.staged.lanes.get(id) {
            return staged.clone();
        }
        self.db.records().await.lanes.get(id).cloned()
    }

    pub async fn entry(&self, id: &EntryId) -> Option<Entry> {
        if let Some(staged) = self.staged.entries.get(id) {
            return staged.clone();
        }
        self.db.records().await.entries.get(id).cloned()
    }

    pub async fn invitation(&self, id: &InvitationId) -> Option<Invitation> {
        if let Some(staged) = self.staged.invitations.get(id) {
            return staged.clone();
        }
        self.db.records().await.invitations.get(id).cloned()
    }

    /// Lanes of a board in position order
    pub async fn lanes_of(&self, board_id: &BoardId) -> Vec<Lane> {
        let records = self.db.records().await;
        let mut lanes = merged(&records.lanes, &self.staged.lanes, |lane| {
            lane.board_id == *board_id
        });
        lanes.sort_by_key(|lane| lane.position);
        lanes
    }

    /// Entries of a lane in position order
    pub async fn entries_of(&self, lane_id: &LaneId) -> Vec<Entry> {
        let records = self.db.records().await;
        let mut entries = merged(&records.entries, &self.staged.entries, |entry| {
            entry.lane_id == *lane_id
        });
        entries.sort_by_key(|entry| entry.position);
        entries
    }

    pub async fn invitations_of(&self, board_id: &BoardId) -> Vec<Invitation> {
        let records = self.db.records().await;
        merged(&records.invitations, &self.staged.invitations, |inv| {
            inv.board_id == *board_id
        })
    }

    /// The single invitation row for a (board, invitee) pair, if any
    pub async fn invitation_for(&self, board_id: &BoardId, invitee: &UserId) -> Option<Invitation> {
        self.invitations_of(board_id)
            .await
            .into_iter()
            .find(|inv| &inv.invitee == invitee)
    }

    pub fn put_board(&mut self, board: Board) {
        debug_assert!(
            self.locks.holds(&LockKey::Board(board.id))
                || self.locks.holds(&LockKey::Members(board.id))
        );
        self.staged.boards.insert(board.id, Some(board));
    }

    pub fn put_lane(&mut self, lane: Lane) {
        debug_assert!(self.locks.holds(&LockKey::Board(lane.board_id)));
        self.touched_boards.insert(lane.board_id);
        self.staged.lanes.insert(lane.id, Some(lane));
    }

    pub fn put_entry(&mut self, entry: Entry) {
        debug_assert!(self.locks.holds(&LockKey::Lane(entry.lane_id)));
        self.touched_lanes.insert(entry.lane_id);
        self.staged.entries.insert(entry.id, Some(entry));
    }

    pub fn put_invitation(&mut self, invitation: Invitation) {
        debug_assert!(self.locks.holds(&LockKey::Members(invitation.board_id)));
        self.staged
            .invitations
            .insert(invitation.id, Some(invitation));
    }

    pub fn delete_board(&mut self, board: &Board) {
        debug_assert!(self.locks.holds(&LockKey::Board(board.id)));
        self.touched_boards.insert(board.id);
        self.staged.boards.insert(board.id, None);
    }

    pub fn delete_lane(&mut self, lane: &Lane) {
        debug_assert!(self.locks.holds(&LockKey::Board(lane.board_id)));
        debug_assert!(self.locks.holds(&LockKey::Lane(lane.id)));
        self.touched_boards.insert(lane.board_id);
        self.touched_lanes.insert(lane.id);
        self.staged.lanes.insert(lane.id, None);
    }

    pub fn delete_entry(&mut self, entry: &Entry) {
        debug_assert!(self.locks.holds(&LockKey::Lane(entry.lane_id)));
        self.touched_lanes.insert(entry.lane_id);
        self.staged.entries.insert(entry.id, None);
    }

    pub fn delete_invitation(&mut self, invitation: &Invitation) {
        debug_assert!(self.locks.holds(&LockKey::Members(invitation.board_id)));
        self.staged.invitations.insert(invitation.id, None);
    }

    /// Marks a lane whose entry order must be re-checked at commit
    pub fn touch_lane(&mut self, lane_id: LaneId) {
        self.touched_lanes.insert(lane_id);
    }

    /// Checks density and parentage of every domain this transaction wrote to
    async fn validate(&self) -> Result<()> {
        for board_id in &self.touched_boards {
            let lanes = self.lanes_of(board_id).await;
            if self.board(board_id).await.is_none() {
                if !lanes.is_empty() {
                    return Err(TavlaError::Conflict(format!(
                        "board {} no longer exists",
                        board_id
                    )));
                }
                continue;
            }
            if !is_dense(lanes.iter().map(|lane| lane.position)) {
                return Err(TavlaError::Conflict(format!(
                    "lane positions of board {} would not be dense",
                    board_id
                )));
            }
        }

        for lane_id in &self.touched_lanes {
            let entries = self.entries_of(lane_id).await;
            if self.lane(lane_id).await.is_none() {
                if !entries.is_empty() {
                    return Err(TavlaError::Conflict(format!(
                        "lane {} no longer exists",
                        lane_id
                    )));
                }
                continue;
            }
            if !is_dense(entries.iter().map(|entry| entry.position)) {
                return Err(TavlaError::Conflict(format!(
                    "entry positions of lane {} would not be dense",
                    lane_id
                )));
            }
        }

        Ok(())
    }

    /// Validates and atomically applies every staged write
    pub async fn commit(self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }

        if let Err(err) = self.validate().await {
            warn!(error = %err, "aborting transaction");
            return Err(err);
        }

        let Transaction {
            db, locks, staged, ..
        } = self;
        let result = db.apply(staged).await;
        drop(locks);
        result
    }
}
