use crate::{
    config::Defaults,
    domain::{
        position::{
            clamp_target, plan_append, plan_move, plan_removal, plan_reorder, position_at,
            ShiftPlan,
        },
        Board, BoardId, BoardPatch, BoardView, Entry, EntryId, EntryPatch, Lane, LaneId, LanePatch,
        LaneView, NewEntry, UserId,
    },
    error::{RecordKind, Result, TavlaError},
    store::{database::Database, locks::LockKey, members::MembershipStore, transaction::Transaction},
};
use std::{collections::HashSet, hash::Hash, sync::Arc};
use tracing::{debug, info};

/// Owns boards, lanes and entries and keeps their positions dense
#[derive(Clone)]
pub struct BoardStore {
    db: Arc<Database>,
    members: MembershipStore,
    defaults: Defaults,
}

impl BoardStore {
    pub fn new(db: Arc<Database>, members: MembershipStore, defaults: Defaults) -> Self {
        Self {
            db,
            members,
            defaults,
        }
    }

    // Boards

    pub async fn create_board(
        &self,
        owner: UserId,
        title: String,
        description: Option<String>,
        color: Option<String>,
    ) -> Result<Board> {
        let mut board = Board::new(
            owner,
            title,
            color.unwrap_or_else(|| self.defaults.board_color.clone()),
        );
        board.description = description;

        let mut tx = self.db.begin([LockKey::Board(board.id)]).await;
        tx.put_board(board.clone());
        tx.commit().await?;

        info!(board_id = %board.id, owner = %owner, "board created");
        Ok(board)
    }

    pub async fn update_board(&self, board_id: BoardId, patch: BoardPatch) -> Result<Board> {
        let mut tx = self
            .db
            .begin([LockKey::Board(board_id), LockKey::Members(board_id)])
            .await;
        let mut board = tx
            .board(&board_id)
            .await
            .ok_or_else(|| TavlaError::not_found(RecordKind::Board, board_id))?;

        board.apply(patch);
        tx.put_board(board.clone());
        tx.commit().await?;

        Ok(board)
    }

    /// Deletes a board together with its lanes, entries and invitations
    pub async fn delete_board(&self, board_id: BoardId) -> Result<()> {
        let lane_ids: Vec<LaneId> = {
            let records = self.db.records().await;
            if !records.boards.contains_key(&board_id) {
                return Err(TavlaError::not_found(RecordKind::Board, board_id));
            }
            records
                .lanes
                .values()
                .filter(|lane| lane.board_id == board_id)
                .map(|lane| lane.id)
                .collect()
        };

        let keys = [LockKey::Board(board_id), LockKey::Members(board_id)]
            .into_iter()
            .chain(lane_ids.iter().map(|id| LockKey::Lane(*id)));
        let mut tx = self.db.begin(keys).await;

        let board = tx.board(&board_id).await.ok_or_else(|| {
            TavlaError::Conflict(format!("board {} was removed concurrently", board_id))
        })?;
        let lanes = tx.lanes_of(&board_id).await;
        if !same_members(lanes.iter().map(|lane| lane.id), lane_ids.iter().copied()) {
            return Err(TavlaError::Conflict(format!(
                "lanes of board {} changed concurrently",
                board_id
            )));
        }

        for lane in &lanes {
            let entries = tx.entries_of(&lane.id).await;
            for entry in &entries {
                tx.delete_entry(entry);
            }
            tx.delete_lane(lane);
        }
        let invitations = tx.invitations_of(&board_id).await;
        for invitation in &invitations {
            tx.delete_invitation(invitation);
        }
        tx.delete_board(&board);
        tx.commit().await?;

        info!(board_id = %board_id, lanes = lanes.len(), "board deleted");
        Ok(())
    }

    /// A board with its lanes and entries in position order
    pub async fn get_board(&self, board_id: BoardId) -> Result<BoardView> {
        let records = self.db.records().await;
        let board = records
            .boards
            .get(&board_id)
            .cloned()
            .ok_or_else(|| TavlaError::not_found(RecordKind::Board, board_id))?;

        let mut lanes: Vec<&Lane> = records
            .lanes
            .values()
            .filter(|lane| lane.board_id == board_id)
            .collect();
        lanes.sort_by_key(|lane| lane.position);

        let lanes = lanes
            .into_iter()
            .map(|lane| {
                let mut entries: Vec<Entry> = records
                    .entries
                    .values()
                    .filter(|entry| entry.lane_id == lane.id)
                    .cloned()
                    .collect();
                entries.sort_by_key(|entry| entry.position);
                LaneView {
                    lane: lane.clone(),
                    entries,
                }
            })
            .collect();

        Ok(BoardView { board, lanes })
    }

    /// Boards the user owns or is a member of, oldest first
    pub async fn list_boards_for(&self, user: UserId) -> Vec<Board> {
        let records = self.db.records().await;
        let mut boards: Vec<Board> = records
            .boards
            .values()
            .filter(|board| board.has_access(&user))
            .cloned()
            .collect();
        boards.sort_by_key(|board| board.created_at);
        boards
    }

    pub async fn add_member(&self, board_id: BoardId, user: UserId) -> Result<()> {
        self.members.add(board_id, user).await
    }

    pub async fn remove_member(&self, board_id: BoardId, user: UserId) -> Result<()> {
        self.members.remove(board_id, user).await
    }

    // Lanes

    /// Appends a lane to the end of the board
    pub async fn create_lane(
        &self,
        board_id: BoardId,
        title: String,
        color: Option<String>,
    ) -> Result<Lane> {
        let mut tx = self.db.begin([LockKey::Board(board_id)]).await;
        if tx.board(&board_id).await.is_none() {
            return Err(TavlaError::not_found(RecordKind::Board, board_id));
        }

        let count = tx.lanes_of(&board_id).await.len();
        let lane = Lane::new(
            board_id,
            title,
            color.unwrap_or_else(|| self.defaults.lane_color.clone()),
            plan_append(&board_id, count)?,
        );
        tx.put_lane(lane.clone());
        tx.commit().await?;

        info!(board_id = %board_id, lane_id = %lane.id, position = lane.position, "lane created");
        Ok(lane)
    }

    pub async fn update_lane(&self, lane_id: LaneId, patch: LanePatch) -> Result<Lane> {
        let board_id = self.board_of_lane(lane_id).await?;
        let mut tx = self.db.begin([LockKey::Board(board_id)]).await;
        let mut lane = Self::relock_lane(&tx, lane_id).await?;

        lane.apply(patch);
        tx.put_lane(lane.clone());
        tx.commit().await?;

        Ok(lane)
    }

    /// Moves a lane to `target_position` within its board
    pub async fn move_lane(&self, lane_id: LaneId, target_position: u32) -> Result<Lane> {
        let board_id = self.board_of_lane(lane_id).await?;
        let mut tx = self.db.begin([LockKey::Board(board_id)]).await;
        let mut lane = Self::relock_lane(&tx, lane_id).await?;

        let siblings = tx.lanes_of(&board_id).await;
        let upper = position_at(siblings.len().saturating_sub(1))?;
        let target = clamp_target(target_position, upper);

        let plan = plan_move(&board_id, lane.position, &board_id, target);
        if plan.is_noop() {
            debug!(lane_id = %lane_id, position = lane.position, "lane already in place");
            return Ok(lane);
        }

        for mut sibling in siblings.into_iter().filter(|sibling| sibling.id != lane_id) {
            let shifted = plan.shifted(&board_id, sibling.position);
            if shifted != sibling.position {
                sibling.set_position(shifted);
                tx.put_lane(sibling);
            }
        }

        let from = lane.position;
        lane.set_position(target);
        tx.put_lane(lane.clone());
        tx.commit().await?;

        info!(lane_id = %lane_id, from, to = target, "lane moved");
        Ok(lane)
    }

    /// Deletes a lane and its entries, closing the gap it leaves
    pub async fn delete_lane(&self, lane_id: LaneId) -> Result<()> {
        let board_id = self.board_of_lane(lane_id).await?;
        let mut tx = self
            .db
            .begin([LockKey::Board(board_id), LockKey::Lane(lane_id)])
            .await;
        let lane = Self::relock_lane(&tx, lane_id).await?;

        let entries = tx.entries_of(&lane_id).await;
        for entry in &entries {
            tx.delete_entry(entry);
        }
        tx.delete_lane(&lane);

        let plan = plan_removal(&board_id, lane.position);
        let siblings = tx.lanes_of(&board_id).await;
        for mut sibling in siblings {
            let shifted = plan.shifted(&board_id, sibling.position);
            if shifted != sibling.position {
                sibling.set_position(shifted);
                tx.put_lane(sibling);
            }
        }
        tx.commit().await?;

        info!(lane_id = %lane_id, board_id = %board_id, entries = entries.len(), "lane deleted");
        Ok(())
    }

    /// Replaces the order of every lane in the board.
    ///
    /// `assignments` must name each lane of the board exactly once and use
    /// positions `0..n` exactly once.
    pub async fn reorder_lanes(
        &self,
        board_id: BoardId,
        assignments: Vec<(LaneId, u32)>,
    ) -> Result<Vec<Lane>> {
        let mut tx = self.db.begin([LockKey::Board(board_id)]).await;
        if tx.board(&board_id).await.is_none() {
            return Err(TavlaError::not_found(RecordKind::Board, board_id));
        }

        let lanes = tx.lanes_of(&board_id).await;
        let plan = plan_reorder(board_id, assignments, lanes.len())?;
        check_covers(
            lanes.iter().map(|lane| lane.id),
            plan.assignments.iter().map(|(id, _)| *id),
        )?;

        let mut reordered = Vec::with_capacity(lanes.len());
        for mut lane in lanes {
            if let Some((_, position)) = plan.assignments.iter().find(|(id, _)| *id == lane.id) {
                lane.set_position(*position);
            }
            tx.put_lane(lane.clone());
            reordered.push(lane);
        }
        tx.commit().await?;

        reordered.sort_by_key(|lane| lane.position);
        info!(board_id = %board_id, lanes = reordered.len(), "lanes reordered");
        Ok(reordered)
    }

    // Entries

    /// Appends an entry to the end of the lane
    pub async fn create_entry(&self, lane_id: LaneId, fields: NewEntry) -> Result<Entry> {
        let mut tx = self.db.begin([LockKey::Lane(lane_id)]).await;
        if tx.lane(&lane_id).await.is_none() {
            return Err(TavlaError::not_found(RecordKind::Lane, lane_id));
        }

        let count = tx.entries_of(&lane_id).await.len();
        let entry = Entry::new(
            lane_id,
            plan_append(&lane_id, count)?,
            fields,
            self.defaults.priority,
        );
        tx.put_entry(entry.clone());
        tx.commit().await?;

        info!(lane_id = %lane_id, entry_id = %entry.id, position = entry.position, "entry created");
        Ok(entry)
    }

    pub async fn get_entry(&self, entry_id: EntryId) -> Result<Entry> {
        self.db
            .records()
            .await
            .entries
            .get(&entry_id)
            .cloned()
            .ok_or_else(|| TavlaError::not_found(RecordKind::Entry, entry_id))
    }

    /// Entries of a lane in position order
    pub async fn list_entries(&self, lane_id: LaneId) -> Result<Vec<Entry>> {
        let records = self.db.records().await;
        if !records.lanes.contains_key(&lane_id) {
            return Err(TavlaError::not_found(RecordKind::Lane, lane_id));
        }

        let mut entries: Vec<Entry> = records
            .entries
            .values()
            .filter(|entry| entry.lane_id == lane_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.position);
        Ok(entries)
    }

    pub async fn update_entry(&self, entry_id: EntryId, patch: EntryPatch) -> Result<Entry> {
        let lane_id = self.lane_of_entry(entry_id).await?;
        let mut tx = self.db.begin([LockKey::Lane(lane_id)]).await;
        let mut entry = Self::relock_entry(&tx, entry_id, lane_id).await?;

        entry.apply(patch);
        tx.put_entry(entry.clone());
        tx.commit().await?;

        Ok(entry)
    }

    /// Moves an entry to `target_position` in `target_lane_id`.
    ///
    /// The position is clamped to `[0, len]` of the target lane, or to
    /// `[0, len - 1]` when the entry stays in its own lane. Both lanes are
    /// locked for the whole read-shift-place sequence. The target lane must
    /// belong to the same board as the entry's lane, otherwise `Conflict`.
    pub async fn move_entry(
        &self,
        entry_id: EntryId,
        target_lane_id: LaneId,
        target_position: u32,
    ) -> Result<Entry> {
        let source_lane_id = {
            let records = self.db.records().await;
            let entry = records
                .entries
                .get(&entry_id)
                .ok_or_else(|| TavlaError::not_found(RecordKind::Entry, entry_id))?;
            let target_lane = records
                .lanes
                .get(&target_lane_id)
                .ok_or_else(|| TavlaError::not_found(RecordKind::Lane, target_lane_id))?;
            let source_board = records.lanes.get(&entry.lane_id).map(|lane| lane.board_id);
            if source_board != Some(target_lane.board_id) {
                return Err(TavlaError::Conflict(format!(
                    "lane {} is on a different board than entry {}",
                    target_lane_id, entry_id
                )));
            }
            entry.lane_id
        };

        let mut tx = self
            .db
            .begin([LockKey::Lane(source_lane_id), LockKey::Lane(target_lane_id)])
            .await;
        let mut entry = Self::relock_entry(&tx, entry_id, source_lane_id).await?;
        if tx.lane(&target_lane_id).await.is_none() {
            return Err(TavlaError::Conflict(format!(
                "lane {} was removed concurrently",
                target_lane_id
            )));
        }

        let same_lane = source_lane_id == target_lane_id;
        let target_entries = tx.entries_of(&target_lane_id).await;
        let upper = if same_lane {
            target_entries.len().saturating_sub(1)
        } else {
            target_entries.len()
        };
        let target = clamp_target(target_position, position_at(upper)?);

        let plan = plan_move(&source_lane_id, entry.position, &target_lane_id, target);
        if plan.is_noop() && same_lane {
            debug!(entry_id = %entry_id, position = entry.position, "entry already in place");
            return Ok(entry);
        }

        let source_entries = if same_lane {
            Vec::new()
        } else {
            tx.entries_of(&source_lane_id).await
        };
        for sibling in target_entries.into_iter().chain(source_entries) {
            if sibling.id != entry_id {
                Self::shift_entry(&mut tx, sibling, &plan);
            }
        }

        let from = entry.position;
        entry.place(target_lane_id, target);
        tx.touch_lane(source_lane_id);
        tx.put_entry(entry.clone());
        tx.commit().await?;

        info!(
            entry_id = %entry_id,
            from_lane = %source_lane_id,
            from,
            to_lane = %target_lane_id,
            to = target,
            "entry moved"
        );
        Ok(entry)
    }

    /// Deletes an entry, closing the gap it leaves
    pub async fn delete_entry(&self, entry_id: EntryId) -> Result<()> {
        let lane_id = self.lane_of_entry(entry_id).await?;
        let mut tx = self.db.begin([LockKey::Lane(lane_id)]).await;
        let entry = Self::relock_entry(&tx, entry_id, lane_id).await?;

        tx.delete_entry(&entry);
        let plan = plan_removal(&lane_id, entry.position);
        let siblings = tx.entries_of(&lane_id).await;
        for sibling in siblings {
            Self::shift_entry(&mut tx, sibling, &plan);
        }
        tx.commit().await?;

        info!(entry_id = %entry_id, lane_id = %lane_id, "entry deleted");
        Ok(())
    }

    /// Replaces the order of every entry in the lane
    pub async fn reorder_entries(
        &self,
        lane_id: LaneId,
        assignments: Vec<(EntryId, u32)>,
    ) -> Result<Vec<Entry>> {
        let mut tx = self.db.begin([LockKey::Lane(lane_id)]).await;
        if tx.lane(&lane_id).await.is_none() {
            return Err(TavlaError::not_found(RecordKind::Lane, lane_id));
        }

        let entries = tx.entries_of(&lane_id).await;
        let plan = plan_reorder(lane_id, assignments, entries.len())?;
        check_covers(
            entries.iter().map(|entry| entry.id),
            plan.assignments.iter().map(|(id, _)| *id),
        )?;

        let mut reordered = Vec::with_capacity(entries.len());
        for mut entry in entries {
            if let Some((_, position)) = plan.assignments.iter().find(|(id, _)| *id == entry.id) {
                entry.place(lane_id, *position);
            }
            tx.put_entry(entry.clone());
            reordered.push(entry);
        }
        tx.commit().await?;

        reordered.sort_by_key(|entry| entry.position);
        info!(lane_id = %lane_id, entries = reordered.len(), "entries reordered");
        Ok(reordered)
    }

    // Helpers

    fn shift_entry(tx: &mut Transaction<'_>, mut entry: Entry, plan: &ShiftPlan<LaneId>) {
        let shifted = plan.shifted(&entry.lane_id, entry.position);
        if shifted != entry.position {
            let lane_id = entry.lane_id;
            entry.place(lane_id, shifted);
            tx.put_entry(entry);
        }
    }

    async fn board_of_lane(&self, lane_id: LaneId) -> Result<BoardId> {
        self.db
            .records()
            .await
            .lanes
            .get(&lane_id)
            .map(|lane| lane.board_id)
            .ok_or_else(|| TavlaError::not_found(RecordKind::Lane, lane_id))
    }

    async fn lane_of_entry(&self, entry_id: EntryId) -> Result<LaneId> {
        self.db
            .records()
            .await
            .entries
            .get(&entry_id)
            .map(|entry| entry.lane_id)
            .ok_or_else(|| TavlaError::not_found(RecordKind::Entry, entry_id))
    }

    /// Re-reads a lane after its board lock was taken
    async fn relock_lane(tx: &Transaction<'_>, lane_id: LaneId) -> Result<Lane> {
        tx.lane(&lane_id).await.ok_or_else(|| {
            TavlaError::Conflict(format!("lane {} was removed concurrently", lane_id))
        })
    }

    /// Re-reads an entry after its lane lock was taken; it must still be there
    async fn relock_entry(tx: &Transaction<'_>, entry_id: EntryId, lane_id: LaneId) -> Result<Entry> {
        let entry = tx.entry(&entry_id).await.ok_or_else(|| {
            TavlaError::Conflict(format!("entry {} was removed concurrently", entry_id))
        })?;
        if entry.lane_id != lane_id {
            return Err(TavlaError::Conflict(format!(
                "entry {} was moved concurrently",
                entry_id
            )));
        }
        Ok(entry)
    }
}

fn same_members<I: Eq + Hash>(
    left: impl IntoIterator<Item = I>,
    right: impl IntoIterator<Item = I>,
) -> bool {
    let left: HashSet<I> = left.into_iter().collect();
    let right: HashSet<I> = right.into_iter().collect();
    left == right
}

/// Every current item must be assigned exactly once, and nothing else
fn check_covers<I: Eq + Hash + std::fmt::Display>(
    current: impl IntoIterator<Item = I>,
    assigned: impl IntoIterator<Item = I>,
) -> Result<()> {
    let current: HashSet<I> = current.into_iter().collect();
    let mut seen = HashSet::new();

    for id in assigned {
        if !current.contains(&id) {
            return Err(TavlaError::InvalidPermutation(format!(
                "{} is not part of this domain",
                id
            )));
        }
        if !seen.insert(id) {
            return Err(TavlaError::InvalidPermutation(
                "an item was assigned twice".to_string(),
            ));
        }
    }

    if seen.len() != current.len() {
        return Err(TavlaError::InvalidPermutation(
            "every item must be assigned a position".to_string(),
        ));
    }

    Ok(())
}
