use crate::{
    domain::{BoardId, UserId},
    error::{RecordKind, Result, TavlaError},
    store::{database::Database, locks::LockKey, transaction::Transaction},
};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns the member set of every board
#[derive(Clone)]
pub struct MembershipStore {
    db: Arc<Database>,
}

impl MembershipStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Adds `user` to the board's members. Adding an existing member or the
    /// owner is a successful no-op.
    pub async fn add(&self, board_id: BoardId, user: UserId) -> Result<()> {
        let mut tx = self.db.begin([LockKey::Members(board_id)]).await;
        if Self::add_in(&mut tx, board_id, user).await? {
            tx.commit().await?;
            info!(board_id = %board_id, user = %user, "member added");
        }
        Ok(())
    }

    /// Removes `user` from the board's members. Removing a non-member or the
    /// owner is a successful no-op.
    pub async fn remove(&self, board_id: BoardId, user: UserId) -> Result<()> {
        let mut tx = self.db.begin([LockKey::Members(board_id)]).await;
        let mut board = tx
            .board(&board_id)
            .await
            .ok_or_else(|| TavlaError::not_found(RecordKind::Board, board_id))?;

        if !board.remove_member(&user) {
            debug!(board_id = %board_id, user = %user, "not a member, nothing to remove");
            return Ok(());
        }

        tx.put_board(board);
        tx.commit().await?;
        info!(board_id = %board_id, user = %user, "member removed");
        Ok(())
    }

    /// Plain set membership; the owner is not in the set
    pub async fn is_member(&self, board_id: BoardId, user: UserId) -> Result<bool> {
        let records = self.db.records().await;
        records
            .boards
            .get(&board_id)
            .map(|board| board.is_member(&user))
            .ok_or_else(|| TavlaError::not_found(RecordKind::Board, board_id))
    }

    /// Owner or member
    pub async fn has_access(&self, board_id: BoardId, user: UserId) -> Result<bool> {
        let records = self.db.records().await;
        records
            .boards
            .get(&board_id)
            .map(|board| board.has_access(&user))
            .ok_or_else(|| TavlaError::not_found(RecordKind::Board, board_id))
    }

    pub async fn list(&self, board_id: BoardId) -> Result<Vec<UserId>> {
        let records = self.db.records().await;
        records
            .boards
            .get(&board_id)
            .map(|board| board.members.iter().copied().collect())
            .ok_or_else(|| TavlaError::not_found(RecordKind::Board, board_id))
    }

    /// Stages a member addition inside a caller's transaction, which must hold
    /// the board's `Members` lock. Returns false when nothing changed.
    pub(crate) async fn add_in(
        tx: &mut Transaction<'_>,
        board_id: BoardId,
        user: UserId,
    ) -> Result<bool> {
        let mut board = tx
            .board(&board_id)
            .await
            .ok_or_else(|| TavlaError::not_found(RecordKind::Board, board_id))?;

        if !board.add_member(user) {
            debug!(board_id = %board_id, user = %user, "already has access, nothing to add");
            return Ok(false);
        }

        tx.put_board(board);
        Ok(true)
    }
}
