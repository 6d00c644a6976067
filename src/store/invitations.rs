use crate::{
    domain::{BoardId, Invitation, InvitationId, InvitationStatus, PendingInvitation, UserId},
    error::{RecordKind, Result, TavlaError},
    store::{database::Database, locks::LockKey, members::MembershipStore},
};
use std::sync::Arc;
use tracing::info;

/// Drives the invitation state machine for (board, invitee) pairs
#[derive(Clone)]
pub struct InvitationLedger {
    db: Arc<Database>,
}

impl InvitationLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn locks(board_id: BoardId, invitee: UserId) -> [LockKey; 2] {
        [LockKey::Members(board_id), LockKey::Invite(board_id, invitee)]
    }

    /// Invites `invitee` to the board.
    ///
    /// Creates a PENDING row, or reopens the existing row for this pair if it
    /// was rejected or its acceptance no longer grants membership.
    pub async fn invite(&self, board_id: BoardId, invitee: UserId) -> Result<Invitation> {
        let mut tx = self.db.begin(Self::locks(board_id, invitee)).await;
        let board = tx
            .board(&board_id)
            .await
            .ok_or_else(|| TavlaError::not_found(RecordKind::Board, board_id))?;

        if board.has_access(&invitee) {
            return Err(TavlaError::Conflict(format!(
                "user {} is already a member of board {}",
                invitee, board_id
            )));
        }

        let invitation = match tx.invitation_for(&board_id, &invitee).await {
            None => Invitation::new(board_id, invitee),
            Some(existing) if existing.status.is_pending() => {
                return Err(TavlaError::Conflict("already pending".to_string()));
            }
            Some(mut existing) => {
                existing.transition_to(InvitationStatus::Pending)?;
                existing
            }
        };

        tx.put_invitation(invitation.clone());
        tx.commit().await?;

        info!(
            invitation_id = %invitation.id,
            board_id = %board_id,
            invitee = %invitee,
            "invitation sent"
        );
        Ok(invitation)
    }

    /// Pending invitations addressed to `invitee`, oldest first
    pub async fn list_pending(&self, invitee: UserId) -> Vec<PendingInvitation> {
        let records = self.db.records().await;
        let mut pending: Vec<PendingInvitation> = records
            .invitations
            .values()
            .filter(|inv| inv.invitee == invitee && inv.status.is_pending())
            .filter_map(|inv| {
                let board = records.boards.get(&inv.board_id)?;
                Some(PendingInvitation {
                    invitation: inv.clone(),
                    board_title: board.title.clone(),
                    board_owner: board.owner,
                })
            })
            .collect();
        pending.sort_by_key(|p| p.invitation.updated_at);
        pending
    }

    /// Resolves a pending invitation on behalf of its invitee.
    ///
    /// Accepting adds the invitee to the board in the same transaction.
    pub async fn respond(
        &self,
        invitation_id: InvitationId,
        responder: UserId,
        decision: InvitationStatus,
    ) -> Result<Invitation> {
        let (board_id, invitee) = {
            let records = self.db.records().await;
            let invitation = records
                .invitations
                .get(&invitation_id)
                .ok_or_else(|| TavlaError::not_found(RecordKind::Invitation, invitation_id))?;
            (invitation.board_id, invitation.invitee)
        };

        if responder != invitee {
            return Err(TavlaError::Unauthorized {
                user: responder.to_string(),
                invitation: invitation_id.to_string(),
            });
        }

        let mut tx = self.db.begin(Self::locks(board_id, invitee)).await;
        let mut invitation = tx.invitation(&invitation_id).await.ok_or_else(|| {
            TavlaError::Conflict(format!(
                "invitation {} was removed concurrently",
                invitation_id
            ))
        })?;

        if !invitation.status.is_pending() || decision.is_pending() {
            return Err(TavlaError::InvalidState {
                from: invitation.status.to_string(),
                to: decision.to_string(),
            });
        }

        invitation.transition_to(decision)?;
        if decision == InvitationStatus::Accepted {
            MembershipStore::add_in(&mut tx, board_id, invitee).await?;
        }
        tx.put_invitation(invitation.clone());
        tx.commit().await?;

        info!(
            invitation_id = %invitation_id,
            board_id = %board_id,
            status = %decision,
            "invitation resolved"
        );
        Ok(invitation)
    }

    pub async fn get_invitation(&self, invitation_id: InvitationId) -> Result<Invitation> {
        self.db
            .records()
            .await
            .invitations
            .get(&invitation_id)
            .cloned()
            .ok_or_else(|| TavlaError::not_found(RecordKind::Invitation, invitation_id))
    }

    /// Every invitation row of a board regardless of status
    pub async fn list_for_board(&self, board_id: BoardId) -> Result<Vec<Invitation>> {
        let records = self.db.records().await;
        if !records.boards.contains_key(&board_id) {
            return Err(TavlaError::not_found(RecordKind::Board, board_id));
        }

        let mut invitations: Vec<Invitation> = records
            .invitations
            .values()
            .filter(|inv| inv.board_id == board_id)
            .cloned()
            .collect();
        invitations.sort_by_key(|inv| inv.created_at);
        Ok(invitations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Defaults, storage::MemoryStorage, store::BoardStore, Board};

    struct Fixture {
        boards: BoardStore,
        members: MembershipStore,
        ledger: InvitationLedger,
        board: Board,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(Database::open(Arc::new(MemoryStorage::new())).await.unwrap());
        let members = MembershipStore::new(Arc::clone(&db));
        let boards = BoardStore::new(Arc::clone(&db), members.clone(), Defaults::default());
        let ledger = InvitationLedger::new(db);
        let board = boards
            .create_board(UserId::new(), "Board X".to_string(), None, None)
            .await
            .unwrap();
        Fixture {
            boards,
            members,
            ledger,
            board,
        }
    }

    #[tokio::test]
    async fn test_invite_creates_pending_row() {
        let fx = fixture().await;
        let user = UserId::new();

        let invitation = fx.ledger.invite(fx.board.id, user).await.unwrap();

        assert_eq!(invitation.status, InvitationStatus::Pending);
        assert_eq!(invitation.invitee, user);

        let pending = fx.ledger.list_pending(user).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].board_title, "Board X");
        assert_eq!(pending[0].board_owner, fx.board.owner);
    }

    #[tokio::test]
    async fn test_second_invite_while_pending_conflicts() {
        let fx = fixture().await;
        let user = UserId::new();

        fx.ledger.invite(fx.board.id, user).await.unwrap();
        let err = fx.ledger.invite(fx.board.id, user).await.unwrap_err();

        assert!(matches!(err, TavlaError::Conflict(_)));
        assert_eq!(fx.ledger.list_for_board(fx.board.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invite_member_or_owner_conflicts() {
        let fx = fixture().await;
        let member = UserId::new();
        fx.members.add(fx.board.id, member).await.unwrap();

        assert!(matches!(
            fx.ledger.invite(fx.board.id, member).await,
            Err(TavlaError::Conflict(_))
        ));
        assert!(matches!(
            fx.ledger.invite(fx.board.id, fx.board.owner).await,
            Err(TavlaError::Conflict(_))
        ));
        assert!(fx.ledger.list_for_board(fx.board.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invite_unknown_board() {
        let fx = fixture().await;
        assert!(matches!(
            fx.ledger.invite(BoardId::new(), UserId::new()).await,
            Err(TavlaError::NotFound {
                kind: RecordKind::Board,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_accept_adds_membership() {
        let fx = fixture().await;
        let user = UserId::new();
        let invitation = fx.ledger.invite(fx.board.id, user).await.unwrap();

        let accepted = fx
            .ledger
            .respond(invitation.id, user, InvitationStatus::Accepted)
            .await
            .unwrap();

        assert_eq!(accepted.status, InvitationStatus::Accepted);
        assert!(fx.members.is_member(fx.board.id, user).await.unwrap());
        assert!(fx.ledger.list_pending(user).await.is_empty());
        assert_eq!(fx.boards.list_boards_for(user).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reject_does_not_add_membership() {
        let fx = fixture().await;
        let user = UserId::new();
        let invitation = fx.ledger.invite(fx.board.id, user).await.unwrap();

        let rejected = fx
            .ledger
            .respond(invitation.id, user, InvitationStatus::Rejected)
            .await
            .unwrap();

        assert_eq!(rejected.status, InvitationStatus::Rejected);
        assert!(!fx.members.is_member(fx.board.id, user).await.unwrap());
    }

    #[tokio::test]
    async fn test_reinvite_after_reject_reuses_row() {
        let fx = fixture().await;
        let user = UserId::new();
        let first = fx.ledger.invite(fx.board.id, user).await.unwrap();
        fx.ledger
            .respond(first.id, user, InvitationStatus::Rejected)
            .await
            .unwrap();

        let second = fx.ledger.invite(fx.board.id, user).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.status, InvitationStatus::Pending);
        assert_eq!(fx.ledger.list_for_board(fx.board.id).await.unwrap().len(), 1);
        let pending = fx.ledger.list_pending(user).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].invitation.board_id, fx.board.id);
    }

    #[tokio::test]
    async fn test_reinvite_after_removal_reuses_accepted_row() {
        let fx = fixture().await;
        let user = UserId::new();
        let first = fx.ledger.invite(fx.board.id, user).await.unwrap();
        fx.ledger
            .respond(first.id, user, InvitationStatus::Accepted)
            .await
            .unwrap();

        assert!(matches!(
            fx.ledger.invite(fx.board.id, user).await,
            Err(TavlaError::Conflict(_))
        ));

        fx.members.remove(fx.board.id, user).await.unwrap();
        let second = fx.ledger.invite(fx.board.id, user).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, InvitationStatus::Pending);
    }

    #[tokio::test]
    async fn test_respond_preconditions() {
        let fx = fixture().await;
        let user = UserId::new();
        let invitation = fx.ledger.invite(fx.board.id, user).await.unwrap();

        assert!(matches!(
            fx.ledger
                .respond(InvitationId::new(), user, InvitationStatus::Accepted)
                .await,
            Err(TavlaError::NotFound {
                kind: RecordKind::Invitation,
                ..
            })
        ));

        let intruder = UserId::new();
        assert!(matches!(
            fx.ledger
                .respond(invitation.id, intruder, InvitationStatus::Accepted)
                .await,
            Err(TavlaError::Unauthorized { .. })
        ));
        assert!(!fx.members.is_member(fx.board.id, intruder).await.unwrap());

        assert!(matches!(
            fx.ledger
                .respond(invitation.id, user, InvitationStatus::Pending)
                .await,
            Err(TavlaError::InvalidState { .. })
        ));

        fx.ledger
            .respond(invitation.id, user, InvitationStatus::Rejected)
            .await
            .unwrap();
        assert!(matches!(
            fx.ledger
                .respond(invitation.id, user, InvitationStatus::Accepted)
                .await,
            Err(TavlaError::InvalidState { .. })
        ));
        assert!(!fx.members.is_member(fx.board.id, user).await.unwrap());
        assert_eq!(
            fx.ledger.get_invitation(invitation.id).await.unwrap().status,
            InvitationStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_board_deletion_removes_invitations() {
        let fx = fixture().await;
        let user = UserId::new();
        let invitation = fx.ledger.invite(fx.board.id, user).await.unwrap();

        fx.boards.delete_board(fx.board.id).await.unwrap();

        assert!(fx.ledger.list_pending(user).await.is_empty());
        assert!(fx.ledger.get_invitation(invitation.id).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_invites_leave_one_row() {
        let fx = fixture().await;
        let user = UserId::new();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = fx.ledger.clone();
            let board_id = fx.board.id;
            handles.push(tokio::spawn(async move { ledger.invite(board_id, user).await }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(TavlaError::Conflict(_)) => {}
                Err(err) => panic!("unexpected error: {}", err),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(fx.ledger.list_for_board(fx.board.id).await.unwrap().len(), 1);
    }
}
