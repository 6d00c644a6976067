use crate::domain::ids::{BoardId, InvitationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an invitation to a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl InvitationStatus {
    /// Checks if a status transition is valid.
    ///
    /// Whether a reopen is allowed also depends on membership, which is
    /// checked by the caller.
    pub fn can_transition_to(&self, target: &InvitationStatus) -> bool {
        matches!(
            (self, target),
            // Invitee responds
            (Self::Pending, Self::Accepted)
                | (Self::Pending, Self::Rejected)
                // Fresh invite reopens the row
                | (Self::Rejected, Self::Pending)
                | (Self::Accepted, Self::Pending)
        )
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// The single invitation row for a (board, invitee) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub board_id: BoardId,
    pub invitee: UserId,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invitation {
    pub fn new(board_id: BoardId, invitee: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: InvitationId::new(),
            board_id,
            invitee,
            status: InvitationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Changes the invitation status
    pub fn transition_to(&mut self, status: InvitationStatus) -> Result<(), crate::error::TavlaError> {
        if !self.status.can_transition_to(&status) {
            return Err(crate::error::TavlaError::InvalidState {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }

        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A pending invitation resolved with a summary of its board
#[derive(Debug, Clone, Serialize)]
pub struct PendingInvitation {
    pub invitation: Invitation,
    pub board_title: String,
    pub board_owner: UserId,
}
