use crate::domain::{
    entry::Entry,
    ids::{BoardId, LaneId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A board: the ordering domain for its lanes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub title: String,
    pub description: Option<String>,
    pub color: String,
    pub owner: UserId,
    #[serde(default)]
    pub members: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    pub fn new(owner: UserId, title: String, color: String) -> Self {
        let now = Utc::now();
        Self {
            id: BoardId::new(),
            title,
            description: None,
            color,
            owner,
            members: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks plain membership; the owner is never in the member set
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    /// Owner or member
    pub fn has_access(&self, user: &UserId) -> bool {
        &self.owner == user || self.is_member(user)
    }

    /// Adds a member. Returns false when nothing changed.
    pub fn add_member(&mut self, user: UserId) -> bool {
        if user == self.owner || !self.members.insert(user) {
            return false;
        }
        self.updated_at = Utc::now();
        true
    }

    /// Removes a member. Returns false when nothing changed.
    pub fn remove_member(&mut self, user: &UserId) -> bool {
        if !self.members.remove(user) {
            return false;
        }
        self.updated_at = Utc::now();
        true
    }

    pub fn apply(&mut self, patch: BoardPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        self.updated_at = Utc::now();
    }
}

/// Field-level update for a board. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<String>,
}

/// An ordered column of entries inside a board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneId,
    pub board_id: BoardId,
    pub title: String,
    pub color: String,
    pub position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lane {
    pub fn new(board_id: BoardId, title: String, color: String, position: u32) -> Self {
        let now = Utc::now();
        Self {
            id: LaneId::new(),
            board_id,
            title,
            color,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_position(&mut self, position: u32) {
        if self.position != position {
            self.position = position;
            self.updated_at = Utc::now();
        }
    }

    pub fn apply(&mut self, patch: LanePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        self.updated_at = Utc::now();
    }
}

/// Field-level update for a lane
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanePatch {
    pub title: Option<String>,
    pub color: Option<String>,
}

/// A lane with its entries in position order
#[derive(Debug, Clone, Serialize)]
pub struct LaneView {
    pub lane: Lane,
    pub entries: Vec<Entry>,
}

/// A board with its lanes and entries resolved in position order
#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub board: Board,
    pub lanes: Vec<LaneView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_creation() {
        let owner = UserId::new();
        let board = Board::new(owner, "Roadmap".to_string(), "#fff".to_string());

        assert_eq!(board.owner, owner);
        assert!(board.members.is_empty());
        assert!(board.has_access(&owner));
        assert!(!board.is_member(&owner));
    }

    #[test]
    fn test_member_set_is_idempotent() {
        let mut board = Board::new(UserId::new(), "Roadmap".to_string(), "#fff".to_string());
        let user = UserId::new();

        assert!(board.add_member(user));
        assert!(!board.add_member(user));
        assert_eq!(board.members.len(), 1);

        assert!(board.remove_member(&user));
        assert!(!board.remove_member(&user));
        assert!(board.members.is_empty());
    }

    #[test]
    fn test_owner_never_enters_member_set() {
        let owner = UserId::new();
        let mut board = Board::new(owner, "Roadmap".to_string(), "#fff".to_string());

        assert!(!board.add_member(owner));
        assert!(!board.remove_member(&owner));
        assert!(board.members.is_empty());
        assert!(board.has_access(&owner));
    }

    #[test]
    fn test_board_patch() {
        let mut board = Board::new(UserId::new(), "Roadmap".to_string(), "#fff".to_string());
        board.description = Some("old".to_string());

        board.apply(BoardPatch {
            title: Some("Plan".to_string()),
            description: Some(None),
            color: None,
        });

        assert_eq!(board.title, "Plan");
        assert!(board.description.is_none());
        assert_eq!(board.color, "#fff");
    }

    #[test]
    fn test_lane_set_position() {
        let mut lane = Lane::new(BoardId::new(), "Todo".to_string(), "#000".to_string(), 0);
        lane.set_position(3);
        assert_eq!(lane.position, 3);
    }
}
