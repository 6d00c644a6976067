pub mod board;
pub mod entry;
pub mod ids;
pub mod invitation;
pub mod position;
pub mod sorting;

pub use board::{Board, BoardPatch, BoardView, Lane, LanePatch, LaneView};
pub use entry::{Entry, EntryPatch, NewEntry, Priority};
pub use ids::{BoardId, EntryId, InvitationId, LaneId, UserId};
pub use invitation::{Invitation, InvitationStatus, PendingInvitation};
pub use sorting::{sort_entries, SortField, SortOrder};
