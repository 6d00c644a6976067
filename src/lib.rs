//! # Tavla Core
//!
//! Ordered board engine: boards hold lanes and lanes hold entries, each kept
//! in dense zero-based positions. Entries move within and across lanes, lanes
//! move and reorder within their board, and every such change commits as a
//! single isolated transaction. An invitation state machine decides who
//! becomes a member of a board.
//!
//! Authentication, request validation and transport belong to the caller.

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use config::{Defaults, StorageConfig, TavlaConfig};
pub use domain::{
    board::{Board, BoardPatch, BoardView, Lane, LanePatch, LaneView},
    entry::{Entry, EntryPatch, NewEntry, Priority},
    ids::{BoardId, EntryId, InvitationId, LaneId, UserId},
    invitation::{Invitation, InvitationStatus, PendingInvitation},
};
pub use error::{ErrorKind, RecordKind, Result, TavlaError};
pub use storage::Storage;
pub use store::{BoardStore, Database, InvitationLedger, MembershipStore};

use std::sync::Arc;

/// Composition root wiring every store over one shared database
#[derive(Clone)]
pub struct Tavla {
    pub boards: BoardStore,
    pub members: MembershipStore,
    pub invitations: InvitationLedger,
}

impl Tavla {
    /// Opens the backend named in `config`
    pub async fn open(config: TavlaConfig) -> Result<Self> {
        let storage = config.storage.build();
        Self::with_storage(storage, config).await
    }

    /// Opens an explicit backend, using `config` only for defaults
    pub async fn with_storage(storage: Arc<dyn Storage>, config: TavlaConfig) -> Result<Self> {
        let db = Arc::new(Database::open(storage).await?);
        let members = MembershipStore::new(Arc::clone(&db));

        Ok(Self {
            boards: BoardStore::new(Arc::clone(&db), members.clone(), config.defaults),
            invitations: InvitationLedger::new(db),
            members,
        })
    }
}
