pub mod boards;
pub mod database;
pub mod invitations;
pub mod locks;
pub mod members;
pub mod transaction;

pub use boards::BoardStore;
pub use database::Database;
pub use invitations::InvitationLedger;
pub use members::MembershipStore;
pub use transaction::Transaction;
