//! Service layer
//!
//! Domain operations over the table accessor. Services never touch
//! the local cache directly; every read and write goes through
//! `TableAccessor`, so they inherit its offline fallback.

mod chat;
mod favorites;
mod profile;
mod voting;

pub use chat::ChatService;
pub use favorites::FavoritesService;
pub use profile::ProfileService;
pub use voting::VotingService;
