//! SQLite persistence for invitations, games, wallets, and the escrow ledger.

mod error;
mod models;
mod repository;
mod schema;
mod wallet;

pub use error::DbError;
pub use repository::{ArenaRepository, IssuedInvitation, MIGRATIONS};
